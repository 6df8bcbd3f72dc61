//! # rulegen-io
//!
//! External collaborators of the rule generation pipeline:
//!
//! - [`crawler`]: turn a local directory or a GitHub repository into source files
//! - [`llm`]: prompt a language model, optionally through an on-disk response cache
//! - [`writer`]: write the generated rule files into an output directory

pub mod crawler;
pub mod llm;
pub mod writer;

pub use crawler::{FetchError, FetchRequest, LocalCrawler, PathFilter, SourceFetcher, SourceFile};
#[cfg(feature = "http")]
pub use crawler::{GithubCrawler, GithubRepo};
pub use llm::{CachedLlm, LlmClient, LlmError};
#[cfg(feature = "http")]
pub use llm::{GeminiClient, GeminiConfig, DEFAULT_GEMINI_MODEL};
pub use writer::{write_rule_directory, WriteError};
