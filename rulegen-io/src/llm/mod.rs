//! Text-completion clients.

mod cache;
#[cfg(feature = "http")]
mod gemini;

pub use cache::CachedLlm;
#[cfg(feature = "http")]
#[cfg_attr(docsrs, doc(cfg(feature = "http")))]
pub use gemini::{GeminiClient, GeminiConfig, DEFAULT_GEMINI_MODEL};

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("environment variable {0} is not set")]
    MissingApiKey(&'static str),
    #[cfg(feature = "http")]
    #[error("LLM request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("LLM API returned {status}: {body}")]
    Api { status: u16, body: String },
    #[error("LLM response contained no text")]
    EmptyResponse,
    #[error("LLM cache {path:?}: {source}")]
    Cache {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A prompt-in, text-out completion backend.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String, LlmError>;

    /// Drops any stored answer for `prompt`, so the next call asks the
    /// backend again. Called when a caller rejects a response.
    async fn invalidate(&self, _prompt: &str) {}
}

#[async_trait]
impl<T: LlmClient + ?Sized> LlmClient for Arc<T> {
    async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        (**self).complete(prompt).await
    }

    async fn invalidate(&self, prompt: &str) {
        (**self).invalidate(prompt).await
    }
}
