//! # rulegen
//!
//! Crawls a code repository, asks a language model for its core
//! components and how they interact, and writes one rule file per
//! component for AI coding agents.
//!
//! The pipeline runs on a small flow engine (re-exported from
//! `rulegen-core`): steps with a prepare / execute / finalize lifecycle,
//! retry with fallback, batch steps and nested flows.
//!
//! ```rust,no_run
//! use rulegen::prelude::*;
//!
//! struct Hello;
//!
//! #[async_trait]
//! impl Node for Hello {
//!     type Prep = ();
//!     type Exec = String;
//!
//!     fn prep(&self, _ctx: &SharedContext) -> anyhow::Result<()> {
//!         Ok(())
//!     }
//!
//!     async fn exec(&self, _prep: &()) -> anyhow::Result<String> {
//!         Ok("hello".to_string())
//!     }
//!
//!     fn post(&self, ctx: &mut SharedContext, _: (), greeting: String) -> anyhow::Result<Action> {
//!         ctx.insert("greeting", &greeting)?;
//!         Ok(Action::DEFAULT)
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let flow = FlowBuilder::new("hello")
//!         .step(NodeStep::new("hello", Hello))
//!         .build()?;
//!     let mut ctx = SharedContext::default();
//!     flow.run(&mut ctx).await?;
//!     Ok(())
//! }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]

pub use rulegen_context as context;
pub use rulegen_core::*;
pub use rulegen_io as io;

pub mod cli;
pub mod config;
pub mod logger;
pub mod nodes;
pub mod pipeline;

/// Prelude module for easy imports
pub mod prelude {
    pub use rulegen_core::prelude::*;
    pub use rulegen_io::{LlmClient, SourceFetcher};
}
