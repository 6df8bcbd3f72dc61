//! # Rulegen Core
//!
//! The orchestration engine behind rulegen: steps with a
//! prepare / execute / finalize lifecycle, per-step retry with fallback,
//! batch steps that fan work out over items, and flows that connect steps
//! through action-labelled edges. A flow is itself a step, so flows nest.

#![cfg_attr(docsrs, feature(doc_cfg))]

mod action;
mod batch;
mod error;
mod flow;
mod flow_builder;
mod node;
mod retry;

#[cfg(test)]
mod tests;

pub use action::Action;
pub use batch::{BatchNode, BatchStep};
pub use error::{BuildError, FlowError};
pub use flow::Flow;
pub use flow_builder::FlowBuilder;
pub use node::{Executable, Node, NodeStep};
pub use retry::{RetryConfig, RetryStrategy};

/// Prelude module for core functionality
pub mod prelude {
    pub use crate::{
        Action, BatchNode, BatchStep, BuildError, Executable, Flow, FlowBuilder,
        FlowError, Node, NodeStep, RetryConfig, RetryStrategy,
    };
    pub use async_trait::async_trait;
    pub use rulegen_context::{ContextError, SharedContext};
}
