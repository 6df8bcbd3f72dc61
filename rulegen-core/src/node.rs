use crate::retry::{self, Exhausted, RetryConfig};
use crate::{Action, FlowError};
use anyhow::Result;
use async_trait::async_trait;
use rulegen_context::SharedContext;
use std::time::Duration;
use tracing::warn;

/// A step that can be placed in a [`Flow`](crate::Flow): a leaf node, a
/// batch node or a whole nested flow.
#[async_trait]
pub trait Executable: Send + Sync {
    fn name(&self) -> &str;

    /// Runs the full lifecycle against `ctx` and returns the produced action.
    async fn run(&self, ctx: &mut SharedContext) -> Result<Action, FlowError>;
}

/// Unit of work with a prepare / execute / finalize lifecycle.
///
/// `prep` and `post` run exactly once per invocation. `exec` may run
/// several times with the same prepared value when a retry policy is
/// attached, so it must not depend on state other than its input.
#[async_trait]
pub trait Node: Send + Sync {
    type Prep: Send + Sync;
    type Exec: Send;

    /// Reads the inputs of the step. Errors are not retried.
    fn prep(&self, ctx: &SharedContext) -> Result<Self::Prep>;

    async fn exec(&self, prep: &Self::Prep) -> Result<Self::Exec>;

    /// Called with the last error once every attempt of `exec` failed.
    /// The default re-raises it, which aborts the flow.
    fn exec_fallback(&self, _prep: &Self::Prep, error: anyhow::Error) -> Result<Self::Exec> {
        Err(error)
    }

    /// Writes outputs into the context and picks the next edge. Errors are
    /// not retried.
    fn post(
        &self,
        ctx: &mut SharedContext,
        prep: Self::Prep,
        exec: Self::Exec,
    ) -> Result<Action>;
}

/// A [`Node`] bound to a step name and a retry policy.
pub struct NodeStep<N> {
    name: String,
    node: N,
    retry: RetryConfig,
}

impl<N: Node> NodeStep<N> {
    pub fn new(name: impl Into<String>, node: N) -> Self {
        Self {
            name: name.into(),
            node,
            retry: RetryConfig::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Shorthand for a fixed-wait [`RetryConfig`].
    pub fn max_retries(mut self, max_retries: u32, wait: Duration) -> Self {
        self.retry = RetryConfig::new(max_retries, wait);
        self
    }

    pub fn node(&self) -> &N {
        &self.node
    }

    pub fn retry_config(&self) -> &RetryConfig {
        &self.retry
    }

    async fn run_phases(&self, ctx: &mut SharedContext) -> Result<Action, FlowError> {
        let prep = self.node.prep(ctx).map_err(|source| FlowError::Prepare {
            step: self.name.clone(),
            source,
        })?;

        let node = &self.node;
        let prep_ref = &prep;
        let exec = match retry::retry(&self.retry, &self.name, move || node.exec(prep_ref)).await
        {
            Ok((value, _)) => value,
            Err(Exhausted { attempts, error }) => {
                warn!(step = %self.name, attempts, error = %format!("{error:#}"), "execute retries exhausted");
                self.node
                    .exec_fallback(&prep, error)
                    .map_err(|source| FlowError::Execute {
                        step: self.name.clone(),
                        attempts,
                        source,
                    })?
            }
        };

        self.node
            .post(ctx, prep, exec)
            .map_err(|source| FlowError::Finalize {
                step: self.name.clone(),
                source,
            })
    }
}

#[async_trait]
impl<N: Node> Executable for NodeStep<N> {
    fn name(&self) -> &str {
        &self.name
    }

    #[tracing::instrument(level = "debug", skip(self, ctx), fields(step = %self.name))]
    async fn run(&self, ctx: &mut SharedContext) -> Result<Action, FlowError> {
        ctx.start_step(&self.name);
        let result = self.run_phases(ctx).await;
        match &result {
            Ok(action) => ctx.end_step_success(&self.name, action.as_str()),
            Err(e) => ctx.end_step_failed(&self.name, &e.to_string()),
        }
        result
    }
}
