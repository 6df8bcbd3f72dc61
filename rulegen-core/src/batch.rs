use crate::node::Executable;
use crate::retry::{self, Exhausted, RetryConfig};
use crate::{Action, FlowError};
use anyhow::Result;
use async_trait::async_trait;
use futures::stream::{self, StreamExt, TryStreamExt};
use rulegen_context::SharedContext;
use std::time::Duration;
use tracing::{info, warn};

/// A node whose execute phase is mapped over a list of items.
///
/// `prep` yields the items, `exec_item` runs once per item (with the retry
/// policy applied to each item on its own) and `post` receives every
/// `(item, output)` pair in the original item order.
#[async_trait]
pub trait BatchNode: Send + Sync {
    type Item: Send + Sync;
    type Output: Send;

    fn prep(&self, ctx: &SharedContext) -> Result<Vec<Self::Item>>;

    /// Must not share mutable state with sibling items; items may run
    /// concurrently.
    async fn exec_item(&self, item: &Self::Item) -> Result<Self::Output>;

    fn exec_item_fallback(
        &self,
        _item: &Self::Item,
        error: anyhow::Error,
    ) -> Result<Self::Output> {
        Err(error)
    }

    fn post(
        &self,
        ctx: &mut SharedContext,
        results: Vec<(Self::Item, Self::Output)>,
    ) -> Result<Action>;
}

/// A [`BatchNode`] bound to a step name, a per-item retry policy and a
/// concurrency limit.
///
/// The first item that still fails after its retries and fallback aborts
/// the whole step: in-flight siblings are dropped, `post` is not called and
/// the context is left untouched.
pub struct BatchStep<N> {
    name: String,
    node: N,
    retry: RetryConfig,
    max_concurrency: Option<usize>,
}

impl<N: BatchNode> BatchStep<N> {
    pub fn new(name: impl Into<String>, node: N) -> Self {
        Self {
            name: name.into(),
            node,
            retry: RetryConfig::default(),
            max_concurrency: None,
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn max_retries(mut self, max_retries: u32, wait: Duration) -> Self {
        self.retry = RetryConfig::new(max_retries, wait);
        self
    }

    /// Runs up to `limit` items at once. `1` is equivalent to sequential.
    pub fn parallel(mut self, limit: usize) -> Self {
        self.max_concurrency = Some(limit.max(1));
        self
    }

    pub fn sequential(mut self) -> Self {
        self.max_concurrency = None;
        self
    }

    pub fn node(&self) -> &N {
        &self.node
    }

    async fn run_item(&self, index: usize, item: &N::Item) -> Result<N::Output, FlowError> {
        let node = &self.node;
        match retry::retry(&self.retry, &self.name, move || node.exec_item(item)).await {
            Ok((output, _)) => Ok(output),
            Err(Exhausted { attempts, error }) => {
                warn!(step = %self.name, index, attempts, error = %format!("{error:#}"), "item retries exhausted");
                self.node
                    .exec_item_fallback(item, error)
                    .map_err(|source| FlowError::BatchItem {
                        step: self.name.clone(),
                        index,
                        attempts,
                        source,
                    })
            }
        }
    }

    async fn run_phases(&self, ctx: &mut SharedContext) -> Result<Action, FlowError> {
        let items = self.node.prep(ctx).map_err(|source| FlowError::Prepare {
            step: self.name.clone(),
            source,
        })?;

        info!(step = %self.name, items = items.len(), concurrency = ?self.max_concurrency, "running batch");

        let outputs: Vec<N::Output> = match self.max_concurrency {
            None => {
                let mut outputs = Vec::with_capacity(items.len());
                for (index, item) in items.iter().enumerate() {
                    outputs.push(self.run_item(index, item).await?);
                }
                outputs
            }
            Some(limit) => {
                // Futures are lazy; `buffered` polls at most `limit` of them
                // and yields outputs in submission order.
                let pending: Vec<_> = items
                    .iter()
                    .enumerate()
                    .map(|(index, item)| self.run_item(index, item))
                    .collect();
                stream::iter(pending).buffered(limit).try_collect().await?
            }
        };

        let results = items.into_iter().zip(outputs).collect();

        self.node
            .post(ctx, results)
            .map_err(|source| FlowError::Finalize {
                step: self.name.clone(),
                source,
            })
    }
}

#[async_trait]
impl<N: BatchNode> Executable for BatchStep<N> {
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
