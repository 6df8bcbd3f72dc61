use crate::node::Executable;
use crate::{Action, FlowBuilder, FlowError};
use async_trait::async_trait;
use rulegen_context::SharedContext;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// A directed graph of steps whose edges are labelled by actions.
///
/// Running a flow starts at the start step and follows the edge matching
/// each produced action. An action without an outgoing edge ends the run
/// successfully; it is the normal way a flow terminates.
pub struct Flow {
    name: String,
    start: String,
    steps: HashMap<String, Arc<dyn Executable>>,
    edges: HashMap<String, HashMap<Action, String>>,
}

impl Flow {
    pub(crate) fn new(
        name: String,
        start: String,
        steps: HashMap<String, Arc<dyn Executable>>,
        edges: HashMap<String, HashMap<Action, String>>,
    ) -> Self {
        Self {
            name,
            start,
            steps,
            edges,
        }
    }

    pub fn builder(name: impl Into<String>) -> FlowBuilder {
        FlowBuilder::new(name)
    }

    pub fn start(&self) -> &str {
        &self.start
    }

    /// Step the flow moves to when `step` produces `action`, if any.
    pub fn successor(&self, step: &str, action: &Action) -> Option<&str> {
        self.edges
            .get(step)
            .and_then(|targets| targets.get(action))
            .map(String::as_str)
    }

    /// Runs the flow against `ctx` and returns the last action produced.
    ///
    /// The first unrecovered step error aborts the run; whatever earlier
    /// steps committed to `ctx` stays there.
    #[tracing::instrument(level = "info", skip(self, ctx), fields(flow = %self.name, trace_id = %ctx.trace_id))]
    pub async fn run(&self, ctx: &mut SharedContext) -> Result<Action, FlowError> {
        let mut current = self.start.as_str();

        loop {
            let step = self
                .steps
                .get(current)
                .ok_or_else(|| FlowError::UnknownStep {
                    flow: self.name.clone(),
                    step: current.to_string(),
                })?;

            let action = step.run(ctx).await?;

            match self.successor(current, &action) {
                Some(next) => {
                    debug!(from = %current, action = %action, to = %next, "transition");
                    current = next;
                }
                None => {
                    info!(last_step = %current, action = %action, "flow finished");
                    return Ok(action);
                }
            }
        }
    }
}

#[async_trait]
impl Executable for Flow {
    fn name(&self) -> &str {
        &self.name
    }

    /// A nested flow gets its own step log entry. It is opened before the
    /// entries of its inner steps and closed with the flow's last action.
    async fn run(&self, ctx: &mut SharedContext) -> Result<Action, FlowError> {
        ctx.start_step(&self.name);
        let result = Flow::run(self, ctx).await;
        match &result {
            Ok(action) => ctx.end_step_success(&self.name, action.as_str()),
            Err(e) => ctx.end_step_failed(&self.name, &e.to_string()),
        }
        result
    }
}
