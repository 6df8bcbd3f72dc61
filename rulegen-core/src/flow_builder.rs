use crate::node::Executable;
use crate::{Action, BuildError, Flow};
use std::collections::HashMap;
use std::sync::Arc;

/// Builder for wiring steps into a [`Flow`] with a fluent API.
///
/// ```ignore
/// let flow = FlowBuilder::new("pipeline")
///     .step(NodeStep::new("fetch", FetchRepo::new(fetcher)))
///     .step(NodeStep::new("identify", IdentifyComponents::new(llm)))
///     .then("fetch", "identify")
///     .build()?;
/// ```
pub struct FlowBuilder {
    name: String,
    start: Option<String>,
    steps: Vec<(String, Arc<dyn Executable>)>,
    edges: Vec<(String, Action, String)>,
}

impl FlowBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            start: None,
            steps: Vec::new(),
            edges: Vec::new(),
        }
    }

    /// Registers a step under its own name. The first registered step is
    /// the start step unless [`start`](Self::start) says otherwise.
    pub fn step<E>(self, step: E) -> Self
    where
        E: Executable + 'static,
    {
        self.shared_step(Arc::new(step))
    }

    /// Registers a step that may also be used by other flows.
    pub fn shared_step(mut self, step: Arc<dyn Executable>) -> Self {
        self.steps.push((step.name().to_string(), step));
        self
    }

    pub fn start(mut self, step: impl Into<String>) -> Self {
        self.start = Some(step.into());
        self
    }

    /// Moves from `from` to `to` when `from` produces `action`.
    pub fn edge(
        mut self,
        from: impl Into<String>,
        action: impl Into<Action>,
        to: impl Into<String>,
    ) -> Self {
        self.edges.push((from.into(), action.into(), to.into()));
        self
    }

    /// Edge on the default action.
    pub fn then(self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.edge(from, Action::DEFAULT, to)
    }

    /// Validates the graph and builds the flow. Unwired actions are fine;
    /// they end the run.
    pub fn build(self) -> Result<Flow, BuildError> {
        let start = match self.start.or_else(|| self.steps.first().map(|(name, _)| name.clone())) {
            Some(start) => start,
            None => return Err(BuildError::MissingStart(self.name)),
        };

        let mut steps = HashMap::with_capacity(self.steps.len());
        for (name, step) in self.steps {
            if steps.insert(name.clone(), step).is_some() {
                return Err(BuildError::DuplicateStep {
                    flow: self.name,
                    step: name,
                });
            }
        }

        if !steps.contains_key(&start) {
            return Err(BuildError::UnknownStep {
                flow: self.name,
                step: start,
            });
        }

        let mut edges: HashMap<String, HashMap<Action, String>> = HashMap::new();
        for (from, action, to) in self.edges {
            for endpoint in [&from, &to] {
                if !steps.contains_key(endpoint) {
                    return Err(BuildError::UnknownStep {
                        flow: self.name,
                        step: endpoint.clone(),
                    });
                }
            }

            let targets = edges.entry(from.clone()).or_default();
            if targets.contains_key(&action) {
                return Err(BuildError::DuplicateEdge {
                    flow: self.name,
                    step: from,
                    action: action.to_string(),
                });
            }
            targets.insert(action, to);
        }

        Ok(Flow::new(self.name, start, steps, edges))
    }
}
