/// Unrecovered failure of a flow run. Every variant names the step that
/// raised it; the first one aborts the whole run.
#[derive(Debug, thiserror::Error)]
pub enum FlowError {
    #[error("step '{step}' failed in prepare: {source:#}")]
    Prepare {
        step: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("step '{step}' failed in execute after {attempts} attempt(s): {source:#}")]
    Execute {
        step: String,
        attempts: u32,
        #[source]
        source: anyhow::Error,
    },
    #[error("batch step '{step}' failed on item {index} after {attempts} attempt(s): {source:#}")]
    BatchItem {
        step: String,
        index: usize,
        attempts: u32,
        #[source]
        source: anyhow::Error,
    },
    #[error("step '{step}' failed in finalize: {source:#}")]
    Finalize {
        step: String,
        #[source]
        source: anyhow::Error,
    },
    #[error("flow '{flow}' has no step named '{step}'")]
    UnknownStep { flow: String, step: String },
}

impl FlowError {
    /// Name of the step that raised the error.
    pub fn step(&self) -> &str {
        match self {
            FlowError::Prepare { step, .. }
            | FlowError::Execute { step, .. }
            | FlowError::BatchItem { step, .. }
            | FlowError::Finalize { step, .. }
            | FlowError::UnknownStep { step, .. } => step,
        }
    }
}

/// Invalid flow graph, reported by [`FlowBuilder::build`](crate::FlowBuilder::build).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BuildError {
    #[error("flow '{0}' has no steps")]
    MissingStart(String),
    #[error("flow '{flow}' registers step '{step}' more than once")]
    DuplicateStep { flow: String, step: String },
    #[error("flow '{flow}' references unknown step '{step}'")]
    UnknownStep { flow: String, step: String },
    #[error("flow '{flow}' wires action '{action}' of step '{step}' twice")]
    DuplicateEdge {
        flow: String,
        step: String,
        action: String,
    },
}
