//! # Rulegen Context
//!
//! Run-scoped shared state for rulegen flows. One [`SharedContext`] is
//! created per run, passed by reference to every step and dropped when
//! the flow completes.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Instant;
use uuid::Uuid;

/// Errors raised when reading from or writing to the context.
#[derive(Debug, thiserror::Error)]
pub enum ContextError {
    #[error("missing context key '{0}'")]
    MissingKey(String),
    #[error("context key '{key}' holds an incompatible value: {source}")]
    TypeMismatch {
        key: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("value for context key '{key}' cannot be stored: {source}")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone)]
pub struct SharedContext {
    pub trace_id: String,
    pub step_logs: Vec<StepLog>,
    values: HashMap<String, Value>,
}

#[derive(Debug, Clone)]
pub struct StepLog {
    pub step_name: String,
    pub start_time: Instant,
    pub end_time: Option<Instant>,
    pub status: StepStatus,
    pub action: Option<String>,
    pub error_message: Option<String>,
    pub trace_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStatus {
    Running,
    Success,
    Failed,
}

impl Default for SharedContext {
    fn default() -> Self {
        Self::new_with_trace_id(Uuid::new_v4().to_string())
    }
}

impl SharedContext {
    pub fn new_with_trace_id(trace_id: String) -> Self {
        Self {
            trace_id,
            step_logs: Vec::new(),
            values: HashMap::new(),
        }
    }

    /// Stores `value` under `key`, replacing any previous value.
    pub fn insert<T: Serialize + ?Sized>(
        &mut self,
        key: impl Into<String>,
        value: &T,
    ) -> Result<(), ContextError> {
        let key = key.into();
        let value = serde_json::to_value(value).map_err(|source| {
            ContextError::Encode {
                key: key.clone(),
                source,
            }
        })?;

        tracing::debug!(trace_id = %self.trace_id, key = %key, "set value");

        self.values.insert(key, value);
        Ok(())
    }

    /// Reads `key` as `T`. A key no earlier step wrote is an error.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<T, ContextError> {
        let value = self
            .values
            .get(key)
            .ok_or_else(|| ContextError::MissingKey(key.to_string()))?;
        T::deserialize(value).map_err(|source| ContextError::TypeMismatch {
            key: key.to_string(),
            source,
        })
    }

    /// Like [`get`](Self::get), but a missing key or an explicit `null`
    /// reads as `None`.
    pub fn get_opt<T: DeserializeOwned>(
        &self,
        key: &str,
    ) -> Result<Option<T>, ContextError> {
        match self.values.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => T::deserialize(value).map(Some).map_err(|source| {
                ContextError::TypeMismatch {
                    key: key.to_string(),
                    source,
                }
            }),
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.values.remove(key)
    }

    pub fn value(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn values(&self) -> &HashMap<String, Value> {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn start_step(&mut self, step_name: &str) {
        self.step_logs.push(StepLog {
            step_name: step_name.to_string(),
            start_time: Instant::now(),
            end_time: None,
            status: StepStatus::Running,
            action: None,
            error_message: None,
            trace_id: self.trace_id.clone(),
        });

        tracing::info!(trace_id = %self.trace_id, step = %step_name, "step starting");
    }

    pub fn end_step_success(&mut self, step_name: &str, action: &str) {
        if let Some(log) = self.running_step(step_name) {
            let end_time = Instant::now();
            log.end_time = Some(end_time);
            log.status = StepStatus::Success;
            log.action = Some(action.to_string());
            let duration = end_time.duration_since(log.start_time);

            tracing::info!(trace_id = %self.trace_id, step = %step_name, action = %action, duration_ms = ?duration, "step success");
        }
    }

    pub fn end_step_failed(&mut self, step_name: &str, error: &str) {
        if let Some(log) = self.running_step(step_name) {
            let end_time = Instant::now();
            log.end_time = Some(end_time);
            log.status = StepStatus::Failed;
            log.error_message = Some(error.to_string());
            let duration = end_time.duration_since(log.start_time);

            tracing::error!(trace_id = %self.trace_id, step = %step_name, duration_ms = ?duration, error = %error, "step failed");
        }
    }

    fn running_step(&mut self, step_name: &str) -> Option<&mut StepLog> {
        self.step_logs
            .iter_mut()
            .rev()
            .find(|log| log.step_name == step_name && log.status == StepStatus::Running)
    }

    /// `(step, action)` pairs of every successful step, in execution order.
    pub fn action_trace(&self) -> Vec<(String, String)> {
        self.step_logs
            .iter()
            .filter(|log| log.status == StepStatus::Success)
            .filter_map(|log| {
                log.action
                    .as_ref()
                    .map(|action| (log.step_name.clone(), action.clone()))
            })
            .collect()
    }

    pub fn print_summary(&self) {
        tracing::info!(trace_id = %self.trace_id, total_steps = self.step_logs.len(), "=== flow summary ===");

        let success_count = self
            .step_logs
            .iter()
            .filter(|log| log.status == StepStatus::Success)
            .count();
        let failed_count = self
            .step_logs
            .iter()
            .filter(|log| log.status == StepStatus::Failed)
            .count();

        tracing::info!(success = success_count, failed = failed_count);

        for log in &self.step_logs {
            let duration = log
                .end_time
                .map(|end| end.duration_since(log.start_time))
                .unwrap_or_default();
            match log.status {
                StepStatus::Failed => tracing::error!(
                    step = %log.step_name,
                    duration_ms = duration.as_millis(),
                    error = %log.error_message.as_deref().unwrap_or("unknown error"),
                ),
                _ => tracing::info!(
                    step = %log.step_name,
                    action = %log.action.as_deref().unwrap_or("-"),
                    duration_ms = duration.as_millis(),
                ),
            }
        }

        tracing::debug!(keys = ?self.values.keys().collect::<Vec<_>>(), "context keys");
    }
}
