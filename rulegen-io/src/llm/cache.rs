use super::{LlmClient, LlmError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Prompt-keyed response cache persisted as a JSON object on disk.
///
/// The file is loaded lazily on first use. A corrupt file is treated as
/// empty. Responses are written back after every miss; a failed write is
/// logged and otherwise ignored. A response the caller rejects through
/// [`LlmClient::invalidate`] is removed from memory and from the file.
pub struct CachedLlm<C> {
    inner: C,
    path: PathBuf,
    enabled: bool,
    entries: Mutex<Option<HashMap<String, String>>>,
}

impl<C: LlmClient> CachedLlm<C> {
    pub fn new(inner: C, path: impl Into<PathBuf>) -> Self {
        Self {
            inner,
            path: path.into(),
            enabled: true,
            entries: Mutex::new(None),
        }
    }

    /// With `false` every call goes straight to the inner client and the
    /// cache file is never touched.
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn lookup(&self, prompt: &str) -> Option<String> {
        let mut entries = self.entries.lock().await;
        if entries.is_none() {
            *entries = Some(load(&self.path).await);
        }
        entries.as_ref().and_then(|map| map.get(prompt).cloned())
    }

    async fn store(&self, prompt: &str, response: &str) {
        let mut entries = self.entries.lock().await;
        let map = entries.get_or_insert_with(HashMap::new);
        map.insert(prompt.to_string(), response.to_string());

        if let Err(e) = save(&self.path, map).await {
            warn!(target: "llm", error = %e, "failed to persist LLM cache");
        }
    }

    async fn evict(&self, prompt: &str) {
        let mut entries = self.entries.lock().await;
        if entries.is_none() {
            *entries = Some(load(&self.path).await);
        }
        let Some(map) = entries.as_mut() else {
            return;
        };
        if map.remove(prompt).is_none() {
            return;
        }
        debug!(target: "llm", "evicted rejected response");
        if let Err(e) = save(&self.path, map).await {
            warn!(target: "llm", error = %e, "failed to persist LLM cache");
        }
    }
}

async fn load(path: &Path) -> HashMap<String, String> {
    let raw = match tokio::fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return HashMap::new(),
        Err(e) => {
            warn!(target: "llm", path = %path.display(), error = %e, "cannot read LLM cache, starting empty");
            return HashMap::new();
        }
    };
    match serde_json::from_str(&raw) {
        Ok(map) => map,
        Err(e) => {
            warn!(target: "llm", path = %path.display(), error = %e, "corrupt LLM cache, starting empty");
            HashMap::new()
        }
    }
}

async fn save(path: &Path, map: &HashMap<String, String>) -> Result<(), LlmError> {
    let cache_error = |source: std::io::Error| LlmError::Cache {
        path: path.to_path_buf(),
        source,
    };
    let json = serde_json::to_string_pretty(map).map_err(|e| cache_error(e.into()))?;
    tokio::fs::write(path, json).await.map_err(cache_error)
}

#[async_trait]
impl<C: LlmClient> LlmClient for CachedLlm<C> {
    async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        if !self.enabled {
            return self.inner.complete(prompt).await;
        }

        if let Some(hit) = self.lookup(prompt).await {
            debug!(target: "llm", "cache hit");
            return Ok(hit);
        }

        let response = self.inner.complete(prompt).await?;
        self.store(prompt, &response).await;
        info!(target: "llm", path = %self.path.display(), "cached response");
        Ok(response)
    }

    async fn invalidate(&self, prompt: &str) {
        if self.enabled {
            self.evict(prompt).await;
        }
        self.inner.invalidate(prompt).await;
    }
}
