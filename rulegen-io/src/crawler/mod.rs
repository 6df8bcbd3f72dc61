//! Source fetchers: turn a repository (local or remote) into an ordered
//! list of `(path, content)` pairs.

#[cfg(feature = "http")]
mod github;
mod local;

#[cfg(feature = "http")]
#[cfg_attr(docsrs, doc(cfg(feature = "http")))]
pub use github::{GithubCrawler, GithubRepo};
pub use local::LocalCrawler;

use async_trait::async_trait;
use glob::Pattern;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFile {
    /// Path relative to the crawled root, `/`-separated.
    pub path: String,
    pub content: String,
}

#[derive(Debug, Clone, Default)]
pub struct FetchRequest {
    pub include_patterns: Vec<String>,
    pub exclude_patterns: Vec<String>,
    /// Files larger than this many bytes are skipped.
    pub max_file_size: u64,
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("invalid glob pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },
    #[error("cannot read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("'{0}' is not a GitHub repository URL")]
    InvalidRepoUrl(String),
    #[cfg(feature = "http")]
    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("{url} answered with status {status}: {body}")]
    Status { url: String, status: u16, body: String },
    #[error("unexpected payload from {url}: {source}")]
    Payload {
        url: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("crawler task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

#[async_trait]
pub trait SourceFetcher: Send + Sync {
    /// Every file that passes the request's filters, sorted by path.
    async fn fetch(&self, request: &FetchRequest) -> Result<Vec<SourceFile>, FetchError>;
}

/// Include/exclude/size rules shared by every crawler.
///
/// Patterns are shell globs matched against the relative path, where `*`
/// also crosses `/`. Include patterns additionally match the bare file
/// name; an empty include list accepts everything.
#[derive(Debug, Clone)]
pub struct PathFilter {
    include: Vec<Pattern>,
    exclude: Vec<Pattern>,
    max_file_size: u64,
}

impl PathFilter {
    pub fn new(request: &FetchRequest) -> Result<Self, FetchError> {
        Ok(Self {
            include: compile(&request.include_patterns)?,
            exclude: compile(&request.exclude_patterns)?,
            max_file_size: request.max_file_size,
        })
    }

    pub fn is_excluded(&self, rel_path: &str) -> bool {
        self.exclude.iter().any(|p| p.matches(rel_path))
    }

    /// A directory whose contents would all be excluded can be skipped.
    pub fn prunes_dir(&self, rel_dir: &str) -> bool {
        let probe = format!("{}/", rel_dir.trim_end_matches('/'));
        self.is_excluded(&probe)
    }

    pub fn accepts_path(&self, rel_path: &str) -> bool {
        if self.is_excluded(rel_path) {
            return false;
        }
        if self.include.is_empty() {
            return true;
        }
        let file_name = rel_path.rsplit('/').next().unwrap_or(rel_path);
        self.include
            .iter()
            .any(|p| p.matches(rel_path) || p.matches(file_name))
    }

    pub fn accepts_size(&self, size: u64) -> bool {
        size <= self.max_file_size
    }
}

fn compile(patterns: &[String]) -> Result<Vec<Pattern>, FetchError> {
    patterns
        .iter()
        .map(|pattern| {
            Pattern::new(pattern).map_err(|source| FetchError::InvalidPattern {
                pattern: pattern.clone(),
                source,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filter(include: &[&str], exclude: &[&str]) -> PathFilter {
        PathFilter::new(&FetchRequest {
            include_patterns: include.iter().map(|s| s.to_string()).collect(),
            exclude_patterns: exclude.iter().map(|s| s.to_string()).collect(),
            max_file_size: 100,
        })
        .unwrap()
    }

    #[test]
    fn test_star_crosses_directories() {
        let f = filter(&["*.rs"], &[]);
        assert!(f.accepts_path("src/flow/mod.rs"));
        assert!(!f.accepts_path("README.md"));
    }

    #[test]
    fn test_include_matches_file_name() {
        let f = filter(&["Dockerfile"], &[]);
        assert!(f.accepts_path("deploy/Dockerfile"));
    }

    #[test]
    fn test_exclude_wins() {
        let f = filter(&["*.py"], &["tests/*", "*test*"]);
        assert!(f.accepts_path("pkg/core.py"));
        assert!(!f.accepts_path("tests/conftest.py"));
        assert!(!f.accepts_path("pkg/test_core.py"));
        assert!(f.prunes_dir("tests"));
        assert!(!f.prunes_dir("pkg"));
    }

    #[test]
    fn test_size_limit() {
        let f = filter(&[], &[]);
        assert!(f.accepts_size(100));
        assert!(!f.accepts_size(101));
    }

    #[test]
    fn test_invalid_pattern() {
        let err = PathFilter::new(&FetchRequest {
            include_patterns: vec!["[".to_string()],
            ..Default::default()
        })
        .unwrap_err();
        assert!(matches!(err, FetchError::InvalidPattern { .. }));
    }
}
