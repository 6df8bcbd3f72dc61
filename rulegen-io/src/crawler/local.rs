use super::{FetchError, FetchRequest, PathFilter, SourceFetcher, SourceFile};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Crawls a directory on the local filesystem.
#[derive(Debug, Clone)]
pub struct LocalCrawler {
    root: PathBuf,
}

impl LocalCrawler {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl SourceFetcher for LocalCrawler {
    async fn fetch(&self, request: &FetchRequest) -> Result<Vec<SourceFile>, FetchError> {
        let filter = PathFilter::new(request)?;
        let root = self.root.clone();
        info!(root = %root.display(), "crawling directory");
        tokio::task::spawn_blocking(move || crawl(&root, &filter)).await?
    }
}

fn crawl(root: &Path, filter: &PathFilter) -> Result<Vec<SourceFile>, FetchError> {
    if !root.is_dir() {
        return Err(FetchError::Io {
            path: root.to_path_buf(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "not a directory"),
        });
    }

    let walker = WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            entry.depth() == 0
                || !entry.file_type().is_dir()
                || !filter.prunes_dir(&relative(root, entry.path()))
        });

    let mut files = Vec::new();
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "skipping unreadable entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }

        let rel_path = relative(root, entry.path());
        if !filter.accepts_path(&rel_path) {
            continue;
        }

        let size = match entry.metadata() {
            Ok(meta) => meta.len(),
            Err(e) => {
                warn!(path = %rel_path, error = %e, "skipping file without metadata");
                continue;
            }
        };
        if !filter.accepts_size(size) {
            debug!(path = %rel_path, size, "skipping file over size limit");
            continue;
        }

        match std::fs::read_to_string(entry.path()) {
            Ok(content) => files.push(SourceFile {
                path: rel_path,
                content,
            }),
            Err(e) => debug!(path = %rel_path, error = %e, "skipping unreadable or non-UTF-8 file"),
        }
    }

    files.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(files)
}

fn relative(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}
