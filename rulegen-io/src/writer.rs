use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    #[error("refusing to write '{0}': file names must not contain path separators")]
    InvalidFileName(String),
    #[error("cannot write {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Creates `dir` (and parents) and writes every `file name -> content` pair
/// into it, overwriting existing files. Returns the written paths in name
/// order.
pub async fn write_rule_directory(
    dir: &Path,
    files: &BTreeMap<String, String>,
) -> Result<Vec<PathBuf>, WriteError> {
    for name in files.keys() {
        if name.is_empty() || name.contains(['/', '\\']) || name.contains("..") {
            return Err(WriteError::InvalidFileName(name.clone()));
        }
    }

    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|source| WriteError::Io {
            path: dir.to_path_buf(),
            source,
        })?;

    let mut written = Vec::with_capacity(files.len());
    for (name, content) in files {
        let path = dir.join(name);
        tokio::fs::write(&path, content)
            .await
            .map_err(|source| WriteError::Io {
                path: path.clone(),
                source,
            })?;
        debug!(path = %path.display(), bytes = content.len(), "wrote rule file");
        written.push(path);
    }

    info!(dir = %dir.display(), count = written.len(), "rule directory written");
    Ok(written)
}
