use super::keys;
use anyhow::{bail, Result};
use rulegen_core::prelude::*;
use rulegen_io::{FetchRequest, SourceFetcher};
use std::sync::Arc;
use tracing::info;

/// Crawls the configured source and stores `files` as `[(path, content)]`.
pub struct FetchRepo {
    fetcher: Arc<dyn SourceFetcher>,
}

pub struct FetchPrep {
    source: String,
    request: FetchRequest,
}

impl FetchRepo {
    pub fn new(fetcher: Arc<dyn SourceFetcher>) -> Self {
        Self { fetcher }
    }
}

#[async_trait]
impl Node for FetchRepo {
    type Prep = FetchPrep;
    type Exec = Vec<(String, String)>;

    fn prep(&self, ctx: &SharedContext) -> Result<FetchPrep> {
        let repo_url: Option<String> = ctx.get_opt(keys::REPO_URL)?;
        let local_dir: Option<String> = ctx.get_opt(keys::LOCAL_DIR)?;
        let source = match (repo_url, local_dir) {
            (Some(url), None) => url,
            (None, Some(dir)) => dir,
            (Some(_), Some(_)) => bail!("both '{}' and '{}' are set", keys::REPO_URL, keys::LOCAL_DIR),
            (None, None) => bail!("neither '{}' nor '{}' is set", keys::REPO_URL, keys::LOCAL_DIR),
        };

        Ok(FetchPrep {
            source,
            request: FetchRequest {
                include_patterns: ctx.get(keys::INCLUDE_PATTERNS)?,
                exclude_patterns: ctx.get(keys::EXCLUDE_PATTERNS)?,
                max_file_size: ctx.get(keys::MAX_FILE_SIZE)?,
            },
        })
    }

    async fn exec(&self, prep: &FetchPrep) -> Result<Vec<(String, String)>> {
        info!(source = %prep.source, "fetching source files");
        let files = self.fetcher.fetch(&prep.request).await?;
        if files.is_empty() {
            bail!("no files matched the include/exclude patterns in {}", prep.source);
        }
        info!(count = files.len(), "fetched files");
        Ok(files.into_iter().map(|f| (f.path, f.content)).collect())
    }

    fn post(
        &self,
        ctx: &mut SharedContext,
        _prep: FetchPrep,
        files: Vec<(String, String)>,
    ) -> Result<Action> {
        ctx.insert(keys::FILES, &files)?;
        Ok(Action::DEFAULT)
    }
}
