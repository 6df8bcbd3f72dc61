use super::{FetchError, FetchRequest, PathFilter, SourceFetcher, SourceFile};
use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION, USER_AGENT};
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use tracing::{debug, info};

const DEFAULT_API_BASE: &str = "https://api.github.com";

/// Repository coordinates parsed from a GitHub URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GithubRepo {
    pub owner: String,
    pub name: String,
    /// Branch, tag or commit from a `/tree/<ref>/...` URL.
    pub reference: Option<String>,
    /// Sub-directory from a `/tree/<ref>/<dir>` URL, without slashes at the ends.
    pub subdir: String,
}

impl GithubRepo {
    /// Accepts `https://github.com/owner/repo[.git][/tree/<ref>[/<dir>...]]`.
    pub fn parse(url: &str) -> Result<Self, FetchError> {
        let invalid = || FetchError::InvalidRepoUrl(url.to_string());

        let rest = url
            .trim()
            .trim_start_matches("https://")
            .trim_start_matches("http://")
            .trim_start_matches("www.");
        let rest = rest.strip_prefix("github.com/").ok_or_else(invalid)?;

        let mut segments = rest.trim_end_matches('/').split('/');
        let owner = segments.next().filter(|s| !s.is_empty()).ok_or_else(invalid)?;
        let name = segments
            .next()
            .map(|s| s.trim_end_matches(".git"))
            .filter(|s| !s.is_empty())
            .ok_or_else(invalid)?;

        let (reference, subdir) = match segments.next() {
            None => (None, String::new()),
            Some("tree") => {
                let reference = segments.next().ok_or_else(invalid)?.to_string();
                let subdir = segments.collect::<Vec<_>>().join("/");
                (Some(reference), subdir)
            }
            Some(_) => return Err(invalid()),
        };

        Ok(Self {
            owner: owner.to_string(),
            name: name.to_string(),
            reference,
            subdir,
        })
    }
}

#[derive(Debug, Deserialize)]
struct ContentEntry {
    path: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    size: u64,
    download_url: Option<String>,
}

/// Crawls a GitHub repository through the contents API.
pub struct GithubCrawler {
    http: Client,
    repo: GithubRepo,
    token: Option<String>,
    api_base: String,
}

impl GithubCrawler {
    pub fn new(repo: GithubRepo, token: Option<String>) -> Self {
        Self {
            http: Client::new(),
            repo,
            token,
            api_base: DEFAULT_API_BASE.to_string(),
        }
    }

    pub fn from_url(url: &str, token: Option<String>) -> Result<Self, FetchError> {
        Ok(Self::new(GithubRepo::parse(url)?, token))
    }

    /// Points the crawler at a different API host (GitHub Enterprise).
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    fn request(&self, url: &str) -> RequestBuilder {
        let request = self
            .http
            .get(url)
            .header(USER_AGENT, "rulegen")
            .header(ACCEPT, "application/vnd.github+json");
        match &self.token {
            Some(token) => request.header(AUTHORIZATION, format!("Bearer {token}")),
            None => request,
        }
    }

    async fn get_text(&self, url: &str) -> Result<String, FetchError> {
        let response = self
            .request(url)
            .send()
            .await
            .map_err(|source| FetchError::Http {
                url: url.to_string(),
                source,
            })?;
        let status = response.status();
        let body = response.text().await.map_err(|source| FetchError::Http {
            url: url.to_string(),
            source,
        })?;
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
                body,
            });
        }
        Ok(body)
    }

    async fn list_dir(&self, path: &str) -> Result<Vec<ContentEntry>, FetchError> {
        let mut url = format!(
            "{}/repos/{}/{}/contents/{}",
            self.api_base, self.repo.owner, self.repo.name, path
        );
        if let Some(reference) = &self.repo.reference {
            url.push_str("?ref=");
            url.push_str(reference);
        }
        let body = self.get_text(&url).await?;
        parse_contents(url, &body)
    }

    fn relative<'a>(&self, path: &'a str) -> &'a str {
        if self.repo.subdir.is_empty() {
            return path;
        }
        path.strip_prefix(self.repo.subdir.as_str())
            .map(|rest| rest.trim_start_matches('/'))
            .unwrap_or(path)
    }
}

/// A directory answers with a list of entries, a file path with a single
/// object.
fn parse_contents(url: String, body: &str) -> Result<Vec<ContentEntry>, FetchError> {
    serde_json::from_str::<Vec<ContentEntry>>(body)
        .or_else(|_| serde_json::from_str::<ContentEntry>(body).map(|entry| vec![entry]))
        .map_err(|source| FetchError::Payload { url, source })
}

#[async_trait]
impl SourceFetcher for GithubCrawler {
    async fn fetch(&self, request: &FetchRequest) -> Result<Vec<SourceFile>, FetchError> {
        let filter = PathFilter::new(request)?;
        info!(owner = %self.repo.owner, repo = %self.repo.name, reference = ?self.repo.reference, "crawling GitHub repository");

        let mut pending = vec![self.repo.subdir.clone()];
        let mut files = Vec::new();

        while let Some(dir) = pending.pop() {
            for entry in self.list_dir(&dir).await? {
                let rel_path = self.relative(&entry.path).to_string();
                match entry.kind.as_str() {
                    "dir" => {
                        if !filter.prunes_dir(&rel_path) {
                            pending.push(entry.path);
                        }
                    }
                    "file" => {
                        if !filter.accepts_path(&rel_path) {
                            continue;
                        }
                        if !filter.accepts_size(entry.size) {
                            debug!(path = %rel_path, size = entry.size, "skipping file over size limit");
                            continue;
                        }
                        let Some(download_url) = entry.download_url else {
                            continue;
                        };
                        let content = self.get_text(&download_url).await?;
                        debug!(path = %rel_path, bytes = content.len(), "downloaded");
                        files.push(SourceFile {
                            path: rel_path,
                            content,
                        });
                    }
                    _ => {}
                }
            }
        }

        files.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_url() {
        let repo = GithubRepo::parse("https://github.com/owner/project.git").unwrap();
        assert_eq!(repo.owner, "owner");
        assert_eq!(repo.name, "project");
        assert_eq!(repo.reference, None);
        assert_eq!(repo.subdir, "");
    }

    #[test]
    fn test_parse_tree_url() {
        let repo =
            GithubRepo::parse("https://github.com/owner/project/tree/main/crates/core/").unwrap();
        assert_eq!(repo.reference.as_deref(), Some("main"));
        assert_eq!(repo.subdir, "crates/core");
    }

    #[test]
    fn test_contents_payloads() {
        let listing = r#"[
            {"path": "src", "type": "dir", "download_url": null},
            {"path": "README.md", "type": "file", "size": 12, "download_url": "https://raw/README.md"}
        ]"#;
        let entries = parse_contents("u".to_string(), listing).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].size, 12);

        let single = r#"{"path": "lib.rs", "type": "file", "size": 3, "download_url": "https://raw/lib.rs"}"#;
        assert_eq!(parse_contents("u".to_string(), single).unwrap()[0].path, "lib.rs");

        let err = parse_contents("https://api/x".to_string(), r#"{"message": "rate limited"}"#)
            .unwrap_err();
        assert!(matches!(err, FetchError::Payload { ref url, .. } if url == "https://api/x"));
    }

    #[test]
    fn test_parse_rejects_other_hosts() {
        assert!(GithubRepo::parse("https://gitlab.com/owner/project").is_err());
        assert!(GithubRepo::parse("https://github.com/owner").is_err());
        assert!(GithubRepo::parse("https://github.com/owner/project/blob/main/x.rs").is_err());
    }

    #[test]
    fn test_relative_paths_strip_subdir() {
        let crawler =
            GithubCrawler::from_url("https://github.com/o/p/tree/dev/src", None).unwrap();
        assert_eq!(crawler.relative("src/flow.rs"), "flow.rs");
        assert_eq!(crawler.relative("other/flow.rs"), "other/flow.rs");
    }
}
