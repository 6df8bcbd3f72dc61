//! Run configuration: an optional YAML file merged under the command line.

use anyhow::{bail, Context, Result};
use rulegen_core::{RetryConfig, RetryStrategy};
use rulegen_io::GithubRepo;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_INCLUDE_PATTERNS: &[&str] = &[
    "*.rs", "*.py", "*.js", "*.jsx", "*.ts", "*.tsx", "*.go", "*.java", "*.pyi", "*.pyx",
    "*.c", "*.cc", "*.cpp", "*.h", "*.md", "*.rst", "Dockerfile", "Makefile", "*.yaml",
    "*.yml", "*.toml",
];

pub const DEFAULT_EXCLUDE_PATTERNS: &[&str] = &[
    "assets/*", "data/*", "examples/*", "images/*", "public/*", "static/*", "temp/*",
    "docs/*", "venv/*", ".venv/*", "*test*", "tests/*", "v1/*", "dist/*", "build/*",
    "target/*", "experimental/*", "deprecated/*", "misc/*", "legacy/*", ".git/*",
    ".github/*", ".next/*", ".vscode/*", "obj/*", "bin/*", "node_modules/*", "*.log",
];

pub const DEFAULT_MAX_FILE_SIZE: u64 = 100_000;

/// Contents of a `--config` YAML file. Every field is optional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RulegenConfig {
    pub include_patterns: Vec<String>,
    pub exclude_patterns: Vec<String>,
    pub max_file_size: u64,
    pub output_dir: PathBuf,
    pub llm: LlmSettings,
    /// Retry policy of the steps that call the language model.
    pub retry: RetrySettings,
    /// Rule files written at once; `1` writes them one after another.
    pub write_concurrency: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LlmSettings {
    /// Overrides `GEMINI_MODEL`.
    pub model: Option<String>,
    pub cache_file: PathBuf,
    pub use_cache: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetrySettings {
    pub max_retries: u32,
    pub wait_secs: f64,
    /// Multiply the wait by this factor after every failed attempt.
    pub backoff_multiplier: Option<f64>,
}

impl Default for RulegenConfig {
    fn default() -> Self {
        Self {
            include_patterns: to_strings(DEFAULT_INCLUDE_PATTERNS),
            exclude_patterns: to_strings(DEFAULT_EXCLUDE_PATTERNS),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            output_dir: PathBuf::from("output"),
            llm: LlmSettings::default(),
            retry: RetrySettings::default(),
            write_concurrency: 1,
        }
    }
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            model: None,
            cache_file: PathBuf::from("llm_cache.json"),
            use_cache: true,
        }
    }
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: 5,
            wait_secs: 20.0,
            backoff_multiplier: None,
        }
    }
}

impl RetrySettings {
    pub fn to_retry_config(&self) -> RetryConfig {
        let wait = Duration::try_from_secs_f64(self.wait_secs).unwrap_or(Duration::MAX);
        let config = RetryConfig::new(self.max_retries, wait);
        match self.backoff_multiplier {
            Some(multiplier) => config.with_strategy(RetryStrategy::Exponential { multiplier }),
            None => config,
        }
    }
}

impl RulegenConfig {
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;
        Self::from_yaml_str(&content)
            .with_context(|| format!("Invalid config file: {:?}", path.as_ref()))
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        // An empty document means "all defaults".
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self =
            serde_yaml::from_str(content).context("Failed to parse YAML content")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_file_size == 0 {
            bail!("max_file_size must be greater than zero");
        }
        if self.write_concurrency == 0 {
            bail!("write_concurrency must be at least 1");
        }
        if Duration::try_from_secs_f64(self.retry.wait_secs).is_err() {
            bail!("retry.wait_secs must be a non-negative number of seconds that fits a duration");
        }
        if let Some(multiplier) = self.retry.backoff_multiplier {
            if !multiplier.is_finite() || multiplier < 1.0 {
                bail!("retry.backoff_multiplier must be at least 1.0");
            }
        }
        for pattern in self.include_patterns.iter().chain(&self.exclude_patterns) {
            glob::Pattern::new(pattern)
                .with_context(|| format!("invalid glob pattern '{pattern}'"))?;
        }
        Ok(())
    }
}

/// Where the sources come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    Repo { url: String, token: Option<String> },
    Dir(PathBuf),
}

impl Source {
    /// Last URL segment without `.git`, or the directory's base name.
    pub fn project_name(&self) -> String {
        match self {
            Source::Repo { url, .. } => GithubRepo::parse(url)
                .map(|repo| repo.name)
                .unwrap_or_else(|_| {
                    url.trim_end_matches('/')
                        .rsplit('/')
                        .next()
                        .unwrap_or(url)
                        .trim_end_matches(".git")
                        .to_string()
                }),
            Source::Dir(dir) => {
                let dir = dir.canonicalize().unwrap_or_else(|_| dir.clone());
                dir.file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "project".to_string())
            }
        }
    }
}

/// Fully resolved settings of one run.
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub source: Source,
    pub project_name: String,
    pub include_patterns: Vec<String>,
    pub exclude_patterns: Vec<String>,
    pub max_file_size: u64,
    pub output_dir: PathBuf,
    pub model: Option<String>,
    pub cache_file: PathBuf,
    pub use_cache: bool,
    pub retry: RetryConfig,
    pub write_concurrency: usize,
}

fn to_strings(patterns: &[&str]) -> Vec<String> {
    patterns.iter().map(|p| p.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config = RulegenConfig::from_yaml_str(
            "max_file_size: 5000\nllm:\n  use_cache: false\nretry:\n  max_retries: 2\n  wait_secs: 0.5\n",
        )
        .unwrap();

        assert_eq!(config.max_file_size, 5000);
        assert!(!config.llm.use_cache);
        assert_eq!(config.llm.cache_file, PathBuf::from("llm_cache.json"));
        assert_eq!(config.include_patterns, to_strings(DEFAULT_INCLUDE_PATTERNS));
        assert_eq!(
            config.retry.to_retry_config(),
            RetryConfig::new(2, Duration::from_millis(500))
        );
    }

    #[test]
    fn test_empty_file_is_default() {
        assert_eq!(RulegenConfig::from_yaml_str("").unwrap(), RulegenConfig::default());
    }

    #[test]
    fn test_validation_errors() {
        assert!(RulegenConfig::from_yaml_str("write_concurrency: 0").is_err());
        assert!(RulegenConfig::from_yaml_str("include_patterns: ['[']").is_err());
        assert!(RulegenConfig::from_yaml_str("retry:\n  wait_secs: -1").is_err());
        assert!(RulegenConfig::from_yaml_str("unknown_key: 1").is_err());
    }

    #[test]
    fn test_oversized_wait_is_rejected() {
        let err = RulegenConfig::from_yaml_str("retry:\n  wait_secs: 1.0e+30\n").unwrap_err();
        assert!(format!("{err:#}").contains("retry.wait_secs"));

        // built by hand, bypassing validation
        let settings = RetrySettings {
            max_retries: 3,
            wait_secs: 1.0e30,
            backoff_multiplier: Some(2.0),
        };
        let retry = settings.to_retry_config();
        assert_eq!(retry.wait, Duration::MAX);
        assert_eq!(retry.delay_for(70), Duration::MAX);
    }

    #[test]
    fn test_project_name_derivation() {
        let repo = |url: &str| Source::Repo {
            url: url.to_string(),
            token: None,
        };
        assert_eq!(repo("https://github.com/owner/flowkit.git").project_name(), "flowkit");
        assert_eq!(repo("https://github.com/owner/flowkit/tree/main/src").project_name(), "flowkit");
        assert_eq!(repo("https://example.com/x/other.git").project_name(), "other");
        assert_eq!(Source::Dir(PathBuf::from("/tmp/some-project")).project_name(), "some-project");
    }

    #[test]
    fn test_config_file_round_trip_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rulegen.yaml");
        fs::write(&path, "output_dir: rules\nwrite_concurrency: 4\n").unwrap();

        let config = RulegenConfig::from_yaml_file(&path).unwrap();
        assert_eq!(config.output_dir, PathBuf::from("rules"));
        assert_eq!(config.write_concurrency, 4);

        let missing = RulegenConfig::from_yaml_file(dir.path().join("absent.yaml"));
        assert!(format!("{:#}", missing.unwrap_err()).contains("Failed to read config file"));
    }
}
