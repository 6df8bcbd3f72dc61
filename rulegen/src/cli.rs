use crate::config::{RulegenConfig, RunSettings, Source};
use crate::nodes::check_project_name;
use anyhow::{bail, Context, Result};
use clap::{ArgGroup, Parser};
use std::path::PathBuf;

/// Generate AI coding-agent rule files for a code repository.
#[derive(Debug, Parser)]
#[command(name = "rulegen", version, about)]
#[command(group(ArgGroup::new("source").required(true).args(["repo", "dir"])))]
pub struct Cli {
    /// URL of a public GitHub repository.
    #[arg(long)]
    pub repo: Option<String>,

    /// Path to a local directory.
    #[arg(long)]
    pub dir: Option<PathBuf>,

    /// Project name; derived from the repository or directory when omitted.
    #[arg(short, long)]
    pub name: Option<String>,

    /// GitHub personal access token.
    #[arg(short, long, env = "GITHUB_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Base output directory [default: output].
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Include file patterns (e.g. '*.rs' '*.py'); replaces the defaults.
    #[arg(short, long, num_args = 1..)]
    pub include: Vec<String>,

    /// Exclude file patterns (e.g. 'tests/*' 'docs/*'); replaces the defaults.
    #[arg(short, long, num_args = 1..)]
    pub exclude: Vec<String>,

    /// Maximum file size in bytes [default: 100000].
    #[arg(short = 's', long)]
    pub max_size: Option<u64>,

    /// YAML file with defaults for every option above.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Always call the language model, bypassing the response cache.
    #[arg(long)]
    pub no_cache: bool,

    /// Number of rule files written concurrently.
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Emit logs as JSON lines.
    #[arg(long)]
    pub log_json: bool,
}

impl Cli {
    /// Merges the command line over the config file over built-in defaults.
    pub fn into_settings(self) -> Result<RunSettings> {
        let config = match &self.config {
            Some(path) => RulegenConfig::from_yaml_file(path)?,
            None => RulegenConfig::default(),
        };

        let source = match (self.repo, self.dir) {
            (Some(url), None) => Source::Repo {
                url,
                token: self.token,
            },
            (None, Some(dir)) => Source::Dir(dir),
            _ => bail!("exactly one of --repo or --dir is required"),
        };

        let write_concurrency = self.concurrency.unwrap_or(config.write_concurrency);
        if write_concurrency == 0 {
            bail!("--concurrency must be at least 1");
        }

        let max_file_size = self.max_size.unwrap_or(config.max_file_size);
        if max_file_size == 0 {
            bail!("--max-size must be greater than zero");
        }

        let project_name = self.name.unwrap_or_else(|| source.project_name());
        check_project_name(&project_name).context("invalid --name")?;

        Ok(RunSettings {
            project_name,
            source,
            include_patterns: non_empty_or(self.include, config.include_patterns),
            exclude_patterns: non_empty_or(self.exclude, config.exclude_patterns),
            max_file_size,
            output_dir: self.output.unwrap_or(config.output_dir),
            model: config.llm.model,
            cache_file: config.llm.cache_file,
            use_cache: config.llm.use_cache && !self.no_cache,
            retry: config.retry.to_retry_config(),
            write_concurrency,
        })
    }
}

fn non_empty_or(cli: Vec<String>, fallback: Vec<String>) -> Vec<String> {
    if cli.is_empty() {
        fallback
    } else {
        cli
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_EXCLUDE_PATTERNS;

    fn parse(args: &[&str]) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("rulegen").chain(args.iter().copied()))
    }

    #[test]
    fn test_exactly_one_source() {
        assert!(parse(&[]).is_err());
        assert!(parse(&["--repo", "https://github.com/o/p", "--dir", "."]).is_err());
        assert!(parse(&["--dir", "."]).is_ok());
    }

    #[test]
    fn test_cli_overrides_defaults() {
        let settings = parse(&[
            "--dir", "/tmp/demo", "-n", "Demo", "-i", "*.rs", "*.toml", "-s", "2048", "--no-cache",
        ])
        .unwrap()
        .into_settings()
        .unwrap();

        assert_eq!(settings.project_name, "Demo");
        assert_eq!(settings.include_patterns, vec!["*.rs", "*.toml"]);
        assert_eq!(settings.exclude_patterns.len(), DEFAULT_EXCLUDE_PATTERNS.len());
        assert_eq!(settings.max_file_size, 2048);
        assert_eq!(settings.output_dir, PathBuf::from("output"));
        assert!(!settings.use_cache);
        assert_eq!(settings.write_concurrency, 1);
    }

    #[test]
    fn test_config_file_sits_under_cli() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rulegen.yaml");
        std::fs::write(&path, "max_file_size: 10\noutput_dir: rules\nwrite_concurrency: 3\n").unwrap();
        let config = path.to_str().unwrap();

        let settings = parse(&["--dir", ".", "--config", config, "-o", "elsewhere"])
            .unwrap()
            .into_settings()
            .unwrap();

        assert_eq!(settings.max_file_size, 10);
        assert_eq!(settings.output_dir, PathBuf::from("elsewhere"));
        assert_eq!(settings.write_concurrency, 3);
    }

    #[test]
    fn test_zero_concurrency_is_rejected() {
        let cli = parse(&["--dir", ".", "--concurrency", "0"]).unwrap();
        assert!(cli.into_settings().is_err());
    }

    #[test]
    fn test_project_name_cannot_leave_output_dir() {
        for name in ["../x", "/abs", "a/b"] {
            let cli = parse(&["--dir", ".", "-n", name]).unwrap();
            let err = cli.into_settings().unwrap_err();
            assert!(format!("{err:#}").contains("plain directory name"), "{name}");
        }
    }
}
