//! Wiring of the rule generation flow.

use crate::config::{RunSettings, Source};
use crate::nodes::{
    keys, AnalyzeInteractions, CreateRuleDirectory, FetchRepo, IdentifyComponents,
    PlanRuleFiles, WriteRuleFiles,
};
use anyhow::{Context, Result};
use rulegen_core::prelude::*;
use rulegen_io::{
    CachedLlm, GeminiClient, GeminiConfig, GithubCrawler, LlmClient, LocalCrawler, SourceFetcher,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Applied to every step that calls the language model.
    pub llm_retry: RetryConfig,
    pub write_concurrency: usize,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            llm_retry: RetryConfig::default(),
            write_concurrency: 1,
        }
    }
}

/// `fetch -> analysis (identify -> interactions -> plan) -> write -> create`
///
/// `plan` answers `"empty"` when there is nothing to write; that action has
/// no edge, so the run stops before `write`.
pub fn build_flow(
    fetcher: Arc<dyn SourceFetcher>,
    llm: Arc<dyn LlmClient>,
    options: &PipelineOptions,
) -> Result<Flow, BuildError> {
    let analysis = FlowBuilder::new("analysis")
        .step(
            NodeStep::new("identify", IdentifyComponents::new(llm.clone()))
                .with_retry(options.llm_retry.clone()),
        )
        .step(
            NodeStep::new("interactions", AnalyzeInteractions::new(llm.clone()))
                .with_retry(options.llm_retry.clone()),
        )
        .step(
            NodeStep::new("plan", PlanRuleFiles::new(llm.clone()))
                .with_retry(options.llm_retry.clone()),
        )
        .then("identify", "interactions")
        .then("interactions", "plan")
        .build()?;

    let write = BatchStep::new("write", WriteRuleFiles::new(llm))
        .with_retry(options.llm_retry.clone());
    let write = match options.write_concurrency {
        0 | 1 => write.sequential(),
        limit => write.parallel(limit),
    };

    FlowBuilder::new("rulegen")
        .step(NodeStep::new("fetch", FetchRepo::new(fetcher)))
        .step(analysis)
        .step(write)
        .step(NodeStep::new("create", CreateRuleDirectory))
        .then("fetch", "analysis")
        .then("analysis", "write")
        .then("write", "create")
        .build()
}

/// Context holding the inputs the first steps read.
pub fn initial_context(settings: &RunSettings) -> Result<SharedContext> {
    let mut ctx = SharedContext::default();
    match &settings.source {
        Source::Repo { url, .. } => ctx.insert(keys::REPO_URL, url)?,
        Source::Dir(dir) => ctx.insert(keys::LOCAL_DIR, dir)?,
    }
    ctx.insert(keys::PROJECT_NAME, &settings.project_name)?;
    ctx.insert(keys::INCLUDE_PATTERNS, &settings.include_patterns)?;
    ctx.insert(keys::EXCLUDE_PATTERNS, &settings.exclude_patterns)?;
    ctx.insert(keys::MAX_FILE_SIZE, &settings.max_file_size)?;
    ctx.insert(keys::OUTPUT_DIR, &settings.output_dir)?;
    Ok(ctx)
}

/// Crawler for the configured source and the cached Gemini client.
pub fn default_collaborators(
    settings: &RunSettings,
) -> Result<(Arc<dyn SourceFetcher>, Arc<dyn LlmClient>)> {
    let fetcher: Arc<dyn SourceFetcher> = match &settings.source {
        Source::Repo { url, token } => Arc::new(GithubCrawler::from_url(url, token.clone())?),
        Source::Dir(dir) => Arc::new(LocalCrawler::new(dir)),
    };

    let mut gemini = GeminiConfig::from_env()?;
    if let Some(model) = &settings.model {
        gemini = gemini.with_model(model);
    }
    let llm = CachedLlm::new(GeminiClient::new(gemini), &settings.cache_file)
        .enabled(settings.use_cache);

    Ok((fetcher, Arc::new(llm)))
}

/// Runs the whole pipeline. Returns the rule directory, or `None` when no
/// component was identified and nothing was written.
pub async fn run(
    settings: &RunSettings,
    fetcher: Arc<dyn SourceFetcher>,
    llm: Arc<dyn LlmClient>,
) -> Result<Option<PathBuf>> {
    let options = PipelineOptions {
        llm_retry: settings.retry.clone(),
        write_concurrency: settings.write_concurrency,
    };
    let flow = build_flow(fetcher, llm, &options).context("invalid pipeline wiring")?;
    let mut ctx = initial_context(settings)?;

    info!(project = %settings.project_name, trace_id = %ctx.trace_id, "starting rule generation");
    let result = flow.run(&mut ctx).await;
    ctx.print_summary();
    let action = result?;

    let output = ctx.get_opt::<PathBuf>(keys::FINAL_OUTPUT_DIR)?;
    info!(action = %action, output = ?output, "rule generation finished");
    Ok(output)
}
