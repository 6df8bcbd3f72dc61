//! The steps of the rule generation pipeline and the values they exchange
//! through the [`SharedContext`](rulegen_context::SharedContext).

mod create;
mod fetch;
mod identify;
mod interactions;
mod parse;
mod plan;
mod write;

pub use create::{CreateRuleDirectory, ATTRIBUTION, GUIDE_FILE};
pub use fetch::FetchRepo;
pub use identify::IdentifyComponents;
pub use interactions::AnalyzeInteractions;
pub use plan::{PlanOutcome, PlanRuleFiles};
pub use write::{RuleJob, WriteRuleFiles};

use anyhow::{bail, Result};
use rulegen_io::LlmClient;
use serde::{Deserialize, Serialize};

/// Context keys read and written by the pipeline.
pub mod keys {
    pub const PROJECT_NAME: &str = "project_name";
    pub const REPO_URL: &str = "repo_url";
    pub const LOCAL_DIR: &str = "local_dir";
    pub const INCLUDE_PATTERNS: &str = "include_patterns";
    pub const EXCLUDE_PATTERNS: &str = "exclude_patterns";
    pub const MAX_FILE_SIZE: &str = "max_file_size";
    pub const OUTPUT_DIR: &str = "output_dir";
    pub const FILES: &str = "files";
    pub const COMPONENTS: &str = "components";
    pub const INTERACTIONS: &str = "interactions";
    pub const RULE_PLAN: &str = "rule_plan";
    pub const RULE_FILES: &str = "rule_files";
    pub const FINAL_OUTPUT_DIR: &str = "final_output_dir";
}

/// A core abstraction of the crawled project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Component {
    pub name: String,
    pub description: String,
    /// Sorted, de-duplicated indices into the fetched file list.
    pub files: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interaction {
    pub from: usize,
    pub to: usize,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interactions {
    pub summary: String,
    pub details: Vec<Interaction>,
}

/// Front matter of a rule file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleMetadata {
    pub description: String,
    pub globs: String,
    pub always_apply: bool,
}

impl RuleMetadata {
    pub fn front_matter(&self) -> String {
        format!(
            "---\ndescription: {}\nglobs: {}\nalwaysApply: {}\n---\n",
            self.description.trim(),
            self.globs.trim(),
            self.always_apply
        )
    }
}

/// One rule file the write step will produce.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedRule {
    pub filename: String,
    /// Index into the `components` list.
    pub component: usize,
    /// 1-based position in the guide.
    pub chapter: usize,
    pub metadata: RuleMetadata,
}

/// `"Flow Builder"` becomes `"flow_builder.mdc"`.
pub fn rule_filename(name: &str) -> String {
    let stem: String = name
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .flat_map(char::to_lowercase)
        .collect();
    format!("{stem}.mdc")
}

/// `(index, path, content)` for every valid index in `indices`.
pub(crate) fn files_for_indices<'a>(
    files: &'a [(String, String)],
    indices: &[usize],
) -> Vec<(usize, &'a str, &'a str)> {
    indices
        .iter()
        .filter_map(|&i| files.get(i).map(|(path, content)| (i, path.as_str(), content.as_str())))
        .collect()
}

/// The project name becomes a single directory under the output dir.
pub fn check_project_name(name: &str) -> Result<()> {
    if name.is_empty() || name.contains(['/', '\\']) || name.contains("..") {
        bail!("project name '{name}' must be a plain directory name");
    }
    Ok(())
}

/// Sends `prompt` and parses the reply. A reply that does not parse is
/// invalidated in the client, so the next attempt gets a fresh answer
/// instead of a cached one.
async fn ask<T>(
    llm: &dyn LlmClient,
    prompt: &str,
    parse: impl FnOnce(&str) -> Result<T> + Send,
) -> Result<T> {
    let response = llm.complete(prompt).await?;
    let parsed = parse(&response);
    if parsed.is_err() {
        llm.invalidate(prompt).await;
    }
    parsed
}
