use super::{check_project_name, keys, Component, Interactions, PlannedRule, RuleMetadata};
use anyhow::{bail, Result};
use rulegen_core::prelude::*;
use rulegen_io::write_rule_directory;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::PathBuf;
use tracing::info;

pub const GUIDE_FILE: &str = "guide.mdc";
pub const ATTRIBUTION: &str =
    "Generated by [Rules for AI](https://github.com/altaidevorg/rules-for-ai)";

/// Renders `guide.mdc`, stamps every rule with the attribution footer and
/// writes the whole set into `<output_dir>/<project_name>`.
pub struct CreateRuleDirectory;

#[derive(Debug)]
pub struct CreatePrep {
    output_path: PathBuf,
    files: BTreeMap<String, String>,
}

#[async_trait]
impl Node for CreateRuleDirectory {
    type Prep = CreatePrep;
    type Exec = PathBuf;

    fn prep(&self, ctx: &SharedContext) -> Result<CreatePrep> {
        let project_name: String = ctx.get(keys::PROJECT_NAME)?;
        check_project_name(&project_name)?;
        let output_dir: String = ctx.get(keys::OUTPUT_DIR)?;
        let interactions: Interactions = ctx.get(keys::INTERACTIONS)?;
        let components: Vec<Component> = ctx.get(keys::COMPONENTS)?;
        let plan: Vec<PlannedRule> = ctx.get(keys::RULE_PLAN)?;
        let rule_files: BTreeMap<String, String> = ctx.get(keys::RULE_FILES)?;
        let source = match ctx.get_opt::<String>(keys::REPO_URL)? {
            Some(url) => url,
            None => ctx.get(keys::LOCAL_DIR)?,
        };

        let mut guide = RuleMetadata {
            description: format!("Guidelines for using {project_name}"),
            globs: String::new(),
            always_apply: true,
        }
        .front_matter();
        let _ = write!(
            guide,
            "{}\n\n**Source Repository:** [{source}]({source})\n\n## Chapters\n\n",
            interactions.summary
        );

        let mut files = BTreeMap::new();
        for rule in &plan {
            let Some(content) = rule_files.get(&rule.filename) else {
                bail!("no content was written for planned rule {}", rule.filename);
            };
            let name = components
                .get(rule.component)
                .map_or(rule.filename.as_str(), |c| c.name.as_str());
            let _ = writeln!(guide, "[{name}]({})", rule.filename);
            files.insert(rule.filename.clone(), with_attribution(content));
        }
        guide.push_str("\n\n---\n\n");
        guide.push_str(ATTRIBUTION);
        files.insert(GUIDE_FILE.to_string(), guide);

        Ok(CreatePrep {
            output_path: PathBuf::from(output_dir).join(project_name),
            files,
        })
    }

    async fn exec(&self, prep: &CreatePrep) -> Result<PathBuf> {
        info!(dir = %prep.output_path.display(), files = prep.files.len(), "writing rule directory");
        write_rule_directory(&prep.output_path, &prep.files).await?;
        Ok(prep.output_path.clone())
    }

    fn post(&self, ctx: &mut SharedContext, _prep: CreatePrep, dir: PathBuf) -> Result<Action> {
        info!(dir = %dir.display(), "rule generation complete");
        ctx.insert(keys::FINAL_OUTPUT_DIR, &dir)?;
        Ok(Action::DEFAULT)
    }
}

fn with_attribution(content: &str) -> String {
    let mut content = content.to_string();
    if !content.ends_with("\n\n") {
        content.push_str(if content.ends_with('\n') { "\n" } else { "\n\n" });
    }
    content.push_str("---\n\n");
    content.push_str(ATTRIBUTION);
    content
}
