use super::parse::parse_yaml;
use super::{ask, files_for_indices, keys, Component, PlannedRule, RuleMetadata};
use anyhow::{bail, Context, Result};
use rulegen_core::prelude::*;
use rulegen_io::LlmClient;
use serde::Deserialize;
use serde_yaml::Value;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::info;

/// Everything needed to write one rule file, independent of its siblings.
#[derive(Debug, Clone)]
pub struct RuleJob {
    pub rule: PlannedRule,
    pub component: Component,
    pub project_name: String,
    /// `(path, content)` of the files the component references.
    pub related_files: Vec<(String, String)>,
    /// Markdown links to every planned rule, in chapter order.
    pub chapter_listing: String,
    /// `(name, filename)` of the neighbouring chapters.
    pub previous: Option<(String, String)>,
    pub next: Option<(String, String)>,
}

/// Writes one rule file per `rule_plan` entry and stores them as the
/// `rule_files` map (`filename -> content`).
pub struct WriteRuleFiles {
    llm: Arc<dyn LlmClient>,
}

impl WriteRuleFiles {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }
}

#[derive(Deserialize)]
struct RawRule {
    description: String,
    #[serde(default)]
    globs: Value,
    #[serde(rename = "alwaysApply")]
    always_apply: bool,
    content: String,
}

#[async_trait]
impl BatchNode for WriteRuleFiles {
    type Item = RuleJob;
    type Output = String;

    fn prep(&self, ctx: &SharedContext) -> Result<Vec<RuleJob>> {
        let plan: Vec<PlannedRule> = ctx.get(keys::RULE_PLAN)?;
        let components: Vec<Component> = ctx.get(keys::COMPONENTS)?;
        let files: Vec<(String, String)> = ctx.get(keys::FILES)?;
        let project_name: String = ctx.get(keys::PROJECT_NAME)?;

        let component_of = |rule: &PlannedRule| {
            components
                .get(rule.component)
                .with_context(|| format!("plan entry {} refers to unknown component {}", rule.filename, rule.component))
        };

        let mut chapter_listing = String::new();
        for rule in &plan {
            let _ = writeln!(chapter_listing, "[{}]({})", component_of(rule)?.name, rule.filename);
        }

        let neighbour = |rule: Option<&PlannedRule>| -> Result<Option<(String, String)>> {
            rule.map(|rule| -> Result<(String, String)> {
                Ok((component_of(rule)?.name.clone(), rule.filename.clone()))
            })
            .transpose()
        };

        let mut jobs = Vec::with_capacity(plan.len());
        for (position, rule) in plan.iter().enumerate() {
            let component = component_of(rule)?.clone();
            let related_files = files_for_indices(&files, &component.files)
                .into_iter()
                .map(|(_, path, content)| (path.to_string(), content.to_string()))
                .collect();
            jobs.push(RuleJob {
                rule: rule.clone(),
                component,
                project_name: project_name.clone(),
                related_files,
                chapter_listing: chapter_listing.clone(),
                previous: neighbour(position.checked_sub(1).and_then(|p| plan.get(p)))?,
                next: neighbour(plan.get(position + 1))?,
            });
        }

        info!(count = jobs.len(), "preparing rule files");
        Ok(jobs)
    }

    async fn exec_item(&self, job: &RuleJob) -> Result<String> {
        info!(chapter = job.rule.chapter, component = %job.component.name, "writing rule file");
        ask(&*self.llm, &prompt(job), |response| render_rule(job, response)).await
    }

    fn post(
        &self,
        ctx: &mut SharedContext,
        results: Vec<(RuleJob, String)>,
    ) -> Result<Action> {
        let expected = results.len();
        let rule_files: BTreeMap<String, String> = results
            .into_iter()
            .map(|(job, content)| (job.rule.filename, content))
            .collect();
        if rule_files.len() != expected {
            bail!("rule plan contains duplicate file names");
        }

        info!(count = rule_files.len(), "rule files written");
        ctx.insert(keys::RULE_FILES, &rule_files)?;
        Ok(Action::DEFAULT)
    }
}

fn prompt(job: &RuleJob) -> String {
    let chapter = job.rule.chapter;
    let name = &job.component.name;

    let mut code = String::new();
    for (path, content) in &job.related_files {
        let _ = write!(code, "--- File: {path} ---\n{content}\n\n");
    }
    if code.is_empty() {
        code.push_str("No specific code snippets provided for this abstraction.\n");
    }

    let transition = match &job.previous {
        Some((prev_name, prev_file)) => format!(
            "- Begin with a brief transition from the previous chapter, [{prev_name}]({prev_file})."
        ),
        None => "- This is the first chapter.".to_string(),
    };
    let closing = match &job.next {
        Some((next_name, next_file)) => format!(
            "- End with a short conclusion that leads to the next chapter, [{next_name}]({next_file})."
        ),
        None => "- End with a short conclusion summarizing the guide.".to_string(),
    };

    format!(
        r#"Write a technical guide chapter that teaches a coding AI agent the concept "{name}" in the project `{project}`. This is Chapter {chapter}.

Concept details:
- Name: {name}
- Description:
{description}

Complete guide structure:
{listing}
Relevant code (keep it unchanged):
{code}
Instructions:
- Output YAML with the metadata keys `description`, `globs` and `alwaysApply` plus the Markdown chapter in `content`:

```yaml
description: "A 10-15 word description naming the project and the concepts in this chapter. The agent decides when to consult the chapter from it."
globs: Empty, or a single glob pattern for a very specific abstraction such as a single class in one file.
alwaysApply: false unless this abstraction is central to the whole project.
content: |
  Full chapter in Markdown.
```

- Start `content` with the heading `# Chapter {chapter}: {name}`.
{transition}
- Motivate the abstraction with the technical problem it solves, then walk through a central use case.
- Break complex abstractions into key concepts and explain them one by one with example inputs and outputs.
- Keep every code block under 20 lines and follow each with a short explanation.
- Describe what happens under the hood, referring to the files above.
- Link other chapters with Markdown links taken from the guide structure.
{closing}

Now provide the YAML output for this chapter.
"#,
        project = job.project_name,
        description = job.component.description,
        listing = job.chapter_listing,
    )
}

/// Normalizes the model's answer and prepends the front matter.
fn render_rule(job: &RuleJob, response: &str) -> Result<String> {
    let raw: RawRule = parse_yaml(response)
        .context("expected YAML with description, globs, alwaysApply and content")?;

    let description = match raw.description.trim() {
        "" => job.rule.metadata.description.clone(),
        text => text.to_string(),
    };
    let metadata = RuleMetadata {
        description,
        globs: normalize_globs(&raw.globs)?,
        always_apply: raw.always_apply,
    };

    let content = with_heading(&raw.content, job.rule.chapter, &job.component.name);
    Ok(format!("{}{content}", metadata.front_matter()))
}

fn normalize_globs(globs: &Value) -> Result<String> {
    match globs {
        Value::Null => Ok(String::new()),
        Value::String(s) => Ok(s.trim().to_string()),
        Value::Sequence(items) => {
            let patterns = items
                .iter()
                .map(|item| -> Result<&str> {
                    match item {
                        Value::String(s) => Ok(s.trim()),
                        other => bail!("glob {other:?} is not a string"),
                    }
                })
                .collect::<Result<Vec<_>>>()?;
            Ok(patterns.join(","))
        }
        other => bail!("globs {other:?} is neither a string nor a list"),
    }
}

/// Makes sure the content opens with `# Chapter n: Name`, replacing a
/// different first heading.
fn with_heading(content: &str, chapter: usize, name: &str) -> String {
    let content = content.trim();
    let heading = format!("# Chapter {chapter}: {name}");
    if content.starts_with(&format!("# Chapter {chapter}")) {
        return content.to_string();
    }
    match content.split_once('\n') {
        Some((first, rest)) if first.trim_start().starts_with('#') => format!("{heading}\n{rest}"),
        None if content.starts_with('#') => heading,
        _ => format!("{heading}\n\n{content}"),
    }
}
