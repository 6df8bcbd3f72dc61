use super::parse::{parse_bounded_index, parse_yaml};
use super::{ask, keys, Component};
use anyhow::{Context, Result};
use rulegen_core::prelude::*;
use rulegen_io::LlmClient;
use serde::Deserialize;
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::info;

/// Asks the model for the project's core abstractions and stores them as
/// `components`.
pub struct IdentifyComponents {
    llm: Arc<dyn LlmClient>,
}

impl IdentifyComponents {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }
}

pub struct IdentifyPrep {
    project_name: String,
    codebase: String,
    file_listing: String,
    file_count: usize,
}

#[derive(Deserialize)]
struct RawComponent {
    name: String,
    description: String,
    file_indices: Vec<serde_yaml::Value>,
}

#[async_trait]
impl Node for IdentifyComponents {
    type Prep = IdentifyPrep;
    type Exec = Vec<Component>;

    fn prep(&self, ctx: &SharedContext) -> Result<IdentifyPrep> {
        let files: Vec<(String, String)> = ctx.get(keys::FILES)?;

        let mut codebase = String::new();
        let mut file_listing = String::new();
        for (i, (path, content)) in files.iter().enumerate() {
            let _ = write!(codebase, "--- File Index {i}: {path} ---\n{content}\n\n");
            let _ = writeln!(file_listing, "- {i} # {path}");
        }

        Ok(IdentifyPrep {
            project_name: ctx.get(keys::PROJECT_NAME)?,
            codebase,
            file_listing,
            file_count: files.len(),
        })
    }

    async fn exec(&self, prep: &IdentifyPrep) -> Result<Vec<Component>> {
        info!(project = %prep.project_name, "identifying components");
        let components = ask(&*self.llm, &prompt(prep), |response| {
            parse_components(response, prep.file_count)
        })
        .await?;
        info!(count = components.len(), "identified components");
        Ok(components)
    }

    fn post(
        &self,
        ctx: &mut SharedContext,
        _prep: IdentifyPrep,
        components: Vec<Component>,
    ) -> Result<Action> {
        ctx.insert(keys::COMPONENTS, &components)?;
        Ok(Action::DEFAULT)
    }
}

fn prompt(prep: &IdentifyPrep) -> String {
    format!(
        r#"For the project `{project}`:

Codebase Context:
{codebase}
Analyze the codebase context and identify the 5-10 most important core abstractions an AI coding agent new to this codebase needs to understand.

For each abstraction, provide:
1. A concise `name`.
2. A knowledge-dense `description` of about 200 words: what it does, when to use it, which problems it solves and which software engineering concepts (design patterns, data structures, algorithms) it relies on.
3. The relevant `file_indices`, written as `idx # path`.

Files present in the context:
{listing}
Format the output as a YAML list:

```yaml
- name: |
    Flow
  description: |
    Connects steps into a directed graph and drives them to completion.
  file_indices:
    - 0 # src/flow.rs
    - 3 # src/builder.rs
```"#,
        project = prep.project_name,
        codebase = prep.codebase,
        listing = prep.file_listing,
    )
}

fn parse_components(response: &str, file_count: usize) -> Result<Vec<Component>> {
    let raw: Vec<RawComponent> =
        parse_yaml(response).context("expected a YAML list of {name, description, file_indices}")?;

    raw.into_iter()
        .map(|item| {
            let name = item.name.trim().to_string();
            let mut files = item
                .file_indices
                .iter()
                .map(|value| parse_bounded_index(value, file_count, "file"))
                .collect::<Result<Vec<_>>>()
                .with_context(|| format!("invalid file_indices for component '{name}'"))?;
            files.sort_unstable();
            files.dedup();
            Ok(Component {
                name,
                description: item.description.trim().to_string(),
                files,
            })
        })
        .collect()
}
