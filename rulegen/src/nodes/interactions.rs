use super::parse::{parse_bounded_index, parse_yaml};
use super::{ask, files_for_indices, keys, Component, Interaction, Interactions};
use anyhow::{Context, Result};
use rulegen_core::prelude::*;
use rulegen_io::LlmClient;
use serde::Deserialize;
use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::info;

/// Asks the model for a project summary and the relationships between
/// components; stores them as `interactions`.
pub struct AnalyzeInteractions {
    llm: Arc<dyn LlmClient>,
}

impl AnalyzeInteractions {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }
}

pub struct InteractionsPrep {
    project_name: String,
    listing: String,
    context: String,
    component_count: usize,
}

#[derive(Deserialize)]
struct RawInteractions {
    summary: String,
    relationships: Vec<RawRelationship>,
}

#[derive(Deserialize)]
struct RawRelationship {
    from_abstraction: serde_yaml::Value,
    to_abstraction: serde_yaml::Value,
    label: String,
}

#[async_trait]
impl Node for AnalyzeInteractions {
    type Prep = InteractionsPrep;
    type Exec = Interactions;

    fn prep(&self, ctx: &SharedContext) -> Result<InteractionsPrep> {
        let components: Vec<Component> = ctx.get(keys::COMPONENTS)?;
        let files: Vec<(String, String)> = ctx.get(keys::FILES)?;

        let mut listing = String::new();
        let mut context = String::from("Identified Abstractions:\n");
        let mut referenced = BTreeSet::new();
        for (i, component) in components.iter().enumerate() {
            let indices = component
                .files
                .iter()
                .map(usize::to_string)
                .collect::<Vec<_>>()
                .join(", ");
            let _ = writeln!(
                context,
                "- Index {i}: {} (Relevant file indices: [{indices}])\n  Description: {}",
                component.name, component.description
            );
            let _ = writeln!(listing, "{i} # {}", component.name);
            referenced.extend(component.files.iter().copied());
        }

        context.push_str("\nRelevant File Snippets (Referenced by Index and Path):\n");
        let referenced: Vec<usize> = referenced.into_iter().collect();
        for (i, path, content) in files_for_indices(&files, &referenced) {
            let _ = write!(context, "--- File: {i} # {path} ---\n{content}\n\n");
        }

        Ok(InteractionsPrep {
            project_name: ctx.get(keys::PROJECT_NAME)?,
            listing,
            context,
            component_count: components.len(),
        })
    }

    async fn exec(&self, prep: &InteractionsPrep) -> Result<Interactions> {
        if prep.component_count == 0 {
            return Ok(Interactions {
                summary: String::new(),
                details: Vec::new(),
            });
        }
        info!(project = %prep.project_name, components = prep.component_count, "analyzing interactions");
        let interactions = ask(&*self.llm, &prompt(prep), |response| {
            parse_interactions(response, prep.component_count)
        })
        .await?;
        info!(relationships = interactions.details.len(), "analyzed interactions");
        Ok(interactions)
    }

    fn post(
        &self,
        ctx: &mut SharedContext,
        _prep: InteractionsPrep,
        interactions: Interactions,
    ) -> Result<Action> {
        ctx.insert(keys::INTERACTIONS, &interactions)?;
        Ok(Action::DEFAULT)
    }
}

fn prompt(prep: &InteractionsPrep) -> String {
    format!(
        r#"Based on the following abstractions and code from the project `{project}`:

Abstraction indices and names:
{listing}
Context (abstractions, descriptions, code):
{context}
Provide:
1. A technical `summary` of the project's purpose and architecture, written like a hand-over document. Use markdown **bold** and *italic* to highlight key concepts.
2. A list of `relationships` between the abstractions. For each one give:
    - `from_abstraction`: source index (e.g. `0 # Flow`)
    - `to_abstraction`: target index (e.g. `1 # Node`)
    - `label`: the interaction in a few words (e.g. "Drives", "Configures", "Uses")
   Prefer relationships backed by one abstraction calling or passing data to another and leave out minor ones.

Every abstraction must appear in at least one relationship.

```yaml
summary: |
  What the project does and how it is built.
relationships:
  - from_abstraction: 0 # Flow
    to_abstraction: 1 # Node
    label: "Drives"
```

Now, provide the YAML output:
"#,
        project = prep.project_name,
        listing = prep.listing,
        context = prep.context,
    )
}

fn parse_interactions(response: &str, component_count: usize) -> Result<Interactions> {
    let raw: RawInteractions =
        parse_yaml(response).context("expected YAML with `summary` and `relationships`")?;

    let details = raw
        .relationships
        .into_iter()
        .map(|rel| {
            Ok(Interaction {
                from: parse_bounded_index(&rel.from_abstraction, component_count, "abstraction")?,
                to: parse_bounded_index(&rel.to_abstraction, component_count, "abstraction")?,
                label: rel.label.trim().to_string(),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(Interactions {
        summary: raw.summary.trim().to_string(),
        details,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_interactions() {
        let response = r#"```yaml
summary: |
  A **flow** engine.
relationships:
  - from_abstraction: 0 # Flow
    to_abstraction: "1 # Node"
    label: Drives
```"#;
        let parsed = parse_interactions(response, 2).unwrap();
        assert_eq!(parsed.summary, "A **flow** engine.");
        assert_eq!(
            parsed.details,
            vec![Interaction {
                from: 0,
                to: 1,
                label: "Drives".to_string()
            }]
        );
    }

    #[test]
    fn test_relationship_out_of_range() {
        let response = "```yaml\nsummary: s\nrelationships:\n  - from_abstraction: 0\n    to_abstraction: 4\n    label: x\n```";
        assert!(parse_interactions(response, 2).is_err());
    }
}
