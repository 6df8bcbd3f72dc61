use super::parse::{parse_bounded_index, parse_yaml};
use super::{ask, keys, rule_filename, Component, Interactions, PlannedRule, RuleMetadata, GUIDE_FILE};
use anyhow::{bail, Context, Result};
use rulegen_core::prelude::*;
use rulegen_io::LlmClient;
use std::collections::HashSet;
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::{info, warn};

/// Outcome of [`PlanRuleFiles`]: `Empty` when there was nothing to plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanOutcome {
    Planned,
    Empty,
}

impl From<PlanOutcome> for Action {
    fn from(outcome: PlanOutcome) -> Self {
        match outcome {
            PlanOutcome::Planned => Action::DEFAULT,
            PlanOutcome::Empty => Action::from_static("empty"),
        }
    }
}

/// Orders the components into chapters and stores one `rule_plan` entry
/// per chapter. When the model never returns a usable ordering the
/// components keep their identification order.
pub struct PlanRuleFiles {
    llm: Arc<dyn LlmClient>,
}

impl PlanRuleFiles {
    pub fn new(llm: Arc<dyn LlmClient>) -> Self {
        Self { llm }
    }
}

pub struct PlanPrep {
    project_name: String,
    components: Vec<Component>,
    listing: String,
    context: String,
}

#[async_trait]
impl Node for PlanRuleFiles {
    type Prep = PlanPrep;
    type Exec = Vec<usize>;

    fn prep(&self, ctx: &SharedContext) -> Result<PlanPrep> {
        let components: Vec<Component> = ctx.get(keys::COMPONENTS)?;
        let interactions: Interactions = ctx.get(keys::INTERACTIONS)?;

        let mut listing = String::new();
        for (i, component) in components.iter().enumerate() {
            let _ = writeln!(listing, "- {i} # {}", component.name);
        }

        let mut context = format!(
            "Project Summary:\n{}\n\nRelationships (indices refer to the abstractions above):\n",
            interactions.summary
        );
        for rel in &interactions.details {
            let name = |i: usize| components.get(i).map_or("?", |c| c.name.as_str());
            let _ = writeln!(
                context,
                "- From {} ({}) to {} ({}): {}",
                rel.from,
                name(rel.from),
                rel.to,
                name(rel.to),
                rel.label
            );
        }

        Ok(PlanPrep {
            project_name: ctx.get(keys::PROJECT_NAME)?,
            components,
            listing,
            context,
        })
    }

    async fn exec(&self, prep: &PlanPrep) -> Result<Vec<usize>> {
        if prep.components.is_empty() {
            return Ok(Vec::new());
        }
        info!(project = %prep.project_name, "ordering rule files");
        let order = ask(&*self.llm, &prompt(prep), |response| {
            parse_order(response, prep.components.len())
        })
        .await?;
        info!(?order, "rule file order");
        Ok(order)
    }

    fn exec_fallback(&self, prep: &PlanPrep, error: anyhow::Error) -> Result<Vec<usize>> {
        warn!(error = %format!("{error:#}"), "keeping identification order for rule files");
        Ok((0..prep.components.len()).collect())
    }

    fn post(&self, ctx: &mut SharedContext, prep: PlanPrep, order: Vec<usize>) -> Result<Action> {
        let plan = build_plan(&prep.project_name, &prep.components, &order);
        ctx.insert(keys::RULE_PLAN, &plan)?;

        let outcome = if plan.is_empty() {
            warn!("no components identified, nothing to write");
            PlanOutcome::Empty
        } else {
            PlanOutcome::Planned
        };
        Ok(outcome.into())
    }
}

fn prompt(prep: &PlanPrep) -> String {
    format!(
        r#"Given the following abstractions and their relationships in the project `{project}`:

Abstractions (Index # Name):
{listing}
Context about relationships and the project summary:
{context}
If you were writing a guide to `{project}`, in which order should these abstractions be explained, from first to last?
Start with the most important or foundational ones, such as user-facing concepts or entry points, then move on to lower-level implementation details and supporting concepts.

Output the ordered list of abstraction indices with the name in a comment, as `idx # AbstractionName`:

```yaml
- 2 # FoundationalConcept
- 0 # CoreClassA
- 1 # CoreClassB
```

Now, provide the YAML output:
"#,
        project = prep.project_name,
        listing = prep.listing,
        context = prep.context,
    )
}

/// Accepts only a permutation of `0..count`.
fn parse_order(response: &str, count: usize) -> Result<Vec<usize>> {
    let raw: Vec<serde_yaml::Value> =
        parse_yaml(response).context("expected a YAML list of abstraction indices")?;

    let mut seen = HashSet::new();
    let mut order = Vec::with_capacity(raw.len());
    for value in &raw {
        let index = parse_bounded_index(value, count, "abstraction")?;
        if !seen.insert(index) {
            bail!("duplicate index {index} in ordered list");
        }
        order.push(index);
    }

    if order.len() != count {
        let missing: Vec<usize> = (0..count).filter(|i| !seen.contains(i)).collect();
        bail!(
            "ordered list has {} entries but there are {count} abstractions (missing {missing:?})",
            order.len()
        );
    }
    Ok(order)
}

/// One entry per ordered component. File names are unique and never
/// collide with the guide.
fn build_plan(project_name: &str, components: &[Component], order: &[usize]) -> Vec<PlannedRule> {
    let mut taken: HashSet<String> = HashSet::from([GUIDE_FILE.to_string()]);

    order
        .iter()
        .filter_map(|&index| components.get(index).map(|c| (index, c)))
        .enumerate()
        .map(|(position, (index, component))| {
            let mut filename = rule_filename(&component.name);
            let mut suffix = 2;
            while taken.contains(&filename) {
                filename = rule_filename(&format!("{}_{suffix}", component.name));
                suffix += 1;
            }
            taken.insert(filename.clone());

            PlannedRule {
                filename,
                component: index,
                chapter: position + 1,
                metadata: RuleMetadata {
                    description: format!("{} in {project_name}", component.name),
                    globs: String::new(),
                    always_apply: false,
                },
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn component(name: &str) -> Component {
        Component {
            name: name.to_string(),
            description: format!("{name} description"),
            files: vec![],
        }
    }

    #[test]
    fn test_parse_order_accepts_permutation() {
        let response = "```yaml\n- 2 # C\n- 0 # A\n- '1 # B'\n```";
        assert_eq!(parse_order(response, 3).unwrap(), vec![2, 0, 1]);
    }

    #[test]
    fn test_parse_order_rejects_bad_lists() {
        assert!(parse_order("```yaml\n- 0\n- 0\n```", 2).is_err());
        assert!(parse_order("```yaml\n- 0\n```", 2).is_err());
        assert!(parse_order("```yaml\n- 0\n- 7\n```", 2).is_err());
    }

    #[test]
    fn test_build_plan_dedups_filenames() {
        let components = vec![component("Flow"), component("flow"), component("Guide")];
        let plan = build_plan("demo", &components, &[1, 0, 2]);

        let names: Vec<&str> = plan.iter().map(|p| p.filename.as_str()).collect();
        assert_eq!(names, vec!["flow.mdc", "flow_2.mdc", "guide_2.mdc"]);
        assert_eq!(plan[0].component, 1);
        assert_eq!(plan[2].chapter, 3);
    }

    #[test]
    fn test_fallback_keeps_identification_order() {
        struct Never;
        #[async_trait]
        impl LlmClient for Never {
            async fn complete(&self, _: &str) -> Result<String, rulegen_io::LlmError> {
                Err(rulegen_io::LlmError::EmptyResponse)
            }
        }

        let node = PlanRuleFiles::new(Arc::new(Never));
        let prep = PlanPrep {
            project_name: "demo".to_string(),
            components: vec![component("A"), component("B")],
            listing: String::new(),
            context: String::new(),
        };
        let order = node.exec_fallback(&prep, anyhow::anyhow!("bad yaml")).unwrap();
        assert_eq!(order, vec![0, 1]);
    }

    #[test]
    fn test_empty_outcome_label() {
        assert_eq!(Action::from(PlanOutcome::Empty).as_str(), "empty");
        assert!(Action::from(PlanOutcome::Planned).is_default());
    }
}
