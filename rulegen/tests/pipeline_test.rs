use async_trait::async_trait;
use rulegen::config::{RunSettings, Source};
use rulegen::io::{FetchError, FetchRequest, LlmClient, LlmError, SourceFetcher, SourceFile};
use rulegen::nodes::{keys, Component, PlannedRule, RuleMetadata, WriteRuleFiles, ATTRIBUTION, GUIDE_FILE};
use rulegen::pipeline;
use rulegen::prelude::*;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

struct StubFetcher(Vec<(&'static str, &'static str)>);

#[async_trait]
impl SourceFetcher for StubFetcher {
    async fn fetch(&self, _request: &FetchRequest) -> Result<Vec<SourceFile>, FetchError> {
        Ok(self
            .0
            .iter()
            .map(|(path, content)| SourceFile {
                path: path.to_string(),
                content: content.to_string(),
            })
            .collect())
    }
}

const COMPONENTS: &str = "```yaml
- name: Flow
  description: |
    Drives steps through an action graph.
  file_indices:
    - 1 # src/flow.rs
- name: Node
  description: |
    A single step with a three-phase lifecycle.
  file_indices:
    - 0 # src/node.rs
```";

const INTERACTIONS: &str = "```yaml
summary: |
  A tiny **flow** engine.
relationships:
  - from_abstraction: 0 # Flow
    to_abstraction: 1 # Node
    label: Drives
```";

const CHAPTER: &str = "```yaml
description: How the demo engine works
globs: ''
alwaysApply: false
content: |
  Body of the chapter.
```";

/// Answers each pipeline prompt with a canned response.
struct ScriptedLlm {
    components: &'static str,
    order: &'static str,
    chapter: &'static str,
    calls: AtomicU32,
}

impl ScriptedLlm {
    fn new() -> Self {
        Self {
            components: COMPONENTS,
            order: "```yaml\n- 1 # Node\n- 0 # Flow\n```",
            chapter: CHAPTER,
            calls: AtomicU32::new(0),
        }
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn complete(&self, prompt: &str) -> Result<String, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let response = if prompt.starts_with("Write a technical guide chapter") {
            self.chapter
        } else if prompt.contains("in which order should these abstractions be explained") {
            self.order
        } else if prompt.contains("relationships") && prompt.contains("Identified Abstractions") {
            INTERACTIONS
        } else {
            self.components
        };
        Ok(response.to_string())
    }
}

fn settings(output_dir: &Path) -> RunSettings {
    RunSettings {
        source: Source::Dir(PathBuf::from("/src/demo")),
        project_name: "demo".to_string(),
        include_patterns: vec!["*.rs".to_string()],
        exclude_patterns: vec![],
        max_file_size: 100_000,
        output_dir: output_dir.to_path_buf(),
        model: None,
        cache_file: output_dir.join("llm_cache.json"),
        use_cache: false,
        retry: RetryConfig::new(2, Duration::ZERO),
        write_concurrency: 2,
    }
}

fn fetcher() -> Arc<dyn SourceFetcher> {
    Arc::new(StubFetcher(vec![
        ("src/node.rs", "pub trait Node {}"),
        ("src/flow.rs", "pub struct Flow;"),
    ]))
}

#[tokio::test]
async fn pipeline_writes_guide_and_rules() {
    let tmp = tempfile::tempdir().unwrap();
    let llm = Arc::new(ScriptedLlm::new());

    let dir = pipeline::run(&settings(tmp.path()), fetcher(), llm.clone())
        .await
        .unwrap()
        .expect("rules should be written");

    assert_eq!(dir, tmp.path().join("demo"));
    let mut written: Vec<String> = std::fs::read_dir(&dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    written.sort();
    assert_eq!(written, vec!["flow.mdc", "guide.mdc", "node.mdc"]);

    let guide = std::fs::read_to_string(dir.join(GUIDE_FILE)).unwrap();
    assert!(guide.contains("A tiny **flow** engine."));
    assert!(guide.contains("[Node](node.mdc)\n[Flow](flow.mdc)"));

    let node = std::fs::read_to_string(dir.join("node.mdc")).unwrap();
    assert!(node.starts_with("---\ndescription: How the demo engine works\nglobs: \nalwaysApply: false\n---\n# Chapter 1: Node\n"));
    assert!(node.ends_with(ATTRIBUTION));

    // identify, interactions, plan, two chapters
    assert_eq!(llm.calls.load(Ordering::SeqCst), 5);
}

#[tokio::test]
async fn unusable_order_falls_back_to_identification_order() {
    let tmp = tempfile::tempdir().unwrap();
    let mut llm = ScriptedLlm::new();
    llm.order = "```yaml\n- 0 # Flow\n- 0 # Flow\n```";
    let llm = Arc::new(llm);

    let dir = pipeline::run(&settings(tmp.path()), fetcher(), llm.clone())
        .await
        .unwrap()
        .unwrap();

    let guide = std::fs::read_to_string(dir.join(GUIDE_FILE)).unwrap();
    assert!(guide.contains("[Flow](flow.mdc)\n[Node](node.mdc)"));
    // the plan step tried twice before falling back
    assert_eq!(llm.calls.load(Ordering::SeqCst), 6);
}

#[tokio::test]
async fn no_components_ends_run_without_output() {
    let tmp = tempfile::tempdir().unwrap();
    let mut llm = ScriptedLlm::new();
    llm.components = "```yaml\n[]\n```";

    let output = pipeline::run(&settings(tmp.path()), fetcher(), Arc::new(llm))
        .await
        .unwrap();

    assert_eq!(output, None);
    assert!(!tmp.path().join("demo").exists());
}

#[tokio::test]
async fn failed_chapter_leaves_no_files_behind() {
    let tmp = tempfile::tempdir().unwrap();
    let mut llm = ScriptedLlm::new();
    llm.chapter = "I cannot answer in YAML.";

    let err = pipeline::run(&settings(tmp.path()), fetcher(), Arc::new(llm))
        .await
        .unwrap_err();

    let flow_error = err.downcast_ref::<FlowError>().expect("flow error");
    assert!(matches!(flow_error, FlowError::BatchItem { attempts: 2, .. }));
    assert_eq!(flow_error.step(), "write");
    assert!(!tmp.path().join("demo").exists());
}

#[tokio::test]
async fn empty_source_fails_in_fetch() {
    let tmp = tempfile::tempdir().unwrap();
    let err = pipeline::run(
        &settings(tmp.path()),
        Arc::new(StubFetcher(vec![])),
        Arc::new(ScriptedLlm::new()),
    )
    .await
    .unwrap_err();

    let flow_error = err.downcast_ref::<FlowError>().expect("flow error");
    assert_eq!(flow_error.step(), "fetch");
}

#[tokio::test]
async fn every_planned_rule_yields_exactly_one_file() {
    for k in [0usize, 1, 3, 7] {
        let components: Vec<Component> = (0..k)
            .map(|i| Component {
                name: format!("Part {i}"),
                description: format!("Part number {i}"),
                files: vec![0],
            })
            .collect();
        let plan: Vec<PlannedRule> = (0..k)
            .rev()
            .enumerate()
            .map(|(position, index)| PlannedRule {
                filename: format!("part_{index}.mdc"),
                component: index,
                chapter: position + 1,
                metadata: RuleMetadata {
                    description: format!("Part {index}"),
                    globs: String::new(),
                    always_apply: false,
                },
            })
            .collect();

        let mut ctx = SharedContext::default();
        ctx.insert(keys::PROJECT_NAME, "demo").unwrap();
        ctx.insert(keys::FILES, &vec![("src/lib.rs", "pub mod parts;")]).unwrap();
        ctx.insert(keys::COMPONENTS, &components).unwrap();
        ctx.insert(keys::RULE_PLAN, &plan).unwrap();

        let flow = FlowBuilder::new("write_only")
            .step(BatchStep::new("write", WriteRuleFiles::new(Arc::new(ScriptedLlm::new()))).parallel(3))
            .build()
            .unwrap();
        flow.run(&mut ctx).await.unwrap();

        let rule_files: BTreeMap<String, String> = ctx.get(keys::RULE_FILES).unwrap();
        assert_eq!(rule_files.len(), k);
        for rule in &plan {
            let content = &rule_files[&rule.filename];
            assert!(content.contains(&format!("# Chapter {}: Part {}", rule.chapter, rule.component)));
        }
    }
}
