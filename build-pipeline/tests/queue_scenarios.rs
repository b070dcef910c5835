//! End-to-end queue and runner scenarios using in-test step modules.

use build_pipeline::pipeline::results::{ArchiveInfo, BuildSequenceResults, SourceSequenceResults};
use build_pipeline::{
    ArchiveStep, BuildId, BuildQueue, BuildResult, BuildStatus, BuildStep, ConfigResolver,
    DocumentFormat, Module, ModuleConfig, PipelineRunner, ProjectConfig, QueueConfig,
    SourceStep, StepConfig, StepError, StepOutput, StepRegistry, TargetConfig, Workspace,
};

use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

type Journal = Arc<Mutex<Vec<String>>>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct CheckoutConfig {}

impl ModuleConfig for CheckoutConfig {
    const TYPE_NAME: &'static str = "Checkout";
}

struct CheckoutModule;

impl Module for CheckoutModule {
    type Config = CheckoutConfig;
    type Step = dyn SourceStep;

    fn create_step(&self, _config: &CheckoutConfig, _workspace: &Workspace) -> Box<dyn SourceStep> {
        Box::new(CheckoutStep)
    }
}

struct CheckoutStep;

#[async_trait::async_trait]
impl SourceStep for CheckoutStep {
    fn type_name(&self) -> &str {
        "Checkout"
    }

    fn is_working_copy_initialized(&self, _workspace: &Workspace) -> bool {
        false
    }

    async fn download(&self, _workspace: &Workspace) -> Result<StepOutput, StepError> {
        Ok(StepOutput::new("checked out"))
    }

    async fn update(&self, _workspace: &Workspace) -> Result<StepOutput, StepError> {
        Ok(StepOutput::new("updated"))
    }

    async fn commit_identifier(&self, _workspace: &Workspace) -> Option<String> {
        Some("abc1234".to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct ProbeConfig {
    label: String,
    #[serde(default)]
    fail: bool,
    #[serde(default)]
    delay_ms: u64,
}

impl ModuleConfig for ProbeConfig {
    const TYPE_NAME: &'static str = "Probe";
}

struct ProbeModule {
    journal: Journal,
}

impl Module for ProbeModule {
    type Config = ProbeConfig;
    type Step = dyn BuildStep;

    fn create_step(&self, config: &ProbeConfig, _workspace: &Workspace) -> Box<dyn BuildStep> {
        Box::new(ProbeStep {
            config: config.clone(),
            journal: self.journal.clone(),
        })
    }
}

struct ProbeStep {
    config: ProbeConfig,
    journal: Journal,
}

#[async_trait::async_trait]
impl BuildStep for ProbeStep {
    fn type_name(&self) -> &str {
        "Probe"
    }

    async fn execute(
        &self,
        source: &SourceSequenceResults,
        _workspace: &Workspace,
    ) -> Result<StepOutput, StepError> {
        assert_eq!(source.commit_identifier.as_deref(), Some("abc1234"));
        self.journal
            .lock()
            .unwrap()
            .push(format!("start:{}", self.config.label));
        tokio::time::sleep(Duration::from_millis(self.config.delay_ms)).await;
        self.journal
            .lock()
            .unwrap()
            .push(format!("end:{}", self.config.label));

        if self.config.fail {
            Err(StepError::failed(format!("{} failed", self.config.label)))
        } else {
            Ok(StepOutput::new(self.config.label.clone()))
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct MarkerConfig {}

impl ModuleConfig for MarkerConfig {
    const TYPE_NAME: &'static str = "Marker";
}

struct MarkerModule {
    journal: Journal,
}

impl Module for MarkerModule {
    type Config = MarkerConfig;
    type Step = dyn ArchiveStep;

    fn create_step(&self, _config: &MarkerConfig, _workspace: &Workspace) -> Box<dyn ArchiveStep> {
        Box::new(MarkerStep {
            journal: self.journal.clone(),
        })
    }
}

struct MarkerStep {
    journal: Journal,
}

#[async_trait::async_trait]
impl ArchiveStep for MarkerStep {
    fn type_name(&self) -> &str {
        "Marker"
    }

    async fn execute(
        &self,
        _build: &BuildSequenceResults,
        workspace: &Workspace,
    ) -> Result<ArchiveInfo, StepError> {
        self.journal.lock().unwrap().push("archive".to_string());
        Ok(ArchiveInfo {
            archive_file_name: "marker".to_string(),
            archive_path: workspace.archives_directory.join("marker"),
        })
    }
}

/// Probe module registered under a second name, claiming the same configs
struct ShadowProbeModule;

impl Module for ShadowProbeModule {
    type Config = ProbeConfig;
    type Step = dyn BuildStep;

    fn name(&self) -> &str {
        "Shadow Probe"
    }

    fn create_step(&self, config: &ProbeConfig, _workspace: &Workspace) -> Box<dyn BuildStep> {
        Box::new(ProbeStep {
            config: config.clone(),
            journal: Journal::default(),
        })
    }
}

struct Harness {
    _temp: TempDir,
    journal: Journal,
    queue: BuildQueue,
}

impl Harness {
    fn new() -> Self {
        Self::with_registry(|registry, _| registry)
    }

    fn with_registry(customize: impl FnOnce(StepRegistry, Journal) -> StepRegistry) -> Self {
        let temp = TempDir::new().unwrap();
        let journal = Journal::default();
        let registry = StepRegistry::new()
            .with_module(CheckoutModule)
            .with_module(ProbeModule {
                journal: journal.clone(),
            })
            .with_module(MarkerModule {
                journal: journal.clone(),
            });
        let registry = customize(registry, journal.clone());

        let queue = BuildQueue::with_runner(
            PipelineRunner::new(Arc::new(registry)),
            QueueConfig::new(temp.path().join("out")).with_poll_interval(Duration::from_millis(10)),
        );
        queue.start_queue().unwrap();

        Self {
            _temp: temp,
            journal,
            queue,
        }
    }

    fn journal(&self) -> Vec<String> {
        self.journal.lock().unwrap().clone()
    }

    async fn wait(&self, id: BuildId) -> BuildResult {
        for _ in 0..1000 {
            let result = self.queue.get_build_result(id).await.unwrap();
            if result.status.is_terminal() {
                return result;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("build {} did not finish", id);
    }
}

fn probe(label: &str) -> StepConfig {
    probe_with(label, false, 0)
}

fn probe_with(label: &str, fail: bool, delay_ms: u64) -> StepConfig {
    StepConfig::new(ProbeConfig {
        label: label.to_string(),
        fail,
        delay_ms,
    })
    .unwrap()
}

fn project(name: &str, build_steps: Vec<StepConfig>, archive: bool) -> ProjectConfig {
    let mut target = TargetConfig::new("main", StepConfig::new(CheckoutConfig {}).unwrap());
    for step in build_steps {
        target = target.with_build_step(step);
    }
    if archive {
        target = target.with_archive_step(StepConfig::new(MarkerConfig {}).unwrap());
    }
    ProjectConfig::new(name).with_target(target)
}

#[tokio::test]
async fn test_single_succeeding_step() {
    let harness = Harness::new();
    let build = harness
        .queue
        .enqueue_build(project("one", vec![probe("a")], false), None)
        .await;

    let result = harness.wait(build.id).await;
    assert_eq!(result.status, BuildStatus::Succeeded);
    assert_eq!(result.stages.build.unwrap().sequence.step_results.len(), 1);
    assert_eq!(
        result.stages.source.unwrap().commit_identifier.as_deref(),
        Some("abc1234")
    );
}

#[tokio::test]
async fn test_sole_failing_step_records_no_archive_results() {
    let harness = Harness::new();
    let build = harness
        .queue
        .enqueue_build(project("fails", vec![probe_with("a", true, 0)], true), None)
        .await;

    let result = harness.wait(build.id).await;
    assert_eq!(result.status, BuildStatus::Failed);
    assert!(result.stages.archive.is_none());
    assert!(result.error.unwrap().contains("a failed"));
    assert!(!harness.journal().contains(&"archive".to_string()));
}

#[tokio::test]
async fn test_fail_fast_stops_at_failing_step() {
    let harness = Harness::new();
    let steps = vec![probe("a"), probe_with("b", true, 0), probe("c")];
    let build = harness
        .queue
        .enqueue_build(project("ff", steps, true), None)
        .await;

    harness.wait(build.id).await;
    assert_eq!(harness.journal(), vec!["start:a", "end:a", "start:b", "end:b"]);
}

#[tokio::test]
async fn test_single_active_build_and_fifo_order() {
    let harness = Harness::new();
    let mut ids = Vec::new();
    for label in ["first", "second", "third"] {
        let build = harness
            .queue
            .enqueue_build(project(label, vec![probe_with(label, false, 20)], false), None)
            .await;
        ids.push(build.id);
    }

    let first = harness.wait(ids[0]).await;
    let second = harness.wait(ids[1]).await;
    harness.wait(ids[2]).await;

    assert_eq!(
        harness.journal(),
        vec![
            "start:first",
            "end:first",
            "start:second",
            "end:second",
            "start:third",
            "end:third"
        ]
    );
    assert!(first.finished_at.unwrap() <= second.started_at.unwrap());
}

#[tokio::test]
async fn test_cancel_before_dispatch() {
    let harness = Harness::new();
    let slow = harness
        .queue
        .enqueue_build(project("slow", vec![probe_with("slow", false, 100)], false), None)
        .await;
    let doomed = harness
        .queue
        .enqueue_build(project("doomed", vec![probe("doomed")], false), None)
        .await;

    let snapshot = harness.queue.cancel_build(doomed.id).await.unwrap();
    assert_eq!(snapshot.status, BuildStatus::Cancelled);

    harness.wait(slow.id).await;
    tokio::time::sleep(Duration::from_millis(50)).await;

    let doomed = harness.queue.get_build_result(doomed.id).await.unwrap();
    assert_eq!(doomed.status, BuildStatus::Cancelled);
    assert!(doomed.stages.source.is_none());
    assert!(!harness.journal().iter().any(|line| line.contains("doomed")));
}

#[tokio::test]
async fn test_cancel_running_build_between_steps() {
    let harness = Harness::new();
    let steps = vec![probe_with("long", false, 150), probe("after")];
    let build = harness
        .queue
        .enqueue_build(project("cancel", steps, true), None)
        .await;

    while !harness.journal().contains(&"start:long".to_string()) {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    harness.queue.cancel_build(build.id).await.unwrap();

    let result = harness.wait(build.id).await;
    assert_eq!(result.status, BuildStatus::Cancelled);
    assert_eq!(harness.journal(), vec!["start:long", "end:long"]);
    assert!(result.stages.archive.is_none());
}

#[tokio::test]
async fn test_ambiguous_modules_fail_the_build() {
    let harness = Harness::with_registry(|registry, _| registry.with_module(ShadowProbeModule));
    let build = harness
        .queue
        .enqueue_build(project("ambiguous", vec![probe("a")], false), None)
        .await;

    let result = harness.wait(build.id).await;
    assert_eq!(result.status, BuildStatus::Failed);
    assert!(result.error.unwrap().contains("Shadow Probe"));
    assert!(result.stages.source.is_none());
    assert!(harness.journal().is_empty());
}

#[tokio::test]
async fn test_unknown_target_is_recorded() {
    let harness = Harness::new();
    let build = harness
        .queue
        .enqueue_build(project("p", vec![probe("a")], false), Some("nope".to_string()))
        .await;

    let result = harness.wait(build.id).await;
    assert_eq!(result.status, BuildStatus::Failed);
    assert!(result.error.unwrap().contains("nope"));
    assert!(harness.journal().is_empty());
}

#[test]
fn test_custom_module_config_round_trip() {
    let registry = StepRegistry::new()
        .with_module(CheckoutModule)
        .with_module(ProbeModule {
            journal: Journal::default(),
        })
        .with_module(MarkerModule {
            journal: Journal::default(),
        });
    let project = project("round", vec![probe("a"), probe_with("b", true, 5)], true);
    let resolver = ConfigResolver::new(&registry);

    for format in [DocumentFormat::Json, DocumentFormat::Yaml] {
        let document = ConfigResolver::to_document(&project, format).unwrap();
        assert_eq!(resolver.load(&document, format).unwrap(), project);
    }
}
