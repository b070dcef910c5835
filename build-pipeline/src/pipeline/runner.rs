// Pipeline Runner
// Runs the source, build, archive and distribute stages of one target

use crate::config::{ProjectConfig, TargetConfig};
use crate::error::{PipelineError, PipelineResult};
use crate::modules::registry::StepRegistry;
use crate::modules::steps::{
    ArchiveStep, BuildStep, DistributeStep, SourceStep, StageKind, StepError,
};
use crate::pipeline::cancellation::CancelSignal;
use crate::pipeline::events::{BuildEvent, EventSender, ProgressSender};
use crate::pipeline::results::{
    ArchiveSequenceResults, BuildSequenceResults, DistributeSequenceResults, SequenceResults,
    SourceSequenceResults, StageResults, StageStatus, StepResult, StepStatus,
};
use crate::pipeline::workspace::{BuildInfo, Workspace};
use crate::queue::BuildStatus;

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Outcome of running one target
#[derive(Debug, Clone)]
pub struct PipelineRun {
    pub project_name: String,
    pub target_name: String,
    /// Always terminal
    pub status: BuildStatus,
    pub results: StageResults,
    /// Diagnostic of the failing step
    pub error: Option<String>,
    pub duration: Duration,
}

/// Something that can run a build for the queue
#[async_trait::async_trait]
pub trait Builder: Send + Sync {
    async fn build(
        &self,
        project: &ProjectConfig,
        target_name: Option<&str>,
        output_root: &Path,
        cancel: &CancelSignal,
    ) -> PipelineResult<PipelineRun>;
}

/// Steps instantiated for one target
struct TargetSteps {
    source: Box<dyn SourceStep>,
    build: Vec<Box<dyn BuildStep>>,
    archive: Vec<Box<dyn ArchiveStep>>,
    distribute: Vec<Box<dyn DistributeStep>>,
}

/// Collects step results for one stage and reports its progress
struct StageRecorder<'w> {
    stage: StageKind,
    workspace: &'w Workspace,
    started: Instant,
    step_results: Vec<StepResult>,
}

impl<'w> StageRecorder<'w> {
    fn begin(stage: StageKind, total_steps: usize, workspace: &'w Workspace) -> Self {
        tracing::info!(stage = %stage, steps = total_steps, "stage started");
        workspace.emit(BuildEvent::stage_started(stage, total_steps));
        Self {
            stage,
            workspace,
            started: Instant::now(),
            step_results: Vec::with_capacity(total_steps),
        }
    }

    fn step_started(&self, index: usize, step_type: &str) -> Instant {
        tracing::debug!(stage = %self.stage, step = step_type, index, "step started");
        self.workspace
            .emit(BuildEvent::step_started(self.stage, step_type, index));
        Instant::now()
    }

    /// Record a step outcome; returns whether the step succeeded
    fn record(
        &mut self,
        index: usize,
        step_type: &str,
        started: Instant,
        outcome: Result<String, StepError>,
    ) -> bool {
        let duration = started.elapsed();
        let result = match outcome {
            Ok(output) => StepResult::succeeded(step_type, output, duration),
            Err(err) => {
                tracing::warn!(stage = %self.stage, step = step_type, index, error = %err, "step failed");
                StepResult::failed(step_type, err.to_string(), duration)
            }
        };
        let status = result.status;

        self.workspace.emit(BuildEvent::step_completed(
            self.stage, step_type, index, status, duration,
        ));
        self.step_results.push(result);
        status == StepStatus::Succeeded
    }

    fn finish(self, status: StageStatus) -> SequenceResults {
        let duration = self.started.elapsed();
        tracing::info!(stage = %self.stage, status = ?status, ?duration, "stage finished");
        self.workspace
            .emit(BuildEvent::stage_completed(self.stage, status, duration));
        SequenceResults {
            status,
            step_results: self.step_results,
            duration,
        }
    }
}

/// Runs builds against a step registry
#[derive(Clone)]
pub struct PipelineRunner {
    registry: Arc<StepRegistry>,
    event_tx: Option<ProgressSender>,
}

impl PipelineRunner {
    pub fn new(registry: Arc<StepRegistry>) -> Self {
        Self {
            registry,
            event_tx: None,
        }
    }

    /// Set progress event sender
    pub fn with_progress(mut self, tx: ProgressSender) -> Self {
        self.event_tx = Some(tx);
        self
    }

    pub fn registry(&self) -> &Arc<StepRegistry> {
        &self.registry
    }

    /// Pick the named target, or the first target when no name is given
    pub fn select_target<'p>(
        project: &'p ProjectConfig,
        target_name: Option<&str>,
    ) -> PipelineResult<&'p TargetConfig> {
        match target_name.filter(|name| !name.is_empty()) {
            Some(name) => project
                .target(name)
                .ok_or_else(|| PipelineError::TargetNotFound {
                    project: project.project_name.clone(),
                    target: name.to_string(),
                }),
            None => project
                .default_target()
                .ok_or_else(|| PipelineError::NoTargets(project.project_name.clone())),
        }
    }

    /// Run one target of `project` under `output_root`.
    ///
    /// Errors are returned only when no stage could run; step failures and
    /// cancellation are reported through the returned status.
    pub async fn run(
        &self,
        project: &ProjectConfig,
        target_name: Option<&str>,
        output_root: &Path,
        cancel: &CancelSignal,
    ) -> PipelineResult<PipelineRun> {
        let target = Self::select_target(project, target_name)?;
        let started = Instant::now();

        let mut workspace = Workspace::for_target(
            output_root,
            BuildInfo::new(&project.project_name, &target.target_name),
        )
        .with_progress(self.event_tx.clone());

        // Resolution errors are configuration defects: fail before touching disk
        let steps = self.instantiate(target, &workspace)?;
        workspace.initialize_directories()?;

        tracing::info!(
            project = %project.project_name,
            target = %target.target_name,
            "build started"
        );
        self.event_tx.send_event(BuildEvent::BuildStarted {
            project_name: project.project_name.clone(),
            target_name: target.target_name.clone(),
        });

        let mut results = StageResults::default();
        let status = self
            .run_stages(&steps, &mut workspace, cancel, &mut results)
            .await;
        let duration = started.elapsed();

        tracing::info!(
            project = %project.project_name,
            target = %target.target_name,
            status = %status,
            ?duration,
            "build finished"
        );
        self.event_tx.send_event(BuildEvent::BuildCompleted {
            project_name: project.project_name.clone(),
            target_name: target.target_name.clone(),
            status,
            duration,
        });

        let error = results
            .first_failure()
            .and_then(|step| {
                step.error
                    .as_ref()
                    .map(|e| format!("{} step failed: {}", step.step_type, e))
            });

        Ok(PipelineRun {
            project_name: project.project_name.clone(),
            target_name: target.target_name.clone(),
            status,
            results,
            error,
            duration,
        })
    }

    fn instantiate(&self, target: &TargetConfig, workspace: &Workspace) -> PipelineResult<TargetSteps> {
        let registry = &self.registry;
        Ok(TargetSteps {
            source: registry.create_step::<dyn SourceStep>(&target.source, workspace)?,
            build: target
                .build_steps
                .iter()
                .map(|c| registry.create_step::<dyn BuildStep>(c, workspace))
                .collect::<Result<_, _>>()?,
            archive: target
                .archive_steps
                .iter()
                .map(|c| registry.create_step::<dyn ArchiveStep>(c, workspace))
                .collect::<Result<_, _>>()?,
            distribute: target
                .distribute_steps
                .iter()
                .map(|c| registry.create_step::<dyn DistributeStep>(c, workspace))
                .collect::<Result<_, _>>()?,
        })
    }

    async fn run_stages(
        &self,
        steps: &TargetSteps,
        workspace: &mut Workspace,
        cancel: &CancelSignal,
        results: &mut StageResults,
    ) -> BuildStatus {
        // Source
        if cancel.is_cancelled() {
            return self.skip_from(StageKind::Source, BuildStatus::Cancelled);
        }
        let source = Arc::new(self.run_source(steps.source.as_ref(), workspace).await);
        results.source = Some(Arc::clone(&source));
        if let Some(status) = stage_outcome(&source.sequence) {
            return self.skip_from(StageKind::Build, status);
        }
        workspace.set_commit_identifier(source.commit_identifier.clone());
        let workspace: &Workspace = workspace;

        // Build
        if cancel.is_cancelled() {
            return self.skip_from(StageKind::Build, BuildStatus::Cancelled);
        }
        let mut stage = StageRecorder::begin(StageKind::Build, steps.build.len(), workspace);
        let mut status = StageStatus::Succeeded;
        for (index, step) in steps.build.iter().enumerate() {
            if index > 0 && cancel.is_cancelled() {
                status = StageStatus::Cancelled;
                break;
            }
            let started = stage.step_started(index, step.type_name());
            let outcome = step.execute(&source, workspace).await.map(|o| o.output);
            if !stage.record(index, step.type_name(), started, outcome) {
                status = StageStatus::Failed;
                break;
            }
        }
        let build = Arc::new(BuildSequenceResults {
            sequence: stage.finish(status),
        });
        results.build = Some(Arc::clone(&build));
        if let Some(status) = stage_outcome(&build.sequence) {
            return self.skip_from(StageKind::Archive, status);
        }

        // Archive
        if cancel.is_cancelled() {
            return self.skip_from(StageKind::Archive, BuildStatus::Cancelled);
        }
        let mut stage = StageRecorder::begin(StageKind::Archive, steps.archive.len(), workspace);
        let mut status = StageStatus::Succeeded;
        let mut archives = Vec::new();
        for (index, step) in steps.archive.iter().enumerate() {
            if index > 0 && cancel.is_cancelled() {
                status = StageStatus::Cancelled;
                break;
            }
            let started = stage.step_started(index, step.type_name());
            let outcome = match step.execute(&build, workspace).await {
                Ok(info) => {
                    let output = format!("archived {}", info.archive_path.display());
                    archives.push(info);
                    Ok(output)
                }
                Err(err) => Err(err),
            };
            if !stage.record(index, step.type_name(), started, outcome) {
                status = StageStatus::Failed;
                break;
            }
        }
        let archive = Arc::new(ArchiveSequenceResults {
            sequence: stage.finish(status),
            archives,
        });
        results.archive = Some(Arc::clone(&archive));
        if let Some(status) = stage_outcome(&archive.sequence) {
            return self.skip_from(StageKind::Distribute, status);
        }

        // Distribute
        if cancel.is_cancelled() {
            return self.skip_from(StageKind::Distribute, BuildStatus::Cancelled);
        }
        let mut stage =
            StageRecorder::begin(StageKind::Distribute, steps.distribute.len(), workspace);
        let mut status = StageStatus::Succeeded;
        for (index, step) in steps.distribute.iter().enumerate() {
            if index > 0 && cancel.is_cancelled() {
                status = StageStatus::Cancelled;
                break;
            }
            let started = stage.step_started(index, step.type_name());
            let outcome = step.execute(&archive, workspace).await.map(|o| o.output);
            if !stage.record(index, step.type_name(), started, outcome) {
                status = StageStatus::Failed;
                break;
            }
        }
        let distribute = Arc::new(DistributeSequenceResults {
            sequence: stage.finish(status),
        });
        results.distribute = Some(Arc::clone(&distribute));

        stage_outcome(&distribute.sequence).unwrap_or(BuildStatus::Succeeded)
    }

    /// Checkout or update, then read the commit identifier
    async fn run_source(&self, step: &dyn SourceStep, workspace: &Workspace) -> SourceSequenceResults {
        let mut stage = StageRecorder::begin(StageKind::Source, 1, workspace);
        let started = stage.step_started(0, step.type_name());

        let outcome = if step.is_working_copy_initialized(workspace) {
            tracing::debug!(step = step.type_name(), "updating working copy");
            step.update(workspace).await
        } else {
            tracing::debug!(step = step.type_name(), "downloading working copy");
            step.download(workspace).await
        };
        let succeeded = stage.record(0, step.type_name(), started, outcome.map(|o| o.output));

        let commit_identifier = if succeeded {
            step.commit_identifier(workspace).await
        } else {
            None
        };
        let status = if succeeded {
            StageStatus::Succeeded
        } else {
            StageStatus::Failed
        };

        SourceSequenceResults {
            sequence: stage.finish(status),
            commit_identifier,
        }
    }

    /// Report `first` and every later stage as skipped
    fn skip_from(&self, first: StageKind, status: BuildStatus) -> BuildStatus {
        let reason = match status {
            BuildStatus::Cancelled => "build cancelled",
            _ => "an earlier stage failed",
        };
        for stage in StageKind::ALL.into_iter().skip_while(|s| *s != first) {
            tracing::debug!(stage = %stage, reason, "stage skipped");
            self.event_tx.send_event(BuildEvent::stage_skipped(stage, reason));
        }
        status
    }
}

/// Build status implied by a stage that did not succeed
fn stage_outcome(sequence: &SequenceResults) -> Option<BuildStatus> {
    match sequence.status {
        StageStatus::Succeeded => None,
        StageStatus::Failed => Some(BuildStatus::Failed),
        StageStatus::Cancelled => Some(BuildStatus::Cancelled),
    }
}

#[async_trait::async_trait]
impl Builder for PipelineRunner {
    async fn build(
        &self,
        project: &ProjectConfig,
        target_name: Option<&str>,
        output_root: &Path,
        cancel: &CancelSignal,
    ) -> PipelineResult<PipelineRun> {
        self.run(project, target_name, output_root, cancel).await
    }
}
