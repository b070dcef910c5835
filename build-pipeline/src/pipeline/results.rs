// Pipeline Results
// Per-step and per-stage results threaded through the four build stages

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStatus {
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageStatus {
    Succeeded,
    Failed,
    /// Stopped at a checkpoint between steps
    Cancelled,
}

/// Outcome of one executed step
#[derive(Debug, Clone)]
pub struct StepResult {
    pub step_type: String,
    pub status: StepStatus,
    pub output: String,
    pub error: Option<String>,
    pub duration: Duration,
}

impl StepResult {
    pub fn succeeded(step_type: impl Into<String>, output: impl Into<String>, duration: Duration) -> Self {
        Self {
            step_type: step_type.into(),
            status: StepStatus::Succeeded,
            output: output.into(),
            error: None,
            duration,
        }
    }

    pub fn failed(step_type: impl Into<String>, error: impl Into<String>, duration: Duration) -> Self {
        Self {
            step_type: step_type.into(),
            status: StepStatus::Failed,
            output: String::new(),
            error: Some(error.into()),
            duration,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == StepStatus::Succeeded
    }
}

/// An archive produced by the archive stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveInfo {
    pub archive_file_name: String,
    pub archive_path: PathBuf,
}

/// Steps and status shared by every stage result
#[derive(Debug, Clone)]
pub struct SequenceResults {
    pub status: StageStatus,
    pub step_results: Vec<StepResult>,
    pub duration: Duration,
}

impl SequenceResults {
    pub fn is_success(&self) -> bool {
        self.status == StageStatus::Succeeded
    }

    /// The first failing step's diagnostic, if any
    pub fn failure(&self) -> Option<&StepResult> {
        self.step_results.iter().find(|r| !r.is_success())
    }
}

#[derive(Debug, Clone)]
pub struct SourceSequenceResults {
    pub sequence: SequenceResults,
    pub commit_identifier: Option<String>,
}

#[derive(Debug, Clone)]
pub struct BuildSequenceResults {
    pub sequence: SequenceResults,
}

#[derive(Debug, Clone)]
pub struct ArchiveSequenceResults {
    pub sequence: SequenceResults,
    pub archives: Vec<ArchiveInfo>,
}

#[derive(Debug, Clone)]
pub struct DistributeSequenceResults {
    pub sequence: SequenceResults,
}

/// Chained results of one build; a stage that never ran stays `None`
#[derive(Debug, Clone, Default)]
pub struct StageResults {
    pub source: Option<Arc<SourceSequenceResults>>,
    pub build: Option<Arc<BuildSequenceResults>>,
    pub archive: Option<Arc<ArchiveSequenceResults>>,
    pub distribute: Option<Arc<DistributeSequenceResults>>,
}

impl StageResults {
    /// Sequences of the stages that ran, in stage order
    pub fn sequences(&self) -> Vec<&SequenceResults> {
        let mut sequences = Vec::new();
        if let Some(source) = &self.source {
            sequences.push(&source.sequence);
        }
        if let Some(build) = &self.build {
            sequences.push(&build.sequence);
        }
        if let Some(archive) = &self.archive {
            sequences.push(&archive.sequence);
        }
        if let Some(distribute) = &self.distribute {
            sequences.push(&distribute.sequence);
        }
        sequences
    }

    /// Diagnostic of the first failed step across all stages
    pub fn first_failure(&self) -> Option<&StepResult> {
        self.sequences().into_iter().find_map(SequenceResults::failure)
    }
}
