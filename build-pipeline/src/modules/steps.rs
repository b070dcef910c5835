// Step Contracts
// Stage-specific traits implemented by runnable steps

use crate::pipeline::results::{
    ArchiveInfo, ArchiveSequenceResults, BuildSequenceResults, SourceSequenceResults,
};
use crate::pipeline::workspace::Workspace;

use std::fmt;
use std::io;
use std::time::Duration;
use thiserror::Error;

/// The four stages of a build, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StageKind {
    Source,
    Build,
    Archive,
    Distribute,
}

impl StageKind {
    pub const ALL: [StageKind; 4] = [
        StageKind::Source,
        StageKind::Build,
        StageKind::Archive,
        StageKind::Distribute,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StageKind::Source => "source",
            StageKind::Build => "build",
            StageKind::Archive => "archive",
            StageKind::Distribute => "distribute",
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Text a step reports on success
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepOutput {
    pub output: String,
}

impl StepOutput {
    pub fn new(output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
        }
    }
}

/// Step failure; the runner records it as the step's diagnostic
#[derive(Debug, Error)]
pub enum StepError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("'{program}' not found on PATH")]
    ToolNotFound { program: String },

    #[error("{program} exited with {}: {stderr}", exit_code.map(|c| format!("code {}", c)).unwrap_or_else(|| "no exit code".to_string()))]
    CommandFailed {
        program: String,
        exit_code: Option<i32>,
        stderr: String,
    },

    #[error("{program} timed out after {timeout:?}")]
    Timeout { program: String, timeout: Duration },

    #[error("{0}")]
    Failed(String),
}

impl StepError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

/// Version-control step run by the source stage
#[async_trait::async_trait]
pub trait SourceStep: Send + Sync {
    fn type_name(&self) -> &str;

    /// Whether the working copy already holds a checkout
    fn is_working_copy_initialized(&self, workspace: &Workspace) -> bool;

    /// Initial checkout into an empty working directory
    async fn download(&self, workspace: &Workspace) -> Result<StepOutput, StepError>;

    /// Bring an existing working copy up to date
    async fn update(&self, workspace: &Workspace) -> Result<StepOutput, StepError>;

    async fn commit_identifier(&self, _workspace: &Workspace) -> Option<String> {
        None
    }
}

#[async_trait::async_trait]
pub trait BuildStep: Send + Sync {
    fn type_name(&self) -> &str;

    async fn execute(
        &self,
        source: &SourceSequenceResults,
        workspace: &Workspace,
    ) -> Result<StepOutput, StepError>;
}

/// Packages build output into the archives directory
#[async_trait::async_trait]
pub trait ArchiveStep: Send + Sync {
    fn type_name(&self) -> &str;

    async fn execute(
        &self,
        build: &BuildSequenceResults,
        workspace: &Workspace,
    ) -> Result<ArchiveInfo, StepError>;
}

#[async_trait::async_trait]
pub trait DistributeStep: Send + Sync {
    fn type_name(&self) -> &str;

    async fn execute(
        &self,
        archive: &ArchiveSequenceResults,
        workspace: &Workspace,
    ) -> Result<StepOutput, StepError>;
}
