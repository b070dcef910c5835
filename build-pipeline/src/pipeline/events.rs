// Build Events
// Progress reporting and event types for build execution

use crate::modules::StageKind;
use crate::pipeline::results::{StageStatus, StepStatus};
use crate::queue::{BuildId, BuildStatus};

use std::time::Duration;
use tokio::sync::mpsc;

/// Sender for build progress events
pub type ProgressSender = mpsc::UnboundedSender<BuildEvent>;

/// Receiver for build progress events
pub type ProgressReceiver = mpsc::UnboundedReceiver<BuildEvent>;

/// Create a new progress channel
pub fn progress_channel() -> (ProgressSender, ProgressReceiver) {
    mpsc::unbounded_channel()
}

/// Events emitted while queueing and running builds
#[derive(Debug, Clone)]
pub enum BuildEvent {
    /// Build accepted into a queue
    BuildQueued {
        build_id: BuildId,
        project_name: String,
        target_name: Option<String>,
    },

    /// Pipeline started for a target
    BuildStarted {
        project_name: String,
        target_name: String,
    },

    /// Pipeline finished
    BuildCompleted {
        project_name: String,
        target_name: String,
        status: BuildStatus,
        duration: Duration,
    },

    /// Stage execution started
    StageStarted { stage: StageKind, total_steps: usize },

    /// Stage execution completed
    StageCompleted {
        stage: StageKind,
        status: StageStatus,
        duration: Duration,
    },

    /// Stage not run because an earlier stage failed or the build was cancelled
    StageSkipped { stage: StageKind, reason: String },

    /// Step execution started
    StepStarted {
        stage: StageKind,
        step_type: String,
        step_index: usize,
    },

    /// One line of step output
    StepOutput {
        step_type: String,
        output: String,
        is_error: bool,
    },

    /// Step execution completed
    StepCompleted {
        stage: StageKind,
        step_type: String,
        step_index: usize,
        status: StepStatus,
        duration: Duration,
    },

    /// Log message
    Log { level: LogLevel, message: String },
}

/// Log level for log events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Warning,
    Error,
}

impl BuildEvent {
    pub fn stage_started(stage: StageKind, total_steps: usize) -> Self {
        Self::StageStarted { stage, total_steps }
    }

    pub fn stage_completed(stage: StageKind, status: StageStatus, duration: Duration) -> Self {
        Self::StageCompleted {
            stage,
            status,
            duration,
        }
    }

    pub fn stage_skipped(stage: StageKind, reason: impl Into<String>) -> Self {
        Self::StageSkipped {
            stage,
            reason: reason.into(),
        }
    }

    pub fn step_started(stage: StageKind, step_type: impl Into<String>, step_index: usize) -> Self {
        Self::StepStarted {
            stage,
            step_type: step_type.into(),
            step_index,
        }
    }

    pub fn step_output(step_type: impl Into<String>, output: impl Into<String>, is_error: bool) -> Self {
        Self::StepOutput {
            step_type: step_type.into(),
            output: output.into(),
            is_error,
        }
    }

    pub fn step_completed(
        stage: StageKind,
        step_type: impl Into<String>,
        step_index: usize,
        status: StepStatus,
        duration: Duration,
    ) -> Self {
        Self::StepCompleted {
            stage,
            step_type: step_type.into(),
            step_index,
            status,
            duration,
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::Log {
            level: LogLevel::Info,
            message: message.into(),
        }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::Log {
            level: LogLevel::Warning,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Log {
            level: LogLevel::Error,
            message: message.into(),
        }
    }
}

/// Helper trait for sending events, ignoring errors (fire-and-forget)
pub trait EventSender {
    fn send_event(&self, event: BuildEvent);
}

impl EventSender for ProgressSender {
    fn send_event(&self, event: BuildEvent) {
        let _ = self.send(event);
    }
}

impl EventSender for Option<ProgressSender> {
    fn send_event(&self, event: BuildEvent) {
        if let Some(sender) = self {
            let _ = sender.send(event);
        }
    }
}
