// Pipeline module
// Staged execution of one build: workspace, results, events and cancellation

pub mod cancellation;
pub mod events;
pub mod results;
pub mod runner;
pub mod workspace;

pub use cancellation::CancelSignal;
pub use events::{progress_channel, BuildEvent, EventSender, LogLevel, ProgressReceiver, ProgressSender};
pub use results::{
    ArchiveInfo, ArchiveSequenceResults, BuildSequenceResults, DistributeSequenceResults,
    SequenceResults, SourceSequenceResults, StageResults, StageStatus, StepResult, StepStatus,
};
pub use runner::{Builder, PipelineRun, PipelineRunner};
pub use workspace::{BuildInfo, TextReplacements, Workspace};
