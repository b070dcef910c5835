// Build Pipeline Library
// Build queue, staged pipeline runner, step module registry and config resolver

pub mod config;
pub mod error;
pub mod modules;
pub mod pipeline;
pub mod queue;
pub mod utils;

// Re-export commonly used types
pub use error::{PipelineError, PipelineResult};

// Re-export config types
pub use config::{
    ConfigError, ConfigErrorKind, ConfigResolver, ConfigResult, DocumentFormat, ModuleConfig,
    ProjectConfig, StepConfig, TargetConfig,
};

// Re-export module types
pub use modules::{
    available_modules, ArchiveStep, BuildStep, DistributeStep, Module, ModuleRegistration,
    ResolutionError, SourceStep, StageKind, StepError, StepOutput, StepRegistry,
};

// Re-export pipeline types
pub use pipeline::{
    progress_channel, BuildEvent, Builder, CancelSignal, PipelineRun, PipelineRunner,
    ProgressReceiver, ProgressSender, StageResults, StageStatus, Workspace,
};

// Re-export queue types
pub use queue::{BuildId, BuildQueue, BuildResult, BuildStatus, QueueConfig};
