// Error Types
// Top-level error taxonomy for loading configs and dispatching builds

use crate::config::ConfigError;
use crate::modules::ResolutionError;

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced before or around a build; step failures are recorded on
/// the build instead of being returned.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("{0}")]
    Config(#[from] ConfigError),

    #[error("Target '{target}' not found in project '{project}'")]
    TargetNotFound { project: String, target: String },

    #[error("Project '{0}' has no targets to build")]
    NoTargets(String),

    #[error("{0}")]
    ModuleResolution(#[from] ResolutionError),

    #[error("Failed to prepare output directory {}: {source}", path.display())]
    OutputDirectory {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

pub type PipelineResult<T> = Result<T, PipelineError>;

impl PipelineError {
    /// Build an output-directory error for the given path
    pub fn output_directory(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::OutputDirectory {
            path: path.into(),
            source,
        }
    }
}
