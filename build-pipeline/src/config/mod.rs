// Config module for project documents
// Provides the project model, step config values and the registry-driven resolver

pub mod error;
pub mod models;
pub mod resolver;

pub use error::{ConfigError, ConfigErrorKind, ConfigResult};
pub use models::{ModuleConfig, ProjectConfig, StepConfig, TargetConfig, TYPE_FIELD};
pub use resolver::{ConfigResolver, DocumentFormat};
