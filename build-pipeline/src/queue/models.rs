// Queue Models
// Build identity, lifecycle status and the queue-visible build record

use crate::config::ProjectConfig;
use crate::pipeline::results::StageResults;

use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;

/// Process-lifetime unique, monotonically increasing build identity
pub type BuildId = u64;

/// Lifecycle of a build: `Queued -> Running -> {Succeeded, Failed} | Cancelled`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuildStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl BuildStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BuildStatus::Succeeded | BuildStatus::Failed | BuildStatus::Cancelled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BuildStatus::Queued => "queued",
            BuildStatus::Running => "running",
            BuildStatus::Succeeded => "succeeded",
            BuildStatus::Failed => "failed",
            BuildStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for BuildStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One build as tracked by the queue
#[derive(Debug, Clone)]
pub struct BuildResult {
    pub id: BuildId,
    pub project: Arc<ProjectConfig>,
    /// Target requested at enqueue; `None` builds the first target
    pub target_name: Option<String>,
    pub status: BuildStatus,
    pub stages: StageResults,
    /// Why the build failed, when it did
    pub error: Option<String>,
    pub queued_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl BuildResult {
    pub fn queued(id: BuildId, project: Arc<ProjectConfig>, target_name: Option<String>) -> Self {
        Self {
            id,
            project,
            target_name,
            status: BuildStatus::Queued,
            stages: StageResults::default(),
            error: None,
            queued_at: Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }

    pub fn project_name(&self) -> &str {
        &self.project.project_name
    }

    /// The target this build runs, falling back to the project's first target
    pub fn effective_target_name(&self) -> Option<&str> {
        match self.target_name.as_deref().filter(|t| !t.is_empty()) {
            Some(name) => Some(name),
            None => self
                .project
                .default_target()
                .map(|t| t.target_name.as_str()),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.status.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{StepConfig, TargetConfig};
    use crate::modules::LocalFolderConfig;

    #[test]
    fn test_terminal_statuses() {
        assert!(!BuildStatus::Queued.is_terminal());
        assert!(!BuildStatus::Running.is_terminal());
        assert!(BuildStatus::Succeeded.is_terminal());
        assert!(BuildStatus::Failed.is_terminal());
        assert!(BuildStatus::Cancelled.is_terminal());
        assert_eq!(BuildStatus::Cancelled.to_string(), "cancelled");
    }

    #[test]
    fn test_effective_target_name() {
        let source = StepConfig::new(LocalFolderConfig::new("/src")).unwrap();
        let project = Arc::new(
            ProjectConfig::new("demo")
                .with_target(TargetConfig::new("linux", source.clone()))
                .with_target(TargetConfig::new("windows", source)),
        );

        let default = BuildResult::queued(1, project.clone(), None);
        assert_eq!(default.effective_target_name(), Some("linux"));
        assert_eq!(default.status, BuildStatus::Queued);

        let named = BuildResult::queued(2, project, Some("windows".to_string()));
        assert_eq!(named.effective_target_name(), Some("windows"));
    }
}
