// Zip File Archive Module
// Compresses the build output with the system zip tool

use crate::config::ModuleConfig;
use crate::modules::process::ProcessCommand;
use crate::modules::registry::Module;
use crate::modules::steps::{ArchiveStep, StepError};
use crate::pipeline::results::{ArchiveInfo, BuildSequenceResults};
use crate::pipeline::workspace::Workspace;
use crate::utils::{is_empty_dir, sanitize_file_name};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ZipFileConfig {
    /// Archive name without extension; defaults to the build's file name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
}

impl ModuleConfig for ZipFileConfig {
    const TYPE_NAME: &'static str = "Zip File";
}

#[derive(Debug, Default)]
pub struct ZipFileModule;

impl Module for ZipFileModule {
    type Config = ZipFileConfig;
    type Step = dyn ArchiveStep;

    fn create_step(&self, config: &ZipFileConfig, _workspace: &Workspace) -> Box<dyn ArchiveStep> {
        Box::new(ZipFileStep {
            file_name: config.file_name.clone(),
        })
    }
}

pub struct ZipFileStep {
    file_name: Option<String>,
}

impl ZipFileStep {
    fn archive_file_name(&self, workspace: &Workspace) -> String {
        let stem = match &self.file_name {
            Some(name) => {
                let name = workspace.replace_variables(name);
                sanitize_file_name(name.strip_suffix(".zip").unwrap_or(&name))
            }
            None => workspace.build_info.file_name(),
        };
        format!("{}.zip", stem)
    }
}

#[async_trait::async_trait]
impl ArchiveStep for ZipFileStep {
    fn type_name(&self) -> &str {
        ZipFileConfig::TYPE_NAME
    }

    async fn execute(
        &self,
        _build: &BuildSequenceResults,
        workspace: &Workspace,
    ) -> Result<ArchiveInfo, StepError> {
        if is_empty_dir(&workspace.build_output_directory) {
            return Err(StepError::failed("build output directory is empty"));
        }

        let archive_file_name = self.archive_file_name(workspace);
        let archive_path = workspace.archives_directory.join(&archive_file_name);

        ProcessCommand::new("zip")
            .args(["-r", "-q"])
            .arg(archive_path.to_string_lossy())
            .arg(".")
            .current_dir(&workspace.build_output_directory)
            .run_in(workspace, self.type_name())
            .await?;

        Ok(ArchiveInfo {
            archive_file_name,
            archive_path,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::results::{SequenceResults, StageStatus};
    use crate::pipeline::workspace::BuildInfo;
    use std::time::Duration;
    use tempfile::TempDir;

    fn build_results() -> BuildSequenceResults {
        BuildSequenceResults {
            sequence: SequenceResults {
                status: StageStatus::Succeeded,
                step_results: Vec::new(),
                duration: Duration::ZERO,
            },
        }
    }

    #[test]
    fn test_archive_file_name() {
        let ws = Workspace::new(std::path::Path::new("/out"), BuildInfo::new("demo", "linux"));
        let named = ZipFileStep {
            file_name: Some("%project_name%-latest.zip".to_string()),
        };
        assert_eq!(named.archive_file_name(&ws), "demo-latest.zip");

        let default = ZipFileStep { file_name: None };
        assert!(default.archive_file_name(&ws).starts_with("demo_linux_"));
        assert!(default.archive_file_name(&ws).ends_with(".zip"));
    }

    #[tokio::test]
    async fn test_zip_build_output() {
        if which::which("zip").is_err() {
            return;
        }
        let temp = TempDir::new().unwrap();
        let ws = Workspace::new(temp.path(), BuildInfo::new("demo", "linux"));
        ws.initialize_directories().unwrap();
        std::fs::write(ws.build_output_directory.join("game.bin"), "bin").unwrap();

        let step = ZipFileModule.create_step(&ZipFileConfig::default(), &ws);
        let info = step.execute(&build_results(), &ws).await.unwrap();

        assert!(info.archive_path.is_file());
        assert_eq!(info.archive_path.parent(), Some(ws.archives_directory.as_path()));
    }

    #[tokio::test]
    async fn test_empty_build_output_fails() {
        let temp = TempDir::new().unwrap();
        let ws = Workspace::new(temp.path(), BuildInfo::new("demo", "linux"));
        ws.initialize_directories().unwrap();

        let step = ZipFileModule.create_step(&ZipFileConfig::default(), &ws);
        assert!(step.execute(&build_results(), &ws).await.is_err());
    }
}
