// Local Folder Source Module
// Uses a directory on the agent's filesystem as the source

use crate::config::ModuleConfig;
use crate::modules::registry::Module;
use crate::modules::steps::{SourceStep, StepError, StepOutput};
use crate::pipeline::workspace::Workspace;
use crate::utils::{clean_directory, copy_dir_recursive, is_empty_dir};

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LocalFolderConfig {
    pub path: PathBuf,
}

impl LocalFolderConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ModuleConfig for LocalFolderConfig {
    const TYPE_NAME: &'static str = "Local Folder";
}

#[derive(Debug, Default)]
pub struct LocalFolderModule;

impl Module for LocalFolderModule {
    type Config = LocalFolderConfig;
    type Step = dyn SourceStep;

    fn create_step(
        &self,
        config: &LocalFolderConfig,
        workspace: &Workspace,
    ) -> Box<dyn SourceStep> {
        let path = workspace.replace_variables(&config.path.to_string_lossy());
        Box::new(LocalFolderStep {
            path: PathBuf::from(path),
        })
    }
}

pub struct LocalFolderStep {
    path: PathBuf,
}

impl LocalFolderStep {
    fn copy_into_working_copy(&self, working_directory: &Path) -> Result<StepOutput, StepError> {
        if !self.path.is_dir() {
            return Err(StepError::failed(format!(
                "source folder {} does not exist",
                self.path.display()
            )));
        }
        let copied = copy_dir_recursive(&self.path, working_directory)?;
        Ok(StepOutput::new(format!(
            "copied {} files from {}",
            copied,
            self.path.display()
        )))
    }
}

#[async_trait::async_trait]
impl SourceStep for LocalFolderStep {
    fn type_name(&self) -> &str {
        LocalFolderConfig::TYPE_NAME
    }

    fn is_working_copy_initialized(&self, workspace: &Workspace) -> bool {
        !is_empty_dir(&workspace.working_directory)
    }

    async fn download(&self, workspace: &Workspace) -> Result<StepOutput, StepError> {
        self.copy_into_working_copy(&workspace.working_directory)
    }

    async fn update(&self, workspace: &Workspace) -> Result<StepOutput, StepError> {
        clean_directory(&workspace.working_directory)?;
        self.copy_into_working_copy(&workspace.working_directory)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::workspace::BuildInfo;
    use std::fs;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_download_and_update_mirror_folder() {
        let temp = TempDir::new().unwrap();
        let source = temp.path().join("src");
        fs::create_dir_all(&source).unwrap();
        fs::write(source.join("main.c"), "int main;").unwrap();

        let ws = Workspace::new(&temp.path().join("build"), BuildInfo::new("demo", "linux"));
        ws.initialize_directories().unwrap();
        let step = LocalFolderModule.create_step(&LocalFolderConfig::new(&source), &ws);

        assert!(!step.is_working_copy_initialized(&ws));
        step.download(&ws).await.unwrap();
        assert!(step.is_working_copy_initialized(&ws));

        fs::write(ws.working_directory.join("stale.o"), "").unwrap();
        fs::remove_file(source.join("main.c")).unwrap();
        fs::write(source.join("lib.c"), "").unwrap();

        step.update(&ws).await.unwrap();
        assert!(ws.working_directory.join("lib.c").exists());
        assert!(!ws.working_directory.join("stale.o").exists());
        assert!(!ws.working_directory.join("main.c").exists());
    }

    #[tokio::test]
    async fn test_missing_folder_fails() {
        let temp = TempDir::new().unwrap();
        let ws = Workspace::new(temp.path(), BuildInfo::new("demo", "linux"));
        ws.initialize_directories().unwrap();

        let step = LocalFolderModule.create_step(
            &LocalFolderConfig::new(temp.path().join("missing")),
            &ws,
        );
        assert!(step.download(&ws).await.is_err());
    }
}
