// Folder Modules
// Archive the build output as a plain folder and copy archives to a local destination

use crate::config::ModuleConfig;
use crate::modules::registry::Module;
use crate::modules::steps::{ArchiveStep, DistributeStep, StepError, StepOutput};
use crate::pipeline::results::{ArchiveInfo, ArchiveSequenceResults, BuildSequenceResults};
use crate::pipeline::workspace::Workspace;
use crate::utils::{copy_dir_recursive, copy_into, sanitize_file_name};

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FolderArchiveConfig {
    /// Defaults to the build's file name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder_name: Option<String>,
}

impl ModuleConfig for FolderArchiveConfig {
    const TYPE_NAME: &'static str = "Folder";
}

#[derive(Debug, Default)]
pub struct FolderArchiveModule;

impl Module for FolderArchiveModule {
    type Config = FolderArchiveConfig;
    type Step = dyn ArchiveStep;

    fn create_step(
        &self,
        config: &FolderArchiveConfig,
        _workspace: &Workspace,
    ) -> Box<dyn ArchiveStep> {
        Box::new(FolderArchiveStep {
            folder_name: config.folder_name.clone(),
        })
    }
}

pub struct FolderArchiveStep {
    folder_name: Option<String>,
}

#[async_trait::async_trait]
impl ArchiveStep for FolderArchiveStep {
    fn type_name(&self) -> &str {
        FolderArchiveConfig::TYPE_NAME
    }

    async fn execute(
        &self,
        _build: &BuildSequenceResults,
        workspace: &Workspace,
    ) -> Result<ArchiveInfo, StepError> {
        // Name resolved at run time so it picks up the commit identifier
        let name = match &self.folder_name {
            Some(name) => sanitize_file_name(&workspace.replace_variables(name)),
            None => workspace.build_info.file_name(),
        };
        let archive_path = workspace.archives_directory.join(&name);
        let copied = copy_dir_recursive(&workspace.build_output_directory, &archive_path)?;
        tracing::debug!(archive = %archive_path.display(), files = copied, "archived build output");

        Ok(ArchiveInfo {
            archive_file_name: name,
            archive_path,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LocalCopyConfig {
    pub destination: PathBuf,
}

impl LocalCopyConfig {
    pub fn new(destination: impl Into<PathBuf>) -> Self {
        Self {
            destination: destination.into(),
        }
    }
}

impl ModuleConfig for LocalCopyConfig {
    const TYPE_NAME: &'static str = "Local Copy";
}

#[derive(Debug, Default)]
pub struct LocalCopyModule;

impl Module for LocalCopyModule {
    type Config = LocalCopyConfig;
    type Step = dyn DistributeStep;

    fn create_step(&self, config: &LocalCopyConfig, workspace: &Workspace) -> Box<dyn DistributeStep> {
        let destination = workspace.replace_variables(&config.destination.to_string_lossy());
        Box::new(LocalCopyStep {
            destination: PathBuf::from(destination),
        })
    }
}

pub struct LocalCopyStep {
    destination: PathBuf,
}

#[async_trait::async_trait]
impl DistributeStep for LocalCopyStep {
    fn type_name(&self) -> &str {
        LocalCopyConfig::TYPE_NAME
    }

    async fn execute(
        &self,
        archive: &ArchiveSequenceResults,
        _workspace: &Workspace,
    ) -> Result<StepOutput, StepError> {
        let mut lines = Vec::with_capacity(archive.archives.len());
        for info in &archive.archives {
            let target = copy_into(&info.archive_path, &self.destination)?;
            lines.push(format!("copied {} to {}", info.archive_file_name, target.display()));
        }
        Ok(StepOutput::new(lines.join("\n")))
    }
}
