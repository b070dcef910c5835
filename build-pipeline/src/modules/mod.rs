// Modules
// Step contracts, the module registry and the built-in step modules

pub mod folder;
pub mod ftp;
pub mod git;
pub mod local;
pub mod process;
pub mod registry;
pub mod shell;
pub mod steps;
pub mod zip;

pub use folder::{FolderArchiveConfig, FolderArchiveModule, LocalCopyConfig, LocalCopyModule};
pub use ftp::{FtpUploadConfig, FtpUploadModule, SftpUploadConfig, SftpUploadModule};
pub use git::{GitConfig, GitModule};
pub use local::{LocalFolderConfig, LocalFolderModule};
pub use process::{ProcessCommand, ProcessOutput};
pub use registry::{Module, ModuleTable, RegisteredModule, ResolutionError, StageStep, StepRegistry};
pub use shell::{Shell, ShellConfig, ShellModule};
pub use steps::{
    ArchiveStep, BuildStep, DistributeStep, SourceStep, StageKind, StepError, StepOutput,
};
pub use zip::{ZipFileConfig, ZipFileModule};

use crate::config::ModuleConfig;

/// A module that can be added to a registry at startup
#[derive(Clone, Copy)]
pub struct ModuleRegistration {
    pub type_name: &'static str,
    pub stage: StageKind,
    register: fn(&mut StepRegistry),
}

impl ModuleRegistration {
    pub fn of<M: Module + Default>() -> Self {
        Self {
            type_name: <M::Config as ModuleConfig>::TYPE_NAME,
            stage: <M::Step as StageStep>::STAGE,
            register: |registry| registry.register(M::default()),
        }
    }

    pub fn register_into(&self, registry: &mut StepRegistry) {
        (self.register)(registry);
    }
}

impl std::fmt::Debug for ModuleRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleRegistration")
            .field("type_name", &self.type_name)
            .field("stage", &self.stage)
            .finish()
    }
}

/// Every module shipped with the agent
pub fn available_modules() -> Vec<ModuleRegistration> {
    vec![
        ModuleRegistration::of::<GitModule>(),
        ModuleRegistration::of::<LocalFolderModule>(),
        ModuleRegistration::of::<ShellModule>(),
        ModuleRegistration::of::<FolderArchiveModule>(),
        ModuleRegistration::of::<ZipFileModule>(),
        ModuleRegistration::of::<LocalCopyModule>(),
        ModuleRegistration::of::<FtpUploadModule>(),
        ModuleRegistration::of::<SftpUploadModule>(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_available_modules_have_unique_type_names() {
        let modules = available_modules();
        let mut names: Vec<_> = modules.iter().map(|m| (m.stage, m.type_name)).collect();
        names.sort_by_key(|(stage, name)| (stage.as_str(), *name));
        names.dedup();
        assert_eq!(names.len(), modules.len());
    }
}
