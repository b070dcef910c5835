// Shell Build Module
// Runs a command line in the working copy

use crate::config::ModuleConfig;
use crate::modules::process::ProcessCommand;
use crate::modules::registry::Module;
use crate::modules::steps::{BuildStep, StepError, StepOutput};
use crate::pipeline::results::SourceSequenceResults;
use crate::pipeline::workspace::Workspace;

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Shells a command can run under
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Shell {
    /// `sh` on Unix, `cmd` on Windows
    #[default]
    Sh,
    Bash,
    Pwsh,
}

impl Shell {
    fn command(&self) -> (&'static str, &'static [&'static str]) {
        match self {
            Shell::Sh => {
                if cfg!(target_os = "windows") {
                    ("cmd", &["/C"])
                } else {
                    ("sh", &["-c"])
                }
            }
            Shell::Bash => ("bash", &["-c"]),
            Shell::Pwsh => ("pwsh", &["-NoLogo", "-NoProfile", "-Command"]),
        }
    }

    fn is_default(&self) -> bool {
        *self == Shell::Sh
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ShellConfig {
    pub command: String,
    #[serde(default, skip_serializing_if = "Shell::is_default")]
    pub shell: Shell,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

impl ShellConfig {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            shell: Shell::default(),
            timeout_secs: None,
        }
    }
}

impl ModuleConfig for ShellConfig {
    const TYPE_NAME: &'static str = "Shell";
}

#[derive(Debug, Default)]
pub struct ShellModule;

impl Module for ShellModule {
    type Config = ShellConfig;
    type Step = dyn BuildStep;

    fn create_step(&self, config: &ShellConfig, _workspace: &Workspace) -> Box<dyn BuildStep> {
        Box::new(ShellStep {
            config: config.clone(),
        })
    }
}

pub struct ShellStep {
    config: ShellConfig,
}

#[async_trait::async_trait]
impl BuildStep for ShellStep {
    fn type_name(&self) -> &str {
        ShellConfig::TYPE_NAME
    }

    async fn execute(
        &self,
        _source: &SourceSequenceResults,
        workspace: &Workspace,
    ) -> Result<StepOutput, StepError> {
        let script = workspace.replace_variables(&self.config.command);
        let (program, shell_args) = self.config.shell.command();

        let output = ProcessCommand::new(program)
            .args(shell_args.iter().copied())
            .arg(script)
            .envs(workspace.environment())
            .timeout(self.config.timeout_secs.map(Duration::from_secs))
            .run_in(workspace, self.type_name())
            .await?;

        Ok(StepOutput::new(output.stdout))
    }
}
