// Process Runner
// Spawns external tools for the built-in steps and streams their output

use crate::modules::steps::StepError;
use crate::pipeline::events::{BuildEvent, EventSender, ProgressSender};
use crate::pipeline::workspace::Workspace;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::task::JoinHandle;

/// Output collected from a finished process
#[derive(Debug, Clone, Default)]
pub struct ProcessOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// One external command invocation
#[derive(Debug, Clone)]
pub struct ProcessCommand {
    program: String,
    args: Vec<String>,
    working_dir: Option<PathBuf>,
    env: HashMap<String, String>,
    timeout: Option<Duration>,
    /// Arguments hidden from logs and error text, e.g. credentials
    redact: Vec<String>,
    /// Written to the child's stdin, which is then closed
    input: Option<String>,
}

impl ProcessCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
            env: HashMap::new(),
            timeout: None,
            redact: Vec::new(),
            input: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.working_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn envs(mut self, env: HashMap<String, String>) -> Self {
        self.env.extend(env);
        self
    }

    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn redact(mut self, secret: impl Into<String>) -> Self {
        let secret = secret.into();
        if !secret.is_empty() {
            self.redact.push(secret);
        }
        self
    }

    /// Feed `input` to the process instead of an empty stdin
    pub fn stdin(mut self, input: impl Into<String>) -> Self {
        self.input = Some(input.into());
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Command line with redacted secrets, for logs
    pub fn display(&self) -> String {
        let line = std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ");
        self.scrub(&line)
    }

    fn scrub(&self, text: &str) -> String {
        self.redact
            .iter()
            .fold(text.to_string(), |acc, secret| acc.replace(secret.as_str(), "***"))
    }

    /// Run to completion, streaming each output line as a step output event
    pub async fn run(
        &self,
        step_type: &str,
        progress: Option<&ProgressSender>,
    ) -> Result<ProcessOutput, StepError> {
        let executable = which::which(&self.program).map_err(|_| StepError::ToolNotFound {
            program: self.program.clone(),
        })?;

        tracing::debug!(command = %self.display(), "spawning process");

        let mut cmd = Command::new(executable);
        cmd.args(&self.args);
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }
        cmd.envs(&self.env);
        cmd.stdin(if self.input.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        });
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);

        let mut child = cmd.spawn()?;

        if let (Some(input), Some(mut stdin)) = (&self.input, child.stdin.take()) {
            stdin.write_all(input.as_bytes()).await?;
        }

        let stdout_handle = child
            .stdout
            .take()
            .map(|out| self.stream_lines(out, step_type, progress, false));
        let stderr_handle = child
            .stderr
            .take()
            .map(|err| self.stream_lines(err, step_type, progress, true));

        let status = match self.timeout {
            Some(timeout) => match tokio::time::timeout(timeout, child.wait()).await {
                Ok(result) => result?,
                Err(_) => {
                    let _ = child.kill().await;
                    return Err(StepError::Timeout {
                        program: self.program.clone(),
                        timeout,
                    });
                }
            },
            None => child.wait().await?,
        };

        Ok(ProcessOutput {
            stdout: join_output(stdout_handle).await,
            stderr: join_output(stderr_handle).await,
            exit_code: status.code(),
        })
    }

    /// Run and fail the step on a non-zero exit code
    pub async fn run_checked(
        &self,
        step_type: &str,
        progress: Option<&ProgressSender>,
    ) -> Result<ProcessOutput, StepError> {
        let output = self.run(step_type, progress).await?;
        if output.success() {
            Ok(output)
        } else {
            let detail = if output.stderr.trim().is_empty() {
                last_lines(&output.stdout, 5)
            } else {
                last_lines(&output.stderr, 5)
            };
            Err(StepError::CommandFailed {
                program: self.program.clone(),
                exit_code: output.exit_code,
                stderr: self.scrub(&detail),
            })
        }
    }

    /// Run inside the workspace, reporting through its progress channel
    pub async fn run_in(
        self,
        workspace: &Workspace,
        step_type: &str,
    ) -> Result<ProcessOutput, StepError> {
        let command = match self.working_dir {
            Some(_) => self,
            None => self.current_dir(&workspace.working_directory),
        };
        command.run_checked(step_type, workspace.progress()).await
    }

    fn stream_lines<R>(
        &self,
        reader: R,
        step_type: &str,
        progress: Option<&ProgressSender>,
        is_error: bool,
    ) -> JoinHandle<String>
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let progress = progress.cloned();
        let step_type = step_type.to_string();
        let redact = self.redact.clone();

        tokio::spawn(async move {
            let mut lines = BufReader::new(reader).lines();
            let mut output = String::new();
            while let Ok(Some(line)) = lines.next_line().await {
                let line = redact
                    .iter()
                    .fold(line, |acc, secret| acc.replace(secret.as_str(), "***"));
                progress.send_event(BuildEvent::step_output(&step_type, &line, is_error));
                if !output.is_empty() {
                    output.push('\n');
                }
                output.push_str(&line);
            }
            output
        })
    }
}

async fn join_output(handle: Option<JoinHandle<String>>) -> String {
    match handle {
        Some(handle) => handle.await.unwrap_or_default(),
        None => String::new(),
    }
}

fn last_lines(text: &str, count: usize) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(count);
    lines[start..].join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::events::progress_channel;

    fn has_sh() -> bool {
        which::which("sh").is_ok()
    }

    #[tokio::test]
    async fn test_run_collects_and_streams_output() {
        if !has_sh() {
            return;
        }
        let (tx, mut rx) = progress_channel();
        let output = ProcessCommand::new("sh")
            .args(["-c", "echo hello; echo oops >&2"])
            .run("Shell", Some(&tx))
            .await
            .unwrap();

        assert!(output.success());
        assert_eq!(output.stdout, "hello");
        assert_eq!(output.stderr, "oops");

        drop(tx);
        let mut lines = Vec::new();
        while let Some(event) = rx.recv().await {
            if let BuildEvent::StepOutput { output, is_error, .. } = event {
                lines.push((output, is_error));
            }
        }
        assert!(lines.contains(&("hello".to_string(), false)));
        assert!(lines.contains(&("oops".to_string(), true)));
    }

    #[tokio::test]
    async fn test_run_checked_reports_exit_code() {
        if !has_sh() {
            return;
        }
        let err = ProcessCommand::new("sh")
            .args(["-c", "echo broken >&2; exit 3"])
            .run_checked("Shell", None)
            .await
            .unwrap_err();

        match err {
            StepError::CommandFailed {
                exit_code, stderr, ..
            } => {
                assert_eq!(exit_code, Some(3));
                assert_eq!(stderr, "broken");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_stdin_is_written_and_closed() {
        if !has_sh() {
            return;
        }
        let output = ProcessCommand::new("sh")
            .args(["-c", "cat"])
            .stdin("user = \"bob:hunter2\"\n")
            .run("Shell", None)
            .await
            .unwrap();
        assert!(output.success());
        assert_eq!(output.stdout, "user = \"bob:hunter2\"");
    }

    #[tokio::test]
    async fn test_missing_tool() {
        let err = ProcessCommand::new("definitely-not-a-real-tool-xyz")
            .run("Shell", None)
            .await
            .unwrap_err();
        assert!(matches!(err, StepError::ToolNotFound { .. }));
    }

    #[tokio::test]
    async fn test_timeout_kills_process() {
        if !has_sh() {
            return;
        }
        let err = ProcessCommand::new("sh")
            .args(["-c", "sleep 5"])
            .timeout(Some(Duration::from_millis(100)))
            .run("Shell", None)
            .await
            .unwrap_err();
        assert!(matches!(err, StepError::Timeout { .. }));
    }

    #[test]
    fn test_display_redacts_secrets() {
        let command = ProcessCommand::new("curl")
            .args(["--user", "bob:hunter2", "ftp://host/"])
            .redact("hunter2");
        assert_eq!(command.display(), "curl --user bob:*** ftp://host/");
    }
}
