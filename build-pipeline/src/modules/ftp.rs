// FTP/SFTP Upload Modules
// Upload archives with curl, retrying failed transfers

use crate::config::ModuleConfig;
use crate::modules::process::ProcessCommand;
use crate::modules::registry::Module;
use crate::modules::steps::{DistributeStep, StepError, StepOutput};
use crate::pipeline::results::ArchiveSequenceResults;
use crate::pipeline::workspace::Workspace;

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

const RETRY_DELAY: Duration = Duration::from_secs(2);

fn ftp_port() -> u16 {
    21
}

fn sftp_port() -> u16 {
    22
}

fn is_zero(value: &u32) -> bool {
    *value == 0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FtpUploadConfig {
    /// Host name, optionally with an `ftp://` prefix
    pub url: String,
    #[serde(default = "ftp_port")]
    pub port: u16,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub base_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub retries: u32,
}

impl ModuleConfig for FtpUploadConfig {
    const TYPE_NAME: &'static str = "FTP Upload";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SftpUploadConfig {
    /// Host name, optionally with an `sftp://` prefix
    pub url: String,
    #[serde(default = "sftp_port")]
    pub port: u16,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub base_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub retries: u32,
}

impl ModuleConfig for SftpUploadConfig {
    const TYPE_NAME: &'static str = "SFTP Upload";
}

#[derive(Debug, Default)]
pub struct FtpUploadModule;

impl Module for FtpUploadModule {
    type Config = FtpUploadConfig;
    type Step = dyn DistributeStep;

    fn create_step(&self, config: &FtpUploadConfig, workspace: &Workspace) -> Box<dyn DistributeStep> {
        Box::new(UploadStep {
            type_name: FtpUploadConfig::TYPE_NAME,
            scheme: "ftp",
            host: host_name(&config.url),
            port: config.port,
            base_path: workspace.replace_variables(&config.base_path),
            username: config.username.clone(),
            password: config.password.clone(),
            retries: config.retries,
        })
    }
}

#[derive(Debug, Default)]
pub struct SftpUploadModule;

impl Module for SftpUploadModule {
    type Config = SftpUploadConfig;
    type Step = dyn DistributeStep;

    fn create_step(&self, config: &SftpUploadConfig, workspace: &Workspace) -> Box<dyn DistributeStep> {
        Box::new(UploadStep {
            type_name: SftpUploadConfig::TYPE_NAME,
            scheme: "sftp",
            host: host_name(&config.url),
            port: config.port,
            base_path: workspace.replace_variables(&config.base_path),
            username: config.username.clone(),
            password: config.password.clone(),
            retries: config.retries,
        })
    }
}

/// Strip any scheme and trailing slashes from a configured host
fn host_name(url: &str) -> String {
    let without_scheme = url.split_once("://").map(|(_, rest)| rest).unwrap_or(url);
    without_scheme.trim_end_matches('/').to_string()
}

pub struct UploadStep {
    type_name: &'static str,
    scheme: &'static str,
    host: String,
    port: u16,
    base_path: String,
    username: Option<String>,
    password: Option<String>,
    retries: u32,
}

impl UploadStep {
    /// Remote URL for a path relative to the base path
    fn remote_url(&self, relative: &str) -> String {
        let mut path = String::new();
        for segment in self
            .base_path
            .split('/')
            .chain(relative.split('/'))
            .filter(|s| !s.is_empty())
        {
            path.push('/');
            path.push_str(segment);
        }
        format!("{}://{}:{}{}", self.scheme, self.host, self.port, path)
    }

    fn curl(&self, file: &Path, remote_url: &str) -> ProcessCommand {
        let mut command = ProcessCommand::new("curl").args([
            "--silent",
            "--show-error",
            "--fail",
            "--ftp-create-dirs",
        ]);
        // Credentials go through a config on stdin so they stay off the process list
        if let Some(username) = &self.username {
            let password = self.password.as_deref().unwrap_or("");
            command = command
                .args(["--config", "-"])
                .stdin(curl_config(username, password));
        }
        if let Some(password) = &self.password {
            command = command.redact(password.clone());
        }
        command
            .arg("-T")
            .arg(file.to_string_lossy())
            .arg(remote_url.to_string())
    }

    async fn upload_file(
        &self,
        file: &Path,
        remote_url: &str,
        workspace: &Workspace,
    ) -> Result<(), StepError> {
        let mut attempt = 0;
        loop {
            let result = self
                .curl(file, remote_url)
                .current_dir(&workspace.archives_directory)
                .run_in(workspace, self.type_name)
                .await;

            match result {
                Ok(_) => return Ok(()),
                Err(err @ StepError::ToolNotFound { .. }) => return Err(err),
                Err(err) if attempt >= self.retries => return Err(err),
                Err(err) => {
                    attempt += 1;
                    tracing::warn!(
                        url = %remote_url,
                        attempt,
                        retries = self.retries,
                        error = %err,
                        "upload failed, retrying"
                    );
                    tokio::time::sleep(RETRY_DELAY).await;
                }
            }
        }
    }
}

#[async_trait::async_trait]
impl DistributeStep for UploadStep {
    fn type_name(&self) -> &str {
        self.type_name
    }

    async fn execute(
        &self,
        archive: &ArchiveSequenceResults,
        workspace: &Workspace,
    ) -> Result<StepOutput, StepError> {
        let mut uploaded = Vec::new();

        for info in &archive.archives {
            for (file, relative) in upload_files(&info.archive_path, &info.archive_file_name)? {
                let url = self.remote_url(&relative);
                self.upload_file(&file, &url, workspace).await?;
                uploaded.push(format!("uploaded {}", relative));
            }
        }

        Ok(StepOutput::new(uploaded.join("\n")))
    }
}

/// curl config setting `user`, quoted so any character survives
fn curl_config(username: &str, password: &str) -> String {
    let mut quoted = String::new();
    for c in format!("{}:{}", username, password).chars() {
        match c {
            '\\' => quoted.push_str("\\\\"),
            '"' => quoted.push_str("\\\""),
            '\n' => quoted.push_str("\\n"),
            '\r' => quoted.push_str("\\r"),
            '\t' => quoted.push_str("\\t"),
            c => quoted.push(c),
        }
    }
    format!("user = \"{}\"\n", quoted)
}

/// Files to upload for an archive with their remote relative paths;
/// folder archives are uploaded file by file
fn upload_files(path: &Path, name: &str) -> io::Result<Vec<(PathBuf, String)>> {
    let mut files = Vec::new();
    if path.is_dir() {
        collect_files(path, name, &mut files)?;
    } else {
        files.push((path.to_path_buf(), name.to_string()));
    }
    Ok(files)
}

fn collect_files(dir: &Path, prefix: &str, files: &mut Vec<(PathBuf, String)>) -> io::Result<()> {
    let mut entries: Vec<_> = fs::read_dir(dir)?.collect::<Result<_, _>>()?;
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let relative = format!("{}/{}", prefix, entry.file_name().to_string_lossy());
        if entry.file_type()?.is_dir() {
            collect_files(&entry.path(), &relative, files)?;
        } else {
            files.push((entry.path(), relative));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::workspace::BuildInfo;
    use tempfile::TempDir;

    fn workspace() -> Workspace {
        Workspace::new(Path::new("/out"), BuildInfo::new("demo", "linux"))
    }

    fn ftp_config(json: serde_json::Value) -> FtpUploadConfig {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn test_default_ports() {
        let ftp = ftp_config(serde_json::json!({ "url": "ftp.example.com" }));
        assert_eq!(ftp.port, 21);
        let sftp: SftpUploadConfig =
            serde_json::from_value(serde_json::json!({ "url": "example.com" })).unwrap();
        assert_eq!(sftp.port, 22);
    }

    #[test]
    fn test_remote_url() {
        let config = ftp_config(serde_json::json!({
            "url": "ftp://ftp.example.com/",
            "base_path": "/builds/%target_name%/"
        }));
        let ws = workspace();
        let step = UploadStep {
            type_name: FtpUploadConfig::TYPE_NAME,
            scheme: "ftp",
            host: host_name(&config.url),
            port: config.port,
            base_path: ws.replace_variables(&config.base_path),
            username: None,
            password: None,
            retries: 0,
        };

        assert_eq!(
            step.remote_url("game.zip"),
            "ftp://ftp.example.com:21/builds/linux/game.zip"
        );
    }

    #[test]
    fn test_upload_files_walks_folder_archives() {
        let temp = TempDir::new().unwrap();
        let folder = temp.path().join("drop");
        fs::create_dir_all(folder.join("data")).unwrap();
        fs::write(folder.join("game.bin"), "").unwrap();
        fs::write(folder.join("data/level.dat"), "").unwrap();

        let relative: Vec<String> = upload_files(&folder, "drop")
            .unwrap()
            .into_iter()
            .map(|(_, r)| r)
            .collect();
        assert_eq!(relative, vec!["drop/data/level.dat", "drop/game.bin"]);

        let zip = temp.path().join("game.zip");
        fs::write(&zip, "").unwrap();
        assert_eq!(upload_files(&zip, "game.zip").unwrap().len(), 1);
    }

    #[test]
    fn test_credentials_stay_off_the_command_line() {
        let step = UploadStep {
            type_name: SftpUploadConfig::TYPE_NAME,
            scheme: "sftp",
            host: "example.com".to_string(),
            port: 22,
            base_path: String::new(),
            username: Some("deploy".to_string()),
            password: Some("hunter2".to_string()),
            retries: 1,
        };
        let command = step.curl(Path::new("/tmp/a.zip"), "sftp://example.com:22/a.zip");
        let line = command.display();
        assert!(line.contains("--config -"));
        assert!(!line.contains("deploy"));
        assert!(!line.contains("hunter2"));
    }

    #[test]
    fn test_curl_config_quotes_credentials() {
        assert_eq!(curl_config("deploy", "hunter2"), "user = \"deploy:hunter2\"\n");
        assert_eq!(
            curl_config("deploy", "a\"b\\c\nd"),
            "user = \"deploy:a\\\"b\\\\c\\nd\"\n"
        );
    }
}
