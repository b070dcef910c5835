// Build Workspace
// Per-build directories, text substitution variables and build identity

use crate::pipeline::events::{BuildEvent, EventSender, ProgressSender};
use crate::utils::{clean_directory, sanitize_file_name};

use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

pub const WORKING_DIRECTORY_NAME: &str = "Workspace";
pub const BUILD_OUTPUT_DIRECTORY_NAME: &str = "BuildOutput";
pub const ARCHIVES_DIRECTORY_NAME: &str = "Archives";

/// Identity of the build a workspace belongs to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildInfo {
    pub project_name: String,
    pub target_name: String,
    pub started_at: DateTime<Utc>,
    pub commit_identifier: Option<String>,
}

impl BuildInfo {
    pub fn new(project_name: impl Into<String>, target_name: impl Into<String>) -> Self {
        Self {
            project_name: project_name.into(),
            target_name: target_name.into(),
            started_at: Utc::now(),
            commit_identifier: None,
        }
    }

    /// Default name for archives: `<project>_<target>_<date>[_<commit>]`
    pub fn file_name(&self) -> String {
        let mut name = format!(
            "{}_{}_{}",
            self.project_name,
            self.target_name,
            self.started_at.format("%Y-%m-%d")
        );
        if let Some(commit) = &self.commit_identifier {
            let short: String = commit.chars().take(7).collect();
            if !short.is_empty() {
                name.push('_');
                name.push_str(&short);
            }
        }
        sanitize_file_name(&name)
    }
}

/// Symbolic variables substituted into step text as `%name%`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextReplacements {
    values: BTreeMap<String, String>,
}

impl TextReplacements {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.values.iter()
    }

    /// Replace every `%name%` whose name is known; unknown names stay as written
    pub fn replace_variables(&self, text: &str) -> String {
        let mut result = String::with_capacity(text.len());
        let mut rest = text;

        while let Some(start) = rest.find('%') {
            result.push_str(&rest[..start]);
            let after = &rest[start + 1..];

            match after.find('%') {
                Some(end) => {
                    let name = &after[..end];
                    match self.values.get(name) {
                        Some(value) => {
                            result.push_str(value);
                            rest = &after[end + 1..];
                        }
                        None => {
                            // Keep the text as written; the closing '%' may open the next name
                            result.push('%');
                            result.push_str(name);
                            rest = &after[end..];
                        }
                    }
                }
                None => {
                    result.push_str(&rest[start..]);
                    rest = "";
                }
            }
        }

        result.push_str(rest);
        result
    }
}

/// Filesystem and environment context for one in-flight build
#[derive(Debug, Clone)]
pub struct Workspace {
    pub working_directory: PathBuf,
    pub build_output_directory: PathBuf,
    pub archives_directory: PathBuf,
    pub replacements: TextReplacements,
    pub build_info: BuildInfo,
    progress: Option<ProgressSender>,
}

impl Workspace {
    /// Lay out a workspace directly under `root` without touching the filesystem
    pub fn new(root: &Path, build_info: BuildInfo) -> Self {
        let mut workspace = Self {
            working_directory: root.join(WORKING_DIRECTORY_NAME),
            build_output_directory: root.join(BUILD_OUTPUT_DIRECTORY_NAME),
            archives_directory: root.join(ARCHIVES_DIRECTORY_NAME),
            replacements: TextReplacements::new(),
            build_info,
            progress: None,
        };
        workspace.seed_replacements();
        workspace
    }

    /// Workspace for a project target under an agent's output root
    pub fn for_target(output_root: &Path, build_info: BuildInfo) -> Self {
        let root = output_root
            .join(sanitize_file_name(&build_info.project_name))
            .join(sanitize_file_name(&build_info.target_name));
        Self::new(&root, build_info)
    }

    pub fn with_progress(mut self, progress: Option<ProgressSender>) -> Self {
        self.progress = progress;
        self
    }

    /// Create the directories; build output and archives start empty while
    /// the working copy is kept for incremental updates
    pub fn initialize_directories(&self) -> io::Result<()> {
        fs::create_dir_all(&self.working_directory)?;
        clean_directory(&self.build_output_directory)?;
        clean_directory(&self.archives_directory)?;
        Ok(())
    }

    pub fn set_commit_identifier(&mut self, commit: Option<String>) {
        if let Some(commit) = &commit {
            self.replacements.insert("commit_identifier", commit.clone());
        }
        self.build_info.commit_identifier = commit;
    }

    pub fn replace_variables(&self, text: &str) -> String {
        self.replacements.replace_variables(text)
    }

    /// Substitution variables exported as `BUILD_<NAME>` environment variables
    pub fn environment(&self) -> HashMap<String, String> {
        self.replacements
            .iter()
            .map(|(name, value)| (format!("BUILD_{}", name.to_uppercase()), value.clone()))
            .collect()
    }

    /// Forward an event to the build's progress channel, if any
    pub fn emit(&self, event: BuildEvent) {
        self.progress.send_event(event);
    }

    pub fn progress(&self) -> Option<&ProgressSender> {
        self.progress.as_ref()
    }

    fn seed_replacements(&mut self) {
        let path_vars = [
            ("working_directory", &self.working_directory),
            ("build_output_directory", &self.build_output_directory),
            ("archives_directory", &self.archives_directory),
        ];
        for (name, path) in path_vars {
            self.replacements
                .insert(name, path.to_string_lossy().to_string());
        }

        self.replacements
            .insert("project_name", self.build_info.project_name.clone());
        self.replacements
            .insert("target_name", self.build_info.target_name.clone());
        self.replacements.insert(
            "build_date",
            self.build_info.started_at.format("%Y-%m-%d").to_string(),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn replacements() -> TextReplacements {
        let mut r = TextReplacements::new();
        r.insert("working_directory", "/tmp/ws");
        r.insert("name", "demo");
        r
    }

    #[test]
    fn test_replace_known_variables() {
        let r = replacements();
        assert_eq!(
            r.replace_variables("cd %working_directory% && echo %name%"),
            "cd /tmp/ws && echo demo"
        );
    }

    #[test]
    fn test_replace_leaves_unknown_and_unbalanced() {
        let r = replacements();
        assert_eq!(r.replace_variables("100% done"), "100% done");
        assert_eq!(r.replace_variables("%unknown%"), "%unknown%");
        assert_eq!(r.replace_variables("50% of %name%"), "50% of demo");
        assert_eq!(r.replace_variables("%%name%"), "%demo");
    }

    #[test]
    fn test_replace_keeps_literal_percent_sequences() {
        let r = replacements();
        assert_eq!(r.replace_variables("echo %PATH%"), "echo %PATH%");
        assert_eq!(r.replace_variables("date +%Y%m%d"), "date +%Y%m%d");
        assert_eq!(
            r.replace_variables("%Y-%name%-%working_directory%"),
            "%Y-demo-/tmp/ws"
        );
    }

    #[test]
    fn test_workspace_layout_and_standard_variables() {
        let info = BuildInfo::new("My Game", "win/64");
        let ws = Workspace::for_target(Path::new("/out"), info);

        assert_eq!(
            ws.working_directory,
            Path::new("/out/My Game/win_64/Workspace")
        );
        assert_eq!(
            ws.replacements.get("archives_directory"),
            Some("/out/My Game/win_64/Archives")
        );
        assert!(ws.replacements.get("build_output_directory").is_some());
        assert_eq!(ws.replacements.get("target_name"), Some("win/64"));
    }

    #[test]
    fn test_initialize_directories_keeps_working_copy() {
        let temp = TempDir::new().unwrap();
        let ws = Workspace::new(temp.path(), BuildInfo::new("p", "t"));
        ws.initialize_directories().unwrap();

        fs::write(ws.working_directory.join("src.txt"), "keep").unwrap();
        fs::write(ws.build_output_directory.join("old.bin"), "stale").unwrap();
        fs::write(ws.archives_directory.join("old.zip"), "stale").unwrap();

        ws.initialize_directories().unwrap();

        assert!(ws.working_directory.join("src.txt").exists());
        assert!(!ws.build_output_directory.join("old.bin").exists());
        assert!(!ws.archives_directory.join("old.zip").exists());
        assert!(ws.archives_directory.is_dir());
    }

    #[test]
    fn test_commit_identifier_feeds_file_name_and_variables() {
        let mut ws = Workspace::new(Path::new("/out"), BuildInfo::new("demo", "linux"));
        ws.set_commit_identifier(Some("0123456789abcdef".to_string()));

        assert_eq!(
            ws.replacements.get("commit_identifier"),
            Some("0123456789abcdef")
        );
        assert!(ws.build_info.file_name().starts_with("demo_linux_"));
        assert!(ws.build_info.file_name().ends_with("_0123456"));
    }

    #[test]
    fn test_environment_exports_prefixed_names() {
        let ws = Workspace::new(Path::new("/out"), BuildInfo::new("demo", "linux"));
        let env = ws.environment();
        assert_eq!(env.get("BUILD_PROJECT_NAME"), Some(&"demo".to_string()));
        assert!(env.contains_key("BUILD_WORKING_DIRECTORY"));
    }
}
