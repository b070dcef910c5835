// Agent RPC messages
// Wire types for the buildagent.BuildAgent service and conversions from queue types

use build_pipeline::pipeline::results::{SequenceResults, StageStatus};
use build_pipeline::{BuildResult, BuildStatus, DocumentFormat, StageKind};

use chrono::{DateTime, Utc};

include!(concat!(env!("OUT_DIR"), "/buildagent.BuildAgent.rs"));

/// Encoding of a submitted project document
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum ConfigFormat {
    Json = 0,
    Yaml = 1,
}

impl From<ConfigFormat> for DocumentFormat {
    fn from(format: ConfigFormat) -> Self {
        match format {
            ConfigFormat::Json => DocumentFormat::Json,
            ConfigFormat::Yaml => DocumentFormat::Yaml,
        }
    }
}

impl From<DocumentFormat> for ConfigFormat {
    fn from(format: DocumentFormat) -> Self {
        match format {
            DocumentFormat::Json => ConfigFormat::Json,
            DocumentFormat::Yaml => ConfigFormat::Yaml,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum BuildState {
    Unspecified = 0,
    Queued = 1,
    Running = 2,
    Succeeded = 3,
    Failed = 4,
    Cancelled = 5,
}

impl BuildState {
    pub fn label(&self) -> &'static str {
        match self {
            BuildState::Unspecified => "unknown",
            BuildState::Queued => "queued",
            BuildState::Running => "running",
            BuildState::Succeeded => "succeeded",
            BuildState::Failed => "failed",
            BuildState::Cancelled => "cancelled",
        }
    }
}

impl From<BuildStatus> for BuildState {
    fn from(status: BuildStatus) -> Self {
        match status {
            BuildStatus::Queued => BuildState::Queued,
            BuildStatus::Running => BuildState::Running,
            BuildStatus::Succeeded => BuildState::Succeeded,
            BuildStatus::Failed => BuildState::Failed,
            BuildStatus::Cancelled => BuildState::Cancelled,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum StageState {
    Unspecified = 0,
    Succeeded = 1,
    Failed = 2,
    Cancelled = 3,
}

impl From<StageStatus> for StageState {
    fn from(status: StageStatus) -> Self {
        match status {
            StageStatus::Succeeded => StageState::Succeeded,
            StageStatus::Failed => StageState::Failed,
            StageStatus::Cancelled => StageState::Cancelled,
        }
    }
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct EnqueueBuildRequest {
    /// Serialized project document
    #[prost(string, tag = "1")]
    pub project_config: String,
    /// Target to build; empty builds the first target
    #[prost(string, tag = "2")]
    pub target: String,
    #[prost(enumeration = "ConfigFormat", tag = "3")]
    pub format: i32,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct EnqueueBuildResponse {
    #[prost(uint64, tag = "1")]
    pub build_id: u64,
    #[prost(string, tag = "2")]
    pub agent_name: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct GetBuildStatusRequest {
    #[prost(uint64, tag = "1")]
    pub build_id: u64,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct CancelBuildRequest {
    #[prost(uint64, tag = "1")]
    pub build_id: u64,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct ListBuildsRequest {}

#[derive(Clone, PartialEq, prost::Message)]
pub struct ListBuildsResponse {
    #[prost(message, repeated, tag = "1")]
    pub builds: Vec<BuildStatusResponse>,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct StageSummary {
    #[prost(string, tag = "1")]
    pub stage: String,
    #[prost(enumeration = "StageState", tag = "2")]
    pub status: i32,
    #[prost(uint32, tag = "3")]
    pub steps: u32,
    #[prost(uint64, tag = "4")]
    pub duration_ms: u64,
    /// Diagnostic of the failing step, if any
    #[prost(string, tag = "5")]
    pub failure: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct BuildStatusResponse {
    #[prost(uint64, tag = "1")]
    pub build_id: u64,
    #[prost(string, tag = "2")]
    pub project_name: String,
    #[prost(string, tag = "3")]
    pub target_name: String,
    #[prost(enumeration = "BuildState", tag = "4")]
    pub status: i32,
    #[prost(string, tag = "5")]
    pub error: String,
    #[prost(message, repeated, tag = "6")]
    pub stages: Vec<StageSummary>,
    #[prost(string, tag = "7")]
    pub commit_identifier: String,
    #[prost(string, repeated, tag = "8")]
    pub archives: Vec<String>,
    /// RFC 3339 timestamps; empty when not reached yet
    #[prost(string, tag = "9")]
    pub queued_at: String,
    #[prost(string, tag = "10")]
    pub started_at: String,
    #[prost(string, tag = "11")]
    pub finished_at: String,
}

fn timestamp(at: Option<DateTime<Utc>>) -> String {
    at.map(|t| t.to_rfc3339()).unwrap_or_default()
}

fn stage_summary(stage: StageKind, sequence: &SequenceResults) -> StageSummary {
    StageSummary {
        stage: stage.as_str().to_string(),
        status: StageState::from(sequence.status) as i32,
        steps: sequence.step_results.len() as u32,
        duration_ms: sequence.duration.as_millis() as u64,
        failure: sequence
            .failure()
            .and_then(|step| step.error.clone())
            .unwrap_or_default(),
    }
}

impl From<&BuildResult> for BuildStatusResponse {
    fn from(build: &BuildResult) -> Self {
        let stages = &build.stages;
        let mut summaries = Vec::new();
        if let Some(source) = &stages.source {
            summaries.push(stage_summary(StageKind::Source, &source.sequence));
        }
        if let Some(results) = &stages.build {
            summaries.push(stage_summary(StageKind::Build, &results.sequence));
        }
        if let Some(archive) = &stages.archive {
            summaries.push(stage_summary(StageKind::Archive, &archive.sequence));
        }
        if let Some(distribute) = &stages.distribute {
            summaries.push(stage_summary(StageKind::Distribute, &distribute.sequence));
        }

        BuildStatusResponse {
            build_id: build.id,
            project_name: build.project_name().to_string(),
            target_name: build.effective_target_name().unwrap_or_default().to_string(),
            status: BuildState::from(build.status) as i32,
            error: build.error.clone().unwrap_or_default(),
            stages: summaries,
            commit_identifier: stages
                .source
                .as_ref()
                .and_then(|source| source.commit_identifier.clone())
                .unwrap_or_default(),
            archives: stages
                .archive
                .as_ref()
                .map(|archive| {
                    archive
                        .archives
                        .iter()
                        .map(|a| a.archive_file_name.clone())
                        .collect()
                })
                .unwrap_or_default(),
            queued_at: timestamp(Some(build.queued_at)),
            started_at: timestamp(build.started_at),
            finished_at: timestamp(build.finished_at),
        }
    }
}
