// Config Resolver
// Loads project documents, dispatching each step node to the module that owns its type

use crate::config::error::{ConfigError, ConfigErrorKind, ConfigResult};
use crate::config::models::{ProjectConfig, StepConfig, TargetConfig, TYPE_FIELD};
use crate::modules::registry::{StageStep, StepRegistry};
use crate::modules::steps::{ArchiveStep, BuildStep, DistributeStep, SourceStep};

use serde::Deserialize;
use serde_json::Value;
use std::collections::HashSet;
use std::fs;
use std::path::Path;

/// Serialized document formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Json,
    Yaml,
}

impl DocumentFormat {
    /// `.yaml`/`.yml` files are YAML, everything else JSON
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml") => {
                DocumentFormat::Yaml
            }
            _ => DocumentFormat::Json,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawProject {
    project_name: String,
    #[serde(default)]
    targets: Vec<RawTarget>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawTarget {
    target_name: String,
    source: Value,
    #[serde(default)]
    build_steps: Vec<Value>,
    #[serde(default)]
    archive_steps: Vec<Value>,
    #[serde(default)]
    distribute_steps: Vec<Value>,
}

/// Resolves project documents against a step registry.
///
/// Loading has no side effects, so the same document always yields equal
/// configurations.
#[derive(Debug, Clone, Copy)]
pub struct ConfigResolver<'a> {
    registry: &'a StepRegistry,
}

impl<'a> ConfigResolver<'a> {
    pub fn new(registry: &'a StepRegistry) -> Self {
        Self { registry }
    }

    /// Load a project from document text
    pub fn load(&self, content: &str, format: DocumentFormat) -> ConfigResult<ProjectConfig> {
        let raw: RawProject = match format {
            DocumentFormat::Json => serde_json::from_str(content)
                .map_err(|e| ConfigError::from_json_error(&e, content))?,
            DocumentFormat::Yaml => serde_yaml::from_str(content)
                .map_err(|e| ConfigError::from_yaml_error(&e, content))?,
        };
        self.resolve(raw)
    }

    /// Load a project file, picking the format from its extension
    pub fn load_file<P: AsRef<Path>>(&self, path: P) -> ConfigResult<ProjectConfig> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| {
            ConfigError::new(
                ConfigErrorKind::Io,
                format!("failed to read {}: {}", path.display(), e),
            )
        })?;
        self.load(&content, DocumentFormat::from_path(path))
    }

    /// Serialize a project into a document `load` accepts
    pub fn to_document(project: &ProjectConfig, format: DocumentFormat) -> ConfigResult<String> {
        match format {
            DocumentFormat::Json => serde_json::to_string_pretty(project)
                .map_err(|e| ConfigError::malformed(format!("failed to serialize project: {}", e))),
            DocumentFormat::Yaml => serde_yaml::to_string(project)
                .map_err(|e| ConfigError::malformed(format!("failed to serialize project: {}", e))),
        }
    }

    fn resolve(&self, raw: RawProject) -> ConfigResult<ProjectConfig> {
        let mut seen = HashSet::new();
        let mut targets = Vec::with_capacity(raw.targets.len());

        for (i, target) in raw.targets.into_iter().enumerate() {
            let path = format!("targets[{}]", i);
            if !seen.insert(target.target_name.clone()) {
                return Err(ConfigError::new(
                    ConfigErrorKind::DuplicateTarget,
                    format!("duplicate target name '{}'", target.target_name),
                )
                .with_path(format!("{}.target_name", path))
                .with_suggestion("target names must be unique within a project"));
            }
            targets.push(self.resolve_target(target, &path)?);
        }

        Ok(ProjectConfig {
            project_name: raw.project_name,
            targets,
        })
    }

    fn resolve_target(&self, raw: RawTarget, path: &str) -> ConfigResult<TargetConfig> {
        Ok(TargetConfig {
            source: self.resolve_step::<dyn SourceStep>(raw.source, format!("{}.source", path))?,
            build_steps: self.resolve_steps::<dyn BuildStep>(raw.build_steps, path, "build_steps")?,
            archive_steps: self.resolve_steps::<dyn ArchiveStep>(
                raw.archive_steps,
                path,
                "archive_steps",
            )?,
            distribute_steps: self.resolve_steps::<dyn DistributeStep>(
                raw.distribute_steps,
                path,
                "distribute_steps",
            )?,
            target_name: raw.target_name,
        })
    }

    fn resolve_steps<S: ?Sized + StageStep>(
        &self,
        nodes: Vec<Value>,
        path: &str,
        field: &str,
    ) -> ConfigResult<Vec<StepConfig>> {
        nodes
            .into_iter()
            .enumerate()
            .map(|(i, node)| self.resolve_step::<S>(node, format!("{}.{}[{}]", path, field, i)))
            .collect()
    }

    fn resolve_step<S: ?Sized + StageStep>(
        &self,
        node: Value,
        path: String,
    ) -> ConfigResult<StepConfig> {
        let Value::Object(mut fields) = node else {
            return Err(ConfigError::malformed(format!(
                "{} step must be a mapping with a '{}' field",
                S::STAGE,
                TYPE_FIELD
            ))
            .with_path(path));
        };

        let type_name = match fields.remove(TYPE_FIELD) {
            Some(Value::String(type_name)) => type_name,
            Some(other) => {
                return Err(ConfigError::malformed(format!(
                    "'{}' must be a string, found {}",
                    TYPE_FIELD, other
                ))
                .with_path(path))
            }
            None => {
                return Err(ConfigError::malformed(format!(
                    "{} step is missing its '{}' field",
                    S::STAGE,
                    TYPE_FIELD
                ))
                .with_path(path)
                .with_suggestion(format!(
                    "known {} step types: {}",
                    S::STAGE,
                    self.registry.discriminators::<S>().join(", ")
                )))
            }
        };

        self.registry
            .decode::<S>(&type_name, Value::Object(fields))
            .map_err(|e| e.with_path(path))
    }
}
