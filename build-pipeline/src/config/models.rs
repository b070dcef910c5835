// Project Configuration Models
// Typed project/target structure and the polymorphic step configuration value

use serde::de::DeserializeOwned;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use serde_json::Value;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Field carrying the step discriminator in serialized documents
pub const TYPE_FIELD: &str = "type";

/// A buildable project: a name and its ordered targets
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectConfig {
    pub project_name: String,
    pub targets: Vec<TargetConfig>,
}

/// One named way of building a project
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TargetConfig {
    pub target_name: String,
    pub source: StepConfig,
    pub build_steps: Vec<StepConfig>,
    pub archive_steps: Vec<StepConfig>,
    pub distribute_steps: Vec<StepConfig>,
}

impl ProjectConfig {
    pub fn new(project_name: impl Into<String>) -> Self {
        Self {
            project_name: project_name.into(),
            targets: Vec::new(),
        }
    }

    pub fn with_target(mut self, target: TargetConfig) -> Self {
        self.targets.push(target);
        self
    }

    /// Look up a target by name
    pub fn target(&self, name: &str) -> Option<&TargetConfig> {
        self.targets.iter().find(|t| t.target_name == name)
    }

    /// The target built when none is named
    pub fn default_target(&self) -> Option<&TargetConfig> {
        self.targets.first()
    }
}

impl TargetConfig {
    pub fn new(target_name: impl Into<String>, source: StepConfig) -> Self {
        Self {
            target_name: target_name.into(),
            source,
            build_steps: Vec::new(),
            archive_steps: Vec::new(),
            distribute_steps: Vec::new(),
        }
    }

    pub fn with_build_step(mut self, step: StepConfig) -> Self {
        self.build_steps.push(step);
        self
    }

    pub fn with_archive_step(mut self, step: StepConfig) -> Self {
        self.archive_steps.push(step);
        self
    }

    pub fn with_distribute_step(mut self, step: StepConfig) -> Self {
        self.distribute_steps.push(step);
        self
    }
}

/// A concrete step configuration shape owned by a module.
///
/// `TYPE_NAME` is written to the `type` field of serialized documents and is
/// part of the stable config format.
pub trait ModuleConfig: Serialize + DeserializeOwned + fmt::Debug + Send + Sync + 'static {
    const TYPE_NAME: &'static str;
}

/// A resolved, immutable step configuration.
///
/// Holds the discriminator, the canonical serialized fields and the typed
/// value produced by the owning module's decoder. Clones share the typed value.
#[derive(Clone)]
pub struct StepConfig {
    type_name: String,
    fields: Value,
    typed: Arc<dyn Any + Send + Sync>,
}

impl StepConfig {
    /// Wrap a typed module config
    pub fn new<C: ModuleConfig>(config: C) -> Result<Self, serde_json::Error> {
        let fields = serde_json::to_value(&config)?;
        Ok(Self {
            type_name: C::TYPE_NAME.to_string(),
            fields,
            typed: Arc::new(config),
        })
    }

    /// The discriminator string
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Canonical serialized fields, excluding the discriminator
    pub fn fields(&self) -> &Value {
        &self.fields
    }

    /// Whether the typed value is a `C`
    pub fn is<C: Any>(&self) -> bool {
        self.typed.is::<C>()
    }

    pub fn downcast_ref<C: Any>(&self) -> Option<&C> {
        self.typed.downcast_ref::<C>()
    }

    /// Whether both values share the same typed instance
    pub fn ptr_eq(&self, other: &StepConfig) -> bool {
        Arc::ptr_eq(&self.typed, &other.typed)
    }
}

impl PartialEq for StepConfig {
    fn eq(&self, other: &Self) -> bool {
        self.type_name == other.type_name && self.fields == other.fields
    }
}

impl fmt::Debug for StepConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepConfig")
            .field("type", &self.type_name)
            .field("fields", &self.fields)
            .finish()
    }
}

impl Serialize for StepConfig {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry(TYPE_FIELD, &self.type_name)?;
        if let Value::Object(fields) = &self.fields {
            for (key, value) in fields {
                map.serialize_entry(key, value)?;
            }
        }
        map.end()
    }
}
