// Step Registry
// Maps step configurations to the modules that build runnable steps from them

use crate::config::{ConfigError, ConfigErrorKind, ModuleConfig, StepConfig};
use crate::modules::steps::{ArchiveStep, BuildStep, DistributeStep, SourceStep, StageKind};
use crate::pipeline::workspace::Workspace;

use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Zero or several modules claim a step configuration
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolutionError {
    #[error("no {stage} module matches step type '{type_name}'")]
    NoMatchingModule { stage: StageKind, type_name: String },

    #[error("step type '{type_name}' matches several {stage} modules: {}", modules.join(", "))]
    AmbiguousModules {
        stage: StageKind,
        type_name: String,
        modules: Vec<String>,
    },

    #[error("module '{module}' matched step type '{type_name}' but cannot use its config")]
    ConfigMismatch { module: String, type_name: String },
}

/// An extensibility unit: a config shape, its discriminator and a step factory.
///
/// `Step` is the stage trait object the module produces, which also decides
/// the stage table the module is registered in.
pub trait Module: Send + Sync + 'static {
    type Config: ModuleConfig;
    type Step: ?Sized + StageStep;

    fn name(&self) -> &str {
        <Self::Config as ModuleConfig>::TYPE_NAME
    }

    /// Whether this module owns `config`
    fn matches(&self, config: &StepConfig) -> bool {
        config.is::<Self::Config>()
    }

    fn create_step(&self, config: &Self::Config, workspace: &Workspace) -> Box<Self::Step>;
}

/// Type-erased view of a [`Module`] stored in a stage table
pub trait RegisteredModule<S: ?Sized>: Send + Sync {
    fn module_name(&self) -> &str;

    fn discriminator(&self) -> &'static str;

    fn config_matches(&self, config: &StepConfig) -> bool;

    /// Decode the fields of a step node (without its `type`)
    fn decode_config(&self, fields: Value) -> Result<StepConfig, serde_json::Error>;

    fn instantiate(
        &self,
        config: &StepConfig,
        workspace: &Workspace,
    ) -> Result<Box<S>, ResolutionError>;
}

impl<M: Module> RegisteredModule<M::Step> for M {
    fn module_name(&self) -> &str {
        self.name()
    }

    fn discriminator(&self) -> &'static str {
        <M::Config as ModuleConfig>::TYPE_NAME
    }

    fn config_matches(&self, config: &StepConfig) -> bool {
        self.matches(config)
    }

    fn decode_config(&self, fields: Value) -> Result<StepConfig, serde_json::Error> {
        let config: M::Config = serde_json::from_value(fields)?;
        StepConfig::new(config)
    }

    fn instantiate(
        &self,
        config: &StepConfig,
        workspace: &Workspace,
    ) -> Result<Box<M::Step>, ResolutionError> {
        let typed = config
            .downcast_ref::<M::Config>()
            .ok_or_else(|| ResolutionError::ConfigMismatch {
                module: self.name().to_string(),
                type_name: config.type_name().to_string(),
            })?;
        Ok(self.create_step(typed, workspace))
    }
}

/// Modules registered for one stage
pub struct ModuleTable<S: ?Sized> {
    modules: Vec<Arc<dyn RegisteredModule<S>>>,
}

impl<S: ?Sized> Default for ModuleTable<S> {
    fn default() -> Self {
        Self {
            modules: Vec::new(),
        }
    }
}

impl<S: ?Sized> ModuleTable<S> {
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn RegisteredModule<S>>> {
        self.modules.iter()
    }
}

/// Binds a stage step trait object to its table in the registry
pub trait StageStep: Send + Sync + 'static {
    const STAGE: StageKind;

    fn table(registry: &StepRegistry) -> &ModuleTable<Self>;

    fn table_mut(registry: &mut StepRegistry) -> &mut ModuleTable<Self>;
}

impl StageStep for dyn SourceStep {
    const STAGE: StageKind = StageKind::Source;

    fn table(registry: &StepRegistry) -> &ModuleTable<Self> {
        &registry.source
    }

    fn table_mut(registry: &mut StepRegistry) -> &mut ModuleTable<Self> {
        &mut registry.source
    }
}

impl StageStep for dyn BuildStep {
    const STAGE: StageKind = StageKind::Build;

    fn table(registry: &StepRegistry) -> &ModuleTable<Self> {
        &registry.build
    }

    fn table_mut(registry: &mut StepRegistry) -> &mut ModuleTable<Self> {
        &mut registry.build
    }
}

impl StageStep for dyn ArchiveStep {
    const STAGE: StageKind = StageKind::Archive;

    fn table(registry: &StepRegistry) -> &ModuleTable<Self> {
        &registry.archive
    }

    fn table_mut(registry: &mut StepRegistry) -> &mut ModuleTable<Self> {
        &mut registry.archive
    }
}

impl StageStep for dyn DistributeStep {
    const STAGE: StageKind = StageKind::Distribute;

    fn table(registry: &StepRegistry) -> &ModuleTable<Self> {
        &registry.distribute
    }

    fn table_mut(registry: &mut StepRegistry) -> &mut ModuleTable<Self> {
        &mut registry.distribute
    }
}

/// Registry of step modules, one table per stage.
///
/// Populated once at startup and read-only afterwards. Resolution never
/// depends on registration order: a config claimed by two modules is an error.
#[derive(Default)]
pub struct StepRegistry {
    source: ModuleTable<dyn SourceStep>,
    build: ModuleTable<dyn BuildStep>,
    archive: ModuleTable<dyn ArchiveStep>,
    distribute: ModuleTable<dyn DistributeStep>,
}

impl StepRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every built-in module
    pub fn with_builtin_modules() -> Self {
        let mut registry = Self::new();
        for registration in crate::modules::available_modules() {
            registration.register_into(&mut registry);
        }
        registry
    }

    pub fn register<M: Module>(&mut self, module: M) {
        let entry: Arc<dyn RegisteredModule<M::Step>> = Arc::new(module);
        <M::Step as StageStep>::table_mut(self).modules.push(entry);
    }

    pub fn with_module<M: Module>(mut self, module: M) -> Self {
        self.register(module);
        self
    }

    /// The single module of stage `S` that claims `config`
    pub fn resolve<S: ?Sized + StageStep>(
        &self,
        config: &StepConfig,
    ) -> Result<Arc<dyn RegisteredModule<S>>, ResolutionError> {
        let mut matching = S::table(self)
            .modules
            .iter()
            .filter(|m| m.config_matches(config));

        match (matching.next(), matching.next()) {
            (Some(module), None) => Ok(Arc::clone(module)),
            (None, _) => Err(ResolutionError::NoMatchingModule {
                stage: S::STAGE,
                type_name: config.type_name().to_string(),
            }),
            (Some(first), Some(second)) => {
                let mut modules = vec![
                    first.module_name().to_string(),
                    second.module_name().to_string(),
                ];
                modules.extend(matching.map(|m| m.module_name().to_string()));
                Err(ResolutionError::AmbiguousModules {
                    stage: S::STAGE,
                    type_name: config.type_name().to_string(),
                    modules,
                })
            }
        }
    }

    /// Resolve `config` and build its step
    pub fn create_step<S: ?Sized + StageStep>(
        &self,
        config: &StepConfig,
        workspace: &Workspace,
    ) -> Result<Box<S>, ResolutionError> {
        self.resolve::<S>(config)?.instantiate(config, workspace)
    }

    /// Decode a step node of stage `S` through the module owning `type_name`
    pub fn decode<S: ?Sized + StageStep>(
        &self,
        type_name: &str,
        fields: Value,
    ) -> Result<StepConfig, ConfigError> {
        let table = S::table(self);
        let owners: Vec<_> = table
            .modules
            .iter()
            .filter(|m| m.discriminator() == type_name)
            .collect();

        match owners.as_slice() {
            [module] => module
                .decode_config(fields)
                .map_err(|e| ConfigError::malformed(format!("invalid '{}' step: {}", type_name, e))),
            [] => {
                let known = self.discriminators::<S>();
                let error = ConfigError::unknown_step_type(S::STAGE, type_name);
                Err(if known.is_empty() {
                    error.with_suggestion(format!("no {} modules are registered", S::STAGE))
                } else {
                    error.with_suggestion(format!("known {} step types: {}", S::STAGE, known.join(", ")))
                })
            }
            several => Err(ConfigError::new(
                ConfigErrorKind::AmbiguousStepType,
                format!(
                    "{} step type '{}' is claimed by modules: {}",
                    S::STAGE,
                    type_name,
                    several
                        .iter()
                        .map(|m| m.module_name())
                        .collect::<Vec<_>>()
                        .join(", ")
                ),
            )),
        }
    }

    /// Discriminators registered for stage `S`, sorted
    pub fn discriminators<S: ?Sized + StageStep>(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = S::table(self).modules.iter().map(|m| m.discriminator()).collect();
        names.sort_unstable();
        names.dedup();
        names
    }

    pub fn sources(&self) -> &ModuleTable<dyn SourceStep> {
        &self.source
    }

    pub fn builds(&self) -> &ModuleTable<dyn BuildStep> {
        &self.build
    }

    pub fn archives(&self) -> &ModuleTable<dyn ArchiveStep> {
        &self.archive
    }

    pub fn distributions(&self) -> &ModuleTable<dyn DistributeStep> {
        &self.distribute
    }
}

impl fmt::Debug for StepRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepRegistry")
            .field("source", &self.discriminators::<dyn SourceStep>())
            .field("build", &self.discriminators::<dyn BuildStep>())
            .field("archive", &self.discriminators::<dyn ArchiveStep>())
            .field("distribute", &self.discriminators::<dyn DistributeStep>())
            .finish()
    }
}
