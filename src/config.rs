//! # Project Configuration
//!
//! YAML project file describing the secret managers, the conflict policy and
//! (optionally) stacks whose manifests receive injections.
//!
//! ```yaml
//! manager:
//!   connectors:
//!     - name: env
//!       type: env
//!       prefix: SECRET_
//!   providers:
//!     - name: app
//!       type: opaque
//!       secretName: app-secret
//!   defaultConnector: env
//!   defaultProvider: app
//!   secrets:
//!     - name: API_KEY
//! conflict:
//!   strategies:
//!     crossStack: overwrite
//! ```
//!
//! Exactly one of `manager` or `registry` must be present. Relative paths resolve
//! against the directory holding the project file.

use crate::connector::{Connector, EnvConnector, FileConnector, InMemoryConnector};
use crate::error::{Result, SecretError};
use crate::manager::{SecretDefinition, SecretManager, SecretRegistry, DEFAULT_MANAGER_NAME};
use crate::merge::{ConflictOptions, ConflictScope, LegacyConflictLevels, MergeStrategy};
use crate::orchestrator::SecretSource;
use crate::provider::{
    BasicAuthSecretProvider, DockerConfigSecretProvider, ExternalStoreProvider,
    KubernetesSecretTarget, OpaqueSecretProvider, Provider, SshAuthSecretProvider, TlsSecretProvider,
};
use crate::stack::Stack;
use crate::strategy::InjectionStrategy;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProjectConfig {
    /// A single secret manager
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manager: Option<ManagerConfig>,
    /// Several named managers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registry: Option<Vec<RegistryEntryConfig>>,
    #[serde(default)]
    pub conflict: ConflictConfig,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stacks: Vec<StackConfig>,
    /// Directory relative paths resolve against; set by `load`
    #[serde(skip)]
    pub base_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ManagerConfig {
    /// Defaults to the registry entry name, or `default`
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub connectors: Vec<ConnectorConfig>,
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
    #[serde(default)]
    pub default_connector: Option<String>,
    #[serde(default)]
    pub default_provider: Option<String>,
    #[serde(default)]
    pub secrets: Vec<SecretDefinition>,
}

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegistryEntryConfig {
    pub name: String,
    /// Stack the manager belongs to; defaults to the entry name
    #[serde(default)]
    pub stack: Option<String>,
    pub manager: ManagerConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConnectorConfig {
    pub name: String,
    #[serde(flatten)]
    pub kind: ConnectorKind,
}

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum ConnectorKind {
    #[serde(rename_all = "camelCase")]
    Env {
        #[serde(default)]
        prefix: Option<String>,
        /// Also read `.env` from the working directory
        #[serde(default)]
        dot_env: bool,
        #[serde(default)]
        case_insensitive: bool,
        #[serde(default)]
        working_dir: Option<PathBuf>,
    },
    #[serde(rename_all = "camelCase")]
    File {
        dir: PathBuf,
        #[serde(default)]
        extension: Option<String>,
    },
    /// Literal values, mostly for tests and local development
    #[serde(rename_all = "camelCase")]
    InMemory {
        #[serde(default)]
        values: BTreeMap<String, Value>,
    },
}

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfig {
    pub name: String,
    #[serde(flatten)]
    pub kind: ProviderKind,
}

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum ProviderKind {
    Opaque(KubernetesSecretConfig),
    BasicAuth(KubernetesSecretConfig),
    Tls(KubernetesSecretConfig),
    SshAuth(KubernetesSecretConfig),
    DockerConfig(KubernetesSecretConfig),
    #[serde(rename_all = "camelCase")]
    ExternalStore {
        store_name: String,
        #[serde(default)]
        annotation_prefix: Option<String>,
        #[serde(default)]
        target_kind: Option<String>,
    },
}

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct KubernetesSecretConfig {
    pub secret_name: String,
    #[serde(default)]
    pub namespace: Option<String>,
    #[serde(default)]
    pub target_kind: Option<String>,
}

impl KubernetesSecretConfig {
    fn target(&self) -> KubernetesSecretTarget {
        let mut target = KubernetesSecretTarget::new(
            self.secret_name.clone(),
            self.namespace
                .clone()
                .unwrap_or_else(|| crate::provider::common::DEFAULT_NAMESPACE.to_string()),
        );
        if let Some(kind) = &self.target_kind {
            target = target.with_target_kind(kind.clone());
        }
        target
    }
}

/// Conflict policy; `levels` is the older three-level form
#[derive(Debug, Clone, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConflictConfig {
    #[serde(default)]
    pub strict: bool,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub strategies: BTreeMap<ConflictScope, MergeStrategy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub levels: Option<LegacyConflictLevels>,
}

impl ConflictConfig {
    /// Legacy levels apply first, explicit scopes override them
    pub fn to_options(&self) -> Result<ConflictOptions> {
        let mut options = if self.strict {
            ConflictOptions::strict()
        } else {
            ConflictOptions::default()
        };
        if let Some(levels) = &self.levels {
            for (scope, strategy) in levels.overrides() {
                options.set_strategy(scope, strategy)?;
            }
        }
        for (scope, strategy) in &self.strategies {
            options.set_strategy(*scope, *strategy)?;
        }
        Ok(options)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StackConfig {
    pub name: String,
    /// Registry entry providing the secrets; `default` for a single manager
    #[serde(default = "default_manager_name")]
    pub manager: String,
    #[serde(default)]
    pub default_resource: Option<String>,
    /// Composed manifests keyed by resource id
    #[serde(default)]
    pub resources: BTreeMap<String, Value>,
    #[serde(default)]
    pub injections: Vec<InjectionConfig>,
}

fn default_manager_name() -> String {
    DEFAULT_MANAGER_NAME.to_string()
}

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct InjectionConfig {
    pub secret: String,
    pub strategy: InjectionStrategy,
    #[serde(default)]
    pub resource: Option<String>,
    /// Name inside the workload (env var name, annotation suffix)
    #[serde(default, rename = "as")]
    pub target_name: Option<String>,
}

/// Managers and conflict policy built from a project file
#[derive(Debug)]
pub struct BuiltProject {
    pub source: SecretSource,
    pub conflict: ConflictOptions,
}

impl ProjectConfig {
    /// Read and parse a project file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            SecretError::Configuration(format!("Failed to read {}: {e}", path.display()))
        })?;
        let mut config = Self::from_yaml(&content).map_err(|e| match e {
            SecretError::Configuration(msg) => {
                SecretError::Configuration(format!("{}: {msg}", path.display()))
            }
            other => other,
        })?;
        config.base_dir = path.parent().map(Path::to_path_buf);
        debug!("Loaded project configuration from {}", path.display());
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content)
            .map_err(|e| SecretError::Configuration(format!("Invalid project configuration: {e}")))
    }

    /// JSON schema of the project file
    #[must_use]
    pub fn json_schema() -> Value {
        serde_json::to_value(schemars::schema_for!(ProjectConfig)).unwrap_or(Value::Null)
    }

    fn resolve_path(&self, path: &Path) -> PathBuf {
        match &self.base_dir {
            Some(base) if path.is_relative() => base.join(path),
            _ => path.to_path_buf(),
        }
    }

    /// Instantiate managers, connectors and providers
    pub fn build(&self) -> Result<BuiltProject> {
        let source = match (&self.manager, &self.registry) {
            (Some(manager), None) => {
                let name = manager
                    .name
                    .clone()
                    .unwrap_or_else(|| DEFAULT_MANAGER_NAME.to_string());
                SecretSource::manager(self.build_manager(&name, manager)?)
            }
            (None, Some(entries)) => {
                let mut registry = SecretRegistry::new();
                for entry in entries {
                    let name = entry.manager.name.clone().unwrap_or_else(|| entry.name.clone());
                    let manager = self.build_manager(&name, &entry.manager)?;
                    let stack = entry.stack.as_deref().unwrap_or(&entry.name);
                    registry.add_to_stack(stack, &entry.name, manager)?;
                }
                SecretSource::registry(registry)
            }
            (Some(_), Some(_)) => {
                return Err(SecretError::Configuration(
                    "Configure either 'manager' or 'registry', not both".to_string(),
                ));
            }
            (None, None) => {
                return Err(SecretError::Configuration(
                    "No secret manager or secret registry is configured".to_string(),
                ));
            }
        };

        let conflict = self.conflict.to_options()?;
        info!(
            "Built project with {} managers (strict conflicts: {})",
            source.registry.as_ref().map_or(1, SecretRegistry::len),
            conflict.is_strict()
        );
        Ok(BuiltProject { source, conflict })
    }

    fn build_manager(&self, name: &str, config: &ManagerConfig) -> Result<SecretManager> {
        let mut manager = SecretManager::named(name);
        for connector in &config.connectors {
            manager.add_connector_arc(&connector.name, self.build_connector(&connector.kind))?;
        }
        for provider in &config.providers {
            manager.add_provider_arc(&provider.name, build_provider(&provider.kind))?;
        }
        if let Some(default) = &config.default_connector {
            manager.set_default_connector(default)?;
        }
        if let Some(default) = &config.default_provider {
            manager.set_default_provider(default)?;
        }
        for secret in &config.secrets {
            manager.add_secret(secret.clone())?;
        }
        Ok(manager)
    }

    fn build_connector(&self, kind: &ConnectorKind) -> Arc<dyn Connector> {
        match kind {
            ConnectorKind::Env {
                prefix,
                dot_env,
                case_insensitive,
                working_dir,
            } => {
                let mut connector = EnvConnector::new()
                    .with_dot_env(*dot_env)
                    .case_insensitive(*case_insensitive);
                if let Some(prefix) = prefix {
                    connector = connector.with_prefix(prefix.clone());
                }
                let dir = working_dir
                    .as_deref()
                    .map(|d| self.resolve_path(d))
                    .or_else(|| self.base_dir.clone());
                if let Some(dir) = dir {
                    connector.set_working_dir(&dir);
                }
                Arc::new(connector)
            }
            ConnectorKind::File { dir, extension } => {
                let mut connector = FileConnector::new(self.resolve_path(dir));
                if let Some(extension) = extension {
                    connector = connector.with_extension(extension.clone());
                }
                Arc::new(connector)
            }
            ConnectorKind::InMemory { values } => Arc::new(InMemoryConnector::new(values.clone())),
        }
    }

    /// Build the configured stacks against the managers of `source`
    pub fn build_stacks(&self, source: &SecretSource) -> Result<Vec<Stack>> {
        let mut stacks = Vec::new();
        for config in &self.stacks {
            let manager = lookup_manager(source, &config.manager)?;
            let mut stack = Stack::new(config.name.clone());
            for (id, manifest) in &config.resources {
                stack.add_resource(id, manifest.clone())?;
            }
            stack.use_secrets(&manager, |ctx| {
                if let Some(default) = &config.default_resource {
                    ctx.set_default_resource_id(default);
                }
                for injection in &config.injections {
                    let builder = ctx.secrets(&injection.secret)?.inject(injection.strategy.clone())?;
                    if let Some(resource) = &injection.resource {
                        builder.into_resource(resource);
                    }
                    if let Some(alias) = &injection.target_name {
                        builder.for_name(alias);
                    }
                }
                Ok(())
            })?;
            stacks.push(stack);
        }
        Ok(stacks)
    }
}

fn build_provider(kind: &ProviderKind) -> Arc<dyn Provider> {
    match kind {
        ProviderKind::Opaque(c) => Arc::new(OpaqueSecretProvider::new(c.target())),
        ProviderKind::BasicAuth(c) => Arc::new(BasicAuthSecretProvider::new(c.target())),
        ProviderKind::Tls(c) => Arc::new(TlsSecretProvider::new(c.target())),
        ProviderKind::SshAuth(c) => Arc::new(SshAuthSecretProvider::new(c.target())),
        ProviderKind::DockerConfig(c) => Arc::new(DockerConfigSecretProvider::new(c.target())),
        ProviderKind::ExternalStore {
            store_name,
            annotation_prefix,
            target_kind,
        } => {
            let mut provider = ExternalStoreProvider::new(store_name.clone());
            if let Some(prefix) = annotation_prefix {
                provider = provider.with_annotation_prefix(prefix.clone());
            }
            if let Some(kind) = target_kind {
                provider = provider.with_target_kind(kind.clone());
            }
            Arc::new(provider)
        }
    }
}

fn lookup_manager(source: &SecretSource, name: &str) -> Result<Arc<SecretManager>> {
    if let Some(registry) = &source.registry {
        return registry.get(name).cloned().ok_or_else(|| {
            SecretError::Resolution(format!("Stack references unknown registry entry '{name}'"))
        });
    }
    match &source.manager {
        Some(manager) if name == DEFAULT_MANAGER_NAME || name == manager.name() => {
            Ok(Arc::clone(manager))
        }
        _ => Err(SecretError::Resolution(format!(
            "Stack references unknown manager '{name}'"
        ))),
    }
}
