//! # Injection Strategies
//!
//! How a secret is embedded into a workload: as a single env var, as bulk `envFrom`,
//! as a mounted volume, as an annotation, as an image pull reference, or through a
//! provider-defined plugin action.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Strategy family, used for capability declarations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum StrategyKind {
    Env,
    EnvFrom,
    Volume,
    Annotation,
    ImagePullSecret,
    Plugin,
}

impl StrategyKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::Env => "env",
            StrategyKind::EnvFrom => "envFrom",
            StrategyKind::Volume => "volume",
            StrategyKind::Annotation => "annotation",
            StrategyKind::ImagePullSecret => "imagePullSecret",
            StrategyKind::Plugin => "plugin",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A concrete injection strategy
///
/// Every variant can carry `target_path`, which replaces the provider's default path.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum InjectionStrategy {
    #[serde(rename_all = "camelCase")]
    Env {
        #[serde(default)]
        container_index: Option<usize>,
        /// Key inside a structured secret (e.g. `username` for basic auth)
        #[serde(default)]
        key: Option<String>,
        #[serde(default)]
        target_path: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    EnvFrom {
        #[serde(default)]
        container_index: Option<usize>,
        #[serde(default)]
        prefix: Option<String>,
        #[serde(default)]
        target_path: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    Volume {
        mount_path: String,
        #[serde(default)]
        container_index: Option<usize>,
        #[serde(default)]
        target_path: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    Annotation {
        #[serde(default)]
        target_path: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    ImagePullSecret {
        #[serde(default)]
        target_path: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    Plugin {
        #[serde(default)]
        action: Option<String>,
        #[serde(default)]
        args: Vec<serde_json::Value>,
        #[serde(default)]
        target_path: Option<String>,
    },
}

impl InjectionStrategy {
    /// Plain `env` into the first container
    #[must_use]
    pub fn env() -> Self {
        InjectionStrategy::Env {
            container_index: None,
            key: None,
            target_path: None,
        }
    }

    /// `env` selecting one key of a structured secret
    #[must_use]
    pub fn env_key(key: impl Into<String>) -> Self {
        InjectionStrategy::Env {
            container_index: None,
            key: Some(key.into()),
            target_path: None,
        }
    }

    #[must_use]
    pub fn env_from(prefix: Option<&str>) -> Self {
        InjectionStrategy::EnvFrom {
            container_index: None,
            prefix: prefix.map(str::to_string),
            target_path: None,
        }
    }

    #[must_use]
    pub fn volume(mount_path: impl Into<String>) -> Self {
        InjectionStrategy::Volume {
            mount_path: mount_path.into(),
            container_index: None,
            target_path: None,
        }
    }

    #[must_use]
    pub fn annotation() -> Self {
        InjectionStrategy::Annotation { target_path: None }
    }

    #[must_use]
    pub fn image_pull_secret() -> Self {
        InjectionStrategy::ImagePullSecret { target_path: None }
    }

    #[must_use]
    pub fn plugin(action: impl Into<String>, target_path: impl Into<String>) -> Self {
        InjectionStrategy::Plugin {
            action: Some(action.into()),
            args: Vec::new(),
            target_path: Some(target_path.into()),
        }
    }

    /// Replace the provider default path with an explicit one
    #[must_use]
    pub fn with_target_path(mut self, path: impl Into<String>) -> Self {
        let path = Some(path.into());
        match &mut self {
            InjectionStrategy::Env { target_path, .. }
            | InjectionStrategy::EnvFrom { target_path, .. }
            | InjectionStrategy::Volume { target_path, .. }
            | InjectionStrategy::Annotation { target_path }
            | InjectionStrategy::ImagePullSecret { target_path }
            | InjectionStrategy::Plugin { target_path, .. } => *target_path = path,
        }
        self
    }

    /// Select the container the strategy writes into
    #[must_use]
    pub fn in_container(mut self, index: usize) -> Self {
        match &mut self {
            InjectionStrategy::Env { container_index, .. }
            | InjectionStrategy::EnvFrom { container_index, .. }
            | InjectionStrategy::Volume { container_index, .. } => *container_index = Some(index),
            InjectionStrategy::Annotation { .. }
            | InjectionStrategy::ImagePullSecret { .. }
            | InjectionStrategy::Plugin { .. } => {}
        }
        self
    }

    #[must_use]
    pub fn kind(&self) -> StrategyKind {
        match self {
            InjectionStrategy::Env { .. } => StrategyKind::Env,
            InjectionStrategy::EnvFrom { .. } => StrategyKind::EnvFrom,
            InjectionStrategy::Volume { .. } => StrategyKind::Volume,
            InjectionStrategy::Annotation { .. } => StrategyKind::Annotation,
            InjectionStrategy::ImagePullSecret { .. } => StrategyKind::ImagePullSecret,
            InjectionStrategy::Plugin { .. } => StrategyKind::Plugin,
        }
    }

    #[must_use]
    pub fn target_path(&self) -> Option<&str> {
        match self {
            InjectionStrategy::Env { target_path, .. }
            | InjectionStrategy::EnvFrom { target_path, .. }
            | InjectionStrategy::Volume { target_path, .. }
            | InjectionStrategy::Annotation { target_path }
            | InjectionStrategy::ImagePullSecret { target_path }
            | InjectionStrategy::Plugin { target_path, .. } => target_path.as_deref(),
        }
    }

    /// Container index for container-scoped strategies, 0 when unset
    #[must_use]
    pub fn container_index(&self) -> usize {
        match self {
            InjectionStrategy::Env { container_index, .. }
            | InjectionStrategy::EnvFrom { container_index, .. }
            | InjectionStrategy::Volume { container_index, .. } => container_index.unwrap_or(0),
            _ => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_deserializes_from_tagged_yaml() {
        let yaml = "kind: env\ncontainerIndex: 1\nkey: username\n";
        let strategy: InjectionStrategy = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(
            strategy,
            InjectionStrategy::Env {
                container_index: Some(1),
                key: Some("username".to_string()),
                target_path: None,
            }
        );
        assert_eq!(strategy.kind(), StrategyKind::Env);
        assert_eq!(strategy.container_index(), 1);
    }

    #[test]
    fn test_with_target_path_applies_to_every_variant() {
        let strategies = vec![
            InjectionStrategy::env(),
            InjectionStrategy::env_from(Some("DB_")),
            InjectionStrategy::volume("/etc/tls"),
            InjectionStrategy::annotation(),
            InjectionStrategy::image_pull_secret(),
            InjectionStrategy::plugin("sync", "spec.x"),
        ];
        for strategy in strategies {
            let kind = strategy.kind();
            let overridden = strategy.with_target_path("spec.custom");
            assert_eq!(overridden.target_path(), Some("spec.custom"), "{kind}");
        }
    }

    #[test]
    fn test_in_container_ignored_for_pod_level_strategies() {
        let strategy = InjectionStrategy::image_pull_secret().in_container(3);
        assert_eq!(strategy.container_index(), 0);
        let strategy = InjectionStrategy::env().in_container(2);
        assert_eq!(strategy.container_index(), 2);
    }
}
