//! # Common Provider Utilities
//!
//! Shared utilities and patterns used across all provider implementations:
//! Kubernetes `Secret` manifest construction, container path helpers,
//! the destination-keyed effect merge handler and declared-secret tracking.

use crate::effect::PreparedEffect;
use crate::error::{Result, SecretError};
use crate::injection::Injection;
use crate::manager::SecretDefinition;
use crate::strategy::{InjectionStrategy, StrategyKind};
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::ByteString;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::{PoisonError, RwLock};
use tracing::debug;

/// Resource kind providers inject into unless configured otherwise
pub const DEFAULT_TARGET_KIND: &str = "Deployment";

pub const DEFAULT_NAMESPACE: &str = "default";

/// Where a Kubernetes-backed provider writes its `Secret`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct KubernetesSecretTarget {
    /// Name of the generated `Secret`
    pub name: String,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    /// Resource kind to inject into
    #[serde(default = "default_target_kind")]
    pub target_kind: String,
}

fn default_namespace() -> String {
    DEFAULT_NAMESPACE.to_string()
}

fn default_target_kind() -> String {
    DEFAULT_TARGET_KIND.to_string()
}

impl KubernetesSecretTarget {
    #[must_use]
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            target_kind: default_target_kind(),
        }
    }

    #[must_use]
    pub fn with_target_kind(mut self, kind: impl Into<String>) -> Self {
        self.target_kind = kind.into();
        self
    }

    /// Volume name derived from the secret name (DNS-1123 label)
    #[must_use]
    pub fn volume_name(&self) -> String {
        let sanitized: String = self
            .name
            .to_lowercase()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '-' })
            .collect();
        let trimmed = sanitized.trim_matches('-');
        let mut name = format!("{trimmed}-secret");
        name.truncate(63);
        name
    }
}

/// Build a `Secret` manifest; data values are base64-encoded on serialization
pub fn kubernetes_secret_manifest(
    target: &KubernetesSecretTarget,
    secret_type: &str,
    data: BTreeMap<String, Vec<u8>>,
) -> Result<Value> {
    let secret = Secret {
        metadata: ObjectMeta {
            name: Some(target.name.clone()),
            namespace: Some(target.namespace.clone()),
            ..ObjectMeta::default()
        },
        type_: Some(secret_type.to_string()),
        data: Some(data.into_iter().map(|(k, v)| (k, ByteString(v))).collect()),
        ..Secret::default()
    };

    // k8s-openapi writes apiVersion/kind itself
    serde_json::to_value(&secret).map_err(|e| {
        SecretError::Validation(format!(
            "Failed to serialize Secret {}/{}: {e}",
            target.namespace, target.name
        ))
    })
}

/// `spec.template.spec.containers[i].<field>`
#[must_use]
pub fn container_path(index: usize, field: &str) -> String {
    format!("spec.template.spec.containers[{index}].{field}")
}

pub const VOLUMES_PATH: &str = "spec.template.spec.volumes";
pub const IMAGE_PULL_SECRETS_PATH: &str = "spec.template.spec.imagePullSecrets";
pub const ANNOTATIONS_PATH: &str = "metadata.annotations";

/// Default paths for the container-scoped and pod-scoped strategies
pub fn default_target_path(provider_type: &str, strategy: &InjectionStrategy) -> Result<String> {
    if let Some(path) = strategy.target_path() {
        return Ok(path.to_string());
    }
    let index = strategy.container_index();
    match strategy {
        InjectionStrategy::Env { .. } => Ok(container_path(index, "env")),
        InjectionStrategy::EnvFrom { .. } => Ok(container_path(index, "envFrom")),
        InjectionStrategy::Volume { .. } => Ok(container_path(index, "volumeMounts")),
        InjectionStrategy::ImagePullSecret { .. } => Ok(IMAGE_PULL_SECRETS_PATH.to_string()),
        InjectionStrategy::Annotation { .. } => Ok(ANNOTATIONS_PATH.to_string()),
        InjectionStrategy::Plugin { .. } => Err(SecretError::InjectionResolution(format!(
            "Provider '{provider_type}' has no default path for the plugin strategy; set target_path"
        ))),
    }
}

/// Ensure every injection in a payload group uses the same strategy kind
pub fn single_strategy_kind(provider_type: &str, injections: &[Injection]) -> Result<StrategyKind> {
    let first = injections.first().ok_or_else(|| {
        SecretError::InjectionResolution(format!(
            "Provider '{provider_type}' received an empty injection group"
        ))
    })?;
    let kind = first.meta.strategy.kind();
    if let Some(other) = injections.iter().find(|i| i.meta.strategy.kind() != kind) {
        return Err(SecretError::InjectionResolution(format!(
            "Provider '{provider_type}' cannot mix strategies '{kind}' and '{}' at path '{}'",
            other.meta.strategy.kind(),
            first.path
        )));
    }
    Ok(kind)
}

/// Env var entries referencing keys of one `Secret`
///
/// `key_for` maps an injection to the key inside the Secret.
pub fn env_var_payload<F>(secret_name: &str, injections: &[Injection], key_for: F) -> Value
where
    F: Fn(&Injection) -> String,
{
    let entries = injections
        .iter()
        .map(|injection| {
            serde_json::json!({
                "name": injection.meta.target_name,
                "valueFrom": {
                    "secretKeyRef": {
                        "name": secret_name,
                        "key": key_for(injection),
                    }
                }
            })
        })
        .collect();
    Value::Array(entries)
}

/// `envFrom` entries, one per distinct prefix
#[must_use]
pub fn env_from_payload(secret_name: &str, injections: &[Injection]) -> Value {
    let mut seen: Vec<Option<String>> = Vec::new();
    let mut entries = Vec::new();
    for injection in injections {
        let prefix = match &injection.meta.strategy {
            InjectionStrategy::EnvFrom { prefix, .. } => prefix.clone(),
            _ => None,
        };
        if seen.contains(&prefix) {
            continue;
        }
        let mut entry = Map::new();
        if let Some(p) = &prefix {
            entry.insert("prefix".to_string(), Value::String(p.clone()));
        }
        entry.insert("secretRef".to_string(), serde_json::json!({ "name": secret_name }));
        entries.push(Value::Object(entry));
        seen.push(prefix);
    }
    Value::Array(entries)
}

/// Payload for the volume strategy
///
/// The primary path receives `volumeMounts` entries, the companion path the `volumes` entry.
#[must_use]
pub fn volume_payload(target: &KubernetesSecretTarget, injections: &[Injection]) -> Value {
    let volume_name = target.volume_name();
    if injections.iter().any(|i| i.meta.companion) {
        return serde_json::json!([{
            "name": volume_name,
            "secret": { "secretName": target.name }
        }]);
    }

    let mut mount_paths: Vec<&str> = Vec::new();
    for injection in injections {
        if let InjectionStrategy::Volume { mount_path, .. } = &injection.meta.strategy {
            if !mount_paths.contains(&mount_path.as_str()) {
                mount_paths.push(mount_path);
            }
        }
    }
    Value::Array(
        mount_paths
            .into_iter()
            .map(|mount_path| {
                serde_json::json!({
                    "name": volume_name,
                    "mountPath": mount_path,
                    "readOnly": true,
                })
            })
            .collect(),
    )
}

/// Merge handler grouping effects by destination
///
/// Effects with the same identifier are combined into one by concatenating their
/// `data` maps. Two contributions supplying the same key to one destination are a conflict.
/// Effects without an identifier pass through untouched.
pub fn merge_effects_by_identifier<F>(
    effects: Vec<PreparedEffect>,
    identify: F,
) -> Result<Vec<PreparedEffect>>
where
    F: Fn(&PreparedEffect) -> Option<String>,
{
    let mut merged: Vec<PreparedEffect> = Vec::new();
    let mut index_by_id: HashMap<String, usize> = HashMap::new();
    let mut key_owner: HashMap<(String, String), String> = HashMap::new();

    for effect in effects {
        let Some(id) = identify(&effect) else {
            merged.push(effect);
            continue;
        };

        let data: Vec<(String, Value)> = effect
            .data()
            .map(|d| d.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default();

        for (key, _) in &data {
            if let Some(owner) = key_owner.get(&(id.clone(), key.clone())) {
                return Err(SecretError::Conflict(format!(
                    "Key '{key}' is supplied twice for destination '{id}' (by secrets '{owner}' and '{}')",
                    effect.secret_name
                )));
            }
            key_owner.insert((id.clone(), key.clone()), effect.secret_name.clone());
        }

        match index_by_id.get(&id) {
            Some(&index) => {
                debug!("Merging effect of secret {} into {}", effect.secret_name, id);
                if let Some(target) = merged[index].data_mut() {
                    target.extend(data);
                }
            }
            None => {
                index_by_id.insert(id, merged.len());
                merged.push(effect);
            }
        }
    }
    Ok(merged)
}

/// Secret definitions pushed by the manager before payload generation
#[derive(Debug, Default)]
pub struct DeclaredSecrets {
    secrets: RwLock<BTreeMap<String, SecretDefinition>>,
}

impl DeclaredSecrets {
    pub fn replace(&self, secrets: &BTreeMap<String, SecretDefinition>) {
        let mut current = self.secrets.write().unwrap_or_else(PoisonError::into_inner);
        current.clone_from(secrets);
    }

    /// Reject injections for secrets the manager never declared
    /// Nothing is checked until definitions have been pushed
    pub fn check(&self, provider_type: &str, injections: &[Injection]) -> Result<()> {
        let secrets = self.secrets.read().unwrap_or_else(PoisonError::into_inner);
        if secrets.is_empty() {
            return Ok(());
        }
        for injection in injections {
            if !secrets.contains_key(&injection.meta.secret_name) {
                return Err(SecretError::InjectionResolution(format!(
                    "Provider '{provider_type}' received an injection for undeclared secret '{}'",
                    injection.meta.secret_name
                )));
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.secrets.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Read a required string field from a structured secret value
pub fn required_string_field<'a>(
    provider_type: &str,
    secret_name: &str,
    value: &'a Value,
    field: &str,
) -> Result<&'a str> {
    let object = value.as_object().ok_or_else(|| {
        SecretError::Validation(format!(
            "Provider '{provider_type}' expects secret '{secret_name}' to be an object, got {}",
            json_type_name(value)
        ))
    })?;
    match object.get(field) {
        Some(Value::String(s)) => Ok(s.as_str()),
        Some(other) => Err(SecretError::Validation(format!(
            "Provider '{provider_type}' expects field '{field}' of secret '{secret_name}' to be a string, got {}",
            json_type_name(other)
        ))),
        None => Err(SecretError::Validation(format!(
            "Provider '{provider_type}' expects secret '{secret_name}' to contain field '{field}'"
        ))),
    }
}

#[must_use]
pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
