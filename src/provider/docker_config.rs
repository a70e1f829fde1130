//! # Docker Config Secret Provider
//!
//! Registry credentials (`{username, password, registry}`) rendered as a
//! `kubernetes.io/dockerconfigjson` Secret and wired in through `imagePullSecrets`.

use super::common::{
    self, kubernetes_secret_manifest, merge_effects_by_identifier, required_string_field,
    single_strategy_kind, DeclaredSecrets, KubernetesSecretTarget,
};
use super::Provider;
use crate::connector::SecretValue;
use crate::effect::PreparedEffect;
use crate::error::{Result, SecretError};
use crate::injection::Injection;
use crate::manager::SecretDefinition;
use crate::strategy::{InjectionStrategy, StrategyKind};
use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use serde_json::{json, Value};
use std::collections::BTreeMap;

const PROVIDER_TYPE: &str = "dockerConfig";
const SECRET_TYPE: &str = "kubernetes.io/dockerconfigjson";
const DATA_KEY: &str = ".dockerconfigjson";
const SUPPORTED: &[StrategyKind] = &[StrategyKind::ImagePullSecret];

#[derive(Debug)]
pub struct DockerConfigSecretProvider {
    target: KubernetesSecretTarget,
    declared: DeclaredSecrets,
}

impl DockerConfigSecretProvider {
    #[must_use]
    pub fn new(target: KubernetesSecretTarget) -> Self {
        Self {
            target,
            declared: DeclaredSecrets::default(),
        }
    }
}

/// `.dockerconfigjson` document for a single registry
fn docker_config_json(registry: &str, username: &str, password: &str) -> Value {
    let auth = general_purpose::STANDARD.encode(format!("{username}:{password}"));
    json!({
        "auths": {
            registry: {
                "username": username,
                "password": password,
                "auth": auth,
            }
        }
    })
}

#[async_trait]
impl Provider for DockerConfigSecretProvider {
    fn provider_type(&self) -> &'static str {
        PROVIDER_TYPE
    }

    fn target_kind(&self) -> &str {
        &self.target.target_kind
    }

    fn supported_strategies(&self) -> &[StrategyKind] {
        SUPPORTED
    }

    async fn prepare(&self, name: &str, value: &SecretValue) -> Result<Vec<PreparedEffect>> {
        let username = required_string_field(PROVIDER_TYPE, name, value, "username")?;
        let password = required_string_field(PROVIDER_TYPE, name, value, "password")?;
        let registry = required_string_field(PROVIDER_TYPE, name, value, "registry")?;

        let config = docker_config_json(registry, username, password);
        let encoded = serde_json::to_vec(&config).map_err(|e| {
            SecretError::Validation(format!(
                "Provider '{PROVIDER_TYPE}' could not encode docker config for secret '{name}': {e}"
            ))
        })?;

        let mut data = BTreeMap::new();
        data.insert(DATA_KEY.to_string(), encoded);
        let manifest = kubernetes_secret_manifest(&self.target, SECRET_TYPE, data)?;
        Ok(vec![PreparedEffect::kubectl(manifest, PROVIDER_TYPE, name)])
    }

    fn get_injection_payload(&self, injections: &[Injection]) -> Result<Value> {
        self.declared.check(PROVIDER_TYPE, injections)?;
        match single_strategy_kind(PROVIDER_TYPE, injections)? {
            // every injection points at the same Secret, so one reference is enough
            StrategyKind::ImagePullSecret => Ok(json!([{ "name": self.target.name }])),
            other => Err(SecretError::InjectionResolution(format!(
                "Provider '{PROVIDER_TYPE}' does not support strategy '{other}'"
            ))),
        }
    }

    fn get_target_path(&self, strategy: &InjectionStrategy) -> Result<String> {
        match strategy.kind() {
            StrategyKind::ImagePullSecret => common::default_target_path(PROVIDER_TYPE, strategy),
            other => Err(SecretError::InjectionResolution(format!(
                "Provider '{PROVIDER_TYPE}' does not support strategy '{other}'"
            ))),
        }
    }

    fn get_effect_identifier(&self, effect: &PreparedEffect) -> Option<String> {
        effect.manifest_identifier()
    }

    fn merge_secrets(&self, effects: Vec<PreparedEffect>) -> Result<Vec<PreparedEffect>> {
        merge_effects_by_identifier(effects, |e| self.get_effect_identifier(e))
    }

    fn inject_secrets(&self, secrets: &BTreeMap<String, SecretDefinition>) {
        self.declared.replace(secrets);
    }
}
