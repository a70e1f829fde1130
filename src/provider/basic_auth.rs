//! # Basic Auth Secret Provider
//!
//! Stores `{username, password}` values as a `kubernetes.io/basic-auth` Secret.
//! `env` injections must pick one of the two keys.

use super::common::{
    self, env_from_payload, env_var_payload, kubernetes_secret_manifest,
    merge_effects_by_identifier, required_string_field, single_strategy_kind, DeclaredSecrets,
    KubernetesSecretTarget,
};
use super::Provider;
use crate::connector::SecretValue;
use crate::effect::PreparedEffect;
use crate::error::{Result, SecretError};
use crate::injection::Injection;
use crate::manager::SecretDefinition;
use crate::strategy::{InjectionStrategy, StrategyKind};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;

const PROVIDER_TYPE: &str = "basicAuth";
const SECRET_TYPE: &str = "kubernetes.io/basic-auth";
const SUPPORTED: &[StrategyKind] = &[StrategyKind::Env, StrategyKind::EnvFrom];
const ENV_KEYS: &[&str] = &["username", "password"];

#[derive(Debug)]
pub struct BasicAuthSecretProvider {
    target: KubernetesSecretTarget,
    declared: DeclaredSecrets,
}

impl BasicAuthSecretProvider {
    #[must_use]
    pub fn new(target: KubernetesSecretTarget) -> Self {
        Self {
            target,
            declared: DeclaredSecrets::default(),
        }
    }
}

#[async_trait]
impl Provider for BasicAuthSecretProvider {
    fn provider_type(&self) -> &'static str {
        PROVIDER_TYPE
    }

    fn target_kind(&self) -> &str {
        &self.target.target_kind
    }

    fn supported_strategies(&self) -> &[StrategyKind] {
        SUPPORTED
    }

    fn supported_env_keys(&self) -> &[&'static str] {
        ENV_KEYS
    }

    async fn prepare(&self, name: &str, value: &SecretValue) -> Result<Vec<PreparedEffect>> {
        let username = required_string_field(PROVIDER_TYPE, name, value, "username")?;
        let password = required_string_field(PROVIDER_TYPE, name, value, "password")?;

        let mut data = BTreeMap::new();
        data.insert("username".to_string(), username.as_bytes().to_vec());
        data.insert("password".to_string(), password.as_bytes().to_vec());
        let manifest = kubernetes_secret_manifest(&self.target, SECRET_TYPE, data)?;
        Ok(vec![PreparedEffect::kubectl(manifest, PROVIDER_TYPE, name)])
    }

    fn get_injection_payload(&self, injections: &[Injection]) -> Result<Value> {
        self.declared.check(PROVIDER_TYPE, injections)?;
        match single_strategy_kind(PROVIDER_TYPE, injections)? {
            StrategyKind::Env => {
                for injection in injections {
                    if let InjectionStrategy::Env { key: None, .. } = injection.meta.strategy {
                        return Err(SecretError::InjectionResolution(format!(
                            "Provider '{PROVIDER_TYPE}' needs an env key (username or password) for secret '{}'",
                            injection.meta.secret_name
                        )));
                    }
                }
                Ok(env_var_payload(&self.target.name, injections, |i| {
                    match &i.meta.strategy {
                        InjectionStrategy::Env { key: Some(key), .. } => key.clone(),
                        _ => String::new(),
                    }
                }))
            }
            StrategyKind::EnvFrom => Ok(env_from_payload(&self.target.name, injections)),
            other => Err(SecretError::InjectionResolution(format!(
                "Provider '{PROVIDER_TYPE}' does not support strategy '{other}'"
            ))),
        }
    }

    fn get_target_path(&self, strategy: &InjectionStrategy) -> Result<String> {
        match strategy.kind() {
            StrategyKind::Env | StrategyKind::EnvFrom => {
                common::default_target_path(PROVIDER_TYPE, strategy)
            }
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
