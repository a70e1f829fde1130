//! # SSH Auth Secret Provider
//!
//! Stores an SSH private key (plus optional `known_hosts`) as a `kubernetes.io/ssh-auth` Secret.
//! Accepts either the key as a plain string or `{sshPrivateKey, knownHosts?}`.

use super::common::{
    self, env_var_payload, kubernetes_secret_manifest, merge_effects_by_identifier,
    single_strategy_kind, volume_payload, DeclaredSecrets, KubernetesSecretTarget, VOLUMES_PATH,
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

const PROVIDER_TYPE: &str = "sshAuth";
const SECRET_TYPE: &str = "kubernetes.io/ssh-auth";
const SUPPORTED: &[StrategyKind] = &[StrategyKind::Env, StrategyKind::Volume];
const ENV_KEYS: &[&str] = &["ssh-privatekey", "known_hosts"];

#[derive(Debug)]
pub struct SshAuthSecretProvider {
    target: KubernetesSecretTarget,
    declared: DeclaredSecrets,
}

impl SshAuthSecretProvider {
    #[must_use]
    pub fn new(target: KubernetesSecretTarget) -> Self {
        Self {
            target,
            declared: DeclaredSecrets::default(),
        }
    }
}

#[async_trait]
impl Provider for SshAuthSecretProvider {
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
        let mut data = BTreeMap::new();
        match value {
            Value::String(key) => {
                data.insert("ssh-privatekey".to_string(), key.as_bytes().to_vec());
            }
            Value::Object(fields) => {
                let key = fields
                    .get("sshPrivateKey")
                    .and_then(Value::as_str)
                    .ok_or_else(|| {
                        SecretError::Validation(format!(
                            "Provider '{PROVIDER_TYPE}' expects secret '{name}' to contain string field 'sshPrivateKey'"
                        ))
                    })?;
                data.insert("ssh-privatekey".to_string(), key.as_bytes().to_vec());

                match fields.get("knownHosts") {
                    Some(Value::String(hosts)) => {
                        data.insert("known_hosts".to_string(), hosts.as_bytes().to_vec());
                    }
                    Some(other) => {
                        return Err(SecretError::Validation(format!(
                            "Provider '{PROVIDER_TYPE}' expects field 'knownHosts' of secret '{name}' to be a string, got {}",
                            common::json_type_name(other)
                        )));
                    }
                    None => {}
                }
            }
            other => {
                return Err(SecretError::Validation(format!(
                    "Provider '{PROVIDER_TYPE}' expects secret '{name}' to be a string or object, got {}",
                    common::json_type_name(other)
                )));
            }
        }

        let manifest = kubernetes_secret_manifest(&self.target, SECRET_TYPE, data)?;
        Ok(vec![PreparedEffect::kubectl(manifest, PROVIDER_TYPE, name)])
    }

    fn get_injection_payload(&self, injections: &[Injection]) -> Result<Value> {
        self.declared.check(PROVIDER_TYPE, injections)?;
        match single_strategy_kind(PROVIDER_TYPE, injections)? {
            StrategyKind::Env => Ok(env_var_payload(&self.target.name, injections, |i| {
                match &i.meta.strategy {
                    InjectionStrategy::Env { key: Some(key), .. } => key.clone(),
                    _ => "ssh-privatekey".to_string(),
                }
            })),
            StrategyKind::Volume => Ok(volume_payload(&self.target, injections)),
            other => Err(SecretError::InjectionResolution(format!(
                "Provider '{PROVIDER_TYPE}' does not support strategy '{other}'"
            ))),
        }
    }

    fn get_target_path(&self, strategy: &InjectionStrategy) -> Result<String> {
        match strategy.kind() {
            StrategyKind::Env | StrategyKind::Volume => {
                common::default_target_path(PROVIDER_TYPE, strategy)
            }
            other => Err(SecretError::InjectionResolution(format!(
                "Provider '{PROVIDER_TYPE}' does not support strategy '{other}'"
            ))),
        }
    }

    fn companion_paths(&self, strategy: &InjectionStrategy) -> Result<Vec<String>> {
        match strategy {
            InjectionStrategy::Volume { .. } => Ok(vec![VOLUMES_PATH.to_string()]),
            _ => Ok(Vec::new()),
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
