//! # TLS Secret Provider
//!
//! Stores `{cert, key}` values as a `kubernetes.io/tls` Secret (`tls.crt` / `tls.key`).

use super::common::{
    self, env_from_payload, env_var_payload, kubernetes_secret_manifest,
    merge_effects_by_identifier, required_string_field, single_strategy_kind, volume_payload, DeclaredSecrets,
    KubernetesSecretTarget, VOLUMES_PATH,
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

const PROVIDER_TYPE: &str = "tls";
const SECRET_TYPE: &str = "kubernetes.io/tls";
const SUPPORTED: &[StrategyKind] = &[StrategyKind::Env, StrategyKind::EnvFrom, StrategyKind::Volume];
const ENV_KEYS: &[&str] = &["tls.crt", "tls.key"];

#[derive(Debug)]
pub struct TlsSecretProvider {
    target: KubernetesSecretTarget,
    declared: DeclaredSecrets,
}

impl TlsSecretProvider {
    #[must_use]
    pub fn new(target: KubernetesSecretTarget) -> Self {
        Self {
            target,
            declared: DeclaredSecrets::default(),
        }
    }
}

#[async_trait]
impl Provider for TlsSecretProvider {
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
        let cert = required_string_field(PROVIDER_TYPE, name, value, "cert")?;
        let key = required_string_field(PROVIDER_TYPE, name, value, "key")?;

        let mut data = BTreeMap::new();
        data.insert("tls.crt".to_string(), cert.as_bytes().to_vec());
        data.insert("tls.key".to_string(), key.as_bytes().to_vec());
        let manifest = kubernetes_secret_manifest(&self.target, SECRET_TYPE, data)?;
        Ok(vec![PreparedEffect::kubectl(manifest, PROVIDER_TYPE, name)])
    }

    fn get_injection_payload(&self, injections: &[Injection]) -> Result<Value> {
        self.declared.check(PROVIDER_TYPE, injections)?;
        match single_strategy_kind(PROVIDER_TYPE, injections)? {
            StrategyKind::Env => Ok(env_var_payload(&self.target.name, injections, |i| {
                match &i.meta.strategy {
                    InjectionStrategy::Env { key: Some(key), .. } => key.clone(),
                    _ => "tls.crt".to_string(),
                }
            })),
            StrategyKind::EnvFrom => Ok(env_from_payload(&self.target.name, injections)),
            StrategyKind::Volume => Ok(volume_payload(&self.target, injections)),
            other => Err(SecretError::InjectionResolution(format!(
                "Provider '{PROVIDER_TYPE}' does not support strategy '{other}'"
            ))),
        }
    }

    fn get_target_path(&self, strategy: &InjectionStrategy) -> Result<String> {
        match strategy.kind() {
            StrategyKind::Env | StrategyKind::EnvFrom | StrategyKind::Volume => {
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

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_prepare_maps_cert_and_key() {
        let provider = TlsSecretProvider::new(KubernetesSecretTarget::new("ingress-tls", "web"));
        let effects = provider
            .prepare("INGRESS_TLS", &json!({"cert": "CERT", "key": "KEY"}))
            .await
            .unwrap();
        let manifest = &effects[0].payload;
        assert_eq!(manifest["type"], SECRET_TYPE);
        assert_eq!(manifest["data"]["tls.crt"], "Q0VSVA==");
        assert_eq!(manifest["data"]["tls.key"], "S0VZ");
    }

    #[tokio::test]
    async fn test_prepare_rejects_plain_string() {
        let provider = TlsSecretProvider::new(KubernetesSecretTarget::new("ingress-tls", "web"));
        let err = provider.prepare("INGRESS_TLS", &json!("pem")).await.unwrap_err();
        assert!(matches!(err, SecretError::Validation(_)));
    }
}
