//! # Opaque Secret Provider
//!
//! Writes scalar secrets into one `Opaque` Kubernetes `Secret`, one data key per secret.
//!
//! Strategies:
//! - `env`: `valueFrom.secretKeyRef` entries keyed by secret name
//! - `envFrom`: the whole `Secret` as a `secretRef`
//! - `volume`: the whole `Secret` mounted read-only

use super::common::{
    self, env_from_payload, env_var_payload, kubernetes_secret_manifest,
    merge_effects_by_identifier, single_strategy_kind, volume_payload, DeclaredSecrets,
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

const PROVIDER_TYPE: &str = "opaque";
const SUPPORTED: &[StrategyKind] = &[StrategyKind::Env, StrategyKind::EnvFrom, StrategyKind::Volume];

#[derive(Debug)]
pub struct OpaqueSecretProvider {
    target: KubernetesSecretTarget,
    declared: DeclaredSecrets,
}

impl OpaqueSecretProvider {
    #[must_use]
    pub fn new(target: KubernetesSecretTarget) -> Self {
        Self {
            target,
            declared: DeclaredSecrets::default(),
        }
    }

    #[must_use]
    pub fn target(&self) -> &KubernetesSecretTarget {
        &self.target
    }
}

#[async_trait]
impl Provider for OpaqueSecretProvider {
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
        let raw = match value {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            other => {
                return Err(SecretError::Validation(format!(
                    "Provider '{PROVIDER_TYPE}' expects secret '{name}' to be a string, number or boolean, got {}",
                    common::json_type_name(other)
                )));
            }
        };

        let mut data = BTreeMap::new();
        data.insert(name.to_string(), raw.into_bytes());
        let manifest = kubernetes_secret_manifest(&self.target, "Opaque", data)?;
        Ok(vec![PreparedEffect::kubectl(manifest, PROVIDER_TYPE, name)])
    }

    fn get_injection_payload(&self, injections: &[Injection]) -> Result<Value> {
        self.declared.check(PROVIDER_TYPE, injections)?;
        match single_strategy_kind(PROVIDER_TYPE, injections)? {
            StrategyKind::Env => Ok(env_var_payload(&self.target.name, injections, |i| {
                i.meta.secret_name.clone()
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
    use crate::injection::test_injection;
    use serde_json::json;

    fn provider() -> OpaqueSecretProvider {
        OpaqueSecretProvider::new(KubernetesSecretTarget::new("app-secret", "default"))
    }

    #[tokio::test]
    async fn test_prepare_scalar_produces_opaque_secret() {
        let effects = provider().prepare("API_KEY", &json!("s3cr3t")).await.unwrap();
        assert_eq!(effects.len(), 1);
        let manifest = &effects[0].payload;
        assert_eq!(manifest["type"], "Opaque");
        assert_eq!(manifest["data"]["API_KEY"], "czNjcjN0");
    }

    #[tokio::test]
    async fn test_prepare_number_is_stringified() {
        let effects = provider().prepare("PORT", &json!(8080)).await.unwrap();
        assert_eq!(effects[0].payload["data"]["PORT"], "ODA4MA==");
    }

    #[tokio::test]
    async fn test_prepare_rejects_objects() {
        let err = provider()
            .prepare("DB", &json!({"username": "u"}))
            .await
            .unwrap_err();
        assert!(matches!(err, SecretError::Validation(_)));
        assert!(err.to_string().contains("got object"));
    }

    #[test]
    fn test_env_payload_references_secret_key() {
        let mut injection = test_injection(
            "API_KEY",
            InjectionStrategy::env(),
            "spec.template.spec.containers[0].env",
        );
        injection.meta.target_name = "APP_API_KEY".to_string();

        let payload = provider().get_injection_payload(&[injection]).unwrap();
        assert_eq!(
            payload,
            json!([{
                "name": "APP_API_KEY",
                "valueFrom": {"secretKeyRef": {"name": "app-secret", "key": "API_KEY"}}
            }])
        );
    }

    #[test]
    fn test_target_paths() {
        let p = provider();
        assert_eq!(
            p.get_target_path(&InjectionStrategy::env().in_container(1)).unwrap(),
            "spec.template.spec.containers[1].env"
        );
        assert_eq!(
            p.get_target_path(&InjectionStrategy::env_from(None)).unwrap(),
            "spec.template.spec.containers[0].envFrom"
        );
        assert!(p.get_target_path(&InjectionStrategy::image_pull_secret()).is_err());
    }

    #[test]
    fn test_mixed_strategies_rejected() {
        let injections = vec![
            test_injection("A", InjectionStrategy::env(), "x"),
            test_injection("B", InjectionStrategy::env_from(None), "x"),
        ];
        assert!(provider().get_injection_payload(&injections).is_err());
    }

    #[test]
    fn test_undeclared_secret_rejected_after_inject_secrets() {
        let p = provider();
        let mut declared = BTreeMap::new();
        declared.insert("A".to_string(), SecretDefinition::new("A"));
        p.inject_secrets(&declared);

        let ok = test_injection("A", InjectionStrategy::env(), "x");
        assert!(p.get_injection_payload(&[ok]).is_ok());
        let unknown = test_injection("B", InjectionStrategy::env(), "x");
        assert!(p.get_injection_payload(&[unknown]).is_err());
    }

    #[test]
    fn test_volume_payloads_for_mount_and_volume() {
        let p = provider();
        let strategy = InjectionStrategy::volume("/etc/app");
        let mount = test_injection("A", strategy.clone(), "spec.template.spec.containers[0].volumeMounts");
        let mut volume = test_injection("A", strategy.clone(), VOLUMES_PATH);
        volume.meta.companion = true;

        assert_eq!(p.companion_paths(&strategy).unwrap(), vec![VOLUMES_PATH.to_string()]);
        assert_eq!(
            p.get_injection_payload(&[mount]).unwrap(),
            json!([{"name": "app-secret-secret", "mountPath": "/etc/app", "readOnly": true}])
        );
        assert_eq!(
            p.get_injection_payload(&[volume]).unwrap(),
            json!([{"name": "app-secret-secret", "secret": {"secretName": "app-secret"}}])
        );
    }
}
