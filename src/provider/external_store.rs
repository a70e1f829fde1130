//! # External Store Provider
//!
//! Hands secrets to a logical external store instead of the cluster. Prepared effects are
//! `Custom` and never applied; workloads are pointed at the store through annotations
//! or a plugin payload at an explicit path.

use super::common::{self, single_strategy_kind, DeclaredSecrets, DEFAULT_TARGET_KIND};
use super::Provider;
use crate::connector::SecretValue;
use crate::effect::PreparedEffect;
use crate::error::{Result, SecretError};
use crate::injection::Injection;
use crate::manager::SecretDefinition;
use crate::strategy::{InjectionStrategy, StrategyKind};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use tracing::debug;

const PROVIDER_TYPE: &str = "externalStore";
const SUPPORTED: &[StrategyKind] = &[StrategyKind::Annotation, StrategyKind::Plugin];

/// Annotation key prefix used when none is configured
pub const DEFAULT_ANNOTATION_PREFIX: &str = "secrets.microscaler.io";

#[derive(Debug)]
pub struct ExternalStoreProvider {
    store_name: String,
    annotation_prefix: String,
    target_kind: String,
    declared: DeclaredSecrets,
}

impl ExternalStoreProvider {
    #[must_use]
    pub fn new(store_name: impl Into<String>) -> Self {
        Self {
            store_name: store_name.into(),
            annotation_prefix: DEFAULT_ANNOTATION_PREFIX.to_string(),
            target_kind: DEFAULT_TARGET_KIND.to_string(),
            declared: DeclaredSecrets::default(),
        }
    }

    #[must_use]
    pub fn with_annotation_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.annotation_prefix = prefix.into();
        self
    }

    #[must_use]
    pub fn with_target_kind(mut self, kind: impl Into<String>) -> Self {
        self.target_kind = kind.into();
        self
    }

    #[must_use]
    pub fn store_name(&self) -> &str {
        &self.store_name
    }

    fn annotation_payload(&self, injections: &[Injection]) -> Value {
        let mut annotations = Map::new();
        for injection in injections {
            annotations.insert(
                format!("{}/{}", self.annotation_prefix, injection.meta.target_name),
                Value::String(format!("{}/{}", self.store_name, injection.meta.secret_name)),
            );
        }
        Value::Object(annotations)
    }

    fn plugin_payload(&self, injections: &[Injection]) -> Result<Value> {
        let Some(InjectionStrategy::Plugin { action, args, .. }) =
            injections.first().map(|i| &i.meta.strategy)
        else {
            return Err(SecretError::InjectionResolution(format!(
                "Provider '{PROVIDER_TYPE}' expected plugin injections"
            )));
        };

        let mut secrets: Vec<Value> = Vec::new();
        for injection in injections {
            let entry = json!({
                "name": injection.meta.target_name,
                "ref": format!("{}/{}", self.store_name, injection.meta.secret_name),
            });
            if !secrets.contains(&entry) {
                secrets.push(entry);
            }
        }

        Ok(json!({
            "action": action.clone().unwrap_or_else(|| "sync".to_string()),
            "args": args,
            "store": self.store_name,
            "secrets": secrets,
        }))
    }
}

#[async_trait]
impl Provider for ExternalStoreProvider {
    fn provider_type(&self) -> &'static str {
        PROVIDER_TYPE
    }

    fn target_kind(&self) -> &str {
        &self.target_kind
    }

    fn supported_strategies(&self) -> &[StrategyKind] {
        SUPPORTED
    }

    async fn prepare(&self, name: &str, value: &SecretValue) -> Result<Vec<PreparedEffect>> {
        if value.is_null() {
            return Err(SecretError::Validation(format!(
                "Provider '{PROVIDER_TYPE}' received a null value for secret '{name}'"
            )));
        }
        let payload = json!({
            "storeName": self.store_name,
            "data": { name: value },
        });
        Ok(vec![PreparedEffect::custom(payload, PROVIDER_TYPE, name)])
    }

    fn get_injection_payload(&self, injections: &[Injection]) -> Result<Value> {
        self.declared.check(PROVIDER_TYPE, injections)?;
        match single_strategy_kind(PROVIDER_TYPE, injections)? {
            StrategyKind::Annotation => Ok(self.annotation_payload(injections)),
            StrategyKind::Plugin => self.plugin_payload(injections),
            other => Err(SecretError::InjectionResolution(format!(
                "Provider '{PROVIDER_TYPE}' does not support strategy '{other}'"
            ))),
        }
    }

    fn get_target_path(&self, strategy: &InjectionStrategy) -> Result<String> {
        match strategy.kind() {
            StrategyKind::Annotation | StrategyKind::Plugin => {
                common::default_target_path(PROVIDER_TYPE, strategy)
            }
            other => Err(SecretError::InjectionResolution(format!(
                "Provider '{PROVIDER_TYPE}' does not support strategy '{other}'"
            ))),
        }
    }

    fn get_effect_identifier(&self, effect: &PreparedEffect) -> Option<String> {
        effect
            .payload
            .get("storeName")
            .and_then(Value::as_str)
            .map(|store| format!("store:{store}"))
    }

    fn merge_secrets(&self, effects: Vec<PreparedEffect>) -> Result<Vec<PreparedEffect>> {
        debug!("Merging {} external store effects", effects.len());
        common::merge_effects_by_identifier(effects, |e| self.get_effect_identifier(e))
    }

    fn inject_secrets(&self, secrets: &BTreeMap<String, SecretDefinition>) {
        self.declared.replace(secrets);
    }
}
