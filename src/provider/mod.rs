//! # Provider Modules
//!
//! Providers turn a resolved secret value into cluster artifacts ("effects") and describe
//! how the secret is wired into a workload manifest.
//!
//! Each provider implements the [`Provider`] trait. Capability declarations
//! (`supported_strategies`, `supported_env_keys`) are checked at runtime when a
//! provider is registered and when an injection is declared.

use crate::effect::PreparedEffect;
use crate::error::{Result, SecretError};
use crate::injection::Injection;
use crate::manager::SecretDefinition;
use crate::strategy::{InjectionStrategy, StrategyKind};
use crate::connector::SecretValue;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Provider trait for secret sinks
#[async_trait]
pub trait Provider: Send + Sync + fmt::Debug {
    /// Provider type, e.g. `opaque` or `basicAuth`
    fn provider_type(&self) -> &'static str;

    /// Resource kind this provider injects into (matched case-insensitively)
    fn target_kind(&self) -> &str;

    fn supported_strategies(&self) -> &[StrategyKind];

    /// Keys allowed (and required) for `env` injections of structured secrets
    /// An empty list means the whole secret is a single value
    fn supported_env_keys(&self) -> &[&'static str] {
        &[]
    }

    /// Turn a resolved value into effects
    /// Must validate the value's shape and fail with `SecretError::Validation` on mismatch
    async fn prepare(&self, name: &str, value: &SecretValue) -> Result<Vec<PreparedEffect>>;

    /// Build the payload merged at the injections' shared path
    /// Works from metadata only, no resolved values required
    fn get_injection_payload(&self, injections: &[Injection]) -> Result<Value>;

    /// Default path for a strategy, honouring an explicit `target_path` override
    fn get_target_path(&self, strategy: &InjectionStrategy) -> Result<String>;

    /// Extra paths a strategy writes to besides its target path
    fn companion_paths(&self, _strategy: &InjectionStrategy) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    /// Logical destination of an effect, used to group effects for merging
    fn get_effect_identifier(&self, _effect: &PreparedEffect) -> Option<String> {
        None
    }

    /// Merge effects sharing a destination; providers without a merge handler keep them as-is
    fn merge_secrets(&self, effects: Vec<PreparedEffect>) -> Result<Vec<PreparedEffect>> {
        Ok(effects)
    }

    /// Receive the owning manager's secret definitions
    fn inject_secrets(&self, _secrets: &BTreeMap<String, SecretDefinition>) {}
}

/// Check a provider's capability declarations at registration time
pub fn validate_capabilities(name: &str, provider: &dyn Provider) -> Result<()> {
    let strategies = provider.supported_strategies();
    if strategies.is_empty() {
        return Err(SecretError::Configuration(format!(
            "Provider '{name}' ({}) declares no supported injection strategies",
            provider.provider_type()
        )));
    }
    if !provider.supported_env_keys().is_empty() && !strategies.contains(&StrategyKind::Env) {
        return Err(SecretError::Configuration(format!(
            "Provider '{name}' ({}) declares env keys but does not support the env strategy",
            provider.provider_type()
        )));
    }
    if provider.target_kind().trim().is_empty() {
        return Err(SecretError::Configuration(format!(
            "Provider '{name}' ({}) has an empty target kind",
            provider.provider_type()
        )));
    }
    Ok(())
}

/// Check that a strategy (and its env key) is allowed for a provider
pub fn check_strategy_supported(
    provider_id: &str,
    provider: &dyn Provider,
    strategy: &InjectionStrategy,
) -> Result<()> {
    let kind = strategy.kind();
    if !provider.supported_strategies().contains(&kind) {
        let supported: Vec<&str> = provider
            .supported_strategies()
            .iter()
            .map(StrategyKind::as_str)
            .collect();
        return Err(SecretError::InjectionResolution(format!(
            "Provider '{provider_id}' ({}) does not support strategy '{kind}'. Supported: {}",
            provider.provider_type(),
            supported.join(", ")
        )));
    }

    if let InjectionStrategy::Env { key, .. } = strategy {
        let allowed = provider.supported_env_keys();
        match (key.as_deref(), allowed.is_empty()) {
            (Some(key), true) => {
                return Err(SecretError::InjectionResolution(format!(
                    "Provider '{provider_id}' ({}) does not accept an env key, got '{key}'",
                    provider.provider_type()
                )));
            }
            (None, false) => {
                return Err(SecretError::InjectionResolution(format!(
                    "Provider '{provider_id}' ({}) requires an env key, one of: {}",
                    provider.provider_type(),
                    allowed.join(", ")
                )));
            }
            (Some(key), false) if !allowed.contains(&key) => {
                return Err(SecretError::InjectionResolution(format!(
                    "Provider '{provider_id}' ({}) does not support env key '{key}'. Supported: {}",
                    provider.provider_type(),
                    allowed.join(", ")
                )));
            }
            _ => {}
        }
    }
    Ok(())
}

// Common utilities shared across providers
pub mod common;

// Provider implementations
pub mod basic_auth;
pub mod docker_config;
pub mod external_store;
pub mod opaque;
pub mod ssh_auth;
pub mod tls;

pub use basic_auth::BasicAuthSecretProvider;
pub use common::KubernetesSecretTarget;
pub use docker_config::DockerConfigSecretProvider;
pub use external_store::ExternalStoreProvider;
pub use opaque::OpaqueSecretProvider;
pub use ssh_auth::SshAuthSecretProvider;
pub use tls::TlsSecretProvider;
