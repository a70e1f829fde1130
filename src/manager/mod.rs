//! # Secret Manager
//!
//! Registry of named connectors, providers and secret definitions.
//!
//! A secret may name its connector and provider explicitly; when it does not, the
//! manager's defaults apply. Resolution is lazy: references are checked when the
//! pipeline resolves them, not when the secret is added.

use crate::connector::Connector;
use crate::error::{Result, SecretError};
use crate::provider::{validate_capabilities, Provider};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

pub mod registry;

pub use registry::{RegistryEntry, SecretRegistry};

/// Name used for a manager that was not given one
pub const DEFAULT_MANAGER_NAME: &str = "default";

/// A declared secret
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SecretDefinition {
    pub name: String,
    /// Connector instance name, the manager default when absent
    #[serde(default)]
    pub connector: Option<String>,
    /// Provider instance name, the manager default when absent
    #[serde(default)]
    pub provider: Option<String>,
}

impl SecretDefinition {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            connector: None,
            provider: None,
        }
    }

    #[must_use]
    pub fn with_connector(mut self, connector: impl Into<String>) -> Self {
        self.connector = Some(connector.into());
        self
    }

    #[must_use]
    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }
}

/// A provider resolved for a secret, with the id it is registered under
#[derive(Debug, Clone)]
pub struct ResolvedProvider {
    pub provider_id: String,
    pub provider: Arc<dyn Provider>,
}

pub struct SecretManager {
    name: String,
    connectors: BTreeMap<String, Arc<dyn Connector>>,
    providers: BTreeMap<String, Arc<dyn Provider>>,
    default_connector: Option<String>,
    default_provider: Option<String>,
    // registration order is significant for merge scope computation
    secrets: Vec<SecretDefinition>,
}

impl fmt::Debug for SecretManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecretManager")
            .field("name", &self.name)
            .field("connectors", &self.connectors.keys().collect::<Vec<_>>())
            .field("providers", &self.providers.keys().collect::<Vec<_>>())
            .field("default_connector", &self.default_connector)
            .field("default_provider", &self.default_provider)
            .field("secrets", &self.secrets)
            .finish()
    }
}

impl Default for SecretManager {
    fn default() -> Self {
        Self::new()
    }
}

impl SecretManager {
    #[must_use]
    pub fn new() -> Self {
        Self::named(DEFAULT_MANAGER_NAME)
    }

    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            connectors: BTreeMap::new(),
            providers: BTreeMap::new(),
            default_connector: None,
            default_provider: None,
            secrets: Vec::new(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn add_connector<C>(&mut self, name: &str, connector: C) -> Result<&mut Self>
    where
        C: Connector + 'static,
    {
        self.add_connector_arc(name, Arc::new(connector))
    }

    pub fn add_connector_arc(&mut self, name: &str, connector: Arc<dyn Connector>) -> Result<&mut Self> {
        if name.trim().is_empty() {
            return Err(SecretError::Configuration(
                "Connector name must not be empty".to_string(),
            ));
        }
        if self.connectors.contains_key(name) {
            return Err(SecretError::Configuration(format!(
                "Connector '{name}' is already registered in manager '{}'",
                self.name
            )));
        }
        debug!("Registered connector {} in manager {}", name, self.name);
        self.connectors.insert(name.to_string(), connector);
        Ok(self)
    }

    pub fn add_provider<P>(&mut self, name: &str, provider: P) -> Result<&mut Self>
    where
        P: Provider + 'static,
    {
        self.add_provider_arc(name, Arc::new(provider))
    }

    pub fn add_provider_arc(&mut self, name: &str, provider: Arc<dyn Provider>) -> Result<&mut Self> {
        if name.trim().is_empty() {
            return Err(SecretError::Configuration(
                "Provider name must not be empty".to_string(),
            ));
        }
        if self.providers.contains_key(name) {
            return Err(SecretError::Configuration(format!(
                "Provider '{name}' is already registered in manager '{}'",
                self.name
            )));
        }
        validate_capabilities(name, provider.as_ref())?;
        debug!(
            "Registered provider {} ({}) in manager {}",
            name,
            provider.provider_type(),
            self.name
        );
        self.providers.insert(name.to_string(), provider);
        Ok(self)
    }

    pub fn set_default_connector(&mut self, name: &str) -> Result<&mut Self> {
        if !self.connectors.contains_key(name) {
            return Err(SecretError::Resolution(format!(
                "Cannot set default connector: '{name}' is not registered in manager '{}'",
                self.name
            )));
        }
        self.default_connector = Some(name.to_string());
        Ok(self)
    }

    pub fn set_default_provider(&mut self, name: &str) -> Result<&mut Self> {
        if !self.providers.contains_key(name) {
            return Err(SecretError::Resolution(format!(
                "Cannot set default provider: '{name}' is not registered in manager '{}'",
                self.name
            )));
        }
        self.default_provider = Some(name.to_string());
        Ok(self)
    }

    /// Declare a secret; names are unique within the manager
    pub fn add_secret(&mut self, definition: SecretDefinition) -> Result<&mut Self> {
        if definition.name.trim().is_empty() {
            return Err(SecretError::Configuration(
                "Secret name must not be empty".to_string(),
            ));
        }
        if self.secrets.iter().any(|s| s.name == definition.name) {
            return Err(SecretError::Configuration(format!(
                "Secret '{}' is already declared in manager '{}'",
                definition.name, self.name
            )));
        }
        self.secrets.push(definition);
        Ok(self)
    }

    /// Resolve a connector by name, falling back to the default
    pub fn resolve_connector(&self, name: Option<&str>) -> Result<Arc<dyn Connector>> {
        let name = name.or(self.default_connector.as_deref()).ok_or_else(|| {
            SecretError::Resolution(format!(
                "No connector specified and no default connector set in manager '{}'",
                self.name
            ))
        })?;
        self.connectors.get(name).map(Arc::clone).ok_or_else(|| {
            SecretError::Resolution(format!(
                "Connector '{name}' is not registered in manager '{}'",
                self.name
            ))
        })
    }

    /// Resolve a provider by name, falling back to the default
    pub fn resolve_provider(&self, name: Option<&str>) -> Result<Arc<dyn Provider>> {
        self.resolve_provider_entry(name).map(|r| r.provider)
    }

    fn resolve_provider_entry(&self, name: Option<&str>) -> Result<ResolvedProvider> {
        let name = name.or(self.default_provider.as_deref()).ok_or_else(|| {
            SecretError::Resolution(format!(
                "No provider specified and no default provider set in manager '{}'",
                self.name
            ))
        })?;
        let provider = self.providers.get(name).map(Arc::clone).ok_or_else(|| {
            SecretError::Resolution(format!(
                "Provider '{name}' is not registered in manager '{}'",
                self.name
            ))
        })?;
        Ok(ResolvedProvider {
            provider_id: name.to_string(),
            provider,
        })
    }

    /// Provider of a declared secret: its own reference, else the manager default
    pub fn resolve_provider_for(&self, secret_name: &str) -> Result<ResolvedProvider> {
        let definition = self.secret(secret_name).ok_or_else(|| {
            SecretError::Resolution(format!(
                "Secret '{secret_name}' is not declared in manager '{}'",
                self.name
            ))
        })?;
        self.resolve_provider_entry(definition.provider.as_deref())
    }

    #[must_use]
    pub fn secret(&self, name: &str) -> Option<&SecretDefinition> {
        self.secrets.iter().find(|s| s.name == name)
    }

    /// Declared secrets in registration order
    #[must_use]
    pub fn secrets(&self) -> &[SecretDefinition] {
        &self.secrets
    }

    /// Declared secrets keyed by name
    #[must_use]
    pub fn secret_map(&self) -> BTreeMap<String, SecretDefinition> {
        self.secrets
            .iter()
            .map(|s| (s.name.clone(), s.clone()))
            .collect()
    }

    /// Registered providers keyed by name
    #[must_use]
    pub fn providers(&self) -> &BTreeMap<String, Arc<dyn Provider>> {
        &self.providers
    }

    #[must_use]
    pub fn connectors(&self) -> &BTreeMap<String, Arc<dyn Connector>> {
        &self.connectors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::InMemoryConnector;
    use crate::provider::{KubernetesSecretTarget, OpaqueSecretProvider};
    use serde_json::json;

    fn manager() -> SecretManager {
        let mut manager = SecretManager::new();
        manager
            .add_connector("mem", InMemoryConnector::from_pairs([("A", json!("1"))]))
            .unwrap()
            .add_provider(
                "opaque",
                OpaqueSecretProvider::new(KubernetesSecretTarget::new("app", "default")),
            )
            .unwrap();
        manager
    }

    #[test]
    fn test_duplicate_secret_rejected() {
        let mut manager = manager();
        manager.add_secret(SecretDefinition::new("A")).unwrap();
        let err = manager.add_secret(SecretDefinition::new("A")).unwrap_err();
        assert!(matches!(err, SecretError::Configuration(_)));
    }

    #[test]
    fn test_duplicate_connector_and_provider_rejected() {
        let mut manager = manager();
        assert!(manager
            .add_connector("mem", InMemoryConnector::new(std::collections::BTreeMap::new()))
            .is_err());
        assert!(manager
            .add_provider(
                "opaque",
                OpaqueSecretProvider::new(KubernetesSecretTarget::new("x", "default"))
            )
            .is_err());
    }

    #[test]
    fn test_resolve_without_default_fails() {
        let manager = manager();
        let err = manager.resolve_connector(None).unwrap_err();
        assert!(matches!(err, SecretError::Resolution(_)));
        assert!(manager.resolve_provider(None).is_err());
    }

    #[test]
    fn test_default_applies_only_when_reference_missing() {
        let mut manager = manager();
        manager
            .add_provider(
                "other",
                OpaqueSecretProvider::new(KubernetesSecretTarget::new("other", "default")),
            )
            .unwrap()
            .set_default_provider("opaque")
            .unwrap()
            .add_secret(SecretDefinition::new("A"))
            .unwrap()
            .add_secret(SecretDefinition::new("B").with_provider("other"))
            .unwrap();

        assert_eq!(manager.resolve_provider_for("A").unwrap().provider_id, "opaque");
        assert_eq!(manager.resolve_provider_for("B").unwrap().provider_id, "other");
    }

    #[test]
    fn test_unknown_explicit_reference_is_resolution_error() {
        let mut manager = manager();
        manager.set_default_connector("mem").unwrap();
        let err = manager.resolve_connector(Some("vault")).unwrap_err();
        assert!(err.to_string().contains("'vault'"));
    }

    #[test]
    fn test_set_default_requires_registration() {
        let mut manager = manager();
        assert!(manager.set_default_connector("missing").is_err());
        assert!(manager.set_default_provider("missing").is_err());
    }

    #[test]
    fn test_resolve_provider_for_undeclared_secret() {
        let manager = manager();
        assert!(manager.resolve_provider_for("NOPE").is_err());
    }

    #[test]
    fn test_secrets_keep_registration_order() {
        let mut manager = manager();
        for name in ["Z", "A", "M"] {
            manager.add_secret(SecretDefinition::new(name)).unwrap();
        }
        let names: Vec<&str> = manager.secrets().iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["Z", "A", "M"]);
        assert_eq!(manager.secret_map().len(), 3);
    }
}
