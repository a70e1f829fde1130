//! # Stacks
//!
//! A stack is a named set of composed resources plus the secret injections declared
//! against them. Secrets are declared through [`Stack::use_secrets`]; the declaration
//! callback receives an [`InjectionContext`] and every builder it creates is resolved
//! as soon as the callback returns.
//!
//! [`Stack::build`] asks each provider for its payload and merges it into the
//! composed manifests. Only injection metadata is needed, so manifests can be built
//! before any secret value is loaded.

use crate::error::{Result, SecretError};
use crate::injection::{Injection, InjectionContext};
use crate::manager::SecretManager;
use crate::provider::Provider;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

pub mod composer;

pub use composer::ResourceComposer;

#[derive(Debug)]
pub struct Stack {
    name: String,
    composer: ResourceComposer,
    injections: Vec<Injection>,
    // (manager name, provider id) -> provider
    providers: BTreeMap<(String, String), Arc<dyn Provider>>,
}

impl Stack {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self::from_composer(name, ResourceComposer::new())
    }

    #[must_use]
    pub fn from_composer(name: impl Into<String>, composer: ResourceComposer) -> Self {
        Self {
            name: name.into(),
            composer,
            injections: Vec::new(),
            providers: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn add_resource(&mut self, id: &str, manifest: Value) -> Result<&mut Self> {
        self.composer.add_resource(id, manifest)?;
        Ok(self)
    }

    #[must_use]
    pub fn composer(&self) -> &ResourceComposer {
        &self.composer
    }

    /// Injections registered so far, in declaration order
    #[must_use]
    pub fn injections(&self) -> &[Injection] {
        &self.injections
    }

    /// Declare secret injections against this stack
    ///
    /// Builders created inside `declare` are resolved together once it returns.
    pub fn use_secrets<F>(&mut self, manager: &Arc<SecretManager>, declare: F) -> Result<&mut Self>
    where
        F: FnOnce(&mut InjectionContext) -> Result<()>,
    {
        let mut context = InjectionContext::new(Arc::clone(manager));
        declare(&mut context)?;

        let injections = context.resolve_all(&self.composer)?;
        debug!(
            "Stack {} resolved {} injections from manager {}",
            self.name,
            injections.len(),
            manager.name()
        );

        for injection in injections {
            self.register_injection(manager, injection)?;
        }
        Ok(self)
    }

    fn register_injection(&mut self, manager: &SecretManager, injection: Injection) -> Result<()> {
        let key = (injection.manager_name.clone(), injection.provider_id.clone());
        if !self.providers.contains_key(&key) {
            let provider = manager.resolve_provider(Some(&injection.provider_id))?;
            self.providers.insert(key, provider);
        }
        self.injections.push(injection);
        Ok(())
    }

    /// Merge every injection payload into the composed resources
    pub fn build(&self) -> Result<BTreeMap<String, Value>> {
        let mut composer = self.composer.clone();

        // group by (manager, provider, resource, path) keeping first-seen order
        let mut groups: Vec<((String, String, String, String), Vec<Injection>)> = Vec::new();
        for injection in &self.injections {
            let key = injection.group_key();
            match groups.iter_mut().find(|(k, _)| *k == key) {
                Some((_, members)) => members.push(injection.clone()),
                None => groups.push((key, vec![injection.clone()])),
            }
        }

        for ((manager_name, provider_id, resource_id, path), members) in groups {
            let provider = self
                .providers
                .get(&(manager_name.clone(), provider_id.clone()))
                .ok_or_else(|| {
                    SecretError::Resolution(format!(
                        "Provider '{provider_id}' of manager '{manager_name}' is not known to stack '{}'",
                        self.name
                    ))
                })?;
            let payload = provider.get_injection_payload(&members)?;
            debug!(
                "Injecting {} secrets from {} into {} at {}",
                members.len(),
                provider_id,
                resource_id,
                path
            );
            composer.inject(&resource_id, &path, payload)?;
        }

        info!(
            "Built stack {} with {} secret injections",
            self.name,
            self.injections.len()
        );
        Ok(composer.into_resources())
    }
}
