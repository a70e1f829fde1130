//! # Secret Injection Builder
//!
//! Fluent declaration of "secret X via strategy Y into resource Z", resolved when the
//! owning context finalizes.
//!
//! Target resource priority:
//! 1. explicit `into_resource`
//! 2. the context default (`set_default_resource_id`)
//! 3. the single composed resource whose kind matches the provider's `target_kind`

use super::{Injection, InjectionMeta};
use crate::error::{Result, SecretError};
use crate::manager::ResolvedProvider;
use crate::provider::check_strategy_supported;
use crate::stack::ResourceComposer;
use crate::strategy::InjectionStrategy;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct SecretInjectionBuilder {
    secret_name: String,
    manager_name: String,
    resolved: ResolvedProvider,
    strategy: Option<InjectionStrategy>,
    resource_id: Option<String>,
    target_name: Option<String>,
}

impl SecretInjectionBuilder {
    pub(crate) fn new(secret_name: &str, manager_name: &str, resolved: ResolvedProvider) -> Self {
        Self {
            secret_name: secret_name.to_string(),
            manager_name: manager_name.to_string(),
            resolved,
            strategy: None,
            resource_id: None,
            target_name: None,
        }
    }

    /// Set the injection strategy, checked against the provider's capabilities
    pub fn inject(&mut self, strategy: InjectionStrategy) -> Result<&mut Self> {
        if let Some(existing) = &self.strategy {
            return Err(SecretError::InjectionResolution(format!(
                "Secret '{}' already has strategy '{}'; declare another secrets() entry to inject it twice",
                self.secret_name,
                existing.kind()
            )));
        }
        check_strategy_supported(
            &self.resolved.provider_id,
            self.resolved.provider.as_ref(),
            &strategy,
        )?;
        self.strategy = Some(strategy);
        Ok(self)
    }

    /// Target a specific resource instead of inferring one
    pub fn into_resource(&mut self, resource_id: &str) -> &mut Self {
        self.resource_id = Some(resource_id.to_string());
        self
    }

    /// Name the secret appears under in the workload (defaults to the secret name)
    pub fn for_name(&mut self, alias: &str) -> &mut Self {
        self.target_name = Some(alias.to_string());
        self
    }

    #[must_use]
    pub fn secret_name(&self) -> &str {
        &self.secret_name
    }

    #[must_use]
    pub fn provider_id(&self) -> &str {
        &self.resolved.provider_id
    }

    /// Resolve into injections (primary plus companions) and register them
    pub fn resolve_injection(
        &self,
        default_resource_id: Option<&str>,
        composer: &ResourceComposer,
        registered: &mut Vec<Injection>,
    ) -> Result<()> {
        let strategy = self.strategy.as_ref().ok_or_else(|| {
            SecretError::InjectionResolution(format!(
                "No injection strategy set for secret '{}'. Call inject() before the stack is built.",
                self.secret_name
            ))
        })?;

        let resource_id = self.resolve_resource_id(default_resource_id, composer)?;
        let provider = self.resolved.provider.as_ref();
        let path = provider.get_target_path(strategy)?;
        let target_name = self
            .target_name
            .clone()
            .unwrap_or_else(|| self.secret_name.clone());

        debug!(
            "Resolved secret {} -> {}:{} via {}",
            self.secret_name,
            resource_id,
            path,
            strategy.kind()
        );

        let make = |path: String, companion: bool| Injection {
            provider_id: self.resolved.provider_id.clone(),
            manager_name: self.manager_name.clone(),
            resource_id: resource_id.clone(),
            path,
            meta: InjectionMeta {
                secret_name: self.secret_name.clone(),
                target_name: target_name.clone(),
                strategy: strategy.clone(),
                companion,
            },
        };

        registered.push(make(path, false));
        for companion_path in provider.companion_paths(strategy)? {
            registered.push(make(companion_path, true));
        }
        Ok(())
    }

    fn resolve_resource_id(
        &self,
        default_resource_id: Option<&str>,
        composer: &ResourceComposer,
    ) -> Result<String> {
        if let Some(id) = self.resource_id.as_deref().or(default_resource_id) {
            if composer.get(id).is_none() {
                return Err(SecretError::InjectionResolution(format!(
                    "Secret '{}' targets resource '{id}', which does not exist in the stack",
                    self.secret_name
                )));
            }
            return Ok(id.to_string());
        }

        let kind = self.resolved.provider.target_kind();
        let matches = composer.find_resource_ids_by_kind(kind);
        match matches.as_slice() {
            [single] => Ok(single.clone()),
            [] => Err(SecretError::InjectionResolution(format!(
                "Cannot infer a target for secret '{}': no resource of kind '{kind}' in the stack. \
                 Add one, or call into_resource() with an explicit resource id.",
                self.secret_name
            ))),
            many => Err(SecretError::InjectionResolution(format!(
                "Cannot infer a target for secret '{}': {} resources of kind '{kind}' ({}). \
                 Call into_resource() to pick one.",
                self.secret_name,
                many.len(),
                many.join(", ")
            ))),
        }
    }
}
