//! # Injection Context
//!
//! Per-stack entry point for declaring secret injections from one manager.

use super::{Injection, SecretInjectionBuilder};
use crate::error::Result;
use crate::manager::SecretManager;
use crate::stack::ResourceComposer;
use std::sync::Arc;

#[derive(Debug)]
pub struct InjectionContext {
    manager: Arc<SecretManager>,
    default_resource_id: Option<String>,
    builders: Vec<SecretInjectionBuilder>,
}

impl InjectionContext {
    #[must_use]
    pub fn new(manager: Arc<SecretManager>) -> Self {
        Self {
            manager,
            default_resource_id: None,
            builders: Vec::new(),
        }
    }

    /// Start declaring an injection for a secret
    /// The secret's provider is resolved now; its value is not
    pub fn secrets(&mut self, name: &str) -> Result<&mut SecretInjectionBuilder> {
        let resolved = self.manager.resolve_provider_for(name)?;
        let builder = SecretInjectionBuilder::new(name, self.manager.name(), resolved);
        self.builders.push(builder);
        let last = self.builders.len() - 1;
        Ok(&mut self.builders[last])
    }

    /// Resource used by builders that do not call `into_resource`
    pub fn set_default_resource_id(&mut self, id: &str) -> &mut Self {
        self.default_resource_id = Some(id.to_string());
        self
    }

    #[must_use]
    pub fn manager(&self) -> &SecretManager {
        &self.manager
    }

    #[must_use]
    pub fn builders(&self) -> &[SecretInjectionBuilder] {
        &self.builders
    }

    /// Finalize every builder in declaration order
    pub fn resolve_all(&self, composer: &ResourceComposer) -> Result<Vec<Injection>> {
        let mut injections = Vec::new();
        for builder in &self.builders {
            builder.resolve_injection(self.default_resource_id.as_deref(), composer, &mut injections)?;
        }
        Ok(injections)
    }
}
