//! # Secret Registry
//!
//! Named collection of secret managers for multi-service or multi-environment projects.
//!
//! Every entry belongs to a stack. `add` puts a manager in a stack of its own name;
//! `add_to_stack` lets several managers share one stack, which changes the conflict
//! scope between their contributions from `crossStack` to `intraStack`.

use super::SecretManager;
use crate::error::{Result, SecretError};
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct RegistryEntry {
    pub name: String,
    pub stack: String,
    pub manager: Arc<SecretManager>,
}

#[derive(Debug, Default, Clone)]
pub struct SecretRegistry {
    entries: Vec<RegistryEntry>,
}

impl SecretRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a manager in a stack named after the entry
    pub fn add(&mut self, name: &str, manager: SecretManager) -> Result<&mut Self> {
        self.add_to_stack(name, name, manager)
    }

    /// Register a manager inside a shared stack
    pub fn add_to_stack(&mut self, stack: &str, name: &str, manager: SecretManager) -> Result<&mut Self> {
        self.add_arc(stack, name, Arc::new(manager))
    }

    pub fn add_arc(&mut self, stack: &str, name: &str, manager: Arc<SecretManager>) -> Result<&mut Self> {
        if name.trim().is_empty() {
            return Err(SecretError::Configuration(
                "Registry entry name must not be empty".to_string(),
            ));
        }
        if self.entries.iter().any(|e| e.name == name) {
            return Err(SecretError::Configuration(format!(
                "Secret manager '{name}' is already registered in the registry"
            )));
        }
        self.entries.push(RegistryEntry {
            name: name.to_string(),
            stack: stack.to_string(),
            manager,
        });
        Ok(self)
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Arc<SecretManager>> {
        self.entries.iter().find(|e| e.name == name).map(|e| &e.manager)
    }

    /// Entries in registration order
    #[must_use]
    pub fn list(&self) -> &[RegistryEntry] {
        &self.entries
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
