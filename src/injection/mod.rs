//! # Injections
//!
//! An [`Injection`] binds one secret, through one strategy, to one path inside one
//! composed resource. Injections are declared with an [`InjectionContext`] and a
//! [`SecretInjectionBuilder`] per secret, and resolved once the stack finishes
//! declaring its secrets.

use crate::strategy::InjectionStrategy;
use serde::{Deserialize, Serialize};

pub mod builder;
pub mod context;

pub use builder::SecretInjectionBuilder;
pub use context::InjectionContext;

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InjectionMeta {
    pub secret_name: String,
    /// Name the secret appears under in the workload (env var name, annotation suffix)
    pub target_name: String,
    pub strategy: InjectionStrategy,
    /// Secondary location written by the same strategy (e.g. the pod volume for a mount)
    #[serde(default)]
    pub companion: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Injection {
    pub provider_id: String,
    /// Manager owning the provider, providers are only unique per manager
    pub manager_name: String,
    pub resource_id: String,
    pub path: String,
    pub meta: InjectionMeta,
}

impl Injection {
    /// Key identifying the payload group this injection belongs to
    #[must_use]
    pub fn group_key(&self) -> (String, String, String, String) {
        (
            self.manager_name.clone(),
            self.provider_id.clone(),
            self.resource_id.clone(),
            self.path.clone(),
        )
    }
}

/// Test helper building an injection without going through a stack
#[cfg(test)]
pub(crate) fn test_injection(secret: &str, strategy: InjectionStrategy, path: &str) -> Injection {
    Injection {
        provider_id: "provider".to_string(),
        manager_name: "default".to_string(),
        resource_id: "app".to_string(),
        path: path.to_string(),
        meta: InjectionMeta {
            secret_name: secret.to_string(),
            target_name: secret.to_string(),
            strategy,
            companion: false,
        },
    }
}
