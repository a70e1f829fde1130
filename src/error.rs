//! # Errors
//!
//! Error taxonomy for the secret pipeline.
//!
//! Every variant is fail-fast: nothing is retried inside one orchestration run and the
//! pipeline stops at the first error. The binary wraps these in `anyhow` for context.

use thiserror::Error;

/// Result alias used throughout the library
pub type Result<T, E = SecretError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum SecretError {
    /// No manager or registry configured, duplicate names, invalid conflict settings
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A named connector or provider is not registered
    #[error("Resolution error: {0}")]
    Resolution(String),

    /// A connector could not resolve a declared secret
    #[error("Load error: {0}")]
    Load(String),

    /// A provider received a value with the wrong shape
    #[error("Validation error: {0}")]
    Validation(String),

    /// An injection could not be bound to exactly one resource and path
    #[error("Injection resolution error: {0}")]
    InjectionResolution(String),

    /// Two contributions collided on the same destination key
    #[error("Conflict error: {0}")]
    Conflict(String),

    /// The cluster apply collaborator failed
    #[error("Apply error: {0}")]
    Apply(String),
}

impl SecretError {
    /// Short machine-friendly name of the error kind, used for metric labels
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            SecretError::Configuration(_) => "configuration",
            SecretError::Resolution(_) => "resolution",
            SecretError::Load(_) => "load",
            SecretError::Validation(_) => "validation",
            SecretError::InjectionResolution(_) => "injection_resolution",
            SecretError::Conflict(_) => "conflict",
            SecretError::Apply(_) => "apply",
        }
    }

    /// Get remediation guidance for this error
    #[must_use]
    pub fn remediation(&self) -> &'static str {
        match self {
            SecretError::Configuration(_) => {
                "Check the project configuration: configure either a secret manager or a registry, and keep names unique."
            }
            SecretError::Resolution(_) => {
                "Register the referenced connector/provider on the manager, or set a default."
            }
            SecretError::Load(_) => {
                "Make sure the secret source (environment variable, file or store) provides a value for every declared secret."
            }
            SecretError::Validation(_) => {
                "Check that the secret value matches the shape the provider expects."
            }
            SecretError::InjectionResolution(_) => {
                "Call inject() with a strategy and use into_resource() when the target cannot be inferred."
            }
            SecretError::Conflict(_) => {
                "Rename one of the colliding keys, or relax the conflict strategy for this scope."
            }
            SecretError::Apply(_) => "Inspect the cluster apply output; effects applied before the failure are not rolled back.",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_includes_kind_prefix() {
        let err = SecretError::Conflict("key 'a' in 'default/shared'".to_string());
        assert_eq!(err.to_string(), "Conflict error: key 'a' in 'default/shared'");
        assert_eq!(err.kind(), "conflict");
    }

    #[test]
    fn test_every_kind_has_remediation() {
        let errors = vec![
            SecretError::Configuration(String::new()),
            SecretError::Resolution(String::new()),
            SecretError::Load(String::new()),
            SecretError::Validation(String::new()),
            SecretError::InjectionResolution(String::new()),
            SecretError::Conflict(String::new()),
            SecretError::Apply(String::new()),
        ];
        for err in errors {
            assert!(!err.remediation().is_empty(), "{} has no remediation", err.kind());
        }
    }
}
