//! # Environment Connector
//!
//! Resolves secrets from environment variables named `<prefix><SECRET_NAME>`.
//!
//! When `allow_dot_env` is set, a `.env` file in the working directory is consulted
//! for names missing from the process environment. Real environment variables always win.

use super::{Connector, SecretValue, ValueCache};
use crate::error::{Result, SecretError};
use async_trait::async_trait;
use regex::Regex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{LazyLock, PoisonError, RwLock};
use tracing::debug;

/// Prefix used when none is configured
pub const DEFAULT_ENV_PREFIX: &str = "SECRET_";

static SECRET_NAME_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("static secret name regex is valid")
});

#[derive(Debug)]
pub struct EnvConnector {
    prefix: String,
    allow_dot_env: bool,
    case_insensitive: bool,
    working_dir: RwLock<Option<PathBuf>>,
    cache: ValueCache,
}

impl Default for EnvConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl EnvConnector {
    #[must_use]
    pub fn new() -> Self {
        Self {
            prefix: DEFAULT_ENV_PREFIX.to_string(),
            allow_dot_env: false,
            case_insensitive: false,
            working_dir: RwLock::new(None),
            cache: ValueCache::new(),
        }
    }

    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    #[must_use]
    pub fn with_dot_env(mut self, allow: bool) -> Self {
        self.allow_dot_env = allow;
        self
    }

    #[must_use]
    pub fn case_insensitive(mut self, enabled: bool) -> Self {
        self.case_insensitive = enabled;
        self
    }

    #[must_use]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    fn variable_name(&self, secret_name: &str) -> String {
        format!("{}{}", self.prefix, secret_name)
    }

    fn lookup_process_env(&self, variable: &str) -> Option<String> {
        if let Ok(value) = std::env::var(variable) {
            return Some(value);
        }
        if self.case_insensitive {
            return std::env::vars()
                .find(|(key, _)| key.eq_ignore_ascii_case(variable))
                .map(|(_, value)| value);
        }
        None
    }

    fn read_dot_env(&self) -> Result<HashMap<String, String>> {
        let dir = self
            .working_dir()
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."));
        let path = dir.join(".env");
        if !path.exists() {
            debug!("No .env file at {}", path.display());
            return Ok(HashMap::new());
        }

        let iter = dotenvy::from_path_iter(&path).map_err(|e| {
            SecretError::Load(format!("Failed to read {}: {e}", path.display()))
        })?;
        let mut entries = HashMap::new();
        for item in iter {
            let (key, value) = item.map_err(|e| {
                SecretError::Load(format!("Failed to parse {}: {e}", path.display()))
            })?;
            entries.insert(key, value);
        }
        debug!("Read {} entries from {}", entries.len(), path.display());
        Ok(entries)
    }
}

#[async_trait]
impl Connector for EnvConnector {
    async fn load(&self, names: &[String]) -> Result<()> {
        let dot_env = if self.allow_dot_env {
            self.read_dot_env()?
        } else {
            HashMap::new()
        };

        for name in names {
            if !SECRET_NAME_PATTERN.is_match(name) {
                return Err(SecretError::Load(format!(
                    "Invalid secret name '{name}': only letters, digits and underscores are allowed, and it must not start with a digit"
                )));
            }

            let variable = self.variable_name(name);
            let value = self.lookup_process_env(&variable).or_else(|| {
                if self.case_insensitive {
                    dot_env
                        .iter()
                        .find(|(key, _)| key.eq_ignore_ascii_case(&variable))
                        .map(|(_, value)| value.clone())
                } else {
                    dot_env.get(&variable).cloned()
                }
            });

            match value {
                Some(raw) => {
                    debug!("Resolved secret {} from {}", name, variable);
                    self.cache.insert_raw(name, raw);
                }
                None => {
                    return Err(SecretError::Load(format!(
                        "Missing environment variable '{variable}' for secret '{name}'"
                    )));
                }
            }
        }
        Ok(())
    }

    fn get(&self, name: &str) -> Result<SecretValue> {
        self.cache.get("env", name)
    }

    fn set_working_dir(&self, dir: &Path) {
        let mut working_dir = self
            .working_dir
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        *working_dir = Some(dir.to_path_buf());
    }

    fn working_dir(&self) -> Option<PathBuf> {
        self.working_dir
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_load_reads_prefixed_variable() {
        std::env::set_var("ENVCONN_T1_API_KEY", "abc123");
        let connector = EnvConnector::new().with_prefix("ENVCONN_T1_");
        connector.load(&["API_KEY".to_string()]).await.unwrap();
        assert_eq!(connector.get("API_KEY").unwrap(), json!("abc123"));
    }

    #[tokio::test]
    async fn test_load_missing_variable_fails() {
        let connector = EnvConnector::new().with_prefix("ENVCONN_T2_");
        let err = connector
            .load(&["NOT_SET_ANYWHERE".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, SecretError::Load(_)));
        assert!(err.to_string().contains("ENVCONN_T2_NOT_SET_ANYWHERE"));
    }

    #[tokio::test]
    async fn test_load_rejects_invalid_names() {
        let connector = EnvConnector::new();
        let err = connector.load(&["bad-name".to_string()]).await.unwrap_err();
        assert!(err.to_string().contains("Invalid secret name"));
    }

    #[tokio::test]
    async fn test_case_insensitive_lookup() {
        std::env::set_var("envconn_t3_token", "lower");
        let connector = EnvConnector::new()
            .with_prefix("ENVCONN_T3_")
            .case_insensitive(true);
        connector.load(&["TOKEN".to_string()]).await.unwrap();
        assert_eq!(connector.get("TOKEN").unwrap(), json!("lower"));
    }

    #[tokio::test]
    async fn test_dot_env_in_working_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(".env"),
            "ENVCONN_T4_DB={\"username\":\"u\",\"password\":\"p\"}\n",
        )
        .unwrap();

        let connector = EnvConnector::new()
            .with_prefix("ENVCONN_T4_")
            .with_dot_env(true);
        connector.set_working_dir(dir.path());
        assert_eq!(connector.working_dir().as_deref(), Some(dir.path()));

        connector.load(&["DB".to_string()]).await.unwrap();
        assert_eq!(
            connector.get("DB").unwrap(),
            json!({"username": "u", "password": "p"})
        );
    }

    #[tokio::test]
    async fn test_repeated_load_is_idempotent() {
        std::env::set_var("ENVCONN_T5_A", "1");
        let connector = EnvConnector::new().with_prefix("ENVCONN_T5_");
        connector.load(&["A".to_string()]).await.unwrap();
        connector.load(&["A".to_string()]).await.unwrap();
        assert_eq!(connector.get("A").unwrap(), json!("1"));
    }
}
