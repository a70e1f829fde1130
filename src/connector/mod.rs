//! # Connectors
//!
//! Connectors resolve a named secret's raw value from an external source.
//!
//! Each connector implements the [`Connector`] trait:
//! - `load` resolves a batch of names and fails fast on the first missing one
//! - `get` reads a previously loaded value from the connector's private cache
//!
//! Built-in connectors:
//! - [`EnvConnector`] reads `<prefix><NAME>` from the environment (and optionally a `.env` file)
//! - [`FileConnector`] reads one file per secret from a directory
//! - [`InMemoryConnector`] serves a fixed set of values

use crate::error::{Result, SecretError};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};
use zeroize::Zeroizing;

pub mod env;
pub mod file;
pub mod in_memory;

pub use env::EnvConnector;
pub use file::FileConnector;
pub use in_memory::InMemoryConnector;

/// A resolved secret value: a plain string, or structured JSON for multi-field secrets
pub type SecretValue = Value;

/// Connector trait for secret sources
#[async_trait]
pub trait Connector: Send + Sync + fmt::Debug {
    /// Resolve and cache the given secret names
    /// Fails on the first name that cannot be resolved
    async fn load(&self, names: &[String]) -> Result<()>;

    /// Read a value cached by a previous `load`
    fn get(&self, name: &str) -> Result<SecretValue>;

    /// Point filesystem-backed connectors at a directory (no-op for other sources)
    fn set_working_dir(&self, _dir: &Path) {}

    fn working_dir(&self) -> Option<PathBuf> {
        None
    }
}

struct CachedValue {
    raw: Zeroizing<String>,
    structured: bool,
}

/// Per-connector value cache
///
/// Raw text is held in `Zeroizing` buffers so cleartext is wiped when the cache drops.
#[derive(Default)]
pub struct ValueCache {
    values: RwLock<HashMap<String, CachedValue>>,
}

impl fmt::Debug for ValueCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let values = self.values.read().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<&String> = values.keys().collect();
        names.sort();
        f.debug_struct("ValueCache").field("names", &names).finish()
    }
}

impl ValueCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cache raw text; JSON objects and arrays are kept structured
    pub fn insert_raw(&self, name: &str, raw: String) {
        let structured = looks_structured(&raw);
        self.insert(name, raw, structured);
    }

    /// Cache an already-typed value
    pub fn insert_value(&self, name: &str, value: &SecretValue) {
        match value {
            Value::String(s) => self.insert(name, s.clone(), false),
            other => self.insert(name, other.to_string(), true),
        }
    }

    fn insert(&self, name: &str, raw: String, structured: bool) {
        let mut values = self.values.write().unwrap_or_else(PoisonError::into_inner);
        values.insert(
            name.to_string(),
            CachedValue {
                raw: Zeroizing::new(raw),
                structured,
            },
        );
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }

    /// Fetch a cached value, failing when `load` never covered this name
    pub fn get(&self, connector: &str, name: &str) -> Result<SecretValue> {
        let values = self.values.read().unwrap_or_else(PoisonError::into_inner);
        let cached = values.get(name).ok_or_else(|| {
            SecretError::Load(format!(
                "Secret '{name}' was not loaded by connector '{connector}'. Call load() before get()."
            ))
        })?;

        if cached.structured {
            serde_json::from_str(cached.raw.as_str()).map_err(|e| {
                SecretError::Load(format!(
                    "Cached value for secret '{name}' in connector '{connector}' is not valid JSON: {e}"
                ))
            })
        } else {
            Ok(Value::String(cached.raw.as_str().to_string()))
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Objects and arrays are parsed, scalars stay as the original string
fn looks_structured(raw: &str) -> bool {
    let trimmed = raw.trim_start();
    (trimmed.starts_with('{') || trimmed.starts_with('['))
        && serde_json::from_str::<Value>(raw).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_cache_keeps_scalars_as_strings() {
        let cache = ValueCache::new();
        cache.insert_raw("PORT", "8080".to_string());
        assert_eq!(cache.get("test", "PORT").unwrap(), json!("8080"));
    }

    #[test]
    fn test_cache_parses_json_objects() {
        let cache = ValueCache::new();
        cache.insert_raw("DB", r#"{"username":"app","password":"pw"}"#.to_string());
        assert_eq!(
            cache.get("test", "DB").unwrap(),
            json!({"username": "app", "password": "pw"})
        );
    }

    #[test]
    fn test_cache_keeps_invalid_json_as_string() {
        let cache = ValueCache::new();
        cache.insert_raw("WEIRD", "{not json".to_string());
        assert_eq!(cache.get("test", "WEIRD").unwrap(), json!("{not json"));
    }

    #[test]
    fn test_cache_string_value_that_looks_like_json_stays_string() {
        let cache = ValueCache::new();
        cache.insert_value("S", &json!("{\"a\":1}"));
        assert_eq!(cache.get("test", "S").unwrap(), json!("{\"a\":1}"));
    }

    #[test]
    fn test_cache_get_unloaded_fails() {
        let cache = ValueCache::new();
        let err = cache.get("env", "MISSING").unwrap_err();
        assert!(matches!(err, SecretError::Load(_)));
        assert!(err.to_string().contains("MISSING"));
    }

    #[test]
    fn test_cache_debug_does_not_print_values() {
        let cache = ValueCache::new();
        cache.insert_raw("TOKEN", "hunter2".to_string());
        let debug = format!("{cache:?}");
        assert!(debug.contains("TOKEN"));
        assert!(!debug.contains("hunter2"));
    }
}
