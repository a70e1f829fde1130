//! # In-Memory Connector
//!
//! Serves a fixed map of values. Used for fixtures and literal values in project config.

use super::{Connector, SecretValue, ValueCache};
use crate::error::{Result, SecretError};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fmt;

pub struct InMemoryConnector {
    values: BTreeMap<String, SecretValue>,
    cache: ValueCache,
}

impl fmt::Debug for InMemoryConnector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryConnector")
            .field("names", &self.values.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl InMemoryConnector {
    #[must_use]
    pub fn new(values: BTreeMap<String, SecretValue>) -> Self {
        Self {
            values,
            cache: ValueCache::new(),
        }
    }

    /// Build from `(name, value)` pairs
    pub fn from_pairs<I, K>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, SecretValue)>,
        K: Into<String>,
    {
        Self::new(pairs.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

#[async_trait]
impl Connector for InMemoryConnector {
    async fn load(&self, names: &[String]) -> Result<()> {
        for name in names {
            let value = self.values.get(name).ok_or_else(|| {
                SecretError::Load(format!("Secret '{name}' not found in in-memory connector"))
            })?;
            self.cache.insert_value(name, value);
        }
        Ok(())
    }

    fn get(&self, name: &str) -> Result<SecretValue> {
        self.cache.get("in-memory", name)
    }
}
