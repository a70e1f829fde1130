//! # Prepared Effects
//!
//! Apply-ready artifacts produced by providers from resolved secret values.
//!
//! `Kubectl` effects carry a Kubernetes `Secret` manifest (data values base64-encoded).
//! `Custom` effects carry provider-defined state that never reaches the cluster directly.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Replacement for every secret-bearing field in diagnostics
pub const MASK_TOKEN: &str = "***";

/// Fields whose values are secret material
const SECRET_FIELDS: &[&str] = &["data", "stringData"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum EffectKind {
    Custom,
    Kubectl,
}

impl fmt::Display for EffectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EffectKind::Custom => f.write_str("custom"),
            EffectKind::Kubectl => f.write_str("kubectl"),
        }
    }
}

#[derive(Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreparedEffect {
    pub kind: EffectKind,
    pub payload: Value,
    pub provider_name: String,
    pub secret_name: String,
}

impl fmt::Debug for PreparedEffect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreparedEffect")
            .field("kind", &self.kind)
            .field("payload", &self.masked_payload())
            .field("provider_name", &self.provider_name)
            .field("secret_name", &self.secret_name)
            .finish()
    }
}

impl PreparedEffect {
    #[must_use]
    pub fn kubectl(payload: Value, provider_name: &str, secret_name: &str) -> Self {
        Self {
            kind: EffectKind::Kubectl,
            payload,
            provider_name: provider_name.to_string(),
            secret_name: secret_name.to_string(),
        }
    }

    #[must_use]
    pub fn custom(payload: Value, provider_name: &str, secret_name: &str) -> Self {
        Self {
            kind: EffectKind::Custom,
            payload,
            provider_name: provider_name.to_string(),
            secret_name: secret_name.to_string(),
        }
    }

    /// Key/value payload of the effect (`payload.data`)
    #[must_use]
    pub fn data(&self) -> Option<&Map<String, Value>> {
        self.payload.get("data").and_then(Value::as_object)
    }

    /// Mutable `payload.data`, created empty when missing
    pub fn data_mut(&mut self) -> Option<&mut Map<String, Value>> {
        let payload = self.payload.as_object_mut()?;
        payload
            .entry("data")
            .or_insert_with(|| Value::Object(Map::new()))
            .as_object_mut()
    }

    /// `namespace/name` of a Kubernetes-shaped payload
    #[must_use]
    pub fn manifest_identifier(&self) -> Option<String> {
        let metadata = self.payload.get("metadata")?;
        let name = metadata.get("name").and_then(Value::as_str)?;
        let namespace = metadata
            .get("namespace")
            .and_then(Value::as_str)
            .unwrap_or("default");
        Some(format!("{namespace}/{name}"))
    }

    /// Copy of the payload with every secret-bearing value replaced by [`MASK_TOKEN`]
    #[must_use]
    pub fn masked_payload(&self) -> Value {
        mask_secret_fields(&self.payload)
    }
}

/// Replace values under `data`/`stringData` with the mask token, keeping the keys visible
#[must_use]
pub fn mask_secret_fields(payload: &Value) -> Value {
    let mut masked = payload.clone();
    if let Some(object) = masked.as_object_mut() {
        for field in SECRET_FIELDS {
            match object.get_mut(*field) {
                Some(Value::Object(entries)) => {
                    for value in entries.values_mut() {
                        *value = Value::String(MASK_TOKEN.to_string());
                    }
                }
                Some(other) => *other = Value::String(MASK_TOKEN.to_string()),
                None => {}
            }
        }
    }
    masked
}
