//! Shared fixtures for integration tests

#![allow(dead_code, reason = "not every test binary uses every fixture")]

use async_trait::async_trait;
use serde_json::{json, Value};
use stack_secrets::connector::{Connector, InMemoryConnector, SecretValue};
use stack_secrets::manager::{SecretDefinition, SecretManager};
use stack_secrets::provider::{KubernetesSecretTarget, OpaqueSecretProvider};
use stack_secrets::Result;
use std::collections::HashMap;
use std::sync::Mutex;

/// In-memory connector that counts `load` calls per secret name
#[derive(Debug)]
pub struct CountingConnector {
    inner: InMemoryConnector,
    loads: Mutex<HashMap<String, usize>>,
}

impl CountingConnector {
    pub fn new(values: &[(&str, Value)]) -> Self {
        Self {
            inner: InMemoryConnector::from_pairs(values.iter().map(|(k, v)| (*k, v.clone()))),
            loads: Mutex::new(HashMap::new()),
        }
    }

    pub fn loads(&self, name: &str) -> usize {
        self.loads.lock().unwrap().get(name).copied().unwrap_or(0)
    }

    pub fn total_loads(&self) -> usize {
        self.loads.lock().unwrap().values().sum()
    }
}

#[async_trait]
impl Connector for CountingConnector {
    async fn load(&self, names: &[String]) -> Result<()> {
        {
            let mut loads = self.loads.lock().unwrap();
            for name in names {
                *loads.entry(name.clone()).or_default() += 1;
            }
        }
        self.inner.load(names).await
    }

    fn get(&self, name: &str) -> Result<SecretValue> {
        self.inner.get(name)
    }
}

pub fn opaque(secret_name: &str) -> OpaqueSecretProvider {
    OpaqueSecretProvider::new(KubernetesSecretTarget::new(secret_name, "default"))
}

/// Manager with an in-memory connector and one opaque provider writing `target`
pub fn opaque_manager(name: &str, target: &str, values: &[(&str, &str)]) -> SecretManager {
    let mut manager = SecretManager::named(name);
    manager
        .add_connector(
            "mem",
            InMemoryConnector::from_pairs(values.iter().map(|(k, v)| (*k, json!(v)))),
        )
        .unwrap()
        .add_provider("opaque", opaque(target))
        .unwrap()
        .set_default_connector("mem")
        .unwrap()
        .set_default_provider("opaque")
        .unwrap();
    for (key, _) in values {
        manager.add_secret(SecretDefinition::new(*key)).unwrap();
    }
    manager
}

pub fn deployment(name: &str) -> Value {
    json!({
        "apiVersion": "apps/v1",
        "kind": "Deployment",
        "metadata": { "name": name },
        "spec": {
            "template": {
                "spec": {
                    "containers": [{ "name": name, "image": format!("{name}:latest") }]
                }
            }
        }
    })
}

pub fn service(name: &str) -> Value {
    json!({
        "apiVersion": "v1",
        "kind": "Service",
        "metadata": { "name": name },
        "spec": { "ports": [{ "port": 80 }] }
    })
}
