//! # Cluster Apply
//!
//! Collaborators that push `kubectl` effects into a cluster.
//!
//! - [`KubectlApplier`] writes each manifest to a temporary file and shells out to `kubectl apply -f`.
//!   The file is removed when the apply returns, whether it succeeded or not.
//! - [`KubeApiApplier`] uses server-side apply through the Kubernetes API.

use crate::error::{Result, SecretError};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::api::{Api, Patch, PatchParams};
use kube::Client;
use serde_json::Value;
use std::fmt;
use std::io::Write;
use std::path::PathBuf;
use tracing::{debug, info};

/// Field manager used for server-side apply
pub const FIELD_MANAGER: &str = "secretctl";

/// Applies one manifest at a time
#[async_trait]
pub trait ClusterApplier: Send + Sync + fmt::Debug {
    async fn apply(&self, manifest: &Value) -> Result<()>;
}

fn manifest_name(manifest: &Value) -> Result<(String, Option<String>)> {
    let metadata = manifest.get("metadata");
    let name = metadata
        .and_then(|m| m.get("name"))
        .and_then(Value::as_str)
        .ok_or_else(|| SecretError::Apply("Manifest has no metadata.name".to_string()))?;
    let namespace = metadata
        .and_then(|m| m.get("namespace"))
        .and_then(Value::as_str)
        .map(str::to_string);
    Ok((name.to_string(), namespace))
}

#[derive(Debug, Clone)]
pub struct KubectlApplier {
    binary: PathBuf,
    context: Option<String>,
    server_side: bool,
}

impl Default for KubectlApplier {
    fn default() -> Self {
        Self::new("kubectl")
    }
}

impl KubectlApplier {
    #[must_use]
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            context: None,
            server_side: false,
        }
    }

    #[must_use]
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    #[must_use]
    pub fn server_side(mut self, enabled: bool) -> Self {
        self.server_side = enabled;
        self
    }

    fn args(&self, file: &std::path::Path) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(context) = &self.context {
            args.push("--context".to_string());
            args.push(context.clone());
        }
        args.push("apply".to_string());
        if self.server_side {
            args.push("--server-side".to_string());
            args.push(format!("--field-manager={FIELD_MANAGER}"));
        }
        args.push("-f".to_string());
        args.push(file.display().to_string());
        args
    }
}

#[async_trait]
impl ClusterApplier for KubectlApplier {
    async fn apply(&self, manifest: &Value) -> Result<()> {
        let (name, namespace) = manifest_name(manifest)?;
        let body = serde_json::to_vec_pretty(manifest)
            .map_err(|e| SecretError::Apply(format!("Failed to serialize manifest {name}: {e}")))?;

        // dropped (and deleted) at the end of this call
        let mut file = tempfile::Builder::new()
            .prefix("secretctl-")
            .suffix(".json")
            .tempfile()
            .map_err(|e| SecretError::Apply(format!("Failed to create temporary manifest file: {e}")))?;
        file.write_all(&body)
            .and_then(|()| file.flush())
            .map_err(|e| SecretError::Apply(format!("Failed to write temporary manifest file: {e}")))?;

        let args = self.args(file.path());
        debug!("Running {} {}", self.binary.display(), args.join(" "));
        let output = tokio::process::Command::new(&self.binary)
            .args(&args)
            .output()
            .await
            .map_err(|e| {
                SecretError::Apply(format!(
                    "Failed to execute {}: {e}",
                    self.binary.display()
                ))
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(SecretError::Apply(format!(
                "kubectl apply failed for Secret {}/{name}: {}",
                namespace.as_deref().unwrap_or("default"),
                stderr.trim()
            )));
        }

        info!(
            "Applied Secret {}/{}: {}",
            namespace.as_deref().unwrap_or("default"),
            name,
            String::from_utf8_lossy(&output.stdout).trim()
        );
        Ok(())
    }
}

/// Server-side apply through the Kubernetes API
pub struct KubeApiApplier {
    client: Client,
    default_namespace: String,
}

impl fmt::Debug for KubeApiApplier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KubeApiApplier")
            .field("default_namespace", &self.default_namespace)
            .finish_non_exhaustive()
    }
}

impl KubeApiApplier {
    #[must_use]
    pub fn new(client: Client) -> Self {
        let default_namespace = client.default_namespace().to_string();
        Self {
            client,
            default_namespace,
        }
    }

    /// Build a client from the local kubeconfig or in-cluster environment
    pub async fn try_default() -> Result<Self> {
        let client = Client::try_default()
            .await
            .map_err(|e| SecretError::Apply(format!("Failed to create Kubernetes client: {e}")))?;
        Ok(Self::new(client))
    }
}

#[async_trait]
impl ClusterApplier for KubeApiApplier {
    async fn apply(&self, manifest: &Value) -> Result<()> {
        let (name, namespace) = manifest_name(manifest)?;
        let namespace = namespace.unwrap_or_else(|| self.default_namespace.clone());
        let secret: Secret = serde_json::from_value(manifest.clone()).map_err(|e| {
            SecretError::Apply(format!("Manifest {namespace}/{name} is not a Secret: {e}"))
        })?;

        let api: Api<Secret> = Api::namespaced(self.client.clone(), &namespace);
        let params = PatchParams::apply(FIELD_MANAGER).force();
        api.patch(&name, &params, &Patch::Apply(&secret))
            .await
            .map_err(|e| {
                SecretError::Apply(format!("Server-side apply failed for Secret {namespace}/{name}: {e}"))
            })?;

        info!("Applied Secret {}/{} via API", namespace, name);
        Ok(())
    }
}
