//! # File Connector
//!
//! Resolves each secret from a file named after it inside the working directory,
//! e.g. a mounted secrets directory (`/run/secrets/API_KEY`).

use super::{Connector, SecretValue, ValueCache};
use crate::error::{Result, SecretError};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};
use tracing::debug;

#[derive(Debug)]
pub struct FileConnector {
    working_dir: RwLock<PathBuf>,
    extension: Option<String>,
    cache: ValueCache,
}

impl FileConnector {
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            working_dir: RwLock::new(dir.into()),
            extension: None,
            cache: ValueCache::new(),
        }
    }

    /// Append an extension to every file name (`API_KEY` → `API_KEY.json`)
    #[must_use]
    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        let extension: String = extension.into();
        self.extension = Some(extension.trim_start_matches('.').to_string());
        self
    }

    fn path_for(&self, name: &str) -> PathBuf {
        let dir = self
            .working_dir
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        match &self.extension {
            Some(ext) => dir.join(format!("{name}.{ext}")),
            None => dir.join(name),
        }
    }
}

#[async_trait]
impl Connector for FileConnector {
    async fn load(&self, names: &[String]) -> Result<()> {
        for name in names {
            if name.contains('/') || name.contains('\\') || name.contains("..") {
                return Err(SecretError::Load(format!(
                    "Invalid secret name '{name}': path separators are not allowed"
                )));
            }

            let path = self.path_for(name);
            let content = tokio::fs::read_to_string(&path).await.map_err(|e| {
                SecretError::Load(format!(
                    "Failed to read secret '{name}' from {}: {e}",
                    path.display()
                ))
            })?;

            // Files written by editors usually end with a newline that is not part of the secret
            let value = content
                .strip_suffix('\n')
                .map(|s| s.strip_suffix('\r').unwrap_or(s))
                .unwrap_or(&content)
                .to_string();

            debug!("Resolved secret {} from {}", name, path.display());
            self.cache.insert_raw(name, value);
        }
        Ok(())
    }

    fn get(&self, name: &str) -> Result<SecretValue> {
        self.cache.get("file", name)
    }

    fn set_working_dir(&self, dir: &Path) {
        let mut working_dir = self
            .working_dir
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        *working_dir = dir.to_path_buf();
    }

    fn working_dir(&self) -> Option<PathBuf> {
        Some(
            self.working_dir
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
        )
    }
}
