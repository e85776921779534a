//! Model / pipeline installation boundary
//!
//! Received blobs are persisted and handed to the local registry
//! through this seam. The embedding platform usually supplies its own
//! implementation; [`LocalInstaller`] is a self-contained filesystem
//! store so the crate works without one.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::info;

use crate::error::{Error, Result};

/// Local registry operations the coordinator calls after a blob lands
#[async_trait]
pub trait ServiceInstaller: Send + Sync {
    /// Register a model file. Returns the assigned version string.
    async fn install_model(
        &self,
        key: &str,
        path: &Path,
        activate: bool,
        description: Option<&str>,
    ) -> Result<String>;

    /// Register a pipeline description under a key
    async fn install_pipeline(&self, key: &str, description: &str) -> Result<()>;
}

// ─────────────────────────────────────────────────────────────────
// Local Installer
// ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
struct ModelEntry {
    version: u32,
    path: PathBuf,
    active: bool,
    description: Option<String>,
}

/// Filesystem-backed installer with an in-memory name → version index
pub struct LocalInstaller {
    store_dir: PathBuf,
    models: RwLock<HashMap<String, Vec<ModelEntry>>>,
    pipelines: RwLock<HashMap<String, String>>,
}

impl LocalInstaller {
    /// Create an installer persisting under `store_dir`
    pub fn new(store_dir: impl Into<PathBuf>) -> Self {
        Self {
            store_dir: store_dir.into(),
            models: RwLock::new(HashMap::new()),
            pipelines: RwLock::new(HashMap::new()),
        }
    }

    /// Latest registered version for a model key
    pub fn model_version(&self, key: &str) -> Option<u32> {
        self.models
            .read()
            .get(key)
            .and_then(|entries| entries.last())
            .map(|e| e.version)
    }

    /// Path of the active model for a key, if any
    pub fn active_model_path(&self, key: &str) -> Option<PathBuf> {
        self.models
            .read()
            .get(key)?
            .iter()
            .rev()
            .find(|e| e.active)
            .map(|e| e.path.clone())
    }

    /// Description hint recorded with the latest version of a model
    pub fn model_description(&self, key: &str) -> Option<String> {
        self.models
            .read()
            .get(key)
            .and_then(|entries| entries.last())
            .and_then(|e| e.description.clone())
    }

    /// Registered pipeline description for a key
    pub fn pipeline(&self, key: &str) -> Option<String> {
        self.pipelines.read().get(key).cloned()
    }
}

#[async_trait]
impl ServiceInstaller for LocalInstaller {
    async fn install_model(
        &self,
        key: &str,
        path: &Path,
        activate: bool,
        description: Option<&str>,
    ) -> Result<String> {
        if key.is_empty() {
            return Err(Error::invalid_parameter("model key is empty"));
        }
        if !path.is_file() {
            return Err(Error::NotFound {
                what: format!("model file {}", path.display()),
            });
        }

        let version = {
            let mut models = self.models.write();
            let entries = models.entry(key.to_string()).or_default();
            let version = entries.last().map(|e| e.version + 1).unwrap_or(1);
            if activate {
                for entry in entries.iter_mut() {
                    entry.active = false;
                }
            }
            entries.push(ModelEntry {
                version,
                path: path.to_path_buf(),
                active: activate,
                description: description.map(str::to_string),
            });
            version
        };

        info!(key = %key, version, activate, "Model registered");
        Ok(version.to_string())
    }

    async fn install_pipeline(&self, key: &str, description: &str) -> Result<()> {
        if key.is_empty() || description.is_empty() {
            return Err(Error::invalid_parameter(
                "pipeline key and description must be non-empty",
            ));
        }
        tokio::fs::create_dir_all(&self.store_dir)
            .await
            .map_err(|e| Error::file_write(&self.store_dir, e))?;
        let path = self.store_dir.join(format!("{}.pipeline", key));
        tokio::fs::write(&path, description.as_bytes())
            .await
            .map_err(|e| Error::file_write(&path, e))?;

        self.pipelines
            .write()
            .insert(key.to_string(), description.to_string());
        info!(key = %key, "Pipeline registered");
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────
