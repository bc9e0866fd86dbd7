use std::collections::{BTreeMap, BTreeSet};
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("category not found in config: {0}")]
    NotFound(String),
    #[error("category already in config: {0}")]
    Conflict(String),
    #[error("config I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("config parse error: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigEntry {
    pub name: String,
    pub description: String,
}

/// Persisted category → description mapping.
///
/// The on-disk representation is a single JSON object. Reads load it on
/// demand so edits made outside the process are visible on the next query;
/// mutations serialize their read-modify-write cycle and replace the file
/// atomically, so a crash never leaves a half-written mapping.
pub struct ConfigStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl ConfigStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn get(&self, name: &str) -> Result<Option<ConfigEntry>, ConfigError> {
        let entries = self.load().await?;
        Ok(entries.get(name).map(|description| ConfigEntry {
            name: name.to_string(),
            description: description.clone(),
        }))
    }

    pub async fn list(&self) -> Result<Vec<ConfigEntry>, ConfigError> {
        let entries = self.load().await?;
        Ok(entries
            .into_iter()
            .map(|(name, description)| ConfigEntry { name, description })
            .collect())
    }

    pub async fn names(&self) -> Result<BTreeSet<String>, ConfigError> {
        let entries = self.load().await?;
        Ok(entries.into_keys().collect())
    }

    pub async fn put(&self, entry: &ConfigEntry) -> Result<(), ConfigError> {
        let _guard = self.write_lock.lock().await;
        let mut entries = self.load().await?;
        entries.insert(entry.name.clone(), entry.description.clone());
        self.persist(&entries).await
    }

    pub async fn delete(&self, name: &str) -> Result<(), ConfigError> {
        let _guard = self.write_lock.lock().await;
        let mut entries = self.load().await?;
        if entries.remove(name).is_none() {
            return Err(ConfigError::NotFound(name.to_string()));
        }
        self.persist(&entries).await
    }

    pub async fn rename(&self, old: &str, new: &str) -> Result<(), ConfigError> {
        let _guard = self.write_lock.lock().await;
        let mut entries = self.load().await?;
        if entries.contains_key(new) {
            return Err(ConfigError::Conflict(new.to_string()));
        }
        let Some(description) = entries.remove(old) else {
            return Err(ConfigError::NotFound(old.to_string()));
        };
        entries.insert(new.to_string(), description);
        self.persist(&entries).await
    }

    async fn load(&self) -> Result<BTreeMap<String, String>, ConfigError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(err) => Err(err.into()),
        }
    }

    async fn persist(&self, entries: &BTreeMap<String, String>) -> Result<(), ConfigError> {
        let payload = serde_json::to_vec_pretty(entries)?;
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let staging = staging_path(&self.path);
        let mut file = tokio::fs::File::create(&staging).await?;
        file.write_all(&payload).await?;
        file.sync_all().await?;
        tokio::fs::rename(&staging, &self.path).await?;
        Ok(())
    }
}

fn staging_path(target: &Path) -> PathBuf {
    target.with_extension(format!(
        "{}staging",
        target
            .extension()
            .map(|ext| format!("{}.", ext.to_string_lossy()))
            .unwrap_or_default()
    ))
}
