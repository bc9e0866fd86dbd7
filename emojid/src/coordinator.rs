use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

use crate::store::asset_store::{AssetError, AssetStore};
use crate::store::config_store::{ConfigEntry, ConfigError, ConfigStore};
use crate::sync::engine::{EngineError, RemoteDelta, RemoteSyncEngine};
use crate::sync::job::{Direction, JobPoll};
use crate::sync::lifecycle::{CategoryLifecycle, LifecycleError};
use crate::sync::reconciler::{ReconcileError, Reconciler, SyncDiff};

#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("remote image host is not configured")]
    RemoteUnavailable,
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),
    #[error(transparent)]
    Reconcile(#[from] ReconcileError),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Asset(#[from] AssetError),
}

/// Failure classification for the presentation boundary. Recovery differs
/// per kind (pick another name on Conflict, retry the sync on
/// TransferFailure), so callers get a discriminant instead of having to
/// sniff message strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    Conflict,
    InvalidInput,
    AlreadyRunning,
    TransferFailure,
    StorageFailure,
}

impl CoordinatorError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoordinatorError::RemoteUnavailable => ErrorKind::TransferFailure,
            CoordinatorError::Lifecycle(err) => lifecycle_kind(err),
            CoordinatorError::Reconcile(err) => reconcile_kind(err),
            CoordinatorError::Engine(err) => engine_kind(err),
            CoordinatorError::Config(err) => config_kind(err),
            CoordinatorError::Asset(err) => asset_kind(err),
        }
    }
}

fn lifecycle_kind(err: &LifecycleError) -> ErrorKind {
    match err {
        LifecycleError::NotFound(_) => ErrorKind::NotFound,
        LifecycleError::Conflict(_) => ErrorKind::Conflict,
        LifecycleError::Config(err) => config_kind(err),
        LifecycleError::Asset(err) => asset_kind(err),
    }
}

fn reconcile_kind(err: &ReconcileError) -> ErrorKind {
    match err {
        ReconcileError::NotDeleted(_) => ErrorKind::NotFound,
        ReconcileError::Reappeared(_) => ErrorKind::Conflict,
        ReconcileError::Config(err) => config_kind(err),
        ReconcileError::Asset(err) => asset_kind(err),
    }
}

fn engine_kind(err: &EngineError) -> ErrorKind {
    match err {
        EngineError::AlreadyRunning(_) => ErrorKind::AlreadyRunning,
        EngineError::Api(_) | EngineError::Transfer(_) => ErrorKind::TransferFailure,
        EngineError::Asset(err) => asset_kind(err),
        EngineError::Io(_) => ErrorKind::StorageFailure,
    }
}

fn config_kind(err: &ConfigError) -> ErrorKind {
    match err {
        ConfigError::NotFound(_) => ErrorKind::NotFound,
        ConfigError::Conflict(_) => ErrorKind::Conflict,
        ConfigError::Io(_) | ConfigError::Parse(_) => ErrorKind::StorageFailure,
    }
}

fn asset_kind(err: &AssetError) -> ErrorKind {
    match err {
        AssetError::CategoryNotFound(_) | AssetError::AssetNotFound { .. } => ErrorKind::NotFound,
        AssetError::Conflict(_) => ErrorKind::Conflict,
        AssetError::Name(_) | AssetError::UnsupportedFormat(_) | AssetError::EmptyPayload => {
            ErrorKind::InvalidInput
        }
        AssetError::Io(_) => ErrorKind::StorageFailure,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssetRef {
    pub category: String,
    pub filename: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryChange {
    pub category: String,
    pub description: String,
}

impl From<ConfigEntry> for CategoryChange {
    fn from(entry: ConfigEntry) -> Self {
        Self {
            category: entry.name,
            description: entry.description,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncReport {
    pub status: &'static str,
    pub differences: SyncDiff,
}

/// Wires the stores, reconciler, lifecycle, and remote engine together for
/// the HTTP layer; one method per exposed operation, no state of its own.
pub struct SyncCoordinator {
    config: Arc<ConfigStore>,
    assets: Arc<AssetStore>,
    reconciler: Reconciler,
    lifecycle: CategoryLifecycle,
    remote: Option<Arc<RemoteSyncEngine>>,
}

impl SyncCoordinator {
    pub fn new(
        config: Arc<ConfigStore>,
        assets: Arc<AssetStore>,
        remote: Option<Arc<RemoteSyncEngine>>,
    ) -> Self {
        Self {
            reconciler: Reconciler::new(Arc::clone(&config), Arc::clone(&assets)),
            lifecycle: CategoryLifecycle::new(Arc::clone(&config), Arc::clone(&assets)),
            config,
            assets,
            remote,
        }
    }

    pub async fn list_assets(&self) -> Result<BTreeMap<String, Vec<String>>, CoordinatorError> {
        Ok(self.assets.inventory().await?)
    }

    pub async fn list_descriptions(&self) -> Result<BTreeMap<String, String>, CoordinatorError> {
        Ok(self
            .config
            .list()
            .await?
            .into_iter()
            .map(|entry| (entry.name, entry.description))
            .collect())
    }

    pub async fn add_asset(
        &self,
        category: &str,
        original_filename: &str,
        bytes: &[u8],
    ) -> Result<AssetRef, CoordinatorError> {
        let filename = self
            .assets
            .put_asset_unique(category, original_filename, bytes)
            .await?;
        Ok(AssetRef {
            category: category.to_string(),
            filename,
        })
    }

    pub async fn delete_asset(
        &self,
        category: &str,
        filename: &str,
    ) -> Result<AssetRef, CoordinatorError> {
        self.assets.delete_asset(category, filename).await?;
        Ok(AssetRef {
            category: category.to_string(),
            filename: filename.to_string(),
        })
    }

    pub async fn create_category(
        &self,
        name: &str,
        description: &str,
    ) -> Result<CategoryChange, CoordinatorError> {
        Ok(self.lifecycle.create(name, description).await?.into())
    }

    pub async fn restore_category(
        &self,
        name: &str,
        description: &str,
    ) -> Result<CategoryChange, CoordinatorError> {
        Ok(self.lifecycle.restore(name, description).await?.into())
    }

    pub async fn rename_category(&self, old: &str, new: &str) -> Result<(), CoordinatorError> {
        Ok(self.lifecycle.rename(old, new).await?)
    }

    pub async fn delete_category(&self, name: &str) -> Result<(), CoordinatorError> {
        Ok(self.lifecycle.delete(name).await?)
    }

    pub async fn update_description(
        &self,
        name: &str,
        description: &str,
    ) -> Result<CategoryChange, CoordinatorError> {
        Ok(self.lifecycle.update_description(name, description).await?.into())
    }

    pub async fn remove_from_config(&self, name: &str) -> Result<(), CoordinatorError> {
        Ok(self.reconciler.remove_from_config(name).await?)
    }

    pub async fn sync_status(&self) -> Result<SyncReport, CoordinatorError> {
        Ok(SyncReport {
            status: "ok",
            differences: self.reconciler.diff().await?,
        })
    }

    pub async fn sync_config(&self) -> Result<usize, CoordinatorError> {
        Ok(self.reconciler.sync_config().await?)
    }

    pub async fn remote_status(&self) -> Result<RemoteDelta, CoordinatorError> {
        Ok(self.remote()?.status().await?)
    }

    pub fn start_upload(&self) -> Result<(), CoordinatorError> {
        Ok(Arc::clone(self.remote()?).start(Direction::Upload)?)
    }

    pub fn start_download(&self) -> Result<(), CoordinatorError> {
        Ok(Arc::clone(self.remote()?).start(Direction::Download)?)
    }

    pub fn poll_remote(&self, direction: Direction) -> Result<JobPoll, CoordinatorError> {
        Ok(self.remote()?.poll(direction))
    }

    fn remote(&self) -> Result<&Arc<RemoteSyncEngine>, CoordinatorError> {
        self.remote.as_ref().ok_or(CoordinatorError::RemoteUnavailable)
    }
}
