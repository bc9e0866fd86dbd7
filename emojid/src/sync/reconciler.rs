use std::collections::BTreeSet;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

use crate::store::asset_store::{AssetError, AssetStore};
use crate::store::config_store::{ConfigEntry, ConfigError, ConfigStore};

/// Description written for categories adopted from disk into the config.
pub const PLACEHOLDER_DESCRIPTION: &str = "Add a description";

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("category is not missing from disk: {0}")]
    NotDeleted(String),
    #[error("category reappeared on disk: {0}")]
    Reappeared(String),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Asset(#[from] AssetError),
}

/// Discrepancies between the directory tree and the config mapping. The two
/// sets are disjoint and, together with the names present in both stores,
/// partition the union of disk and config categories.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncDiff {
    pub missing_in_config: BTreeSet<String>,
    pub deleted_categories: BTreeSet<String>,
}

impl SyncDiff {
    pub fn is_clean(&self) -> bool {
        self.missing_in_config.is_empty() && self.deleted_categories.is_empty()
    }
}

pub struct Reconciler {
    config: Arc<ConfigStore>,
    assets: Arc<AssetStore>,
}

impl Reconciler {
    pub fn new(config: Arc<ConfigStore>, assets: Arc<AssetStore>) -> Self {
        Self { config, assets }
    }

    /// Recomputed from both stores on every call; never cached, because
    /// either side may have been edited outside this process.
    pub async fn diff(&self) -> Result<SyncDiff, ReconcileError> {
        let disk = self.assets.list_categories().await?;
        let config = self.config.names().await?;
        Ok(SyncDiff {
            missing_in_config: disk.difference(&config).cloned().collect(),
            deleted_categories: config.difference(&disk).cloned().collect(),
        })
    }

    /// Adopts every on-disk category the config does not know about yet.
    /// Idempotent; returns how many entries were added.
    pub async fn sync_config(&self) -> Result<usize, ReconcileError> {
        let diff = self.diff().await?;
        for name in &diff.missing_in_config {
            self.config
                .put(&ConfigEntry {
                    name: name.clone(),
                    description: PLACEHOLDER_DESCRIPTION.to_string(),
                })
                .await?;
        }
        Ok(diff.missing_in_config.len())
    }

    /// Recreates the directory for a config entry whose directory vanished.
    /// The caller's view may be stale, so membership is re-checked here.
    pub async fn restore_category(
        &self,
        name: &str,
        fallback_description: &str,
    ) -> Result<ConfigEntry, ReconcileError> {
        let diff = self.diff().await?;
        if !diff.deleted_categories.contains(name) {
            return Err(ReconcileError::NotDeleted(name.to_string()));
        }
        self.assets.create_category(name).await?;
        match self.config.get(name).await? {
            Some(entry) => Ok(entry),
            None => {
                let entry = ConfigEntry {
                    name: name.to_string(),
                    description: fallback_description.to_string(),
                };
                self.config.put(&entry).await?;
                Ok(entry)
            }
        }
    }

    /// Drops a config entry whose directory vanished. Re-checks the disk
    /// right before deleting; a reappeared directory aborts the removal.
    pub async fn remove_from_config(&self, name: &str) -> Result<(), ReconcileError> {
        if self.assets.category_exists(name).await {
            return Err(ReconcileError::Reappeared(name.to_string()));
        }
        Ok(self.config.delete(name).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    async fn fixture(dir: &std::path::Path) -> (Arc<ConfigStore>, Arc<AssetStore>, Reconciler) {
        let config = Arc::new(ConfigStore::new(dir.join("emoji_data.json")));
        let assets = Arc::new(AssetStore::new(dir.join("emoji")));
        assets.init().await.unwrap();
        let reconciler = Reconciler::new(Arc::clone(&config), Arc::clone(&assets));
        (config, assets, reconciler)
    }

    async fn put_entry(config: &ConfigStore, name: &str, description: &str) {
        config
            .put(&ConfigEntry {
                name: name.into(),
                description: description.into(),
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn diff_classifies_both_directions() {
        let dir = tempdir().unwrap();
        let (config, assets, reconciler) = fixture(dir.path()).await;
        assets.create_category("cats").await.unwrap();
        assets.create_category("dogs").await.unwrap();
        put_entry(&config, "cats", "feline").await;
        put_entry(&config, "birds", "avian").await;

        let diff = reconciler.diff().await.unwrap();
        assert_eq!(diff.missing_in_config, BTreeSet::from(["dogs".to_string()]));
        assert_eq!(
            diff.deleted_categories,
            BTreeSet::from(["birds".to_string()])
        );
    }

    #[tokio::test]
    async fn diff_sets_partition_the_union() {
        let dir = tempdir().unwrap();
        let (config, assets, reconciler) = fixture(dir.path()).await;
        for name in ["cats", "dogs", "fish"] {
            assets.create_category(name).await.unwrap();
        }
        put_entry(&config, "cats", "feline").await;
        put_entry(&config, "birds", "avian").await;

        let diff = reconciler.diff().await.unwrap();
        assert!(diff.missing_in_config.is_disjoint(&diff.deleted_categories));

        let disk = assets.list_categories().await.unwrap();
        let config_names = config.names().await.unwrap();
        let union: BTreeSet<_> = disk.union(&config_names).cloned().collect();
        let synchronized: BTreeSet<_> = disk.intersection(&config_names).cloned().collect();
        let mut rebuilt = diff.missing_in_config.clone();
        rebuilt.extend(diff.deleted_categories.clone());
        rebuilt.extend(synchronized);
        assert_eq!(rebuilt, union);
    }

    #[tokio::test]
    async fn sync_config_adopts_disk_categories_and_is_idempotent() {
        let dir = tempdir().unwrap();
        let (config, assets, reconciler) = fixture(dir.path()).await;
        assets.create_category("cats").await.unwrap();
        assets.create_category("dogs").await.unwrap();
        put_entry(&config, "cats", "feline").await;
        put_entry(&config, "birds", "avian").await;

        assert_eq!(reconciler.sync_config().await.unwrap(), 1);
        let entry = config.get("dogs").await.unwrap().unwrap();
        assert_eq!(entry.description, PLACEHOLDER_DESCRIPTION);
        // Existing descriptions survive, and the deleted side is untouched.
        assert_eq!(
            config.get("cats").await.unwrap().unwrap().description,
            "feline"
        );
        let diff = reconciler.diff().await.unwrap();
        assert!(diff.missing_in_config.is_empty());
        assert_eq!(
            diff.deleted_categories,
            BTreeSet::from(["birds".to_string()])
        );

        assert_eq!(reconciler.sync_config().await.unwrap(), 0);
        assert!(
            reconciler
                .diff()
                .await
                .unwrap()
                .missing_in_config
                .is_empty()
        );
    }

    #[tokio::test]
    async fn restore_category_recreates_directory_and_keeps_description() {
        let dir = tempdir().unwrap();
        let (config, assets, reconciler) = fixture(dir.path()).await;
        put_entry(&config, "birds", "avian").await;

        let entry = reconciler
            .restore_category("birds", "fallback")
            .await
            .unwrap();
        assert_eq!(entry.description, "avian");
        assert!(assets.category_exists("birds").await);
        assert!(reconciler.diff().await.unwrap().is_clean());
    }

    #[tokio::test]
    async fn restore_category_rejects_stale_requests() {
        let dir = tempdir().unwrap();
        let (config, assets, reconciler) = fixture(dir.path()).await;
        assets.create_category("cats").await.unwrap();
        put_entry(&config, "cats", "feline").await;

        assert!(matches!(
            reconciler.restore_category("cats", "fallback").await,
            Err(ReconcileError::NotDeleted(_))
        ));
    }

    #[tokio::test]
    async fn remove_from_config_clears_deleted_entry() {
        let dir = tempdir().unwrap();
        let (config, _assets, reconciler) = fixture(dir.path()).await;
        put_entry(&config, "birds", "avian").await;

        reconciler.remove_from_config("birds").await.unwrap();
        assert!(config.get("birds").await.unwrap().is_none());
        assert!(reconciler.diff().await.unwrap().is_clean());
    }

    #[tokio::test]
    async fn remove_from_config_aborts_when_directory_reappears() {
        let dir = tempdir().unwrap();
        let (config, assets, reconciler) = fixture(dir.path()).await;
        put_entry(&config, "birds", "avian").await;
        assets.create_category("birds").await.unwrap();

        assert!(matches!(
            reconciler.remove_from_config("birds").await,
            Err(ReconcileError::Reappeared(_))
        ));
        assert!(config.get("birds").await.unwrap().is_some());
    }
}
