use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Mutex;

use crate::store::asset_store::{AssetError, AssetStore};
use crate::store::config_store::{ConfigEntry, ConfigError, ConfigStore};

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("category not found: {0}")]
    NotFound(String),
    #[error("category name already taken: {0}")]
    Conflict(String),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Asset(#[from] AssetError),
}

/// Category create/rename/delete/restore against both stores.
///
/// Operations serialize behind one lock; concurrent operators get
/// last-committed-write-wins. Rename is the only operation that needs a
/// rollback: a half-renamed category would otherwise be resolvable under
/// neither name.
pub struct CategoryLifecycle {
    config: Arc<ConfigStore>,
    assets: Arc<AssetStore>,
    op_lock: Mutex<()>,
}

impl CategoryLifecycle {
    pub fn new(config: Arc<ConfigStore>, assets: Arc<AssetStore>) -> Self {
        Self {
            config,
            assets,
            op_lock: Mutex::new(()),
        }
    }

    pub async fn create(&self, name: &str, description: &str) -> Result<ConfigEntry, LifecycleError> {
        let _guard = self.op_lock.lock().await;
        self.create_locked(name, description).await
    }

    pub async fn rename(&self, old: &str, new: &str) -> Result<(), LifecycleError> {
        let _guard = self.op_lock.lock().await;
        if self.config.get(old).await?.is_none() {
            return Err(LifecycleError::NotFound(old.to_string()));
        }
        if self.config.get(new).await?.is_some() || self.assets.category_exists(new).await {
            return Err(LifecycleError::Conflict(new.to_string()));
        }

        self.config.rename(old, new).await?;
        if self.assets.category_exists(old).await
            && let Err(err) = self.assets.rename_category(old, new).await
        {
            // Put the config entry back under the old name so the category
            // stays resolvable while the directory is untouched.
            self.config.rename(new, old).await?;
            return Err(err.into());
        }
        Ok(())
    }

    pub async fn delete(&self, name: &str) -> Result<(), LifecycleError> {
        let _guard = self.op_lock.lock().await;
        match self.assets.delete_category(name).await {
            Ok(()) => {}
            Err(AssetError::CategoryNotFound(_)) => {
                return Err(LifecycleError::NotFound(name.to_string()));
            }
            Err(err) => return Err(err.into()),
        }
        if self.config.get(name).await?.is_some() {
            self.config.delete(name).await?;
        }
        Ok(())
    }

    /// Restores a config-only category by recreating its directory, or
    /// creates the category outright when neither store knows the name.
    pub async fn restore(
        &self,
        name: &str,
        description: &str,
    ) -> Result<ConfigEntry, LifecycleError> {
        let _guard = self.op_lock.lock().await;
        if self.assets.category_exists(name).await {
            return Err(LifecycleError::Conflict(name.to_string()));
        }
        match self.config.get(name).await? {
            Some(entry) => {
                self.assets.create_category(name).await?;
                Ok(entry)
            }
            None => self.create_locked(name, description).await,
        }
    }

    pub async fn update_description(
        &self,
        name: &str,
        description: &str,
    ) -> Result<ConfigEntry, LifecycleError> {
        let entry = ConfigEntry {
            name: name.to_string(),
            description: description.to_string(),
        };
        self.config.put(&entry).await?;
        Ok(entry)
    }

    async fn create_locked(
        &self,
        name: &str,
        description: &str,
    ) -> Result<ConfigEntry, LifecycleError> {
        if self.config.get(name).await?.is_some() || self.assets.category_exists(name).await {
            return Err(LifecycleError::Conflict(name.to_string()));
        }
        let entry = ConfigEntry {
            name: name.to_string(),
            description: description.to_string(),
        };
        self.config.put(&entry).await?;
        self.assets.create_category(name).await?;
        Ok(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::reconciler::Reconciler;
    use tempfile::tempdir;

    struct Fixture {
        config: Arc<ConfigStore>,
        assets: Arc<AssetStore>,
        lifecycle: CategoryLifecycle,
        reconciler: Reconciler,
    }

    async fn fixture(dir: &std::path::Path) -> Fixture {
        let config = Arc::new(ConfigStore::new(dir.join("emoji_data.json")));
        let assets = Arc::new(AssetStore::new(dir.join("emoji")));
        assets.init().await.unwrap();
        Fixture {
            lifecycle: CategoryLifecycle::new(Arc::clone(&config), Arc::clone(&assets)),
            reconciler: Reconciler::new(Arc::clone(&config), Arc::clone(&assets)),
            config,
            assets,
        }
    }

    #[tokio::test]
    async fn create_writes_both_stores() {
        let dir = tempdir().unwrap();
        let fx = fixture(dir.path()).await;

        let entry = fx.lifecycle.create("cats", "feline").await.unwrap();
        assert_eq!(entry.description, "feline");
        assert!(fx.assets.category_exists("cats").await);
        assert!(fx.config.get("cats").await.unwrap().is_some());
        assert!(fx.reconciler.diff().await.unwrap().is_clean());
    }

    #[tokio::test]
    async fn create_conflicts_when_either_store_knows_the_name() {
        let dir = tempdir().unwrap();
        let fx = fixture(dir.path()).await;
        fx.assets.create_category("cats").await.unwrap();

        assert!(matches!(
            fx.lifecycle.create("cats", "feline").await,
            Err(LifecycleError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn create_then_delete_leaves_no_residue() {
        let dir = tempdir().unwrap();
        let fx = fixture(dir.path()).await;
        fx.lifecycle.create("cats", "feline").await.unwrap();
        fx.assets.put_asset("cats", "a.png", b"img").await.unwrap();

        fx.lifecycle.delete("cats").await.unwrap();
        assert!(!fx.assets.category_exists("cats").await);
        assert!(fx.config.get("cats").await.unwrap().is_none());
        assert!(fx.reconciler.diff().await.unwrap().is_clean());
    }

    #[tokio::test]
    async fn delete_requires_a_directory() {
        let dir = tempdir().unwrap();
        let fx = fixture(dir.path()).await;
        assert!(matches!(
            fx.lifecycle.delete("cats").await,
            Err(LifecycleError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn rename_moves_directory_and_description() {
        let dir = tempdir().unwrap();
        let fx = fixture(dir.path()).await;
        fx.lifecycle.create("cats", "feline").await.unwrap();
        fx.assets.put_asset("cats", "a.png", b"img").await.unwrap();

        fx.lifecycle.rename("cats", "felines").await.unwrap();
        assert_eq!(
            fx.config.get("felines").await.unwrap().unwrap().description,
            "feline"
        );
        assert_eq!(fx.assets.list_assets("felines").await.unwrap(), vec!["a.png"]);
        assert!(fx.reconciler.diff().await.unwrap().is_clean());
    }

    #[tokio::test]
    async fn rename_of_config_only_category_skips_the_directory() {
        let dir = tempdir().unwrap();
        let fx = fixture(dir.path()).await;
        fx.config
            .put(&ConfigEntry {
                name: "birds".into(),
                description: "avian".into(),
            })
            .await
            .unwrap();

        fx.lifecycle.rename("birds", "avians").await.unwrap();
        assert!(fx.config.get("avians").await.unwrap().is_some());
        assert!(!fx.assets.category_exists("avians").await);
    }

    #[tokio::test]
    async fn rename_checks_preconditions() {
        let dir = tempdir().unwrap();
        let fx = fixture(dir.path()).await;
        fx.lifecycle.create("cats", "feline").await.unwrap();
        fx.lifecycle.create("dogs", "canine").await.unwrap();

        assert!(matches!(
            fx.lifecycle.rename("birds", "avians").await,
            Err(LifecycleError::NotFound(_))
        ));
        assert!(matches!(
            fx.lifecycle.rename("cats", "dogs").await,
            Err(LifecycleError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn failed_directory_rename_rolls_back_the_config() {
        let dir = tempdir().unwrap();
        let fx = fixture(dir.path()).await;
        fx.lifecycle.create("cats", "feline").await.unwrap();
        // A plain file at the target passes the directory prechecks but
        // makes the rename syscall itself fail.
        std::fs::write(dir.path().join("emoji/felines"), b"occupied").unwrap();

        let err = fx
            .lifecycle
            .rename("cats", "felines")
            .await
            .expect_err("expected rename to fail");
        assert!(matches!(err, LifecycleError::Asset(_)));

        // The category is still resolvable under the old name only.
        assert_eq!(
            fx.config.get("cats").await.unwrap().unwrap().description,
            "feline"
        );
        assert!(fx.config.get("felines").await.unwrap().is_none());
        assert!(fx.assets.category_exists("cats").await);
        assert!(fx.reconciler.diff().await.unwrap().is_clean());
    }

    #[tokio::test]
    async fn restore_recreates_directory_for_config_entry() {
        let dir = tempdir().unwrap();
        let fx = fixture(dir.path()).await;
        fx.config
            .put(&ConfigEntry {
                name: "birds".into(),
                description: "avian".into(),
            })
            .await
            .unwrap();

        let entry = fx.lifecycle.restore("birds", "ignored").await.unwrap();
        assert_eq!(entry.description, "avian");
        assert!(fx.assets.category_exists("birds").await);
    }

    #[tokio::test]
    async fn restore_of_unknown_name_behaves_like_create() {
        let dir = tempdir().unwrap();
        let fx = fixture(dir.path()).await;

        let entry = fx.lifecycle.restore("cats", "feline").await.unwrap();
        assert_eq!(entry.description, "feline");
        assert!(fx.assets.category_exists("cats").await);
        assert!(fx.config.get("cats").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn restore_conflicts_when_directory_exists() {
        let dir = tempdir().unwrap();
        let fx = fixture(dir.path()).await;
        fx.lifecycle.create("cats", "feline").await.unwrap();

        assert!(matches!(
            fx.lifecycle.restore("cats", "feline").await,
            Err(LifecycleError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn update_description_upserts() {
        let dir = tempdir().unwrap();
        let fx = fixture(dir.path()).await;

        fx.lifecycle.update_description("cats", "feline").await.unwrap();
        fx.lifecycle.update_description("cats", "a feline").await.unwrap();
        assert_eq!(
            fx.config.get("cats").await.unwrap().unwrap().description,
            "a feline"
        );
    }
}
