use std::collections::{BTreeMap, BTreeSet};
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use super::AssetId;
use super::paths::{self, NameError};

/// Directory entries with any other extension are not assets and are never
/// listed, transferred, or deleted.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp"];

const UNIQUE_NAME_ATTEMPTS: u32 = 1000;

#[derive(Debug, Error)]
pub enum AssetError {
    #[error("category not found: {0}")]
    CategoryNotFound(String),
    #[error("asset not found: {category}/{filename}")]
    AssetNotFound { category: String, filename: String },
    #[error("name already taken: {0}")]
    Conflict(String),
    #[error("invalid name: {0}")]
    Name(#[from] NameError),
    #[error("unsupported image format: {0}")]
    UnsupportedFormat(String),
    #[error("empty upload payload")]
    EmptyPayload,
    #[error("storage I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Filesystem view of category directories and the image files inside them.
///
/// The directory tree is the source of truth for what is actually present;
/// it is re-read on every query so manual edits are picked up. Directory
/// mutations serialize behind one lock, and asset writes reserve the target
/// file exclusively, so concurrent callers cannot clobber each other.
pub struct AssetStore {
    root: PathBuf,
    mutate_lock: Mutex<()>,
}

impl AssetStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            mutate_lock: Mutex::new(()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub async fn init(&self) -> Result<(), AssetError> {
        tokio::fs::create_dir_all(&self.root).await?;
        Ok(())
    }

    pub async fn list_categories(&self) -> Result<BTreeSet<String>, AssetError> {
        let mut categories = BTreeSet::new();
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(categories),
            Err(err) => return Err(err.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir()
                && let Ok(name) = entry.file_name().into_string()
            {
                categories.insert(name);
            }
        }
        Ok(categories)
    }

    pub async fn list_assets(&self, category: &str) -> Result<Vec<String>, AssetError> {
        let dir = paths::category_path(&self.root, category)?;
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(AssetError::CategoryNotFound(category.to_string()));
            }
            Err(err) => return Err(err.into()),
        };
        let mut assets = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file()
                && let Ok(name) = entry.file_name().into_string()
                && is_image_name(&name)
            {
                assets.push(name);
            }
        }
        assets.sort();
        Ok(assets)
    }

    pub async fn inventory(&self) -> Result<BTreeMap<String, Vec<String>>, AssetError> {
        let mut inventory = BTreeMap::new();
        for category in self.list_categories().await? {
            let assets = self.list_assets(&category).await?;
            inventory.insert(category, assets);
        }
        Ok(inventory)
    }

    pub async fn scan(&self) -> Result<BTreeSet<AssetId>, AssetError> {
        let mut ids = BTreeSet::new();
        for (category, assets) in self.inventory().await? {
            for filename in assets {
                ids.insert(AssetId::new(category.clone(), filename));
            }
        }
        Ok(ids)
    }

    pub async fn category_exists(&self, category: &str) -> bool {
        let Ok(dir) = paths::category_path(&self.root, category) else {
            return false;
        };
        tokio::fs::metadata(&dir)
            .await
            .map(|meta| meta.is_dir())
            .unwrap_or(false)
    }

    pub async fn asset_exists(&self, category: &str, filename: &str) -> bool {
        let Ok(path) = paths::asset_path(&self.root, category, filename) else {
            return false;
        };
        tokio::fs::metadata(&path)
            .await
            .map(|meta| meta.is_file())
            .unwrap_or(false)
    }

    pub fn asset_path(&self, id: &AssetId) -> Result<PathBuf, AssetError> {
        Ok(paths::asset_path(&self.root, &id.category, &id.filename)?)
    }

    /// Stores new asset bytes. Overwrite is never allowed; an existing file
    /// under the same name is a conflict.
    pub async fn put_asset(
        &self,
        category: &str,
        filename: &str,
        bytes: &[u8],
    ) -> Result<(), AssetError> {
        let path = paths::asset_path(&self.root, category, filename)?;
        if bytes.is_empty() {
            return Err(AssetError::EmptyPayload);
        }
        if !is_image_name(filename) {
            return Err(AssetError::UnsupportedFormat(filename.to_string()));
        }
        let _guard = self.mutate_lock.lock().await;
        tokio::fs::create_dir_all(paths::category_path(&self.root, category)?).await?;
        let mut file = match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                return Err(AssetError::Conflict(format!("{category}/{filename}")));
            }
            Err(err) => return Err(err.into()),
        };
        file.write_all(bytes).await?;
        file.sync_all().await?;
        Ok(())
    }

    /// Like `put_asset`, but derives a non-colliding filename (`name-1.ext`,
    /// `name-2.ext`, ...) and returns the name the bytes landed under.
    pub async fn put_asset_unique(
        &self,
        category: &str,
        filename: &str,
        bytes: &[u8],
    ) -> Result<String, AssetError> {
        for attempt in 0..UNIQUE_NAME_ATTEMPTS {
            let candidate = candidate_name(filename, attempt);
            match self.put_asset(category, &candidate, bytes).await {
                Ok(()) => return Ok(candidate),
                Err(AssetError::Conflict(_)) => continue,
                Err(err) => return Err(err),
            }
        }
        Err(AssetError::Conflict(format!("{category}/{filename}")))
    }

    pub async fn delete_asset(&self, category: &str, filename: &str) -> Result<(), AssetError> {
        let path = paths::asset_path(&self.root, category, filename)?;
        let _guard = self.mutate_lock.lock().await;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Err(AssetError::AssetNotFound {
                category: category.to_string(),
                filename: filename.to_string(),
            }),
            Err(err) => Err(err.into()),
        }
    }

    pub async fn create_category(&self, category: &str) -> Result<(), AssetError> {
        let dir = paths::category_path(&self.root, category)?;
        let _guard = self.mutate_lock.lock().await;
        tokio::fs::create_dir_all(&dir).await?;
        Ok(())
    }

    pub async fn delete_category(&self, category: &str) -> Result<(), AssetError> {
        let dir = paths::category_path(&self.root, category)?;
        let _guard = self.mutate_lock.lock().await;
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                Err(AssetError::CategoryNotFound(category.to_string()))
            }
            Err(err) => Err(err.into()),
        }
    }

    pub async fn rename_category(&self, old: &str, new: &str) -> Result<(), AssetError> {
        let old_dir = paths::category_path(&self.root, old)?;
        let new_dir = paths::category_path(&self.root, new)?;
        let _guard = self.mutate_lock.lock().await;
        let old_meta = match tokio::fs::metadata(&old_dir).await {
            Ok(meta) => meta,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(AssetError::CategoryNotFound(old.to_string()));
            }
            Err(err) => return Err(err.into()),
        };
        if !old_meta.is_dir() {
            return Err(AssetError::CategoryNotFound(old.to_string()));
        }
        // Only directories count as categories; anything else occupying the
        // target surfaces through the rename syscall itself.
        if tokio::fs::metadata(&new_dir)
            .await
            .map(|meta| meta.is_dir())
            .unwrap_or(false)
        {
            return Err(AssetError::Conflict(new.to_string()));
        }
        tokio::fs::rename(&old_dir, &new_dir).await?;
        Ok(())
    }
}

fn is_image_name(filename: &str) -> bool {
    filename
        .rsplit_once('.')
        .is_some_and(|(stem, ext)| {
            !stem.is_empty() && SUPPORTED_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str())
        })
}

fn candidate_name(filename: &str, attempt: u32) -> String {
    if attempt == 0 {
        return filename.to_string();
    }
    match filename.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => format!("{stem}-{attempt}.{ext}"),
        _ => format!("{filename}-{attempt}"),
    }
}
