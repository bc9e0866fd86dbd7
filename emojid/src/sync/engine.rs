use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use stardots_core::{StardotsClient, StardotsError, decode_remote_name, encode_remote_name, mime_type_for};
use thiserror::Error;

use crate::store::AssetId;
use crate::store::asset_store::{AssetError, AssetStore};

use super::backoff::Backoff;
use super::job::{AlreadyRunning, Direction, JobPoll, JobTracker};
use super::transfer::{TransferClient, TransferError};

/// Attempts per item before it counts as failed for the job.
const TRANSFER_ATTEMPTS: u32 = 3;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    AlreadyRunning(#[from] AlreadyRunning),
    #[error("image host error: {0}")]
    Api(#[from] StardotsError),
    #[error(transparent)]
    Transfer(#[from] TransferError),
    #[error(transparent)]
    Asset(#[from] AssetError),
    #[error("local asset I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Local-vs-remote inventory difference over asset identities.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RemoteDelta {
    pub to_upload: BTreeSet<AssetId>,
    pub to_download: BTreeSet<AssetId>,
}

struct Inventory {
    local: BTreeSet<AssetId>,
    // Remote names are kept verbatim; re-encoding a decoded id does not
    // always reproduce the name the host actually stores.
    remote: BTreeMap<AssetId, String>,
}

enum PlannedTransfer {
    Upload(AssetId),
    Download(AssetId, String),
}

impl PlannedTransfer {
    fn id(&self) -> &AssetId {
        match self {
            PlannedTransfer::Upload(id) => id,
            PlannedTransfer::Download(id, _) => id,
        }
    }
}

/// Mirrors the asset tree to/from the remote image host with at most one
/// in-flight job per direction and non-blocking, pollable progress.
pub struct RemoteSyncEngine {
    client: StardotsClient,
    assets: Arc<AssetStore>,
    transfer: TransferClient,
    jobs: JobTracker,
    backoff: Backoff,
}

impl RemoteSyncEngine {
    pub fn new(client: StardotsClient, assets: Arc<AssetStore>) -> Self {
        Self {
            client,
            assets,
            transfer: TransferClient::new(),
            jobs: JobTracker::default(),
            backoff: Backoff::new(Duration::from_millis(500), Duration::from_secs(5), true),
        }
    }

    pub fn with_transfer(mut self, transfer: TransferClient) -> Self {
        self.transfer = transfer;
        self
    }

    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Read-only inventory diff; recomputed on every call, so after a
    /// partially failed job it reflects exactly the remaining delta.
    pub async fn status(&self) -> Result<RemoteDelta, EngineError> {
        let inventory = self.inventories().await?;
        Ok(RemoteDelta {
            to_upload: inventory
                .local
                .iter()
                .filter(|id| !inventory.remote.contains_key(*id))
                .cloned()
                .collect(),
            to_download: inventory
                .remote
                .keys()
                .filter(|id| !inventory.local.contains(*id))
                .cloned()
                .collect(),
        })
    }

    /// Accepts or rejects the job synchronously; the transfer itself runs as
    /// a background task and is observed through `poll`.
    pub fn start(self: Arc<Self>, direction: Direction) -> Result<(), EngineError> {
        self.jobs.slot(direction).try_start(direction)?;
        let engine = Arc::clone(&self);
        tokio::spawn(async move {
            let success = match engine.run_job(direction).await {
                Ok(failed) => failed == 0,
                Err(err) => {
                    eprintln!("[emojid] {direction} sync aborted: {err}");
                    false
                }
            };
            engine.jobs.slot(direction).finish(success);
        });
        Ok(())
    }

    pub fn poll(&self, direction: Direction) -> JobPoll {
        self.jobs.slot(direction).poll()
    }

    async fn run_job(&self, direction: Direction) -> Result<usize, EngineError> {
        let inventory = self.inventories().await?;
        let plan: Vec<PlannedTransfer> = match direction {
            Direction::Upload => inventory
                .local
                .iter()
                .filter(|id| !inventory.remote.contains_key(*id))
                .cloned()
                .map(PlannedTransfer::Upload)
                .collect(),
            Direction::Download => inventory
                .remote
                .iter()
                .filter(|(id, _)| !inventory.local.contains(id))
                .map(|(id, name)| PlannedTransfer::Download(id.clone(), name.clone()))
                .collect(),
        };
        eprintln!("[emojid] {direction} sync: {} asset(s) pending", plan.len());

        let mut failed = 0usize;
        for item in &plan {
            if !self.transfer_with_retry(direction, item).await {
                failed += 1;
            }
        }
        if failed > 0 {
            eprintln!(
                "[emojid] {direction} sync: {failed} of {} asset(s) failed",
                plan.len()
            );
        }
        Ok(failed)
    }

    async fn transfer_with_retry(&self, direction: Direction, item: &PlannedTransfer) -> bool {
        for attempt in 0..TRANSFER_ATTEMPTS {
            match self.transfer_item(item).await {
                Ok(()) => return true,
                Err(err) => {
                    eprintln!(
                        "[emojid] {direction} of {} failed (attempt {}/{TRANSFER_ATTEMPTS}): {err}",
                        item.id(),
                        attempt + 1
                    );
                    if attempt + 1 < TRANSFER_ATTEMPTS {
                        // The host rejects stale signatures; refresh the
                        // clock offset before signing the retry.
                        let _ = self.client.sync_clock().await;
                        tokio::time::sleep(self.backoff.delay(attempt)).await;
                    }
                }
            }
        }
        false
    }

    async fn transfer_item(&self, item: &PlannedTransfer) -> Result<(), EngineError> {
        match item {
            PlannedTransfer::Upload(id) => {
                let path = self.assets.asset_path(id)?;
                let bytes = tokio::fs::read(&path).await?;
                let remote_name = encode_remote_name(&id.category, &id.filename);
                self.client
                    .upload(&remote_name, bytes, mime_type_for(&id.filename))
                    .await?;
            }
            PlannedTransfer::Download(id, remote_name) => {
                let url = self.client.ticketed_download_url(remote_name).await?;
                let target = self.assets.asset_path(id)?;
                self.transfer.download_to_path(url, &target).await?;
            }
        }
        Ok(())
    }

    async fn inventories(&self) -> Result<Inventory, EngineError> {
        let local = self.assets.scan().await?;
        let mut remote = BTreeMap::new();
        for file in self.client.list_files().await? {
            let (category, filename) = decode_remote_name(&file.name);
            remote.insert(AssetId::new(category, filename), file.name);
        }
        Ok(Inventory { local, remote })
    }
}
