use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use stardots_core::StardotsClient;

use crate::coordinator::SyncCoordinator;
use crate::store::asset_store::AssetStore;
use crate::store::config_store::ConfigStore;
use crate::sync::engine::RemoteSyncEngine;

const ASSET_DIR_NAME: &str = "emoji";
const CONFIG_FILE_NAME: &str = "emoji_data.json";
const DEFAULT_SPACE: &str = "memes";
const DEFAULT_STATUS_INTERVAL_SECS: u64 = 60;

#[derive(Clone, Debug)]
pub struct StardotsConfig {
    pub key: String,
    pub secret: String,
    pub space: String,
}

#[derive(Clone, Debug)]
pub struct DaemonConfig {
    pub data_root: PathBuf,
    pub status_interval: Duration,
    pub stardots: Option<StardotsConfig>,
}

impl DaemonConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let data_root = match std::env::var("EMOJID_DATA_DIR") {
            Ok(value) => PathBuf::from(value),
            Err(_) => dirs::data_local_dir()
                .context("local data directory is unavailable")?
                .join("emojid"),
        };
        let status_interval = Duration::from_secs(read_u64_env(
            "EMOJID_STATUS_INTERVAL_SECS",
            DEFAULT_STATUS_INTERVAL_SECS,
        ));
        let stardots = match (
            std::env::var("EMOJID_STARDOTS_KEY"),
            std::env::var("EMOJID_STARDOTS_SECRET"),
        ) {
            (Ok(key), Ok(secret)) => Some(StardotsConfig {
                key,
                secret,
                space: std::env::var("EMOJID_STARDOTS_SPACE")
                    .unwrap_or_else(|_| DEFAULT_SPACE.to_string()),
            }),
            _ => None,
        };

        Ok(Self {
            data_root,
            status_interval,
            stardots,
        })
    }
}

pub struct DaemonRuntime {
    config: DaemonConfig,
    coordinator: Arc<SyncCoordinator>,
}

impl DaemonRuntime {
    pub async fn bootstrap(config: DaemonConfig) -> anyhow::Result<Self> {
        let assets = Arc::new(AssetStore::new(config.data_root.join(ASSET_DIR_NAME)));
        assets
            .init()
            .await
            .with_context(|| format!("failed to create asset root under {:?}", config.data_root))?;
        let config_store = Arc::new(ConfigStore::new(config.data_root.join(CONFIG_FILE_NAME)));

        let remote = match &config.stardots {
            Some(stardots) => {
                let client = StardotsClient::new(
                    stardots.key.clone(),
                    stardots.secret.clone(),
                    stardots.space.clone(),
                )?;
                if let Err(err) = client.sync_clock().await {
                    // Skew gets re-learned on the first signed call anyway.
                    eprintln!("[emojid] image host clock sync failed: {err}");
                }
                Some(Arc::new(RemoteSyncEngine::new(client, Arc::clone(&assets))))
            }
            None => None,
        };

        Ok(Self {
            coordinator: Arc::new(SyncCoordinator::new(config_store, assets, remote)),
            config,
        })
    }

    pub fn coordinator(&self) -> Arc<SyncCoordinator> {
        Arc::clone(&self.coordinator)
    }

    pub async fn run(self) -> anyhow::Result<()> {
        eprintln!(
            "[emojid] started: data_root={}, remote={}",
            self.config.data_root.display(),
            if self.config.stardots.is_some() {
                "configured"
            } else {
                "disabled"
            }
        );

        let mut ticker = tokio::time::interval(self.config.status_interval);
        ticker.tick().await;
        loop {
            tokio::select! {
                result = tokio::signal::ctrl_c() => {
                    result.context("failed to listen for shutdown signal")?;
                    break;
                }
                _ = ticker.tick() => {
                    match self.coordinator.sync_status().await {
                        Ok(report) if report.differences.is_clean() => {}
                        Ok(report) => eprintln!(
                            "[emojid] categories out of sync: {} missing in config, {} gone from disk",
                            report.differences.missing_in_config.len(),
                            report.differences.deleted_categories.len()
                        ),
                        Err(err) => eprintln!("[emojid] status check failed: {err}"),
                    }
                }
            }
        }
        eprintln!("[emojid] shutting down");
        Ok(())
    }
}

fn read_u64_env(name: &str, default: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .unwrap_or(default)
}
