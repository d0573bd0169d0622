use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde::{de::DeserializeOwned, Serialize};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::debug;
use watch_sync_config::PathManager;
use watch_sync_models::{AccountDirection, HistoryDirection, Link, LinkKey, SyncState};
use watch_sync_sources::LinkStore;

/// Links of one kind, stored as a JSON array
pub struct JsonLinkStore<D> {
    path: PathBuf,
    write_lock: Mutex<()>,
    _direction: PhantomData<fn() -> D>,
}

impl JsonLinkStore<AccountDirection> {
    pub fn account_links(path_manager: &PathManager) -> Self {
        Self::new(path_manager.account_links_file())
    }
}

impl JsonLinkStore<HistoryDirection> {
    pub fn history_links(path_manager: &PathManager) -> Self {
        Self::new(path_manager.history_links_file())
    }
}

impl<D> JsonLinkStore<D>
where
    D: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            write_lock: Mutex::new(()),
            _direction: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A missing file means no links. A corrupt file is an error and is left
    /// in place.
    async fn load(&self) -> Result<Vec<Link<D>>> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "Link file does not exist");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e).with_context(|| format!("Failed to read {}", self.path.display())),
        };
        serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", self.path.display()))
    }

    async fn save(&self, links: &[Link<D>]) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let json = serde_json::to_string_pretty(links)?;
        let temp_path = self.path.with_extension("tmp");
        tokio::fs::write(&temp_path, json).await?;
        tokio::fs::rename(&temp_path, &self.path).await?;
        Ok(())
    }

    /// Insert or replace a link, keyed by its two account ids
    pub async fn upsert(&self, link: Link<D>) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut links = self.load().await?;
        let key = link.key();
        match links.iter_mut().find(|l| l.key() == key) {
            Some(existing) => *existing = link,
            None => links.push(link),
        }
        self.save(&links).await
    }
}

#[async_trait]
impl<D> LinkStore<D> for JsonLinkStore<D>
where
    D: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    async fn get_all_links(&self) -> Result<Vec<Link<D>>> {
        self.load().await
    }

    async fn set_sync_state(&self, key: &LinkKey, state: &SyncState) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut links = self.load().await?;
        let link = links
            .iter_mut()
            .find(|l| l.side_a_id == key.side_a_id && l.side_b_id == key.side_b_id)
            .ok_or_else(|| anyhow!("Link {} not found", key))?;
        link.sync_state = state.clone();
        link.updated_at = Utc::now();
        self.save(&links).await?;
        debug!(link = %key, "Saved sync state");
        Ok(())
    }
}
