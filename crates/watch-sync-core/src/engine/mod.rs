//! Reconciliation of watched state across linked accounts.
//!
//! Both engines follow the same pass: pick full or incremental mode from the
//! link's watermark, fetch both sides once, stage updates with the pure
//! functions in [`merge`], write each direction back in one batch and advance
//! the watermark only when every executed direction succeeded.

pub mod account;
pub mod history;
pub mod merge;

pub use account::AccountSyncEngine;
pub use history::HistorySyncEngine;

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};
use watch_sync_config::SyncOptions;
use watch_sync_models::{
    HistoryBatch, HistoryEntry, HistoryPage, HistoryQuery, ItemTimestamp, LibraryItem, Link, Meta, MetaKind, SyncState,
};
use watch_sync_sources::{HistoryClient, LibraryClient, LinkStore, SourceError};
use crate::meta_cache::MetaCache;
use crate::retry::with_rate_limit_retry;

#[derive(Debug, Error)]
pub enum SyncError {
    /// The link cannot be processed at all (missing account, bad credential)
    #[error("link aborted: {0}")]
    Link(String),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    Full,
    Incremental,
}

impl SyncMode {
    pub fn for_state(state: &SyncState) -> Self {
        if state.last_synced_at.is_some() {
            SyncMode::Incremental
        } else {
            SyncMode::Full
        }
    }

    pub fn is_incremental(&self) -> bool {
        *self == SyncMode::Incremental
    }
}

#[derive(Debug, Clone, Copy)]
pub struct EngineSettings {
    pub history_page_limit: u32,
    pub max_rate_limit_retries: u32,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            history_page_limit: 100,
            max_rate_limit_retries: 10,
        }
    }
}

impl From<&SyncOptions> for EngineSettings {
    fn from(options: &SyncOptions) -> Self {
        Self {
            history_page_limit: options.history_page_limit,
            max_rate_limit_retries: options.max_rate_limit_retries,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DirectionReport {
    pub name: &'static str,
    pub staged: usize,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LinkReport {
    pub link: String,
    pub mode: SyncMode,
    pub directions: Vec<DirectionReport>,
    pub committed: bool,
}

impl LinkReport {
    pub fn new(link: String, mode: SyncMode) -> Self {
        Self {
            link,
            mode,
            directions: Vec::new(),
            committed: false,
        }
    }

    /// Record the outcome of one direction, returning whether it succeeded
    fn record(&mut self, name: &'static str, result: Result<usize, SyncError>) -> bool {
        match result {
            Ok(staged) => {
                debug!(link = %self.link, direction = name, staged = staged, "Direction finished");
                self.directions.push(DirectionReport {
                    name,
                    staged,
                    error: None,
                });
                true
            }
            Err(e) => {
                warn!(link = %self.link, direction = name, error = %e, "Direction failed");
                self.directions.push(DirectionReport {
                    name,
                    staged: 0,
                    error: Some(e.to_string()),
                });
                false
            }
        }
    }

    pub fn staged(&self) -> usize {
        self.directions.iter().map(|d| d.staged).sum()
    }

    pub fn has_errors(&self) -> bool {
        self.directions.iter().any(|d| d.error.is_some())
    }
}

/// Result of one pass over every link of an engine
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncSummary {
    pub processed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub reports: Vec<LinkReport>,
    pub errors: Vec<String>,
}

impl SyncSummary {
    fn link_failed(&mut self, link: String, error: &SyncError) {
        warn!(link = %link, error = %error, "Link sync failed");
        self.failed += 1;
        self.errors.push(format!("{}: {}", link, error));
    }
}

/// Advance the watermark to `pass_start` unless it is already later
async fn commit<D>(store: &dyn LinkStore<D>, link: &Link<D>, pass_start: DateTime<Utc>) -> Result<bool, SyncError> {
    if link.sync_state.last_synced_at.is_some_and(|t| t >= pass_start) {
        return Ok(false);
    }
    let state = SyncState {
        last_synced_at: Some(pass_start),
    };
    store.set_sync_state(&link.key(), &state).await?;
    Ok(true)
}

/// Map a client resolution failure to a link-fatal error
fn link_error(side: &str, account_id: &str, error: SourceError) -> SyncError {
    SyncError::Link(format!("{} account {}: {}", side, account_id, error))
}

async fn list_items(client: &dyn LibraryClient, ids: &[String], retries: u32) -> Result<Vec<LibraryItem>, SourceError> {
    with_rate_limit_retry("list_items", retries, move || client.list_items(ids)).await
}

async fn list_modified_since(
    client: &dyn LibraryClient,
    watermark: DateTime<Utc>,
    retries: u32,
) -> Result<Vec<ItemTimestamp>, SourceError> {
    with_rate_limit_retry("list_modified_since", retries, move || client.list_modified_since(watermark)).await
}

/// One batched write; nothing is sent when nothing was staged
async fn update_items(client: &dyn LibraryClient, items: &[LibraryItem], retries: u32) -> Result<usize, SyncError> {
    if items.is_empty() {
        return Ok(0);
    }
    with_rate_limit_retry("update_items", retries, move || client.update_items(items)).await?;
    Ok(items.len())
}

async fn get_history(client: &dyn HistoryClient, query: &HistoryQuery, retries: u32) -> Result<HistoryPage, SourceError> {
    with_rate_limit_retry("get_history", retries, move || client.get_history(query)).await
}

/// Walk pages built by `query_for(page)` until the service sends a short page
async fn get_all_history(
    client: &dyn HistoryClient,
    limit: u32,
    retries: u32,
    query_for: impl Fn(u32) -> HistoryQuery,
) -> Result<Vec<HistoryEntry>, SourceError> {
    let mut entries = Vec::new();
    let mut page = 1;
    loop {
        let batch = get_history(client, &query_for(page), retries).await?;
        let last = batch.is_last(limit);
        entries.extend(batch.entries);
        if last {
            return Ok(entries);
        }
        page += 1;
    }
}

async fn add_history(client: &dyn HistoryClient, batch: &HistoryBatch, retries: u32) -> Result<(), SourceError> {
    with_rate_limit_retry("add_history", retries, move || client.add_history(batch)).await
}

/// Fetch metadata for each id, skipping ids whose metadata is unavailable
async fn fetch_metas<'a>(
    cache: &MetaCache,
    kind: MetaKind,
    ids: impl IntoIterator<Item = &'a str>,
    retries: u32,
) -> HashMap<String, Arc<Meta>> {
    let mut metas = HashMap::new();
    for id in ids {
        if metas.contains_key(id) {
            continue;
        }
        match with_rate_limit_retry("fetch_meta", retries, move || cache.fetch_meta(kind, id)).await {
            Ok(meta) => {
                metas.insert(id.to_string(), meta);
            }
            Err(e) => warn!(content_id = id, kind = kind.as_str(), error = %e, "Metadata unavailable, skipping item"),
        }
    }
    metas
}

#[cfg(test)]
pub(crate) mod fakes;
