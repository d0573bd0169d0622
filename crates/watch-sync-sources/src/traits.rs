use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use watch_sync_models::{
    HistoryBatch, HistoryPage, HistoryQuery, IdMap, IdType, ItemKind, ItemTimestamp, LibraryItem,
    Link, LinkKey, Meta, MetaKind, SyncState,
};
use crate::error::SourceError;

/// A library account on the media-library service
#[async_trait]
pub trait LibraryClient: Send + Sync {
    /// Fetch library items. An empty `ids` slice lists the whole library.
    async fn list_items(&self, ids: &[String]) -> Result<Vec<LibraryItem>, SourceError>;

    /// Ids of items modified strictly after `watermark`
    async fn list_modified_since(&self, watermark: DateTime<Utc>) -> Result<Vec<ItemTimestamp>, SourceError>;

    /// Upsert a batch of items in one call
    async fn update_items(&self, items: &[LibraryItem]) -> Result<(), SourceError>;
}

/// An account on the chronological history service
#[async_trait]
pub trait HistoryClient: Send + Sync {
    /// One page of watch history. Entries without an IMDB id are dropped
    /// but still counted in [`HistoryPage::raw_count`].
    async fn get_history(&self, query: &HistoryQuery) -> Result<HistoryPage, SourceError>;

    async fn add_history(&self, batch: &HistoryBatch) -> Result<(), SourceError>;

    /// Resolve a foreign id to the service's own numeric id.
    /// `Ok(None)` means the service does not know the item.
    async fn lookup_id(&self, id_type: IdType, id: &str, kind: ItemKind) -> Result<Option<u64>, SourceError>;
}

/// Catalog metadata (episode listings) for movies and series
#[async_trait]
pub trait MetadataProvider: Send + Sync {
    async fn fetch_meta(&self, kind: MetaKind, content_id: &str) -> Result<Meta, SourceError>;
}

/// Persistent cache of content id -> external id mappings
#[async_trait]
pub trait IdMapStore: Send + Sync {
    /// Known mappings keyed by content id; unknown ids are simply absent
    async fn get_id_maps(&self, content_ids: &[String]) -> anyhow::Result<HashMap<String, IdMap>>;

    async fn set_id_maps(&self, maps: &[IdMap], anchor: IdType) -> anyhow::Result<()>;
}

/// Persistence of links and their sync progress
#[async_trait]
pub trait LinkStore<D>: Send + Sync {
    async fn get_all_links(&self) -> anyhow::Result<Vec<Link<D>>>;

    async fn set_sync_state(&self, key: &LinkKey, state: &SyncState) -> anyhow::Result<()>;
}

/// Resolves account ids to authenticated clients.
///
/// Failures here (missing account, expired credential) abort only the link
/// being processed.
#[async_trait]
pub trait ClientProvider: Send + Sync {
    async fn library_client(&self, account_id: &str) -> Result<Arc<dyn LibraryClient>, SourceError>;

    async fn history_client(&self, account_id: &str) -> Result<Arc<dyn HistoryClient>, SourceError>;
}
