//! In-memory collaborators for engine tests

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use watch_sync_models::{
    EpisodeNumber, HistoryAction, HistoryBatch, HistoryEntry, HistoryItemType, HistoryKind, HistoryPage, HistoryQuery, IdMap, IdType, ItemKind,
    ItemTimestamp, LibraryItem, Link, LinkKey, Meta, MetaKind, MetaVideo, SyncConfig, SyncState,
};
use watch_sync_sources::{
    ClientProvider, HistoryClient, IdMapStore, LibraryClient, LinkStore, MetadataProvider, SourceError,
};

pub fn at(day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, day, 12, 0, 0).unwrap()
}

pub fn movie(id: &str, times_watched: u32) -> LibraryItem {
    let mut item: LibraryItem =
        serde_json::from_value(serde_json::json!({"_id": id, "type": "movie", "name": id})).unwrap();
    item.state.times_watched = times_watched;
    if times_watched > 0 {
        item.state.last_watched = Some(at(1));
    }
    item
}

pub fn series(id: &str, watched: Option<String>) -> LibraryItem {
    let mut item: LibraryItem =
        serde_json::from_value(serde_json::json!({"_id": id, "type": "series", "name": id})).unwrap();
    item.state.watched = watched;
    item
}

pub fn show_meta(id: &str, episodes: u32) -> Meta {
    Meta {
        id: id.to_string(),
        kind: MetaKind::Series,
        name: id.to_string(),
        poster: None,
        poster_shape: None,
        background: None,
        logo: None,
        release_info: None,
        videos: (1..=episodes)
            .map(|e| MetaVideo {
                id: format!("{}:1:{}", id, e),
                season: 1,
                episode: e,
            })
            .collect(),
    }
}

pub fn link<D>(a: &str, b: &str, direction: D, ids: &[&str], last_synced_at: Option<DateTime<Utc>>) -> Link<D> {
    Link {
        side_a_id: a.to_string(),
        side_b_id: b.to_string(),
        sync_config: SyncConfig {
            direction,
            ids: ids.iter().map(|s| s.to_string()).collect(),
        },
        sync_state: SyncState { last_synced_at },
        created_at: at(1),
        updated_at: at(1),
    }
}

#[derive(Default)]
pub struct FakeLibrary {
    pub items: Mutex<Vec<LibraryItem>>,
    pub modified: Mutex<Vec<ItemTimestamp>>,
    pub list_calls: Mutex<Vec<Vec<String>>>,
    pub modified_calls: AtomicUsize,
    pub updates: Mutex<Vec<Vec<LibraryItem>>>,
    pub fail_updates: AtomicBool,
}

impl FakeLibrary {
    pub fn with_items(items: Vec<LibraryItem>) -> Arc<Self> {
        let library = Self::default();
        *library.items.lock().unwrap() = items;
        Arc::new(library)
    }

    pub fn mark_modified(&self, id: &str, modified_at: DateTime<Utc>) {
        self.modified.lock().unwrap().push(ItemTimestamp {
            id: id.to_string(),
            modified_at,
        });
    }

    pub fn updated_items(&self) -> Vec<LibraryItem> {
        self.updates.lock().unwrap().iter().flatten().cloned().collect()
    }
}

#[async_trait]
impl LibraryClient for FakeLibrary {
    async fn list_items(&self, ids: &[String]) -> Result<Vec<LibraryItem>, SourceError> {
        self.list_calls.lock().unwrap().push(ids.to_vec());
        let items = self.items.lock().unwrap();
        Ok(items
            .iter()
            .filter(|item| ids.is_empty() || ids.contains(&item.id))
            .cloned()
            .collect())
    }

    async fn list_modified_since(&self, watermark: DateTime<Utc>) -> Result<Vec<ItemTimestamp>, SourceError> {
        self.modified_calls.fetch_add(1, Ordering::SeqCst);
        let modified = self.modified.lock().unwrap();
        Ok(modified.iter().filter(|t| t.modified_at > watermark).cloned().collect())
    }

    async fn update_items(&self, items: &[LibraryItem]) -> Result<(), SourceError> {
        if self.fail_updates.load(Ordering::SeqCst) {
            return Err(SourceError::Api {
                status: 500,
                message: "write failed".to_string(),
            });
        }
        self.updates.lock().unwrap().push(items.to_vec());
        let mut stored = self.items.lock().unwrap();
        for item in items {
            stored.retain(|existing| existing.id != item.id);
            stored.push(item.clone());
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeHistory {
    pub entries: Mutex<Vec<HistoryEntry>>,
    pub external_ids: Mutex<HashMap<String, u64>>,
    pub queries: Mutex<Vec<HistoryQuery>>,
    pub batches: Mutex<Vec<HistoryBatch>>,
    pub lookups: AtomicUsize,
    /// Number of upcoming `get_history` calls answered with "too many requests"
    pub rate_limited_calls: AtomicU32,
}

impl FakeHistory {
    pub fn with_entries(entries: Vec<HistoryEntry>) -> Arc<Self> {
        let history = Self::default();
        *history.entries.lock().unwrap() = entries;
        Arc::new(history)
    }

    pub fn know(&self, content_id: &str, external_id: u64) {
        self.external_ids
            .lock()
            .unwrap()
            .insert(content_id.to_string(), external_id);
    }
}

#[async_trait]
impl HistoryClient for FakeHistory {
    /// Pages every query by `page`/`limit`. Entries with an empty content id
    /// stand for items the service cannot map: they fill a page but are dropped.
    async fn get_history(&self, query: &HistoryQuery) -> Result<HistoryPage, SourceError> {
        if self
            .rate_limited_calls
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(SourceError::RateLimited {
                retry_after: Duration::from_millis(1),
            });
        }
        self.queries.lock().unwrap().push(query.clone());
        let entries = self.entries.lock().unwrap();
        let external_ids = self.external_ids.lock().unwrap();

        let matching: Vec<&HistoryEntry> = match (query.item_type, query.id) {
            (Some(item_type), Some(id)) => {
                let kind = match item_type {
                    HistoryItemType::Movies => HistoryKind::Movie,
                    HistoryItemType::Shows => HistoryKind::Episode,
                };
                entries
                    .iter()
                    .filter(|e| e.kind == kind && external_ids.get(&e.content_id) == Some(&id))
                    .collect()
            }
            _ => entries
                .iter()
                .filter(|e| query.start_at.map_or(true, |start| e.watched_at >= start))
                .collect(),
        };
        let limit = query.limit.max(1) as usize;
        let skip = (query.page.max(1) as usize - 1) * limit;
        let page: Vec<&HistoryEntry> = matching.into_iter().skip(skip).take(limit).collect();
        Ok(HistoryPage {
            raw_count: page.len(),
            entries: page.into_iter().filter(|e| !e.content_id.is_empty()).cloned().collect(),
        })
    }

    /// Records the batch and adds its items as watch events
    async fn add_history(&self, batch: &HistoryBatch) -> Result<(), SourceError> {
        self.batches.lock().unwrap().push(batch.clone());
        let mut entries = self.entries.lock().unwrap();
        let mut next_id = entries.iter().map(|e| e.id).max().unwrap_or(0) + 1;
        for movie in &batch.movies {
            entries.push(HistoryEntry {
                id: next_id,
                content_id: movie.content_id.clone(),
                kind: HistoryKind::Movie,
                episode: None,
                watched_at: movie.watched_at.unwrap_or_else(|| at(28)),
                action: HistoryAction::Watch,
            });
            next_id += 1;
        }
        for show in &batch.shows {
            for season in &show.seasons {
                for &number in &season.episodes {
                    entries.push(HistoryEntry {
                        id: next_id,
                        content_id: show.content_id.clone(),
                        kind: HistoryKind::Episode,
                        episode: Some(EpisodeNumber {
                            season: season.number,
                            number,
                        }),
                        watched_at: at(28),
                        action: HistoryAction::Watch,
                    });
                    next_id += 1;
                }
            }
        }
        Ok(())
    }

    async fn lookup_id(&self, _id_type: IdType, id: &str, _kind: ItemKind) -> Result<Option<u64>, SourceError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        Ok(self.external_ids.lock().unwrap().get(id).copied())
    }
}

#[derive(Default)]
pub struct FakeMeta {
    pub metas: Mutex<HashMap<String, Meta>>,
}

impl FakeMeta {
    pub fn with(metas: Vec<Meta>) -> Arc<Self> {
        let provider = Self::default();
        *provider.metas.lock().unwrap() = metas.into_iter().map(|m| (m.id.clone(), m)).collect();
        Arc::new(provider)
    }
}

#[async_trait]
impl MetadataProvider for FakeMeta {
    async fn fetch_meta(&self, kind: MetaKind, content_id: &str) -> Result<Meta, SourceError> {
        self.metas
            .lock()
            .unwrap()
            .get(content_id)
            .filter(|m| m.kind == kind)
            .cloned()
            .ok_or_else(|| SourceError::NotFound(content_id.to_string()))
    }
}

#[derive(Default)]
pub struct FakeClients {
    pub libraries: HashMap<String, Arc<FakeLibrary>>,
    pub histories: HashMap<String, Arc<FakeHistory>>,
}

#[async_trait]
impl ClientProvider for FakeClients {
    async fn library_client(&self, account_id: &str) -> Result<Arc<dyn LibraryClient>, SourceError> {
        match self.libraries.get(account_id) {
            Some(library) => Ok(library.clone()),
            None => Err(SourceError::Unauthorized(account_id.to_string())),
        }
    }

    async fn history_client(&self, account_id: &str) -> Result<Arc<dyn HistoryClient>, SourceError> {
        match self.histories.get(account_id) {
            Some(history) => Ok(history.clone()),
            None => Err(SourceError::Unauthorized(account_id.to_string())),
        }
    }
}

pub struct MemoryLinks<D> {
    pub links: Mutex<Vec<Link<D>>>,
}

impl<D> MemoryLinks<D> {
    pub fn new(links: Vec<Link<D>>) -> Arc<Self> {
        Arc::new(Self {
            links: Mutex::new(links),
        })
    }

    pub fn watermark(&self, a: &str, b: &str) -> Option<DateTime<Utc>> {
        self.links
            .lock()
            .unwrap()
            .iter()
            .find(|l| l.side_a_id == a && l.side_b_id == b)
            .and_then(|l| l.sync_state.last_synced_at)
    }

    /// Forget sync progress so the next pass runs in full mode
    pub fn clear_watermarks(&self) {
        for link in self.links.lock().unwrap().iter_mut() {
            link.sync_state = SyncState::default();
        }
    }
}

#[async_trait]
impl<D: Clone + Send + Sync + 'static> LinkStore<D> for MemoryLinks<D> {
    async fn get_all_links(&self) -> anyhow::Result<Vec<Link<D>>> {
        Ok(self.links.lock().unwrap().clone())
    }

    async fn set_sync_state(&self, key: &LinkKey, state: &SyncState) -> anyhow::Result<()> {
        let mut links = self.links.lock().unwrap();
        let link = links
            .iter_mut()
            .find(|l| l.key() == *key)
            .ok_or_else(|| anyhow::anyhow!("unknown link {}", key))?;
        link.sync_state = state.clone();
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryIdMaps {
    pub maps: Mutex<HashMap<String, IdMap>>,
}

#[async_trait]
impl IdMapStore for MemoryIdMaps {
    async fn get_id_maps(&self, content_ids: &[String]) -> anyhow::Result<HashMap<String, IdMap>> {
        let maps = self.maps.lock().unwrap();
        Ok(content_ids
            .iter()
            .filter_map(|id| maps.get(id).map(|m| (id.clone(), m.clone())))
            .collect())
    }

    async fn set_id_maps(&self, maps: &[IdMap], _anchor: IdType) -> anyhow::Result<()> {
        let mut stored = self.maps.lock().unwrap();
        for m in maps {
            stored.insert(m.content_id.clone(), m.clone());
        }
        Ok(())
    }
}
