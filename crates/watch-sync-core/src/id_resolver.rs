use std::collections::HashMap;
use tracing::{debug, warn};
use watch_sync_models::{IdMap, IdType, ItemKind};
use watch_sync_sources::{HistoryClient, IdMapStore};
use crate::retry::with_rate_limit_retry;

/// Content id to history-service id resolution for one sync pass.
///
/// Looks in the persisted id maps first, then asks the history service.
/// Ids discovered during the pass are written back by [`IdResolver::flush`].
pub struct IdResolver<'a> {
    store: &'a dyn IdMapStore,
    history: &'a dyn HistoryClient,
    max_retries: u32,
    known: HashMap<String, IdMap>,
    discovered: Vec<IdMap>,
}

impl<'a> IdResolver<'a> {
    pub fn new(store: &'a dyn IdMapStore, history: &'a dyn HistoryClient, max_retries: u32) -> Self {
        Self {
            store,
            history,
            max_retries,
            known: HashMap::new(),
            discovered: Vec::new(),
        }
    }

    /// Load stored mappings for `content_ids` in one call
    pub async fn preload(&mut self, content_ids: &[String]) {
        if content_ids.is_empty() {
            return;
        }
        match self.store.get_id_maps(content_ids).await {
            Ok(maps) => {
                debug!(requested = content_ids.len(), found = maps.len(), "Preloaded id maps");
                self.known.extend(maps);
            }
            Err(e) => warn!(error = %e, "Failed to load id maps, falling back to lookups"),
        }
    }

    /// `None` when the id cannot be resolved; the caller skips the item
    pub async fn resolve(&mut self, content_id: &str, kind: ItemKind) -> Option<u64> {
        if let Some(map) = self.known.get(content_id).filter(|m| m.kind == kind) {
            return Some(map.external_id);
        }

        let history = self.history;
        let lookup = with_rate_limit_retry("lookup_id", self.max_retries, move || {
            history.lookup_id(IdType::Imdb, content_id, kind)
        })
        .await;

        match lookup {
            Ok(Some(external_id)) => {
                let map = IdMap::new(content_id, external_id, kind);
                self.known.insert(content_id.to_string(), map.clone());
                self.discovered.push(map);
                Some(external_id)
            }
            Ok(None) => {
                debug!(content_id = content_id, kind = kind.as_str(), "History service does not know item");
                None
            }
            Err(e) => {
                warn!(content_id = content_id, error = %e, "Failed to resolve history id");
                None
            }
        }
    }

    pub fn discovered(&self) -> &[IdMap] {
        &self.discovered
    }

    /// Persist newly discovered mappings. Failures are logged only.
    pub async fn flush(&mut self) {
        if self.discovered.is_empty() {
            return;
        }
        match self.store.set_id_maps(&self.discovered, IdType::Imdb).await {
            Ok(()) => {
                debug!(count = self.discovered.len(), "Saved new id maps");
                self.discovered.clear();
            }
            Err(e) => warn!(error = %e, "Failed to save id maps"),
        }
    }
}
