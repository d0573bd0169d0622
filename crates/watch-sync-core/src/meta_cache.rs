use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, OnceCell};
use tracing::debug;
use watch_sync_models::{Meta, MetaKind};
use watch_sync_sources::{MetadataProvider, SourceError};

pub const DEFAULT_META_TTL: Duration = Duration::from_secs(2 * 60 * 60);

type FetchResult = Result<Arc<Meta>, Arc<SourceError>>;

struct CacheEntry {
    meta: Arc<Meta>,
    fetched_at: Instant,
}

enum Claim {
    Cached(Arc<Meta>),
    Fetch(Arc<OnceCell<FetchResult>>),
}

/// TTL cache in front of a [`MetadataProvider`].
///
/// Concurrent requests for the same key share one in-flight fetch. Videos
/// are sorted by (season, episode) before the result is cached, so
/// [`MetaCache::episode_ordering`] is the index space of watched bitfields.
pub struct MetaCache {
    provider: Arc<dyn MetadataProvider>,
    ttl: Duration,
    entries: Mutex<HashMap<String, CacheEntry>>,
    in_flight: Mutex<HashMap<String, Arc<OnceCell<FetchResult>>>>,
}

impl MetaCache {
    pub fn new(provider: Arc<dyn MetadataProvider>, ttl: Duration) -> Self {
        Self {
            provider,
            ttl,
            entries: Mutex::new(HashMap::new()),
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    fn cache_key(kind: MetaKind, content_id: &str) -> String {
        format!("{}:{}", kind.as_str(), content_id)
    }

    async fn cached(&self, key: &str) -> Option<Arc<Meta>> {
        let entries = self.entries.lock().await;
        entries
            .get(key)
            .filter(|entry| entry.fetched_at.elapsed() < self.ttl)
            .map(|entry| entry.meta.clone())
    }

    /// Join the in-flight fetch for `key`, or start one.
    ///
    /// The cache is checked again under the in-flight lock: a fetch that
    /// finished after the caller's miss has already stored its result and
    /// dropped its cell.
    async fn claim(&self, key: &str) -> Claim {
        let mut in_flight = self.in_flight.lock().await;
        if let Some(meta) = self.cached(key).await {
            return Claim::Cached(meta);
        }
        Claim::Fetch(
            in_flight
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .clone(),
        )
    }

    pub async fn fetch_meta(&self, kind: MetaKind, content_id: &str) -> Result<Arc<Meta>, SourceError> {
        let key = Self::cache_key(kind, content_id);
        if let Some(meta) = self.cached(&key).await {
            return Ok(meta);
        }

        let cell = match self.claim(&key).await {
            Claim::Cached(meta) => return Ok(meta),
            Claim::Fetch(cell) => cell,
        };

        let result = cell
            .get_or_init(|| async {
                debug!(key = %key, "Fetching metadata");
                match self.provider.fetch_meta(kind, content_id).await {
                    Ok(mut meta) => {
                        meta.sort_videos();
                        let meta = Arc::new(meta);
                        self.entries.lock().await.insert(
                            key.clone(),
                            CacheEntry {
                                meta: meta.clone(),
                                fetched_at: Instant::now(),
                            },
                        );
                        Ok(meta)
                    }
                    Err(e) => Err(Arc::new(e)),
                }
            })
            .await
            .clone();

        {
            let mut in_flight = self.in_flight.lock().await;
            if in_flight.get(&key).is_some_and(|current| Arc::ptr_eq(current, &cell)) {
                in_flight.remove(&key);
            }
        }

        result.map_err(|e| shared_error(&e))
    }

    /// Video ids of a series ordered by season, then episode
    pub async fn episode_ordering(&self, content_id: &str) -> Result<Vec<String>, SourceError> {
        Ok(self.fetch_meta(MetaKind::Series, content_id).await?.video_ids())
    }

    pub async fn clear(&self) {
        self.entries.lock().await.clear();
    }
}

/// Rebuild an error that was shared between waiting callers
fn shared_error(e: &SourceError) -> SourceError {
    match e {
        SourceError::RateLimited { retry_after } => SourceError::RateLimited {
            retry_after: *retry_after,
        },
        SourceError::Unauthorized(message) => SourceError::Unauthorized(message.clone()),
        SourceError::NotFound(message) => SourceError::NotFound(message.clone()),
        SourceError::Api { status, message } => SourceError::Api {
            status: *status,
            message: message.clone(),
        },
        other => SourceError::Other(other.to_string()),
    }
}
