use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use watch_sync_models::{
    HistoryAction, HistoryBatch, HistoryDirection, HistoryEntry, HistoryItemType, HistoryLink, HistoryQuery,
    HistoryShow, ItemKind, LibraryItem, MetaKind, SyncDirection,
};
use watch_sync_sources::{ClientProvider, HistoryClient, IdMapStore, LibraryClient, LinkStore};
use crate::bitfield::WatchedBitField;
use crate::id_resolver::IdResolver;
use crate::meta_cache::MetaCache;
use crate::set::Set;
use super::merge::{self, LibrarySnapshot};
use super::{
    add_history, commit, fetch_metas, get_all_history, link_error, list_items, list_modified_since, update_items,
    EngineSettings, LinkReport, SyncError, SyncMode, SyncSummary,
};

/// Keeps a library account and a history-service account in step.
///
/// Side A of a history link is the library account, side B the history
/// account.
pub struct HistorySyncEngine {
    links: Arc<dyn LinkStore<HistoryDirection>>,
    clients: Arc<dyn ClientProvider>,
    id_maps: Arc<dyn IdMapStore>,
    meta: Arc<MetaCache>,
    settings: EngineSettings,
}

impl HistorySyncEngine {
    pub fn new(
        links: Arc<dyn LinkStore<HistoryDirection>>,
        clients: Arc<dyn ClientProvider>,
        id_maps: Arc<dyn IdMapStore>,
        meta: Arc<MetaCache>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            links,
            clients,
            id_maps,
            meta,
            settings,
        }
    }

    pub async fn run_all(&self) -> Result<SyncSummary, SyncError> {
        let links = self.links.get_all_links().await?;
        let mut summary = SyncSummary::default();
        info!(links = links.len(), "Starting history sync pass");

        for link in &links {
            if link.sync_config.direction.is_disabled() {
                summary.skipped += 1;
                continue;
            }
            match self.sync_link(link).await {
                Ok(report) => {
                    if report.has_errors() {
                        summary.failed += 1;
                    } else {
                        summary.processed += 1;
                    }
                    summary.reports.push(report);
                }
                Err(e) => summary.link_failed(link.key().to_string(), &e),
            }
        }

        info!(
            processed = summary.processed,
            failed = summary.failed,
            skipped = summary.skipped,
            "History sync pass finished"
        );
        Ok(summary)
    }

    #[instrument(skip(self, link), fields(link = %link.key()))]
    pub async fn sync_link(&self, link: &HistoryLink) -> Result<LinkReport, SyncError> {
        let direction = link.sync_config.direction;
        let pass_start = Utc::now();
        let library = self
            .clients
            .library_client(&link.side_a_id)
            .await
            .map_err(|e| link_error("library", &link.side_a_id, e))?;
        let history = self
            .clients
            .history_client(&link.side_b_id)
            .await
            .map_err(|e| link_error("history", &link.side_b_id, e))?;

        let mode = SyncMode::for_state(&link.sync_state);
        let watermark = link.sync_state.last_synced_at;
        let mut report = LinkReport::new(link.key().to_string(), mode);

        let snapshot = self.fetch_library(&*library, watermark).await?;
        let entries = self.fetch_history(&*history, watermark).await?;
        debug!(
            mode = ?mode,
            movies = snapshot.movies.len(),
            series = snapshot.series.len(),
            history_entries = entries.len(),
            "Fetched both sides"
        );

        let mut resolver = IdResolver::new(&*self.id_maps, &*history, self.settings.max_rate_limit_retries);
        let mut all_ok = true;
        if direction.syncs_to_history() {
            let result = self
                .library_to_history(&*history, &snapshot, &entries, mode, &mut resolver)
                .await;
            all_ok &= report.record("library_to_history", result);
        }
        if direction.syncs_to_library() {
            let result = self.history_to_library(&*library, &snapshot, &entries, mode).await;
            all_ok &= report.record("history_to_library", result);
        }
        resolver.flush().await;

        if all_ok {
            report.committed = commit(&*self.links, link, pass_start).await?;
        }
        info!(
            mode = ?mode,
            staged = report.staged(),
            committed = report.committed,
            "History link synced"
        );
        Ok(report)
    }

    /// The whole library, or only items modified after the watermark
    async fn fetch_library(
        &self,
        library: &dyn LibraryClient,
        watermark: Option<DateTime<Utc>>,
    ) -> Result<LibrarySnapshot, SyncError> {
        let retries = self.settings.max_rate_limit_retries;
        let items = match watermark {
            None => list_items(library, &[], retries).await?,
            Some(watermark) => {
                let ids: Vec<String> = list_modified_since(library, watermark, retries)
                    .await?
                    .into_iter()
                    .map(|t| t.id)
                    .filter(|id| id.starts_with("tt"))
                    .collect();
                if ids.is_empty() {
                    Vec::new()
                } else {
                    list_items(library, &ids, retries).await?
                }
            }
        };
        Ok(LibrarySnapshot::from_items(items, None))
    }

    /// Watch events, paging until a short page
    async fn fetch_history(
        &self,
        history: &dyn HistoryClient,
        watermark: Option<DateTime<Utc>>,
    ) -> Result<Vec<HistoryEntry>, SyncError> {
        let limit = self.settings.history_page_limit.max(1);
        let entries = get_all_history(history, limit, self.settings.max_rate_limit_retries, |page| {
            HistoryQuery::page(page, limit, watermark)
        })
        .await?;
        Ok(entries.into_iter().filter(|e| e.action == HistoryAction::Watch).collect())
    }

    /// Every history entry of one movie or show
    async fn fetch_item_history(
        &self,
        history: &dyn HistoryClient,
        item_type: HistoryItemType,
        external_id: u64,
    ) -> Result<Vec<HistoryEntry>, SyncError> {
        let limit = self.settings.history_page_limit.max(1);
        let entries = get_all_history(history, limit, self.settings.max_rate_limit_retries, |page| {
            HistoryQuery::for_item(item_type, external_id, page, limit)
        })
        .await?;
        Ok(entries)
    }

    async fn library_to_history(
        &self,
        history: &dyn HistoryClient,
        snapshot: &LibrarySnapshot,
        entries: &[HistoryEntry],
        mode: SyncMode,
        resolver: &mut IdResolver<'_>,
    ) -> Result<usize, SyncError> {
        let retries = self.settings.max_rate_limit_retries;
        let history_movie_ids: Set<String> = merge::latest_movie_watches(entries).into_keys().collect();
        let mut episode_keys = merge::episode_keys_by_show(entries);

        if mode.is_incremental() {
            let ids: Vec<String> = snapshot
                .movies
                .iter()
                .chain(snapshot.series.iter())
                .map(|i| i.id.clone())
                .collect();
            resolver.preload(&ids).await;
        }

        let mut batch = HistoryBatch::default();
        for movie in merge::movies_missing_from_history(&snapshot.movies, &history_movie_ids) {
            if mode.is_incremental() {
                let Some(external_id) = resolver.resolve(&movie.id, ItemKind::Movie).await else {
                    continue;
                };
                if !self
                    .fetch_item_history(history, HistoryItemType::Movies, external_id)
                    .await?
                    .is_empty()
                {
                    continue;
                }
            }
            batch.movies.push(merge::history_movie(movie));
        }

        let watched_series: Vec<&LibraryItem> = snapshot
            .series
            .iter()
            .filter(|s| s.state.watched_field().is_some())
            .collect();
        let metas = fetch_metas(
            &self.meta,
            MetaKind::Series,
            watched_series.iter().map(|s| s.id.as_str()),
            retries,
        )
        .await;

        for series in watched_series {
            let (Some(field), Some(meta)) = (series.state.watched_field(), metas.get(&series.id)) else {
                continue;
            };
            let watched = match WatchedBitField::from_encoded(field, meta.video_ids()) {
                Ok(w) => w,
                Err(e) => {
                    warn!(content_id = %series.id, error = %e, "Undecodable watched field, skipping series");
                    continue;
                }
            };

            if mode.is_incremental() {
                let Some(external_id) = resolver.resolve(&series.id, ItemKind::Show).await else {
                    continue;
                };
                let targeted = self
                    .fetch_item_history(history, HistoryItemType::Shows, external_id)
                    .await?;
                let keys = episode_keys.entry(series.id.clone()).or_default();
                keys.extend(targeted.iter().filter_map(HistoryEntry::episode_key));
            }

            let empty = Set::new();
            let keys = episode_keys.get(&series.id).unwrap_or(&empty);
            let seasons = merge::episodes_missing_from_history(&watched, keys);
            if !seasons.is_empty() {
                batch.shows.push(HistoryShow {
                    content_id: series.id.clone(),
                    seasons,
                });
            }
        }

        if batch.is_empty() {
            return Ok(0);
        }
        let staged = batch.movies.len() + batch.shows.iter().map(HistoryShow::episode_count).sum::<usize>();
        add_history(history, &batch, retries).await?;
        debug!(
            movies = batch.movies.len(),
            shows = batch.shows.len(),
            "Added history"
        );
        Ok(staged)
    }

    async fn history_to_library(
        &self,
        library: &dyn LibraryClient,
        snapshot: &LibrarySnapshot,
        entries: &[HistoryEntry],
        mode: SyncMode,
    ) -> Result<usize, SyncError> {
        let retries = self.settings.max_rate_limit_retries;
        let watches = merge::latest_movie_watches(entries);
        let shows = merge::episodes_by_show(entries);

        // An incremental snapshot only holds recently modified items
        let mut fetched = LibrarySnapshot::default();
        if mode.is_incremental() {
            let known: HashSet<&str> = snapshot
                .movies
                .iter()
                .chain(snapshot.series.iter())
                .map(|i| i.id.as_str())
                .collect();
            let missing: Vec<String> = watches
                .keys()
                .chain(shows.keys())
                .filter(|id| !known.contains(id.as_str()))
                .cloned()
                .collect();
            if !missing.is_empty() {
                fetched = LibrarySnapshot::from_items(list_items(library, &missing, retries).await?, None);
            }
        }

        let mut movie_index = snapshot.movie_index();
        movie_index.extend(fetched.movie_index());
        let mut series_index = snapshot.series_index();
        series_index.extend(fetched.series_index());

        let missing_movies = watches
            .keys()
            .filter(|id| !movie_index.contains_key(id.as_str()))
            .map(String::as_str);
        let movie_metas = fetch_metas(&self.meta, MetaKind::Movie, missing_movies, retries).await;
        let show_metas = fetch_metas(&self.meta, MetaKind::Series, shows.keys().map(String::as_str), retries).await;

        let now = Utc::now();
        let mut staged = merge::merge_history_movies(&watches, &movie_index, &movie_metas, now);
        for (show_id, episodes) in &shows {
            let Some(meta) = show_metas.get(show_id) else {
                continue;
            };
            let existing = series_index.get(show_id.as_str()).copied();
            if let Some(item) = merge::merge_history_show(meta, episodes, existing, now) {
                staged.push(item);
            }
        }

        update_items(library, &staged, retries).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::fakes::*;
    use crate::meta_cache::DEFAULT_META_TTL;
    use std::sync::atomic::Ordering;
    use watch_sync_models::{EpisodeNumber, HistoryKind, Meta};

    struct Fixture {
        engine: HistorySyncEngine,
        links: Arc<MemoryLinks<HistoryDirection>>,
        library: Arc<FakeLibrary>,
        history: Arc<FakeHistory>,
        id_maps: Arc<MemoryIdMaps>,
    }

    fn fixture(link: HistoryLink, items: Vec<LibraryItem>, entries: Vec<HistoryEntry>, settings: EngineSettings) -> Fixture {
        let library = FakeLibrary::with_items(items);
        let history = FakeHistory::with_entries(entries);
        let mut clients = FakeClients::default();
        clients.libraries.insert("lib".to_string(), library.clone());
        clients.histories.insert("hist".to_string(), history.clone());
        let links = MemoryLinks::new(vec![link]);
        let id_maps = Arc::new(MemoryIdMaps::default());
        let movie_meta = Meta {
            id: "tt0111161".to_string(),
            kind: MetaKind::Movie,
            name: "The Shawshank Redemption".to_string(),
            poster: None,
            poster_shape: None,
            background: None,
            logo: None,
            release_info: None,
            videos: vec![],
        };
        let godfather = Meta {
            id: "tt0068646".to_string(),
            name: "The Godfather".to_string(),
            ..movie_meta.clone()
        };
        let meta = Arc::new(MetaCache::new(
            FakeMeta::with(vec![show_meta("tt0944947", 3), movie_meta, godfather]),
            DEFAULT_META_TTL,
        ));
        let engine = HistorySyncEngine::new(links.clone(), Arc::new(clients), id_maps.clone(), meta, settings);
        Fixture {
            engine,
            links,
            library,
            history,
            id_maps,
        }
    }

    fn entry(content_id: &str, episode: Option<(u32, u32)>, day: u32) -> HistoryEntry {
        HistoryEntry {
            id: day as i64,
            content_id: content_id.to_string(),
            kind: if episode.is_some() { HistoryKind::Episode } else { HistoryKind::Movie },
            episode: episode.map(|(season, number)| EpisodeNumber { season, number }),
            watched_at: at(day),
            action: HistoryAction::Watch,
        }
    }

    fn watched(indexes: &[usize]) -> String {
        let mut set = WatchedBitField::empty(show_meta("tt0944947", 3).video_ids());
        for &i in indexes {
            set.set(i, true);
        }
        set.encode().unwrap()
    }

    #[tokio::test]
    async fn test_full_sync_library_to_history() {
        let f = fixture(
            link("lib", "hist", HistoryDirection::LibraryToHistory, &[], None),
            vec![
                movie("tt0111161", 1),
                movie("tt0068646", 1),
                movie("tt0000001", 0),
                series("tt0944947", Some(watched(&[0, 1, 2]))),
            ],
            vec![entry("tt0068646", None, 2), entry("tt0944947", Some((1, 2)), 3)],
            EngineSettings::default(),
        );

        let summary = f.engine.run_all().await.unwrap();
        assert_eq!(summary.processed, 1);

        let batches = f.history.batches.lock().unwrap();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].movies.len(), 1);
        assert_eq!(batches[0].movies[0].content_id, "tt0111161");
        assert_eq!(batches[0].shows.len(), 1);
        assert_eq!(batches[0].shows[0].seasons[0].episodes, vec![1, 3]);

        // Full mode lists the whole library and never writes it
        assert_eq!(f.library.list_calls.lock().unwrap()[0], Vec::<String>::new());
        assert!(f.library.updates.lock().unwrap().is_empty());
        assert!(f.links.watermark("lib", "hist").is_some());
    }

    #[tokio::test]
    async fn test_full_sync_history_to_library() {
        let f = fixture(
            link("lib", "hist", HistoryDirection::HistoryToLibrary, &[], None),
            vec![series("tt0944947", Some(watched(&[0])))],
            vec![
                entry("tt0111161", None, 2),
                entry("tt0111161", None, 6),
                entry("tt0944947", Some((1, 2)), 4),
                entry("tt7654321", None, 5),
            ],
            EngineSettings::default(),
        );

        f.engine.run_all().await.unwrap();
        let written = f.library.updated_items();
        assert_eq!(f.library.updates.lock().unwrap().len(), 1);
        assert_eq!(written.len(), 2);

        let movie = written.iter().find(|i| i.id == "tt0111161").unwrap();
        assert_eq!(movie.name, "The Shawshank Redemption");
        assert_eq!(movie.state.times_watched, 1);
        assert_eq!(movie.state.last_watched, Some(at(6)));

        let show = written.iter().find(|i| i.id == "tt0944947").unwrap();
        assert_eq!(show.state.video_id.as_deref(), Some("tt0944947:1:3"));
        assert!(f.history.batches.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rate_limited_page_is_retried() {
        let settings = EngineSettings {
            history_page_limit: 2,
            ..EngineSettings::default()
        };
        let f = fixture(
            link("lib", "hist", HistoryDirection::HistoryToLibrary, &[], None),
            vec![],
            vec![entry("tt0111161", None, 1), entry("tt0111161", None, 2), entry("tt0111161", None, 3)],
            settings,
        );
        f.history.rate_limited_calls.store(1, Ordering::SeqCst);

        let summary = f.engine.run_all().await.unwrap();
        assert_eq!(summary.processed, 1);
        let pages: Vec<u32> = f.history.queries.lock().unwrap().iter().map(|q| q.page).collect();
        assert_eq!(pages, vec![1, 2]);
        assert_eq!(f.library.updated_items()[0].state.last_watched, Some(at(3)));
    }

    #[tokio::test]
    async fn test_unmapped_items_do_not_end_paging() {
        let settings = EngineSettings {
            history_page_limit: 2,
            ..EngineSettings::default()
        };
        // The first page is full but one of its items has no IMDB id
        let f = fixture(
            link("lib", "hist", HistoryDirection::HistoryToLibrary, &[], None),
            vec![],
            vec![entry("", None, 1), entry("tt0111161", None, 2), entry("tt0068646", None, 3)],
            settings,
        );

        f.engine.run_all().await.unwrap();
        let pages: Vec<u32> = f.history.queries.lock().unwrap().iter().map(|q| q.page).collect();
        assert_eq!(pages, vec![1, 2]);

        let mut written: Vec<String> = f.library.updated_items().into_iter().map(|i| i.id).collect();
        written.sort();
        assert_eq!(written, vec!["tt0068646", "tt0111161"]);
    }

    #[tokio::test]
    async fn test_incremental_show_history_is_read_past_the_first_page() {
        let settings = EngineSettings {
            history_page_limit: 2,
            ..EngineSettings::default()
        };
        let f = fixture(
            link("lib", "hist", HistoryDirection::LibraryToHistory, &[], Some(at(5))),
            vec![series("tt0944947", Some(watched(&[0, 1, 2])))],
            vec![
                entry("tt0944947", Some((1, 1)), 1),
                entry("tt0944947", Some((1, 2)), 2),
                entry("tt0944947", Some((1, 3)), 3),
            ],
            settings,
        );
        f.library.mark_modified("tt0944947", at(6));
        f.history.know("tt0944947", 33);

        let summary = f.engine.run_all().await.unwrap();
        assert_eq!(summary.processed, 1);

        let targeted: Vec<u32> = f
            .history
            .queries
            .lock()
            .unwrap()
            .iter()
            .filter(|q| q.id == Some(33))
            .map(|q| q.page)
            .collect();
        assert_eq!(targeted, vec![1, 2]);
        // Episode 1:3 sits on the second page and is not added again
        assert!(f.history.batches.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_second_pass_on_unchanged_state_writes_nothing() {
        let f = fixture(
            link("lib", "hist", HistoryDirection::Both, &[], None),
            vec![movie("tt0068646", 1), series("tt0944947", Some(watched(&[0])))],
            vec![entry("tt0111161", None, 2), entry("tt0944947", Some((1, 2)), 3)],
            EngineSettings::default(),
        );

        f.engine.run_all().await.unwrap();
        assert_eq!(f.history.batches.lock().unwrap().len(), 1);
        assert_eq!(f.library.updates.lock().unwrap().len(), 1);

        // Incremental pass, then a full pass over the converged state
        f.engine.run_all().await.unwrap();
        f.links.clear_watermarks();
        let summary = f.engine.run_all().await.unwrap();
        assert_eq!(summary.failed, 0);

        assert_eq!(f.history.batches.lock().unwrap().len(), 1);
        assert_eq!(f.library.updates.lock().unwrap().len(), 1);
        assert!(f.links.watermark("lib", "hist").is_some());
    }

    #[tokio::test]
    async fn test_incremental_checks_item_history_before_adding() {
        let watermark = at(5);
        let f = fixture(
            link("lib", "hist", HistoryDirection::LibraryToHistory, &[], Some(watermark)),
            vec![movie("tt0111161", 1), movie("tt0068646", 1), movie("tt0000404", 1)],
            vec![entry("tt0068646", None, 1)],
            EngineSettings::default(),
        );
        f.library.mark_modified("tt0111161", at(6));
        f.library.mark_modified("tt0068646", at(6));
        f.library.mark_modified("tt0000404", at(6));
        f.history.know("tt0111161", 11);
        f.history.know("tt0068646", 22);

        f.engine.run_all().await.unwrap();

        // Only modified items are listed
        assert_eq!(f.library.list_calls.lock().unwrap()[0].len(), 3);
        let queries = f.history.queries.lock().unwrap().clone();
        assert_eq!(queries[0].start_at, Some(watermark));
        assert!(queries.iter().any(|q| q.id == Some(22)));

        // tt0068646 has older history, tt0000404 cannot be resolved
        let batches = f.history.batches.lock().unwrap();
        assert_eq!(batches[0].movies.len(), 1);
        assert_eq!(batches[0].movies[0].content_id, "tt0111161");

        let saved = f.id_maps.maps.lock().unwrap();
        assert_eq!(saved["tt0111161"].external_id, 11);
    }

    #[tokio::test]
    async fn test_incremental_without_library_changes_skips_listing() {
        let f = fixture(
            link("lib", "hist", HistoryDirection::Both, &[], Some(at(5))),
            vec![movie("tt0111161", 0)],
            vec![entry("tt0111161", None, 6)],
            EngineSettings::default(),
        );

        f.engine.run_all().await.unwrap();
        // Targeted fetch for the history item only
        let calls = f.library.list_calls.lock().unwrap().clone();
        assert_eq!(calls, vec![vec!["tt0111161".to_string()]]);
        let written = f.library.updated_items();
        assert_eq!(written.len(), 1);
        assert_eq!(written[0].state.times_watched, 1);
    }

    #[tokio::test]
    async fn test_failed_write_keeps_watermark() {
        let f = fixture(
            link("lib", "hist", HistoryDirection::Both, &[], None),
            vec![movie("tt0068646", 1)],
            vec![entry("tt0111161", None, 2)],
            EngineSettings::default(),
        );
        f.library.fail_updates.store(true, Ordering::SeqCst);

        let summary = f.engine.run_all().await.unwrap();
        assert_eq!(summary.failed, 1);
        assert_eq!(f.history.batches.lock().unwrap().len(), 1);
        assert!(f.links.watermark("lib", "hist").is_none());
    }

    #[tokio::test]
    async fn test_missing_history_account_fails_only_that_link() {
        let f = fixture(
            link("lib", "nobody", HistoryDirection::Both, &[], None),
            vec![],
            vec![],
            EngineSettings::default(),
        );
        f.links
            .links
            .lock()
            .unwrap()
            .push(link("lib", "hist", HistoryDirection::None, &[], None));

        let summary = f.engine.run_all().await.unwrap();
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.skipped, 1);
        assert!(f.links.watermark("lib", "nobody").is_none());
    }
}
