use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, instrument};
use watch_sync_models::{AccountDirection, AccountLink, LibraryItem, Meta, MetaKind, SyncDirection};
use watch_sync_sources::{ClientProvider, LinkStore};
use crate::meta_cache::MetaCache;
use crate::set::Set;
use super::merge::{self, LibrarySnapshot};
use super::{
    commit, fetch_metas, link_error, list_items, list_modified_since, update_items, EngineSettings, LinkReport,
    SyncError, SyncMode, SyncSummary,
};

/// Keeps the watched state of two library accounts in step
pub struct AccountSyncEngine {
    links: Arc<dyn LinkStore<AccountDirection>>,
    clients: Arc<dyn ClientProvider>,
    meta: Arc<MetaCache>,
    settings: EngineSettings,
}

impl AccountSyncEngine {
    pub fn new(
        links: Arc<dyn LinkStore<AccountDirection>>,
        clients: Arc<dyn ClientProvider>,
        meta: Arc<MetaCache>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            links,
            clients,
            meta,
            settings,
        }
    }

    /// Sync every enabled link in turn. A failing link is logged and the
    /// pass continues with the next one.
    pub async fn run_all(&self) -> Result<SyncSummary, SyncError> {
        let links = self.links.get_all_links().await?;
        let mut summary = SyncSummary::default();
        info!(links = links.len(), "Starting account sync pass");

        for link in &links {
            if link.sync_config.direction.is_disabled() {
                summary.skipped += 1;
                continue;
            }
            match self.sync_link(link).await {
                Ok(Some(report)) => {
                    if report.has_errors() {
                        summary.failed += 1;
                    } else {
                        summary.processed += 1;
                    }
                    summary.reports.push(report);
                }
                Ok(None) => summary.skipped += 1,
                Err(e) => summary.link_failed(link.key().to_string(), &e),
            }
        }

        info!(
            processed = summary.processed,
            failed = summary.failed,
            skipped = summary.skipped,
            "Account sync pass finished"
        );
        Ok(summary)
    }

    /// `Ok(None)` when the link has nothing to do (no direction, no ids)
    #[instrument(skip(self, link), fields(link = %link.key()))]
    pub async fn sync_link(&self, link: &AccountLink) -> Result<Option<LinkReport>, SyncError> {
        let direction = link.sync_config.direction;
        if direction.is_disabled() {
            return Ok(None);
        }
        let include: Set<String> = link.sync_config.ids.iter().cloned().collect();
        if include.is_empty() {
            debug!("No content ids to sync, skipping link");
            return Ok(None);
        }

        let pass_start = Utc::now();
        let retries = self.settings.max_rate_limit_retries;
        let client_a = self
            .clients
            .library_client(&link.side_a_id)
            .await
            .map_err(|e| link_error("side A", &link.side_a_id, e))?;
        let client_b = self
            .clients
            .library_client(&link.side_b_id)
            .await
            .map_err(|e| link_error("side B", &link.side_b_id, e))?;

        let mode = SyncMode::for_state(&link.sync_state);
        let mut report = LinkReport::new(link.key().to_string(), mode);

        let ids: Vec<String> = match link.sync_state.last_synced_at {
            None => link.sync_config.ids.clone(),
            Some(watermark) => {
                let modified_a = list_modified_since(&*client_a, watermark, retries).await?;
                let modified_b = list_modified_since(&*client_b, watermark, retries).await?;
                let modified: Set<String> = modified_a.into_iter().chain(modified_b).map(|t| t.id).collect();
                let candidates: Vec<String> = modified.intersection(&include).into_iter().collect();
                if candidates.is_empty() {
                    debug!("Nothing modified since last sync");
                    report.committed = commit(&*self.links, link, pass_start).await?;
                    return Ok(Some(report));
                }
                candidates
            }
        };

        let side_a = LibrarySnapshot::from_items(list_items(&*client_a, &ids, retries).await?, Some(&include));
        let side_b = LibrarySnapshot::from_items(list_items(&*client_b, &ids, retries).await?, Some(&include));
        debug!(
            mode = ?mode,
            side_a = side_a.len(),
            side_b = side_b.len(),
            "Fetched library items"
        );

        let series_ids = side_a
            .series
            .iter()
            .chain(side_b.series.iter())
            .filter(|s| s.state.watched_field().is_some())
            .map(|s| s.id.as_str());
        let metas = fetch_metas(&self.meta, MetaKind::Series, series_ids, retries).await;

        let mut all_ok = true;
        if direction.syncs_a_to_b() {
            let staged = stage(&side_a, &side_b, &metas);
            let result = update_items(&*client_b, &staged, retries).await;
            all_ok &= report.record("a_to_b", result);
        }
        if direction.syncs_b_to_a() {
            let staged = stage(&side_b, &side_a, &metas);
            let result = update_items(&*client_a, &staged, retries).await;
            all_ok &= report.record("b_to_a", result);
        }

        if all_ok {
            report.committed = commit(&*self.links, link, pass_start).await?;
        }
        info!(
            mode = ?mode,
            staged = report.staged(),
            committed = report.committed,
            "Account link synced"
        );
        Ok(Some(report))
    }
}

/// Updates that bring `target` up to date with `source`
fn stage(
    source: &LibrarySnapshot,
    target: &LibrarySnapshot,
    metas: &HashMap<String, Arc<Meta>>,
) -> Vec<LibraryItem> {
    let now = Utc::now();
    let mut staged = merge::merge_library_movies(&source.movies, &target.movie_index(), now);
    staged.extend(merge::merge_library_series(&source.series, &target.series_index(), metas, now));
    staged
}
