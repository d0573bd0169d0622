//! Pure merge steps. Each function takes fetched state and returns the
//! updates to write; nothing here talks to a remote service.

use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::warn;
use watch_sync_models::{
    EpisodeNumber, HistoryEntry, HistoryKind, HistoryMovie, HistorySeason, LibraryItem, Meta, VideoId,
};
use crate::bitfield::{BitfieldError, WatchedBitField};
use crate::set::Set;

pub type ItemIndex<'a> = HashMap<&'a str, &'a LibraryItem>;

/// Library items taking part in sync, split by type
#[derive(Debug, Clone, Default)]
pub struct LibrarySnapshot {
    pub movies: Vec<LibraryItem>,
    pub series: Vec<LibraryItem>,
}

impl LibrarySnapshot {
    /// Keep IMDB-keyed, non-removed items, optionally restricted to `include`
    pub fn from_items(items: Vec<LibraryItem>, include: Option<&Set<String>>) -> Self {
        let mut snapshot = Self::default();
        for item in items {
            if !item.has_imdb_id() || item.removed {
                continue;
            }
            if include.is_some_and(|ids| !ids.has(item.id.as_str())) {
                continue;
            }
            if item.is_movie() {
                snapshot.movies.push(item);
            } else if item.is_series() {
                snapshot.series.push(item);
            }
        }
        snapshot
    }

    pub fn extend(&mut self, other: LibrarySnapshot) {
        self.movies.extend(other.movies);
        self.series.extend(other.series);
    }

    pub fn movie_index(&self) -> ItemIndex<'_> {
        self.movies.iter().map(|m| (m.id.as_str(), m)).collect()
    }

    pub fn series_index(&self) -> ItemIndex<'_> {
        self.series.iter().map(|s| (s.id.as_str(), s)).collect()
    }

    pub fn len(&self) -> usize {
        self.movies.len() + self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Existing target item touched for an update, or a fresh copy of `source`
fn target_for(source: &LibraryItem, existing: Option<&&LibraryItem>, now: DateTime<Utc>) -> LibraryItem {
    match existing {
        Some(item) => {
            let mut item = (*item).clone();
            item.modified_at = Some(now);
            item
        }
        None => LibraryItem::blank_copy_of(source, now),
    }
}

/// Store the merged watched set on `item`
fn apply_watched(
    item: &mut LibraryItem,
    watched: &WatchedBitField,
    last_watched: Option<DateTime<Utc>>,
) -> Result<(), BitfieldError> {
    item.state.watched = Some(watched.encode()?);
    item.state.last_watched = item.state.last_watched.max(last_watched);
    item.state.video_id = watched.first_unwatched_video_id().map(str::to_string);
    Ok(())
}

/// Movies watched in `source` but not in `target`
pub fn merge_library_movies(source: &[LibraryItem], target: &ItemIndex<'_>, now: DateTime<Utc>) -> Vec<LibraryItem> {
    let mut staged = Vec::new();
    for movie in source.iter().filter(|m| m.state.times_watched > 0) {
        let existing = target.get(movie.id.as_str());
        if existing.is_some_and(|t| t.state.times_watched > 0) {
            continue;
        }
        let mut item = target_for(movie, existing, now);
        item.state.times_watched = 1;
        item.state.last_watched = item.state.last_watched.max(movie.state.last_watched);
        staged.push(item);
    }
    staged
}

/// Series whose source watched set has episodes the target lacks.
///
/// Series without metadata or with an undecodable source field are skipped.
pub fn merge_library_series(
    source: &[LibraryItem],
    target: &ItemIndex<'_>,
    metas: &HashMap<String, Arc<Meta>>,
    now: DateTime<Utc>,
) -> Vec<LibraryItem> {
    let mut staged = Vec::new();
    for series in source {
        let Some(field) = series.state.watched_field() else {
            continue;
        };
        let Some(meta) = metas.get(&series.id) else {
            continue;
        };
        let ordering = meta.video_ids();

        let source_watched = match WatchedBitField::from_encoded(field, ordering.clone()) {
            Ok(w) => w,
            Err(e) => {
                warn!(content_id = %series.id, error = %e, "Undecodable watched field, skipping series");
                continue;
            }
        };

        let existing = target.get(series.id.as_str());
        let mut target_watched = match existing.and_then(|t| t.state.watched_field()) {
            Some(field) => match WatchedBitField::from_encoded(field, ordering.clone()) {
                Ok(w) => w,
                Err(e) => {
                    warn!(content_id = %series.id, error = %e, "Undecodable target watched field, skipping series");
                    continue;
                }
            },
            None => WatchedBitField::empty(ordering.clone()),
        };

        let mut changed = false;
        for (i, _) in ordering.iter().enumerate() {
            if source_watched.get(i) && !target_watched.get(i) {
                target_watched.set(i, true);
                changed = true;
            }
        }
        if !changed {
            continue;
        }

        let mut item = target_for(series, existing, now);
        if let Err(e) = apply_watched(&mut item, &target_watched, series.state.last_watched) {
            warn!(content_id = %series.id, error = %e, "Failed to encode watched field, skipping series");
            continue;
        }
        staged.push(item);
    }
    staged
}

/// Watched library movies that the fetched history does not contain
pub fn movies_missing_from_history<'a>(movies: &'a [LibraryItem], history_ids: &Set<String>) -> Vec<&'a LibraryItem> {
    movies
        .iter()
        .filter(|m| m.state.times_watched > 0 && !history_ids.has(m.id.as_str()))
        .collect()
}

pub fn history_movie(item: &LibraryItem) -> HistoryMovie {
    HistoryMovie {
        content_id: item.id.clone(),
        watched_at: item.state.last_watched,
    }
}

/// Watched episodes missing from `history_keys` (`season:episode`), grouped
/// by season. Specials (season 0) and unparseable ids are ignored.
pub fn episodes_missing_from_history(watched: &WatchedBitField, history_keys: &Set<String>) -> Vec<HistorySeason> {
    let mut seasons: BTreeMap<u32, Vec<u32>> = BTreeMap::new();
    for video in watched.watched_video_ids().filter_map(VideoId::parse) {
        if video.season < 1 || video.episode < 1 {
            continue;
        }
        if history_keys.has(video.episode_key().as_str()) {
            continue;
        }
        seasons.entry(video.season).or_default().push(video.episode);
    }
    seasons
        .into_iter()
        .map(|(number, episodes)| HistorySeason { number, episodes })
        .collect()
}

/// Content ids of history movie entries with their latest watch time
pub fn latest_movie_watches(entries: &[HistoryEntry]) -> HashMap<String, DateTime<Utc>> {
    let mut latest: HashMap<String, DateTime<Utc>> = HashMap::new();
    for entry in entries.iter().filter(|e| e.kind == HistoryKind::Movie) {
        latest
            .entry(entry.content_id.clone())
            .and_modify(|t| *t = (*t).max(entry.watched_at))
            .or_insert(entry.watched_at);
    }
    latest
}

/// Episode entries grouped by show content id
pub fn episodes_by_show(entries: &[HistoryEntry]) -> HashMap<String, Vec<(EpisodeNumber, DateTime<Utc>)>> {
    let mut shows: HashMap<String, Vec<(EpisodeNumber, DateTime<Utc>)>> = HashMap::new();
    for entry in entries.iter().filter(|e| e.kind == HistoryKind::Episode) {
        if let Some(episode) = entry.episode {
            shows
                .entry(entry.content_id.clone())
                .or_default()
                .push((episode, entry.watched_at));
        }
    }
    shows
}

/// Episode keys of every history entry, per show
pub fn episode_keys_by_show(entries: &[HistoryEntry]) -> HashMap<String, Set<String>> {
    let mut keys: HashMap<String, Set<String>> = HashMap::new();
    for entry in entries {
        if let Some(key) = entry.episode_key() {
            keys.entry(entry.content_id.clone()).or_default().add(key);
        }
    }
    keys
}

/// Movies watched on the history service but not in the library.
///
/// Missing library items are created from `metas`; ids without metadata are
/// skipped.
pub fn merge_history_movies(
    watches: &HashMap<String, DateTime<Utc>>,
    library: &ItemIndex<'_>,
    metas: &HashMap<String, Arc<Meta>>,
    now: DateTime<Utc>,
) -> Vec<LibraryItem> {
    let mut staged = Vec::new();
    for (content_id, watched_at) in watches {
        let mut item = match library.get(content_id.as_str()) {
            Some(existing) if existing.state.times_watched > 0 => continue,
            Some(existing) => {
                let mut item = (*existing).clone();
                item.modified_at = Some(now);
                item
            }
            None => match metas.get(content_id) {
                Some(meta) => LibraryItem::from_meta(meta, now),
                None => continue,
            },
        };
        item.state.times_watched = 1;
        item.state.last_watched = item.state.last_watched.max(Some(*watched_at));
        staged.push(item);
    }
    staged
}

/// Apply history episodes of one show to its library item.
///
/// Returns `None` when no new episode was marked or the existing field
/// cannot be decoded.
pub fn merge_history_show(
    meta: &Meta,
    episodes: &[(EpisodeNumber, DateTime<Utc>)],
    existing: Option<&LibraryItem>,
    now: DateTime<Utc>,
) -> Option<LibraryItem> {
    let ordering = meta.video_ids();
    let mut watched = match existing.and_then(|item| item.state.watched_field()) {
        Some(field) => match WatchedBitField::from_encoded(field, ordering) {
            Ok(w) => w,
            Err(e) => {
                warn!(content_id = %meta.id, error = %e, "Undecodable watched field, skipping show");
                return None;
            }
        },
        None => WatchedBitField::empty(ordering),
    };

    let mut latest: Option<DateTime<Utc>> = None;
    for (episode, watched_at) in episodes {
        let video_id = VideoId::new(meta.id.as_str(), episode.season, episode.number).to_string();
        if watched.get_video(&video_id) || !watched.video_ids().contains(&video_id) {
            continue;
        }
        watched.set_video(&video_id, true);
        latest = latest.max(Some(*watched_at));
    }
    if latest.is_none() {
        return None;
    }

    let mut item = match existing {
        Some(existing) => {
            let mut item = existing.clone();
            item.modified_at = Some(now);
            item
        }
        None => LibraryItem::from_meta(meta, now),
    };
    if let Err(e) = apply_watched(&mut item, &watched, latest) {
        warn!(content_id = %meta.id, error = %e, "Failed to encode watched field, skipping show");
        return None;
    }
    Some(item)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use watch_sync_models::{HistoryAction, MetaKind, MetaVideo};

    fn at(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, day, 12, 0, 0).unwrap()
    }

    fn movie(id: &str, times_watched: u32, last_watched: Option<DateTime<Utc>>) -> LibraryItem {
        let mut item: LibraryItem =
            serde_json::from_value(serde_json::json!({"_id": id, "type": "movie", "name": id})).unwrap();
        item.state.times_watched = times_watched;
        item.state.last_watched = last_watched;
        item
    }

    fn series(id: &str, watched: Option<String>) -> LibraryItem {
        let mut item: LibraryItem =
            serde_json::from_value(serde_json::json!({"_id": id, "type": "series", "name": id})).unwrap();
        item.state.watched = watched;
        item.state.last_watched = Some(at(2));
        item
    }

    fn show_meta(id: &str, episodes: u32) -> Arc<Meta> {
        Arc::new(Meta {
            id: id.to_string(),
            kind: MetaKind::Series,
            name: "Show".to_string(),
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
        })
    }

    fn encoded(meta: &Meta, watched: &[usize]) -> String {
        let mut set = WatchedBitField::empty(meta.video_ids());
        for &i in watched {
            set.set(i, true);
        }
        set.encode().unwrap()
    }

    fn decoded(item: &LibraryItem, meta: &Meta) -> WatchedBitField {
        WatchedBitField::from_encoded(item.state.watched_field().unwrap(), meta.video_ids()).unwrap()
    }

    #[test]
    fn test_snapshot_filters_items() {
        let mut removed = movie("tt3", 1, None);
        removed.removed = true;
        let items = vec![
            movie("tt1", 1, None),
            movie("tt2", 1, None),
            removed,
            movie("yt_id:abc", 1, None),
            series("tt4", None),
        ];
        let include: Set<String> = ["tt1", "tt3", "tt4"].iter().map(|s| s.to_string()).collect();

        let snapshot = LibrarySnapshot::from_items(items.clone(), Some(&include));
        assert_eq!(snapshot.movies.len(), 1);
        assert_eq!(snapshot.series.len(), 1);

        let all = LibrarySnapshot::from_items(items, None);
        assert_eq!(all.len(), 3);
    }

    #[test]
    fn test_movies_merge_only_unwatched_targets() {
        let now = at(10);
        let source = vec![
            movie("tt1", 2, Some(at(5))),
            movie("tt2", 1, Some(at(6))),
            movie("tt3", 0, None),
            movie("tt4", 1, Some(at(3))),
        ];
        let target_items = vec![movie("tt1", 0, Some(at(7))), movie("tt2", 1, None)];
        let target: ItemIndex = target_items.iter().map(|m| (m.id.as_str(), m)).collect();

        let staged = merge_library_movies(&source, &target, now);
        assert_eq!(staged.len(), 2);

        let tt1 = staged.iter().find(|m| m.id == "tt1").unwrap();
        assert_eq!(tt1.state.times_watched, 1);
        assert_eq!(tt1.state.last_watched, Some(at(7)));
        assert_eq!(tt1.modified_at, Some(now));

        let tt4 = staged.iter().find(|m| m.id == "tt4").unwrap();
        assert_eq!(tt4.state.last_watched, Some(at(3)));
        assert_eq!(tt4.created_at, Some(now));

        // Running again against the staged target stages nothing
        let mut merged = target_items.clone();
        merged.retain(|m| !staged.iter().any(|s| s.id == m.id));
        merged.extend(staged.iter().cloned());
        let target: ItemIndex = merged.iter().map(|m| (m.id.as_str(), m)).collect();
        assert!(merge_library_movies(&source, &target, now).is_empty());
    }

    #[test]
    fn test_series_merge_is_union_and_idempotent() {
        let meta = show_meta("tt0944947", 4);
        let metas: HashMap<String, Arc<Meta>> = [(meta.id.clone(), meta.clone())].into_iter().collect();
        let now = at(10);

        let source = vec![series("tt0944947", Some(encoded(&meta, &[0, 1])))];
        let target_items = vec![series("tt0944947", Some(encoded(&meta, &[1, 2])))];
        let target: ItemIndex = target_items.iter().map(|s| (s.id.as_str(), s)).collect();

        let staged = merge_library_series(&source, &target, &metas, now);
        assert_eq!(staged.len(), 1);
        let merged = decoded(&staged[0], &meta);
        assert_eq!(
            merged.watched_video_ids().collect::<Vec<_>>(),
            vec!["tt0944947:1:1", "tt0944947:1:2", "tt0944947:1:3"]
        );
        assert_eq!(staged[0].state.video_id.as_deref(), Some("tt0944947:1:4"));

        // Running again against the merged target stages nothing
        let target: ItemIndex = staged.iter().map(|s| (s.id.as_str(), s)).collect();
        assert!(merge_library_series(&source, &target, &metas, now).is_empty());
    }

    #[test]
    fn test_series_merge_creates_missing_and_skips_without_meta() {
        let meta = show_meta("tt0944947", 2);
        let metas: HashMap<String, Arc<Meta>> = [(meta.id.clone(), meta.clone())].into_iter().collect();
        let source = vec![
            series("tt0944947", Some(encoded(&meta, &[0, 1]))),
            series("tt7777777", Some(encoded(&show_meta("tt7777777", 2), &[0]))),
            series("tt8888888", None),
        ];

        let staged = merge_library_series(&source, &ItemIndex::new(), &metas, at(10));
        assert_eq!(staged.len(), 1);
        assert_eq!(decoded(&staged[0], &meta).watched_video_ids().count(), 2);
        // Everything watched clears the next-episode pointer
        assert_eq!(staged[0].state.video_id, None);
    }

    #[test]
    fn test_missing_history_movies() {
        let movies = vec![movie("tt1", 1, Some(at(1))), movie("tt2", 1, None), movie("tt3", 0, None)];
        let history: Set<String> = ["tt2".to_string()].into_iter().collect();
        let missing = movies_missing_from_history(&movies, &history);
        assert_eq!(missing.len(), 1);
        assert_eq!(history_movie(missing[0]).watched_at, Some(at(1)));
    }

    #[test]
    fn test_missing_history_episodes_grouped_by_season() {
        let ids = vec![
            "tt1:0:1".to_string(),
            "tt1:1:1".to_string(),
            "tt1:1:2".to_string(),
            "tt1:2:1".to_string(),
            "tt1:2:2".to_string(),
        ];
        let watched = WatchedBitField::from_array(&[true, true, true, true, false], ids);
        let history: Set<String> = ["1:1".to_string()].into_iter().collect();

        let seasons = episodes_missing_from_history(&watched, &history);
        assert_eq!(
            seasons,
            vec![
                HistorySeason { number: 1, episodes: vec![2] },
                HistorySeason { number: 2, episodes: vec![1] },
            ]
        );
    }

    fn entry(content_id: &str, episode: Option<(u32, u32)>, watched_at: DateTime<Utc>) -> HistoryEntry {
        HistoryEntry {
            id: 1,
            content_id: content_id.to_string(),
            kind: if episode.is_some() { HistoryKind::Episode } else { HistoryKind::Movie },
            episode: episode.map(|(season, number)| EpisodeNumber { season, number }),
            watched_at,
            action: HistoryAction::Watch,
        }
    }

    #[test]
    fn test_history_movies_latest_watch_wins() {
        let entries = vec![
            entry("tt1", None, at(1)),
            entry("tt1", None, at(4)),
            entry("tt2", None, at(2)),
            entry("tt3", None, at(3)),
            entry("tt9", Some((1, 1)), at(5)),
        ];
        let watches = latest_movie_watches(&entries);
        assert_eq!(watches.len(), 3);
        assert_eq!(watches["tt1"], at(4));

        let library_items = vec![movie("tt2", 1, None), movie("tt3", 0, None)];
        let library: ItemIndex = library_items.iter().map(|m| (m.id.as_str(), m)).collect();
        let tt1_meta = Arc::new(Meta {
            id: "tt1".to_string(),
            kind: MetaKind::Movie,
            name: "Movie".to_string(),
            poster: Some("poster.jpg".to_string()),
            poster_shape: None,
            background: None,
            logo: None,
            release_info: None,
            videos: vec![],
        });
        let metas: HashMap<String, Arc<Meta>> = [("tt1".to_string(), tt1_meta)].into_iter().collect();

        let mut staged = merge_history_movies(&watches, &library, &metas, at(10));
        staged.sort_by(|a, b| a.id.cmp(&b.id));
        assert_eq!(staged.len(), 2);
        assert_eq!(staged[0].id, "tt1");
        assert_eq!(staged[0].poster.as_deref(), Some("poster.jpg"));
        assert_eq!(staged[0].state.last_watched, Some(at(4)));
        assert_eq!(staged[1].id, "tt3");
        assert_eq!(staged[1].state.times_watched, 1);
    }

    #[test]
    fn test_history_show_marks_new_episodes() {
        let meta = show_meta("tt0944947", 3);
        let existing = series("tt0944947", Some(encoded(&meta, &[0])));
        let episodes = vec![
            (EpisodeNumber { season: 1, number: 1 }, at(8)),
            (EpisodeNumber { season: 1, number: 2 }, at(5)),
            (EpisodeNumber { season: 4, number: 1 }, at(9)),
        ];

        let item = merge_history_show(&meta, &episodes, Some(&existing), at(10)).unwrap();
        let watched = decoded(&item, &meta);
        assert!(watched.get(1));
        assert!(!watched.get(2));
        assert_eq!(item.state.last_watched, Some(at(5)));
        assert_eq!(item.state.video_id.as_deref(), Some("tt0944947:1:3"));
        assert_eq!(item.modified_at, Some(at(10)));

        // Nothing new to mark
        assert!(merge_history_show(&meta, &episodes, Some(&item), at(11)).is_none());
    }

    #[test]
    fn test_history_show_creates_item_from_meta() {
        let meta = show_meta("tt0944947", 2);
        let episodes = vec![(EpisodeNumber { season: 1, number: 2 }, at(3))];
        let item = merge_history_show(&meta, &episodes, None, at(10)).unwrap();
        assert!(item.is_series());
        assert_eq!(item.created_at, Some(at(10)));
        assert_eq!(item.state.video_id.as_deref(), Some("tt0944947:1:1"));
        assert_eq!(episode_keys_by_show(&[entry("tt0944947", Some((1, 2)), at(3))])["tt0944947"].len(), 1);
    }
}
