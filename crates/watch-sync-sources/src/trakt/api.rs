use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;
use watch_sync_models::{
    EpisodeNumber, HistoryAction, HistoryBatch, HistoryEntry, HistoryKind, HistoryPage,
};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TraktIds {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trakt: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub imdb: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tmdb: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tvdb: Option<u64>,
}

impl TraktIds {
    fn imdb(id: &str) -> Self {
        Self {
            imdb: Some(id.to_string()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct TraktItem {
    #[serde(default)]
    pub ids: TraktIds,
}

#[derive(Debug, Deserialize)]
pub struct TraktEpisode {
    pub season: u32,
    pub number: u32,
}

#[derive(Debug, Deserialize)]
pub struct TraktHistoryItem {
    pub id: i64,
    pub watched_at: DateTime<Utc>,
    pub action: HistoryAction,
    #[serde(rename = "type")]
    pub item_type: HistoryKind,
    pub movie: Option<TraktItem>,
    pub show: Option<TraktItem>,
    pub episode: Option<TraktEpisode>,
}

/// Trakt sometimes returns IMDB ids with stray slashes
fn clean_imdb(id: &str) -> String {
    id.replace('/', "")
}

impl TraktHistoryItem {
    /// Convert to a [`HistoryEntry`]; items without an IMDB id are dropped
    pub fn into_entry(self) -> Option<HistoryEntry> {
        let (content_id, episode) = match self.item_type {
            HistoryKind::Movie => (self.movie?.ids.imdb?, None),
            HistoryKind::Episode => {
                let episode = self.episode?;
                (
                    self.show?.ids.imdb?,
                    Some(EpisodeNumber {
                        season: episode.season,
                        number: episode.number,
                    }),
                )
            }
        };
        let content_id = clean_imdb(&content_id);
        if content_id.is_empty() {
            return None;
        }
        Some(HistoryEntry {
            id: self.id,
            content_id,
            kind: self.item_type,
            episode,
            watched_at: self.watched_at,
            action: self.action,
        })
    }
}

pub fn into_page(items: Vec<TraktHistoryItem>) -> HistoryPage {
    let raw_count = items.len();
    let entries = items
        .into_iter()
        .filter_map(TraktHistoryItem::into_entry)
        .collect::<Vec<_>>();
    if entries.len() < raw_count {
        debug!(dropped = raw_count - entries.len(), "Dropped history items without an IMDB id");
    }
    HistoryPage { entries, raw_count }
}

#[derive(Debug, Serialize)]
pub struct SyncMovie {
    pub ids: TraktIds,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub watched_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct SyncEpisode {
    pub number: u32,
}

#[derive(Debug, Serialize)]
pub struct SyncSeason {
    pub number: u32,
    pub episodes: Vec<SyncEpisode>,
}

#[derive(Debug, Serialize)]
pub struct SyncShow {
    pub ids: TraktIds,
    pub seasons: Vec<SyncSeason>,
}

/// Body of `POST /sync/history`
#[derive(Debug, Serialize)]
pub struct AddHistoryRequest {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub movies: Vec<SyncMovie>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub shows: Vec<SyncShow>,
}

impl From<&HistoryBatch> for AddHistoryRequest {
    fn from(batch: &HistoryBatch) -> Self {
        Self {
            movies: batch
                .movies
                .iter()
                .map(|m| SyncMovie {
                    ids: TraktIds::imdb(&m.content_id),
                    watched_at: m.watched_at,
                })
                .collect(),
            shows: batch
                .shows
                .iter()
                .map(|s| SyncShow {
                    ids: TraktIds::imdb(&s.content_id),
                    seasons: s
                        .seasons
                        .iter()
                        .map(|season| SyncSeason {
                            number: season.number,
                            episodes: season.episodes.iter().map(|&number| SyncEpisode { number }).collect(),
                        })
                        .collect(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct AddedCounts {
    #[serde(default)]
    pub movies: u32,
    #[serde(default)]
    pub episodes: u32,
}

#[derive(Debug, Deserialize)]
pub struct AddHistoryResponse {
    #[serde(default)]
    pub added: AddedCounts,
}

#[derive(Debug, Deserialize)]
pub struct LookupResult {
    pub movie: Option<TraktItem>,
    pub show: Option<TraktItem>,
}

impl LookupResult {
    pub fn trakt_id(&self) -> Option<u64> {
        self.movie
            .as_ref()
            .or(self.show.as_ref())
            .and_then(|item| item.ids.trakt)
    }
}
