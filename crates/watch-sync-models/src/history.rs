use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum HistoryKind {
    Movie,
    Episode,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum HistoryAction {
    Watch,
    Scrobble,
    Checkin,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct EpisodeNumber {
    pub season: u32,
    pub number: u32,
}

/// One watch event on the history service.
///
/// `content_id` is the IMDB id of the movie, or of the show for episodes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryEntry {
    pub id: i64,
    pub content_id: String,
    pub kind: HistoryKind,
    pub episode: Option<EpisodeNumber>, // None for movies
    pub watched_at: DateTime<Utc>,
    pub action: HistoryAction,
}

impl HistoryEntry {
    /// `season:episode` key, `None` for movies
    pub fn episode_key(&self) -> Option<String> {
        self.episode.map(|e| format!("{}:{}", e.season, e.number))
    }
}

/// Narrows a history request to one item type (and optionally one item)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HistoryItemType {
    Movies,
    Shows,
}

impl HistoryItemType {
    pub fn as_str(&self) -> &'static str {
        match self {
            HistoryItemType::Movies => "movies",
            HistoryItemType::Shows => "shows",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistoryQuery {
    pub item_type: Option<HistoryItemType>,
    pub id: Option<u64>, // external id, only meaningful with item_type
    pub page: u32,
    pub limit: u32,
    pub start_at: Option<DateTime<Utc>>,
}

impl HistoryQuery {
    pub fn page(page: u32, limit: u32, start_at: Option<DateTime<Utc>>) -> Self {
        Self {
            page,
            limit,
            start_at,
            ..Self::default()
        }
    }

    /// One page of the history of a single movie or show
    pub fn for_item(item_type: HistoryItemType, id: u64, page: u32, limit: u32) -> Self {
        Self {
            item_type: Some(item_type),
            id: Some(id),
            page,
            limit,
            start_at: None,
        }
    }
}

/// One page of history as returned by the service.
///
/// `raw_count` is the number of items the service sent, before entries it
/// cannot map to a content id were dropped. Paging decisions use it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HistoryPage {
    pub entries: Vec<HistoryEntry>,
    pub raw_count: usize,
}

impl HistoryPage {
    /// True when the service sent fewer items than requested
    pub fn is_last(&self, limit: u32) -> bool {
        self.raw_count < limit.max(1) as usize
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryMovie {
    pub content_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub watched_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HistorySeason {
    pub number: u32,
    pub episodes: Vec<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HistoryShow {
    pub content_id: String,
    pub seasons: Vec<HistorySeason>,
}

impl HistoryShow {
    pub fn episode_count(&self) -> usize {
        self.seasons.iter().map(|s| s.episodes.len()).sum()
    }
}

/// Items to add to the history service in one call
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct HistoryBatch {
    pub movies: Vec<HistoryMovie>,
    pub shows: Vec<HistoryShow>,
}

impl HistoryBatch {
    pub fn is_empty(&self) -> bool {
        self.movies.is_empty() && self.shows.is_empty()
    }
}
