use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use crate::meta::Meta;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum LibraryItemType {
    Movie,
    Series,
    #[serde(other)]
    Other,
}

/// Playback state of a library item as stored by the library service.
///
/// `watched` carries the anchored watched-bitfield text for series
/// (`{anchor_video}:{anchor_length}:{bitfield}`).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct LibraryItemState {
    #[serde(rename = "lastWatched", default)]
    pub last_watched: Option<DateTime<Utc>>,
    #[serde(rename = "timesWatched", default)]
    pub times_watched: u32,
    #[serde(default)]
    pub watched: Option<String>,
    #[serde(default)]
    pub video_id: Option<String>,
    /// Fields owned by the library service that we never interpret
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl LibraryItemState {
    /// Returns the watched field, treating an empty string as absent
    pub fn watched_field(&self) -> Option<&str> {
        self.watched.as_deref().filter(|w| !w.is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LibraryItem {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "type")]
    pub item_type: LibraryItemType,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poster: Option<String>,
    #[serde(rename = "posterShape", default, skip_serializing_if = "Option::is_none")]
    pub poster_shape: Option<String>,
    #[serde(default)]
    pub removed: bool,
    #[serde(default)]
    pub temp: bool,
    #[serde(rename = "_ctime", default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(rename = "_mtime", default)]
    pub modified_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub state: LibraryItemState,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl LibraryItem {
    /// Build a fresh library item for content the library has never seen
    pub fn from_meta(meta: &Meta, now: DateTime<Utc>) -> Self {
        let item_type = match meta.kind {
            crate::MetaKind::Movie => LibraryItemType::Movie,
            crate::MetaKind::Series => LibraryItemType::Series,
        };
        let mut extra = Map::new();
        let artwork = [("background", &meta.background), ("logo", &meta.logo), ("year", &meta.release_info)];
        for (field, value) in artwork {
            if let Some(value) = value.as_deref().filter(|v| !v.is_empty()) {
                extra.insert(field.to_string(), Value::from(value));
            }
        }
        Self {
            id: meta.id.clone(),
            item_type,
            name: meta.name.clone(),
            poster: meta.poster.clone(),
            poster_shape: meta.poster_shape.clone(),
            removed: false,
            temp: false,
            created_at: Some(now),
            modified_at: Some(now),
            state: LibraryItemState::default(),
            extra,
        }
    }

    /// Copy of `source` with its playback state cleared, used when the target
    /// account lacks the item entirely
    pub fn blank_copy_of(source: &LibraryItem, now: DateTime<Utc>) -> Self {
        Self {
            state: LibraryItemState::default(),
            removed: false,
            temp: false,
            created_at: Some(now),
            modified_at: Some(now),
            ..source.clone()
        }
    }

    pub fn is_movie(&self) -> bool {
        self.item_type == LibraryItemType::Movie
    }

    pub fn is_series(&self) -> bool {
        self.item_type == LibraryItemType::Series
    }

    /// Only IMDB-keyed items take part in watched sync
    pub fn has_imdb_id(&self) -> bool {
        self.id.starts_with("tt")
    }
}

/// Modification timestamp of a single library item
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ItemTimestamp {
    pub id: String,
    pub modified_at: DateTime<Utc>,
}
