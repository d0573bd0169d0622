use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier namespaces understood by the history service's lookup API
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum IdType {
    Imdb,
    Trakt,
    Tmdb,
    Tvdb,
}

impl IdType {
    pub fn as_str(&self) -> &'static str {
        match self {
            IdType::Imdb => "imdb",
            IdType::Trakt => "trakt",
            IdType::Tmdb => "tmdb",
            IdType::Tvdb => "tvdb",
        }
    }
}

impl fmt::Display for IdType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Movie,
    Show,
}

impl ItemKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemKind::Movie => "movie",
            ItemKind::Show => "show",
        }
    }
}

/// Mapping between a content id (IMDB) and the history service's own id
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct IdMap {
    pub content_id: String,
    pub external_id: u64,
    pub kind: ItemKind,
}

impl IdMap {
    pub fn new(content_id: impl Into<String>, external_id: u64, kind: ItemKind) -> Self {
        Self {
            content_id: content_id.into(),
            external_id,
            kind,
        }
    }
}
