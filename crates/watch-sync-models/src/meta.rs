use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum MetaKind {
    Movie,
    Series,
}

impl MetaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetaKind::Movie => "movie",
            MetaKind::Series => "series",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MetaVideo {
    pub id: String,
    #[serde(default)]
    pub season: u32,
    #[serde(default)]
    pub episode: u32,
}

/// Catalog metadata for a movie or series
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Meta {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: MetaKind,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poster: Option<String>,
    #[serde(rename = "posterShape", default, skip_serializing_if = "Option::is_none")]
    pub poster_shape: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub background: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logo: Option<String>,
    /// Release year, or a year range for series (`"2011-2019"`)
    #[serde(rename = "releaseInfo", default, skip_serializing_if = "Option::is_none")]
    pub release_info: Option<String>,
    #[serde(default)]
    pub videos: Vec<MetaVideo>,
}

impl Meta {
    /// Sort videos by season, then episode
    pub fn sort_videos(&mut self) {
        self.videos.sort_by(|a, b| a.season.cmp(&b.season).then(a.episode.cmp(&b.episode)));
    }

    /// Video ids in their current order
    pub fn video_ids(&self) -> Vec<String> {
        self.videos.iter().map(|v| v.id.clone()).collect()
    }
}
