use std::fmt;

/// Canonical `{content_id}:{season}:{episode}` video identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VideoId {
    pub content_id: String,
    pub season: u32,
    pub episode: u32,
}

impl VideoId {
    pub fn new(content_id: impl Into<String>, season: u32, episode: u32) -> Self {
        Self {
            content_id: content_id.into(),
            season,
            episode,
        }
    }

    /// Parse from the right so that content ids containing `:` survive.
    /// Returns `None` when season or episode are not numbers.
    pub fn parse(s: &str) -> Option<Self> {
        let mut parts = s.rsplitn(3, ':');
        let episode = parts.next()?.parse().ok()?;
        let season = parts.next()?.parse().ok()?;
        let content_id = parts.next()?;
        if content_id.is_empty() {
            return None;
        }
        Some(Self::new(content_id, season, episode))
    }

    /// `season:episode` key used when comparing against history entries
    pub fn episode_key(&self) -> String {
        format!("{}:{}", self.season, self.episode)
    }
}

impl fmt::Display for VideoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.content_id, self.season, self.episode)
    }
}
