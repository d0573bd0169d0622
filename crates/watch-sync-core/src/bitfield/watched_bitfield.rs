use std::fmt;
use super::{BitField8, BitfieldError, WatchedField};

/// Which videos of a series have been watched, addressed by position in the
/// episode ordering or by video id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchedBitField {
    bitfield: BitField8,
    video_ids: Vec<String>,
}

impl WatchedBitField {
    pub fn new(bitfield: BitField8, video_ids: Vec<String>) -> Self {
        Self { bitfield, video_ids }
    }

    /// Nothing watched
    pub fn empty(video_ids: Vec<String>) -> Self {
        Self::new(BitField8::new(video_ids.len()), video_ids)
    }

    pub fn from_array(values: &[bool], video_ids: Vec<String>) -> Self {
        let mut bitfield = BitField8::new(video_ids.len());
        for (i, &v) in values.iter().enumerate() {
            bitfield.set(i, v);
        }
        Self::new(bitfield, video_ids)
    }

    /// Decode a stored watched field against the current episode ordering
    pub fn from_encoded(encoded: &str, video_ids: Vec<String>) -> Result<Self, BitfieldError> {
        let field: WatchedField = encoded.parse()?;
        Ok(field.into_watched_bitfield(video_ids))
    }

    pub fn get(&self, idx: usize) -> bool {
        self.bitfield.get(idx)
    }

    pub fn set(&mut self, idx: usize, value: bool) {
        self.bitfield.set(idx, value);
    }

    fn position(&self, video_id: &str) -> Option<usize> {
        self.video_ids.iter().position(|id| id == video_id)
    }

    pub fn get_video(&self, video_id: &str) -> bool {
        self.position(video_id)
            .map(|pos| self.bitfield.get(pos))
            .unwrap_or(false)
    }

    /// Unknown ids are ignored
    pub fn set_video(&mut self, video_id: &str, value: bool) {
        if let Some(pos) = self.position(video_id) {
            self.bitfield.set(pos, value);
        }
    }

    pub fn bitfield(&self) -> &BitField8 {
        &self.bitfield
    }

    pub fn video_ids(&self) -> &[String] {
        &self.video_ids
    }

    pub fn len(&self) -> usize {
        self.video_ids.len()
    }

    /// True when no video is marked watched
    pub fn is_empty(&self) -> bool {
        self.bitfield.first_index_of(true).is_none()
    }

    /// Id at the first unwatched position, `None` when every video is watched
    pub fn first_unwatched_video_id(&self) -> Option<&str> {
        self.video_ids
            .iter()
            .enumerate()
            .find(|(i, _)| !self.bitfield.get(*i))
            .map(|(_, id)| id.as_str())
    }

    pub fn watched_video_ids(&self) -> impl Iterator<Item = &str> + '_ {
        self.video_ids
            .iter()
            .enumerate()
            .filter(|(i, _)| self.bitfield.get(*i))
            .map(|(_, id)| id.as_str())
    }

    pub fn encode(&self) -> Result<String, BitfieldError> {
        WatchedField::from(self).encode()
    }
}

impl fmt::Display for WatchedBitField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let encoded = self.encode().map_err(|_| fmt::Error)?;
        f.write_str(&encoded)
    }
}
