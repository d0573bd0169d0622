use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use super::{BitField8, BitfieldError, WatchedBitField};

/// Anchor written when there are no videos at all
pub const UNDEFINED_ANCHOR: &str = "undefined";

/// Serialized watched state, `{anchor_video}:{anchor_length}:{bitfield}`.
///
/// The anchor is the last watched video and `anchor_length` its position
/// plus one. Decoding needs no video list; [`WatchedField::into_watched_bitfield`]
/// realigns the bits against the current episode ordering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchedField {
    pub anchor_video: String,
    pub anchor_length: usize,
    pub bitfield: BitField8,
}

impl WatchedField {
    pub fn encode(&self) -> Result<String, BitfieldError> {
        Ok(format!(
            "{}:{}:{}",
            self.anchor_video,
            self.anchor_length,
            self.bitfield.encode()?
        ))
    }

    /// Map the stored bits onto `video_ids`.
    ///
    /// Episodes inserted or removed before the anchor shift every position;
    /// the anchor's new index gives the offset to apply. When the anchor is no
    /// longer listed nothing can be aligned and the result is all-false.
    pub fn into_watched_bitfield(self, video_ids: Vec<String>) -> WatchedBitField {
        let Some(anchor_idx) = video_ids.iter().position(|id| *id == self.anchor_video) else {
            return WatchedBitField::empty(video_ids);
        };

        let bitfield = BitField8::with_values(self.bitfield.into_bytes(), video_ids.len());
        let offset = self.anchor_length as i64 - anchor_idx as i64 - 1;
        if offset == 0 {
            return WatchedBitField::new(bitfield, video_ids);
        }

        let mut realigned = BitField8::new(video_ids.len());
        for i in 0..video_ids.len() {
            let prev = i as i64 + offset;
            if prev >= 0 && (prev as usize) < bitfield.len() {
                realigned.set(i, bitfield.get(prev as usize));
            }
        }
        WatchedBitField::new(realigned, video_ids)
    }
}

impl From<&WatchedBitField> for WatchedField {
    /// Anchors on the last watched video, or on the first video with length
    /// 1 when nothing is watched
    fn from(watched: &WatchedBitField) -> Self {
        let last = watched.bitfield().last_index_of(true).unwrap_or(0);
        let anchor_video = watched
            .video_ids()
            .get(last)
            .cloned()
            .unwrap_or_else(|| UNDEFINED_ANCHOR.to_string());
        Self {
            anchor_video,
            anchor_length: last + 1,
            bitfield: watched.bitfield().clone(),
        }
    }
}

impl FromStr for WatchedField {
    type Err = BitfieldError;

    /// The anchor id may itself contain `:`, so the last two components are
    /// taken from the right and the rest is rejoined.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let components: Vec<&str> = s.split(':').collect();
        if components.len() < 3 {
            return Err(BitfieldError::InvalidFormat("not enough components".to_string()));
        }

        let n = components.len();
        let anchor_length = components[n - 2]
            .parse::<usize>()
            .map_err(|e| BitfieldError::InvalidFormat(format!("cannot parse the length field: {}", e)))?;
        let bitfield = BitField8::from_encoded(components[n - 1], 0)?;

        Ok(Self {
            anchor_video: components[..n - 2].join(":"),
            anchor_length,
            bitfield,
        })
    }
}

impl fmt::Display for WatchedField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let encoded = self.encode().map_err(|_| fmt::Error)?;
        f.write_str(&encoded)
    }
}

impl Serialize for WatchedField {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let encoded = self.encode().map_err(serde::ser::Error::custom)?;
        serializer.serialize_str(&encoded)
    }
}

impl<'de> Deserialize<'de> for WatchedField {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}
