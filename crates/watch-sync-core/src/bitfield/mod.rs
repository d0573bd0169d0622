//! Watched-state encoding shared with the media-library service.
//!
//! Series progress is stored as `{anchor_video}:{anchor_length}:{bitfield}`
//! where the bitfield is base64(zlib(bytes)). The anchor lets a stored field
//! be realigned when episodes are added to or removed from the ordering.

mod bitfield8;
mod error;
mod watched_bitfield;
mod watched_field;

pub use bitfield8::BitField8;
pub use error::BitfieldError;
pub use watched_bitfield::WatchedBitField;
pub use watched_field::{WatchedField, UNDEFINED_ANCHOR};
