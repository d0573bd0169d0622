pub mod history;
pub mod id_map;
pub mod library;
pub mod link;
pub mod meta;
pub mod video_id;

pub use history::{EpisodeNumber, HistoryAction, HistoryBatch, HistoryEntry, HistoryItemType, HistoryKind, HistoryMovie, HistoryPage, HistoryQuery, HistorySeason, HistoryShow};
pub use id_map::{IdMap, IdType, ItemKind};
pub use library::{ItemTimestamp, LibraryItem, LibraryItemState, LibraryItemType};
pub use link::{AccountDirection, AccountLink, HistoryDirection, HistoryLink, Link, LinkKey, SyncConfig, SyncDirection, SyncState};
pub use meta::{Meta, MetaKind, MetaVideo};
pub use video_id::VideoId;
