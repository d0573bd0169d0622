pub mod bitfield;
pub mod engine;
pub mod id_map_storage;
pub mod id_resolver;
pub mod link_store;
pub mod meta_cache;
pub mod retry;
pub mod scheduler;
pub mod set;

pub use bitfield::{BitField8, BitfieldError, WatchedBitField, WatchedField};
pub use engine::{AccountSyncEngine, EngineSettings, HistorySyncEngine, LinkReport, SyncError, SyncMode, SyncSummary};
pub use id_map_storage::FileIdMapStore;
pub use id_resolver::IdResolver;
pub use link_store::JsonLinkStore;
pub use meta_cache::MetaCache;
pub use retry::with_rate_limit_retry;
pub use scheduler::{PassReport, Scheduler};
pub use set::Set;
