use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Common behaviour of the per-link direction flags
pub trait SyncDirection: fmt::Debug + Copy + Send + Sync {
    fn is_disabled(&self) -> bool;
}

/// Direction of a link between two library accounts
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum AccountDirection {
    #[default]
    None,
    AToB,
    BToA,
    Both,
}

impl AccountDirection {
    pub fn syncs_a_to_b(&self) -> bool {
        matches!(self, AccountDirection::AToB | AccountDirection::Both)
    }

    pub fn syncs_b_to_a(&self) -> bool {
        matches!(self, AccountDirection::BToA | AccountDirection::Both)
    }
}

impl SyncDirection for AccountDirection {
    fn is_disabled(&self) -> bool {
        *self == AccountDirection::None
    }
}

/// Direction of a link between a library account and a history account
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum HistoryDirection {
    #[default]
    None,
    LibraryToHistory,
    HistoryToLibrary,
    Both,
}

impl HistoryDirection {
    pub fn syncs_to_history(&self) -> bool {
        matches!(self, HistoryDirection::LibraryToHistory | HistoryDirection::Both)
    }

    pub fn syncs_to_library(&self) -> bool {
        matches!(self, HistoryDirection::HistoryToLibrary | HistoryDirection::Both)
    }
}

impl SyncDirection for HistoryDirection {
    fn is_disabled(&self) -> bool {
        *self == HistoryDirection::None
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SyncConfig<D> {
    #[serde(rename = "dir")]
    pub direction: D,
    /// Content ids to keep in sync (account links only)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ids: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SyncState {
    pub last_synced_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LinkKey {
    pub side_a_id: String,
    pub side_b_id: String,
}

impl fmt::Display for LinkKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}<->{}", self.side_a_id, self.side_b_id)
    }
}

/// A pair of linked accounts and its reconciliation progress.
///
/// For history links, side A is the library account and side B the
/// history account.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Link<D> {
    pub side_a_id: String,
    pub side_b_id: String,
    pub sync_config: SyncConfig<D>,
    #[serde(default)]
    pub sync_state: SyncState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl<D> Link<D> {
    pub fn key(&self) -> LinkKey {
        LinkKey {
            side_a_id: self.side_a_id.clone(),
            side_b_id: self.side_b_id.clone(),
        }
    }
}

pub type AccountLink = Link<AccountDirection>;
pub type HistoryLink = Link<HistoryDirection>;
