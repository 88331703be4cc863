use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Where a locally stored record stands relative to the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    /// Created locally, never confirmed by the server.
    #[default]
    PendingCreate,
    /// Modified locally since the last confirmed push.
    PendingUpdate,
    /// A create or update push is in flight.
    Syncing,
    /// Matches what the server last confirmed.
    Synced,
    /// Removed locally, the server has not been told yet.
    PendingDelete,
    /// A delete push is in flight.
    Deleting,
    /// Confirmed deleted. Records are purged on reaching this state.
    Deleted,
    /// The server rejected the last push; waits for an explicit edit or removal.
    Error,
}

impl SyncState {
    pub const ALL: [SyncState; 8] = [
        SyncState::PendingCreate,
        SyncState::PendingUpdate,
        SyncState::Syncing,
        SyncState::Synced,
        SyncState::PendingDelete,
        SyncState::Deleting,
        SyncState::Deleted,
        SyncState::Error,
    ];

    /// States the scheduler picks up on each push pass.
    pub const PUSHABLE: [SyncState; 3] = [
        SyncState::PendingCreate,
        SyncState::PendingUpdate,
        SyncState::PendingDelete,
    ];

    /// States whose records have been removed from the caller's point of view.
    pub const REMOVED: [SyncState; 3] = [
        SyncState::PendingDelete,
        SyncState::Deleting,
        SyncState::Deleted,
    ];

    /// Stable integer code stored in the `sync_state` column.
    pub fn code(self) -> i64 {
        match self {
            SyncState::PendingCreate => 0,
            SyncState::PendingUpdate => 1,
            SyncState::Syncing => 2,
            SyncState::Synced => 3,
            SyncState::PendingDelete => 4,
            SyncState::Deleting => 5,
            SyncState::Deleted => 6,
            SyncState::Error => 7,
        }
    }

    pub fn from_code(code: i64) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.code() == code)
    }

    /// True while the record carries local changes the server has not confirmed.
    pub fn has_local_changes(self) -> bool {
        matches!(
            self,
            SyncState::PendingCreate | SyncState::PendingUpdate | SyncState::Syncing
        )
    }

    pub fn is_removed(self) -> bool {
        Self::REMOVED.contains(&self)
    }

    pub fn is_in_flight(self) -> bool {
        matches!(self, SyncState::Syncing | SyncState::Deleting)
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SyncState::PendingCreate => "pending-create",
            SyncState::PendingUpdate => "pending-update",
            SyncState::Syncing => "syncing",
            SyncState::Synced => "synced",
            SyncState::PendingDelete => "pending-delete",
            SyncState::Deleting => "deleting",
            SyncState::Deleted => "deleted",
            SyncState::Error => "error",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for SyncState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|state| state.to_string() == s.to_lowercase())
            .ok_or_else(|| format!("Invalid sync state '{}'", s))
    }
}
