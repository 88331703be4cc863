//! Per-record sync lifecycle.
//!
//! ```text
//! PendingCreate ─┐                 ┌─> Synced ──(edit)──> PendingUpdate
//! PendingUpdate ─┴─> Syncing ──────┼─> Error (rejected)
//!                                  └─> back to pending (network failure)
//! PendingDelete ───> Deleting ─────┬─> purged
//!                                  ├─> Error (rejected)
//!                                  └─> PendingDelete (network failure)
//! ```

use crate::models::SyncState;

/// The kind of push a pending record needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushKind {
    Create,
    Update,
    Delete,
}

impl PushKind {
    /// The state a record moves to when this push is pending.
    pub fn pending_state(self) -> SyncState {
        match self {
            PushKind::Create => SyncState::PendingCreate,
            PushKind::Update => SyncState::PendingUpdate,
            PushKind::Delete => SyncState::PendingDelete,
        }
    }

    /// The state a record holds while this push is in flight.
    pub fn in_flight_state(self) -> SyncState {
        match self {
            PushKind::Create | PushKind::Update => SyncState::Syncing,
            PushKind::Delete => SyncState::Deleting,
        }
    }
}

/// Which push, if any, the scheduler should start for a record in `state`.
pub fn begin_push(state: SyncState) -> Option<PushKind> {
    match state {
        SyncState::PendingCreate => Some(PushKind::Create),
        SyncState::PendingUpdate => Some(PushKind::Update),
        SyncState::PendingDelete => Some(PushKind::Delete),
        _ => None,
    }
}

/// What a local edit does to a record's state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditOutcome {
    /// Store the edit with this state.
    Pending(SyncState),
    /// A push is in flight: store the edit, keep the state, and requeue once
    /// the push completes.
    QueuedBehindPush,
    /// The record is on its way out and cannot be edited.
    Removed,
}

pub fn after_local_edit(state: SyncState) -> EditOutcome {
    match state {
        SyncState::PendingCreate => EditOutcome::Pending(SyncState::PendingCreate),
        SyncState::PendingUpdate | SyncState::Synced | SyncState::Error => {
            EditOutcome::Pending(SyncState::PendingUpdate)
        }
        SyncState::Syncing => EditOutcome::QueuedBehindPush,
        SyncState::PendingDelete | SyncState::Deleting | SyncState::Deleted => {
            EditOutcome::Removed
        }
    }
}

/// Like [`after_local_edit`], but an edit that brings a removed record back.
///
/// A pending delete turns into an update of the server's copy. A delete in
/// flight keeps its state; once the server confirms it the record is created
/// again.
pub fn after_local_restore(state: SyncState) -> EditOutcome {
    match state {
        SyncState::PendingDelete => EditOutcome::Pending(SyncState::PendingUpdate),
        SyncState::Deleting => EditOutcome::QueuedBehindPush,
        SyncState::Deleted => EditOutcome::Pending(SyncState::PendingCreate),
        other => after_local_edit(other),
    }
}

/// What a local removal does to a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveOutcome {
    /// The server never saw the record: drop it now.
    Purge,
    /// Tell the server on the next push.
    MarkPendingDelete,
    /// Already removed.
    AlreadyRemoved,
}

pub fn after_local_remove(state: SyncState) -> RemoveOutcome {
    match state {
        SyncState::PendingCreate => RemoveOutcome::Purge,
        SyncState::PendingUpdate
        | SyncState::Syncing
        | SyncState::Synced
        | SyncState::Error => RemoveOutcome::MarkPendingDelete,
        SyncState::PendingDelete | SyncState::Deleting | SyncState::Deleted => {
            RemoveOutcome::AlreadyRemoved
        }
    }
}

/// The state to restore after a push of `kind` failed with a network error.
///
/// Only applies when the record still holds the in-flight state; an edit or
/// removal made during the push has already moved it on.
pub fn after_network_failure(kind: PushKind, current: SyncState) -> SyncState {
    if current == kind.in_flight_state() {
        kind.pending_state()
    } else {
        current
    }
}

/// State for a record left in flight by an interrupted process.
pub fn recover_interrupted(state: SyncState) -> Option<SyncState> {
    match state {
        SyncState::Syncing => Some(SyncState::PendingCreate),
        SyncState::Deleting => Some(SyncState::PendingDelete),
        _ => None,
    }
}
