//! Merging fetched server records into the local store.
//!
//! Planning is pure: [`plan`] compares a remote batch with the local records of
//! the same scope and says what to write. The manager applies the plan under
//! its processing sequence and emits one batched notification.

use std::collections::{HashMap, HashSet};

use crate::models::{Record, RecordKey, SyncState};

/// What to do with one remote record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// No local copy: store the remote record as synced.
    Insert,
    /// Replace the local copy with the remote record.
    AcceptRemote,
    /// A local edit is waiting to be pushed and wins.
    KeepLocal,
    /// The local record is being deleted; the delete proceeds.
    Discard,
}

/// Is `remote` strictly newer than `local`?
///
/// Records without timestamps (shares) count as newer whenever their content differs.
fn remote_is_newer<R: Record>(local: &R, remote: &R) -> bool {
    match (local.modified(), remote.modified()) {
        (Some(local_at), Some(remote_at)) => remote_at > local_at,
        _ => !local.same_content(remote),
    }
}

/// Decide for a single record. `conflicted` is set when the server rejected
/// the last push of this record as stale.
pub fn decide<R: Record>(local: Option<&R>, remote: &R, conflicted: bool) -> Decision {
    let Some(local) = local else {
        return Decision::Insert;
    };

    match local.state() {
        SyncState::Synced | SyncState::Error => {
            if remote_is_newer(local, remote) {
                Decision::AcceptRemote
            } else {
                Decision::KeepLocal
            }
        }
        SyncState::PendingCreate | SyncState::PendingUpdate | SyncState::Syncing => {
            if conflicted && remote_is_newer(local, remote) {
                Decision::AcceptRemote
            } else {
                Decision::KeepLocal
            }
        }
        SyncState::PendingDelete | SyncState::Deleting | SyncState::Deleted => Decision::Discard,
    }
}

#[derive(Debug, Clone)]
pub struct Plan<R> {
    pub insert: Vec<R>,
    /// Remote copies replacing local ones.
    pub accept: Vec<R>,
    /// Local synced records missing from a complete remote listing.
    pub purge: Vec<R>,
    pub kept_local: usize,
    pub discarded: usize,
    /// Conflicted keys that this plan settles, whichever side won.
    pub settled_conflicts: Vec<RecordKey>,
}

impl<R> Default for Plan<R> {
    fn default() -> Self {
        Self {
            insert: Vec::new(),
            accept: Vec::new(),
            purge: Vec::new(),
            kept_local: 0,
            discarded: 0,
            settled_conflicts: Vec::new(),
        }
    }
}

impl<R> Plan<R> {
    pub fn is_noop(&self) -> bool {
        self.insert.is_empty() && self.accept.is_empty() && self.purge.is_empty()
    }
}

/// Plan the merge of `remote` into `local`.
///
/// `local` must hold every local record of the fetched scope. When
/// `purge_absent` is set the remote batch is treated as a complete listing and
/// synced local records it does not mention are purged.
pub fn plan<R: Record>(
    local: &[R],
    remote: Vec<R>,
    conflicted: &HashSet<RecordKey>,
    purge_absent: bool,
) -> Plan<R> {
    let local_by_key: HashMap<RecordKey, &R> = local.iter().map(|r| (r.key(), r)).collect();
    let mut seen: HashSet<RecordKey> = HashSet::with_capacity(remote.len());
    let mut plan = Plan::default();

    for mut record in remote {
        let key = record.key();
        let is_conflicted = conflicted.contains(&key);
        let existing = local_by_key.get(&key).copied();
        if !seen.insert(key.clone()) {
            continue;
        }

        match decide(existing, &record, is_conflicted) {
            Decision::Insert => {
                record.set_state(SyncState::Synced);
                plan.insert.push(record);
            }
            Decision::AcceptRemote => {
                record.set_state(SyncState::Synced);
                plan.accept.push(record);
            }
            Decision::KeepLocal => plan.kept_local += 1,
            Decision::Discard => plan.discarded += 1,
        }
        if is_conflicted {
            plan.settled_conflicts.push(key);
        }
    }

    if purge_absent {
        plan.purge = local
            .iter()
            .filter(|r| r.state() == SyncState::Synced && !seen.contains(&r.key()))
            .cloned()
            .collect();
    }

    plan
}
