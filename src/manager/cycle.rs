//! One sync cycle: push pending records, then pull and merge the server's copy.

use std::collections::HashSet;
use uuid::Uuid;

use super::ListManager;
use crate::error::{ManagerError, ManagerResult, RemoteError};
use crate::models::{ListItem, ListShare, RecordKey, ShoppingList, SyncState};
use crate::sync::entity::SyncEntity;
use crate::sync::events::ChangeBatch;
use crate::sync::reconcile::{self, Plan};
use crate::sync::remote::RemoteClient;
use crate::sync::state::{self, PushKind};

/// What a sync cycle did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Pushes the server accepted.
    pub pushed: usize,
    /// Pushes the server refused; those records are now in the error state.
    pub rejected: usize,
    /// Pushes refused as stale, left for the pull to settle.
    pub conflicts: usize,
    /// Server records new to this device.
    pub inserted: usize,
    /// Local records replaced by newer server copies.
    pub updated: usize,
    /// Local records the server no longer has.
    pub purged: usize,
    /// Set when nothing ran: no remote or no attached user.
    pub skipped: bool,
}

impl SyncReport {
    fn skipped() -> Self {
        Self {
            skipped: true,
            ..Self::default()
        }
    }

    fn absorb<R>(&mut self, plan: &Plan<R>) {
        self.inserted += plan.insert.len();
        self.updated += plan.accept.len();
        self.purged += plan.purge.len();
    }
}

impl ListManager {
    /// Run a sync cycle now and wait for it.
    ///
    /// If a cycle is already running this waits for it to finish and reports
    /// its outcome instead of starting another.
    pub async fn force_sync(&self) -> ManagerResult<SyncReport> {
        match self.inner.cycle.try_lock() {
            Ok(_guard) => self.run_cycle().await,
            Err(_) => {
                tracing::debug!("Sync already running, waiting for it");
                let _guard = self.inner.cycle.lock().await;
                let session = self.session();
                match &session.last_error {
                    Some(error) => Err(ManagerError::Remote(error.clone())),
                    None => Ok(session.last_report.clone()),
                }
            }
        }
    }

    /// Poller entry point. Skips the tick when a cycle is already running.
    pub(super) async fn poll_tick(&self) {
        let Ok(_guard) = self.inner.cycle.try_lock() else {
            tracing::debug!("Skipping poll tick, sync in progress");
            return;
        };
        if let Err(e) = self.run_cycle().await {
            tracing::warn!("Sync cycle failed: {}", e);
        }
    }

    /// Caller holds the cycle lock.
    async fn run_cycle(&self) -> ManagerResult<SyncReport> {
        let Some(remote) = self.inner.remote.clone() else {
            return Ok(SyncReport::skipped());
        };
        let Some(user) = self.attached_user() else {
            tracing::debug!("No user attached, nothing to sync");
            return Ok(SyncReport::skipped());
        };

        let mut report = SyncReport::default();
        let result = match self.push_all(remote.as_ref(), &user.id, &mut report).await {
            Ok(()) => self.pull(remote.as_ref(), &user.id, &mut report).await,
            Err(e) => Err(e),
        };

        let mut session = self.session();
        match result {
            Ok(()) => {
                session.has_synced = true;
                session.initial_sync_error = None;
                session.last_error = None;
                session.last_report = report.clone();
                tracing::info!(
                    "Sync complete: {} pushed, {} rejected, {} new, {} updated, {} purged",
                    report.pushed,
                    report.rejected,
                    report.inserted,
                    report.updated,
                    report.purged
                );
                Ok(report)
            }
            Err(e) => {
                if !session.has_synced {
                    session.initial_sync_error = Some(e.to_string());
                }
                session.last_error = match &e {
                    ManagerError::Remote(remote_error) => Some(remote_error.clone()),
                    _ => None,
                };
                session.last_report = report;
                Err(e)
            }
        }
    }

    /// Lists first so the server knows every list before its items and shares.
    async fn push_all(
        &self,
        remote: &dyn RemoteClient,
        user_id: &str,
        report: &mut SyncReport,
    ) -> ManagerResult<()> {
        self.push_pending::<ShoppingList>(remote, user_id, report)
            .await?;
        self.push_pending::<ListItem>(remote, user_id, report)
            .await?;
        self.push_pending::<ListShare>(remote, user_id, report)
            .await
    }

    async fn push_pending<R: SyncEntity>(
        &self,
        remote: &dyn RemoteClient,
        user_id: &str,
        report: &mut SyncReport,
    ) -> ManagerResult<()> {
        let pending = {
            let _seq = self.inner.sequence.lock().await;
            R::pending(self.store(), user_id).await?
        };
        if !pending.is_empty() {
            tracing::debug!("Pushing {} pending {}s", pending.len(), R::KIND);
        }

        for record in pending {
            self.push_one::<R>(remote, user_id, record.key(), report)
                .await?;
        }
        Ok(())
    }

    /// Push one record. A network failure aborts the cycle; the record goes
    /// back to its pending state for the next one.
    async fn push_one<R: SyncEntity>(
        &self,
        remote: &dyn RemoteClient,
        user_id: &str,
        key: RecordKey,
        report: &mut SyncReport,
    ) -> ManagerResult<()> {
        let (kind, snapshot) = {
            let _seq = self.inner.sequence.lock().await;
            let Some(mut record) = R::load(self.store(), &key).await? else {
                return Ok(());
            };
            if record.owner() != Some(user_id) {
                return Ok(());
            }
            let Some(kind) = state::begin_push(record.state()) else {
                return Ok(());
            };
            let conflicted = self.session().conflicted.contains(&key);
            if kind != PushKind::Delete && conflicted {
                tracing::debug!("Holding back {} until the next pull", key);
                return Ok(());
            }

            record.set_state(kind.in_flight_state());
            record.save(self.store()).await?;
            {
                let mut session = self.session();
                session.requeue.remove(&key);
                session.waiters.start(&key);
            }
            (kind, record)
        };

        let outcome = snapshot.push(remote, user_id, kind).await;

        let _seq = self.inner.sequence.lock().await;
        let current = R::load(self.store(), &key).await?;
        let mut batch = ChangeBatch::new();

        match outcome {
            Ok(confirmed) => {
                report.pushed += 1;
                self.settle_success(kind, snapshot, confirmed, current, &mut batch)
                    .await?;
                self.session().waiters.resolve(&key, Ok(()));
            }
            Err(error @ RemoteError::Network(_)) => {
                let requeued = self.session().requeue.remove(&key);
                if let Some(mut current) = current {
                    let restored = if restored_during_delete(kind, current.state(), requeued) {
                        SyncState::PendingUpdate
                    } else {
                        state::after_network_failure(kind, current.state())
                    };
                    if restored != current.state() {
                        current.set_state(restored);
                        current.save(self.store()).await?;
                    }
                }
                self.session().waiters.retry(&key);
                tracing::warn!("Push of {} failed, will retry: {}", key, error);
                return Err(error.into());
            }
            Err(error @ RemoteError::Conflict(_)) => {
                report.conflicts += 1;
                let requeued = self.session().requeue.remove(&key);
                if let Some(mut current) = current {
                    if current.state() == kind.in_flight_state() {
                        let pending = match kind {
                            PushKind::Delete if !requeued => SyncState::PendingDelete,
                            _ => SyncState::PendingUpdate,
                        };
                        current.set_state(pending);
                        current.save(self.store()).await?;
                    }
                }
                {
                    let mut session = self.session();
                    if kind != PushKind::Delete {
                        session.conflicted.insert(key.clone());
                    }
                    session.waiters.retry(&key);
                }
                tracing::info!("Push of {} conflicts with the server: {}", key, error);
            }
            Err(error @ RemoteError::Rejected(_)) => {
                report.rejected += 1;
                let requeued = self.session().requeue.remove(&key);
                if let Some(mut current) = current {
                    if restored_during_delete(kind, current.state(), requeued) {
                        // The server kept the record the user asked for again
                        current.set_state(SyncState::PendingUpdate);
                        current.save(self.store()).await?;
                    } else if current.state() == kind.in_flight_state() {
                        current.set_state(SyncState::Error);
                        current.save(self.store()).await?;
                        batch.modified(current);
                    }
                }
                self.session().waiters.resolve(&key, Err(error.clone()));
                tracing::warn!("Server rejected {}: {}", key, error);
            }
        }

        self.inner.events.emit_batch(batch, true);
        Ok(())
    }

    /// Apply an accepted push. Caller holds the sequence.
    async fn settle_success<R: SyncEntity>(
        &self,
        kind: PushKind,
        snapshot: R,
        confirmed: Option<R>,
        current: Option<R>,
        batch: &mut ChangeBatch,
    ) -> ManagerResult<()> {
        let Some(current) = current else {
            return Ok(());
        };
        let key = current.key();

        if kind == PushKind::Delete {
            if current.state() != SyncState::Deleting {
                return Ok(());
            }
            let restored = {
                let mut session = self.session();
                session.conflicted.remove(&key);
                session.requeue.remove(&key)
            };
            if restored {
                let mut current = current;
                current.set_state(SyncState::PendingCreate);
                current.save(self.store()).await?;
                tracing::debug!("{} came back during its deletion, queued as new", key);
            } else {
                current.purge(self.store()).await?;
                self.session().waiters.forget(&key);
                tracing::debug!("Server confirmed deletion of {}", key);
            }
            return Ok(());
        }

        if current.state() != SyncState::Syncing {
            // Removed while in flight; the delete goes out next.
            return Ok(());
        }

        let edited_meanwhile = self.session().requeue.remove(&key);
        if edited_meanwhile {
            let mut current = current;
            current.set_state(SyncState::PendingUpdate);
            current.save(self.store()).await?;
            tracing::debug!("{} changed during its push, queued again", key);
            return Ok(());
        }

        let mut stored = confirmed.unwrap_or(snapshot);
        stored.set_owner(current.owner().map(str::to_string));
        stored.set_state(SyncState::Synced);
        stored.save(self.store()).await?;
        tracing::debug!("{} synced", key);
        batch.modified(stored);
        Ok(())
    }

    /// Fetch the user's lists, then the items and shares of each, and merge
    /// them. One batched notification is sent for everything merged.
    async fn pull(
        &self,
        remote: &dyn RemoteClient,
        user_id: &str,
        report: &mut SyncReport,
    ) -> ManagerResult<()> {
        let mut batch = ChangeBatch::new();
        let result = self.pull_into(remote, user_id, report, &mut batch).await;
        self.inner.events.emit_batch(batch, true);
        result
    }

    async fn pull_into(
        &self,
        remote: &dyn RemoteClient,
        user_id: &str,
        report: &mut SyncReport,
        batch: &mut ChangeBatch,
    ) -> ManagerResult<()> {
        let remote_lists = remote.fetch_lists(user_id).await?;
        let list_ids: Vec<Uuid> = remote_lists.iter().map(|list| list.id).collect();

        {
            let _seq = self.inner.sequence.lock().await;
            let local = self.store().lists_for_user(Some(user_id)).await?;
            let plan = self.plan_merge(&local, remote_lists);
            report.absorb(&plan);
            for list in &plan.purge {
                self.purge_children(list.id, batch).await?;
            }
            self.apply_plan(plan, user_id, batch).await?;
        }

        for list_id in list_ids {
            let list = {
                let _seq = self.inner.sequence.lock().await;
                self.store().get_list(list_id).await?
            };
            match list {
                Some(list) if !list.state.is_removed() => {}
                _ => continue,
            }

            let items = match remote.fetch_items(user_id, list_id).await {
                Ok(items) => items,
                Err(RemoteError::Network(e)) => return Err(RemoteError::Network(e).into()),
                Err(e) => {
                    tracing::warn!("Could not fetch items of list {}: {}", list_id, e);
                    continue;
                }
            };
            let shares = match remote.fetch_shares(user_id, list_id).await {
                Ok(shares) => shares,
                Err(RemoteError::Network(e)) => return Err(RemoteError::Network(e).into()),
                Err(e) => {
                    tracing::warn!("Could not fetch shares of list {}: {}", list_id, e);
                    continue;
                }
            };

            let _seq = self.inner.sequence.lock().await;
            let local_items = self.store().items_in_list(list_id).await?;
            let plan = self.plan_merge(&local_items, items);
            report.absorb(&plan);
            self.apply_plan(plan, user_id, batch).await?;

            let local_shares = self.store().shares_in_list(list_id).await?;
            let plan = self.plan_merge(&local_shares, shares);
            report.absorb(&plan);
            self.apply_plan(plan, user_id, batch).await?;

            let mut repairs = ChangeBatch::new();
            self.resolve_list(list_id, Some(user_id), true, &mut repairs)
                .await?;
            self.publish_local(repairs);
        }

        Ok(())
    }

    /// Plan a merge of a complete server listing into `local`.
    ///
    /// A conflicted record the listing no longer holds has nothing newer to
    /// lose against, so it is released and its edit pushed again.
    fn plan_merge<R: SyncEntity>(&self, local: &[R], remote: Vec<R>) -> Plan<R> {
        let mut session = self.session();
        let listed: HashSet<RecordKey> = remote.iter().map(|record| record.key()).collect();
        for record in local {
            let key = record.key();
            if !listed.contains(&key) && session.conflicted.remove(&key) {
                tracing::debug!("{} is gone from the server, pushing it again", key);
            }
        }
        reconcile::plan(local, remote, &session.conflicted, session.has_synced)
    }

    /// Write a merge plan. Caller holds the sequence.
    async fn apply_plan<R: SyncEntity>(
        &self,
        plan: Plan<R>,
        user_id: &str,
        batch: &mut ChangeBatch,
    ) -> ManagerResult<()> {
        let accepted: HashSet<RecordKey> = plan.accept.iter().map(|r| r.key()).collect();

        for mut record in plan.insert {
            record.set_owner(Some(user_id.to_string()));
            record.save(self.store()).await?;
            batch.added(record);
        }
        for mut record in plan.accept {
            record.set_owner(Some(user_id.to_string()));
            record.save(self.store()).await?;
            batch.modified(record);
        }
        for record in plan.purge {
            record.purge(self.store()).await?;
            batch.removed(record);
        }

        let mut session = self.session();
        for key in plan.settled_conflicts {
            session.conflicted.remove(&key);
            if accepted.contains(&key) {
                session.waiters.fail_queued(
                    &key,
                    RemoteError::Conflict(format!("{} was replaced by a newer server copy", key)),
                );
            }
        }
        Ok(())
    }
}

/// A record brought back while its delete was in flight.
fn restored_during_delete(kind: PushKind, current: SyncState, requeued: bool) -> bool {
    kind == PushKind::Delete && requeued && current == SyncState::Deleting
}
