//! The list manager: the public surface over the local store and the sync engine.
//!
//! Every mutation is written to the store and announced to subscribers before
//! it returns. Pushing it to the server happens later, on a sync cycle; the
//! returned [`PushHandle`] resolves once the server has accepted or refused it.
//!
//! All store access goes through one processing sequence (an async mutex), so
//! local writes, push bookkeeping and merges never interleave. Remote calls run
//! outside the sequence.

mod cycle;
mod items;
mod lists;
mod shares;
mod users;

#[cfg(test)]
mod test_support;

pub use cycle::SyncReport;

use futures::FutureExt;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{broadcast, oneshot, watch, Notify};

use crate::error::{ManagerError, ManagerResult, RemoteError, RemoteResult};
use crate::models::{Record, RecordKey, SyncState, User};
use crate::store::RecordStore;
use crate::sync::entity::SyncEntity;
use crate::sync::events::{ChangeBatch, ChangeEvent, EventBus};
use crate::sync::poller::{self, PollIntervals, PollRate};
use crate::sync::remote::RemoteClient;
use crate::sync::state::{self, EditOutcome, RemoveOutcome};

type Confirm = oneshot::Sender<RemoteResult<()>>;

/// Callers waiting for the server's answer, per record.
#[derive(Default)]
struct Waiters {
    queued: HashMap<RecordKey, Vec<Confirm>>,
    in_flight: HashMap<RecordKey, Vec<Confirm>>,
}

impl Waiters {
    fn register(&mut self, key: RecordKey) -> oneshot::Receiver<RemoteResult<()>> {
        let (tx, rx) = oneshot::channel();
        self.queued.entry(key).or_default().push(tx);
        rx
    }

    /// A push of `key` started: its queued waiters now wait on that push.
    fn start(&mut self, key: &RecordKey) {
        if let Some(queued) = self.queued.remove(key) {
            self.in_flight.entry(key.clone()).or_default().extend(queued);
        }
    }

    fn resolve(&mut self, key: &RecordKey, result: RemoteResult<()>) {
        for tx in self.in_flight.remove(key).unwrap_or_default() {
            let _ = tx.send(result.clone());
        }
    }

    /// The push will be retried: wait for the next one.
    fn retry(&mut self, key: &RecordKey) {
        if let Some(mut in_flight) = self.in_flight.remove(key) {
            let queued = self.queued.entry(key.clone()).or_default();
            in_flight.append(queued);
            *queued = in_flight;
        }
    }

    fn fail_queued(&mut self, key: &RecordKey, error: RemoteError) {
        for tx in self.queued.remove(key).unwrap_or_default() {
            let _ = tx.send(Err(error.clone()));
        }
    }

    /// The record is gone without a push; dropped senders read as superseded.
    fn forget(&mut self, key: &RecordKey) {
        self.queued.remove(key);
    }
}

#[derive(Default)]
struct Session {
    user: Option<User>,
    ignore_attached_user: bool,
    has_synced: bool,
    initial_sync_error: Option<String>,
    /// Records edited while their push was in flight.
    requeue: HashSet<RecordKey>,
    /// Records whose last push was refused as stale; settled by the next pull.
    conflicted: HashSet<RecordKey>,
    waiters: Waiters,
    last_report: SyncReport,
    last_error: Option<RemoteError>,
}

struct Inner {
    store: Arc<dyn RecordStore>,
    remote: Option<Arc<dyn RemoteClient>>,
    session: Mutex<Session>,
    sequence: tokio::sync::Mutex<()>,
    cycle: tokio::sync::Mutex<()>,
    events: EventBus,
    poll_rate: watch::Sender<PollRate>,
    wake: Arc<Notify>,
}

/// Resolves when the server has answered the push of a mutation.
#[derive(Debug)]
pub struct PushHandle {
    rx: Option<oneshot::Receiver<RemoteResult<()>>>,
}

impl PushHandle {
    /// Nothing left to push.
    fn done() -> Self {
        Self { rx: None }
    }

    /// Wait for the server's answer.
    ///
    /// Returns immediately in offline mode. Network failures are retried
    /// rather than reported, so this only resolves with an error when the
    /// server refused the record, or with [`ManagerError::Superseded`] when
    /// the record was dropped before it was pushed.
    pub async fn confirmed(self) -> ManagerResult<()> {
        let Some(rx) = self.rx else {
            return Ok(());
        };
        match rx.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Err(ManagerError::Superseded),
        }
    }
}

pub struct ListManagerBuilder {
    store: Arc<dyn RecordStore>,
    remote: Option<Arc<dyn RemoteClient>>,
    intervals: PollIntervals,
    poll_rate: PollRate,
    user: Option<User>,
}

impl ListManagerBuilder {
    pub fn remote(mut self, remote: Arc<dyn RemoteClient>) -> Self {
        self.remote = Some(remote);
        self
    }

    pub fn intervals(mut self, intervals: PollIntervals) -> Self {
        self.intervals = intervals;
        self
    }

    pub fn poll_rate(mut self, rate: PollRate) -> Self {
        self.poll_rate = rate;
        self
    }

    /// Attach a user as soon as the manager is built.
    pub fn user(mut self, user: User) -> Self {
        self.user = Some(user);
        self
    }

    /// Recover records left in flight by a previous run, then start polling
    /// when a remote is configured.
    pub async fn build(self) -> ManagerResult<ListManager> {
        for interrupted in [SyncState::Syncing, SyncState::Deleting] {
            if let Some(pending) = state::recover_interrupted(interrupted) {
                let count = self.store.replace_state(interrupted, pending).await?;
                if count > 0 {
                    tracing::info!(
                        "Recovered {} records left in {} as {}",
                        count,
                        interrupted,
                        pending
                    );
                }
            }
        }

        let rate = if self.remote.is_some() {
            self.poll_rate
        } else {
            PollRate::Off
        };
        let (poll_rate, rate_rx) = watch::channel(rate);

        let manager = ListManager {
            inner: Arc::new(Inner {
                store: self.store,
                remote: self.remote,
                session: Mutex::new(Session::default()),
                sequence: tokio::sync::Mutex::new(()),
                cycle: tokio::sync::Mutex::new(()),
                events: EventBus::default(),
                poll_rate,
                wake: Arc::new(Notify::new()),
            }),
        };

        if let Some(user) = self.user {
            manager.attach_user(user).await?;
        }
        if manager.inner.remote.is_some() {
            manager.spawn_poller(self.intervals, rate_rx);
        } else {
            tracing::debug!("No remote configured, running offline");
        }

        Ok(manager)
    }
}

/// Handle to the list store and its sync engine. Clones share state.
#[derive(Clone)]
pub struct ListManager {
    inner: Arc<Inner>,
}

impl ListManager {
    pub fn builder(store: Arc<dyn RecordStore>) -> ListManagerBuilder {
        ListManagerBuilder {
            store,
            remote: None,
            intervals: PollIntervals::default(),
            poll_rate: PollRate::default(),
            user: None,
        }
    }

    /// Receive change notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.inner.events.subscribe()
    }

    /// `Off` whenever there is no remote.
    pub fn poll_rate(&self) -> PollRate {
        *self.inner.poll_rate.borrow()
    }

    pub fn set_poll_rate(&self, rate: PollRate) {
        if self.inner.remote.is_none() {
            tracing::debug!("Ignoring poll rate {} without a remote", rate);
            return;
        }
        self.inner.poll_rate.send_replace(rate);
    }

    /// Whether a full sync cycle has completed since the manager was built.
    pub fn has_synced(&self) -> bool {
        self.session().has_synced
    }

    /// Why sync cycles have been failing, until the first one succeeds.
    pub fn initial_sync_error(&self) -> Option<String> {
        self.session().initial_sync_error.clone()
    }

    fn session(&self) -> MutexGuard<'_, Session> {
        self.inner
            .session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn store(&self) -> &dyn RecordStore {
        self.inner.store.as_ref()
    }

    /// The user queries and mutations act for; `None` is the logged-out scope.
    fn effective_user(&self) -> Option<User> {
        let session = self.session();
        if session.ignore_attached_user {
            None
        } else {
            session.user.clone()
        }
    }

    fn scope(&self) -> Option<String> {
        self.effective_user().map(|user| user.id)
    }

    fn check_read(&self) -> ManagerResult<()> {
        if self.can_read_lists() {
            Ok(())
        } else {
            Err(ManagerError::PermissionDenied("read"))
        }
    }

    fn check_write(&self) -> ManagerResult<()> {
        if self.can_write_lists() {
            Ok(())
        } else {
            Err(ManagerError::PermissionDenied("write"))
        }
    }

    fn push_handle(&self, key: RecordKey) -> PushHandle {
        if self.inner.remote.is_none() {
            return PushHandle::done();
        }
        let rx = self.session().waiters.register(key);
        PushHandle { rx: Some(rx) }
    }

    /// Announce local changes and nudge the poller.
    fn publish_local(&self, batch: ChangeBatch) {
        if batch.is_empty() {
            return;
        }
        self.inner.events.emit_batch(batch, false);
        self.inner.wake.notify_one();
    }

    /// Store a new record owned by `scope`, or an edit of `existing`. Caller
    /// holds the sequence.
    async fn write_local<R: SyncEntity>(
        &self,
        record: R,
        existing: Option<R>,
        scope: Option<&str>,
        batch: &mut ChangeBatch,
    ) -> ManagerResult<R> {
        self.store_local(record, existing, scope, state::after_local_edit, batch)
            .await
    }

    /// Like `write_local`, but a removed `existing` record is brought back.
    async fn restore_local<R: SyncEntity>(
        &self,
        record: R,
        existing: Option<R>,
        scope: Option<&str>,
        batch: &mut ChangeBatch,
    ) -> ManagerResult<R> {
        self.store_local(record, existing, scope, state::after_local_restore, batch)
            .await
    }

    async fn store_local<R: SyncEntity>(
        &self,
        mut record: R,
        existing: Option<R>,
        scope: Option<&str>,
        edit: fn(SyncState) -> EditOutcome,
        batch: &mut ChangeBatch,
    ) -> ManagerResult<R> {
        record.set_owner(scope.map(str::to_string));

        match existing {
            None => {
                record.set_state(SyncState::PendingCreate);
                record.save(self.store()).await?;
                batch.added(record.clone());
            }
            Some(existing) => {
                if existing.owner() != scope {
                    return Err(ManagerError::not_found(R::KIND, record.key().id_string()));
                }
                match edit(existing.state()) {
                    EditOutcome::Pending(state) => record.set_state(state),
                    EditOutcome::QueuedBehindPush => {
                        record.set_state(existing.state());
                        self.session().requeue.insert(record.key());
                    }
                    EditOutcome::Removed => {
                        return Err(ManagerError::not_found(R::KIND, record.key().id_string()));
                    }
                }
                record.save(self.store()).await?;
                batch.modified(record.clone());
            }
        }

        tracing::debug!("Stored {} as {}", record.key(), record.state());
        Ok(record)
    }

    /// Remove a record locally. Caller holds the sequence.
    async fn remove_local<R: SyncEntity>(
        &self,
        existing: R,
        batch: &mut ChangeBatch,
    ) -> ManagerResult<PushHandle> {
        let key = existing.key();
        match state::after_local_remove(existing.state()) {
            RemoveOutcome::Purge => {
                existing.purge(self.store()).await?;
                let mut session = self.session();
                session.waiters.forget(&key);
                session.conflicted.remove(&key);
                drop(session);
                tracing::debug!("Purged unsynced {}", key);
                batch.removed(existing);
                Ok(PushHandle::done())
            }
            RemoveOutcome::MarkPendingDelete => {
                let mut record = existing;
                record.set_state(SyncState::PendingDelete);
                record.save(self.store()).await?;
                let mut session = self.session();
                session.requeue.remove(&key);
                session.conflicted.remove(&key);
                drop(session);
                tracing::debug!("Marked {} for deletion", key);
                batch.removed(record);
                Ok(self.push_handle(key))
            }
            RemoveOutcome::AlreadyRemoved => {
                Err(ManagerError::not_found(R::KIND, key.id_string()))
            }
        }
    }

    fn spawn_poller(&self, intervals: PollIntervals, rate: watch::Receiver<PollRate>) {
        let weak = Arc::downgrade(&self.inner);
        let tick: poller::TickFn = Box::new(move || {
            let inner = weak.upgrade()?;
            let manager = ListManager { inner };
            Some(async move { manager.poll_tick().await }.boxed())
        });
        poller::spawn(intervals, rate, self.inner.wake.clone(), tick);
    }
}

/// Visible in `scope` and not on its way out.
fn visible<R: Record>(record: &R, scope: Option<&str>) -> bool {
    record.owner() == scope && !record.state().is_removed()
}

#[cfg(test)]
mod tests {
    use super::test_support::TestContext;
    use super::*;
    use crate::db::SqliteStore;
    use crate::models::ShoppingList;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_offline_handles_resolve_immediately() {
        let ctx = TestContext::offline().await;
        let (_, push) = ctx.manager.create_list("Groceries").await.unwrap();
        push.confirmed().await.unwrap();
        assert_eq!(ctx.manager.poll_rate(), PollRate::Off);
        ctx.manager.set_poll_rate(PollRate::Slow);
        assert_eq!(ctx.manager.poll_rate(), PollRate::Off);
    }

    #[tokio::test]
    async fn test_purged_before_push_reads_as_superseded() {
        let ctx = TestContext::online().await;
        let (list, push) = ctx.manager.create_list("Groceries").await.unwrap();
        ctx.manager.remove_list(list.id).await.unwrap();
        assert!(matches!(push.confirmed().await, Err(ManagerError::Superseded)));
    }

    #[tokio::test]
    async fn test_startup_recovers_interrupted_pushes() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("test.db");
        let store = Arc::new(SqliteStore::open(&path).await.unwrap());

        let mut creating = ShoppingList::new("Was syncing");
        creating.owner_id = Some("u1".to_string());
        creating.state = SyncState::Syncing;
        store.save_list(&creating).await.unwrap();
        let mut deleting = ShoppingList::new("Was deleting");
        deleting.owner_id = Some("u1".to_string());
        deleting.state = SyncState::Deleting;
        store.save_list(&deleting).await.unwrap();

        ListManager::builder(store.clone()).build().await.unwrap();

        let creating = store.get_list(creating.id).await.unwrap().unwrap();
        assert_eq!(creating.state, SyncState::PendingCreate);
        let deleting = store.get_list(deleting.id).await.unwrap().unwrap();
        assert_eq!(deleting.state, SyncState::PendingDelete);
    }
}
