//! The server contract the engine pushes to and pulls from.
//!
//! Transport, authentication and response caching live behind this trait.
//! Creates are upserts keyed by the client-assigned id, so replaying a create
//! whose acknowledgement was lost never duplicates the record. Deleting a
//! record the server no longer has succeeds.

use async_trait::async_trait;
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;
use uuid::Uuid;

use crate::error::{RemoteError, RemoteResult};
use crate::models::{normalize_email, ListItem, ListShare, ShoppingList, SyncState};

#[async_trait]
pub trait RemoteClient: Send + Sync {
    async fn create_list(&self, user_id: &str, list: &ShoppingList) -> RemoteResult<ShoppingList>;
    async fn update_list(&self, user_id: &str, list: &ShoppingList) -> RemoteResult<ShoppingList>;
    async fn delete_list(&self, user_id: &str, list_id: Uuid) -> RemoteResult<()>;
    async fn fetch_lists(&self, user_id: &str) -> RemoteResult<Vec<ShoppingList>>;

    async fn create_item(&self, user_id: &str, item: &ListItem) -> RemoteResult<ListItem>;
    async fn update_item(&self, user_id: &str, item: &ListItem) -> RemoteResult<ListItem>;
    async fn delete_item(&self, user_id: &str, list_id: Uuid, item_id: Uuid) -> RemoteResult<()>;
    async fn fetch_items(&self, user_id: &str, list_id: Uuid) -> RemoteResult<Vec<ListItem>>;

    async fn create_share(&self, user_id: &str, share: &ListShare) -> RemoteResult<ListShare>;
    async fn update_share(&self, user_id: &str, share: &ListShare) -> RemoteResult<ListShare>;
    async fn delete_share(&self, user_id: &str, list_id: Uuid, email: &str) -> RemoteResult<()>;
    async fn fetch_shares(&self, user_id: &str, list_id: Uuid) -> RemoteResult<Vec<ListShare>>;
}

#[derive(Default)]
struct ServerState {
    offline: bool,
    injected: VecDeque<RemoteError>,
    calls: Vec<String>,
    lists: BTreeMap<(String, Uuid), ShoppingList>,
    items: BTreeMap<Uuid, ListItem>,
    shares: BTreeMap<(Uuid, String), ListShare>,
}

impl ServerState {
    /// Record a call and decide whether it fails.
    fn begin(&mut self, call: String) -> RemoteResult<()> {
        self.calls.push(call);
        if self.offline {
            return Err(RemoteError::Network("server unreachable".to_string()));
        }
        match self.injected.pop_front() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn owns_list(&self, user_id: &str, list_id: Uuid) -> bool {
        self.lists.contains_key(&(user_id.to_string(), list_id))
    }
}

/// An in-process server with failure injection.
///
/// Records are scoped per user like the real service. Updates are puts by id;
/// one carrying an older `modified` than the stored copy fails with
/// [`RemoteError::Conflict`].
#[derive(Default)]
pub struct MemoryRemote {
    state: Mutex<ServerState>,
    fetch_gate: Mutex<Option<Arc<FetchGate>>>,
}

/// Holds `fetch_lists` calls until released, to keep a sync cycle running.
#[derive(Debug, Default)]
pub struct FetchGate {
    entered: Notify,
    release: Notify,
}

impl FetchGate {
    /// Wait until a `fetch_lists` call is held at the gate.
    pub async fn entered(&self) {
        self.entered.notified().await;
    }

    /// Let one held call through.
    pub fn release(&self) {
        self.release.notify_one();
    }
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, ServerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// While offline every call fails with a network error.
    pub fn set_offline(&self, offline: bool) {
        self.state().offline = offline;
    }

    /// Fail the next call with `error`. Queued errors are consumed in order.
    pub fn fail_next(&self, error: RemoteError) {
        self.state().injected.push_back(error);
    }

    /// Every call received so far, e.g. `create_list <id>`.
    pub fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }

    /// Hold every following `fetch_lists` call at the returned gate.
    pub fn gate_fetches(&self) -> Arc<FetchGate> {
        let gate = Arc::new(FetchGate::default());
        *self.fetch_gate.lock().unwrap_or_else(PoisonError::into_inner) = Some(gate.clone());
        gate
    }

    fn held_fetches(&self) -> Option<Arc<FetchGate>> {
        self.fetch_gate
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Change the server copy directly, as another device would.
    pub fn put_list(&self, user_id: &str, list: ShoppingList) {
        let mut list = list;
        list.state = SyncState::Synced;
        self.state().lists.insert((user_id.to_string(), list.id), list);
    }

    pub fn put_item(&self, item: ListItem) {
        let mut item = item;
        item.state = SyncState::Synced;
        self.state().items.insert(item.id, item);
    }

    pub fn put_share(&self, share: ListShare) {
        let mut share = share;
        share.state = SyncState::Synced;
        let key = (share.list_id, normalize_email(&share.user_email));
        self.state().shares.insert(key, share);
    }

    pub fn remove_list(&self, user_id: &str, list_id: Uuid) {
        let mut state = self.state();
        state.lists.remove(&(user_id.to_string(), list_id));
        state.items.retain(|_, item| item.list_id != list_id);
        state.shares.retain(|(l, _), _| *l != list_id);
    }

    pub fn remove_item(&self, item_id: Uuid) {
        self.state().items.remove(&item_id);
    }

    pub fn list(&self, user_id: &str, list_id: Uuid) -> Option<ShoppingList> {
        self.state()
            .lists
            .get(&(user_id.to_string(), list_id))
            .cloned()
    }

    pub fn item(&self, item_id: Uuid) -> Option<ListItem> {
        self.state().items.get(&item_id).cloned()
    }

    pub fn share(&self, list_id: Uuid, email: &str) -> Option<ListShare> {
        self.state()
            .shares
            .get(&(list_id, normalize_email(email)))
            .cloned()
    }

    pub fn list_count(&self) -> usize {
        self.state().lists.len()
    }

    pub fn item_count(&self) -> usize {
        self.state().items.len()
    }
}

fn missing(what: &str, id: impl std::fmt::Display) -> RemoteError {
    RemoteError::Rejected(format!("{} {} does not exist", what, id))
}

#[async_trait]
impl RemoteClient for MemoryRemote {
    async fn create_list(&self, user_id: &str, list: &ShoppingList) -> RemoteResult<ShoppingList> {
        let mut state = self.state();
        state.begin(format!("create_list {}", list.id))?;
        if list.name.trim().is_empty() {
            return Err(RemoteError::Rejected("list name is required".to_string()));
        }
        let mut stored = list.clone();
        stored.state = SyncState::Synced;
        stored.owner_id = Some(user_id.to_string());
        state
            .lists
            .insert((user_id.to_string(), list.id), stored.clone());
        Ok(stored)
    }

    async fn update_list(&self, user_id: &str, list: &ShoppingList) -> RemoteResult<ShoppingList> {
        let mut state = self.state();
        state.begin(format!("update_list {}", list.id))?;
        let key = (user_id.to_string(), list.id);
        if let Some(existing) = state.lists.get(&key) {
            if existing.modified > list.modified {
                return Err(RemoteError::Conflict(format!(
                    "list {} changed on the server",
                    list.id
                )));
            }
        }
        if list.name.trim().is_empty() {
            return Err(RemoteError::Rejected("list name is required".to_string()));
        }
        let mut stored = list.clone();
        stored.state = SyncState::Synced;
        stored.owner_id = Some(user_id.to_string());
        state.lists.insert(key, stored.clone());
        Ok(stored)
    }

    async fn delete_list(&self, user_id: &str, list_id: Uuid) -> RemoteResult<()> {
        let mut state = self.state();
        state.begin(format!("delete_list {}", list_id))?;
        state.lists.remove(&(user_id.to_string(), list_id));
        state.items.retain(|_, item| item.list_id != list_id);
        state.shares.retain(|(l, _), _| *l != list_id);
        Ok(())
    }

    async fn fetch_lists(&self, user_id: &str) -> RemoteResult<Vec<ShoppingList>> {
        if let Some(gate) = self.held_fetches() {
            gate.entered.notify_one();
            gate.release.notified().await;
        }
        let mut state = self.state();
        state.begin(format!("fetch_lists {}", user_id))?;
        Ok(state
            .lists
            .iter()
            .filter(|((owner, _), _)| owner == user_id)
            .map(|(_, list)| list.clone())
            .collect())
    }

    async fn create_item(&self, user_id: &str, item: &ListItem) -> RemoteResult<ListItem> {
        let mut state = self.state();
        state.begin(format!("create_item {}", item.id))?;
        if !state.owns_list(user_id, item.list_id) {
            return Err(missing("list", item.list_id));
        }
        let mut stored = item.clone();
        stored.state = SyncState::Synced;
        state.items.insert(item.id, stored.clone());
        Ok(stored)
    }

    async fn update_item(&self, user_id: &str, item: &ListItem) -> RemoteResult<ListItem> {
        let mut state = self.state();
        state.begin(format!("update_item {}", item.id))?;
        if !state.owns_list(user_id, item.list_id) {
            return Err(missing("list", item.list_id));
        }
        if let Some(existing) = state.items.get(&item.id) {
            if existing.modified > item.modified {
                return Err(RemoteError::Conflict(format!(
                    "item {} changed on the server",
                    item.id
                )));
            }
        }
        let mut stored = item.clone();
        stored.state = SyncState::Synced;
        state.items.insert(item.id, stored.clone());
        Ok(stored)
    }

    async fn delete_item(&self, user_id: &str, list_id: Uuid, item_id: Uuid) -> RemoteResult<()> {
        let mut state = self.state();
        state.begin(format!("delete_item {}", item_id))?;
        if !state.owns_list(user_id, list_id) {
            return Err(missing("list", list_id));
        }
        state.items.remove(&item_id);
        Ok(())
    }

    async fn fetch_items(&self, user_id: &str, list_id: Uuid) -> RemoteResult<Vec<ListItem>> {
        let mut state = self.state();
        state.begin(format!("fetch_items {}", list_id))?;
        if !state.owns_list(user_id, list_id) {
            return Err(missing("list", list_id));
        }
        Ok(state
            .items
            .values()
            .filter(|item| item.list_id == list_id)
            .cloned()
            .collect())
    }

    async fn create_share(&self, user_id: &str, share: &ListShare) -> RemoteResult<ListShare> {
        let mut state = self.state();
        state.begin(format!("create_share {}/{}", share.list_id, share.user_email))?;
        if !state.owns_list(user_id, share.list_id) {
            return Err(missing("list", share.list_id));
        }
        let mut stored = share.clone();
        stored.state = SyncState::Synced;
        state.shares.insert(
            (share.list_id, normalize_email(&share.user_email)),
            stored.clone(),
        );
        Ok(stored)
    }

    async fn update_share(&self, user_id: &str, share: &ListShare) -> RemoteResult<ListShare> {
        self.create_share(user_id, share).await
    }

    async fn delete_share(&self, user_id: &str, list_id: Uuid, email: &str) -> RemoteResult<()> {
        let mut state = self.state();
        state.begin(format!("delete_share {}/{}", list_id, email))?;
        if !state.owns_list(user_id, list_id) {
            return Err(missing("list", list_id));
        }
        state.shares.remove(&(list_id, normalize_email(email)));
        Ok(())
    }

    async fn fetch_shares(&self, user_id: &str, list_id: Uuid) -> RemoteResult<Vec<ListShare>> {
        let mut state = self.state();
        state.begin(format!("fetch_shares {}", list_id))?;
        if !state.owns_list(user_id, list_id) {
            return Err(missing("list", list_id));
        }
        Ok(state
            .shares
            .iter()
            .filter(|((l, _), _)| *l == list_id)
            .map(|(_, share)| share.clone())
            .collect())
    }
}
