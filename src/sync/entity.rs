//! Binds each record type to its store and remote calls so the push and pull
//! loops can be written once.

use async_trait::async_trait;

use super::events::Tracked;
use super::remote::RemoteClient;
use super::state::PushKind;
use crate::error::{RemoteResult, StoreResult};
use crate::models::{ListItem, ListShare, RecordKey, ShoppingList, SyncState};
use crate::store::RecordStore;

#[async_trait]
pub(crate) trait SyncEntity: Tracked {
    async fn load(store: &dyn RecordStore, key: &RecordKey) -> StoreResult<Option<Self>>;

    /// Records of `user_id` waiting to be pushed, in creation order.
    async fn pending(store: &dyn RecordStore, user_id: &str) -> StoreResult<Vec<Self>>;

    async fn save(&self, store: &dyn RecordStore) -> StoreResult<()>;

    async fn purge(&self, store: &dyn RecordStore) -> StoreResult<()>;

    /// Send this record to the server. Deletes return `None`.
    async fn push(
        &self,
        remote: &dyn RemoteClient,
        user_id: &str,
        kind: PushKind,
    ) -> RemoteResult<Option<Self>>;
}

#[async_trait]
impl SyncEntity for ShoppingList {
    async fn load(store: &dyn RecordStore, key: &RecordKey) -> StoreResult<Option<Self>> {
        match key {
            RecordKey::List(id) => store.get_list(*id).await,
            _ => Ok(None),
        }
    }

    async fn pending(store: &dyn RecordStore, user_id: &str) -> StoreResult<Vec<Self>> {
        store
            .lists_in_states(&SyncState::PUSHABLE, Some(user_id))
            .await
    }

    async fn save(&self, store: &dyn RecordStore) -> StoreResult<()> {
        store.save_list(self).await
    }

    async fn purge(&self, store: &dyn RecordStore) -> StoreResult<()> {
        store.delete_list(self.id).await
    }

    async fn push(
        &self,
        remote: &dyn RemoteClient,
        user_id: &str,
        kind: PushKind,
    ) -> RemoteResult<Option<Self>> {
        match kind {
            PushKind::Create => remote.create_list(user_id, self).await.map(Some),
            PushKind::Update => remote.update_list(user_id, self).await.map(Some),
            PushKind::Delete => remote.delete_list(user_id, self.id).await.map(|_| None),
        }
    }
}

#[async_trait]
impl SyncEntity for ListItem {
    async fn load(store: &dyn RecordStore, key: &RecordKey) -> StoreResult<Option<Self>> {
        match key {
            RecordKey::Item(id) => store.get_item(*id).await,
            _ => Ok(None),
        }
    }

    async fn pending(store: &dyn RecordStore, user_id: &str) -> StoreResult<Vec<Self>> {
        store
            .items_in_states(&SyncState::PUSHABLE, Some(user_id))
            .await
    }

    async fn save(&self, store: &dyn RecordStore) -> StoreResult<()> {
        store.save_item(self).await
    }

    async fn purge(&self, store: &dyn RecordStore) -> StoreResult<()> {
        store.delete_item(self.id).await
    }

    async fn push(
        &self,
        remote: &dyn RemoteClient,
        user_id: &str,
        kind: PushKind,
    ) -> RemoteResult<Option<Self>> {
        match kind {
            PushKind::Create => remote.create_item(user_id, self).await.map(Some),
            PushKind::Update => remote.update_item(user_id, self).await.map(Some),
            PushKind::Delete => remote
                .delete_item(user_id, self.list_id, self.id)
                .await
                .map(|_| None),
        }
    }
}

#[async_trait]
impl SyncEntity for ListShare {
    async fn load(store: &dyn RecordStore, key: &RecordKey) -> StoreResult<Option<Self>> {
        match key {
            RecordKey::Share(list_id, email) => store.get_share(*list_id, email).await,
            _ => Ok(None),
        }
    }

    async fn pending(store: &dyn RecordStore, user_id: &str) -> StoreResult<Vec<Self>> {
        store
            .shares_in_states(&SyncState::PUSHABLE, Some(user_id))
            .await
    }

    async fn save(&self, store: &dyn RecordStore) -> StoreResult<()> {
        store.save_share(self).await
    }

    async fn purge(&self, store: &dyn RecordStore) -> StoreResult<()> {
        store.delete_share(self.list_id, &self.user_email).await
    }

    async fn push(
        &self,
        remote: &dyn RemoteClient,
        user_id: &str,
        kind: PushKind,
    ) -> RemoteResult<Option<Self>> {
        match kind {
            PushKind::Create => remote.create_share(user_id, self).await.map(Some),
            PushKind::Update => remote.update_share(user_id, self).await.map(Some),
            PushKind::Delete => remote
                .delete_share(user_id, self.list_id, &self.user_email)
                .await
                .map(|_| None),
        }
    }
}

