//! The durable record store the manager writes through.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::StoreResult;
use crate::models::{ListItem, ListShare, ShoppingList, SyncState};

/// Keyed storage for lists, items and shares.
///
/// `user_id` arguments select a user scope; `None` selects the logged-out
/// scope, not "every user". Results come back in insertion order.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn get_list(&self, id: Uuid) -> StoreResult<Option<ShoppingList>>;
    async fn lists_for_user(&self, user_id: Option<&str>) -> StoreResult<Vec<ShoppingList>>;
    async fn lists_in_states(
        &self,
        states: &[SyncState],
        user_id: Option<&str>,
    ) -> StoreResult<Vec<ShoppingList>>;
    async fn save_list(&self, list: &ShoppingList) -> StoreResult<()>;
    async fn delete_list(&self, id: Uuid) -> StoreResult<()>;

    async fn get_item(&self, id: Uuid) -> StoreResult<Option<ListItem>>;
    async fn items_in_list(&self, list_id: Uuid) -> StoreResult<Vec<ListItem>>;
    async fn items_in_states(
        &self,
        states: &[SyncState],
        user_id: Option<&str>,
    ) -> StoreResult<Vec<ListItem>>;
    async fn save_item(&self, item: &ListItem) -> StoreResult<()>;
    async fn delete_item(&self, id: Uuid) -> StoreResult<()>;
    async fn delete_items_in_list(&self, list_id: Uuid) -> StoreResult<Vec<ListItem>>;

    async fn get_share(&self, list_id: Uuid, email: &str) -> StoreResult<Option<ListShare>>;
    async fn shares_in_list(&self, list_id: Uuid) -> StoreResult<Vec<ListShare>>;
    async fn shares_in_states(
        &self,
        states: &[SyncState],
        user_id: Option<&str>,
    ) -> StoreResult<Vec<ListShare>>;
    async fn save_share(&self, share: &ListShare) -> StoreResult<()>;
    async fn delete_share(&self, list_id: Uuid, email: &str) -> StoreResult<()>;
    async fn delete_shares_in_list(&self, list_id: Uuid) -> StoreResult<Vec<ListShare>>;

    /// Move every record of every kind and scope from one state to another.
    async fn replace_state(&self, from: SyncState, to: SyncState) -> StoreResult<u64>;
}
