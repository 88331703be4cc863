mod item_repo;
mod list_repo;
mod share_repo;

pub use item_repo::ItemRepository;
pub use list_repo::ListRepository;
pub use share_repo::ShareRepository;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};
use crate::models::{ListItem, ListShare, Meta, ShoppingList, SyncState};
use crate::store::RecordStore;

/// Initialize the database connection pool and run migrations
pub async fn init_db(path: &Path) -> StoreResult<SqlitePool> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let db_url = format!("sqlite:{}?mode=rwc", path.display());

    let options = SqliteConnectOptions::from_str(&db_url)?.create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    Ok(pool)
}

/// SQLite-backed [`RecordStore`].
pub struct SqliteStore {
    lists: ListRepository,
    items: ItemRepository,
    shares: ShareRepository,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            lists: ListRepository::new(pool.clone()),
            items: ItemRepository::new(pool.clone()),
            shares: ShareRepository::new(pool),
        }
    }

    pub async fn open(path: &Path) -> StoreResult<Self> {
        Ok(Self::new(init_db(path).await?))
    }
}

#[async_trait]
impl RecordStore for SqliteStore {
    async fn get_list(&self, id: Uuid) -> StoreResult<Option<ShoppingList>> {
        self.lists.get_by_id(id).await
    }

    async fn lists_for_user(&self, user_id: Option<&str>) -> StoreResult<Vec<ShoppingList>> {
        self.lists.list_for_user(user_id).await
    }

    async fn lists_in_states(
        &self,
        states: &[SyncState],
        user_id: Option<&str>,
    ) -> StoreResult<Vec<ShoppingList>> {
        self.lists.list_in_states(states, user_id).await
    }

    async fn save_list(&self, list: &ShoppingList) -> StoreResult<()> {
        self.lists.save(list).await
    }

    async fn delete_list(&self, id: Uuid) -> StoreResult<()> {
        self.lists.delete(id).await
    }

    async fn get_item(&self, id: Uuid) -> StoreResult<Option<ListItem>> {
        self.items.get_by_id(id).await
    }

    async fn items_in_list(&self, list_id: Uuid) -> StoreResult<Vec<ListItem>> {
        self.items.list_in_list(list_id).await
    }

    async fn items_in_states(
        &self,
        states: &[SyncState],
        user_id: Option<&str>,
    ) -> StoreResult<Vec<ListItem>> {
        self.items.list_in_states(states, user_id).await
    }

    async fn save_item(&self, item: &ListItem) -> StoreResult<()> {
        self.items.save(item).await
    }

    async fn delete_item(&self, id: Uuid) -> StoreResult<()> {
        self.items.delete(id).await
    }

    async fn delete_items_in_list(&self, list_id: Uuid) -> StoreResult<Vec<ListItem>> {
        self.items.delete_in_list(list_id).await
    }

    async fn get_share(&self, list_id: Uuid, email: &str) -> StoreResult<Option<ListShare>> {
        self.shares.get(list_id, email).await
    }

    async fn shares_in_list(&self, list_id: Uuid) -> StoreResult<Vec<ListShare>> {
        self.shares.list_in_list(list_id).await
    }

    async fn shares_in_states(
        &self,
        states: &[SyncState],
        user_id: Option<&str>,
    ) -> StoreResult<Vec<ListShare>> {
        self.shares.list_in_states(states, user_id).await
    }

    async fn save_share(&self, share: &ListShare) -> StoreResult<()> {
        self.shares.save(share).await
    }

    async fn delete_share(&self, list_id: Uuid, email: &str) -> StoreResult<()> {
        self.shares.delete(list_id, email).await
    }

    async fn delete_shares_in_list(&self, list_id: Uuid) -> StoreResult<Vec<ListShare>> {
        self.shares.delete_in_list(list_id).await
    }

    async fn replace_state(&self, from: SyncState, to: SyncState) -> StoreResult<u64> {
        let lists = self.lists.replace_state(from, to).await?;
        let items = self.items.replace_state(from, to).await?;
        let shares = self.shares.replace_state(from, to).await?;
        Ok(lists + items + shares)
    }
}

fn state_placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

fn parse_uuid(table: &'static str, value: &str) -> StoreResult<Uuid> {
    Uuid::parse_str(value).map_err(|e| StoreError::Corrupt {
        table,
        reason: format!("bad id '{}': {}", value, e),
    })
}

fn parse_timestamp(table: &'static str, value: &str) -> StoreResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::Corrupt {
            table,
            reason: format!("bad timestamp '{}': {}", value, e),
        })
}

fn parse_meta(value: &str) -> Meta {
    serde_json::from_str(value).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_init_db_creates_tables() {
        let temp_dir = tempdir().unwrap();
        let db_path = temp_dir.path().join("nested").join("test.db");

        let pool = init_db(&db_path).await.unwrap();

        let tables: Vec<(String,)> = sqlx::query_as(
            "SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%' AND name NOT LIKE '_sqlx_%' ORDER BY name",
        )
        .fetch_all(&pool)
        .await
        .unwrap();

        let table_names: Vec<&str> = tables.iter().map(|t| t.0.as_str()).collect();
        assert_eq!(
            table_names,
            vec!["list_shares", "shopping_list_items", "shopping_lists"]
        );
    }

    #[tokio::test]
    async fn test_store_cascade_helpers() {
        let temp_dir = tempdir().unwrap();
        let store = SqliteStore::open(&temp_dir.path().join("test.db"))
            .await
            .unwrap();

        let list = ShoppingList::new("Weekend");
        store.save_list(&list).await.unwrap();
        store
            .save_item(&ListItem::new(list.id, "Coffee"))
            .await
            .unwrap();

        let removed = store.delete_items_in_list(list.id).await.unwrap();
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].name, "Coffee");
        assert!(store.delete_shares_in_list(list.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_replace_state_spans_scopes() {
        let temp_dir = tempdir().unwrap();
        let store = SqliteStore::open(&temp_dir.path().join("test.db"))
            .await
            .unwrap();

        let mut mine = ShoppingList::new("Mine");
        mine.owner_id = Some("u1".to_string());
        mine.state = SyncState::Syncing;
        let mut logged_out = ShoppingList::new("Logged out");
        logged_out.state = SyncState::Syncing;
        let mut item = ListItem::new(mine.id, "Bread");
        item.state = SyncState::Syncing;
        store.save_list(&mine).await.unwrap();
        store.save_list(&logged_out).await.unwrap();
        store.save_item(&item).await.unwrap();

        let moved = store
            .replace_state(SyncState::Syncing, SyncState::PendingCreate)
            .await
            .unwrap();
        assert_eq!(moved, 3);
        let fetched = store.get_list(mine.id).await.unwrap().unwrap();
        assert_eq!(fetched.state, SyncState::PendingCreate);
    }

    #[test]
    fn test_placeholders() {
        assert_eq!(state_placeholders(3), "?, ?, ?");
    }
}
