use sqlx::SqlitePool;
use uuid::Uuid;

use super::{parse_meta, parse_timestamp, parse_uuid, state_placeholders};
use crate::error::{StoreError, StoreResult};
use crate::models::{ListItem, PrevItem, SyncState};

const TABLE: &str = "shopping_list_items";

pub struct ItemRepository {
    pool: SqlitePool,
}

#[derive(sqlx::FromRow)]
struct ItemRow {
    id: String,
    list_id: String,
    name: String,
    count: i64,
    ticked: bool,
    offer_id: Option<String>,
    creator: Option<String>,
    modified: String,
    meta: String,
    prev_item_id: Option<String>,
    sync_user_id: Option<String>,
    sync_state: i64,
}

impl ItemRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get_by_id(&self, id: Uuid) -> StoreResult<Option<ListItem>> {
        let row: Option<ItemRow> =
            sqlx::query_as("SELECT * FROM shopping_list_items WHERE id = ?")
                .bind(id.to_string())
                .fetch_optional(&self.pool)
                .await?;

        row.map(hydrate_item).transpose()
    }

    pub async fn list_in_list(&self, list_id: Uuid) -> StoreResult<Vec<ListItem>> {
        let rows: Vec<ItemRow> =
            sqlx::query_as("SELECT * FROM shopping_list_items WHERE list_id = ? ORDER BY rowid")
                .bind(list_id.to_string())
                .fetch_all(&self.pool)
                .await?;

        rows.into_iter().map(hydrate_item).collect()
    }

    pub async fn list_in_states(
        &self,
        states: &[SyncState],
        user_id: Option<&str>,
    ) -> StoreResult<Vec<ListItem>> {
        if states.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT * FROM shopping_list_items WHERE sync_user_id IS ? AND sync_state IN ({}) ORDER BY rowid",
            state_placeholders(states.len())
        );
        let mut query = sqlx::query_as::<_, ItemRow>(&sql).bind(user_id);
        for state in states {
            query = query.bind(state.code());
        }
        let rows = query.fetch_all(&self.pool).await?;

        rows.into_iter().map(hydrate_item).collect()
    }

    pub async fn save(&self, item: &ListItem) -> StoreResult<()> {
        let meta = serde_json::to_string(&item.meta).unwrap_or_else(|_| "{}".to_string());

        sqlx::query(
            r#"
            INSERT INTO shopping_list_items
                (id, list_id, name, count, ticked, offer_id, creator, modified, meta, prev_item_id, sync_user_id, sync_state)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                list_id = excluded.list_id,
                name = excluded.name,
                count = excluded.count,
                ticked = excluded.ticked,
                offer_id = excluded.offer_id,
                creator = excluded.creator,
                modified = excluded.modified,
                meta = excluded.meta,
                prev_item_id = excluded.prev_item_id,
                sync_user_id = excluded.sync_user_id,
                sync_state = excluded.sync_state
            "#,
        )
        .bind(item.id.to_string())
        .bind(item.list_id.to_string())
        .bind(&item.name)
        .bind(item.count)
        .bind(item.ticked)
        .bind(&item.offer_id)
        .bind(&item.creator)
        .bind(item.modified.to_rfc3339())
        .bind(&meta)
        .bind(item.prev_item.to_column())
        .bind(&item.owner_id)
        .bind(item.state.code())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn delete(&self, id: Uuid) -> StoreResult<()> {
        sqlx::query("DELETE FROM shopping_list_items WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Remove every item of a list, returning what was removed.
    pub async fn delete_in_list(&self, list_id: Uuid) -> StoreResult<Vec<ListItem>> {
        let removed = self.list_in_list(list_id).await?;
        sqlx::query("DELETE FROM shopping_list_items WHERE list_id = ?")
            .bind(list_id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(removed)
    }

    /// Move every row in state `from` to `to`, whatever its user scope.
    pub async fn replace_state(&self, from: SyncState, to: SyncState) -> StoreResult<u64> {
        let result = sqlx::query("UPDATE shopping_list_items SET sync_state = ? WHERE sync_state = ?")
            .bind(to.code())
            .bind(from.code())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

fn hydrate_item(row: ItemRow) -> StoreResult<ListItem> {
    let state = SyncState::from_code(row.sync_state).ok_or_else(|| StoreError::Corrupt {
        table: TABLE,
        reason: format!("unknown sync state {}", row.sync_state),
    })?;

    Ok(ListItem {
        id: parse_uuid(TABLE, &row.id)?,
        list_id: parse_uuid(TABLE, &row.list_id)?,
        name: row.name,
        count: row.count,
        ticked: row.ticked,
        offer_id: row.offer_id,
        creator: row.creator,
        modified: parse_timestamp(TABLE, &row.modified)?,
        meta: parse_meta(&row.meta),
        prev_item: PrevItem::from_column(row.prev_item_id.as_deref()),
        owner_id: row.sync_user_id,
        state,
        order_index: -1,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_db;
    use crate::models::Record;
    use tempfile::TempDir;

    struct TestContext {
        repo: ItemRepository,
        _temp_dir: TempDir,
    }

    async fn setup_repo() -> TestContext {
        let temp_dir = TempDir::new().unwrap();
        let pool = init_db(&temp_dir.path().join("test.db")).await.unwrap();
        TestContext {
            repo: ItemRepository::new(pool),
            _temp_dir: temp_dir,
        }
    }

    #[tokio::test]
    async fn test_save_and_get_item() {
        let ctx = setup_repo().await;
        let list_id = Uuid::new_v4();
        let item = ListItem::new(list_id, "Milk")
            .with_count(3)
            .with_offer("offer-1")
            .with_comment("the organic one")
            .with_prev(PrevItem::First);

        ctx.repo.save(&item).await.unwrap();

        let fetched = ctx.repo.get_by_id(item.id).await.unwrap().unwrap();
        assert_eq!(fetched.name, "Milk");
        assert_eq!(fetched.count, 3);
        assert_eq!(fetched.offer_id.as_deref(), Some("offer-1"));
        assert_eq!(fetched.comment(), Some("the organic one"));
        assert_eq!(fetched.prev_item, PrevItem::First);
        assert_eq!(fetched.modified, item.modified);
        assert!(item.same_content(&fetched));
    }

    #[tokio::test]
    async fn test_prev_item_sentinels_survive() {
        let ctx = setup_repo().await;
        let list_id = Uuid::new_v4();
        let unknown = ListItem::new(list_id, "a");
        let after = ListItem::new(list_id, "b").with_prev(PrevItem::After(unknown.id));
        ctx.repo.save(&unknown).await.unwrap();
        ctx.repo.save(&after).await.unwrap();

        let items = ctx.repo.list_in_list(list_id).await.unwrap();
        assert_eq!(items[0].prev_item, PrevItem::Unknown);
        assert_eq!(items[1].prev_item, PrevItem::After(unknown.id));
    }

    #[tokio::test]
    async fn test_delete_in_list_returns_removed() {
        let ctx = setup_repo().await;
        let list_id = Uuid::new_v4();
        let other_list = Uuid::new_v4();
        ctx.repo.save(&ListItem::new(list_id, "a")).await.unwrap();
        ctx.repo.save(&ListItem::new(list_id, "b")).await.unwrap();
        ctx.repo.save(&ListItem::new(other_list, "c")).await.unwrap();

        let removed = ctx.repo.delete_in_list(list_id).await.unwrap();
        assert_eq!(removed.len(), 2);
        assert!(ctx.repo.list_in_list(list_id).await.unwrap().is_empty());
        assert_eq!(ctx.repo.list_in_list(other_list).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_list_in_states_scoped_by_user() {
        let ctx = setup_repo().await;
        let list_id = Uuid::new_v4();
        let mut mine = ListItem::new(list_id, "mine");
        mine.owner_id = Some("u1".to_string());
        let anon = ListItem::new(list_id, "anon");
        ctx.repo.save(&mine).await.unwrap();
        ctx.repo.save(&anon).await.unwrap();

        let found = ctx
            .repo
            .list_in_states(&[SyncState::PendingCreate], Some("u1"))
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "mine");
    }
}
