use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use super::{parse_meta, parse_timestamp, parse_uuid, state_placeholders};
use crate::error::{StoreError, StoreResult};
use crate::models::{ShoppingList, SyncState};

const TABLE: &str = "shopping_lists";

pub struct ListRepository {
    pool: SqlitePool,
}

#[derive(sqlx::FromRow)]
struct ListRow {
    id: String,
    name: String,
    modified: String,
    access: String,
    kind: String,
    meta: String,
    sync_user_id: Option<String>,
    sync_state: i64,
}

impl ListRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get_by_id(&self, id: Uuid) -> StoreResult<Option<ShoppingList>> {
        let row: Option<ListRow> = sqlx::query_as("SELECT * FROM shopping_lists WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        row.map(hydrate_list).transpose()
    }

    pub async fn list_for_user(&self, user_id: Option<&str>) -> StoreResult<Vec<ShoppingList>> {
        let rows: Vec<ListRow> = sqlx::query_as(
            "SELECT * FROM shopping_lists WHERE sync_user_id IS ? ORDER BY rowid",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(hydrate_list).collect()
    }

    pub async fn list_in_states(
        &self,
        states: &[SyncState],
        user_id: Option<&str>,
    ) -> StoreResult<Vec<ShoppingList>> {
        if states.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT * FROM shopping_lists WHERE sync_user_id IS ? AND sync_state IN ({}) ORDER BY rowid",
            state_placeholders(states.len())
        );
        let mut query = sqlx::query_as::<_, ListRow>(&sql).bind(user_id);
        for state in states {
            query = query.bind(state.code());
        }
        let rows = query.fetch_all(&self.pool).await?;

        rows.into_iter().map(hydrate_list).collect()
    }

    /// Insert or update in place, keeping the row's insertion position.
    pub async fn save(&self, list: &ShoppingList) -> StoreResult<()> {
        let meta = serde_json::to_string(&list.meta).unwrap_or_else(|_| "{}".to_string());

        sqlx::query(
            r#"
            INSERT INTO shopping_lists (id, name, modified, access, kind, meta, sync_user_id, sync_state)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                modified = excluded.modified,
                access = excluded.access,
                kind = excluded.kind,
                meta = excluded.meta,
                sync_user_id = excluded.sync_user_id,
                sync_state = excluded.sync_state
            "#,
        )
        .bind(list.id.to_string())
        .bind(&list.name)
        .bind(list.modified.to_rfc3339())
        .bind(list.access.to_string())
        .bind(list.kind.to_string())
        .bind(&meta)
        .bind(&list.owner_id)
        .bind(list.state.code())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn delete(&self, id: Uuid) -> StoreResult<()> {
        sqlx::query("DELETE FROM shopping_lists WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Move every row in state `from` to `to`, whatever its user scope.
    pub async fn replace_state(&self, from: SyncState, to: SyncState) -> StoreResult<u64> {
        let result = sqlx::query("UPDATE shopping_lists SET sync_state = ? WHERE sync_state = ?")
            .bind(to.code())
            .bind(from.code())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

fn hydrate_list(row: ListRow) -> StoreResult<ShoppingList> {
    let corrupt = |reason: String| StoreError::Corrupt {
        table: TABLE,
        reason,
    };

    let modified: DateTime<Utc> = parse_timestamp(TABLE, &row.modified)?;
    let state = SyncState::from_code(row.sync_state)
        .ok_or_else(|| corrupt(format!("unknown sync state {}", row.sync_state)))?;

    Ok(ShoppingList {
        id: parse_uuid(TABLE, &row.id)?,
        name: row.name,
        modified,
        access: row.access.parse().map_err(corrupt)?,
        kind: row.kind.parse().map_err(corrupt)?,
        owner_id: row.sync_user_id,
        meta: parse_meta(&row.meta),
        state,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_db;
    use crate::models::{ListAccess, ListKind};
    use tempfile::TempDir;

    struct TestContext {
        repo: ListRepository,
        _temp_dir: TempDir,
    }

    async fn setup_repo() -> TestContext {
        let temp_dir = TempDir::new().unwrap();
        let pool = init_db(&temp_dir.path().join("test.db")).await.unwrap();
        TestContext {
            repo: ListRepository::new(pool),
            _temp_dir: temp_dir,
        }
    }

    #[tokio::test]
    async fn test_save_and_get_list() {
        let ctx = setup_repo().await;
        let list = ShoppingList::wish_list("Birthday")
            .with_access(ListAccess::Shared)
            .with_theme("green");

        ctx.repo.save(&list).await.unwrap();

        let fetched = ctx.repo.get_by_id(list.id).await.unwrap().unwrap();
        assert_eq!(fetched.name, "Birthday");
        assert_eq!(fetched.kind, ListKind::WishList);
        assert_eq!(fetched.access, ListAccess::Shared);
        assert_eq!(fetched.theme(), Some("green"));
        assert_eq!(fetched.state, SyncState::PendingCreate);
        assert!(fetched.owner_id.is_none());
    }

    #[tokio::test]
    async fn test_save_updates_in_place() {
        let ctx = setup_repo().await;
        let first = ShoppingList::new("First");
        let second = ShoppingList::new("Second");
        ctx.repo.save(&first).await.unwrap();
        ctx.repo.save(&second).await.unwrap();

        let mut renamed = first.clone();
        renamed.name = "First, renamed".to_string();
        renamed.state = SyncState::Synced;
        ctx.repo.save(&renamed).await.unwrap();

        let lists = ctx.repo.list_for_user(None).await.unwrap();
        assert_eq!(lists.len(), 2);
        // Insertion order survives the update
        assert_eq!(lists[0].name, "First, renamed");
        assert_eq!(lists[0].state, SyncState::Synced);
        assert_eq!(lists[1].name, "Second");
    }

    #[tokio::test]
    async fn test_user_scopes() {
        let ctx = setup_repo().await;
        let logged_out = ShoppingList::new("Mine");
        let mut owned = ShoppingList::new("Theirs");
        owned.owner_id = Some("user1".to_string());
        ctx.repo.save(&logged_out).await.unwrap();
        ctx.repo.save(&owned).await.unwrap();

        let anon = ctx.repo.list_for_user(None).await.unwrap();
        assert_eq!(anon.len(), 1);
        assert_eq!(anon[0].id, logged_out.id);

        let user = ctx.repo.list_for_user(Some("user1")).await.unwrap();
        assert_eq!(user.len(), 1);
        assert_eq!(user[0].id, owned.id);
    }

    #[tokio::test]
    async fn test_list_in_states() {
        let ctx = setup_repo().await;
        let pending = ShoppingList::new("Pending");
        let mut synced = ShoppingList::new("Synced");
        synced.state = SyncState::Synced;
        ctx.repo.save(&pending).await.unwrap();
        ctx.repo.save(&synced).await.unwrap();

        let found = ctx
            .repo
            .list_in_states(&SyncState::PUSHABLE, None)
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, pending.id);

        assert!(ctx.repo.list_in_states(&[], None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_list() {
        let ctx = setup_repo().await;
        let list = ShoppingList::new("Gone soon");
        ctx.repo.save(&list).await.unwrap();
        ctx.repo.delete(list.id).await.unwrap();
        assert!(ctx.repo.get_by_id(list.id).await.unwrap().is_none());
    }
}
