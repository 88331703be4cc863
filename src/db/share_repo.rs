use sqlx::SqlitePool;
use uuid::Uuid;

use super::{parse_uuid, state_placeholders};
use crate::error::{StoreError, StoreResult};
use crate::models::{normalize_email, ListShare, SyncState};

const TABLE: &str = "list_shares";

pub struct ShareRepository {
    pool: SqlitePool,
}

#[derive(sqlx::FromRow)]
struct ShareRow {
    list_id: String,
    user_email: String,
    user_name: Option<String>,
    access: String,
    accepted: bool,
    accept_url: Option<String>,
    sync_user_id: Option<String>,
    sync_state: i64,
}

impl ShareRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn get(&self, list_id: Uuid, email: &str) -> StoreResult<Option<ListShare>> {
        let row: Option<ShareRow> =
            sqlx::query_as("SELECT * FROM list_shares WHERE list_id = ? AND user_email = ?")
                .bind(list_id.to_string())
                .bind(normalize_email(email))
                .fetch_optional(&self.pool)
                .await?;

        row.map(hydrate_share).transpose()
    }

    pub async fn list_in_list(&self, list_id: Uuid) -> StoreResult<Vec<ListShare>> {
        let rows: Vec<ShareRow> =
            sqlx::query_as("SELECT * FROM list_shares WHERE list_id = ? ORDER BY rowid")
                .bind(list_id.to_string())
                .fetch_all(&self.pool)
                .await?;

        rows.into_iter().map(hydrate_share).collect()
    }

    pub async fn list_in_states(
        &self,
        states: &[SyncState],
        user_id: Option<&str>,
    ) -> StoreResult<Vec<ListShare>> {
        if states.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT * FROM list_shares WHERE sync_user_id IS ? AND sync_state IN ({}) ORDER BY rowid",
            state_placeholders(states.len())
        );
        let mut query = sqlx::query_as::<_, ShareRow>(&sql).bind(user_id);
        for state in states {
            query = query.bind(state.code());
        }
        let rows = query.fetch_all(&self.pool).await?;

        rows.into_iter().map(hydrate_share).collect()
    }

    /// One share per (list, email): saving an existing pair updates it.
    pub async fn save(&self, share: &ListShare) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO list_shares
                (list_id, user_email, user_name, access, accepted, accept_url, sync_user_id, sync_state)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(list_id, user_email) DO UPDATE SET
                user_name = excluded.user_name,
                access = excluded.access,
                accepted = excluded.accepted,
                accept_url = excluded.accept_url,
                sync_user_id = excluded.sync_user_id,
                sync_state = excluded.sync_state
            "#,
        )
        .bind(share.list_id.to_string())
        .bind(normalize_email(&share.user_email))
        .bind(&share.user_name)
        .bind(share.access.as_str())
        .bind(share.accepted)
        .bind(&share.accept_url)
        .bind(&share.owner_id)
        .bind(share.state.code())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn delete(&self, list_id: Uuid, email: &str) -> StoreResult<()> {
        sqlx::query("DELETE FROM list_shares WHERE list_id = ? AND user_email = ?")
            .bind(list_id.to_string())
            .bind(normalize_email(email))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn delete_in_list(&self, list_id: Uuid) -> StoreResult<Vec<ListShare>> {
        let removed = self.list_in_list(list_id).await?;
        sqlx::query("DELETE FROM list_shares WHERE list_id = ?")
            .bind(list_id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(removed)
    }

    /// Move every row in state `from` to `to`, whatever its user scope.
    pub async fn replace_state(&self, from: SyncState, to: SyncState) -> StoreResult<u64> {
        let result = sqlx::query("UPDATE list_shares SET sync_state = ? WHERE sync_state = ?")
            .bind(to.code())
            .bind(from.code())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

fn hydrate_share(row: ShareRow) -> StoreResult<ListShare> {
    let corrupt = |reason: String| StoreError::Corrupt {
        table: TABLE,
        reason,
    };
    let state = SyncState::from_code(row.sync_state)
        .ok_or_else(|| corrupt(format!("unknown sync state {}", row.sync_state)))?;

    Ok(ListShare {
        list_id: parse_uuid(TABLE, &row.list_id)?,
        user_email: row.user_email,
        user_name: row.user_name,
        access: row.access.parse().map_err(corrupt)?,
        accepted: row.accepted,
        accept_url: row.accept_url,
        owner_id: row.sync_user_id,
        state,
    })
}
