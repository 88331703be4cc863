use std::sync::Arc;
use tempfile::TempDir;

use super::ListManager;
use crate::db::SqliteStore;
use crate::models::User;
use crate::store::RecordStore;
use crate::sync::{MemoryRemote, PollRate};

pub(crate) struct TestContext {
    pub manager: ListManager,
    pub store: Arc<SqliteStore>,
    /// Not wired to the manager in offline contexts.
    pub remote: Arc<MemoryRemote>,
    _temp_dir: TempDir, // Keep alive for duration of test
}

impl TestContext {
    /// No remote, no user.
    pub async fn offline() -> Self {
        Self::setup(false, None).await
    }

    /// In-memory remote with user `u1` attached. Polling is off; tests drive
    /// cycles with `force_sync`.
    pub async fn online() -> Self {
        Self::setup(true, Some(User::new("u1", "u1@example.com"))).await
    }

    pub async fn online_logged_out() -> Self {
        Self::setup(true, None).await
    }

    async fn setup(online: bool, user: Option<User>) -> Self {
        let temp_dir = TempDir::new().unwrap();
        let store = Arc::new(
            SqliteStore::open(&temp_dir.path().join("test.db"))
                .await
                .unwrap(),
        );
        let remote = Arc::new(MemoryRemote::new());

        let mut builder = ListManager::builder(store.clone() as Arc<dyn RecordStore>)
            .poll_rate(PollRate::Off);
        if online {
            builder = builder.remote(remote.clone());
        }
        if let Some(user) = user {
            builder = builder.user(user);
        }

        TestContext {
            manager: builder.build().await.unwrap(),
            store,
            remote,
            _temp_dir: temp_dir,
        }
    }
}
