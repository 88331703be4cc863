//! Listsync Library
//!
//! Offline-first shopping lists: a local SQLite store, a list manager that
//! applies every change locally first, and a sync engine that pushes and pulls
//! those changes against a remote service.

pub mod config;
pub mod db;
pub mod error;
pub mod manager;
pub mod models;
pub mod store;
pub mod sync;

pub use db::SqliteStore;
pub use error::{ManagerError, ManagerResult, RemoteError, RemoteResult, StoreError, StoreResult};
pub use manager::{ListManager, ListManagerBuilder, PushHandle, SyncReport};
pub use models::{
    EntityKind, ItemFilter, ListItem, ListShare, PrevItem, Record, RecordKey, ShareAccess,
    ShoppingList, SyncState, User,
};
pub use store::RecordStore;
pub use sync::{ChangeEvent, MemoryRemote, PollIntervals, PollRate, RemoteClient};

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
