mod ern;
mod item;
mod list;
mod share;
mod sync_state;
mod user;

pub use ern::{Ern, ITEM_ERN_TYPE, LIST_ERN_TYPE};
pub use item::{ItemFilter, ListItem, PrevItem, META_COMMENT_KEY};
pub use list::{ListAccess, ListKind, ShoppingList, META_THEME_KEY};
pub use share::{normalize_email, ListShare, ShareAccess, DEFAULT_ACCEPT_URL};
pub use sync_state::SyncState;
pub use user::{Permissions, User};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Opaque key/value metadata attached to lists and items.
pub type Meta = BTreeMap<String, serde_json::Value>;

/// The three kinds of records the engine keeps in sync.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    List,
    Item,
    Share,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::List => write!(f, "list"),
            EntityKind::Item => write!(f, "item"),
            EntityKind::Share => write!(f, "share"),
        }
    }
}

/// Identity of a stored record. Shares are keyed by list and normalized email.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RecordKey {
    List(Uuid),
    Item(Uuid),
    Share(Uuid, String),
}

impl RecordKey {
    /// The record's id as shown to users: a uuid, or `list/email` for shares.
    pub fn id_string(&self) -> String {
        match self {
            RecordKey::List(id) | RecordKey::Item(id) => id.to_string(),
            RecordKey::Share(list_id, email) => format!("{}/{}", list_id, email),
        }
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordKey::List(id) => write!(f, "list {}", id),
            RecordKey::Item(id) => write!(f, "item {}", id),
            RecordKey::Share(list_id, email) => write!(f, "share {}/{}", list_id, email),
        }
    }
}

/// Common surface of every synced record.
pub trait Record: Clone + fmt::Debug + Send + Sync + 'static {
    const KIND: EntityKind;

    fn key(&self) -> RecordKey;
    fn state(&self) -> SyncState;
    fn set_state(&mut self, state: SyncState);
    /// The user scope the record belongs to. `None` is the logged-out scope.
    fn owner(&self) -> Option<&str>;
    fn set_owner(&mut self, owner: Option<String>);
    /// Last modification time, when the record type carries one.
    fn modified(&self) -> Option<DateTime<Utc>>;
    /// Field equality, ignoring sync bookkeeping.
    fn same_content(&self, other: &Self) -> bool;
}
