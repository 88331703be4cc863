use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::{EntityKind, Ern, Meta, Record, RecordKey, SyncState};

pub const META_THEME_KEY: &str = "theme";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ListAccess {
    #[default]
    Private,
    Shared,
    Public,
}

impl fmt::Display for ListAccess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ListAccess::Private => write!(f, "private"),
            ListAccess::Shared => write!(f, "shared"),
            ListAccess::Public => write!(f, "public"),
        }
    }
}

impl FromStr for ListAccess {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "private" => Ok(ListAccess::Private),
            "shared" => Ok(ListAccess::Shared),
            "public" => Ok(ListAccess::Public),
            _ => Err(format!(
                "Invalid list access '{}'. Valid options: private, shared, public",
                s
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ListKind {
    #[default]
    ShoppingList,
    WishList,
}

impl fmt::Display for ListKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ListKind::ShoppingList => write!(f, "shopping_list"),
            ListKind::WishList => write!(f, "wish_list"),
        }
    }
}

impl FromStr for ListKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "shopping_list" => Ok(ListKind::ShoppingList),
            "wish_list" => Ok(ListKind::WishList),
            _ => Err(format!(
                "Invalid list type '{}'. Valid options: shopping_list, wish_list",
                s
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShoppingList {
    pub id: Uuid,
    pub name: String,
    pub modified: DateTime<Utc>,
    pub access: ListAccess,
    pub kind: ListKind,
    /// Owning user. `None` for lists created while logged out.
    pub owner_id: Option<String>,
    #[serde(default)]
    pub meta: Meta,
    #[serde(default)]
    pub state: SyncState,
}

impl ShoppingList {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            modified: Utc::now(),
            access: ListAccess::Private,
            kind: ListKind::ShoppingList,
            owner_id: None,
            meta: Meta::new(),
            state: SyncState::PendingCreate,
        }
    }

    pub fn wish_list(name: impl Into<String>) -> Self {
        Self::new(name).with_kind(ListKind::WishList)
    }

    pub fn with_kind(mut self, kind: ListKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_access(mut self, access: ListAccess) -> Self {
        self.access = access;
        self
    }

    pub fn with_theme(mut self, theme: impl Into<String>) -> Self {
        self.meta
            .insert(META_THEME_KEY.to_string(), theme.into().into());
        self
    }

    pub fn theme(&self) -> Option<&str> {
        self.meta.get(META_THEME_KEY).and_then(|v| v.as_str())
    }

    pub fn ern(&self) -> Ern {
        Ern::for_list(self.id)
    }
}

impl Record for ShoppingList {
    const KIND: EntityKind = EntityKind::List;

    fn key(&self) -> RecordKey {
        RecordKey::List(self.id)
    }

    fn state(&self) -> SyncState {
        self.state
    }

    fn set_state(&mut self, state: SyncState) {
        self.state = state;
    }

    fn owner(&self) -> Option<&str> {
        self.owner_id.as_deref()
    }

    fn set_owner(&mut self, owner: Option<String>) {
        self.owner_id = owner;
    }

    fn modified(&self) -> Option<DateTime<Utc>> {
        Some(self.modified)
    }

    fn same_content(&self, other: &Self) -> bool {
        self.id == other.id
            && self.name == other.name
            && self.modified == other.modified
            && self.access == other.access
            && self.kind == other.kind
            && self.meta == other.meta
    }
}

impl fmt::Display for ShoppingList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}, {})", self.name, self.access, self.state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_list_is_pending_create() {
        let list = ShoppingList::new("Groceries");
        assert_eq!(list.name, "Groceries");
        assert_eq!(list.state, SyncState::PendingCreate);
        assert_eq!(list.kind, ListKind::ShoppingList);
        assert!(list.owner_id.is_none());
    }

    #[test]
    fn test_theme_meta() {
        let list = ShoppingList::wish_list("Birthday").with_theme("blue");
        assert_eq!(list.kind, ListKind::WishList);
        assert_eq!(list.theme(), Some("blue"));
    }

    #[test]
    fn test_same_content_ignores_sync_bookkeeping() {
        let list = ShoppingList::new("Groceries");
        let mut other = list.clone();
        other.state = SyncState::Synced;
        other.owner_id = Some("user1".into());
        assert!(list.same_content(&other));

        other.name = "Hardware".into();
        assert!(!list.same_content(&other));
    }

    #[test]
    fn test_access_parse() {
        assert_eq!("Shared".parse::<ListAccess>().unwrap(), ListAccess::Shared);
        assert!("secret".parse::<ListAccess>().is_err());
        assert_eq!("wish_list".parse::<ListKind>().unwrap(), ListKind::WishList);
    }
}
