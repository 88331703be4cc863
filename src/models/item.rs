use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::{EntityKind, Ern, Meta, Record, RecordKey, SyncState};

pub const META_COMMENT_KEY: &str = "comment";

/// Position of an item in its list's manual order, as a pointer to its predecessor.
///
/// Stored as a nullable string: `NULL` is unknown, `""` is first, anything else
/// is the id of the preceding item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "Option<String>", into = "Option<String>")]
pub enum PrevItem {
    #[default]
    Unknown,
    First,
    After(Uuid),
}

impl PrevItem {
    pub fn from_column(value: Option<&str>) -> Self {
        match value {
            None => PrevItem::Unknown,
            Some("") => PrevItem::First,
            Some(s) => Uuid::parse_str(s)
                .map(PrevItem::After)
                .unwrap_or(PrevItem::Unknown),
        }
    }

    pub fn to_column(self) -> Option<String> {
        match self {
            PrevItem::Unknown => None,
            PrevItem::First => Some(String::new()),
            PrevItem::After(id) => Some(id.to_string()),
        }
    }

    /// The predecessor pointer that places an item directly after `id`, or first.
    pub fn after(id: Option<Uuid>) -> Self {
        id.map(PrevItem::After).unwrap_or(PrevItem::First)
    }
}

impl From<Option<String>> for PrevItem {
    fn from(value: Option<String>) -> Self {
        PrevItem::from_column(value.as_deref())
    }
}

impl From<PrevItem> for Option<String> {
    fn from(value: PrevItem) -> Self {
        value.to_column()
    }
}

/// Which items a query or bulk removal applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ItemFilter {
    #[default]
    All,
    Ticked,
    Unticked,
}

impl ItemFilter {
    pub fn matches(self, item: &ListItem) -> bool {
        match self {
            ItemFilter::All => true,
            ItemFilter::Ticked => item.ticked,
            ItemFilter::Unticked => !item.ticked,
        }
    }
}

impl FromStr for ItemFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "all" => Ok(ItemFilter::All),
            "ticked" => Ok(ItemFilter::Ticked),
            "unticked" => Ok(ItemFilter::Unticked),
            _ => Err(format!(
                "Invalid filter '{}'. Valid options: all, ticked, unticked",
                s
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListItem {
    pub id: Uuid,
    pub list_id: Uuid,
    /// The item's description.
    pub name: String,
    pub count: i64,
    pub ticked: bool,
    pub offer_id: Option<String>,
    pub creator: Option<String>,
    pub modified: DateTime<Utc>,
    #[serde(default)]
    pub meta: Meta,
    #[serde(default)]
    pub prev_item: PrevItem,
    pub owner_id: Option<String>,
    #[serde(default)]
    pub state: SyncState,
    /// Position within the list, filled in by sorted queries. -1 when unresolved.
    #[serde(skip, default = "unresolved_index")]
    pub order_index: i64,
}

fn unresolved_index() -> i64 {
    -1
}

impl ListItem {
    pub fn new(list_id: Uuid, name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            list_id,
            name: name.into(),
            count: 1,
            ticked: false,
            offer_id: None,
            creator: None,
            modified: Utc::now(),
            meta: Meta::new(),
            prev_item: PrevItem::Unknown,
            owner_id: None,
            state: SyncState::PendingCreate,
            order_index: -1,
        }
    }

    pub fn with_count(mut self, count: i64) -> Self {
        self.count = count;
        self
    }

    pub fn with_offer(mut self, offer_id: impl Into<String>) -> Self {
        self.offer_id = Some(offer_id.into());
        self
    }

    pub fn with_prev(mut self, prev_item: PrevItem) -> Self {
        self.prev_item = prev_item;
        self
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.meta
            .insert(META_COMMENT_KEY.to_string(), comment.into().into());
        self
    }

    pub fn comment(&self) -> Option<&str> {
        self.meta.get(META_COMMENT_KEY).and_then(|v| v.as_str())
    }

    pub fn ern(&self) -> Ern {
        Ern::for_item(self.id)
    }
}

impl Record for ListItem {
    const KIND: EntityKind = EntityKind::Item;

    fn key(&self) -> RecordKey {
        RecordKey::Item(self.id)
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
            && self.list_id == other.list_id
            && self.name == other.name
            && self.count == other.count
            && self.ticked == other.ticked
            && self.offer_id == other.offer_id
            && self.creator == other.creator
            && self.modified == other.modified
            && self.meta == other.meta
            && self.prev_item == other.prev_item
    }
}

impl fmt::Display for ListItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let check = if self.ticked { "[x]" } else { "[ ]" };
        write!(f, "{} {:<20} {}", check, self.name, self.count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prev_item_columns() {
        let id = Uuid::new_v4();
        assert_eq!(PrevItem::from_column(None), PrevItem::Unknown);
        assert_eq!(PrevItem::from_column(Some("")), PrevItem::First);
        assert_eq!(
            PrevItem::from_column(Some(&id.to_string())),
            PrevItem::After(id)
        );
        assert_eq!(PrevItem::from_column(Some("garbage")), PrevItem::Unknown);

        assert_eq!(PrevItem::First.to_column(), Some(String::new()));
        assert_eq!(PrevItem::Unknown.to_column(), None);
    }

    #[test]
    fn test_prev_item_json_uses_string_sentinels() {
        let item = ListItem::new(Uuid::new_v4(), "milk").with_prev(PrevItem::First);
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["prev_item"], serde_json::json!(""));

        let parsed: ListItem = serde_json::from_value(json).unwrap();
        assert_eq!(parsed.prev_item, PrevItem::First);
        assert_eq!(parsed.order_index, -1);
    }

    #[test]
    fn test_filter() {
        let mut item = ListItem::new(Uuid::new_v4(), "eggs");
        assert!(ItemFilter::Unticked.matches(&item));
        item.ticked = true;
        assert!(ItemFilter::Ticked.matches(&item));
        assert!(!ItemFilter::Unticked.matches(&item));
        assert!(ItemFilter::All.matches(&item));
    }

    #[test]
    fn test_display() {
        let item = ListItem::new(Uuid::new_v4(), "bread").with_count(2);
        let output = format!("{}", item);
        assert!(output.starts_with("[ ] bread"));
        assert!(output.ends_with('2'));
    }
}
