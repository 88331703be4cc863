//! Entity reference names: `ern:<type>:<id>`.

use std::fmt;
use uuid::Uuid;

pub const LIST_ERN_TYPE: &str = "shoppinglist";
pub const ITEM_ERN_TYPE: &str = "shoppinglistitem";

/// A structured identifier derived from an endpoint type and an item id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Ern {
    pub kind: String,
    pub id: String,
}

impl Ern {
    pub fn new(kind: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            id: id.into(),
        }
    }

    pub fn for_list(id: Uuid) -> Self {
        Self::new(LIST_ERN_TYPE, id.to_string())
    }

    pub fn for_item(id: Uuid) -> Self {
        Self::new(ITEM_ERN_TYPE, id.to_string())
    }

    /// Parse `ern:<type>:<id>`. The id may itself contain colons.
    pub fn parse(s: &str) -> Option<Self> {
        let rest = s.strip_prefix("ern:")?;
        let (kind, id) = rest.split_once(':')?;
        if kind.is_empty() || id.is_empty() {
            return None;
        }
        Some(Self::new(kind, id))
    }
}

impl fmt::Display for Ern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ern:{}:{}", self.kind, self.id)
    }
}
