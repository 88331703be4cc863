use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::{EntityKind, Record, RecordKey, SyncState};

/// Accept URL used when a share is created without one.
pub const DEFAULT_ACCEPT_URL: &str = "https://lists.example.com/share/accept";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub enum ShareAccess {
    #[serde(rename = "none")]
    None,
    #[serde(rename = "r")]
    ReadOnly,
    #[serde(rename = "rw")]
    ReadWrite,
    #[serde(rename = "owner")]
    Owner,
}

impl ShareAccess {
    pub fn as_str(self) -> &'static str {
        match self {
            ShareAccess::None => "none",
            ShareAccess::ReadOnly => "r",
            ShareAccess::ReadWrite => "rw",
            ShareAccess::Owner => "owner",
        }
    }
}

impl fmt::Display for ShareAccess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ShareAccess {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "none" => Ok(ShareAccess::None),
            "r" | "read" => Ok(ShareAccess::ReadOnly),
            "rw" | "write" => Ok(ShareAccess::ReadWrite),
            "owner" => Ok(ShareAccess::Owner),
            _ => Err(format!(
                "Invalid share access '{}'. Valid options: none, r, rw, owner",
                s
            )),
        }
    }
}

/// A user's access to a list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListShare {
    pub list_id: Uuid,
    pub user_email: String,
    pub user_name: Option<String>,
    pub access: ShareAccess,
    pub accepted: bool,
    pub accept_url: Option<String>,
    pub owner_id: Option<String>,
    #[serde(default)]
    pub state: SyncState,
}

impl ListShare {
    pub fn new(list_id: Uuid, user_email: &str, access: ShareAccess) -> Self {
        Self {
            list_id,
            user_email: normalize_email(user_email),
            user_name: None,
            access,
            accepted: false,
            accept_url: None,
            owner_id: None,
            state: SyncState::PendingCreate,
        }
    }
}

/// Emails compare case-insensitively; shares are stored under the lowercase form.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

impl Record for ListShare {
    const KIND: EntityKind = EntityKind::Share;

    fn key(&self) -> RecordKey {
        RecordKey::Share(self.list_id, normalize_email(&self.user_email))
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
        None
    }

    fn same_content(&self, other: &Self) -> bool {
        self.key() == other.key()
            && self.user_name == other.user_name
            && self.access == other.access
            && self.accepted == other.accepted
            && self.accept_url == other.accept_url
    }
}

impl fmt::Display for ListShare {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let accepted = if self.accepted { "accepted" } else { "pending" };
        write!(f, "{} [{}] {}", self.user_email, self.access, accepted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_email_normalized() {
        let list_id = Uuid::new_v4();
        let share = ListShare::new(list_id, "  Bob@Example.COM ", ShareAccess::ReadOnly);
        assert_eq!(share.user_email, "bob@example.com");
        assert_eq!(
            share.key(),
            RecordKey::Share(list_id, "bob@example.com".to_string())
        );
    }

    #[test]
    fn test_access_wire_strings() {
        assert_eq!(
            serde_json::to_string(&ShareAccess::ReadWrite).unwrap(),
            "\"rw\""
        );
        assert_eq!("owner".parse::<ShareAccess>().unwrap(), ShareAccess::Owner);
        assert_eq!("R".parse::<ShareAccess>().unwrap(), ShareAccess::ReadOnly);
        assert!("admin".parse::<ShareAccess>().is_err());
    }

    #[test]
    fn test_shares_have_no_timestamp() {
        let share = ListShare::new(Uuid::new_v4(), "a@b.c", ShareAccess::None);
        assert!(share.modified().is_none());
    }
}
