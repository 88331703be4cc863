use serde::{Deserialize, Serialize};

/// Permission grants supplied by the session layer.
///
/// Grants are dotted paths. A `*` segment matches exactly one segment, and a
/// trailing `*` matches everything below it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permissions {
    grants: Vec<String>,
}

impl Permissions {
    pub fn new<I, S>(grants: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            grants: grants.into_iter().map(Into::into).collect(),
        }
    }

    /// Everything is allowed.
    pub fn all() -> Self {
        Self::new(["*"])
    }

    pub fn none() -> Self {
        Self::default()
    }

    pub fn allows(&self, action: &str) -> bool {
        self.grants.iter().any(|grant| grant_matches(grant, action))
    }
}

fn grant_matches(grant: &str, action: &str) -> bool {
    let grant: Vec<&str> = grant.split('.').collect();
    let action: Vec<&str> = action.split('.').collect();

    for (i, segment) in grant.iter().enumerate() {
        if *segment == "*" && i == grant.len() - 1 {
            return i < action.len();
        }
        match action.get(i) {
            Some(a) if *segment == "*" || segment == a => continue,
            _ => return false,
        }
    }
    grant.len() == action.len()
}

/// A user attached to the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub permissions: Permissions,
}

impl User {
    pub fn new(id: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            email: email.into(),
            permissions: Permissions::all(),
        }
    }

    pub fn with_permissions(mut self, permissions: Permissions) -> Self {
        self.permissions = permissions;
        self
    }

    pub fn read_action(&self) -> String {
        format!("api.users.{}.read", self.id)
    }

    pub fn write_action(&self) -> String {
        format!("api.users.{}.write", self.id)
    }
}
