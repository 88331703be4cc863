//! Access checks against the attached user's grants.
//!
//! Without an effective user the engine works on local data only and every
//! operation is allowed.

use crate::models::User;

pub fn can_read_lists(user: Option<&User>) -> bool {
    user.map_or(true, |u| u.permissions.allows(&u.read_action()))
}

pub fn can_write_lists(user: Option<&User>) -> bool {
    user.map_or(true, |u| u.permissions.allows(&u.write_action()))
}
