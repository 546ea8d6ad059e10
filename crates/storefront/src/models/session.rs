//! The authenticated caller.

use serde::Serialize;

use siqgarbs_core::{Email, Permission, PermissionSet, UserId};

use super::User;

/// Identity of the caller for the duration of one request.
///
/// Built by the auth extractors from a verified session token plus a fresh
/// read of the user's permissions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CurrentUser {
    pub id: UserId,
    pub email: Email,
    pub name: String,
    pub permissions: PermissionSet,
}

impl CurrentUser {
    /// Whether the caller holds any of `required`.
    #[must_use]
    pub fn has_any(&self, required: &[Permission]) -> bool {
        self.permissions.intersects(required)
    }
}

impl From<User> for CurrentUser {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            name: user.name,
            permissions: user.permissions,
        }
    }
}
