//! User domain types.

use chrono::{DateTime, Utc};
use serde::Serialize;

use siqgarbs_core::{Email, PermissionSet, UserId};

/// A storefront account.
///
/// The password hash is deliberately not part of this type; repositories
/// return it separately only where a credential check needs it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    /// Unique user ID.
    pub id: UserId,
    /// Normalized email address.
    pub email: Email,
    /// Display name.
    pub name: String,
    /// Permissions held by the account.
    pub permissions: PermissionSet,
    /// When the account was created.
    pub created_at: DateTime<Utc>,
    /// When the account was last updated.
    pub updated_at: DateTime<Utc>,
}

/// Data required to insert a new account.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: Email,
    pub name: String,
    /// Argon2id PHC string.
    pub password_hash: String,
    pub permissions: PermissionSet,
}
