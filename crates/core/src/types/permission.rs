//! Permission tags and permission sets.
//!
//! Permissions are a closed set. Authorization questions are always phrased
//! as "does the caller hold any of these?", see [`PermissionSet::intersects`].

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// A capability tag held by a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Permission {
    /// Full administrative access.
    Admin,
    /// Baseline permission granted to every account at sign-up.
    User,
    /// May create catalog items.
    ItemCreate,
    /// May update catalog items.
    ItemUpdate,
    /// May delete any catalog item.
    ItemDelete,
    /// May view users and change their permissions.
    PermissionUpdate,
}

impl Permission {
    /// Every permission, in declaration order.
    pub const ALL: [Self; 6] = [
        Self::Admin,
        Self::User,
        Self::ItemCreate,
        Self::ItemUpdate,
        Self::ItemDelete,
        Self::PermissionUpdate,
    ];

    /// Stored and wire representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "ADMIN",
            Self::User => "USER",
            Self::ItemCreate => "ITEMCREATE",
            Self::ItemUpdate => "ITEMUPDATE",
            Self::ItemDelete => "ITEMDELETE",
            Self::PermissionUpdate => "PERMISSIONUPDATE",
        }
    }
}

impl std::fmt::Display for Permission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a string does not name a [`Permission`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown permission: {0}")]
pub struct UnknownPermission(pub String);

impl std::str::FromStr for Permission {
    type Err = UnknownPermission;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownPermission(s.to_owned()))
    }
}

/// The set of permissions a user holds.
///
/// ```
/// use siqgarbs_core::{Permission, PermissionSet};
///
/// let held = PermissionSet::from_iter([Permission::User, Permission::ItemDelete]);
/// assert!(held.intersects(&[Permission::Admin, Permission::ItemDelete]));
/// assert!(!held.intersects(&[Permission::Admin, Permission::PermissionUpdate]));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PermissionSet(BTreeSet<Permission>);

impl PermissionSet {
    /// Permissions granted to a freshly signed-up account.
    #[must_use]
    pub fn new_account() -> Self {
        Self::from_iter([Permission::User])
    }

    /// Whether the set holds `permission`.
    #[must_use]
    pub fn contains(&self, permission: Permission) -> bool {
        self.0.contains(&permission)
    }

    /// Whether the set holds at least one of `required`.
    ///
    /// An empty `required` list is never satisfied.
    #[must_use]
    pub fn intersects(&self, required: &[Permission]) -> bool {
        required.iter().any(|p| self.0.contains(p))
    }

    /// Iterate over held permissions in a stable order.
    pub fn iter(&self) -> impl Iterator<Item = Permission> + '_ {
        self.0.iter().copied()
    }

    /// Number of held permissions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no permissions are held.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Stored representation, one tag per element.
    #[must_use]
    pub fn to_strings(&self) -> Vec<String> {
        self.iter().map(|p| p.as_str().to_owned()).collect()
    }

    /// Parse stored tags.
    ///
    /// # Errors
    ///
    /// Returns [`UnknownPermission`] for the first tag that is not recognised.
    pub fn from_strings<I, S>(tags: I) -> Result<Self, UnknownPermission>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        tags.into_iter()
            .map(|tag| tag.as_ref().parse::<Permission>())
            .collect()
    }
}

impl FromIterator<Permission> for PermissionSet {
    fn from_iter<T: IntoIterator<Item = Permission>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}
