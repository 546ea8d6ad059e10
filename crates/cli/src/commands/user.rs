//! User permission commands.
//!
//! The HTTP permission endpoint needs an `ADMIN` or `PERMISSIONUPDATE` caller,
//! so the first administrator is granted from here.

use siqgarbs_core::{Email, Permission, PermissionSet};
use siqgarbs_storefront::db::Stores;

use super::{CommandError, connect};

/// Replace the permission set of the user with `email`.
pub async fn grant(email: &str, permissions: Vec<Permission>) -> Result<(), CommandError> {
    let email = Email::parse(email)?;
    let stores = Stores::postgres(&connect().await?);

    let user = stores
        .users
        .find_by_email(&email)
        .await?
        .ok_or_else(|| CommandError::UnknownUser(email.to_string()))?;

    let permissions = PermissionSet::from_iter(permissions);
    let updated = stores
        .users
        .set_permissions(user.id, &permissions)
        .await?
        .ok_or_else(|| CommandError::UnknownUser(email.to_string()))?;

    tracing::info!(
        user_id = %updated.id,
        email = %updated.email,
        permissions = ?updated.permissions.to_strings(),
        "Permissions updated"
    );
    Ok(())
}

/// Log the permissions of the user with `email`.
pub async fn show(email: &str) -> Result<(), CommandError> {
    let email = Email::parse(email)?;
    let stores = Stores::postgres(&connect().await?);

    let user = stores
        .users
        .find_by_email(&email)
        .await?
        .ok_or_else(|| CommandError::UnknownUser(email.to_string()))?;

    tracing::info!(
        user_id = %user.id,
        email = %user.email,
        name = %user.name,
        permissions = ?user.permissions.to_strings(),
        "User"
    );
    Ok(())
}
