//! User administration.

use siqgarbs_core::{Permission, PermissionSet, UserId};

use super::ServiceError;
use super::authz::authorize;
use crate::db::{Stores, UserRepository};
use crate::models::{CurrentUser, User};

/// Permissions that allow managing other users.
const MANAGE_USERS: [Permission; 2] = [Permission::Admin, Permission::PermissionUpdate];

/// User administration service.
pub struct UserAdminService<'a> {
    users: &'a dyn UserRepository,
}

impl<'a> UserAdminService<'a> {
    /// Create a new user administration service.
    #[must_use]
    pub fn new(stores: &'a Stores) -> Self {
        Self {
            users: stores.users.as_ref(),
        }
    }

    /// All accounts. Requires `ADMIN` or `PERMISSIONUPDATE`.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Forbidden` without the required permission.
    pub async fn users(&self, caller: &CurrentUser) -> Result<Vec<User>, ServiceError> {
        authorize(caller, &MANAGE_USERS)?;
        Ok(self.users.list().await?)
    }

    /// Replace a user's permission set. Requires `ADMIN` or `PERMISSIONUPDATE`.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Forbidden` without the required permission and
    /// `ServiceError::NotFound` for an unknown target.
    pub async fn update_permissions(
        &self,
        caller: &CurrentUser,
        target: UserId,
        permissions: PermissionSet,
    ) -> Result<User, ServiceError> {
        authorize(caller, &MANAGE_USERS)?;

        let user = self
            .users
            .set_permissions(target, &permissions)
            .await?
            .ok_or(ServiceError::NotFound("user"))?;

        tracing::info!(
            user_id = %caller.id,
            target_id = %target,
            permissions = ?user.permissions.to_strings(),
            "Permissions updated"
        );
        Ok(user)
    }
}
