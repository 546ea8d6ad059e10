//! Authorization policy.
//!
//! Every protected operation states its rule in terms of these three checks.
//! Permission requirements are any-of: holding one listed permission is
//! enough, and an empty list admits nobody.

use siqgarbs_core::{Permission, UserId};

use super::ServiceError;
use crate::models::CurrentUser;

/// Require the caller to hold at least one of `required`.
///
/// # Errors
///
/// Returns `ServiceError::Forbidden` otherwise.
pub fn authorize(caller: &CurrentUser, required: &[Permission]) -> Result<(), ServiceError> {
    if caller.has_any(required) {
        Ok(())
    } else {
        tracing::info!(
            user_id = %caller.id,
            required = ?required,
            "Permission check failed"
        );
        Err(ServiceError::Forbidden)
    }
}

/// Require the caller to own the record or hold one of `required`.
///
/// # Errors
///
/// Returns `ServiceError::Forbidden` otherwise.
pub fn authorize_owner_or(
    caller: &CurrentUser,
    owner: UserId,
    required: &[Permission],
) -> Result<(), ServiceError> {
    if caller.id == owner {
        return Ok(());
    }
    authorize(caller, required)
}

/// Require the caller to own the record. No permission overrides this.
///
/// # Errors
///
/// Returns `ServiceError::Forbidden` otherwise.
pub fn ensure_owner(caller: &CurrentUser, owner: UserId) -> Result<(), ServiceError> {
    if caller.id == owner {
        Ok(())
    } else {
        Err(ServiceError::Forbidden)
    }
}

/// Require a session.
///
/// # Errors
///
/// Returns `ServiceError::Unauthenticated` when `caller` is `None`.
pub fn require_caller(caller: Option<&CurrentUser>) -> Result<&CurrentUser, ServiceError> {
    caller.ok_or(ServiceError::Unauthenticated)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use siqgarbs_core::{Email, PermissionSet};

    use super::*;

    fn caller(id: i32, permissions: &[Permission]) -> CurrentUser {
        CurrentUser {
            id: UserId::new(id),
            email: Email::parse("caller@example.com").unwrap(),
            name: "Caller".to_owned(),
            permissions: permissions.iter().copied().collect::<PermissionSet>(),
        }
    }

    #[test]
    fn test_authorize_any_of() {
        let user = caller(1, &[Permission::User]);
        let admin = caller(2, &[Permission::User, Permission::Admin]);
        let required = [Permission::Admin, Permission::PermissionUpdate];

        assert!(matches!(
            authorize(&user, &required),
            Err(ServiceError::Forbidden)
        ));
        assert!(authorize(&admin, &required).is_ok());
        assert!(authorize(&admin, &[]).is_err());
    }

    #[test]
    fn test_owner_or_permission() {
        let owner = caller(1, &[Permission::User]);
        let deleter = caller(2, &[Permission::ItemDelete]);
        let stranger = caller(3, &[Permission::User]);
        let required = [Permission::Admin, Permission::ItemDelete];

        assert!(authorize_owner_or(&owner, UserId::new(1), &required).is_ok());
        assert!(authorize_owner_or(&deleter, UserId::new(1), &required).is_ok());
        assert!(authorize_owner_or(&stranger, UserId::new(1), &required).is_err());
    }

    #[test]
    fn test_ensure_owner_ignores_permissions() {
        let admin = caller(2, &[Permission::Admin]);
        assert!(matches!(
            ensure_owner(&admin, UserId::new(1)),
            Err(ServiceError::Forbidden)
        ));
        assert!(ensure_owner(&admin, UserId::new(2)).is_ok());
    }

    #[test]
    fn test_require_caller() {
        assert!(matches!(
            require_caller(None),
            Err(ServiceError::Unauthenticated)
        ));
        let user = caller(1, &[]);
        assert_eq!(require_caller(Some(&user)).unwrap().id, UserId::new(1));
    }
}
