//! Account service: sign-up, sign-in, sign-out, and the current user.

use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use tower_sessions::cookie::Cookie;

use siqgarbs_core::{Email, PermissionSet};

use super::ServiceError;
use super::session::SessionManager;
use crate::db::{RepositoryError, Stores, UserRepository};
use crate::models::{CurrentUser, NewUser, User};

/// Minimum password length.
pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Maximum display name length.
const MAX_NAME_LENGTH: usize = 100;

/// A user together with a freshly issued session token.
#[derive(Debug, Clone)]
pub struct SignedIn {
    pub user: User,
    pub token: String,
}

/// Account service.
pub struct AuthService<'a> {
    users: &'a dyn UserRepository,
    sessions: &'a SessionManager,
}

impl<'a> AuthService<'a> {
    /// Create a new account service.
    #[must_use]
    pub fn new(stores: &'a Stores, sessions: &'a SessionManager) -> Self {
        Self {
            users: stores.users.as_ref(),
            sessions,
        }
    }

    /// Register a new account with permissions `{USER}` and sign it in.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Validation` for a malformed email, empty name,
    /// or short password, and `ServiceError::Conflict` if the email is taken.
    pub async fn sign_up(
        &self,
        email: &str,
        name: &str,
        password: &str,
    ) -> Result<SignedIn, ServiceError> {
        let email = Email::parse(email)?;
        let name = validate_name(name)?;
        validate_password(password)?;

        let password_hash = hash_password(password)?;

        let user = self
            .users
            .create(NewUser {
                email,
                name,
                password_hash,
                permissions: PermissionSet::new_account(),
            })
            .await
            .map_err(|e| match e {
                RepositoryError::Conflict(_) => {
                    ServiceError::Conflict("an account with that email already exists".to_owned())
                }
                other => ServiceError::Repository(other),
            })?;

        tracing::info!(user_id = %user.id, "Account created");

        let token = self.sessions.issue(user.id)?;
        Ok(SignedIn { user, token })
    }

    /// Sign in with email and password.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::InvalidCredentials` if the email is unknown or
    /// the password is wrong, without saying which.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<SignedIn, ServiceError> {
        let email = Email::parse(email).map_err(|_| ServiceError::InvalidCredentials)?;

        let (user, password_hash) = self
            .users
            .find_with_password(&email)
            .await?
            .ok_or(ServiceError::InvalidCredentials)?;

        verify_password(password, &password_hash)?;

        let token = self.sessions.issue(user.id)?;
        Ok(SignedIn { user, token })
    }

    /// Cookie that drops the session from the browser.
    ///
    /// Tokens are stateless, so a copied token stays valid until it expires.
    #[must_use]
    pub fn sign_out(&self) -> Cookie<'static> {
        self.sessions.clear()
    }

    /// The signed-in user, or `None` without a session.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::Repository` if the lookup fails.
    pub async fn me(&self, caller: Option<&CurrentUser>) -> Result<Option<User>, ServiceError> {
        match caller {
            Some(caller) => Ok(self.users.find_by_id(caller.id).await?),
            None => Ok(None),
        }
    }
}

/// Validate a display name and return it trimmed.
fn validate_name(name: &str) -> Result<String, ServiceError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ServiceError::Validation("name cannot be empty".to_owned()));
    }
    if name.chars().count() > MAX_NAME_LENGTH {
        return Err(ServiceError::Validation(format!(
            "name must be at most {MAX_NAME_LENGTH} characters"
        )));
    }
    Ok(name.to_owned())
}

/// Validate password meets requirements.
pub(crate) fn validate_password(password: &str) -> Result<(), ServiceError> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(ServiceError::Validation(format!(
            "password must be at least {MIN_PASSWORD_LENGTH} characters"
        )));
    }

    Ok(())
}

/// Hash a password using Argon2id.
pub(crate) fn hash_password(password: &str) -> Result<String, ServiceError> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();

    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| ServiceError::Internal(format!("password hashing failed: {e}")))
}

/// Verify a password against a hash.
fn verify_password(password: &str, hash: &str) -> Result<(), ServiceError> {
    let parsed_hash = PasswordHash::new(hash).map_err(|_| ServiceError::InvalidCredentials)?;
    let argon2 = Argon2::default();

    argon2
        .verify_password(password.as_bytes(), &parsed_hash)
        .map_err(|_| ServiceError::InvalidCredentials)
}
