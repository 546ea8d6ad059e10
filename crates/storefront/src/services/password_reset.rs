//! Password reset flow.
//!
//! A reset token is 32 random bytes, hex encoded. Only its SHA-256 digest is
//! stored, at most one per user; requesting again replaces the previous
//! token. A token is good for one hour and one use.

use chrono::{Duration, Utc};
use rand::RngCore;
use sha2::{Digest, Sha256};

use siqgarbs_core::Email;

use super::ServiceError;
use super::auth::{SignedIn, hash_password, validate_password};
use super::email::{Mailer, password_reset_email};
use super::session::SessionManager;
use crate::db::{Stores, UserRepository};

/// Number of random bytes in a reset token.
const RESET_TOKEN_BYTES: usize = 32;

/// How long a reset token stays valid, in minutes.
pub const RESET_TOKEN_TTL_MINUTES: i64 = 60;

/// Password reset service.
pub struct PasswordResetService<'a> {
    users: &'a dyn UserRepository,
    mailer: &'a dyn Mailer,
    sessions: &'a SessionManager,
    frontend_url: &'a str,
}

impl<'a> PasswordResetService<'a> {
    /// Create a new password reset service.
    ///
    /// Reset links point at `{frontend_url}/reset?resetToken=...`.
    #[must_use]
    pub fn new(
        stores: &'a Stores,
        mailer: &'a dyn Mailer,
        sessions: &'a SessionManager,
        frontend_url: &'a str,
    ) -> Self {
        Self {
            users: stores.users.as_ref(),
            mailer,
            sessions,
            frontend_url,
        }
    }

    /// Issue a reset token for `email` and mail the link.
    ///
    /// A mail failure is logged and does not undo the token.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::NotFound` if no account uses that email. HTTP
    /// callers should not pass that distinction on.
    pub async fn request_reset(&self, email: &str) -> Result<(), ServiceError> {
        let email = Email::parse(email)?;
        let user = self
            .users
            .find_by_email(&email)
            .await?
            .ok_or(ServiceError::NotFound("user"))?;

        let token = generate_reset_token();
        self.users
            .store_reset_token(user.id, &digest_token(&token), Utc::now())
            .await?;

        let reset_url = format!(
            "{}/reset?resetToken={token}",
            self.frontend_url.trim_end_matches('/')
        );

        match password_reset_email(user.email.as_str(), &reset_url) {
            Ok(message) => {
                if let Err(e) = self.mailer.send(message).await {
                    tracing::error!(user_id = %user.id, error = %e, "Failed to send password reset email");
                }
            }
            Err(e) => {
                tracing::error!(user_id = %user.id, error = %e, "Failed to render password reset email");
            }
        }

        tracing::info!(user_id = %user.id, "Password reset requested");
        Ok(())
    }

    /// Set a new password using a reset token, then sign the user in.
    ///
    /// # Errors
    ///
    /// Returns `ServiceError::PasswordMismatch` if the two passwords differ,
    /// `ServiceError::Validation` if the password is too short, and
    /// `ServiceError::InvalidOrExpiredToken` if the token is unknown, used,
    /// or older than an hour.
    pub async fn reset_password(
        &self,
        token: &str,
        password: &str,
        confirm_password: &str,
    ) -> Result<SignedIn, ServiceError> {
        if password != confirm_password {
            return Err(ServiceError::PasswordMismatch);
        }
        validate_password(password)?;

        let token_hash = digest_token(token.trim());
        let issued_after = Utc::now() - Duration::minutes(RESET_TOKEN_TTL_MINUTES);

        // Hashing a password is expensive; only do it for a token that exists.
        // The consume below still decides, so a racing reset cannot win twice.
        if !self
            .users
            .reset_token_is_live(&token_hash, issued_after)
            .await?
        {
            return Err(ServiceError::InvalidOrExpiredToken);
        }

        let password_hash = hash_password(password)?;
        let user = self
            .users
            .consume_reset_token(&token_hash, issued_after, &password_hash)
            .await?
            .ok_or(ServiceError::InvalidOrExpiredToken)?;

        tracing::info!(user_id = %user.id, "Password reset completed");

        let token = self.sessions.issue(user.id)?;
        Ok(SignedIn { user, token })
    }
}

/// 32 bytes from the thread-local CSPRNG (seeded from the OS), hex encoded.
fn generate_reset_token() -> String {
    let mut bytes = [0u8; RESET_TOKEN_BYTES];
    rand::rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Stored form of a reset token.
fn digest_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}
