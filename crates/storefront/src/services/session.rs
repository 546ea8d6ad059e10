//! Session tokens.
//!
//! A session is a signed HS256 JWT carried in the `token` cookie. Nothing is
//! stored server-side: verification checks the signature and expiry only.
//! Signing out drops the cookie on the client; a copied token stays valid
//! until it expires.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tower_sessions::cookie::{Cookie, SameSite, time};

use siqgarbs_core::UserId;

/// Name of the session cookie.
pub const SESSION_COOKIE_NAME: &str = "token";

/// Session lifetime in days.
pub const SESSION_TTL_DAYS: i64 = 365;

/// Errors from issuing or verifying a session token.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Token absent, malformed, wrongly signed, or expired.
    #[error("invalid session")]
    Invalid,

    /// The token could not be signed.
    #[error("failed to sign session: {0}")]
    Signing(#[source] jsonwebtoken::errors::Error),
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: i32,
    iat: i64,
    exp: i64,
}

/// Issues and verifies session tokens.
#[derive(Clone)]
pub struct SessionManager {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    secure_cookie: bool,
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("keys", &"[REDACTED]")
            .field("secure_cookie", &self.secure_cookie)
            .finish_non_exhaustive()
    }
}

impl SessionManager {
    /// Create a session manager signing with `secret`.
    ///
    /// `secure_cookie` sets the `Secure` attribute on issued cookies and
    /// should be on whenever the site is served over HTTPS.
    #[must_use]
    pub fn new(secret: &SecretString, secure_cookie: bool) -> Self {
        let bytes = secret.expose_secret().as_bytes();
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_required_spec_claims(&["exp", "sub"]);

        Self {
            encoding_key: EncodingKey::from_secret(bytes),
            decoding_key: DecodingKey::from_secret(bytes),
            validation,
            secure_cookie,
        }
    }

    /// Issue a token for `user_id`, valid for [`SESSION_TTL_DAYS`].
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Signing` if the token cannot be encoded.
    pub fn issue(&self, user_id: UserId) -> Result<String, SessionError> {
        self.issue_at(user_id, Utc::now())
    }

    /// Issue a token as if it were `issued_at`.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Signing` if the token cannot be encoded.
    pub fn issue_at(
        &self,
        user_id: UserId,
        issued_at: DateTime<Utc>,
    ) -> Result<String, SessionError> {
        let claims = Claims {
            sub: user_id.as_i32(),
            iat: issued_at.timestamp(),
            exp: (issued_at + Duration::days(SESSION_TTL_DAYS)).timestamp(),
        };

        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(SessionError::Signing)
    }

    /// Verify a token and return the user it was issued to.
    ///
    /// Does not consult the data store.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Invalid` for any token that fails verification.
    pub fn verify(&self, token: &str) -> Result<UserId, SessionError> {
        jsonwebtoken::decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| UserId::new(data.claims.sub))
            .map_err(|e| {
                tracing::debug!(error = %e, "Session token rejected");
                SessionError::Invalid
            })
    }

    /// Build the cookie that carries `token` to the browser.
    #[must_use]
    pub fn cookie(&self, token: String) -> Cookie<'static> {
        Cookie::build((SESSION_COOKIE_NAME, token))
            .http_only(true)
            .secure(self.secure_cookie)
            .same_site(SameSite::Lax)
            .path("/")
            .max_age(time::Duration::days(SESSION_TTL_DAYS))
            .build()
    }

    /// Build a cookie that removes the session from the browser.
    #[must_use]
    pub fn clear(&self) -> Cookie<'static> {
        Cookie::build((SESSION_COOKIE_NAME, ""))
            .http_only(true)
            .secure(self.secure_cookie)
            .same_site(SameSite::Lax)
            .path("/")
            .max_age(time::Duration::ZERO)
            .build()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn manager(secret: &str) -> SessionManager {
        SessionManager::new(&SecretString::from(secret.to_owned()), true)
    }

    #[test]
    fn test_issue_then_verify() {
        let sessions = manager("kX9#mP2$vL5@nQ8&jR4*wT7!yB3^hF6%");
        let token = sessions.issue(UserId::new(42)).unwrap();
        assert_eq!(sessions.verify(&token).unwrap(), UserId::new(42));
    }

    #[test]
    fn test_rejects_foreign_signature_and_garbage() {
        let ours = manager("kX9#mP2$vL5@nQ8&jR4*wT7!yB3^hF6%");
        let theirs = manager("a-completely-different-secret-value!!");
        let token = theirs.issue(UserId::new(1)).unwrap();

        assert!(matches!(ours.verify(&token), Err(SessionError::Invalid)));
        assert!(matches!(ours.verify("not.a.jwt"), Err(SessionError::Invalid)));
        assert!(matches!(ours.verify(""), Err(SessionError::Invalid)));
    }

    #[test]
    fn test_rejects_expired_token() {
        let sessions = manager("kX9#mP2$vL5@nQ8&jR4*wT7!yB3^hF6%");
        let issued = Utc::now() - Duration::days(SESSION_TTL_DAYS + 2);
        let token = sessions.issue_at(UserId::new(7), issued).unwrap();
        assert!(matches!(sessions.verify(&token), Err(SessionError::Invalid)));
    }

    #[test]
    fn test_cookie_attributes() {
        let sessions = manager("kX9#mP2$vL5@nQ8&jR4*wT7!yB3^hF6%");
        let cookie = sessions.cookie("abc".to_owned());
        assert_eq!(cookie.name(), "token");
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.secure(), Some(true));
        assert_eq!(cookie.same_site(), Some(SameSite::Lax));
        assert_eq!(cookie.max_age(), Some(time::Duration::days(365)));

        let cleared = sessions.clear();
        assert_eq!(cleared.value(), "");
        assert_eq!(cleared.max_age(), Some(time::Duration::ZERO));
    }
}
