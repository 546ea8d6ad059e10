//! Authentication extractors.
//!
//! The session token travels in the `token` cookie. Extraction verifies the
//! signature and expiry, then re-reads the user so permission changes take
//! effect on the next request rather than at token expiry.

use axum::{
    extract::FromRequestParts,
    http::{header::COOKIE, request::Parts},
};
use tower_sessions::cookie::Cookie;

use crate::error::{AppError, set_sentry_user};
use crate::models::CurrentUser;
use crate::services::ServiceError;
use crate::services::session::SESSION_COOKIE_NAME;
use crate::state::AppState;

/// Extractor that requires a valid session.
///
/// Rejects with `401 UNAUTHENTICATED` when the session is missing or bad.
///
/// # Example
///
/// ```rust,ignore
/// async fn protected_handler(
///     RequireAuth(user): RequireAuth,
/// ) -> impl IntoResponse {
///     format!("Hello, {}!", user.name)
/// }
/// ```
pub struct RequireAuth(pub CurrentUser);

impl FromRequestParts<AppState> for RequireAuth {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        current_user(parts, state)
            .await?
            .map(Self)
            .ok_or(AppError::Service(ServiceError::Unauthenticated))
    }
}

/// Extractor that optionally gets the current user.
///
/// Unlike `RequireAuth`, this does not reject the request if there is no
/// valid session. It still fails if the data store cannot be reached.
pub struct OptionalAuth(pub Option<CurrentUser>);

impl FromRequestParts<AppState> for OptionalAuth {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        Ok(Self(current_user(parts, state).await?))
    }
}

/// Resolve the session cookie to a user, if there is a valid one.
async fn current_user(parts: &Parts, state: &AppState) -> Result<Option<CurrentUser>, AppError> {
    let Some(token) = session_token(parts) else {
        return Ok(None);
    };

    let Ok(user_id) = state.sessions().verify(&token) else {
        return Ok(None);
    };

    // A token can outlive its account in principle; treat that as signed out.
    let Some(user) = state.stores().users.find_by_id(user_id).await? else {
        tracing::debug!(user_id = %user_id, "Session refers to unknown user");
        return Ok(None);
    };

    tracing::Span::current().record("user_id", tracing::field::display(user.id));
    set_sentry_user(&user.id, Some(user.email.as_str()));

    Ok(Some(CurrentUser::from(user)))
}

/// The session token from the request's `Cookie` headers.
fn session_token(parts: &Parts) -> Option<String> {
    parts
        .headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(Cookie::split_parse)
        .filter_map(Result::ok)
        .find(|cookie| cookie.name() == SESSION_COOKIE_NAME)
        .map(|cookie| cookie.value().to_owned())
        .filter(|token| !token.is_empty())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use axum::http::Request;

    use super::*;

    fn parts_with_cookies(cookies: &[&str]) -> Parts {
        let mut builder = Request::builder().uri("/cart");
        for cookie in cookies {
            builder = builder.header(COOKIE, *cookie);
        }
        let (parts, ()) = builder.body(()).unwrap().into_parts();
        parts
    }

    #[test]
    fn test_session_token_found_among_other_cookies() {
        let parts = parts_with_cookies(&["theme=dark; token=abc.def.ghi", "other=1"]);
        assert_eq!(session_token(&parts).as_deref(), Some("abc.def.ghi"));
    }

    #[test]
    fn test_session_token_absent_or_empty() {
        assert!(session_token(&parts_with_cookies(&[])).is_none());
        assert!(session_token(&parts_with_cookies(&["token="])).is_none());
        assert!(session_token(&parts_with_cookies(&["tokens=abc"])).is_none());
    }
}
