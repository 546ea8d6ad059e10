//! Account route handlers: sign-up, sign-in, sign-out, and password reset.
//!
//! Successful sign-up, sign-in, and reset all set the `token` session cookie
//! and return the signed-in user.

use axum::{
    Json,
    extract::State,
    http::{StatusCode, header::SET_COOKIE},
    response::{AppendHeaders, IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use tower_sessions::cookie::Cookie;
use tracing::instrument;

use crate::error::{Result, add_breadcrumb, clear_sentry_user, set_sentry_user};
use crate::middleware::OptionalAuth;
use crate::models::User;
use crate::routes::extract::ApiJson;
use crate::services::{AuthService, PasswordResetService, ServiceError, SignedIn};
use crate::state::AppState;

/// Message returned by `request-reset` whether or not the account exists.
const RESET_REQUESTED_MESSAGE: &str =
    "If an account exists for that email, a password reset link is on its way.";

// =============================================================================
// Request / Response Types
// =============================================================================

/// Sign-up request body.
#[derive(Debug, Deserialize)]
pub struct SignUpRequest {
    pub email: String,
    pub name: String,
    pub password: String,
}

/// Sign-in request body.
#[derive(Debug, Deserialize)]
pub struct SignInRequest {
    pub email: String,
    pub password: String,
}

/// Password reset request body.
#[derive(Debug, Deserialize)]
pub struct RequestResetRequest {
    pub email: String,
}

/// New-password request body.
#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    pub reset_token: String,
    pub password: String,
    pub confirm_password: String,
}

/// Body of `/auth/me`.
#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub user: Option<User>,
}

/// Plain acknowledgement.
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: &'static str,
}

/// Respond with the user and a fresh session cookie.
fn signed_in_response(state: &AppState, status: StatusCode, signed_in: SignedIn) -> Response {
    set_sentry_user(&signed_in.user.id, Some(signed_in.user.email.as_str()));
    let cookie = state.sessions().cookie(signed_in.token);
    with_cookie(status, &cookie, Json(signed_in.user))
}

fn with_cookie(status: StatusCode, cookie: &Cookie<'_>, body: impl IntoResponse) -> Response {
    (
        status,
        AppendHeaders([(SET_COOKIE, cookie.to_string())]),
        body,
    )
        .into_response()
}

// =============================================================================
// Handlers
// =============================================================================

/// Create an account and sign it in.
#[instrument(skip(state, body))]
pub async fn sign_up(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<SignUpRequest>,
) -> Result<Response> {
    let signed_in = AuthService::new(state.stores(), state.sessions())
        .sign_up(&body.email, &body.name, &body.password)
        .await?;

    add_breadcrumb("auth", "Signed up", None);
    Ok(signed_in_response(&state, StatusCode::CREATED, signed_in))
}

/// Sign in with email and password.
#[instrument(skip(state, body))]
pub async fn sign_in(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<SignInRequest>,
) -> Result<Response> {
    let signed_in = AuthService::new(state.stores(), state.sessions())
        .sign_in(&body.email, &body.password)
        .await?;

    add_breadcrumb("auth", "Signed in", None);
    Ok(signed_in_response(&state, StatusCode::OK, signed_in))
}

/// Drop the session cookie.
#[instrument(skip(state))]
pub async fn sign_out(State(state): State<AppState>) -> Response {
    let cookie = AuthService::new(state.stores(), state.sessions()).sign_out();
    clear_sentry_user();

    with_cookie(
        StatusCode::OK,
        &cookie,
        Json(MessageResponse {
            message: "Signed out",
        }),
    )
}

/// The signed-in user, or `null`.
#[instrument(skip(state, user))]
pub async fn me(
    State(state): State<AppState>,
    OptionalAuth(user): OptionalAuth,
) -> Result<Json<MeResponse>> {
    let user = AuthService::new(state.stores(), state.sessions())
        .me(user.as_ref())
        .await?;
    Ok(Json(MeResponse { user }))
}

/// Mail a password reset link.
///
/// Answers the same way for unknown emails so the endpoint cannot be used to
/// discover accounts.
#[instrument(skip(state, body))]
pub async fn request_reset(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<RequestResetRequest>,
) -> Result<Json<MessageResponse>> {
    let service = PasswordResetService::new(
        state.stores(),
        state.mailer(),
        state.sessions(),
        &state.config().frontend_url,
    );

    match service.request_reset(&body.email).await {
        Ok(()) | Err(ServiceError::NotFound(_)) => Ok(Json(MessageResponse {
            message: RESET_REQUESTED_MESSAGE,
        })),
        Err(e) => Err(e.into()),
    }
}

/// Set a new password with a reset token, then sign in.
#[instrument(skip(state, body))]
pub async fn reset_password(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<ResetPasswordRequest>,
) -> Result<Response> {
    let signed_in = PasswordResetService::new(
        state.stores(),
        state.mailer(),
        state.sessions(),
        &state.config().frontend_url,
    )
    .reset_password(&body.reset_token, &body.password, &body.confirm_password)
    .await?;

    Ok(signed_in_response(&state, StatusCode::OK, signed_in))
}
