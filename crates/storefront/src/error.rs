//! Unified error handling with Sentry integration.
//!
//! Provides a unified `AppError` type that captures errors to Sentry before
//! responding to the client. All route handlers should return `Result<T, AppError>`.
//!
//! Errors are rendered as JSON:
//!
//! ```json
//! { "error": { "kind": "EMPTY_CART", "message": "your cart is empty" } }
//! ```

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::db::RepositoryError;
use crate::services::ServiceError;

/// Application-level error type for the storefront.
#[derive(Debug, Error)]
pub enum AppError {
    /// A service operation failed.
    #[error(transparent)]
    Service(#[from] ServiceError),

    /// The request could not be understood.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Rate limited.
    #[error("Rate limited")]
    RateLimited,
}

impl From<RepositoryError> for AppError {
    fn from(err: RepositoryError) -> Self {
        Self::Service(ServiceError::Repository(err))
    }
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: ErrorDetail<'a>,
}

#[derive(Serialize)]
struct ErrorDetail<'a> {
    kind: &'a str,
    message: String,
}

impl AppError {
    /// Stable machine-readable code for this error.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Service(err) => err.kind(),
            Self::BadRequest(_) => "VALIDATION_ERROR",
            Self::RateLimited => "RATE_LIMITED",
        }
    }

    /// HTTP status for this error.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Service(err) => match err {
                ServiceError::Unauthenticated | ServiceError::InvalidCredentials => {
                    StatusCode::UNAUTHORIZED
                }
                ServiceError::Forbidden => StatusCode::FORBIDDEN,
                ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
                ServiceError::Validation(_)
                | ServiceError::EmptyCart
                | ServiceError::PasswordMismatch
                | ServiceError::InvalidOrExpiredToken => StatusCode::BAD_REQUEST,
                ServiceError::PaymentDeclined(_) => StatusCode::PAYMENT_REQUIRED,
                ServiceError::ProcessorUnavailable => StatusCode::SERVICE_UNAVAILABLE,
                ServiceError::Conflict(_) => StatusCode::CONFLICT,
                ServiceError::Reconciliation { .. }
                | ServiceError::Repository(_)
                | ServiceError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Capture server errors to Sentry
        if status.is_server_error() {
            let event_id = sentry::capture_error(&self);
            tracing::error!(
                error = %self,
                kind = self.kind(),
                sentry_event_id = %event_id,
                "Request error"
            );
        }

        // Don't expose internal error details to clients
        let message = match &self {
            Self::Service(ServiceError::Repository(_) | ServiceError::Internal(_)) => {
                "Internal server error".to_string()
            }
            Self::Service(ServiceError::Reconciliation { .. }) => {
                "Your payment was taken but the order could not be recorded. \
                 It has been flagged for review."
                    .to_string()
            }
            other => other.to_string(),
        };

        let body = ErrorBody {
            error: ErrorDetail {
                kind: self.kind(),
                message,
            },
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for `AppError`.
pub type Result<T> = std::result::Result<T, AppError>;

/// Set the Sentry user context from a user ID.
///
/// Call this after successful authentication to associate errors with users.
pub fn set_sentry_user(user_id: &impl ToString, email: Option<&str>) {
    sentry::configure_scope(|scope| {
        scope.set_user(Some(sentry::User {
            id: Some(user_id.to_string()),
            email: email.map(String::from),
            ..Default::default()
        }));
    });
}

/// Clear the Sentry user context.
///
/// Call this on logout to stop associating errors with the user.
pub fn clear_sentry_user() {
    sentry::configure_scope(|scope| {
        scope.set_user(None);
    });
}

/// Add a breadcrumb for user actions.
///
/// Breadcrumbs appear in Sentry error reports to show the trail of user actions
/// leading up to an error.
pub fn add_breadcrumb(category: &str, message: &str, data: Option<&[(&str, &str)]>) {
    let mut breadcrumb = sentry::Breadcrumb {
        category: Some(category.to_string()),
        message: Some(message.to_string()),
        level: sentry::Level::Info,
        ..Default::default()
    };

    if let Some(pairs) = data {
        for (key, value) in pairs {
            breadcrumb.data.insert(
                (*key).to_string(),
                serde_json::Value::String((*value).to_string()),
            );
        }
    }

    sentry::add_breadcrumb(breadcrumb);
}
