//! Errors surfaced by the business-logic services.

use thiserror::Error;

use siqgarbs_core::EmailError;

use super::payment::PaymentError;
use super::session::SessionError;
use crate::db::RepositoryError;

/// Errors that can occur in a service operation.
///
/// Each variant has a stable [`kind`](Self::kind) code that the HTTP layer
/// exposes to clients.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// No valid session accompanied the request.
    #[error("you must be signed in")]
    Unauthenticated,

    /// The caller lacks the ownership or permission the operation needs.
    #[error("you do not have permission to do that")]
    Forbidden,

    /// The named record does not exist.
    #[error("{0} not found")]
    NotFound(&'static str),

    /// Input failed validation.
    #[error("{0}")]
    Validation(String),

    /// Checkout was attempted with nothing in the cart.
    #[error("your cart is empty")]
    EmptyCart,

    /// The payment processor refused the charge.
    #[error("payment declined: {0}")]
    PaymentDeclined(String),

    /// The payment processor could not be reached.
    #[error("payment processor unavailable")]
    ProcessorUnavailable,

    /// Payment was captured but no order could be recorded for it.
    #[error("payment {charge_id} captured but order not recorded (refunded: {refunded})")]
    Reconciliation {
        /// Processor charge reference.
        charge_id: String,
        /// Whether the compensating refund went through.
        refunded: bool,
    },

    /// Unknown email or wrong password. Deliberately does not say which.
    #[error("invalid email or password")]
    InvalidCredentials,

    /// A uniqueness rule was violated.
    #[error("{0}")]
    Conflict(String),

    /// Password and confirmation differ.
    #[error("passwords do not match")]
    PasswordMismatch,

    /// Reset token unknown, already used, or older than an hour.
    #[error("reset token is invalid or expired")]
    InvalidOrExpiredToken,

    /// Repository/database error.
    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),

    /// Anything else that is our fault.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    /// Stable machine-readable code for this error.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Unauthenticated => "UNAUTHENTICATED",
            Self::Forbidden => "FORBIDDEN",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::EmptyCart => "EMPTY_CART",
            Self::PaymentDeclined(_) => "PAYMENT_DECLINED",
            Self::ProcessorUnavailable => "PROCESSOR_UNAVAILABLE",
            Self::Reconciliation { .. } => "RECONCILIATION_FAILURE",
            Self::InvalidCredentials => "INVALID_CREDENTIALS",
            Self::Conflict(_) => "CONFLICT",
            Self::PasswordMismatch => "PASSWORD_MISMATCH",
            Self::InvalidOrExpiredToken => "INVALID_OR_EXPIRED_TOKEN",
            Self::Repository(_) | Self::Internal(_) => "INTERNAL",
        }
    }
}

impl From<EmailError> for ServiceError {
    fn from(err: EmailError) -> Self {
        Self::Validation(format!("invalid email: {err}"))
    }
}

impl From<SessionError> for ServiceError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::Invalid => Self::Unauthenticated,
            SessionError::Signing(e) => Self::Internal(format!("session signing failed: {e}")),
        }
    }
}

impl From<PaymentError> for ServiceError {
    fn from(err: PaymentError) -> Self {
        match err {
            PaymentError::Declined(reason) => Self::PaymentDeclined(reason),
            PaymentError::InvalidRequest(reason) => Self::Validation(reason),
            PaymentError::Unavailable(_) => Self::ProcessorUnavailable,
            PaymentError::Unexpected(reason) => Self::Internal(reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds_are_stable() {
        assert_eq!(ServiceError::EmptyCart.kind(), "EMPTY_CART");
        assert_eq!(
            ServiceError::Reconciliation {
                charge_id: "ch_1".to_owned(),
                refunded: true
            }
            .kind(),
            "RECONCILIATION_FAILURE"
        );
        assert_eq!(
            ServiceError::Repository(RepositoryError::NotFound).kind(),
            "INTERNAL"
        );
    }

    #[test]
    fn test_transient_payment_errors_map_to_unavailable() {
        let err = ServiceError::from(PaymentError::Unavailable("timeout".to_owned()));
        assert!(matches!(err, ServiceError::ProcessorUnavailable));
        let err = ServiceError::from(PaymentError::Declined("card_declined".to_owned()));
        assert_eq!(err.kind(), "PAYMENT_DECLINED");
    }
}
