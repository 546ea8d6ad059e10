//! Payment processor boundary.
//!
//! The checkout flow talks to [`PaymentProcessor`]; production wires in
//! [`StripeClient`], tests substitute a scripted processor. Every call
//! carries an idempotency key so a retried request never charges twice.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use secrecy::ExposeSecret;
use serde::Deserialize;
use thiserror::Error;

use siqgarbs_core::{CurrencyCode, Money};

use crate::config::StripeConfig;

/// Request timeout for processor calls.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors reported by a payment processor.
#[derive(Debug, Clone, Error)]
pub enum PaymentError {
    /// The card or source was refused.
    #[error("payment declined: {0}")]
    Declined(String),

    /// The request was malformed (bad token, bad amount).
    #[error("invalid payment request: {0}")]
    InvalidRequest(String),

    /// Network failure, timeout, rate limit, or processor outage.
    #[error("payment processor unavailable: {0}")]
    Unavailable(String),

    /// Anything the processor returned that we do not understand.
    #[error("unexpected payment processor response: {0}")]
    Unexpected(String),
}

impl PaymentError {
    /// Whether repeating the same request may succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }

    /// Whether the processor may have acted on the request anyway.
    ///
    /// Declines and invalid requests are definite. An outage, a timeout, or
    /// a response we cannot read leaves the outcome unknown.
    #[must_use]
    pub const fn is_ambiguous(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Unexpected(_))
    }
}

/// A charge to capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChargeRequest {
    /// Amount in minor units.
    pub amount: Money,
    pub currency: CurrencyCode,
    /// Client-supplied payment source token.
    pub source_token: String,
    /// Same key on every retry of this charge.
    pub idempotency_key: String,
    pub description: String,
}

/// A captured charge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Charge {
    /// Processor reference for the charge.
    pub id: String,
    /// Amount the processor reports as captured.
    pub amount: Money,
}

/// Something that can take and give back money.
#[async_trait]
pub trait PaymentProcessor: Send + Sync {
    /// Capture a charge.
    async fn charge(&self, request: &ChargeRequest) -> Result<Charge, PaymentError>;

    /// Refund a captured charge in full.
    async fn refund(&self, charge_id: &str, idempotency_key: &str) -> Result<(), PaymentError>;
}

// =============================================================================
// Stripe
// =============================================================================

#[derive(Debug, Deserialize)]
struct StripeCharge {
    id: String,
    amount: i64,
}

#[derive(Debug, Deserialize)]
struct StripeErrorBody {
    error: StripeErrorDetail,
}

#[derive(Debug, Deserialize)]
struct StripeErrorDetail {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Stripe charges API client.
#[derive(Clone)]
pub struct StripeClient {
    client: reqwest::Client,
    api_base: String,
}

impl StripeClient {
    /// Create a new Stripe client.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client fails to build.
    pub fn new(config: &StripeConfig) -> Result<Self, PaymentError> {
        let mut headers = HeaderMap::new();

        let auth_value = format!("Bearer {}", config.secret_key.expose_secret());
        let mut auth_header = HeaderValue::from_str(&auth_value)
            .map_err(|e| PaymentError::Unexpected(format!("invalid secret key format: {e}")))?;
        auth_header.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth_header);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| PaymentError::Unexpected(format!("failed to build client: {e}")))?;

        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_owned(),
        })
    }

    async fn post(
        &self,
        path: &str,
        form: &[(&str, String)],
        idempotency_key: &str,
    ) -> Result<reqwest::Response, PaymentError> {
        let url = format!("{}{path}", self.api_base);
        let response = self
            .client
            .post(&url)
            .header("Idempotency-Key", idempotency_key)
            .form(form)
            .send()
            .await
            .map_err(|e| PaymentError::Unavailable(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(classify_failure(status, &body))
    }
}

/// Parse a 2xx charge response body.
fn decode_charge(body: &str) -> Result<Charge, PaymentError> {
    let charge: StripeCharge = serde_json::from_str(body)
        .map_err(|e| PaymentError::Unavailable(format!("charge response undecodable: {e}")))?;

    Ok(Charge {
        id: charge.id,
        amount: Money::from_minor(charge.amount),
    })
}

/// Map a non-2xx Stripe response to a [`PaymentError`].
fn classify_failure(status: StatusCode, body: &str) -> PaymentError {
    let reason = serde_json::from_str::<StripeErrorBody>(body).map_or_else(
        |_| format!("HTTP {}", status.as_u16()),
        |b| {
            b.error
                .code
                .or(b.error.message)
                .unwrap_or_else(|| format!("HTTP {}", status.as_u16()))
        },
    );

    match status {
        StatusCode::PAYMENT_REQUIRED => PaymentError::Declined(reason),
        StatusCode::BAD_REQUEST | StatusCode::NOT_FOUND => PaymentError::InvalidRequest(reason),
        StatusCode::TOO_MANY_REQUESTS | StatusCode::CONFLICT => PaymentError::Unavailable(reason),
        s if s.is_server_error() => PaymentError::Unavailable(reason),
        _ => PaymentError::Unexpected(reason),
    }
}

#[async_trait]
impl PaymentProcessor for StripeClient {
    async fn charge(&self, request: &ChargeRequest) -> Result<Charge, PaymentError> {
        let form = [
            ("amount", request.amount.minor_units().to_string()),
            ("currency", request.currency.as_lowercase().to_owned()),
            ("source", request.source_token.clone()),
            ("description", request.description.clone()),
        ];

        let response = self
            .post("/v1/charges", &form, &request.idempotency_key)
            .await?;
        // The charge exists once Stripe answers 2xx. A body we fail to read
        // is retried with the same key so Stripe replays the stored charge.
        let body = response
            .text()
            .await
            .map_err(|e| PaymentError::Unavailable(format!("charge response unreadable: {e}")))?;

        decode_charge(&body)
    }

    async fn refund(&self, charge_id: &str, idempotency_key: &str) -> Result<(), PaymentError> {
        let form = [("charge", charge_id.to_owned())];
        self.post("/v1/refunds", &form, idempotency_key).await?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_decline_uses_code() {
        let body = r#"{"error":{"type":"card_error","code":"card_declined","message":"Your card was declined."}}"#;
        let err = classify_failure(StatusCode::PAYMENT_REQUIRED, body);
        assert!(matches!(err, PaymentError::Declined(ref code) if code == "card_declined"));
        assert!(!err.is_transient());
    }

    #[test]
    fn test_classify_server_errors_as_transient() {
        let err = classify_failure(StatusCode::BAD_GATEWAY, "<html>oops</html>");
        assert!(matches!(err, PaymentError::Unavailable(ref r) if r == "HTTP 502"));
        assert!(err.is_transient());
        assert!(classify_failure(StatusCode::TOO_MANY_REQUESTS, "").is_transient());
    }

    #[test]
    fn test_decode_charge() {
        let charge = decode_charge(r#"{"id":"ch_123","object":"charge","amount":1300}"#);
        assert!(matches!(charge, Ok(ref c) if c.id == "ch_123" && c.amount == Money::from_minor(1300)));
    }

    #[test]
    fn test_truncated_charge_body_is_retried() {
        let err = decode_charge(r#"{"id":"ch_123","amo"#).unwrap_err();
        assert!(err.is_transient());
        assert!(err.is_ambiguous());
    }

    #[test]
    fn test_declines_are_not_ambiguous() {
        assert!(!PaymentError::Declined("card_declined".to_owned()).is_ambiguous());
        assert!(!PaymentError::InvalidRequest("bad token".to_owned()).is_ambiguous());
        assert!(PaymentError::Unexpected("HTTP 418".to_owned()).is_ambiguous());
    }

    #[test]
    fn test_classify_bad_request() {
        let body = r#"{"error":{"message":"No such token: tok_bad"}}"#;
        let err = classify_failure(StatusCode::BAD_REQUEST, body);
        assert!(matches!(err, PaymentError::InvalidRequest(ref m) if m.contains("tok_bad")));
    }
}
