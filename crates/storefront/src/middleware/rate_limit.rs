//! Rate limiting for credential endpoints using governor and `tower_governor`.
//!
//! Sign-in, sign-up, and the password reset pair are the only routes an
//! attacker gains from hammering, so they are the only ones limited.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::{
    extract::ConnectInfo,
    http::{HeaderName, Request, StatusCode},
    response::{IntoResponse, Response},
};
use governor::clock::QuantaInstant;
use governor::middleware::NoOpMiddleware;
use tower_governor::{GovernorError, GovernorLayer, governor::GovernorConfigBuilder};

use crate::error::AppError;

// =============================================================================
// Client IP Key Extractor
// =============================================================================

/// Proxy headers consulted for the client address, most trusted first.
const CLIENT_IP_HEADERS: [&str; 3] = ["cf-connecting-ip", "x-forwarded-for", "x-real-ip"];

/// Key extractor that prefers proxy-supplied client addresses and falls back
/// to the socket peer when the server was started with connect info.
#[derive(Clone, Copy)]
pub struct ClientIpKeyExtractor;

impl tower_governor::key_extractor::KeyExtractor for ClientIpKeyExtractor {
    type Key = IpAddr;

    fn extract<T>(&self, req: &Request<T>) -> Result<Self::Key, GovernorError> {
        let headers = req.headers();

        let forwarded = CLIENT_IP_HEADERS.iter().find_map(|name| {
            headers
                .get(*name)
                .and_then(|v| v.to_str().ok())
                // X-Forwarded-For lists the original client first.
                .and_then(|s| s.split(',').next())
                .and_then(|s| s.trim().parse::<IpAddr>().ok())
        });

        forwarded
            .or_else(|| {
                req.extensions()
                    .get::<ConnectInfo<SocketAddr>>()
                    .map(|ConnectInfo(addr)| addr.ip())
            })
            .ok_or(GovernorError::UnableToExtractKey)
    }
}

// =============================================================================
// Rate Limiter Configuration
// =============================================================================

/// Rate limiter layer type for Axum.
pub type RateLimiterLayer =
    GovernorLayer<ClientIpKeyExtractor, NoOpMiddleware<QuantaInstant>, axum::body::Body>;

/// Create rate limiter for credential endpoints: ~10 requests per minute per IP.
///
/// Configuration: 1 request every 6 seconds (replenish), burst of 5.
///
/// # Panics
///
/// This function will not panic. `per_second(6)` and `burst_size(5)` are
/// positive, which is all `GovernorConfigBuilder::finish` checks.
#[must_use]
pub fn auth_rate_limiter() -> RateLimiterLayer {
    let config = GovernorConfigBuilder::default()
        .key_extractor(ClientIpKeyExtractor)
        .per_second(6)
        .burst_size(5)
        .finish()
        .expect("rate limiter config with per_second(6) and burst_size(5) is valid");
    GovernorLayer::new(Arc::new(config))
}

/// Rewrite limiter rejections into the API's JSON error shape.
///
/// `tower_governor` answers with a plain-text 429; clients of this API expect
/// `{"error": {"kind": "RATE_LIMITED", ...}}`. Retry hints are preserved.
pub async fn rate_limit_error_body(response: Response) -> Response {
    if response.status() != StatusCode::TOO_MANY_REQUESTS {
        return response;
    }

    let mut limited = AppError::RateLimited.into_response();
    for name in ["retry-after", "x-ratelimit-after"] {
        if let Some(value) = response.headers().get(name) {
            limited
                .headers_mut()
                .insert(HeaderName::from_static(name), value.clone());
        }
    }
    limited
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use tower_governor::key_extractor::KeyExtractor;

    use super::*;

    fn request(headers: &[(&str, &str)]) -> Request<()> {
        let mut builder = Request::builder().uri("/auth/signin");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(()).unwrap()
    }

    #[test]
    fn test_prefers_cloudflare_header() {
        let req = request(&[
            ("x-forwarded-for", "198.51.100.1"),
            ("cf-connecting-ip", "203.0.113.9"),
        ]);
        let ip = ClientIpKeyExtractor.extract(&req).unwrap();
        assert_eq!(ip.to_string(), "203.0.113.9");
    }

    #[test]
    fn test_forwarded_for_uses_first_hop() {
        let req = request(&[("x-forwarded-for", "198.51.100.1, 10.0.0.2")]);
        let ip = ClientIpKeyExtractor.extract(&req).unwrap();
        assert_eq!(ip.to_string(), "198.51.100.1");
    }

    #[test]
    fn test_falls_back_to_peer_address() {
        let mut req = request(&[]);
        assert!(ClientIpKeyExtractor.extract(&req).is_err());

        let peer: SocketAddr = "192.0.2.4:5555".parse().unwrap();
        req.extensions_mut().insert(ConnectInfo(peer));
        let ip = ClientIpKeyExtractor.extract(&req).unwrap();
        assert_eq!(ip.to_string(), "192.0.2.4");
    }

    #[tokio::test]
    async fn test_rate_limit_error_body_is_json() {
        let plain = (
            StatusCode::TOO_MANY_REQUESTS,
            [("retry-after", "6")],
            "Too Many Requests! Wait for 6s",
        )
            .into_response();
        let rewritten = rate_limit_error_body(plain).await;
        assert_eq!(rewritten.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(rewritten.headers().get("retry-after").unwrap(), "6");

        let body = axum::body::to_bytes(rewritten.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"]["kind"], "RATE_LIMITED");
    }
}
