//! HTTP middleware stack for storefront.
//!
//! # Middleware Order (outermost first)
//!
//! 1. Sentry layers (hub per request, transaction tracing)
//! 2. `TraceLayer` (request span)
//! 3. Request ID (recorded into the span and the Sentry scope)
//! 4. Security headers
//! 5. Rate limiting on credential routes only (governor)
//!
//! Authentication is not a layer: handlers opt in through the
//! [`RequireAuth`] and [`OptionalAuth`] extractors.

pub mod auth;
pub mod rate_limit;
pub mod request_id;
pub mod security_headers;

pub use auth::{OptionalAuth, RequireAuth};
pub use rate_limit::{auth_rate_limiter, rate_limit_error_body};
pub use request_id::request_id_middleware;
pub use security_headers::security_headers_middleware;
