//! Business logic services for storefront.
//!
//! # Services
//!
//! - `auth` - Sign-up, sign-in, sign-out, current user
//! - `authz` - Ownership and permission checks shared by the others
//! - `cart` - Add to and remove from a user's cart
//! - `catalog` - Item listing and maintenance
//! - `checkout` - Cart to captured payment to recorded order
//! - `orders` - Order queries
//! - `password_reset` - Single-use, time-limited reset tokens
//! - `users` - User administration
//!
//! Collaborators at the edge of the system:
//!
//! - `session` - Signed session tokens and the cookie that carries them
//! - `payment` - Payment processor boundary and the Stripe client
//! - `email` - Outbound mail boundary and the SMTP mailer
//!
//! Services are short-lived borrowers: a handler builds one from
//! [`AppState`](crate::state::AppState) per request.

pub mod auth;
pub mod authz;
pub mod cart;
pub mod catalog;
pub mod checkout;
pub mod email;
mod error;
pub mod orders;
pub mod password_reset;
pub mod payment;
pub mod session;
pub mod users;

pub use auth::{AuthService, SignedIn};
pub use cart::CartService;
pub use catalog::CatalogService;
pub use checkout::{CheckoutService, CheckoutSettings};
pub use email::{LogMailer, MailError, Mailer, OutgoingEmail, SmtpMailer};
pub use error::ServiceError;
pub use orders::OrderService;
pub use password_reset::PasswordResetService;
pub use payment::{Charge, ChargeRequest, PaymentError, PaymentProcessor, StripeClient};
pub use session::{SessionError, SessionManager};
pub use users::UserAdminService;
