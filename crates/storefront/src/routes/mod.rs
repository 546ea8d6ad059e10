//! HTTP route handlers for storefront.
//!
//! # Route Structure
//!
//! ```text
//! # Auth (credential routes are rate limited)
//! POST   /auth/signup                - Create account, set session cookie
//! POST   /auth/signin                - Sign in, set session cookie
//! POST   /auth/signout               - Clear session cookie
//! GET    /auth/me                    - Current user or null
//! POST   /auth/request-reset         - Mail a password reset link
//! POST   /auth/reset-password        - Set a new password with a reset token
//!
//! # Catalog
//! GET    /items                      - Paginated listing
//! GET    /items/{id}                 - Item detail
//! POST   /items                      - Create (auth)
//! PATCH  /items/{id}                 - Update (auth)
//! DELETE /items/{id}                 - Delete (owner, ADMIN, or ITEMDELETE)
//!
//! # Cart (auth)
//! GET    /cart                       - Cart lines with item data
//! POST   /cart/items                 - Add one of an item
//! DELETE /cart/items/{id}            - Remove a line (owner only)
//!
//! # Checkout and orders (auth)
//! POST   /checkout                   - Charge the cart, place the order
//! GET    /orders                     - Caller's orders
//! GET    /orders/{id}                - One order (owner or ADMIN)
//!
//! # Administration (ADMIN or PERMISSIONUPDATE)
//! GET    /users                      - All users
//! PUT    /users/{id}/permissions     - Replace a user's permissions
//! ```

pub mod auth;
pub mod cart;
pub mod checkout;
pub mod extract;
pub mod items;
pub mod orders;
pub mod users;

use axum::{
    Router,
    middleware::map_response,
    routing::{delete, get, post, put},
};

use crate::middleware::{auth_rate_limiter, rate_limit_error_body};
use crate::state::AppState;

/// Create the auth routes router.
pub fn auth_routes() -> Router<AppState> {
    let credential_routes = Router::new()
        .route("/signup", post(auth::sign_up))
        .route("/signin", post(auth::sign_in))
        .route("/request-reset", post(auth::request_reset))
        .route("/reset-password", post(auth::reset_password))
        .layer(auth_rate_limiter())
        .layer(map_response(rate_limit_error_body));

    Router::new()
        .route("/signout", post(auth::sign_out))
        .route("/me", get(auth::me))
        .merge(credential_routes)
}

/// Create the catalog routes router.
pub fn item_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(items::index).post(items::create))
        .route(
            "/{id}",
            get(items::show).patch(items::update).delete(items::delete),
        )
}

/// Create the cart routes router.
pub fn cart_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(cart::show))
        .route("/items", post(cart::add))
        .route("/items/{id}", delete(cart::remove))
}

/// Create the order routes router.
pub fn order_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(orders::index))
        .route("/{id}", get(orders::show))
}

/// Create the user administration routes router.
pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(users::index))
        .route("/{id}/permissions", put(users::update_permissions))
}

/// Create all routes for the storefront.
pub fn routes() -> Router<AppState> {
    Router::new()
        .nest("/auth", auth_routes())
        .nest("/items", item_routes())
        .nest("/cart", cart_routes())
        .route("/checkout", post(checkout::checkout))
        .nest("/orders", order_routes())
        .nest("/users", user_routes())
}
