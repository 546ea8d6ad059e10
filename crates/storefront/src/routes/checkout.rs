//! Checkout route handler.

use axum::{Json, extract::State, http::StatusCode};
use serde::Deserialize;
use tracing::instrument;

use crate::error::{Result, add_breadcrumb};
use crate::middleware::OptionalAuth;
use crate::models::Order;
use crate::routes::extract::ApiJson;
use crate::services::CheckoutService;
use crate::state::AppState;

/// Checkout request body.
///
/// Only the payment token is read. Any amount a client sends is ignored;
/// the charge is computed from the stored cart.
#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    pub token: String,
}

/// Pay for the cart and place the order.
#[instrument(skip(state, user, body))]
pub async fn checkout(
    State(state): State<AppState>,
    OptionalAuth(user): OptionalAuth,
    ApiJson(body): ApiJson<CheckoutRequest>,
) -> Result<(StatusCode, Json<Order>)> {
    add_breadcrumb("checkout", "Checkout started", None);

    let order = CheckoutService::new(
        state.stores(),
        state.payments(),
        state.checkout_settings(),
    )
    .checkout(user.as_ref(), &body.token)
    .await?;

    let order_id = order.id.to_string();
    add_breadcrumb(
        "checkout",
        "Order placed",
        Some(&[("order_id", order_id.as_str())]),
    );
    Ok((StatusCode::CREATED, Json(order)))
}
