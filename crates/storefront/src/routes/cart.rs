//! Cart route handlers.
//!
//! Carts live in the data store, keyed by user; there is no anonymous cart.

use axum::{Json, extract::State};
use serde::{Deserialize, Serialize};
use siqgarbs_core::{CartEntryId, ItemId, Money};
use tracing::instrument;

use crate::error::Result;
use crate::middleware::RequireAuth;
use crate::models::{CartEntry, CartLine};
use crate::routes::extract::{ApiJson, ApiPath};
use crate::services::CartService;
use crate::state::AppState;

/// Add-to-cart request body.
#[derive(Debug, Deserialize)]
pub struct AddToCartRequest {
    pub item_id: ItemId,
}

/// The caller's cart.
///
/// `subtotal` is informational; checkout recomputes the charge from
/// current prices. It is `None` only if the sum overflows.
#[derive(Debug, Serialize)]
pub struct CartView {
    pub lines: Vec<CartLine>,
    pub item_count: i64,
    pub subtotal: Option<Money>,
}

impl From<Vec<CartLine>> for CartView {
    fn from(lines: Vec<CartLine>) -> Self {
        let item_count = lines.iter().map(|l| i64::from(l.entry.quantity)).sum();
        let subtotal = lines.iter().try_fold(Money::ZERO, |acc, line| {
            line.line_total().and_then(|t| acc.checked_add(t))
        });
        Self {
            lines,
            item_count,
            subtotal,
        }
    }
}

/// Show the cart.
#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn show(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
) -> Result<Json<CartView>> {
    let lines = CartService::new(state.stores()).cart(&user).await?;
    Ok(Json(CartView::from(lines)))
}

/// Add one of an item; repeated adds raise the quantity.
#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn add(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    ApiJson(body): ApiJson<AddToCartRequest>,
) -> Result<Json<CartEntry>> {
    let entry = CartService::new(state.stores())
        .add_to_cart(&user, body.item_id)
        .await?;
    Ok(Json(entry))
}

/// Remove a line from the caller's cart.
#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn remove(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    ApiPath(id): ApiPath<CartEntryId>,
) -> Result<Json<CartEntry>> {
    let entry = CartService::new(state.stores())
        .remove_from_cart(&user, id)
        .await?;
    Ok(Json(entry))
}
