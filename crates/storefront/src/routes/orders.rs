//! Order history route handlers.

use axum::{Json, extract::State};
use siqgarbs_core::OrderId;
use tracing::instrument;

use crate::error::Result;
use crate::middleware::RequireAuth;
use crate::models::Order;
use crate::routes::extract::ApiPath;
use crate::services::OrderService;
use crate::state::AppState;

/// The caller's orders, newest first.
#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn index(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
) -> Result<Json<Vec<Order>>> {
    Ok(Json(OrderService::new(state.stores()).orders(&user).await?))
}

/// One order.
#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn show(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    ApiPath(id): ApiPath<OrderId>,
) -> Result<Json<Order>> {
    Ok(Json(OrderService::new(state.stores()).order(&user, id).await?))
}
