//! Catalog route handlers.

use axum::{Json, extract::State, http::StatusCode};
use serde::Deserialize;
use siqgarbs_core::ItemId;
use tracing::instrument;

use crate::error::Result;
use crate::middleware::RequireAuth;
use crate::models::{Item, ItemPage, ItemUpdate, NewItem};
use crate::routes::extract::{ApiJson, ApiPath, ApiQuery};
use crate::services::CatalogService;
use crate::services::catalog::DEFAULT_PER_PAGE;
use crate::state::AppState;

/// Pagination query parameters.
#[derive(Debug, Deserialize)]
pub struct PageQuery {
    #[serde(default = "first_page")]
    pub page: u32,
    #[serde(default = "default_per_page")]
    pub per_page: u32,
}

const fn first_page() -> u32 {
    1
}

const fn default_per_page() -> u32 {
    DEFAULT_PER_PAGE
}

/// One page of the catalog.
#[instrument(skip(state))]
pub async fn index(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<PageQuery>,
) -> Result<Json<ItemPage>> {
    let page = CatalogService::new(state.stores())
        .items(query.page, query.per_page)
        .await?;
    Ok(Json(page))
}

/// One item.
#[instrument(skip(state))]
pub async fn show(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<ItemId>,
) -> Result<Json<Item>> {
    Ok(Json(CatalogService::new(state.stores()).item(id).await?))
}

/// List a new item owned by the caller.
#[instrument(skip(state, user, body), fields(user_id = %user.id))]
pub async fn create(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    ApiJson(body): ApiJson<NewItem>,
) -> Result<(StatusCode, Json<Item>)> {
    let item = CatalogService::new(state.stores())
        .create_item(&user, body)
        .await?;
    Ok((StatusCode::CREATED, Json(item)))
}

/// Change some fields of an item.
#[instrument(skip(state, user, body), fields(user_id = %user.id))]
pub async fn update(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    ApiPath(id): ApiPath<ItemId>,
    ApiJson(body): ApiJson<ItemUpdate>,
) -> Result<Json<Item>> {
    let item = CatalogService::new(state.stores())
        .update_item(&user, id, body)
        .await?;
    Ok(Json(item))
}

/// Delete an item; returns what was deleted.
#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn delete(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    ApiPath(id): ApiPath<ItemId>,
) -> Result<Json<Item>> {
    let item = CatalogService::new(state.stores())
        .delete_item(&user, id)
        .await?;
    Ok(Json(item))
}
