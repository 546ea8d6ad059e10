//! User administration route handlers.

use axum::{Json, extract::State};
use serde::Deserialize;
use siqgarbs_core::{PermissionSet, UserId};
use tracing::instrument;

use crate::error::Result;
use crate::middleware::RequireAuth;
use crate::models::User;
use crate::routes::extract::{ApiJson, ApiPath};
use crate::services::UserAdminService;
use crate::state::AppState;

/// Replacement permission set.
#[derive(Debug, Deserialize)]
pub struct UpdatePermissionsRequest {
    pub permissions: PermissionSet,
}

/// All users.
#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn index(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
) -> Result<Json<Vec<User>>> {
    Ok(Json(UserAdminService::new(state.stores()).users(&user).await?))
}

/// Replace a user's permissions.
#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn update_permissions(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    ApiPath(target): ApiPath<UserId>,
    ApiJson(body): ApiJson<UpdatePermissionsRequest>,
) -> Result<Json<User>> {
    let updated = UserAdminService::new(state.stores())
        .update_permissions(&user, target, body.permissions)
        .await?;
    Ok(Json(updated))
}
