use axum::extract::{Json, Path, Query, State};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use crate::middleware::AuthUser;
use crate::models::PermissionSet;
use crate::AppState;

#[derive(Debug, Serialize, ToSchema)]
pub struct PermissionsResponse {
    pub cabinet_id: Uuid,
    pub permissions: PermissionSet,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct PermissionCheckQuery {
    pub module: String,
    /// `read` (default), `write` or `delete`.
    pub action: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PermissionCheckResponse {
    pub allowed: bool,
}

/// The caller's matrix in a cabinet. Non-members get the all-denied matrix.
#[utoipa::path(
    get,
    path = "/cabinets/{cabinet_id}/permissions",
    params(("cabinet_id" = Uuid, Path, description = "Cabinet")),
    responses(
        (status = 200, description = "Permission matrix", body = PermissionsResponse),
        (status = 401, description = "Missing or invalid token", body = ErrorResponse)
    ),
    tag = "Permissions",
    security(("bearer_auth" = []))
)]
pub async fn get_permissions(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    Path(cabinet_id): Path<Uuid>,
) -> Json<PermissionsResponse> {
    let permissions = state
        .permissions
        .load_permissions(actor.actor_id, cabinet_id)
        .await;
    Json(PermissionsResponse {
        cabinet_id,
        permissions,
    })
}

#[utoipa::path(
    get,
    path = "/cabinets/{cabinet_id}/permissions/check",
    params(("cabinet_id" = Uuid, Path, description = "Cabinet"), PermissionCheckQuery),
    responses(
        (status = 200, description = "Whether the action is allowed", body = PermissionCheckResponse)
    ),
    tag = "Permissions",
    security(("bearer_auth" = []))
)]
pub async fn check_permission(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    Path(cabinet_id): Path<Uuid>,
    Query(query): Query<PermissionCheckQuery>,
) -> Json<PermissionCheckResponse> {
    let allowed = state
        .permissions
        .load_permissions(actor.actor_id, cabinet_id)
        .await
        .has_permission_str(&query.module, query.action.as_deref());
    Json(PermissionCheckResponse { allowed })
}
