//! Team management endpoints.

use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
};
use service_core::error::AppError;
use uuid::Uuid;

use crate::middleware::AuthUser;
use crate::models::PermissionSet;
use crate::services::{MemberView, ServiceError, SetOverridesRequest};
use crate::AppState;

#[utoipa::path(
    get,
    path = "/cabinets/{cabinet_id}/members",
    params(("cabinet_id" = Uuid, Path, description = "Cabinet")),
    responses(
        (status = 200, description = "Members with their effective permissions", body = [MemberView]),
        (status = 403, description = "Not a member", body = ErrorResponse)
    ),
    tag = "Team",
    security(("bearer_auth" = []))
)]
pub async fn list_members(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    Path(cabinet_id): Path<Uuid>,
) -> Result<Json<Vec<MemberView>>, AppError> {
    Ok(Json(state.team.list_members(&actor, cabinet_id).await?))
}

#[utoipa::path(
    put,
    path = "/cabinets/{cabinet_id}/members/{actor_id}/permissions",
    params(
        ("cabinet_id" = Uuid, Path, description = "Cabinet"),
        ("actor_id" = Uuid, Path, description = "Staff member")
    ),
    request_body = SetOverridesRequest,
    responses(
        (status = 200, description = "Effective permissions after the change", body = PermissionSet),
        (status = 400, description = "Target is not staff", body = ErrorResponse),
        (status = 403, description = "Not a cabinet manager", body = ErrorResponse),
        (status = 404, description = "Member not found", body = ErrorResponse)
    ),
    tag = "Team",
    security(("bearer_auth" = []))
)]
pub async fn set_member_permissions(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    Path((cabinet_id, member_id)): Path<(Uuid, Uuid)>,
    Json(req): Json<SetOverridesRequest>,
) -> Result<Json<PermissionSet>, AppError> {
    let permissions = state
        .team
        .set_permission_overrides(&actor, cabinet_id, member_id, req)
        .await?;
    Ok(Json(permissions))
}

#[utoipa::path(
    delete,
    path = "/cabinets/{cabinet_id}/members/{actor_id}",
    params(
        ("cabinet_id" = Uuid, Path, description = "Cabinet"),
        ("actor_id" = Uuid, Path, description = "Member to remove")
    ),
    responses(
        (status = 204, description = "Member removed"),
        (status = 403, description = "Not a cabinet manager", body = ErrorResponse),
        (status = 409, description = "Owner cannot be removed", body = ErrorResponse)
    ),
    tag = "Team",
    security(("bearer_auth" = []))
)]
pub async fn remove_member(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    Path((cabinet_id, member_id)): Path<(Uuid, Uuid)>,
) -> Result<StatusCode, AppError> {
    state
        .team
        .remove_member(&actor, cabinet_id, member_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    delete,
    path = "/cabinets/{cabinet_id}",
    params(("cabinet_id" = Uuid, Path, description = "Cabinet")),
    responses(
        (status = 204, description = "Cabinet soft-deleted"),
        (status = 403, description = "Not the owner", body = ErrorResponse),
        (status = 404, description = "No active cabinet", body = ErrorResponse)
    ),
    tag = "Team",
    security(("bearer_auth" = []))
)]
pub async fn delete_cabinet(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    Path(cabinet_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    if state.team.soft_delete_cabinet(&actor, cabinet_id).await? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ServiceError::NotFound("Cabinet").into())
    }
}
