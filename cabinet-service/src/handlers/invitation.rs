//! Invitation lifecycle endpoints.

use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
};
use serde::Serialize;
use service_core::error::AppError;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::middleware::AuthUser;
use crate::models::{Cabinet, InvitationSummary, Membership};
use crate::services::{
    AcceptInvitationRequest, DispatchOutcome, FollowUpOutcome, InvitationDetails,
    IssueInvitationRequest,
};
use crate::AppState;

#[derive(Debug, Serialize, ToSchema)]
pub struct IssueInvitationResponse {
    pub invitation: InvitationSummary,
    /// Shown once so the link can be shared by hand when dispatch failed.
    pub invite_token: String,
    pub accept_url: String,
    pub dispatch: DispatchOutcome,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AcceptInvitationResponse {
    pub membership: Membership,
    pub cabinet: Cabinet,
    pub cabinet_created: bool,
    pub follow_up: Option<FollowUpOutcome>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RevokeInvitationResponse {
    pub revoked: bool,
}

#[utoipa::path(
    post,
    path = "/invitations",
    request_body = IssueInvitationRequest,
    responses(
        (status = 201, description = "Invitation issued", body = IssueInvitationResponse),
        (status = 400, description = "Validation error", body = ErrorResponse),
        (status = 401, description = "Missing or invalid token", body = ErrorResponse),
        (status = 403, description = "Inviter not allowed", body = ErrorResponse),
        (status = 404, description = "Cabinet not found", body = ErrorResponse)
    ),
    tag = "Invitations",
    security(("bearer_auth" = []))
)]
pub async fn create_invitation(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    Json(req): Json<IssueInvitationRequest>,
) -> Result<(StatusCode, Json<IssueInvitationResponse>), AppError> {
    let issued = state.invitations.issue_invitation(&actor, req).await?;

    Ok((
        StatusCode::CREATED,
        Json(IssueInvitationResponse {
            invitation: InvitationSummary::from(&issued.invitation),
            invite_token: issued.token,
            accept_url: issued.accept_url,
            dispatch: issued.dispatch,
        }),
    ))
}

#[utoipa::path(
    get,
    path = "/invitations/{token}",
    params(("token" = String, Path, description = "Invitation token")),
    responses(
        (status = 200, description = "Pending invitation", body = InvitationDetails),
        (status = 404, description = "Unknown token", body = ErrorResponse),
        (status = 409, description = "Already accepted", body = ErrorResponse),
        (status = 410, description = "Expired", body = ErrorResponse)
    ),
    tag = "Invitations"
)]
pub async fn get_invitation(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Json<InvitationDetails>, AppError> {
    let details = state.invitations.invitation_details(&token).await?;
    Ok(Json(details))
}

#[utoipa::path(
    post,
    path = "/invitations/{token}/accept",
    params(("token" = String, Path, description = "Invitation token")),
    request_body = AcceptInvitationRequest,
    responses(
        (status = 200, description = "Invitation accepted", body = AcceptInvitationResponse),
        (status = 403, description = "Email mismatch or unverified", body = ErrorResponse),
        (status = 404, description = "Unknown token", body = ErrorResponse),
        (status = 409, description = "Already accepted", body = ErrorResponse),
        (status = 410, description = "Expired", body = ErrorResponse)
    ),
    tag = "Invitations",
    security(("bearer_auth" = []))
)]
pub async fn accept_invitation(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    Path(token): Path<String>,
    Json(req): Json<AcceptInvitationRequest>,
) -> Result<Json<AcceptInvitationResponse>, AppError> {
    let accepted = state
        .invitations
        .accept_invitation(&token, &actor, req)
        .await?;

    Ok(Json(AcceptInvitationResponse {
        membership: accepted.membership,
        cabinet: accepted.cabinet,
        cabinet_created: accepted.cabinet_created,
        follow_up: accepted.follow_up,
    }))
}

#[utoipa::path(
    delete,
    path = "/invitations/{token}",
    params(("token" = String, Path, description = "Invitation token")),
    responses(
        (status = 200, description = "Revocation result", body = RevokeInvitationResponse),
        (status = 403, description = "Caller cannot revoke", body = ErrorResponse)
    ),
    tag = "Invitations",
    security(("bearer_auth" = []))
)]
pub async fn revoke_invitation(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    Path(token): Path<String>,
) -> Result<Json<RevokeInvitationResponse>, AppError> {
    let revoked = state
        .invitations
        .revoke_invitation_as(&actor, &token)
        .await?;
    Ok(Json(RevokeInvitationResponse { revoked }))
}

#[utoipa::path(
    get,
    path = "/cabinets/{cabinet_id}/invitations",
    params(("cabinet_id" = Uuid, Path, description = "Cabinet")),
    responses(
        (status = 200, description = "Invitations, newest first", body = [InvitationSummary]),
        (status = 403, description = "Not a cabinet manager", body = ErrorResponse)
    ),
    tag = "Invitations",
    security(("bearer_auth" = []))
)]
pub async fn list_cabinet_invitations(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    Path(cabinet_id): Path<Uuid>,
) -> Result<Json<Vec<InvitationSummary>>, AppError> {
    let invitations = state
        .invitations
        .list_cabinet_invitations(&actor, cabinet_id)
        .await?;
    Ok(Json(invitations))
}

#[utoipa::path(
    delete,
    path = "/cabinets/{cabinet_id}/invitations/{invitation_id}",
    params(
        ("cabinet_id" = Uuid, Path, description = "Cabinet"),
        ("invitation_id" = Uuid, Path, description = "Pending invitation")
    ),
    responses(
        (status = 200, description = "Cancellation result", body = RevokeInvitationResponse),
        (status = 403, description = "Not a cabinet manager", body = ErrorResponse)
    ),
    tag = "Invitations",
    security(("bearer_auth" = []))
)]
pub async fn cancel_cabinet_invitation(
    State(state): State<AppState>,
    AuthUser(actor): AuthUser,
    Path((cabinet_id, invitation_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<RevokeInvitationResponse>, AppError> {
    let revoked = state
        .invitations
        .revoke_invitation_by_id(&actor, cabinet_id, invitation_id)
        .await?;
    Ok(Json(RevokeInvitationResponse { revoked }))
}
