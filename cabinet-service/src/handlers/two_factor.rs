//! Email two-factor endpoints. Rate limited per client IP in the router.

use axum::extract::{Json, State};
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use utoipa::ToSchema;

use crate::services::IssuedCode;
use crate::AppState;

#[derive(Debug, Deserialize, ToSchema)]
pub struct SendCodeRequest {
    pub email: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct VerifyCodeRequest {
    pub email: String,
    pub code: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct VerifyCodeResponse {
    pub verified: bool,
}

#[utoipa::path(
    post,
    path = "/auth/2fa/send",
    request_body = SendCodeRequest,
    responses(
        (status = 200, description = "Code sent", body = IssuedCode),
        (status = 400, description = "Invalid email", body = ErrorResponse),
        (status = 429, description = "Too many codes requested", body = ErrorResponse),
        (status = 502, description = "Email dispatch failed", body = ErrorResponse)
    ),
    tag = "Two-Factor"
)]
pub async fn send_code(
    State(state): State<AppState>,
    Json(req): Json<SendCodeRequest>,
) -> Result<Json<IssuedCode>, AppError> {
    Ok(Json(state.two_factor.issue_code(&req.email).await?))
}

#[utoipa::path(
    post,
    path = "/auth/2fa/verify",
    request_body = VerifyCodeRequest,
    responses(
        (status = 200, description = "Code verified", body = VerifyCodeResponse),
        (status = 400, description = "Malformed code", body = ErrorResponse),
        (status = 404, description = "No matching code", body = ErrorResponse),
        (status = 409, description = "Code already used", body = ErrorResponse),
        (status = 410, description = "Code expired", body = ErrorResponse)
    ),
    tag = "Two-Factor"
)]
pub async fn verify_code(
    State(state): State<AppState>,
    Json(req): Json<VerifyCodeRequest>,
) -> Result<Json<VerifyCodeResponse>, AppError> {
    state.two_factor.verify_code(&req.email, &req.code).await?;
    Ok(Json(VerifyCodeResponse { verified: true }))
}
