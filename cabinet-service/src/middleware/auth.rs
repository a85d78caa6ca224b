use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
};
use service_core::error::AppError;

use crate::models::AuthenticatedActor;
use crate::AppState;

fn bearer_token(headers: &HeaderMap) -> Result<&str, AppError> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| {
            AppError::Unauthorized(anyhow::anyhow!("Missing or invalid Authorization header"))
        })
}

fn authenticate(state: &AppState, headers: &HeaderMap) -> Result<AuthenticatedActor, AppError> {
    let token = bearer_token(headers)?;
    state.jwt.validate_token(token).map_err(|e| {
        tracing::debug!(error = %e, "Bearer token rejected");
        AppError::Unauthorized(anyhow::anyhow!("Invalid or expired token"))
    })
}

/// Require a valid bearer token for every route behind this layer.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let actor = authenticate(&state, req.headers())?;
    req.extensions_mut().insert(actor);

    Ok(next.run(req).await)
}

/// The authenticated caller.
///
/// Taken from extensions when [`auth_middleware`] already ran, otherwise the
/// bearer token is validated here, so routes sharing a path with public
/// methods can still require authentication per handler.
pub struct AuthUser(pub AuthenticatedActor);

#[axum::async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        if let Some(actor) = parts.extensions.get::<AuthenticatedActor>() {
            return Ok(AuthUser(actor.clone()));
        }

        let actor = authenticate(state, &parts.headers)?;
        parts.extensions.insert(actor.clone());
        Ok(AuthUser(actor))
    }
}
