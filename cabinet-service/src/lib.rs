pub mod config;
pub mod db;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    http::{header, HeaderValue, Method, Request},
    middleware::{from_fn, from_fn_with_state},
    routing::{delete, get, post, put},
    Json, Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use service_core::error::AppError;
use service_core::middleware::{
    metrics::metrics_middleware,
    rate_limit::{create_ip_rate_limiter, ip_rate_limit_middleware, IpRateLimiter},
    security_headers::security_headers_middleware,
    tracing::{request_id_middleware, REQUEST_ID_HEADER},
};
use tokio::task::JoinHandle;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::{openapi::security::SecurityScheme, Modify, OpenApi};

use crate::config::CabinetConfig;
use crate::services::{
    CabinetStore, EmailProvider, InvitationService, JwtService, PermissionService,
    RoleCapabilityTable, TeamService, TwoFactorService,
};

#[derive(OpenApi)]
#[openapi(
    paths(
        health_check,
        handlers::invitation::create_invitation,
        handlers::invitation::get_invitation,
        handlers::invitation::accept_invitation,
        handlers::invitation::revoke_invitation,
        handlers::invitation::list_cabinet_invitations,
        handlers::invitation::cancel_cabinet_invitation,
        handlers::permissions::get_permissions,
        handlers::permissions::check_permission,
        handlers::members::list_members,
        handlers::members::set_member_permissions,
        handlers::members::remove_member,
        handlers::members::delete_cabinet,
        handlers::two_factor::send_code,
        handlers::two_factor::verify_code,
    ),
    components(
        schemas(
            handlers::ErrorResponse,
            handlers::invitation::IssueInvitationResponse,
            handlers::invitation::AcceptInvitationResponse,
            handlers::invitation::RevokeInvitationResponse,
            handlers::permissions::PermissionsResponse,
            handlers::permissions::PermissionCheckResponse,
            handlers::two_factor::SendCodeRequest,
            handlers::two_factor::VerifyCodeRequest,
            handlers::two_factor::VerifyCodeResponse,
            services::IssueInvitationRequest,
            services::invitations::ChiefOfStaffInvite,
            services::AcceptInvitationRequest,
            services::DispatchOutcome,
            services::FollowUpOutcome,
            services::InvitationDetails,
            services::MemberView,
            services::SetOverridesRequest,
            services::IssuedCode,
            models::Cabinet,
            models::CabinetStatus,
            models::ChamberKind,
            models::Gender,
            models::InvitationRole,
            models::InvitationStatus,
            models::InvitationSummary,
            models::MemberRole,
            models::Membership,
            models::Module,
            models::ModulePermission,
            models::PermissionSet,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Invitations", description = "Invitation issuance, validation and acceptance"),
        (name = "Permissions", description = "Per-cabinet capability matrix"),
        (name = "Team", description = "Cabinet team management"),
        (name = "Two-Factor", description = "Email verification codes"),
        (name = "Observability", description = "Service health and monitoring"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    utoipa::openapi::security::HttpBuilder::new()
                        .scheme(utoipa::openapi::security::HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: CabinetConfig,
    pub store: Arc<dyn CabinetStore>,
    pub email: Arc<dyn EmailProvider>,
    pub jwt: JwtService,
    pub permissions: PermissionService,
    pub invitations: InvitationService,
    pub two_factor: TwoFactorService,
    pub team: TeamService,
    pub metrics: Option<PrometheusHandle>,
    pub two_factor_rate_limiter: IpRateLimiter,
}

impl AppState {
    /// Wire the domain services over one store and email provider.
    pub fn new(
        config: CabinetConfig,
        store: Arc<dyn CabinetStore>,
        email: Arc<dyn EmailProvider>,
        jwt: JwtService,
        table: RoleCapabilityTable,
        metrics: Option<PrometheusHandle>,
    ) -> Self {
        let permissions = PermissionService::new(store.clone(), Arc::new(table));
        let invitations = InvitationService::new(
            store.clone(),
            email.clone(),
            permissions.clone(),
            config.invitations.clone(),
        );
        let two_factor =
            TwoFactorService::new(store.clone(), email.clone(), config.two_factor.clone());
        let team = TeamService::new(store.clone(), permissions.clone());
        let two_factor_rate_limiter = create_ip_rate_limiter(
            config.two_factor.ip_limit,
            config.two_factor.ip_window_seconds,
        );

        Self {
            config,
            store,
            email,
            jwt,
            permissions,
            invitations,
            two_factor,
            team,
            metrics,
            two_factor_rate_limiter,
        }
    }
}

const RETENTION_TICK: Duration = Duration::from_secs(60 * 60);

/// Periodically delete expired invitations and spent two-factor codes.
pub fn spawn_retention_task(state: AppState) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(RETENTION_TICK);
        loop {
            ticker.tick().await;
            let invitations = state.invitations.prune_expired().await;
            let codes = state.two_factor.prune_expired().await;
            match (invitations, codes) {
                (Ok(invitations), Ok(codes)) => {
                    tracing::debug!(invitations, codes, "Retention sweep complete");
                }
                (invitations, codes) => {
                    if let Err(e) = invitations {
                        tracing::warn!(error = %e, "Invitation retention sweep failed");
                    }
                    if let Err(e) = codes {
                        tracing::warn!(error = %e, "Two-factor retention sweep failed");
                    }
                }
            }
        }
    })
}

/// Raw paths carry invitation tokens; spans only get the first segments.
fn span_path(path: &str) -> String {
    match path.strip_prefix("/invitations/") {
        Some(rest) if !rest.is_empty() => match rest.split_once('/') {
            Some((_, tail)) => format!("/invitations/:token/{}", tail),
            None => "/invitations/:token".to_string(),
        },
        _ => path.to_string(),
    }
}

pub fn build_router(state: AppState) -> Router {
    let two_factor_routes = Router::new()
        .route("/auth/2fa/send", post(handlers::two_factor::send_code))
        .route("/auth/2fa/verify", post(handlers::two_factor::verify_code))
        .layer(from_fn_with_state(
            state.two_factor_rate_limiter.clone(),
            ip_rate_limit_middleware,
        ));

    let cabinet_routes = Router::new()
        .route(
            "/cabinets/:cabinet_id",
            delete(handlers::members::delete_cabinet),
        )
        .route(
            "/cabinets/:cabinet_id/permissions",
            get(handlers::permissions::get_permissions),
        )
        .route(
            "/cabinets/:cabinet_id/permissions/check",
            get(handlers::permissions::check_permission),
        )
        .route(
            "/cabinets/:cabinet_id/invitations",
            get(handlers::invitation::list_cabinet_invitations),
        )
        .route(
            "/cabinets/:cabinet_id/invitations/:invitation_id",
            delete(handlers::invitation::cancel_cabinet_invitation),
        )
        .route(
            "/cabinets/:cabinet_id/members",
            get(handlers::members::list_members),
        )
        .route(
            "/cabinets/:cabinet_id/members/:actor_id",
            delete(handlers::members::remove_member),
        )
        .route(
            "/cabinets/:cabinet_id/members/:actor_id/permissions",
            put(handlers::members::set_member_permissions),
        )
        .layer(from_fn_with_state(
            state.clone(),
            middleware::auth_middleware,
        ));

    // Invitation lookup is public; the other methods authenticate through `AuthUser`.
    let invitation_routes = Router::new()
        .route("/invitations", post(handlers::invitation::create_invitation))
        .route(
            "/invitations/:token",
            get(handlers::invitation::get_invitation)
                .delete(handlers::invitation::revoke_invitation),
        )
        .route(
            "/invitations/:token/accept",
            post(handlers::invitation::accept_invitation),
        );

    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(handlers::metrics::metrics))
        .route(
            "/.well-known/openapi.json",
            get(|| async { Json(ApiDoc::openapi()) }),
        )
        .merge(invitation_routes)
        .merge(cabinet_routes)
        .merge(two_factor_routes)
        .with_state(state.clone())
        .layer(from_fn(metrics_middleware))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &Request<_>| {
                let request_id = request
                    .headers()
                    .get(REQUEST_ID_HEADER)
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    path = %span_path(request.uri().path()),
                )
            }),
        )
        .layer(from_fn(request_id_middleware))
        .layer(from_fn(security_headers_middleware))
        .layer(
            CorsLayer::new()
                .allow_origin(
                    state
                        .config
                        .allowed_origins
                        .iter()
                        .filter_map(|o| match o.parse::<HeaderValue>() {
                            Ok(value) => Some(value),
                            Err(e) => {
                                tracing::error!("Invalid CORS origin '{}': {}. Skipping.", o, e);
                                None
                            }
                        })
                        .collect::<Vec<HeaderValue>>(),
                )
                .allow_methods([
                    Method::GET,
                    Method::POST,
                    Method::PUT,
                    Method::DELETE,
                    Method::OPTIONS,
                ])
                .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]),
        )
}

/// Health check endpoint
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy", body = serde_json::Value),
        (status = 503, description = "Store unavailable", body = handlers::ErrorResponse)
    ),
    tag = "Observability"
)]
pub async fn health_check(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> Result<Json<serde_json::Value>, AppError> {
    state.store.health_check().await.map_err(|e| {
        tracing::error!(error = %e, "Health check failed");
        AppError::ServiceUnavailable
    })?;

    Ok(Json(serde_json::json!({
        "status": "healthy",
        "service": state.config.service_name,
        "version": state.config.service_version,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn span_path_hides_invitation_tokens() {
        assert_eq!(span_path("/invitations/abc123"), "/invitations/:token");
        assert_eq!(
            span_path("/invitations/abc123/accept"),
            "/invitations/:token/accept"
        );
        assert_eq!(span_path("/invitations"), "/invitations");
        assert_eq!(span_path("/health"), "/health");
    }
}
