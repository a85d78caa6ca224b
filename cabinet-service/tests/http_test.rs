mod common;

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use cabinet_service::models::{AuthenticatedActor, Invitation, InvitationRole};
use cabinet_service::services::invitations::hash_token;
use cabinet_service::services::CabinetStore;
use chrono::Duration;
use common::*;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    bearer: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, axum::http::HeaderMap, Value) {
    send_from(app, "203.0.113.7", method, uri, bearer, body).await
}

async fn send_from(
    app: &Router,
    client_ip: &str,
    method: &str,
    uri: &str,
    bearer: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, axum::http::HeaderMap, Value) {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("x-forwarded-for", client_ip);
    if let Some(token) = bearer {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, headers, value)
}

#[tokio::test]
async fn health_and_openapi_are_public() {
    let app = TestApp::new();
    let router = app.router();

    let (status, headers, body) = send(&router, "GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert!(headers.contains_key("x-request-id"));

    let (status, _, body) = send(&router, "GET", "/.well-known/openapi.json", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["paths"]["/invitations/{token}/accept"].is_object());

    let (status, _, _) = send(&router, "GET", "/metrics", None, None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn bearer_token_is_required() {
    let app = TestApp::new();
    let router = app.router();
    let (cabinet, _) = app.seed_cabinet_with_owner().await;

    let (status, _, _) = send(
        &router,
        "GET",
        &format!("/cabinets/{}/permissions", cabinet.cabinet_id),
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _, _) = send(
        &router,
        "POST",
        "/invitations",
        Some("not-a-jwt"),
        Some(json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn invitation_flow_over_http() {
    let app = TestApp::new();
    let router = app.router();
    let (cabinet, owner) = app.seed_cabinet_with_owner().await;
    let owner_token = app.token_for(&owner);

    let (status, _, body) = send(
        &router,
        "POST",
        "/invitations",
        Some(&owner_token),
        Some(json!({
            "email": "jane@example.com",
            "name": "Jane Doe",
            "role": "staff",
            "cabinet_id": cabinet.cabinet_id,
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["dispatch"]["status"], "sent");
    assert_eq!(body["invitation"]["status"], "pending");
    assert!(body["invitation"].get("token_hash").is_none());
    let token = body["invite_token"].as_str().unwrap().to_string();

    let (status, _, body) = send(&router, "GET", &format!("/invitations/{}", token), None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["cabinet_name"], cabinet.cabinet_name.as_str());

    let jane = new_identity("jane@example.com", "Jane Doe");
    let jane_token = app.token_for(&jane);
    let (status, _, body) = send(
        &router,
        "POST",
        &format!("/invitations/{}/accept", token),
        Some(&jane_token),
        Some(json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["membership"]["member_role"], "staff");
    assert_eq!(body["cabinet_created"], false);

    let (status, _, body) = send(&router, "GET", &format!("/invitations/{}", token), None, None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["code"], "invitation_already_accepted");

    let (status, _, body) = send(
        &router,
        "GET",
        &format!(
            "/cabinets/{}/permissions/check?module=agenda&action=write",
            cabinet.cabinet_id
        ),
        Some(&jane_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["allowed"], false);

    let (status, _, body) = send(
        &router,
        "GET",
        &format!("/cabinets/{}/members", cabinet.cabinet_id),
        Some(&owner_token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().map(Vec::len), Some(2));
}

#[tokio::test]
async fn error_codes_distinguish_invitation_states() {
    let app = TestApp::new();
    let router = app.router();
    let (cabinet, owner) = app.seed_cabinet_with_owner().await;

    let expired = Invitation::new(
        hash_token("stale"),
        "late@example.com".to_string(),
        "Late".to_string(),
        InvitationRole::Staff,
        Some(cabinet.cabinet_id),
        None,
        None,
        None,
        Some(owner.actor_id),
        Duration::hours(-2),
    );
    app.store.insert_invitation(&expired).await.unwrap();

    let (status, _, body) = send(&router, "GET", "/invitations/stale", None, None).await;
    assert_eq!(status, StatusCode::GONE);
    assert_eq!(body["code"], "invitation_expired");

    let (status, _, body) = send(&router, "GET", "/invitations/missing", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "invitation_not_found");

    let issued = app.invite_staff(&owner, &cabinet, "jane@example.com").await;
    let intruder = AuthenticatedActor {
        email: "mallory@example.com".to_string(),
        ..new_identity("x@example.com", "Mallory")
    };
    let (status, _, body) = send(
        &router,
        "POST",
        &format!("/invitations/{}/accept", issued.token),
        Some(&app.token_for(&intruder)),
        Some(json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "email_mismatch");
}

#[tokio::test]
async fn non_member_sees_denied_matrix() {
    let app = TestApp::new();
    let router = app.router();
    let (cabinet, _) = app.seed_cabinet_with_owner().await;
    let stranger = new_identity("stranger@example.com", "Stranger");

    let (status, _, body) = send(
        &router,
        "GET",
        &format!("/cabinets/{}/permissions", cabinet.cabinet_id),
        Some(&app.token_for(&stranger)),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let modules = body["permissions"]["modules"].as_object().unwrap();
    assert_eq!(modules.len(), 6);
    assert!(modules.values().all(|p| p["can_read"] == false));
}

#[tokio::test]
async fn two_factor_routes_validate_and_rate_limit() {
    let mut config = test_config();
    config.two_factor.ip_limit = 2;
    let app = TestApp::with_config(config);
    let router = app.router();

    let (status, _, body) = send(
        &router,
        "POST",
        "/auth/2fa/verify",
        None,
        Some(json!({ "email": "a@example.com", "code": "12ab56" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "validation_failed");

    let (status, _, body) = send(
        &router,
        "POST",
        "/auth/2fa/send",
        None,
        Some(json!({ "email": "a@example.com" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["expires_in"], 300);

    let (status, headers, _) = send(
        &router,
        "POST",
        "/auth/2fa/send",
        None,
        Some(json!({ "email": "a@example.com" })),
    )
    .await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert!(headers.contains_key(header::RETRY_AFTER));
}

#[tokio::test]
async fn guessing_from_many_addresses_still_locks_the_code() {
    let mut config = test_config();
    config.two_factor.ip_limit = 2;
    let app = TestApp::with_config(config);
    let router = app.router();

    app.state.two_factor.issue_code("victim@example.com").await.unwrap();
    let code = app.mailer.last_code_for("victim@example.com").unwrap();

    let guesses = (0..)
        .map(|n| format!("{:06}", n))
        .filter(|g| *g != code)
        .take(30);
    for (i, guess) in guesses.enumerate() {
        let (status, _, _) = send_from(
            &router,
            &format!("198.51.100.{}", i + 1),
            "POST",
            "/auth/2fa/verify",
            None,
            Some(json!({ "email": "victim@example.com", "code": guess })),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    let (status, _, body) = send_from(
        &router,
        "198.51.100.200",
        "POST",
        "/auth/2fa/verify",
        None,
        Some(json!({ "email": "victim@example.com", "code": code })),
    )
    .await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["code"], "code_attempts_exhausted");
}

#[tokio::test]
async fn cabinet_manager_cancels_invitation_by_id() {
    let app = TestApp::new();
    let router = app.router();
    let (cabinet, owner) = app.seed_cabinet_with_owner().await;
    let issued = app.invite_staff(&owner, &cabinet, "jane@example.com").await;
    let uri = format!(
        "/cabinets/{}/invitations/{}",
        cabinet.cabinet_id, issued.invitation.invitation_id
    );

    let outsider = new_identity("mallory@example.com", "Mallory");
    let (status, _, body) = send(&router, "DELETE", &uri, Some(&app.token_for(&outsider)), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["code"], "permission_denied");

    let owner_token = app.token_for(&owner);
    let (status, _, body) = send(&router, "DELETE", &uri, Some(&owner_token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["revoked"], true);

    let (status, _, body) = send(&router, "DELETE", &uri, Some(&owner_token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["revoked"], false);

    let (status, _, body) = send(
        &router,
        "GET",
        &format!("/invitations/{}", issued.token),
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "invitation_not_found");
}
