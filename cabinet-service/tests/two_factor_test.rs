mod common;

use cabinet_service::models::{TwoFactorCode, TwoFactorState};
use cabinet_service::services::two_factor::hash_code;
use cabinet_service::services::{CabinetStore, ServiceError};
use chrono::{Duration, Utc};
use common::*;

#[tokio::test]
async fn issued_code_verifies_once() {
    let app = TestApp::new();

    let issued = app
        .state
        .two_factor
        .issue_code("User@Example.com")
        .await
        .unwrap();
    assert_eq!(issued.expires_in, 300);

    let code = app.mailer.last_code_for("user@example.com").expect("code sent");
    assert_eq!(code.len(), 6);

    app.state
        .two_factor
        .verify_code("user@example.com", &code)
        .await
        .unwrap();

    let reuse = app.state.two_factor.verify_code("user@example.com", &code).await;
    assert!(matches!(reuse, Err(ServiceError::AlreadyUsed)));

    let stored = app
        .store
        .find_latest_two_factor_code("user@example.com", &hash_code("user@example.com", &code))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.code_id, issued.code_id);
    assert_eq!(stored.state_at(Utc::now()), TwoFactorState::Consumed);
}

#[tokio::test]
async fn concurrent_verification_succeeds_once() {
    let app = TestApp::with_yielding_store();
    app.state.two_factor.issue_code("a@example.com").await.unwrap();
    let code = app.mailer.last_code_for("a@example.com").unwrap();

    let (first, second) = tokio::join!(
        app.state.two_factor.verify_code("a@example.com", &code),
        app.state.two_factor.verify_code("a@example.com", &code),
    );

    let outcomes = [first, second];
    assert_eq!(outcomes.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(outcomes
        .iter()
        .any(|r| matches!(r, Err(ServiceError::AlreadyUsed))));
}

#[tokio::test]
async fn expired_code_is_rejected() {
    let app = TestApp::new();
    let email = "late@example.com";
    let stale = TwoFactorCode::new(
        email.to_string(),
        hash_code(email, "123456"),
        Duration::seconds(-1),
    );
    app.store.insert_two_factor_code(&stale).await.unwrap();
    assert_eq!(stale.state_at(Utc::now()), TwoFactorState::Expired);

    let result = app.state.two_factor.verify_code(email, "123456").await;
    assert!(matches!(result, Err(ServiceError::CodeExpired)));
}

#[tokio::test]
async fn newer_valid_code_wins_over_expired_duplicate() {
    let app = TestApp::new();
    let email = "dup@example.com";
    let stale = TwoFactorCode::new(
        email.to_string(),
        hash_code(email, "654321"),
        Duration::seconds(-60),
    );
    app.store.insert_two_factor_code(&stale).await.unwrap();
    let fresh = TwoFactorCode::new(
        email.to_string(),
        hash_code(email, "654321"),
        Duration::minutes(5),
    );
    app.store.insert_two_factor_code(&fresh).await.unwrap();

    assert!(app.state.two_factor.verify_code(email, "654321").await.is_ok());
}

#[tokio::test]
async fn unknown_and_malformed_codes() {
    let app = TestApp::new();
    app.state.two_factor.issue_code("b@example.com").await.unwrap();
    let code = app.mailer.last_code_for("b@example.com").unwrap();
    let wrong = if code == "000000" { "111111" } else { "000000" };

    let result = app.state.two_factor.verify_code("b@example.com", wrong).await;
    assert!(matches!(
        result,
        Err(ServiceError::NotFound("Verification code"))
    ));

    for malformed in ["12345", "1234567", "12a456", ""] {
        let result = app.state.two_factor.verify_code("b@example.com", malformed).await;
        assert!(
            matches!(result, Err(ServiceError::Validation(_))),
            "{malformed:?} should be rejected"
        );
    }

    // The real code is still usable after failed attempts.
    assert!(app
        .state
        .two_factor
        .verify_code("b@example.com", &code)
        .await
        .is_ok());
}

#[tokio::test]
async fn issuance_is_throttled_per_email() {
    let app = TestApp::new();

    for _ in 0..3 {
        app.state.two_factor.issue_code("c@example.com").await.unwrap();
    }
    let result = app.state.two_factor.issue_code("c@example.com").await;
    match result {
        Err(ServiceError::TooManyRequests { retry_after_secs }) => assert!(retry_after_secs > 0),
        other => panic!("expected throttling, got {other:?}"),
    }

    // Other addresses are unaffected.
    assert!(app.state.two_factor.issue_code("d@example.com").await.is_ok());
}

#[tokio::test]
async fn invalid_email_and_dispatch_failure() {
    let app = TestApp::new();
    let result = app.state.two_factor.issue_code("not-an-email").await;
    assert!(matches!(result, Err(ServiceError::Validation(_))));

    let failing = TestApp::with_failing_mailer();
    let result = failing.state.two_factor.issue_code("e@example.com").await;
    assert!(matches!(result, Err(ServiceError::Dispatch(_))));
}

fn wrong_guesses(code: &str) -> impl Iterator<Item = String> + '_ {
    (0..).map(|n| format!("{:06}", n)).filter(move |g| g != code)
}

#[tokio::test]
async fn repeated_wrong_guesses_lock_the_code() {
    let app = TestApp::new();
    app.state.two_factor.issue_code("f@example.com").await.unwrap();
    let code = app.mailer.last_code_for("f@example.com").unwrap();

    for guess in wrong_guesses(&code).take(5) {
        let result = app.state.two_factor.verify_code("f@example.com", &guess).await;
        assert!(matches!(
            result,
            Err(ServiceError::NotFound("Verification code"))
        ));
    }

    let result = app.state.two_factor.verify_code("f@example.com", &code).await;
    assert!(matches!(result, Err(ServiceError::AttemptsExhausted)));

    // A freshly issued code starts with a clean slate.
    app.state.two_factor.issue_code("f@example.com").await.unwrap();
    let next = app.mailer.last_code_for("f@example.com").unwrap();
    assert!(app
        .state
        .two_factor
        .verify_code("f@example.com", &next)
        .await
        .is_ok());
}

#[tokio::test]
async fn wrong_guesses_only_count_against_that_email() {
    let app = TestApp::new();
    app.state.two_factor.issue_code("g@example.com").await.unwrap();
    app.state.two_factor.issue_code("h@example.com").await.unwrap();
    let code = app.mailer.last_code_for("h@example.com").unwrap();

    for guess in wrong_guesses("").take(10) {
        let _ = app.state.two_factor.verify_code("g@example.com", &guess).await;
    }

    assert!(app
        .state
        .two_factor
        .verify_code("h@example.com", &code)
        .await
        .is_ok());
}

#[tokio::test]
async fn prune_removes_spent_codes_outside_the_window() {
    let app = TestApp::new();
    let email = "old@example.com";

    let mut spent = TwoFactorCode::new(
        email.to_string(),
        hash_code(email, "111111"),
        Duration::minutes(5),
    );
    spent.created_utc = Utc::now() - Duration::hours(2);
    spent.used = true;
    app.store.insert_two_factor_code(&spent).await.unwrap();

    let mut lapsed = TwoFactorCode::new(
        email.to_string(),
        hash_code(email, "222222"),
        Duration::minutes(5),
    );
    lapsed.created_utc = Utc::now() - Duration::hours(2);
    lapsed.expiry_utc = lapsed.created_utc + Duration::minutes(5);
    app.store.insert_two_factor_code(&lapsed).await.unwrap();

    // Used but still inside the throttling window.
    let mut recent = TwoFactorCode::new(
        email.to_string(),
        hash_code(email, "333333"),
        Duration::minutes(5),
    );
    recent.used = true;
    app.store.insert_two_factor_code(&recent).await.unwrap();

    assert_eq!(app.state.two_factor.prune_expired().await.unwrap(), 2);
    assert!(app
        .store
        .find_latest_two_factor_code(email, &hash_code(email, "111111"))
        .await
        .unwrap()
        .is_none());
    assert!(app
        .store
        .find_latest_two_factor_code(email, &hash_code(email, "333333"))
        .await
        .unwrap()
        .is_some());
}
