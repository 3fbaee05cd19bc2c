//! Integration tests for registration, login and the password flows

mod common;

use axum::http::StatusCode;
use chrono::{DateTime, Duration, Utc};
use common::{TestApp, PASSWORD};
use fake::faker::internet::en::SafeEmail;
use fake::faker::name::en::Name;
use fake::Fake;
use rolegate_shared::RegisterRequest;
use serde_json::json;

#[tokio::test]
async fn test_register_verify_login() {
    let app = TestApp::new().await;
    app.add_role("user").await;
    let email: String = SafeEmail().fake();
    let name: String = Name().fake();

    let registered = app.register(&email, "user", &name).await;
    assert_eq!(registered.status, StatusCode::CREATED);
    let token = registered.body["data"]["token"].as_str().unwrap().to_string();

    let early = app.login(&email, "user", PASSWORD).await;
    assert_eq!(early.status, StatusCode::UNAUTHORIZED);

    let verified = app.patch("/api/v1/auth/verify", json!({ "token": token }), None).await;
    assert_eq!(verified.status, StatusCode::OK);

    let login = app.login(&email, "user", PASSWORD).await;
    assert_eq!(login.status, StatusCode::OK);
    assert_eq!(login.body["data"]["email"], email.as_str());
    assert_eq!(login.body["data"]["additions"]["name"], name.as_str());
    assert!(login.body["data"]["additions"].get("password").is_none());
    assert_eq!(login.cookies.len(), 2);
}

#[tokio::test]
async fn test_same_role_twice_conflicts() {
    let app = TestApp::new().await;
    app.add_role("user").await;

    app.register("ana@example.com", "user", "Ana").await;
    let again = app.register("ana@example.com", "user", "Someone Else").await;

    assert_eq!(again.status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_existing_identity_gains_role_without_token() {
    let app = TestApp::new().await;
    app.add_role("user").await;
    app.add_role("librarian").await;
    app.member("ana@example.com", "user").await;

    let second = app.register("ana@example.com", "librarian", "Ana").await;
    assert_eq!(second.status, StatusCode::OK);
    assert_eq!(second.message(), "registered as new role successfully");
    assert!(second.body.get("data").is_none());

    let login = app.login("ana@example.com", "librarian", PASSWORD).await;
    assert_eq!(login.status, StatusCode::OK);
}

#[tokio::test]
async fn test_register_requires_role() {
    let app = TestApp::new().await;

    let body = json!({ "email": "ana@example.com", "additions": { "name": "Ana", "password": PASSWORD } });
    let response = app.post("/api/v1/auth/register", body, None).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.message(), "role is required");

    let unknown = app.register("ana@example.com", "ghost", "Ana").await;
    assert_eq!(unknown.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_resend_within_pause_is_rate_limited() {
    let app = TestApp::new().await;
    app.add_role("user").await;
    let before = Utc::now();
    app.register("ana@example.com", "user", "Ana").await;

    let response = app
        .patch("/api/v1/auth/resend-mailtoken", json!({ "email": "ana@example.com" }), None)
        .await;

    assert_eq!(response.status, StatusCode::TOO_MANY_REQUESTS);
    let retry_at: DateTime<Utc> = response.body["error"]["retry_at"].as_str().unwrap().parse().unwrap();
    assert!(retry_at >= before + Duration::seconds(300));
    assert!(retry_at <= Utc::now() + Duration::seconds(300));
    assert!(response.retry_after.is_some());
}

#[tokio::test]
async fn test_resend_after_pause_issues_new_token() {
    let mut config = common::test_config();
    config.mail.verify_mail_pause_secs = 0;
    let app = TestApp::with_config(config).await;
    app.add_role("user").await;
    let first = app.register("ana@example.com", "user", "Ana").await;
    let first = first.body["data"]["token"].as_str().unwrap().to_string();

    let resent = app
        .patch("/api/v1/auth/resend-mailtoken", json!({ "email": "ana@example.com" }), None)
        .await;
    assert_eq!(resent.status, StatusCode::OK);
    let token = resent.body["data"]["token"].as_str().unwrap().to_string();
    assert_ne!(token, first);
    assert!(resent.body["data"]["expires_at"].is_string());

    let stale = app.patch("/api/v1/auth/verify", json!({ "token": first }), None).await;
    assert_eq!(stale.status, StatusCode::UNAUTHORIZED);
    let fresh = app.patch("/api/v1/auth/verify", json!({ "token": token }), None).await;
    assert_eq!(fresh.status, StatusCode::OK);
}

#[tokio::test]
async fn test_refresh_keeps_refresh_cookie() {
    let app = TestApp::new().await;
    app.add_role("user").await;
    let cookie = app.member("ana@example.com", "user").await;

    let refreshed = app.post("/api/v1/auth/refresh-token", json!({}), Some(&cookie)).await;
    assert_eq!(refreshed.status, StatusCode::OK);
    assert!(refreshed.cookies.iter().all(|c| !c.starts_with("refresh_token=")));

    let missing = app.post("/api/v1/auth/refresh-token", json!({}), None).await;
    assert_eq!(missing.status, StatusCode::FORBIDDEN);
    assert_eq!(missing.message(), "refresh token is not available");
}

#[tokio::test]
async fn test_reset_with_bad_token_leaves_password() {
    let app = TestApp::new().await;
    app.add_role("user").await;
    app.member("ana@example.com", "user").await;

    let forgot = app
        .post(
            "/api/v1/auth/forgot-password",
            json!({ "email": "ana@example.com", "role": "user" }),
            None,
        )
        .await;
    assert_eq!(forgot.status, StatusCode::OK);
    let token = forgot.body["data"]["token"].as_str().unwrap().to_string();

    let again = app
        .post(
            "/api/v1/auth/forgot-password",
            json!({ "email": "ana@example.com", "role": "user" }),
            None,
        )
        .await;
    assert_eq!(again.status, StatusCode::TOO_MANY_REQUESTS);

    let reset = |token: &str, password: &str| {
        json!({ "email": "ana@example.com", "role": "user", "token": token, "password": password })
    };

    let forged = app.patch("/api/v1/auth/reset-password", reset("forged-token", "Hijack123!"), None).await;
    assert_eq!(forged.status, StatusCode::UNAUTHORIZED);
    assert_eq!(app.login("ana@example.com", "user", PASSWORD).await.status, StatusCode::OK);

    let weak = app.patch("/api/v1/auth/reset-password", reset(&token, "weak"), None).await;
    assert_eq!(weak.status, StatusCode::BAD_REQUEST);

    let done = app.patch("/api/v1/auth/reset-password", reset(&token, "Renewed123!"), None).await;
    assert_eq!(done.status, StatusCode::OK);
    assert_eq!(app.login("ana@example.com", "user", "Renewed123!").await.status, StatusCode::OK);

    let replay = app.patch("/api/v1/auth/reset-password", reset(&token, "Replay123!"), None).await;
    assert_eq!(replay.status, StatusCode::UNAUTHORIZED);
    assert_eq!(app.login("ana@example.com", "user", "Renewed123!").await.status, StatusCode::OK);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_whitelist_admits_one_concurrent_registration() {
    let app = TestApp::new().await;
    app.add_approved_role("staff", &["ana@example.com"]).await;

    let attempts = (0..8).map(|_| {
        let auth = app.state.auth.clone();
        tokio::spawn(async move {
            let request = RegisterRequest {
                email: "ana@example.com".into(),
                role: "staff".into(),
                additions: json!({ "name": "Ana", "password": PASSWORD })
                    .as_object()
                    .cloned()
                    .unwrap(),
            };
            auth.register(request).await
        })
    });

    let mut admitted = 0;
    for attempt in attempts.collect::<Vec<_>>() {
        if attempt.await.unwrap().is_ok() {
            admitted += 1;
        }
    }
    assert_eq!(admitted, 1);

    let outsider = app.register("bo@example.com", "staff", "Bo").await;
    assert_eq!(outsider.status, StatusCode::UNAUTHORIZED);
}
