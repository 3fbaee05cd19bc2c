//! Integration tests for route admission and the administrative endpoints

mod common;

use axum::http::StatusCode;
use common::{TestApp, PASSWORD};
use serde_json::json;

#[tokio::test]
async fn test_admin_bypasses_unregistered_route() {
    let app = TestApp::new().await;
    let admin = app.admin().await;

    let response = app.get("/api/v1/members", Some(&admin)).await;

    assert_eq!(response.status, StatusCode::OK);
}

#[tokio::test]
async fn test_member_on_unregistered_route_is_not_found() {
    let app = TestApp::new().await;
    app.add_role("user").await;
    let member = app.member("ana@example.com", "user").await;

    let response = app.get("/api/v1/members", Some(&member)).await;

    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert_eq!(response.message(), "this route has not been registered");
}

#[tokio::test]
async fn test_method_restrictions_over_http() {
    let app = TestApp::new().await;
    app.add_role("user").await;
    app.add_role("staff").await;
    let admin = app.admin().await;
    let member = app.member("ana@example.com", "user").await;
    let staff = app.member("bo@example.com", "staff").await;

    let route = json!({
        "name": "/api/v1/members",
        "restrictions": [{ "method": "PATCH", "roles": ["staff"] }]
    });
    let created = app.post("/api/v1/auth/route", route, Some(&admin)).await;
    assert_eq!(created.status, StatusCode::CREATED);

    // no restriction for GET yet
    assert_eq!(app.get("/api/v1/members", Some(&member)).await.status, StatusCode::OK);

    let route = json!({
        "name": "/api/v1/members",
        "restrictions": [
            { "method": "GET", "roles": ["staff", "staff"] },
            { "method": "GET", "roles": ["user"] }
        ]
    });
    let updated = app.patch("/api/v1/auth/route", route, Some(&admin)).await;
    assert_eq!(updated.status, StatusCode::OK);
    assert_eq!(updated.body["data"]["restrictions"], json!([{ "method": "GET", "roles": ["staff"] }]));

    let refused = app.get("/api/v1/members?role=user", Some(&member)).await;
    assert_eq!(refused.status, StatusCode::FORBIDDEN);
    assert_eq!(refused.message(), "you don't have permission to access this route");

    assert_eq!(app.get("/api/v1/members?role=user", Some(&staff)).await.status, StatusCode::OK);
}

#[tokio::test]
async fn test_unknown_route_method_is_bad_request() {
    let app = TestApp::new().await;
    let admin = app.admin().await;

    let route = json!({ "name": "/x", "restrictions": [{ "method": "TRACE", "roles": [] }] });
    let response = app.post("/api/v1/auth/route", route, Some(&admin)).await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_role_requires_name() {
    let app = TestApp::new().await;
    let admin = app.admin().await;

    let response = app.post("/api/v1/auth/role", json!({ "limits": [] }), Some(&admin)).await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.message(), "1. name is required.");
}

#[tokio::test]
async fn test_deleted_account_loses_access() {
    let app = TestApp::new().await;
    app.add_role("user").await;
    let admin = app.admin().await;
    let member = app.member("ana@example.com", "user").await;

    let route = json!({ "name": "/api/v1/auth/account", "restrictions": [] });
    app.post("/api/v1/auth/route", route, Some(&admin)).await;

    let deleted = app.delete("/api/v1/auth/account", json!({}), Some(&member)).await;
    assert_eq!(deleted.status, StatusCode::OK);

    let again = app.delete("/api/v1/auth/account", json!({}), Some(&member)).await;
    assert_eq!(again.status, StatusCode::NOT_FOUND);
    assert_eq!(again.message(), "this email has not been registered");

    let login = app.login("ana@example.com", "user", PASSWORD).await;
    assert_eq!(login.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_change_password_through_session() {
    let app = TestApp::new().await;
    app.add_role("user").await;
    let admin = app.admin().await;
    let member = app.member("ana@example.com", "user").await;

    for name in ["/api/v1/auth/change-password", "/api/v1/auth/verify-password"] {
        app.post("/api/v1/auth/route", json!({ "name": name }), Some(&admin)).await;
    }

    let wrong = app
        .post("/api/v1/auth/verify-password", json!({ "password": "Nope123!" }), Some(&member))
        .await;
    assert_eq!(wrong.status, StatusCode::UNAUTHORIZED);

    let changed = app
        .patch("/api/v1/auth/change-password", json!({ "password": "Changed123!" }), Some(&member))
        .await;
    assert_eq!(changed.status, StatusCode::OK);

    assert_eq!(app.login("ana@example.com", "user", PASSWORD).await.status, StatusCode::UNAUTHORIZED);
    assert_eq!(app.login("ana@example.com", "user", "Changed123!").await.status, StatusCode::OK);
}
