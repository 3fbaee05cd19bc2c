//! Common test utilities for integration tests
//!
//! [`TestApp`] drives the full router over in-memory stores. Session cookies
//! returned by login are passed back explicitly, the way a browser would.

#![allow(dead_code)]

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use rolegate_backend::{config::AppConfig, routes, state::AppState};
use rolegate_shared::{RegistrationPolicy, RoleRequest};
use secrecy::SecretString;
use serde_json::{json, Value};
use tower::ServiceExt;

pub const ADMIN_EMAIL: &str = "root@example.com";
pub const ADMIN_PASSWORD: &str = "Admin123!";
pub const PASSWORD: &str = "Secret123!";

/// Test application wrapper
pub struct TestApp {
    pub app: Router,
    pub state: AppState,
}

/// Status, parsed JSON body and `Set-Cookie` values of one response
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Value,
    pub cookies: Vec<String>,
    pub retry_after: Option<String>,
}

impl TestResponse {
    pub fn message(&self) -> &str {
        self.body["message"]
            .as_str()
            .or_else(|| self.body["error"]["message"].as_str())
            .unwrap_or_default()
    }

    /// `Cookie` header carrying every cookie this response set
    pub fn cookie_header(&self) -> String {
        self.cookies
            .iter()
            .filter_map(|c| c.split(';').next())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

pub fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.hashing.cost = 4;
    config.bootstrap.admin_email = Some(ADMIN_EMAIL.to_string());
    config.bootstrap.admin_password = Some(SecretString::new(ADMIN_PASSWORD.to_string()));
    config.bootstrap.admin_name = Some("Root".to_string());
    config
}

impl TestApp {
    pub async fn new() -> Self {
        Self::with_config(test_config()).await
    }

    pub async fn with_config(config: AppConfig) -> Self {
        let bootstrap = config.bootstrap.clone();
        let state = AppState::in_memory(config);
        state
            .auth
            .ensure_admin(&bootstrap)
            .await
            .expect("Failed to bootstrap admin");
        let app = routes::create_router(state.clone());

        Self { app, state }
    }

    pub async fn request(&self, method: &str, path: &str, body: Option<Value>, cookie: Option<&str>) -> TestResponse {
        let mut builder = Request::builder().method(method).uri(path);
        if let Some(cookie) = cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        let body = match body {
            Some(body) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(body.to_string())
            }
            None => Body::empty(),
        };

        let response = self
            .app
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();

        let status = response.status();
        let cookies = response
            .headers()
            .get_all(header::SET_COOKIE)
            .iter()
            .map(|v| v.to_str().unwrap().to_string())
            .collect();
        let retry_after = response
            .headers()
            .get(header::RETRY_AFTER)
            .map(|v| v.to_str().unwrap().to_string());
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));

        TestResponse {
            status,
            body,
            cookies,
            retry_after,
        }
    }

    pub async fn get(&self, path: &str, cookie: Option<&str>) -> TestResponse {
        self.request("GET", path, None, cookie).await
    }

    pub async fn post(&self, path: &str, body: Value, cookie: Option<&str>) -> TestResponse {
        self.request("POST", path, Some(body), cookie).await
    }

    pub async fn patch(&self, path: &str, body: Value, cookie: Option<&str>) -> TestResponse {
        self.request("PATCH", path, Some(body), cookie).await
    }

    pub async fn delete(&self, path: &str, body: Value, cookie: Option<&str>) -> TestResponse {
        self.request("DELETE", path, Some(body), cookie).await
    }

    /// Create an open role directly through the service
    pub async fn add_role(&self, name: &str) {
        self.add_role_with(RoleRequest {
            name: name.to_string(),
            ..Default::default()
        })
        .await;
    }

    pub async fn add_role_with(&self, request: RoleRequest) {
        self.state.auth.add_role(request).await.expect("Failed to add role");
    }

    /// Role that only the listed emails may register for
    pub async fn add_approved_role(&self, name: &str, whitelist: &[&str]) {
        self.add_role_with(RoleRequest {
            name: name.to_string(),
            registration: RegistrationPolicy {
                approvement_required: true,
                whitelist: whitelist.iter().map(|e| e.to_string()).collect(),
            },
            ..Default::default()
        })
        .await;
    }

    /// Register and return the echoed verification token
    pub async fn register(&self, email: &str, role: &str, name: &str) -> TestResponse {
        let body = json!({
            "email": email,
            "role": role,
            "additions": { "name": name, "password": PASSWORD }
        });
        self.post("/api/v1/auth/register", body, None).await
    }

    /// Register, verify and log in; returns the session cookie header
    pub async fn member(&self, email: &str, role: &str) -> String {
        let registered = self.register(email, role, "Member").await;
        assert_eq!(registered.status, StatusCode::CREATED, "{}", registered.message());
        let token = registered.body["data"]["token"].as_str().unwrap().to_string();

        let verified = self.patch("/api/v1/auth/verify", json!({ "token": token }), None).await;
        assert_eq!(verified.status, StatusCode::OK);

        self.login(email, role, PASSWORD).await.cookie_header()
    }

    pub async fn login(&self, email: &str, role: &str, password: &str) -> TestResponse {
        let body = json!({ "role": role, "email": email, "password": password });
        self.post("/api/v1/auth/login", body, None).await
    }

    pub async fn admin(&self) -> String {
        let response = self.login(ADMIN_EMAIL, "admin", ADMIN_PASSWORD).await;
        assert_eq!(response.status, StatusCode::OK);
        response.cookie_header()
    }
}
