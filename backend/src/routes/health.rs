//! Operational probes for the gateway
//!
//! `/health` and `/health/live` answer as long as the process serves requests.
//! `/health/ready` also checks the store backend: a PostgreSQL deployment is
//! ready only while the pool answers, in-memory stores are always ready.

use crate::{db, state::AppState};
use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checks: Option<HealthChecks>,
}

#[derive(Serialize)]
pub struct HealthChecks {
    /// Identity, role, route and reset-grant storage
    pub stores: CheckStatus,
}

#[derive(Serialize)]
pub struct CheckStatus {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl CheckStatus {
    fn healthy(message: Option<&str>) -> Self {
        Self {
            status: "healthy".to_string(),
            message: message.map(str::to_string),
        }
    }

    fn is_healthy(&self) -> bool {
        self.status == "healthy"
    }
}

fn probe(status: &str, checks: Option<HealthChecks>) -> HealthResponse {
    HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        checks,
    }
}

/// GET /health
pub async fn health_check() -> Json<HealthResponse> {
    Json(probe("healthy", None))
}

async fn store_check(state: &AppState) -> CheckStatus {
    let Some(pool) = &state.db else {
        return CheckStatus::healthy(Some("in-memory stores"));
    };
    match db::health_check(pool).await {
        Ok(()) => CheckStatus::healthy(None),
        Err(e) => CheckStatus {
            status: "unhealthy".to_string(),
            message: Some(e.to_string()),
        },
    }
}

/// GET /health/ready; 503 while the store backend is unreachable
pub async fn readiness_check(
    State(state): State<AppState>,
) -> Result<Json<HealthResponse>, (StatusCode, Json<HealthResponse>)> {
    let stores = store_check(&state).await;
    let ready = stores.is_healthy();
    let response = probe(
        if ready { "ready" } else { "not_ready" },
        Some(HealthChecks { stores }),
    );

    if ready {
        Ok(Json(response))
    } else {
        Err((StatusCode::SERVICE_UNAVAILABLE, Json(response)))
    }
}

/// GET /health/live
pub async fn liveness_check() -> Json<HealthResponse> {
    Json(probe("alive", None))
}
