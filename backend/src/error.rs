//! Application error handling
//!
//! This module provides unified error handling for the API,
//! converting internal errors to appropriate HTTP responses.

use crate::auth::TokenError;
use axum::{
    http::{header::RETRY_AFTER, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use rolegate_shared::types::{ErrorDetail, ErrorResponse};
use rolegate_shared::{SchemaError, ValidationFailure};
use thiserror::Error;
use tracing::error;

/// Fixed messages for domain rule violations
pub mod messages {
    pub const INTERNAL: &str = "our server encountered error, please try again later";
    pub const ROLE_REQUIRED: &str = "role is required";
    pub const ALREADY_REGISTERED: &str = "this email has been registered with this role";
    pub const USER_NOT_FOUND: &str = "this email has not been registered";
    pub const USER_UNVERIFIED: &str = "this email has not been verified";
    pub const USER_VERIFIED: &str = "this email has been verified";
    pub const INVALID_ROLE: &str = "this email is not registered with this role";
    pub const INVALID_TOKEN: &str = "token is invalid";
    pub const WRONG_PASSWORD: &str = "password is incorrect";
    pub const NO_REFRESH_TOKEN: &str = "refresh token is not available";
    pub const NO_ACCESS_TOKEN: &str = "access token is not available";
    pub const ROLE_NOT_FOUND: &str = "this role has not been created";
    pub const ROLE_EXISTS: &str = "this role already exist";
    pub const RESTRICTED_ROUTE: &str = "you don't have permission to access this route";
    pub const ROUTE_NOT_FOUND: &str = "this route has not been registered";
    pub const ROUTE_EXISTS: &str = "this route has been registered";
    pub const MAX_MEMBER_CODE: &str = "maximum member code is exceeded";
    pub const RESTRICTED_ROLE: &str = "this email cannot be registered as this role";
    pub const PAGE_NOT_NATURAL: &str = "page value must be an integer and greater than zero";
}

/// API error type that can be converted to HTTP responses
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Too many requests: {message}")]
    TooManyRequests {
        message: String,
        retry_at: DateTime<Utc>,
    },

    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn not_found(message: &str) -> Self {
        ApiError::NotFound(message.to_string())
    }

    pub fn conflict(message: &str) -> Self {
        ApiError::Conflict(message.to_string())
    }

    pub fn unauthorized(message: &str) -> Self {
        ApiError::Unauthorized(message.to_string())
    }

    pub fn forbidden(message: &str) -> Self {
        ApiError::Forbidden(message.to_string())
    }

    pub fn bad_request(message: &str) -> Self {
        ApiError::BadRequest(message.to_string())
    }

    /// Rate-limit rejection for a flow that may run once every `pause_secs`
    pub fn too_many_requests(pause_secs: i64, retry_at: DateTime<Utc>) -> Self {
        ApiError::TooManyRequests {
            message: format!(
                "access requests can only be made once every {} minutes",
                pause_secs as f64 / 60.0
            ),
            retry_at,
        }
    }
}

impl From<ValidationFailure> for ApiError {
    fn from(failure: ValidationFailure) -> Self {
        ApiError::BadRequest(failure.to_string())
    }
}

impl From<SchemaError> for ApiError {
    fn from(err: SchemaError) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

impl From<TokenError> for ApiError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Rejected(_) => ApiError::forbidden(messages::INVALID_TOKEN),
            TokenError::Crypto(cause) => ApiError::Internal(cause),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message, retry_at) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg, None),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg, None),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg, None),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, "FORBIDDEN", msg, None),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg, None),
            ApiError::TooManyRequests { message, retry_at } => (
                StatusCode::TOO_MANY_REQUESTS,
                "TOO_MANY_REQUESTS",
                message,
                Some(retry_at),
            ),
            ApiError::Internal(err) => {
                error!("Internal error: {:?}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    messages::INTERNAL.to_string(),
                    None,
                )
            }
        };

        let body = Json(ErrorResponse {
            error: ErrorDetail {
                code: code.to_string(),
                message,
                retry_at,
            },
        });

        let mut response = (status, body).into_response();
        if let Some(retry_at) = retry_at {
            let wait = (retry_at - Utc::now()).num_seconds().max(0);
            if let Ok(value) = HeaderValue::from_str(&wait.to_string()) {
                response.headers_mut().insert(RETRY_AFTER, value);
            }
        }
        response
    }
}

/// Result type alias for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
