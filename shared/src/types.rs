//! API request and response types

use crate::models::{
    AttributeBag, AttributeSchema, PageLimit, RegistrationPolicy, RoleDefinition, RouteDefinition,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Response envelope: `{ "message": ..., "data": ... }`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiMessage<T> {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl ApiMessage<()> {
    pub fn text(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            data: None,
        }
    }
}

impl<T> ApiMessage<T> {
    pub fn with_data(message: impl Into<String>, data: T) -> Self {
        Self {
            message: message.into(),
            data: Some(data),
        }
    }
}

/// API error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

/// Error detail
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    /// When a rate-limited request may be retried
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_at: Option<DateTime<Utc>>,
}

/// Registration request; `additions` holds role attributes including `name` and `password`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RegisterRequest {
    pub email: String,
    pub role: String,
    pub additions: serde_json::Map<String, serde_json::Value>,
}

/// Login request; also used for password checks of an authenticated session
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoginRequest {
    pub role: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VerifyEmailRequest {
    pub token: String,
}

/// Identifies a role membership: resend verification mail, forgot password
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MembershipRequest {
    pub email: String,
    pub role: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ResetPasswordRequest {
    pub email: String,
    pub role: String,
    pub token: Option<String>,
    pub password: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PasswordRequest {
    pub password: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NameRequest {
    pub name: String,
}

/// Access and refresh tokens. `refresh_token` is `None` when an existing
/// refresh token was reused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: Option<String>,
}

/// Profile returned on login; never contains the password hash
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginResponse {
    pub email: String,
    pub role: String,
    pub additions: AttributeBag,
    pub limits: Vec<PageLimit>,
}

/// A verification or reset token that was just mailed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssuedToken {
    pub token: String,
    /// Earliest time another token may be requested
    pub max_date: DateTime<Utc>,
    /// When this token stops being accepted
    pub expires_at: DateTime<Utc>,
}

/// Validation directive as submitted by an administrator
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationDirectiveRequest {
    pub method: String,
    pub message: String,
    pub validator: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AttributeSchemaRequest {
    pub name: String,
    pub validations: Vec<ValidationDirectiveRequest>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PageLimitRequest {
    pub page: String,
    pub access: String,
}

/// Role definition as submitted; canonicalized before persisting
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoleRequest {
    pub name: String,
    pub additions: Vec<AttributeSchemaRequest>,
    pub limits: Vec<PageLimitRequest>,
    pub registration: RegistrationPolicy,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MethodRestrictionRequest {
    pub method: String,
    pub roles: Vec<String>,
}

/// Route definition as submitted; canonicalized before persisting
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouteRequest {
    pub name: String,
    pub restrictions: Vec<MethodRestrictionRequest>,
}

impl From<&AttributeSchema> for AttributeSchemaRequest {
    fn from(schema: &AttributeSchema) -> Self {
        Self {
            name: schema.name.clone(),
            validations: schema
                .validations
                .iter()
                .map(|d| ValidationDirectiveRequest {
                    method: d.method.as_str().to_string(),
                    message: d.message.clone(),
                    validator: d.validator.clone(),
                })
                .collect(),
        }
    }
}

impl From<RoleDefinition> for RoleRequest {
    fn from(role: RoleDefinition) -> Self {
        Self {
            additions: role.additions.iter().map(AttributeSchemaRequest::from).collect(),
            limits: role
                .limits
                .iter()
                .map(|l| PageLimitRequest {
                    page: l.page.clone(),
                    access: l.access.as_str().to_string(),
                })
                .collect(),
            registration: role.registration,
            name: role.name,
        }
    }
}

impl From<RouteDefinition> for RouteRequest {
    fn from(route: RouteDefinition) -> Self {
        Self {
            name: route.name,
            restrictions: route
                .restrictions
                .into_iter()
                .map(|r| MethodRestrictionRequest {
                    method: r.method.as_str().to_string(),
                    roles: r.roles,
                })
                .collect(),
        }
    }
}

/// Query parameters for the member listing; kept as raw strings so bad
/// values can fall back to defaults
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemberFilters {
    pub role: Option<String>,
    pub page: Option<String>,
    pub limit: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemberSummary {
    pub code: String,
    pub email: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MembersPage {
    pub data: Vec<MemberSummary>,
    pub total_data: u64,
    pub page: u32,
    pub per_page: u32,
}
