//! Request admission
//!
//! [`Authorizer::admit`] decides whether a session may call a path with a
//! given method. The [`authorize`] layer runs it for every protected route
//! and stores the admitted [`SessionPayload`] in the request extensions,
//! where handlers pick it up through [`AuthSession`].

use super::jwt::{TokenKind, TokenService};
use crate::error::{messages, ApiError, ApiResult};
use crate::repositories::{IdentityStore, RouteStore};
use crate::state::AppState;
use axum::{
    extract::{OriginalUri, Request, State},
    http::{header::AUTHORIZATION, request::Parts, HeaderMap, Method},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::CookieJar;
use metrics::counter;
use rolegate_shared::{HttpMethod, SessionPayload, ADMIN_ROLE};
use std::sync::Arc;
use tracing::debug;

pub const ACCESS_COOKIE: &str = "access_token";
pub const REFRESH_COOKIE: &str = "refresh_token";

#[derive(Clone)]
pub struct Authorizer {
    tokens: TokenService,
    identities: Arc<dyn IdentityStore>,
    routes: Arc<dyn RouteStore>,
}

impl Authorizer {
    pub fn new(tokens: TokenService, identities: Arc<dyn IdentityStore>, routes: Arc<dyn RouteStore>) -> Self {
        Self {
            tokens,
            identities,
            routes,
        }
    }

    /// Admit or refuse one request. Checks run in a fixed order and the
    /// first failure wins.
    pub async fn admit(
        &self,
        token: Option<&str>,
        path_and_query: &str,
        method: &Method,
    ) -> ApiResult<SessionPayload> {
        let result = self.check(token, path_and_query, method).await;
        let outcome = match &result {
            Ok(_) => "admitted",
            Err(ApiError::Internal(_)) => "error",
            Err(_) => "refused",
        };
        counter!("authorizer_decisions_total", "outcome" => outcome).increment(1);
        result
    }

    async fn check(&self, token: Option<&str>, path_and_query: &str, method: &Method) -> ApiResult<SessionPayload> {
        let token = token
            .filter(|token| !token.is_empty())
            .ok_or_else(|| ApiError::forbidden(messages::NO_ACCESS_TOKEN))?;
        let session = self
            .tokens
            .verify(token, TokenKind::Access)?
            .ok_or_else(|| ApiError::forbidden(messages::INVALID_TOKEN))?;

        if session.role != ADMIN_ROLE {
            let path = path_and_query
                .split_once('?')
                .map_or(path_and_query, |(path, _)| path);
            let route = self
                .routes
                .find_by_name(path)
                .await?
                .ok_or_else(|| ApiError::not_found(messages::ROUTE_NOT_FOUND))?;

            // Methods outside the restrictable set carry no restriction
            let restriction = method
                .as_str()
                .parse::<HttpMethod>()
                .ok()
                .and_then(|method| route.restriction(method));
            if restriction.is_some_and(|r| !r.roles.contains(&session.role)) {
                debug!(path, role = %session.role, "Route refused for role");
                return Err(ApiError::forbidden(messages::RESTRICTED_ROUTE));
            }
        }

        if self.identities.find_by_email(&session.email).await?.is_none() {
            return Err(ApiError::not_found(messages::USER_NOT_FOUND));
        }
        Ok(session)
    }
}

/// Access token from the cookie, falling back to a bearer header
fn access_token(jar: &CookieJar, headers: &HeaderMap) -> Option<String> {
    jar.get(ACCESS_COOKIE)
        .map(|cookie| cookie.value().to_string())
        .or_else(|| {
            headers
                .get(AUTHORIZATION)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.strip_prefix("Bearer "))
                .map(str::to_string)
        })
}

/// Layer for protected routes, used with `middleware::from_fn_with_state`
pub async fn authorize(
    State(state): State<AppState>,
    jar: CookieJar,
    OriginalUri(uri): OriginalUri,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = access_token(&jar, request.headers());
    let path_and_query = uri
        .path_and_query()
        .map_or_else(|| uri.path(), |pq| pq.as_str());

    let session = state
        .authorizer
        .admit(token.as_deref(), path_and_query, request.method())
        .await?;
    request.extensions_mut().insert(session);

    Ok(next.run(request).await)
}

/// Session admitted by [`authorize`]
#[derive(Debug, Clone)]
pub struct AuthSession(pub SessionPayload);

#[axum::async_trait]
impl<S> axum::extract::FromRequestParts<S> for AuthSession
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<SessionPayload>()
            .cloned()
            .map(AuthSession)
            .ok_or_else(|| ApiError::forbidden(messages::NO_ACCESS_TOKEN))
    }
}
