//! Authentication routes
//!
//! Request bodies are read as raw JSON, checked with the shared rule sets and
//! only then deserialized, so a malformed body reports every broken field at once.
//! Session tokens travel in `HttpOnly` cookies.

use crate::auth::{AuthSession, ACCESS_COOKIE, REFRESH_COOKIE};
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::{
    extract::State,
    http::StatusCode,
    routing::{delete, patch, post},
    Json, Router,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use once_cell::sync::Lazy;
use rolegate_shared::validation::{rules, CompiledSchema};
use rolegate_shared::{
    ApiMessage, IssuedToken, LoginRequest, LoginResponse, MembershipRequest, NameRequest,
    PasswordRequest, ResetPasswordRequest, RoleDefinition, RoleRequest, RouteDefinition,
    RouteRequest, TokenPair, VerifyEmailRequest,
};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

static LOGIN: Lazy<CompiledSchema> = Lazy::new(rules::login);
static VERIFY_EMAIL: Lazy<CompiledSchema> = Lazy::new(rules::verify_email);
static RESEND: Lazy<CompiledSchema> = Lazy::new(|| CompiledSchema::new(rules::email("email")));
static FORGOT_PASSWORD: Lazy<CompiledSchema> = Lazy::new(rules::forgot_password);
static RESET_PASSWORD: Lazy<CompiledSchema> = Lazy::new(rules::reset_password);
static VERIFY_PASSWORD: Lazy<CompiledSchema> = Lazy::new(rules::verify_password);
static CHANGE_PASSWORD: Lazy<CompiledSchema> = Lazy::new(rules::change_password);
static NAMED: Lazy<CompiledSchema> = Lazy::new(rules::named_resource);

type Message<T = ()> = Json<ApiMessage<T>>;

/// Routes anyone may call
pub fn public_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/resend-mailtoken", patch(resend_mail_token))
        .route("/verify", patch(verify_email))
        .route("/login", post(login))
        .route("/refresh-token", post(refresh_token))
        .route("/forgot-password", post(forgot_password))
        .route("/reset-password", patch(reset_password))
        .route("/logout", post(logout))
}

/// Routes that need an admitted session
pub fn protected_routes() -> Router<AppState> {
    Router::new()
        .route("/verify-password", post(verify_password))
        .route("/change-password", patch(change_password))
        .route("/role", post(add_role).patch(update_role).delete(delete_role))
        .route("/route", post(add_route).patch(update_route).delete(delete_route))
        .route("/account", delete(delete_account))
}

/// Validate a raw body against `schema`, then deserialize it
fn parse<T: DeserializeOwned>(schema: &CompiledSchema, body: Value) -> ApiResult<T> {
    schema.validate(&body)?;
    serde_json::from_value(body).map_err(|e| ApiError::BadRequest(e.to_string()))
}

fn session_cookie(name: &'static str, value: String, ttl_secs: i64, production: bool) -> Cookie<'static> {
    Cookie::build((name, value))
        .http_only(true)
        .secure(production)
        .same_site(if production { SameSite::None } else { SameSite::Lax })
        .path("/")
        .max_age(time::Duration::seconds(ttl_secs))
        .build()
}

fn with_session(state: &AppState, jar: CookieJar, tokens: TokenPair) -> CookieJar {
    let issuer = state.auth.tokens();
    let jar = jar.add(session_cookie(
        ACCESS_COOKIE,
        tokens.access_token,
        issuer.access_ttl_secs(),
        state.production,
    ));
    match tokens.refresh_token {
        Some(refresh) => jar.add(session_cookie(
            REFRESH_COOKIE,
            refresh,
            issuer.refresh_ttl_secs(),
            state.production,
        )),
        None => jar,
    }
}

/// Issued-token payload; the token itself is only echoed outside production
fn issued(token: IssuedToken, production: bool) -> Value {
    if production {
        json!({ "max_date": token.max_date, "expires_at": token.expires_at })
    } else {
        json!(token)
    }
}

/// Register an email under a role
///
/// POST /api/v1/auth/register
async fn register(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> ApiResult<(StatusCode, Message<Value>)> {
    let request = state.auth.validate_registration(&body).await?;

    match state.auth.register(request).await? {
        Some(token) => {
            let data = if state.production { json!({}) } else { json!({ "token": token }) };
            Ok((
                StatusCode::CREATED,
                Json(ApiMessage::with_data(
                    "email with access for account verification has been sent successfully and will be expired in 3 days",
                    data,
                )),
            ))
        }
        None => Ok((
            StatusCode::OK,
            Json(ApiMessage {
                message: "registered as new role successfully".into(),
                data: None,
            }),
        )),
    }
}

/// Send a fresh verification token
///
/// PATCH /api/v1/auth/resend-mailtoken
async fn resend_mail_token(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> ApiResult<Message<Value>> {
    let request: MembershipRequest = parse(&RESEND, body)?;
    let token = state.auth.resend_mail_token(&request.email).await?;

    Ok(Json(ApiMessage::with_data(
        "email with access for account verification has been sent successfully and will be expired in 3 days",
        issued(token, state.production),
    )))
}

/// PATCH /api/v1/auth/verify
async fn verify_email(State(state): State<AppState>, Json(body): Json<Value>) -> ApiResult<Message> {
    let request: VerifyEmailRequest = parse(&VERIFY_EMAIL, body)?;
    state.auth.verify_email(&request.token).await?;
    Ok(Json(ApiMessage::text("email has been verified successfully")))
}

/// Log in to one role; sets both session cookies
///
/// POST /api/v1/auth/login
async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(body): Json<Value>,
) -> ApiResult<(CookieJar, Message<LoginResponse>)> {
    let request: LoginRequest = parse(&LOGIN, body)?;
    let (profile, tokens) = state.auth.login(request).await?;

    Ok((
        with_session(&state, jar, tokens),
        Json(ApiMessage::with_data("login successfully", profile)),
    ))
}

/// Renew the access cookie from the refresh cookie
///
/// POST /api/v1/auth/refresh-token
async fn refresh_token(State(state): State<AppState>, jar: CookieJar) -> ApiResult<(CookieJar, Message)> {
    let refresh = jar.get(REFRESH_COOKIE).map(|cookie| cookie.value().to_string());
    let tokens = state.auth.refresh_token(refresh.as_deref())?;

    Ok((
        with_session(&state, jar, tokens),
        Json(ApiMessage::text("refresh token successfully")),
    ))
}

/// POST /api/v1/auth/logout
async fn logout(jar: CookieJar) -> (CookieJar, Message) {
    let jar = jar
        .remove(Cookie::build(ACCESS_COOKIE).path("/"))
        .remove(Cookie::build(REFRESH_COOKIE).path("/"));
    (jar, Json(ApiMessage::text("logout successfully")))
}

/// Mail a password reset link
///
/// POST /api/v1/auth/forgot-password
async fn forgot_password(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> ApiResult<Message<Value>> {
    let request: MembershipRequest = parse(&FORGOT_PASSWORD, body)?;
    let token = state.auth.mail_forgot_password(request).await?;

    Ok(Json(ApiMessage::with_data(
        "email with access for reset password has been sent successfully and will be expired in 10 minutes",
        issued(token, state.production),
    )))
}

/// PATCH /api/v1/auth/reset-password
async fn reset_password(State(state): State<AppState>, Json(body): Json<Value>) -> ApiResult<Message> {
    let request: ResetPasswordRequest = parse(&RESET_PASSWORD, body)?;
    state.auth.reset_password(request).await?;
    Ok(Json(ApiMessage::text("reset password successfully")))
}

/// POST /api/v1/auth/verify-password
async fn verify_password(
    State(state): State<AppState>,
    AuthSession(session): AuthSession,
    Json(body): Json<Value>,
) -> ApiResult<Message> {
    let request: PasswordRequest = parse(&VERIFY_PASSWORD, body)?;
    state.auth.verify_password(&session, &request.password).await?;
    Ok(Json(ApiMessage::text("password is correct")))
}

/// PATCH /api/v1/auth/change-password
async fn change_password(
    State(state): State<AppState>,
    AuthSession(session): AuthSession,
    Json(body): Json<Value>,
) -> ApiResult<Message> {
    let request: PasswordRequest = parse(&CHANGE_PASSWORD, body)?;
    state.auth.change_password(&session, &request.password).await?;
    Ok(Json(ApiMessage::text("change password successfully")))
}

/// POST /api/v1/auth/role
async fn add_role(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> ApiResult<(StatusCode, Message<RoleDefinition>)> {
    let request: RoleRequest = parse(&NAMED, body)?;
    let role = state.auth.add_role(request).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiMessage::with_data("new role created successfully", role)),
    ))
}

/// PATCH /api/v1/auth/role
async fn update_role(State(state): State<AppState>, Json(body): Json<Value>) -> ApiResult<Message<RoleDefinition>> {
    let request: RoleRequest = parse(&NAMED, body)?;
    let role = state.auth.update_role(request).await?;
    Ok(Json(ApiMessage::with_data("update this role successfully", role)))
}

/// DELETE /api/v1/auth/role
async fn delete_role(State(state): State<AppState>, Json(body): Json<Value>) -> ApiResult<Message> {
    let request: NameRequest = parse(&NAMED, body)?;
    state.auth.delete_role(&request.name).await?;
    Ok(Json(ApiMessage::text("delete this role successfully")))
}

/// POST /api/v1/auth/route
async fn add_route(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> ApiResult<(StatusCode, Message<RouteDefinition>)> {
    let request: RouteRequest = parse(&NAMED, body)?;
    let route = state.auth.add_route(request).await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiMessage::with_data("new route registered successfully", route)),
    ))
}

/// PATCH /api/v1/auth/route
async fn update_route(State(state): State<AppState>, Json(body): Json<Value>) -> ApiResult<Message<RouteDefinition>> {
    let request: RouteRequest = parse(&NAMED, body)?;
    let route = state.auth.update_route(request).await?;
    Ok(Json(ApiMessage::with_data("update this route's roles successfully", route)))
}

/// DELETE /api/v1/auth/route
async fn delete_route(State(state): State<AppState>, Json(body): Json<Value>) -> ApiResult<Message> {
    let request: NameRequest = parse(&NAMED, body)?;
    state.auth.delete_route(&request.name).await?;
    Ok(Json(ApiMessage::text("delete this route successfully")))
}

/// Soft-delete the caller's account and drop the session cookies
///
/// DELETE /api/v1/auth/account
async fn delete_account(
    State(state): State<AppState>,
    AuthSession(session): AuthSession,
    jar: CookieJar,
) -> ApiResult<(CookieJar, Message)> {
    state.members.delete_account(&session).await?;
    let (jar, _) = logout(jar).await;
    Ok((jar, Json(ApiMessage::text("delete account successfully"))))
}
