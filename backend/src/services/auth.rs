//! Account lifecycle service
//!
//! Registration, email verification, login, session refresh and the
//! password flows. Role and route administration lives in [`super::access`].
//!
//! Every operation returns [`ApiError`]; store, hashing, crypto and mail
//! failures surface as `ApiError::Internal` through `?`.

use super::generate_token;
use crate::auth::{PasswordService, TokenKind, TokenService};
use crate::config::{AppConfig, MailConfig, MembershipConfig};
use crate::error::{messages, ApiError, ApiResult};
use crate::notifier::Notifier;
use crate::repositories::Stores;
use anyhow::anyhow;
use chrono::{Duration, Utc};
use metrics::counter;
use rolegate_shared::validation::{rules, CompiledSchema};
use rolegate_shared::{
    AttributeBag, AttributeSchema, Identity, IssuedToken, LoginRequest, LoginResponse,
    MembershipRequest, RegisterRequest, ResetPasswordRequest, ResetToken, RoleDefinition,
    RoleMembership, SessionPayload, TokenPair,
};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, instrument, warn};

/// Registration rules compiled from one version of a role's schema
struct CachedSchema {
    source: Vec<AttributeSchema>,
    compiled: Arc<CompiledSchema>,
}

pub struct AuthService {
    pub(crate) stores: Stores,
    pub(crate) passwords: PasswordService,
    tokens: TokenService,
    notifier: Arc<dyn Notifier>,
    pub(crate) membership: MembershipConfig,
    mail: MailConfig,
    schemas: RwLock<HashMap<String, CachedSchema>>,
}

impl AuthService {
    pub fn new(stores: Stores, config: &AppConfig, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            stores,
            passwords: PasswordService::new(&config.hashing),
            tokens: TokenService::new(&config.token),
            notifier,
            membership: config.membership.clone(),
            mail: config.mail.clone(),
            schemas: RwLock::new(HashMap::new()),
        }
    }

    pub fn tokens(&self) -> &TokenService {
        &self.tokens
    }

    pub(crate) async fn find_role(&self, name: &str) -> ApiResult<RoleDefinition> {
        self.stores
            .roles
            .find_by_name(name)
            .await?
            .ok_or_else(|| ApiError::not_found(messages::ROLE_NOT_FOUND))
    }

    async fn find_identity(&self, email: &str) -> ApiResult<Identity> {
        self.stores
            .identities
            .find_by_email(email)
            .await?
            .ok_or_else(|| ApiError::not_found(messages::USER_NOT_FOUND))
    }

    /// Base registration rules followed by the role's own directives.
    ///
    /// Compiled once per schema version; a changed schema recompiles.
    async fn registration_rules(&self, role: &RoleDefinition) -> ApiResult<Arc<CompiledSchema>> {
        if let Some(cached) = self.schemas.read().await.get(&role.name) {
            if cached.source == role.additions {
                return Ok(cached.compiled.clone());
            }
        }

        let compiled = Arc::new(
            rules::register().chain(CompiledSchema::compile("additions", &role.additions)?),
        );
        self.schemas.write().await.insert(
            role.name.clone(),
            CachedSchema {
                source: role.additions.clone(),
                compiled: compiled.clone(),
            },
        );
        Ok(compiled)
    }

    pub(crate) async fn forget_rules(&self, role: &str) {
        self.schemas.write().await.remove(role);
    }

    /// Check a raw registration body against the target role's schema
    pub async fn validate_registration(&self, body: &Value) -> ApiResult<RegisterRequest> {
        let role_name = body
            .get("role")
            .and_then(Value::as_str)
            .filter(|role| !role.trim().is_empty())
            .ok_or_else(|| ApiError::bad_request(messages::ROLE_REQUIRED))?;

        let role = self.find_role(role_name).await?;
        self.registration_rules(&role).await?.validate(body)?;

        serde_json::from_value(body.clone()).map_err(|e| ApiError::BadRequest(e.to_string()))
    }

    /// Register `email` under a role.
    ///
    /// Returns the verification token when a new identity was created, or
    /// `None` when an existing identity only gained the role.
    #[instrument(skip(self, request), fields(email = %request.email, role = %request.role))]
    pub async fn register(&self, request: RegisterRequest) -> ApiResult<Option<String>> {
        let role = self.find_role(&request.role).await?;

        let existing = self.stores.identities.find_by_email(&request.email).await?;
        if existing
            .as_ref()
            .is_some_and(|identity| identity.membership(&role.name).is_some())
        {
            return Err(ApiError::conflict(messages::ALREADY_REGISTERED));
        }

        let password = request
            .additions
            .get("password")
            .and_then(Value::as_str)
            .ok_or_else(|| ApiError::bad_request("password is required"))?;
        let mut additions = AttributeBag::from_declared(&request.additions, |name| role.declares(name))?;

        // Ceiling applies to role additions too
        let last = self.stores.identities.find_last().await?;
        let code = next_member_code(&self.membership, last.as_ref().map(|i| i.code.as_str()))?;

        let hash = self.passwords.hash_async(password.to_string()).await?;
        additions.set("password", hash);
        let membership = RoleMembership {
            name: role.name.clone(),
            additions,
        };

        if role.registration.approvement_required
            && !self
                .stores
                .roles
                .consume_whitelist(&role.name, &request.email)
                .await?
        {
            warn!("Registration refused, email is not whitelisted");
            return Err(ApiError::unauthorized(messages::RESTRICTED_ROLE));
        }

        let now = Utc::now();
        let token = match existing {
            Some(mut identity) => {
                identity.roles.push(membership);
                identity.updated_at = now;
                self.stores.identities.save(&identity).await?;
                None
            }
            None => {
                let token = generate_token();
                let name = membership.display_name().to_string();
                let identity = Identity {
                    code,
                    email: request.email.clone(),
                    verify_email_token: Some(token.clone()),
                    roles: vec![membership],
                    created_at: now,
                    updated_at: now,
                    deleted_at: None,
                    expires_at: Some(now + Duration::seconds(self.mail.verify_token_ttl_secs)),
                };
                self.stores.identities.save(&identity).await?;
                self.notifier
                    .send_verification(&identity.email, &name, &token)
                    .await?;
                Some(token)
            }
        };

        counter!("auth_register_total").increment(1);
        info!(new_identity = token.is_some(), "Registration completed");
        Ok(token)
    }

    /// Consume a verification token
    #[instrument(skip_all)]
    pub async fn verify_email(&self, token: &str) -> ApiResult<()> {
        let mut identity = self
            .stores
            .identities
            .find_by_verification_token(token)
            .await?
            .ok_or_else(|| ApiError::unauthorized(messages::INVALID_TOKEN))?;

        identity.verify_email_token = None;
        identity.expires_at = None;
        identity.updated_at = Utc::now();
        self.stores.identities.save(&identity).await?;

        info!(email = %identity.email, "Email verified");
        Ok(())
    }

    /// Issue a fresh verification token, at most once per configured pause
    #[instrument(skip(self))]
    pub async fn resend_mail_token(&self, email: &str) -> ApiResult<IssuedToken> {
        let mut identity = self.find_identity(email).await?;
        if identity.is_verified() {
            return Err(ApiError::conflict(messages::USER_VERIFIED));
        }

        let pause = self.mail.verify_mail_pause_secs;
        let now = Utc::now();
        let retry_at = identity.updated_at + Duration::seconds(pause);
        if now < retry_at {
            counter!("auth_rate_limited_total", "flow" => "resend_mail_token").increment(1);
            return Err(ApiError::too_many_requests(pause, retry_at));
        }

        let token = generate_token();
        let expires_at = now + Duration::seconds(self.mail.verify_token_ttl_secs);
        identity.verify_email_token = Some(token.clone());
        identity.expires_at = Some(expires_at);
        identity.updated_at = now;
        self.stores.identities.save(&identity).await?;

        let name = identity
            .roles
            .first()
            .map(RoleMembership::display_name)
            .unwrap_or_default();
        self.notifier.send_verification(email, name, &token).await?;

        Ok(IssuedToken {
            token,
            max_date: now + Duration::seconds(pause),
            expires_at,
        })
    }

    /// Check credentials for one role membership and issue a session
    #[instrument(skip(self, request), fields(email = %request.email, role = %request.role))]
    pub async fn login(&self, request: LoginRequest) -> ApiResult<(LoginResponse, TokenPair)> {
        let result = self.authenticate(&request).await;
        let outcome = match &result {
            Ok(_) => "success",
            Err(ApiError::Internal(_)) => "error",
            Err(_) => "rejected",
        };
        counter!("auth_login_total", "outcome" => outcome).increment(1);

        match &result {
            Ok(_) => info!("Login succeeded"),
            Err(err) => warn!(%err, "Login refused"),
        }
        result
    }

    async fn authenticate(&self, request: &LoginRequest) -> ApiResult<(LoginResponse, TokenPair)> {
        let role = self.find_role(&request.role).await?;
        let identity = self.find_identity(&request.email).await?;
        if !identity.is_verified() {
            return Err(ApiError::unauthorized(messages::USER_UNVERIFIED));
        }
        let membership = identity
            .membership(&role.name)
            .ok_or_else(|| ApiError::unauthorized(messages::INVALID_ROLE))?;
        if !self.password_matches(membership, &request.password).await? {
            return Err(ApiError::unauthorized(messages::WRONG_PASSWORD));
        }

        let tokens = self.tokens.sign(
            &SessionPayload {
                email: identity.email.clone(),
                role: role.name.clone(),
            },
            None,
        )?;

        let mut additions = membership.additions.clone();
        additions.remove("password");
        let profile = LoginResponse {
            email: identity.email.clone(),
            role: role.name,
            additions,
            limits: role.limits,
        };
        Ok((profile, tokens))
    }

    /// Issue a new access token from a refresh token. The refresh slot of
    /// the result is always empty.
    pub fn refresh_token(&self, refresh_token: Option<&str>) -> ApiResult<TokenPair> {
        let token = refresh_token
            .filter(|token| !token.is_empty())
            .ok_or_else(|| ApiError::forbidden(messages::NO_REFRESH_TOKEN))?;
        let payload = self
            .tokens
            .verify(token, TokenKind::Refresh)?
            .ok_or_else(|| ApiError::forbidden(messages::INVALID_TOKEN))?;

        Ok(self.tokens.sign(&payload, Some(token))?)
    }

    /// Check the password of the session's role membership
    #[instrument(skip(self, password), fields(email = %session.email, role = %session.role))]
    pub async fn verify_password(&self, session: &SessionPayload, password: &str) -> ApiResult<()> {
        let identity = self.find_identity(&session.email).await?;
        let membership = identity
            .membership(&session.role)
            .ok_or_else(|| ApiError::not_found(messages::INVALID_ROLE))?;

        if self.password_matches(membership, password).await? {
            Ok(())
        } else {
            Err(ApiError::unauthorized(messages::WRONG_PASSWORD))
        }
    }

    /// Replace the password of the session's role membership
    #[instrument(skip(self, password), fields(email = %session.email, role = %session.role))]
    pub async fn change_password(&self, session: &SessionPayload, password: &str) -> ApiResult<()> {
        self.set_password(&session.email, &session.role, password).await?;
        info!("Password changed");
        Ok(())
    }

    /// Mail a password reset token, at most once per configured pause
    #[instrument(skip(self, request), fields(email = %request.email, role = %request.role))]
    pub async fn mail_forgot_password(&self, request: MembershipRequest) -> ApiResult<IssuedToken> {
        let pause = self.mail.forgot_password_pause_secs;
        let now = Utc::now();

        let last = self
            .stores
            .resets
            .find(&request.email, &request.role, None, now)
            .await?;
        if let Some(last) = last {
            let retry_at = last.created_at + Duration::seconds(pause);
            if now < retry_at {
                counter!("auth_rate_limited_total", "flow" => "forgot_password").increment(1);
                return Err(ApiError::too_many_requests(pause, retry_at));
            }
        }

        let role = self.find_role(&request.role).await?;
        let identity = self.find_identity(&request.email).await?;
        if !identity.is_verified() {
            return Err(ApiError::unauthorized(messages::USER_UNVERIFIED));
        }
        let membership = identity
            .membership(&role.name)
            .ok_or_else(|| ApiError::not_found(messages::INVALID_ROLE))?;

        let grant = ResetToken {
            role: role.name.clone(),
            email: identity.email.clone(),
            token: generate_token(),
            created_at: now,
            expired_at: now + Duration::seconds(self.mail.reset_token_ttl_secs),
        };
        self.notifier
            .send_password_reset(&grant.email, membership.display_name(), &grant.role, &grant.token)
            .await?;
        self.stores.resets.create(&grant).await?;

        Ok(IssuedToken {
            token: grant.token,
            max_date: now + Duration::seconds(pause),
            expires_at: grant.expired_at,
        })
    }

    /// Set a new password using a reset grant, then drop every grant of the membership
    #[instrument(skip(self, request), fields(email = %request.email, role = %request.role))]
    pub async fn reset_password(&self, request: ResetPasswordRequest) -> ApiResult<()> {
        let token = request.token.as_deref().filter(|token| !token.is_empty());
        self.stores
            .resets
            .find(&request.email, &request.role, token, Utc::now())
            .await?
            .ok_or_else(|| ApiError::unauthorized(messages::INVALID_TOKEN))?;

        self.set_password(&request.email, &request.role, &request.password)
            .await?;
        self.stores
            .resets
            .delete_all(&request.email, &request.role)
            .await?;

        info!("Password reset");
        Ok(())
    }

    /// Drop unverified identities and reset grants past their expiry
    pub async fn purge_expired(&self) -> ApiResult<(u64, u64)> {
        let now = Utc::now();
        let identities = self.stores.identities.purge_expired(now).await?;
        let resets = self.stores.resets.purge_expired(now).await?;
        if identities + resets > 0 {
            info!(identities, resets, "Purged expired records");
        }
        Ok((identities, resets))
    }

    async fn password_matches(&self, membership: &RoleMembership, password: &str) -> ApiResult<bool> {
        match membership.password_hash() {
            Some(hash) => Ok(self
                .passwords
                .verify_async(password.to_string(), hash.to_string())
                .await?),
            None => Ok(false),
        }
    }

    async fn set_password(&self, email: &str, role: &str, password: &str) -> ApiResult<()> {
        let mut identity = self.find_identity(email).await?;
        if identity.membership(role).is_none() {
            return Err(ApiError::not_found(messages::INVALID_ROLE));
        }

        let hash = self.passwords.hash_async(password.to_string()).await?;
        if let Some(membership) = identity.membership_mut(role) {
            membership.additions.set("password", hash);
        }
        identity.updated_at = Utc::now();
        self.stores.identities.save(&identity).await?;
        Ok(())
    }
}

/// Code following `last_code`, zero-padded to the digit width of the ceiling.
///
/// The numeric part is the trailing run of digits, so a changed prefix does
/// not restart the sequence.
pub(crate) fn next_member_code(config: &MembershipConfig, last_code: Option<&str>) -> ApiResult<String> {
    let next = match last_code {
        None => 0,
        Some(code) => {
            let start = code
                .char_indices()
                .rev()
                .find(|(_, c)| !c.is_ascii_digit())
                .map_or(0, |(idx, c)| idx + c.len_utf8());
            let last: u64 = code[start..]
                .parse()
                .map_err(|_| anyhow!("member code {:?} has no numeric suffix", code))?;
            last + 1
        }
    };

    if next > config.max_member_code {
        return Err(ApiError::unauthorized(messages::MAX_MEMBER_CODE));
    }

    let width = config.max_member_code.to_string().len();
    Ok(format!("{}{:0width$}", config.code_prefix, next, width = width))
}
