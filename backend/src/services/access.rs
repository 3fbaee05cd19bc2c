//! Role and route administration
//!
//! Submitted definitions are canonicalized before they are persisted: duplicates
//! collapse to their first occurrence and enumerated values are parsed, so a
//! stored definition never carries an unknown method or access level.

use super::auth::{next_member_code, AuthService};
use crate::config::BootstrapConfig;
use crate::error::{messages, ApiError, ApiResult};
use chrono::Utc;
use rolegate_shared::validation::CompiledSchema;
use rolegate_shared::{
    AttributeBag, AttributeSchema, HttpMethod, Identity, MethodRestriction, PageAccess, PageLimit,
    RegistrationPolicy, RoleDefinition, RoleMembership, RoleRequest, RouteDefinition, RouteRequest,
    SchemaError, ValidationDirective, ADMIN_ROLE,
};
use secrecy::ExposeSecret;
use std::collections::HashSet;
use tracing::{info, instrument};

/// Keep the first element for every key
fn dedup_by_key<T, K, F>(items: Vec<T>, key: F) -> Vec<T>
where
    K: Eq + std::hash::Hash,
    F: Fn(&T) -> K,
{
    let mut seen = HashSet::new();
    items.into_iter().filter(|item| seen.insert(key(item))).collect()
}

/// Canonical form of a submitted role.
///
/// Attribute directives are compiled once here so a bad pattern or a missing
/// argument is refused when the role is written, not when someone registers.
pub fn clean_role(request: RoleRequest) -> Result<RoleDefinition, SchemaError> {
    let additions = dedup_by_key(request.additions, |attribute| attribute.name.clone())
        .into_iter()
        .map(|attribute| {
            let validations = attribute
                .validations
                .into_iter()
                .map(|directive| {
                    Ok(ValidationDirective {
                        method: directive.method.parse()?,
                        message: directive.message,
                        validator: directive.validator,
                    })
                })
                .collect::<Result<Vec<_>, SchemaError>>()?;
            Ok(AttributeSchema {
                name: attribute.name,
                validations,
            })
        })
        .collect::<Result<Vec<_>, SchemaError>>()?;
    CompiledSchema::compile("additions", &additions)?;

    let limits = dedup_by_key(request.limits, |limit| limit.page.clone())
        .into_iter()
        .map(|limit| {
            Ok(PageLimit {
                access: limit.access.parse::<PageAccess>()?,
                page: limit.page,
            })
        })
        .collect::<Result<Vec<_>, SchemaError>>()?;

    Ok(RoleDefinition {
        name: request.name,
        additions,
        limits,
        registration: RegistrationPolicy {
            approvement_required: request.registration.approvement_required,
            whitelist: dedup_by_key(request.registration.whitelist, String::clone),
        },
    })
}

/// Canonical form of a submitted route
pub fn clean_route(request: RouteRequest) -> Result<RouteDefinition, SchemaError> {
    let restrictions = dedup_by_key(request.restrictions, |restriction| restriction.method.clone())
        .into_iter()
        .map(|restriction| {
            Ok(MethodRestriction {
                method: restriction.method.parse::<HttpMethod>()?,
                roles: dedup_by_key(restriction.roles, String::clone),
            })
        })
        .collect::<Result<Vec<_>, SchemaError>>()?;

    Ok(RouteDefinition {
        name: request.name,
        restrictions,
    })
}

impl AuthService {
    #[instrument(skip(self, request), fields(role = %request.name))]
    pub async fn add_role(&self, request: RoleRequest) -> ApiResult<RoleDefinition> {
        if self.stores.roles.find_by_name(&request.name).await?.is_some() {
            return Err(ApiError::conflict(messages::ROLE_EXISTS));
        }
        let role = clean_role(request)?;
        self.stores.roles.upsert(&role).await?;

        info!("Role created");
        Ok(role)
    }

    #[instrument(skip(self, request), fields(role = %request.name))]
    pub async fn update_role(&self, request: RoleRequest) -> ApiResult<RoleDefinition> {
        self.find_role(&request.name).await?;
        let role = clean_role(request)?;
        self.stores.roles.upsert(&role).await?;
        self.forget_rules(&role.name).await;

        info!("Role updated");
        Ok(role)
    }

    #[instrument(skip(self))]
    pub async fn delete_role(&self, name: &str) -> ApiResult<()> {
        if !self.stores.roles.soft_delete(name).await? {
            return Err(ApiError::not_found(messages::ROLE_NOT_FOUND));
        }
        self.forget_rules(name).await;

        info!("Role deleted");
        Ok(())
    }

    #[instrument(skip(self, request), fields(route = %request.name))]
    pub async fn add_route(&self, request: RouteRequest) -> ApiResult<RouteDefinition> {
        if self.stores.routes.find_by_name(&request.name).await?.is_some() {
            return Err(ApiError::conflict(messages::ROUTE_EXISTS));
        }
        let route = clean_route(request)?;
        self.stores.routes.upsert(&route).await?;

        info!("Route registered");
        Ok(route)
    }

    #[instrument(skip(self, request), fields(route = %request.name))]
    pub async fn update_route(&self, request: RouteRequest) -> ApiResult<RouteDefinition> {
        if self.stores.routes.find_by_name(&request.name).await?.is_none() {
            return Err(ApiError::not_found(messages::ROUTE_NOT_FOUND));
        }
        let route = clean_route(request)?;
        self.stores.routes.upsert(&route).await?;

        info!("Route updated");
        Ok(route)
    }

    #[instrument(skip(self))]
    pub async fn delete_route(&self, name: &str) -> ApiResult<()> {
        if !self.stores.routes.soft_delete(name).await? {
            return Err(ApiError::not_found(messages::ROUTE_NOT_FOUND));
        }

        info!("Route deleted");
        Ok(())
    }

    /// Make sure the admin role exists and, when credentials are configured,
    /// that a verified identity holds it.
    pub async fn ensure_admin(&self, bootstrap: &BootstrapConfig) -> ApiResult<()> {
        if self.stores.roles.find_by_name(ADMIN_ROLE).await?.is_none() {
            self.stores.roles.upsert(&RoleDefinition::open(ADMIN_ROLE)).await?;
            info!("Created {} role", ADMIN_ROLE);
        }

        let (Some(email), Some(password)) = (&bootstrap.admin_email, &bootstrap.admin_password) else {
            return Ok(());
        };

        let existing = self.stores.identities.find_by_email(email).await?;
        if existing
            .as_ref()
            .is_some_and(|identity| identity.membership(ADMIN_ROLE).is_some())
        {
            return Ok(());
        }

        let mut additions = AttributeBag::new();
        additions.set("name", bootstrap.admin_name.clone().unwrap_or_else(|| ADMIN_ROLE.to_string()));
        additions.set(
            "password",
            self.passwords
                .hash_async(password.expose_secret().clone())
                .await?,
        );
        let membership = RoleMembership {
            name: ADMIN_ROLE.to_string(),
            additions,
        };
        let now = Utc::now();

        let identity = match existing {
            Some(mut identity) => {
                identity.roles.push(membership);
                identity.updated_at = now;
                identity
            }
            None => {
                let last = self.stores.identities.find_last().await?;
                Identity {
                    code: next_member_code(&self.membership, last.as_ref().map(|i| i.code.as_str()))?,
                    email: email.clone(),
                    verify_email_token: None,
                    roles: vec![membership],
                    created_at: now,
                    updated_at: now,
                    deleted_at: None,
                    expires_at: None,
                }
            }
        };
        self.stores.identities.save(&identity).await?;

        info!(email = %identity.email, "Bootstrapped administrator");
        Ok(())
    }
}
