//! Persistence collaborators
//!
//! Each store is an async trait so the services can run against PostgreSQL
//! in production and against the in-memory implementation in tests.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rolegate_shared::{Identity, ResetToken, RoleDefinition, RouteDefinition};
use std::sync::Arc;

pub mod identity;
pub mod memory;
pub mod reset_token;
pub mod role;
pub mod route;

pub use identity::PgIdentityStore;
pub use memory::{MemoryIdentityStore, MemoryResetTokenStore, MemoryRoleStore, MemoryRouteStore};
pub use reset_token::PgResetTokenStore;
pub use role::PgRoleStore;
pub use route::PgRouteStore;

/// Registered accounts
#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Live identity (not soft-deleted, not expired) with this email
    async fn find_by_email(&self, email: &str) -> Result<Option<Identity>>;

    /// Live identity holding this unconsumed verification token
    async fn find_by_verification_token(&self, token: &str) -> Result<Option<Identity>>;

    /// Identity with the highest member code, deleted ones included
    async fn find_last(&self) -> Result<Option<Identity>>;

    /// Page of live identities holding `role`, plus the total count
    async fn list_by_role(&self, role: &str, page: u32, limit: u32) -> Result<(u64, Vec<Identity>)>;

    /// Insert, or replace the live identity with the same email
    async fn save(&self, identity: &Identity) -> Result<()>;

    /// Returns false when no live identity matched
    async fn soft_delete(&self, email: &str, at: DateTime<Utc>) -> Result<bool>;

    /// Physically remove unverified identities whose expiry has passed
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64>;
}

/// Role definitions
#[async_trait]
pub trait RoleStore: Send + Sync {
    async fn find_by_name(&self, name: &str) -> Result<Option<RoleDefinition>>;

    /// Insert, or replace the live role with the same name
    async fn upsert(&self, role: &RoleDefinition) -> Result<()>;

    /// Remove `email` from the role's whitelist if present, atomically.
    ///
    /// Returns true only for the caller that actually removed it.
    async fn consume_whitelist(&self, name: &str, email: &str) -> Result<bool>;

    async fn soft_delete(&self, name: &str) -> Result<bool>;
}

/// Route restriction table
#[async_trait]
pub trait RouteStore: Send + Sync {
    async fn find_by_name(&self, name: &str) -> Result<Option<RouteDefinition>>;

    async fn upsert(&self, route: &RouteDefinition) -> Result<()>;

    async fn soft_delete(&self, name: &str) -> Result<bool>;
}

/// Password reset grants
#[async_trait]
pub trait ResetTokenStore: Send + Sync {
    /// Unexpired grant for `email` and `role`. With a token, an exact match;
    /// without one, the grant that expires last.
    async fn find(
        &self,
        email: &str,
        role: &str,
        token: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Option<ResetToken>>;

    async fn create(&self, token: &ResetToken) -> Result<()>;

    async fn delete_all(&self, email: &str, role: &str) -> Result<u64>;

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64>;
}

/// All stores the services need
#[derive(Clone)]
pub struct Stores {
    pub identities: Arc<dyn IdentityStore>,
    pub roles: Arc<dyn RoleStore>,
    pub routes: Arc<dyn RouteStore>,
    pub resets: Arc<dyn ResetTokenStore>,
}

impl Stores {
    /// Fresh, empty in-memory stores
    pub fn in_memory() -> Self {
        Self {
            identities: Arc::new(MemoryIdentityStore::default()),
            roles: Arc::new(MemoryRoleStore::default()),
            routes: Arc::new(MemoryRouteStore::default()),
            resets: Arc::new(MemoryResetTokenStore::default()),
        }
    }

    /// PostgreSQL-backed stores sharing one pool
    pub fn postgres(pool: sqlx::PgPool) -> Self {
        Self {
            identities: Arc::new(PgIdentityStore::new(pool.clone())),
            roles: Arc::new(PgRoleStore::new(pool.clone())),
            routes: Arc::new(PgRouteStore::new(pool.clone())),
            resets: Arc::new(PgResetTokenStore::new(pool)),
        }
    }
}
