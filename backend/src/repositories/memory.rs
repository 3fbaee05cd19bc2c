//! In-memory stores
//!
//! Used by the test suite and by `database.backend = "memory"`. Every mutation
//! happens under a single write lock, which makes whitelist consumption atomic.

use super::{IdentityStore, ResetTokenStore, RoleStore, RouteStore};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rolegate_shared::{Identity, ResetToken, RoleDefinition, RouteDefinition};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Soft-deletable record
#[derive(Debug, Clone)]
struct Row<T> {
    value: T,
    deleted_at: Option<DateTime<Utc>>,
}

impl<T> Row<T> {
    fn live(value: T) -> Self {
        Self {
            value,
            deleted_at: None,
        }
    }
}

/// Sort key that orders member codes numerically for a fixed prefix
fn code_key(code: &str) -> (usize, &str) {
    (code.len(), code)
}

#[derive(Default)]
pub struct MemoryIdentityStore {
    rows: RwLock<Vec<Identity>>,
}

#[async_trait]
impl IdentityStore for MemoryIdentityStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<Identity>> {
        let now = Utc::now();
        let rows = self.rows.read().await;
        Ok(rows
            .iter()
            .find(|i| i.email == email && i.is_live(now))
            .cloned())
    }

    async fn find_by_verification_token(&self, token: &str) -> Result<Option<Identity>> {
        let now = Utc::now();
        let rows = self.rows.read().await;
        Ok(rows
            .iter()
            .find(|i| i.verify_email_token.as_deref() == Some(token) && i.is_live(now))
            .cloned())
    }

    async fn find_last(&self) -> Result<Option<Identity>> {
        let rows = self.rows.read().await;
        Ok(rows.iter().max_by(|a, b| code_key(&a.code).cmp(&code_key(&b.code))).cloned())
    }

    async fn list_by_role(&self, role: &str, page: u32, limit: u32) -> Result<(u64, Vec<Identity>)> {
        let now = Utc::now();
        let rows = self.rows.read().await;
        let mut matching: Vec<&Identity> = rows
            .iter()
            .filter(|i| i.is_live(now) && i.membership(role).is_some())
            .collect();
        matching.sort_by(|a, b| code_key(&a.code).cmp(&code_key(&b.code)));

        let skip = (page.saturating_sub(1) as usize).saturating_mul(limit as usize);
        let data = matching
            .iter()
            .skip(skip)
            .take(limit as usize)
            .map(|i| (*i).clone())
            .collect();
        Ok((matching.len() as u64, data))
    }

    async fn save(&self, identity: &Identity) -> Result<()> {
        let mut rows = self.rows.write().await;
        match rows
            .iter_mut()
            .find(|i| i.email == identity.email && i.deleted_at.is_none())
        {
            Some(existing) => *existing = identity.clone(),
            None => rows.push(identity.clone()),
        }
        Ok(())
    }

    async fn soft_delete(&self, email: &str, at: DateTime<Utc>) -> Result<bool> {
        let mut rows = self.rows.write().await;
        match rows
            .iter_mut()
            .find(|i| i.email == email && i.is_live(at))
        {
            Some(identity) => {
                identity.deleted_at = Some(at);
                identity.updated_at = at;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let mut rows = self.rows.write().await;
        let before = rows.len();
        rows.retain(|i| i.expires_at.map_or(true, |exp| exp > now));
        Ok((before - rows.len()) as u64)
    }
}

#[derive(Default)]
pub struct MemoryRoleStore {
    rows: RwLock<HashMap<String, Row<RoleDefinition>>>,
}

#[async_trait]
impl RoleStore for MemoryRoleStore {
    async fn find_by_name(&self, name: &str) -> Result<Option<RoleDefinition>> {
        let rows = self.rows.read().await;
        Ok(rows
            .get(name)
            .filter(|row| row.deleted_at.is_none())
            .map(|row| row.value.clone()))
    }

    async fn upsert(&self, role: &RoleDefinition) -> Result<()> {
        let mut rows = self.rows.write().await;
        rows.insert(role.name.clone(), Row::live(role.clone()));
        Ok(())
    }

    async fn consume_whitelist(&self, name: &str, email: &str) -> Result<bool> {
        let mut rows = self.rows.write().await;
        let Some(row) = rows.get_mut(name).filter(|row| row.deleted_at.is_none()) else {
            return Ok(false);
        };
        let whitelist = &mut row.value.registration.whitelist;
        match whitelist.iter().position(|entry| entry == email) {
            Some(idx) => {
                whitelist.remove(idx);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn soft_delete(&self, name: &str) -> Result<bool> {
        let mut rows = self.rows.write().await;
        match rows.get_mut(name).filter(|row| row.deleted_at.is_none()) {
            Some(row) => {
                row.deleted_at = Some(Utc::now());
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[derive(Default)]
pub struct MemoryRouteStore {
    rows: RwLock<HashMap<String, Row<RouteDefinition>>>,
}

#[async_trait]
impl RouteStore for MemoryRouteStore {
    async fn find_by_name(&self, name: &str) -> Result<Option<RouteDefinition>> {
        let rows = self.rows.read().await;
        Ok(rows
            .get(name)
            .filter(|row| row.deleted_at.is_none())
            .map(|row| row.value.clone()))
    }

    async fn upsert(&self, route: &RouteDefinition) -> Result<()> {
        let mut rows = self.rows.write().await;
        rows.insert(route.name.clone(), Row::live(route.clone()));
        Ok(())
    }

    async fn soft_delete(&self, name: &str) -> Result<bool> {
        let mut rows = self.rows.write().await;
        match rows.get_mut(name).filter(|row| row.deleted_at.is_none()) {
            Some(row) => {
                row.deleted_at = Some(Utc::now());
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[derive(Default)]
pub struct MemoryResetTokenStore {
    rows: RwLock<Vec<ResetToken>>,
}

#[async_trait]
impl ResetTokenStore for MemoryResetTokenStore {
    async fn find(
        &self,
        email: &str,
        role: &str,
        token: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Option<ResetToken>> {
        let rows = self.rows.read().await;
        let candidates = rows.iter().filter(|t| {
            t.email == email
                && t.role == role
                && t.expired_at > now
                && token.map_or(true, |wanted| t.token == wanted)
        });
        Ok(candidates.max_by_key(|t| t.expired_at).cloned())
    }

    async fn create(&self, token: &ResetToken) -> Result<()> {
        self.rows.write().await.push(token.clone());
        Ok(())
    }

    async fn delete_all(&self, email: &str, role: &str) -> Result<u64> {
        let mut rows = self.rows.write().await;
        let before = rows.len();
        rows.retain(|t| !(t.email == email && t.role == role));
        Ok((before - rows.len()) as u64)
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let mut rows = self.rows.write().await;
        let before = rows.len();
        rows.retain(|t| t.expired_at > now);
        Ok((before - rows.len()) as u64)
    }
}
