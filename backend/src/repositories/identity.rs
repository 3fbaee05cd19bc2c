//! Identity repository for PostgreSQL

use super::IdentityStore;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rolegate_shared::{Identity, RoleMembership};
use serde_json::json;
use sqlx::types::Json;
use sqlx::PgPool;

const COLUMNS: &str =
    "code, email, verify_email_token, roles, created_at, updated_at, deleted_at, expires_at";

/// Identity record from database
#[derive(Debug, Clone, sqlx::FromRow)]
struct IdentityRecord {
    code: String,
    email: String,
    verify_email_token: Option<String>,
    roles: Json<Vec<RoleMembership>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
    expires_at: Option<DateTime<Utc>>,
}

impl From<IdentityRecord> for Identity {
    fn from(record: IdentityRecord) -> Self {
        Identity {
            code: record.code,
            email: record.email,
            verify_email_token: record.verify_email_token,
            roles: record.roles.0,
            created_at: record.created_at,
            updated_at: record.updated_at,
            deleted_at: record.deleted_at,
            expires_at: record.expires_at,
        }
    }
}

pub struct PgIdentityStore {
    pool: PgPool,
}

impl PgIdentityStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IdentityStore for PgIdentityStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<Identity>> {
        let record = sqlx::query_as::<_, IdentityRecord>(&format!(
            r#"
            SELECT {COLUMNS}
            FROM identities
            WHERE email = $1
              AND deleted_at IS NULL
              AND (expires_at IS NULL OR expires_at > NOW())
            "#
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record.map(Identity::from))
    }

    async fn find_by_verification_token(&self, token: &str) -> Result<Option<Identity>> {
        let record = sqlx::query_as::<_, IdentityRecord>(&format!(
            r#"
            SELECT {COLUMNS}
            FROM identities
            WHERE verify_email_token = $1
              AND deleted_at IS NULL
              AND (expires_at IS NULL OR expires_at > NOW())
            "#
        ))
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record.map(Identity::from))
    }

    async fn find_last(&self) -> Result<Option<Identity>> {
        let record = sqlx::query_as::<_, IdentityRecord>(&format!(
            r#"
            SELECT {COLUMNS}
            FROM identities
            ORDER BY LENGTH(code) DESC, code DESC
            LIMIT 1
            "#
        ))
        .fetch_optional(&self.pool)
        .await?;

        Ok(record.map(Identity::from))
    }

    async fn list_by_role(&self, role: &str, page: u32, limit: u32) -> Result<(u64, Vec<Identity>)> {
        let holds_role = Json(json!([{ "name": role }]));
        let offset = i64::from(page.saturating_sub(1)) * i64::from(limit);

        let total: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM identities
            WHERE roles @> $1
              AND deleted_at IS NULL
              AND (expires_at IS NULL OR expires_at > NOW())
            "#,
        )
        .bind(&holds_role)
        .fetch_one(&self.pool)
        .await?;

        let records = sqlx::query_as::<_, IdentityRecord>(&format!(
            r#"
            SELECT {COLUMNS}
            FROM identities
            WHERE roles @> $1
              AND deleted_at IS NULL
              AND (expires_at IS NULL OR expires_at > NOW())
            ORDER BY LENGTH(code), code
            LIMIT $2 OFFSET $3
            "#
        ))
        .bind(&holds_role)
        .bind(i64::from(limit))
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok((
            total.max(0) as u64,
            records.into_iter().map(Identity::from).collect(),
        ))
    }

    async fn save(&self, identity: &Identity) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO identities
                (code, email, verify_email_token, roles, created_at, updated_at, deleted_at, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (email) WHERE deleted_at IS NULL DO UPDATE SET
                code = EXCLUDED.code,
                verify_email_token = EXCLUDED.verify_email_token,
                roles = EXCLUDED.roles,
                updated_at = EXCLUDED.updated_at,
                deleted_at = EXCLUDED.deleted_at,
                expires_at = EXCLUDED.expires_at
            "#,
        )
        .bind(&identity.code)
        .bind(&identity.email)
        .bind(&identity.verify_email_token)
        .bind(Json(&identity.roles))
        .bind(identity.created_at)
        .bind(identity.updated_at)
        .bind(identity.deleted_at)
        .bind(identity.expires_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn soft_delete(&self, email: &str, at: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE identities
            SET deleted_at = $2, updated_at = $2
            WHERE email = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(email)
        .bind(at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM identities WHERE expires_at IS NOT NULL AND expires_at <= $1")
            .bind(now)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}
