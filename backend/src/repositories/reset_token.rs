//! Password reset grant repository for PostgreSQL

use super::ResetTokenStore;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rolegate_shared::ResetToken;
use sqlx::PgPool;

#[derive(Debug, Clone, sqlx::FromRow)]
struct ResetTokenRecord {
    role: String,
    email: String,
    token: String,
    created_at: DateTime<Utc>,
    expired_at: DateTime<Utc>,
}

impl From<ResetTokenRecord> for ResetToken {
    fn from(record: ResetTokenRecord) -> Self {
        ResetToken {
            role: record.role,
            email: record.email,
            token: record.token,
            created_at: record.created_at,
            expired_at: record.expired_at,
        }
    }
}

pub struct PgResetTokenStore {
    pool: PgPool,
}

impl PgResetTokenStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ResetTokenStore for PgResetTokenStore {
    async fn find(
        &self,
        email: &str,
        role: &str,
        token: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Option<ResetToken>> {
        let record = sqlx::query_as::<_, ResetTokenRecord>(
            r#"
            SELECT role, email, token, created_at, expired_at
            FROM reset_tokens
            WHERE email = $1
              AND role = $2
              AND ($3::text IS NULL OR token = $3)
              AND expired_at > $4
            ORDER BY expired_at DESC
            LIMIT 1
            "#,
        )
        .bind(email)
        .bind(role)
        .bind(token)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record.map(ResetToken::from))
    }

    async fn create(&self, token: &ResetToken) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO reset_tokens (role, email, token, created_at, expired_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(&token.role)
        .bind(&token.email)
        .bind(&token.token)
        .bind(token.created_at)
        .bind(token.expired_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete_all(&self, email: &str, role: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM reset_tokens WHERE email = $1 AND role = $2")
            .bind(email)
            .bind(role)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM reset_tokens WHERE expired_at <= $1")
            .bind(now)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}
