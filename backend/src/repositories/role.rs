//! Role repository for PostgreSQL

use super::RoleStore;
use anyhow::Result;
use async_trait::async_trait;
use rolegate_shared::{AttributeSchema, PageLimit, RegistrationPolicy, RoleDefinition};
use sqlx::types::Json;
use sqlx::PgPool;

#[derive(Debug, Clone, sqlx::FromRow)]
struct RoleRecord {
    name: String,
    additions: Json<Vec<AttributeSchema>>,
    limits: Json<Vec<PageLimit>>,
    registration: Json<RegistrationPolicy>,
}

impl From<RoleRecord> for RoleDefinition {
    fn from(record: RoleRecord) -> Self {
        RoleDefinition {
            name: record.name,
            additions: record.additions.0,
            limits: record.limits.0,
            registration: record.registration.0,
        }
    }
}

pub struct PgRoleStore {
    pool: PgPool,
}

impl PgRoleStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RoleStore for PgRoleStore {
    async fn find_by_name(&self, name: &str) -> Result<Option<RoleDefinition>> {
        let record = sqlx::query_as::<_, RoleRecord>(
            r#"
            SELECT name, additions, limits, registration
            FROM roles
            WHERE name = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record.map(RoleDefinition::from))
    }

    async fn upsert(&self, role: &RoleDefinition) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO roles (name, additions, limits, registration)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (name) WHERE deleted_at IS NULL DO UPDATE SET
                additions = EXCLUDED.additions,
                limits = EXCLUDED.limits,
                registration = EXCLUDED.registration,
                updated_at = NOW()
            "#,
        )
        .bind(&role.name)
        .bind(Json(&role.additions))
        .bind(Json(&role.limits))
        .bind(Json(&role.registration))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Single conditional UPDATE; two concurrent callers cannot both match
    async fn consume_whitelist(&self, name: &str, email: &str) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE roles
            SET registration = jsonb_set(
                    registration,
                    '{whitelist}',
                    (registration -> 'whitelist') - $2::text
                ),
                updated_at = NOW()
            WHERE name = $1
              AND deleted_at IS NULL
              AND (registration -> 'whitelist') ? $2
            "#,
        )
        .bind(name)
        .bind(email)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn soft_delete(&self, name: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE roles SET deleted_at = NOW(), updated_at = NOW() WHERE name = $1 AND deleted_at IS NULL",
        )
        .bind(name)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
