//! Route restriction repository for PostgreSQL

use super::RouteStore;
use anyhow::Result;
use async_trait::async_trait;
use rolegate_shared::{MethodRestriction, RouteDefinition};
use sqlx::types::Json;
use sqlx::PgPool;

#[derive(Debug, Clone, sqlx::FromRow)]
struct RouteRecord {
    name: String,
    restrictions: Json<Vec<MethodRestriction>>,
}

pub struct PgRouteStore {
    pool: PgPool,
}

impl PgRouteStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RouteStore for PgRouteStore {
    async fn find_by_name(&self, name: &str) -> Result<Option<RouteDefinition>> {
        let record = sqlx::query_as::<_, RouteRecord>(
            "SELECT name, restrictions FROM routes WHERE name = $1 AND deleted_at IS NULL",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record.map(|r| RouteDefinition {
            name: r.name,
            restrictions: r.restrictions.0,
        }))
    }

    async fn upsert(&self, route: &RouteDefinition) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO routes (name, restrictions)
            VALUES ($1, $2)
            ON CONFLICT (name) WHERE deleted_at IS NULL DO UPDATE SET
                restrictions = EXCLUDED.restrictions,
                updated_at = NOW()
            "#,
        )
        .bind(&route.name)
        .bind(Json(&route.restrictions))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn soft_delete(&self, name: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE routes SET deleted_at = NOW(), updated_at = NOW() WHERE name = $1 AND deleted_at IS NULL",
        )
        .bind(name)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }
}
