//! Database connection and pool management

use anyhow::Result;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, warn};

/// Pool tuning that is not exposed through configuration
pub struct PoolTuning {
    pub min_connections: u32,
    pub acquire_timeout_secs: u64,
    pub idle_timeout_secs: u64,
    pub max_lifetime_secs: u64,
}

impl Default for PoolTuning {
    fn default() -> Self {
        Self {
            min_connections: 1,
            acquire_timeout_secs: 10,
            idle_timeout_secs: 600,  // 10 minutes
            max_lifetime_secs: 1800, // 30 minutes
        }
    }
}

/// Create a PostgreSQL connection pool
pub async fn create_pool(database_url: &str, max_connections: u32) -> Result<PgPool> {
    let tuning = PoolTuning::default();
    let connect_options = PgConnectOptions::from_str(database_url)?.application_name("rolegate");

    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .min_connections(tuning.min_connections.min(max_connections))
        .acquire_timeout(Duration::from_secs(tuning.acquire_timeout_secs))
        .idle_timeout(Duration::from_secs(tuning.idle_timeout_secs))
        .max_lifetime(Duration::from_secs(tuning.max_lifetime_secs))
        .test_before_acquire(true)
        .connect_with(connect_options)
        .await?;

    info!(max = max_connections, "Database pool created");

    Ok(pool)
}

/// Run database migrations
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    info!("Running database migrations...");
    sqlx::migrate!("./migrations").run(pool).await?;
    info!("Database migrations completed successfully");
    Ok(())
}

/// Check database health
pub async fn health_check(pool: &PgPool) -> Result<()> {
    sqlx::query("SELECT 1")
        .execute(pool)
        .await
        .map(|_| ())
        .map_err(|e| {
            warn!("Database health check failed: {}", e);
            e.into()
        })
}
