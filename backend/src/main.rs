//! Rolegate Backend
//!
//! Identity, session token and route authorization service.
//!
//! ## Architecture
//!
//! - Routes: HTTP request handling, cookies and request-shape validation
//! - Services: registration, login, password flows and role/route administration
//! - Repositories: PostgreSQL stores, or in-memory stores for local runs

use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use rolegate_backend::{
    config::{self, StorageBackend},
    db,
    notifier::LogNotifier,
    repositories::Stores,
    routes,
    state::AppState,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// How often expired registrations and reset grants are purged
const PURGE_INTERVAL: Duration = Duration::from_secs(600);

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    init_tracing();

    let config = config::AppConfig::load()?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        env = if config::AppConfig::is_production() { "production" } else { "development" },
        "Starting Rolegate"
    );

    if config::AppConfig::is_production() {
        validate_production_config(&config)?;
    }

    let (stores, pool) = match config.database.backend {
        StorageBackend::Postgres => {
            info!("Connecting to database...");
            let pool = db::create_pool(&config.database.url, config.database.max_connections).await?;
            db::run_migrations(&pool).await?;
            (Stores::postgres(pool.clone()), Some(pool))
        }
        StorageBackend::Memory => {
            warn!("Using in-memory stores; all data is lost on shutdown");
            (Stores::in_memory(), None)
        }
    };

    let metrics = PrometheusBuilder::new()
        .install_recorder()
        .context("Failed to install Prometheus recorder")?;

    let notifier = Arc::new(LogNotifier::new(&config.mail));
    let mut state = AppState::new(stores, config.clone(), notifier).with_metrics(metrics);
    if let Some(pool) = pool {
        state = state.with_database(pool);
    }

    state
        .auth
        .ensure_admin(&config.bootstrap)
        .await
        .map_err(|e| anyhow::anyhow!("Admin bootstrap failed: {}", e))?;

    spawn_purge_task(state.clone());

    let app = routes::create_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    info!(address = %addr, "Server listening");

    let listener = tokio::net::TcpListener::bind(&addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Periodically remove unverified identities and reset grants past their expiry
fn spawn_purge_task(state: AppState) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(PURGE_INTERVAL);
        loop {
            ticker.tick().await;
            if let Err(e) = state.auth.purge_expired().await {
                error!("Purge of expired records failed: {}", e);
            }
        }
    });
}

/// Initialize tracing/logging
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if config::AppConfig::is_production() {
            "rolegate_backend=info,tower_http=info".into()
        } else {
            "rolegate_backend=debug,tower_http=debug,sqlx=warn".into()
        }
    });

    let subscriber = tracing_subscriber::registry().with(env_filter);

    if config::AppConfig::is_production() {
        // JSON logging for production (better for log aggregation)
        subscriber
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        subscriber
            .with(tracing_subscriber::fmt::layer().pretty())
            .init();
    }
}

/// Refuse to start in production with development secrets
fn validate_production_config(config: &config::AppConfig) -> Result<()> {
    if config.database.url.contains("localhost") || config.database.url.contains("127.0.0.1") {
        warn!("Database URL contains localhost - ensure this is intentional for production");
    }

    let issues = config.production_issues();
    if !issues.is_empty() {
        for issue in &issues {
            error!("Configuration error: {}", issue);
        }
        anyhow::bail!("Invalid production configuration");
    }

    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        }
        _ = terminate => {
            info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
