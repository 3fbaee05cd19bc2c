//! Application state management
//!
//! Shared state passed to every handler. Services, the authorizer and the
//! token keys are built once at startup; cloning the state only bumps
//! reference counts.

use crate::auth::Authorizer;
use crate::config::AppConfig;
use crate::notifier::{LogNotifier, Notifier};
use crate::repositories::Stores;
use crate::services::{AuthService, MemberService};
use metrics_exporter_prometheus::PrometheusHandle;
use sqlx::PgPool;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub auth: Arc<AuthService>,
    pub members: Arc<MemberService>,
    pub authorizer: Authorizer,
    /// Present when running against PostgreSQL
    pub db: Option<PgPool>,
    /// Present when a Prometheus recorder is installed
    pub metrics: Option<PrometheusHandle>,
    /// Cookies are `Secure` and `SameSite=None` in production
    pub production: bool,
}

impl AppState {
    pub fn new(stores: Stores, config: AppConfig, notifier: Arc<dyn Notifier>) -> Self {
        let auth = AuthService::new(stores.clone(), &config, notifier);
        let authorizer = Authorizer::new(
            auth.tokens().clone(),
            stores.identities.clone(),
            stores.routes.clone(),
        );

        Self {
            members: Arc::new(MemberService::new(stores.identities)),
            auth: Arc::new(auth),
            authorizer,
            config: Arc::new(config),
            db: None,
            metrics: None,
            production: AppConfig::is_production(),
        }
    }

    /// In-memory stores with mail written to the log
    pub fn in_memory(config: AppConfig) -> Self {
        let notifier = Arc::new(LogNotifier::new(&config.mail));
        Self::new(Stores::in_memory(), config, notifier)
    }

    pub fn with_database(mut self, pool: PgPool) -> Self {
        self.db = Some(pool);
        self
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    #[inline]
    pub fn config(&self) -> &AppConfig {
        &self.config
    }
}
