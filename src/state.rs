use chrono::Duration;
use sqlx::PgPool;
use std::sync::Arc;

use crate::accounts::{AccountService, Accounts};
use crate::auth::{CapabilityKeyIssuer, SessionTokenIssuer};
use crate::config::AppConfig;
use crate::database::memory::MemoryDatabase;
use crate::database::postgres::PgDatabase;
use crate::ratelimit::{AlertSink, AlertThresholdEngine, ProjectRateLimitProvider, RateLimiter};

/// Everything a request handler or middleware needs, shared across the router
#[derive(Clone)]
pub struct AppState {
    pub sessions: SessionTokenIssuer,
    pub keys: CapabilityKeyIssuer,
    pub accounts: Arc<dyn Accounts>,
    pub limiter: Arc<RateLimiter>,
    pub project_limits: Arc<dyn ProjectRateLimitProvider>,
    pub alert_sink: Arc<dyn AlertSink>,
    pub default_rate_limit: u32,
    pub pool: Option<PgPool>,
}

impl AppState {
    /// Wire every collaborator to one in-process database
    pub fn in_memory(config: &AppConfig, db: MemoryDatabase) -> Self {
        let sessions = session_issuer(config);
        let accounts = AccountService::new(db.clone(), db.clone(), sessions.clone())
            .with_request_timeout(request_timeout(config));
        let store = Arc::new(db.clone());

        Self {
            keys: key_issuer(config, store),
            accounts: Arc::new(accounts),
            limiter: Arc::new(rate_limiter(config)),
            project_limits: Arc::new(db.clone()),
            alert_sink: Arc::new(db),
            default_rate_limit: config.rate_limit.default_limit_per_hour,
            sessions,
            pool: None,
        }
    }

    /// Wire every collaborator to Postgres
    pub fn postgres(config: &AppConfig, pool: PgPool) -> Self {
        let db = PgDatabase::new(pool.clone());
        let sessions = session_issuer(config);
        let accounts = AccountService::new(db.clone(), db.clone(), sessions.clone())
            .with_request_timeout(request_timeout(config));
        let store = Arc::new(db.clone());

        Self {
            keys: key_issuer(config, store),
            accounts: Arc::new(accounts),
            limiter: Arc::new(rate_limiter(config)),
            project_limits: Arc::new(db.clone()),
            alert_sink: Arc::new(db),
            default_rate_limit: config.rate_limit.default_limit_per_hour,
            sessions,
            pool: Some(pool),
        }
    }
}

fn session_issuer(config: &AppConfig) -> SessionTokenIssuer {
    SessionTokenIssuer::new(
        &config.security.secret,
        Duration::hours(config.security.session_ttl_hours),
    )
}

fn key_issuer(
    config: &AppConfig,
    store: Arc<dyn crate::auth::CapabilityKeyStore>,
) -> CapabilityKeyIssuer {
    CapabilityKeyIssuer::new(
        store,
        &config.security.secret,
        Duration::days(config.security.api_key_ttl_days),
        config.security.api_key_default_rate_limit,
    )
}

fn request_timeout(config: &AppConfig) -> std::time::Duration {
    std::time::Duration::from_secs(config.request_timeout_secs)
}

fn rate_limiter(config: &AppConfig) -> RateLimiter {
    RateLimiter::new(AlertThresholdEngine::new(config.rate_limit.alert_every))
}
