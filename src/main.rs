use std::process::ExitCode;
use std::time::Duration;

use tower_http::cors::CorsLayer;
use tracing_subscriber::EnvFilter;

use w3st_api::config::AppConfig;
use w3st_api::database::{DatabaseManager, MemoryDatabase};
use w3st_api::ratelimit::spawn_sweeper;
use w3st_api::{app, AppState};

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env if present so cargo run picks up SECRET_KEY, DATABASE_URL, etc.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Invalid configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };
    tracing::info!("Starting W3ST API in {:?} mode", config.environment);

    let state = if config.database.url.is_some() {
        match DatabaseManager::connect(&config.database).await {
            Ok(pool) => AppState::postgres(&config, pool),
            Err(e) => {
                tracing::error!("Failed to connect to database: {}", e);
                return ExitCode::FAILURE;
            }
        }
    } else {
        tracing::warn!("DATABASE_URL not set; using in-memory storage");
        AppState::in_memory(&config, MemoryDatabase::new())
    };

    spawn_sweeper(
        state.limiter.clone(),
        Duration::from_secs(config.rate_limit.sweep_interval_secs.max(1)),
    );

    let mut router = app(state);
    if config.security.cors_permissive {
        router = router.layer(CorsLayer::permissive());
    }

    let bind_addr = format!("0.0.0.0:{}", config.port);
    let listener = match tokio::net::TcpListener::bind(&bind_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Failed to bind {}: {}", bind_addr, e);
            return ExitCode::FAILURE;
        }
    };
    tracing::info!("W3ST API listening on http://{}", bind_addr);

    if let Err(e) = axum::serve(listener, router).await {
        tracing::error!("Server error: {}", e);
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}
