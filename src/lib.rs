pub mod accounts;
pub mod auth;
pub mod config;
pub mod database;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod ratelimit;
pub mod state;
pub mod types;

use axum::{
    middleware::from_fn_with_state,
    routing::{delete, get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tower_http::trace::TraceLayer;

pub use state::AppState;

/// The full HTTP surface, ready to serve or to drive in-process
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .merge(public_routes())
        .merge(protected_routes(state.clone()))
        .merge(sdk_routes(state.clone()))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn public_routes() -> Router<AppState> {
    use handlers::public;

    Router::new()
        .route("/health", get(public::health))
        .route("/auth/signup", post(public::signup))
        .route("/auth/login", post(public::login))
        .route("/auth/keys/validate", get(public::validate_key))
}

fn protected_routes(state: AppState) -> Router<AppState> {
    use handlers::protected;

    Router::new()
        .route("/api/auth/whoami", get(protected::whoami))
        .route(
            "/api/projects/:project_id/keys",
            get(protected::list_keys).post(protected::create_key),
        )
        .route("/api/keys/:id/revoke", post(protected::revoke_key))
        .route("/api/keys/:id", delete(protected::delete_key))
        .route_layer(from_fn_with_state(state, middleware::bearer_auth_middleware))
}

fn sdk_routes(state: AppState) -> Router<AppState> {
    use handlers::sdk;

    // Layers run bottom-up: authenticate the key, then count against its project
    Router::new()
        .route("/sdk/scope", get(sdk::scope))
        .route("/sdk/collections/:collection_id", get(sdk::collection))
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware::project_rate_limit_middleware,
        ))
        .route_layer(from_fn_with_state(state, middleware::api_key_auth_middleware))
}

async fn root() -> Json<Value> {
    Json(json!({
        "success": true,
        "data": {
            "name": "W3ST API",
            "version": env!("CARGO_PKG_VERSION"),
            "endpoints": {
                "public": "/health, /auth/signup, /auth/login, /auth/keys/validate?key=",
                "protected": "/api/auth/whoami, /api/projects/:project_id/keys, /api/keys/:id (Authorization: Bearer)",
                "sdk": "/sdk/scope, /sdk/collections/:collection_id (X-Api-Key, rate limited)",
            }
        }
    }))
}
