use axum::{
    extract::{Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::accounts::IssuedSession;
use crate::auth::KeyScope;
use crate::middleware::{ApiResponse, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct SignupRequest {
    pub email: String,
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
}

/// POST /auth/signup - Create an account and receive a session token
pub async fn signup(
    State(state): State<AppState>,
    Json(payload): Json<SignupRequest>,
) -> ApiResult<IssuedSession> {
    let session = state.accounts.signup(&payload.email, &payload.name).await?;
    Ok(ApiResponse::created(session))
}

/// POST /auth/login - Issue a session token for an existing account
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> ApiResult<IssuedSession> {
    let session = state.accounts.login(&payload.email).await?;
    Ok(ApiResponse::success(session))
}

#[derive(Debug, Deserialize)]
pub struct ValidateKeyQuery {
    pub key: String,
}

#[derive(Debug, Serialize)]
pub struct ScopedTokenResponse {
    pub token: String,
    #[serde(flatten)]
    pub scope: KeyScope,
    pub expires_at: DateTime<Utc>,
}

/// GET /auth/keys/validate?key= - Exchange an API key for a scoped access token
pub async fn validate_key(
    State(state): State<AppState>,
    Query(query): Query<ValidateKeyQuery>,
) -> ApiResult<ScopedTokenResponse> {
    let access = state.keys.validate(query.key.trim()).await?;
    Ok(ApiResponse::success(ScopedTokenResponse {
        token: access.token,
        scope: access.scope,
        expires_at: access.expires_at,
    }))
}
