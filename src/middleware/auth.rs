use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};

use crate::auth::KeyScope;
use crate::error::ApiError;
use crate::state::AppState;
use crate::types::Principal;

pub const API_KEY_HEADER: &str = "x-api-key";

/// Authenticated identity extracted by either scheme
#[derive(Clone, Copy, Debug)]
pub struct AuthUser {
    pub principal: Principal,
}

/// Session scheme: `Authorization: Bearer <token>`
pub async fn bearer_auth_middleware(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_bearer_token(&headers).map_err(ApiError::unauthorized)?;

    let principal = state.sessions.validate(token).map_err(ApiError::from)?;

    request.extensions_mut().insert(AuthUser { principal });
    Ok(next.run(request).await)
}

/// Capability scheme: `X-Api-Key: <secret>`.
///
/// Key lookup failures surface through the domain status table (unknown or
/// revoked key is 404, expired is 403); a missing header is 401.
pub async fn api_key_auth_middleware(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let secret = extract_api_key(&headers).map_err(ApiError::unauthorized)?;

    let access = state.keys.validate(secret).await?;
    let scope: KeyScope = access.scope;

    request.extensions_mut().insert(AuthUser {
        principal: scope.principal,
    });
    request.extensions_mut().insert(scope);
    Ok(next.run(request).await)
}

/// Extract the bearer token from the Authorization header
fn extract_bearer_token(headers: &HeaderMap) -> Result<&str, &'static str> {
    let auth_str = headers
        .get(axum::http::header::AUTHORIZATION)
        .ok_or("Authorization header is required")?
        .to_str()
        .map_err(|_| "Invalid Authorization header format")?;

    let token = auth_str
        .strip_prefix("Bearer ")
        .ok_or("Authorization header must use Bearer token format")?
        .trim();

    if token.is_empty() {
        return Err("Authorization header is required");
    }
    Ok(token)
}

fn extract_api_key(headers: &HeaderMap) -> Result<&str, &'static str> {
    let key = headers
        .get(API_KEY_HEADER)
        .ok_or("X-Api-Key header is required")?
        .to_str()
        .map_err(|_| "Invalid X-Api-Key header format")?
        .trim();

    if key.is_empty() {
        return Err("X-Api-Key header is required");
    }
    Ok(key)
}
