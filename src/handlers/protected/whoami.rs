use axum::extract::Extension;
use serde::Serialize;

use crate::middleware::{ApiResponse, ApiResult, AuthUser};
use crate::types::Principal;

#[derive(Debug, Serialize)]
pub struct WhoAmI {
    pub principal: Principal,
}

/// GET /api/auth/whoami - The principal the session token was issued to
pub async fn whoami(Extension(auth_user): Extension<AuthUser>) -> ApiResult<WhoAmI> {
    Ok(ApiResponse::success(WhoAmI {
        principal: auth_user.principal,
    }))
}
