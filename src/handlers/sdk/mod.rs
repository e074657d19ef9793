// SDK handlers: API key required (`X-Api-Key`) and rate limited per project.
// Routes receive the key's scope as `Extension<KeyScope>`.
use axum::extract::{Extension, Path, State};
use chrono::Utc;
use serde::Serialize;

use crate::auth::KeyScope;
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult};
use crate::ratelimit::BucketUsage;
use crate::state::AppState;
use crate::types::{CollectionId, ProjectId};

#[derive(Debug, Serialize)]
pub struct ScopeView {
    #[serde(flatten)]
    pub scope: KeyScope,
    pub usage: Option<BucketUsage>,
}

#[derive(Debug, Serialize)]
pub struct CollectionAccess {
    pub project_id: ProjectId,
    pub collection_id: CollectionId,
}

/// GET /sdk/scope - The key's scope and this hour's request count
pub async fn scope(
    State(state): State<AppState>,
    Extension(scope): Extension<KeyScope>,
) -> ApiResult<ScopeView> {
    let usage = state.limiter.usage(scope.project_id, Utc::now()).await;
    Ok(ApiResponse::success(ScopeView { scope, usage }))
}

/// GET /sdk/collections/:collection_id - Allowed only for collections on the key's allowlist
pub async fn collection(
    Extension(scope): Extension<KeyScope>,
    Path(collection_id): Path<CollectionId>,
) -> ApiResult<CollectionAccess> {
    if !scope.allows_collection(collection_id) {
        return Err(ApiError::forbidden(format!(
            "API key does not grant access to collection {}",
            collection_id
        )));
    }

    Ok(ApiResponse::success(CollectionAccess {
        project_id: scope.project_id,
        collection_id,
    }))
}
