use axum::extract::{Extension, Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::auth::CapabilityKey;
use crate::middleware::{ApiResponse, ApiResult, AuthUser};
use crate::state::AppState;
use crate::types::{CollectionId, KeyId, ProjectId};

#[derive(Debug, Deserialize)]
pub struct CreateKeyRequest {
    pub name: String,
    #[serde(default)]
    pub collection_ids: Vec<CollectionId>,
}

#[derive(Debug, Serialize)]
pub struct CreatedKey {
    /// Plaintext secret. Shown once and never retrievable again.
    pub key: String,
    pub project_id: ProjectId,
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct RevokedKey {
    pub id: KeyId,
    pub revoked: bool,
}

/// POST /api/projects/:project_id/keys - Create an API key scoped to a project
pub async fn create_key(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(project_id): Path<ProjectId>,
    Json(payload): Json<CreateKeyRequest>,
) -> ApiResult<CreatedKey> {
    let key = state
        .keys
        .create(auth_user.principal, project_id, &payload.name, payload.collection_ids)
        .await?;

    Ok(ApiResponse::created(CreatedKey {
        key,
        project_id,
        name: payload.name.trim().to_string(),
    }))
}

/// GET /api/projects/:project_id/keys - The caller's keys for one project
pub async fn list_keys(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(project_id): Path<ProjectId>,
) -> ApiResult<Vec<CapabilityKey>> {
    let keys = state
        .keys
        .list(auth_user.principal)
        .await?
        .into_iter()
        .filter(|k| k.project_id == project_id)
        .collect();
    Ok(ApiResponse::success(keys))
}

/// POST /api/keys/:id/revoke
pub async fn revoke_key(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(id): Path<KeyId>,
) -> ApiResult<RevokedKey> {
    state.keys.revoke(auth_user.principal, id).await?;
    Ok(ApiResponse::success(RevokedKey { id, revoked: true }))
}

/// DELETE /api/keys/:id
pub async fn delete_key(
    State(state): State<AppState>,
    Extension(auth_user): Extension<AuthUser>,
    Path(id): Path<KeyId>,
) -> ApiResult<()> {
    state.keys.delete(auth_user.principal, id).await?;
    Ok(ApiResponse::no_content())
}
