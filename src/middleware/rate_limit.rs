use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use crate::auth::KeyScope;
use crate::error::{ApiError, ErrorKind};
use crate::ratelimit::{alert, Admission};
use crate::state::AppState;
use crate::types::ProjectId;

/// Per-project hourly admission control for capability-scoped routes.
///
/// Must run after [`super::api_key_auth_middleware`]; requests without a
/// project scope pass through uncounted.
pub async fn project_rate_limit_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let Some(project_id) = request.extensions().get::<KeyScope>().map(|s| s.project_id) else {
        return Ok(next.run(request).await);
    };

    let limit = resolve_limit(&state, project_id).await;

    match state.limiter.admit(project_id, limit).await {
        Admission::Rejected { limit, reset } => {
            tracing::debug!(project_id, limit, "Rate limit exceeded");
            Err(ApiError::RateLimited {
                limit,
                reset: reset.to_rfc3339(),
            })
        }
        Admission::Admitted { alert, .. } => {
            if let Some(event) = alert {
                alert::dispatch(state.alert_sink.clone(), event);
            }
            Ok(next.run(request).await)
        }
    }
}

/// The project's configured limit, or the process default when the lookup fails
async fn resolve_limit(state: &AppState, project_id: ProjectId) -> u32 {
    match state.project_limits.limit_for_project(project_id).await {
        Ok(limit) => limit,
        Err(e) if e.kind() == ErrorKind::QueryDataNotFound => state.default_rate_limit,
        Err(e) => {
            tracing::warn!(project_id, "Falling back to default rate limit: {}", e);
            state.default_rate_limit
        }
    }
}
