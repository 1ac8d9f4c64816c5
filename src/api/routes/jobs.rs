use axum::{extract::State, http::HeaderMap, Json};

use super::{api_error, ApiError, AppState};
use crate::auth::require_admin;
use crate::jobs::{list_jobs, JobInfo};

/// GET /api/jobs
pub async fn get_jobs(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<JobInfo>>, ApiError> {
    require_admin(state.store.as_ref(), &headers)
        .await
        .map_err(api_error)?;
    Ok(Json(list_jobs()))
}
