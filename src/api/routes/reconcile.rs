use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    Json,
};
use log::info;
use serde::{Deserialize, Serialize};

use super::{api_error, ApiError, AppState};
use crate::auth::require_admin;
use crate::error::RosterSyncError;
use crate::jobs::{run_job, JobKind};
use crate::report::ReconciliationReport;

#[derive(Debug, Default, Deserialize)]
pub struct ReconcileParams {
    /// Overrides the configured executor mode for this run
    pub dry_run: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct ReconcileResponse {
    pub success: bool,
    #[serde(flatten)]
    pub report: ReconciliationReport,
}

/// POST /api/reconcile/{job}
///
/// Authorizes the caller, then runs the named job to completion and returns
/// its report. Only one run may be in flight at a time.
pub async fn run_reconciliation(
    State(state): State<AppState>,
    Path(job): Path<String>,
    Query(params): Query<ReconcileParams>,
    headers: HeaderMap,
) -> Result<Json<ReconcileResponse>, ApiError> {
    let caller = require_admin(state.store.as_ref(), &headers)
        .await
        .map_err(api_error)?;
    let job = JobKind::parse(&job).map_err(api_error)?;

    let _guard = state
        .run_lock
        .try_lock()
        .map_err(|_| api_error(RosterSyncError::Busy))?;

    let mut settings = state.settings.clone();
    if let Some(dry_run) = params.dry_run {
        settings.dry_run = dry_run;
    }

    info!("{} requested a {} run", caller.email, job);
    let report = run_job(state.store.as_ref(), job, &settings)
        .await
        .map_err(api_error)?;

    Ok(Json(ReconcileResponse {
        success: true,
        report,
    }))
}
