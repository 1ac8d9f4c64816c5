pub mod jobs;
pub mod reconcile;
pub mod state;

use axum::{http::StatusCode, Json};
use log::error;
use serde::Serialize;

use crate::error::RosterSyncError;

pub use state::AppState;

/// Error response structure with user-friendly message
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    /// Source chain of an unexpected failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);

pub fn status_for(err: &RosterSyncError) -> StatusCode {
    match err {
        RosterSyncError::Unauthorized => StatusCode::UNAUTHORIZED,
        RosterSyncError::Forbidden(_) => StatusCode::FORBIDDEN,
        RosterSyncError::UnknownJob(_) => StatusCode::NOT_FOUND,
        RosterSyncError::Busy => StatusCode::CONFLICT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn source_chain(err: &RosterSyncError) -> Option<String> {
    let mut causes = Vec::new();
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        causes.push(cause.to_string());
        source = cause.source();
    }
    if causes.is_empty() {
        None
    } else {
        Some(causes.join("\ncaused by: "))
    }
}

/// Map a crate error to the status and body handlers return
pub fn api_error(err: RosterSyncError) -> ApiError {
    let status = status_for(&err);
    let stack = if status == StatusCode::INTERNAL_SERVER_ERROR {
        error!("Request failed: {}", err);
        source_chain(&err)
    } else {
        None
    };

    (
        status,
        Json(ErrorResponse {
            error: err.to_string(),
            stack,
        }),
    )
}
