use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RosterSyncError {
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// The remote store was unreachable or answered with a non-success status
    #[error("Remote store error ({status}): {message}")]
    Transport { status: u16, message: String },

    #[error("Authentication required")]
    Unauthorized,

    #[error("Caller '{0}' is not an administrator")]
    Forbidden(String),

    #[error("Unknown reconciliation job: '{0}'")]
    UnknownJob(String),

    #[error("A reconciliation run is already in progress")]
    Busy,

    #[error("Error: {0}")]
    Error(String), // Allows custom application errors
}

impl RosterSyncError {
    pub fn transport(status: u16, message: impl Into<String>) -> Self {
        RosterSyncError::Transport {
            status,
            message: message.into(),
        }
    }
}

impl From<reqwest::Error> for RosterSyncError {
    fn from(err: reqwest::Error) -> Self {
        // No status means the request never got an answer (connect, timeout, decode)
        let status = err.status().map(|s| s.as_u16()).unwrap_or(503);
        RosterSyncError::Transport {
            status,
            message: err.to_string(),
        }
    }
}
