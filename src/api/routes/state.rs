use std::sync::Arc;
use tokio::sync::Mutex;

use crate::jobs::RunSettings;
use crate::store::RemoteStore;

/// Shared application state passed to all Axum handlers via `.with_state()`.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn RemoteStore>,
    pub settings: RunSettings,
    /// Held for the duration of a run; at most one run per process
    pub run_lock: Arc<Mutex<()>>,
}

impl AppState {
    pub fn new(store: Arc<dyn RemoteStore>, settings: RunSettings) -> Self {
        Self {
            store,
            settings,
            run_lock: Arc::new(Mutex::new(())),
        }
    }
}
