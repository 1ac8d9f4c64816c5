pub mod routes;

// Re-export route handlers for convenience
pub use routes::jobs;
pub use routes::reconcile;
pub use routes::state::AppState;
