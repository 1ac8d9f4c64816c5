//! Remote entity store seam.
//!
//! Everything the reconciliation pipeline knows about persistence goes
//! through [`RemoteStore`]: paged listing, single-record writes and the
//! backend's own notion of the current user.

pub mod http;
pub mod memory;

use async_trait::async_trait;

use crate::error::RosterSyncError;
use crate::model::{Caller, Fields, StoredRecord};

pub use http::HttpStore;
pub use memory::MemoryStore;

#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// List one page of a collection. `sort_key` follows the backend's
    /// convention: a field name, optionally prefixed with `-` for descending.
    async fn list(
        &self,
        collection: &str,
        sort_key: Option<&str>,
        limit: usize,
        skip: usize,
    ) -> Result<Vec<StoredRecord>, RosterSyncError>;

    async fn create(&self, collection: &str, fields: &Fields)
        -> Result<StoredRecord, RosterSyncError>;

    async fn update(
        &self,
        collection: &str,
        id: &str,
        fields: &Fields,
    ) -> Result<StoredRecord, RosterSyncError>;

    async fn delete(&self, collection: &str, id: &str) -> Result<(), RosterSyncError>;

    /// Resolve a caller's bearer token to the backend user it belongs to
    async fn current_user(&self, token: &str) -> Result<Caller, RosterSyncError>;
}
