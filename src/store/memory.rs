use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;

use super::RemoteStore;
use crate::error::RosterSyncError;
use crate::model::{Caller, Fields, StoredRecord};

const GENERATED_ID_PREFIX: &str = "mem-";

/// Snapshot file layout: collection name to its records
pub type Snapshot = BTreeMap<String, Vec<StoredRecord>>;

/// In-process entity store.
///
/// Loaded from a JSON snapshot for offline runs from the command line; tests
/// use it directly and can make individual records refuse writes.
#[derive(Default)]
pub struct MemoryStore {
    collections: Mutex<Snapshot>,
    users: Mutex<HashMap<String, Caller>>,
    failing_ids: Mutex<HashSet<String>>,
    unreachable: Mutex<HashSet<String>>,
    next_id: AtomicU64,
    list_calls: AtomicU64,
    write_calls: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ids handed out by `create` continue past any `mem-N` already in the
    /// snapshot, so chained offline runs never reuse one
    pub fn from_snapshot(snapshot: Snapshot) -> Self {
        let last_id = snapshot
            .values()
            .flatten()
            .filter_map(|r| r.id.strip_prefix(GENERATED_ID_PREFIX)?.parse::<u64>().ok())
            .max()
            .unwrap_or(0);

        let store = Self::new();
        *store.collections.lock().unwrap() = snapshot;
        store.next_id.store(last_id, Ordering::SeqCst);
        store
    }

    pub fn load_snapshot(path: &Path) -> Result<Self, RosterSyncError> {
        let text = fs::read_to_string(path)?;
        let snapshot: Snapshot = serde_json::from_str(&text)?;
        Ok(Self::from_snapshot(snapshot))
    }

    pub fn save_snapshot(&self, path: &Path) -> Result<(), RosterSyncError> {
        let json = serde_json::to_string_pretty(&*self.collections.lock().unwrap())?;
        fs::write(path, json)?;
        Ok(())
    }

    pub fn insert(&self, collection: &str, record: StoredRecord) {
        self.collections
            .lock()
            .unwrap()
            .entry(collection.to_string())
            .or_default()
            .push(record);
    }

    #[cfg(test)]
    pub fn add_user(&self, token: &str, caller: Caller) {
        self.users.lock().unwrap().insert(token.to_string(), caller);
    }

    /// Writes touching this record id fail with a 500
    pub fn fail_writes_for(&self, id: &str) {
        self.failing_ids.lock().unwrap().insert(id.to_string());
    }

    /// Listing this collection fails with a 503
    pub fn make_unreachable(&self, collection: &str) {
        self.unreachable.lock().unwrap().insert(collection.to_string());
    }

    pub fn records(&self, collection: &str) -> Vec<StoredRecord> {
        self.collections
            .lock()
            .unwrap()
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }

    pub fn list_calls(&self) -> u64 {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn write_calls(&self) -> u64 {
        self.write_calls.load(Ordering::SeqCst)
    }

    fn check_writable(&self, id: &str) -> Result<(), RosterSyncError> {
        self.write_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing_ids.lock().unwrap().contains(id) {
            return Err(RosterSyncError::transport(500, format!("write rejected for {}", id)));
        }
        Ok(())
    }
}

/// Text used for ordering; the creation timestamp sorts like any other field
fn sort_text(record: &StoredRecord, field: &str) -> String {
    if field == "created_date" {
        return record.created_date.clone().unwrap_or_default();
    }
    match record.field(field) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

#[async_trait]
impl RemoteStore for MemoryStore {
    async fn list(
        &self,
        collection: &str,
        sort_key: Option<&str>,
        limit: usize,
        skip: usize,
    ) -> Result<Vec<StoredRecord>, RosterSyncError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if self.unreachable.lock().unwrap().contains(collection) {
            return Err(RosterSyncError::transport(503, format!("{} unavailable", collection)));
        }

        let mut records = self.records(collection);
        if let Some(key) = sort_key {
            let (field, descending) = match key.strip_prefix('-') {
                Some(field) => (field, true),
                None => (key, false),
            };
            records.sort_by_key(|r| sort_text(r, field));
            if descending {
                records.reverse();
            }
        }

        Ok(records.into_iter().skip(skip).take(limit).collect())
    }

    async fn create(
        &self,
        collection: &str,
        fields: &Fields,
    ) -> Result<StoredRecord, RosterSyncError> {
        self.write_calls.fetch_add(1, Ordering::SeqCst);
        let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let record = StoredRecord::new(format!("{}{}", GENERATED_ID_PREFIX, n), fields.clone())
            .with_created_date(Utc::now().to_rfc3339());
        self.insert(collection, record.clone());
        Ok(record)
    }

    async fn update(
        &self,
        collection: &str,
        id: &str,
        fields: &Fields,
    ) -> Result<StoredRecord, RosterSyncError> {
        self.check_writable(id)?;
        let mut collections = self.collections.lock().unwrap();
        let record = collections
            .get_mut(collection)
            .and_then(|records| records.iter_mut().find(|r| r.id == id))
            .ok_or_else(|| RosterSyncError::transport(404, format!("{}/{} not found", collection, id)))?;

        for (name, value) in fields {
            record.fields.insert(name.clone(), value.clone());
        }
        Ok(record.clone())
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<(), RosterSyncError> {
        self.check_writable(id)?;
        let mut collections = self.collections.lock().unwrap();
        let records = collections
            .get_mut(collection)
            .ok_or_else(|| RosterSyncError::transport(404, format!("{} not found", collection)))?;

        let before = records.len();
        records.retain(|r| r.id != id);
        if records.len() == before {
            return Err(RosterSyncError::transport(404, format!("{}/{} not found", collection, id)));
        }
        Ok(())
    }

    async fn current_user(&self, token: &str) -> Result<Caller, RosterSyncError> {
        self.users
            .lock()
            .unwrap()
            .get(token)
            .cloned()
            .ok_or_else(|| RosterSyncError::transport(401, "invalid token"))
    }
}
