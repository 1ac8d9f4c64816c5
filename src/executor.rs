use std::time::Duration;

use log::{error, info, Level};
use logging_timer::timer;
use serde::Serialize;

use crate::reconcile::{FieldChange, WriteOp};
use crate::store::RemoteStore;

/// A write together with the fields that identify it in the report
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlannedWrite {
    pub key: String,
    #[serde(flatten)]
    pub op: WriteOp,
    /// Old and new value of every field the write touches
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub changes: Vec<FieldChange>,
}

impl PlannedWrite {
    pub fn new(key: impl Into<String>, op: WriteOp) -> Self {
        PlannedWrite {
            key: key.into(),
            op,
            changes: Vec::new(),
        }
    }

    pub fn with_changes(mut self, changes: Vec<FieldChange>) -> Self {
        self.changes = changes;
        self
    }
}

/// A write that failed; the run went on without it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecordError {
    pub key: String,
    pub collection: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub error: String,
}

#[derive(Debug, Default)]
pub struct ExecutionOutcome {
    pub applied: Vec<PlannedWrite>,
    pub errors: Vec<RecordError>,
}

/// Applies writes one at a time, in order, with a fixed pause between
/// consecutive remote calls. A failed write is recorded and skipped; nothing
/// already written is rolled back.
pub struct MigrationExecutor<'a, S: RemoteStore + ?Sized> {
    store: &'a S,
    write_delay: Duration,
    dry_run: bool,
}

impl<'a, S: RemoteStore + ?Sized> MigrationExecutor<'a, S> {
    pub fn new(store: &'a S, write_delay: Duration, dry_run: bool) -> Self {
        MigrationExecutor {
            store,
            write_delay,
            dry_run,
        }
    }

    pub async fn apply(&self, writes: &[PlannedWrite]) -> ExecutionOutcome {
        let _tmr = timer!(Level::Trace; "MigrationExecutor::apply", "{} writes", writes.len());
        let mut outcome = ExecutionOutcome::default();

        if self.dry_run {
            info!("Dry run: {} writes planned, none applied", writes.len());
            return outcome;
        }

        for (i, write) in writes.iter().enumerate() {
            if i > 0 && !self.write_delay.is_zero() {
                tokio::time::sleep(self.write_delay).await;
            }

            let result = match &write.op {
                WriteOp::Create { collection, fields } => {
                    self.store.create(collection, fields).await.map(|_| ())
                }
                WriteOp::Update { collection, id, fields } => {
                    self.store.update(collection, id, fields).await.map(|_| ())
                }
                WriteOp::Delete { collection, id } => self.store.delete(collection, id).await,
            };

            match result {
                Ok(()) => outcome.applied.push(write.clone()),
                Err(e) => {
                    error!("Write for {} failed: {}", write.key, e);
                    let id = match &write.op {
                        WriteOp::Update { id, .. } | WriteOp::Delete { id, .. } => Some(id.clone()),
                        WriteOp::Create { .. } => None,
                    };
                    outcome.errors.push(RecordError {
                        key: write.key.clone(),
                        collection: write.op.collection().to_string(),
                        id,
                        error: e.to_string(),
                    });
                }
            }
        }

        info!(
            "Applied {} of {} writes ({} failed)",
            outcome.applied.len(),
            writes.len(),
            outcome.errors.len()
        );
        outcome
    }
}
