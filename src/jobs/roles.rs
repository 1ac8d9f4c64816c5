use log::{debug, Level};
use logging_timer::timer;

use super::{dedupe, note_partial_read, RunSettings};
use crate::error::RosterSyncError;
use crate::normalize::{self, resolve_text, Concept};
use crate::reader::EntityReader;
use crate::report::{DataQualityWarning, Plan, WarningKind};
use crate::store::RemoteStore;

/// Role records only need deduplication: one record per role code survives.
pub(super) async fn plan<S: RemoteStore + ?Sized>(
    reader: &EntityReader<'_, S>,
    settings: &RunSettings,
) -> Result<Plan, RosterSyncError> {
    let _tmr = timer!(Level::Trace; "jobs::roles::plan");
    let collection = &settings.collections.roles;

    let read = reader.read_all(collection).await?;

    let mut plan = Plan::default();
    note_partial_read(&read, &mut plan);

    let mut active = Vec::with_capacity(read.records.len());
    for stored in read.records {
        if !normalize::lifecycle(&stored.fields).is_active() {
            continue;
        }
        if resolve_text(&stored.fields, Concept::RoleCode).is_none() {
            plan.warnings.push(DataQualityWarning::new(
                WarningKind::MissingIdentity,
                stored.id.clone(),
                "role record has no role code",
            ));
        }
        active.push(stored);
    }

    let survivors = dedupe(active, collection, &mut plan, |r| {
        resolve_text(&r.fields, Concept::RoleCode)
    });

    debug!(
        "Roles plan: {} survivors, {} duplicate deletes",
        survivors.len(),
        plan.deletes.len()
    );
    Ok(plan)
}
