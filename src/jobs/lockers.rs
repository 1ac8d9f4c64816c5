use std::collections::BTreeMap;

use log::{debug, Level};
use logging_timer::timer;
use serde_json::Value;

use super::{dedupe, note_partial_read, RunSettings};
use crate::error::RosterSyncError;
use crate::model::Fields;
use crate::normalize::{self, project, resolve_text, Concept};
use crate::reader::EntityReader;
use crate::reconcile::{reconcile_single, Existing};
use crate::report::{DataQualityWarning, Plan, WarningKind};
use crate::store::RemoteStore;

const LOCKER_CONCEPTS: [Concept; 3] = [Concept::EmployeeRef, Concept::LockerNumber, Concept::Wardrobe];

/// Locker fields an employee master record asks for, or `None` when it has
/// no locker at all
fn desired_locker(code: &str, fields: &Fields) -> Option<Fields> {
    let number = resolve_text(fields, Concept::LockerNumber)?;

    let mut desired = Fields::new();
    desired.insert(Concept::EmployeeRef.canonical_field().into(), Value::String(code.to_string()));
    desired.insert(Concept::LockerNumber.canonical_field().into(), Value::String(number));
    if let Some(wardrobe) = resolve_text(fields, Concept::Wardrobe) {
        desired.insert(Concept::Wardrobe.canonical_field().into(), Value::String(wardrobe));
    }
    Some(desired)
}

pub(super) async fn plan<S: RemoteStore + ?Sized>(
    reader: &EntityReader<'_, S>,
    settings: &RunSettings,
) -> Result<Plan, RosterSyncError> {
    let _tmr = timer!(Level::Trace; "jobs::lockers::plan");
    let collections = &settings.collections;

    let (master_read, locker_read) = tokio::try_join!(
        reader.read_all(&collections.employees),
        reader.read_all(&collections.lockers),
    )?;

    let mut plan = Plan::default();
    note_partial_read(&master_read, &mut plan);
    note_partial_read(&locker_read, &mut plan);

    let mut desired_by_employee: BTreeMap<String, Fields> = BTreeMap::new();
    for stored in &master_read.records {
        if !normalize::lifecycle(&stored.fields).is_active() {
            continue;
        }
        let Some(code) = resolve_text(&stored.fields, Concept::EmployeeCode) else {
            continue;
        };
        let Some(desired) = desired_locker(&code, &stored.fields) else {
            continue;
        };

        if desired_by_employee.contains_key(&code) {
            plan.warnings.push(DataQualityWarning::new(
                WarningKind::DuplicateSource,
                code,
                format!("employee record {} repeats an employee code; first record kept", stored.id),
            ));
            continue;
        }
        desired_by_employee.insert(code, desired);
    }

    // One active locker per employee: extra assignments go first
    let active = locker_read
        .records
        .into_iter()
        .filter(|r| normalize::lifecycle(&r.fields).is_active())
        .collect();
    let survivors = dedupe(active, &collections.lockers, &mut plan, |r| {
        resolve_text(&r.fields, Concept::EmployeeRef)
    });

    let existing_by_employee: BTreeMap<String, (String, Fields)> = survivors
        .iter()
        .filter_map(|r| {
            let employee = resolve_text(&r.fields, Concept::EmployeeRef)?;
            Some((employee, (r.id.clone(), project(&r.fields, &LOCKER_CONCEPTS))))
        })
        .collect();

    for (employee, desired) in &desired_by_employee {
        let existing = existing_by_employee
            .get(employee)
            .map(|(id, fields)| Existing { id, fields });
        plan.decisions
            .push(reconcile_single(&collections.lockers, employee, desired, existing));
    }

    debug!(
        "Lockers plan: {} decisions, {} duplicate deletes",
        plan.decisions.len(),
        plan.deletes.len()
    );
    Ok(plan)
}
