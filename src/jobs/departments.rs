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

const DEPARTMENT_CONCEPTS: [Concept; 2] = [Concept::DepartmentCode, Concept::DepartmentName];

/// Canonical department names are stored uppercased
pub fn canonical_department_name(name: &str) -> String {
    name.trim().to_uppercase()
}

pub(super) async fn plan<S: RemoteStore + ?Sized>(
    reader: &EntityReader<'_, S>,
    settings: &RunSettings,
) -> Result<Plan, RosterSyncError> {
    let _tmr = timer!(Level::Trace; "jobs::departments::plan");
    let collections = &settings.collections;

    let (source_read, target_read) = tokio::try_join!(
        reader.read_all(&collections.department_source),
        reader.read_all(&collections.departments),
    )?;

    let mut plan = Plan::default();
    note_partial_read(&source_read, &mut plan);
    note_partial_read(&target_read, &mut plan);

    let mut desired_by_code: BTreeMap<String, Fields> = BTreeMap::new();
    for stored in &source_read.records {
        if !normalize::lifecycle(&stored.fields).is_active() {
            continue;
        }
        let code = resolve_text(&stored.fields, Concept::DepartmentCode);
        let name = resolve_text(&stored.fields, Concept::DepartmentName);
        let (Some(code), Some(name)) = (code, name) else {
            plan.warnings.push(DataQualityWarning::new(
                WarningKind::MissingIdentity,
                stored.id.clone(),
                "department source record lacks a code or a name",
            ));
            continue;
        };

        if desired_by_code.contains_key(&code) {
            plan.warnings.push(DataQualityWarning::new(
                WarningKind::DuplicateSource,
                code,
                format!("department record {} repeats a code; first record kept", stored.id),
            ));
            continue;
        }

        let mut desired = Fields::new();
        desired.insert(Concept::DepartmentCode.canonical_field().into(), Value::String(code.clone()));
        desired.insert(
            Concept::DepartmentName.canonical_field().into(),
            Value::String(canonical_department_name(&name)),
        );
        desired_by_code.insert(code, desired);
    }

    let active = target_read
        .records
        .into_iter()
        .filter(|r| normalize::lifecycle(&r.fields).is_active())
        .collect();
    let survivors = dedupe(active, &collections.departments, &mut plan, |r| {
        resolve_text(&r.fields, Concept::DepartmentCode)
    });

    let existing_by_code: BTreeMap<String, (String, Fields)> = survivors
        .iter()
        .filter_map(|r| {
            let code = resolve_text(&r.fields, Concept::DepartmentCode)?;
            Some((code, (r.id.clone(), project(&r.fields, &DEPARTMENT_CONCEPTS))))
        })
        .collect();

    for (code, desired) in &desired_by_code {
        let existing = existing_by_code
            .get(code)
            .map(|(id, fields)| Existing { id, fields });
        plan.decisions
            .push(reconcile_single(&collections.departments, code, desired, existing));
    }

    debug!("Departments plan: {} decisions", plan.decisions.len());
    Ok(plan)
}
