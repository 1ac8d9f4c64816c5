use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet};

use log::{debug, Level};
use logging_timer::timer;

use super::{dedupe, note_partial_read, RunSettings};
use crate::compare::compare;
use crate::error::RosterSyncError;
use crate::normalize::{self, canonical_assignment, legacy_pairs, CanonicalAssignment, LegacyPair, LegacyRecord};
use crate::reader::EntityReader;
use crate::reconcile::{reconcile_skills, SkillPolicy};
use crate::report::{DataQualityWarning, Plan, WarningKind};
use crate::store::RemoteStore;

pub(super) async fn plan<S: RemoteStore + ?Sized>(
    reader: &EntityReader<'_, S>,
    settings: &RunSettings,
) -> Result<Plan, RosterSyncError> {
    let _tmr = timer!(Level::Trace; "jobs::skills::plan");
    let collections = &settings.collections;

    let (legacy_read, canonical_read) = tokio::try_join!(
        reader.read_all(&collections.employees),
        reader.read_all(&collections.skills),
    )?;

    let mut plan = Plan::default();
    note_partial_read(&legacy_read, &mut plan);
    note_partial_read(&canonical_read, &mut plan);

    let mut legacy_by_employee: BTreeMap<String, Vec<LegacyPair>> = BTreeMap::new();
    for stored in &legacy_read.records {
        let legacy = LegacyRecord::from_stored(stored);
        if !legacy.lifecycle.is_active() {
            continue;
        }

        let Some(code) = legacy.employee_code.clone() else {
            if legacy.non_empty_slots() > 0 {
                plan.warnings.push(DataQualityWarning::new(
                    WarningKind::MissingIdentity,
                    stored.id.clone(),
                    "legacy record has machine slots but no employee code",
                ));
            }
            continue;
        };

        match legacy_by_employee.entry(code) {
            Entry::Vacant(slot) => {
                slot.insert(legacy_pairs(&legacy));
            }
            Entry::Occupied(slot) => {
                plan.warnings.push(DataQualityWarning::new(
                    WarningKind::DuplicateSource,
                    slot.key().clone(),
                    format!("legacy record {} repeats an employee code; first record kept", stored.id),
                ));
            }
        }
    }

    let active = canonical_read
        .records
        .into_iter()
        .filter(|r| normalize::lifecycle(&r.fields).is_active())
        .collect();
    let survivors = dedupe(active, &collections.skills, &mut plan, |r| {
        canonical_assignment(r).map(|a| format!("{}/{}", a.employee_id, a.machine_id))
    });

    let mut canonical_by_employee: BTreeMap<String, Vec<CanonicalAssignment>> = BTreeMap::new();
    for stored in &survivors {
        match canonical_assignment(stored) {
            Some(assignment) => canonical_by_employee
                .entry(assignment.employee_id.clone())
                .or_default()
                .push(assignment),
            None => plan.warnings.push(DataQualityWarning::new(
                WarningKind::MissingIdentity,
                stored.id.clone(),
                "skill assignment lacks an employee or machine reference",
            )),
        }
    }

    let policy = SkillPolicy {
        collection: collections.skills.clone(),
        default_competency: settings.default_competency,
    };

    let employees: BTreeSet<&String> = legacy_by_employee
        .keys()
        .chain(canonical_by_employee.keys())
        .collect();

    for employee in employees {
        let legacy = legacy_by_employee.get(employee).map(Vec::as_slice).unwrap_or(&[]);
        let canonical = canonical_by_employee.get(employee).map(Vec::as_slice).unwrap_or(&[]);

        let comparison = compare(legacy, canonical);
        for incomplete in &comparison.incomplete {
            let missing = match (incomplete.missing_competency, incomplete.missing_order) {
                (true, true) => "competency level and preference order",
                (true, false) => "competency level",
                _ => "preference order",
            };
            plan.warnings.push(DataQualityWarning::new(
                WarningKind::IncompleteAssignment,
                format!("{}/{}", employee, incomplete.machine_id),
                format!("assignment {} is missing {}", incomplete.assignment_id, missing),
            ));
        }

        plan.decisions
            .extend(reconcile_skills(employee, legacy, canonical, &comparison, &policy));
    }

    debug!(
        "Skills plan: {} decisions, {} duplicate deletes, {} warnings",
        plan.decisions.len(),
        plan.deletes.len(),
        plan.warnings.len()
    );
    Ok(plan)
}

#[cfg(test)]
mod tests {
    use crate::jobs::test_support::{record, seed, settings};
    use crate::jobs::{run_job, JobKind};
    use crate::report::WarningKind;
    use crate::store::MemoryStore;
    use serde_json::json;

    const EMPLOYEES: &str = "EmployeeMasterDatabase";
    const SKILLS: &str = "EmployeeMachineSkill";

    fn store() -> MemoryStore {
        let store = MemoryStore::new();
        seed(
            &store,
            EMPLOYEES,
            vec![
                // Scenario A: two slots, nothing canonical yet
                record("e1", "2023-01-01T00:00:00Z", json!({
                    "codigo_empleado": "E001", "maquina_1": "M7", "maquina_2": "M3", "maquina_3": ""
                })),
                // Already migrated, one assignment missing its order
                record("e2", "2023-01-01T00:00:00Z", json!({
                    "codigo_empleado": "E002", "maquina_1": "M1"
                })),
                // Disagrees with canonical
                record("e3", "2023-01-01T00:00:00Z", json!({
                    "codigo_empleado": "E003", "maquina_1": "M4"
                })),
                // Deprecated records are not a source
                record("e4", "2023-01-01T00:00:00Z", json!({
                    "codigo_empleado": "E004", "maquina_1": "M4", "lifecycle_status": "deprecated"
                })),
            ],
        );
        seed(
            &store,
            SKILLS,
            vec![
                record("s1", "2023-02-01T00:00:00Z", json!({
                    "employee_id": "E002", "machine_id": "M1", "nivel_habilidad": 2
                })),
                record("s2", "2023-02-01T00:00:00Z", json!({
                    "employee_id": "E003", "machine_id": "M5", "nivel_competencia": 1, "orden_preferencia": 1
                })),
                // Older duplicate of s2's pair
                record("s0", "2022-02-01T00:00:00Z", json!({
                    "employee_id": "E003", "machine_id": "M5", "nivel_competencia": 3, "orden_preferencia": 1
                })),
            ],
        );
        store
    }

    #[tokio::test]
    async fn test_skills_run_applies_expected_writes() {
        let store = store();
        let report = run_job(&store, JobKind::Skills, &settings()).await.unwrap();

        assert_eq!(report.decisions.create, 2);
        assert_eq!(report.decisions.update, 1);
        assert_eq!(report.decisions.flag_conflict, 1);
        assert_eq!(report.decisions.duplicates_marked, 1);
        assert_eq!(report.writes.created, 2);
        assert_eq!(report.writes.updated, 1);
        assert_eq!(report.writes.deleted, 1);
        assert!(report.errors.is_empty());

        let conflict = &report.conflicts[0];
        assert_eq!(conflict.key, "E003");
        assert_eq!(conflict.only_in_legacy, ["M4"]);
        assert_eq!(conflict.only_in_canonical, ["M5"]);

        assert!(report
            .warnings
            .iter()
            .any(|w| w.kind == WarningKind::IncompleteAssignment && w.key == "E002/M1"));

        let skills = store.records(SKILLS);
        assert!(skills.iter().all(|r| r.id != "s0"));
        let s1 = skills.iter().find(|r| r.id == "s1").unwrap();
        assert_eq!(s1.field("orden_preferencia"), Some(&json!(1)));
        // Competency already present under an alias, so it is left alone
        assert!(s1.field("nivel_competencia").is_none());

        let created: Vec<_> = skills
            .iter()
            .filter(|r| r.field("employee_id") == Some(&json!("E001")))
            .map(|r| (r.field("machine_id").cloned(), r.field("orden_preferencia").cloned()))
            .collect();
        assert_eq!(
            created,
            [(Some(json!("M7")), Some(json!(1))), (Some(json!("M3")), Some(json!(2)))]
        );
    }

    #[tokio::test]
    async fn test_second_run_is_quiet() {
        let store = store();
        run_job(&store, JobKind::Skills, &settings()).await.unwrap();
        let writes_after_first = store.write_calls();

        let second = run_job(&store, JobKind::Skills, &settings()).await.unwrap();

        assert_eq!(store.write_calls(), writes_after_first);
        assert!(second.applied.is_empty());
        assert_eq!(second.decisions.create, 0);
        assert_eq!(second.decisions.update, 0);
        // Conflicts are never auto-resolved, so they are reported again
        assert_eq!(second.decisions.flag_conflict, 1);
        assert_eq!(second.decisions.no_action, 2);
    }

    #[tokio::test]
    async fn test_unreadable_collection_aborts_before_writes() {
        let store = store();
        store.make_unreachable(SKILLS);

        let result = run_job(&store, JobKind::Skills, &settings()).await;
        assert!(result.is_err());
        assert_eq!(store.write_calls(), 0);
    }

    #[tokio::test]
    async fn test_decisions_stay_in_the_known_domain() {
        let store = store();
        let report = run_job(&store, JobKind::Skills, &settings()).await.unwrap();
        let total = report.decisions.no_action
            + report.decisions.create
            + report.decisions.update
            + report.decisions.flag_conflict
            + report.decisions.skip;
        // E001 x2 creates, E002 update, E003 conflict
        assert_eq!(total, 4);
        assert!(report.applied.iter().all(|w| w.key.starts_with('E')));
    }
}
