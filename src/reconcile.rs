use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use serde_json::{json, Value};
use strum::{AsRefStr, Display, EnumIter, EnumString};

use crate::compare::Comparison;
use crate::model::{Fields, StoredRecord};
use crate::normalize::{CanonicalAssignment, Concept, LegacyPair};

#[derive(AsRefStr, Display, EnumIter, EnumString, Debug, PartialEq, Eq, Copy, Clone, Hash, Serialize)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DecisionKind {
    NoAction,
    Create,
    Update,
    FlagConflict,
    Skip,
}

/// A single remote write
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum WriteOp {
    Create { collection: String, fields: Fields },
    Update { collection: String, id: String, fields: Fields },
    Delete { collection: String, id: String },
}

impl WriteOp {
    pub fn collection(&self) -> &str {
        match self {
            WriteOp::Create { collection, .. }
            | WriteOp::Update { collection, .. }
            | WriteOp::Delete { collection, .. } => collection,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldChange {
    pub field: String,
    pub old: Option<Value>,
    pub new: Value,
}

/// Sets that disagree after normalization. Reported, never auto-resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Conflict {
    pub key: String,
    pub only_in_legacy: Vec<String>,
    pub only_in_canonical: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Decision {
    pub kind: DecisionKind,
    /// Identifying fields of the record the decision is about
    pub key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub write: Option<WriteOp>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub changes: Vec<FieldChange>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conflict: Option<Conflict>,
}

impl Decision {
    fn new(kind: DecisionKind, key: impl Into<String>) -> Self {
        Decision {
            kind,
            key: key.into(),
            write: None,
            changes: Vec::new(),
            conflict: None,
        }
    }
}

/// Survivor and losers among records sharing a natural key
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Retention {
    pub key: String,
    pub keep: String,
    pub delete: Vec<String>,
}

pub struct SkillPolicy {
    pub collection: String,
    pub default_competency: u32,
}

fn pair_key(employee_id: &str, machine_id: &str) -> String {
    format!("{}/{}", employee_id, machine_id)
}

/// Decide what to do with one employee's skill assignments.
///
/// - nothing on either side: NO_ACTION
/// - legacy pairs but no canonical assignments: one CREATE per machine
/// - incomplete canonical assignments: one UPDATE each, filling only the
///   missing fields
/// - machine sets disagree: one FLAG_CONFLICT carrying the diff
/// - otherwise NO_ACTION
pub fn reconcile_skills(
    employee_id: &str,
    legacy: &[LegacyPair],
    canonical: &[CanonicalAssignment],
    comparison: &Comparison,
    policy: &SkillPolicy,
) -> Vec<Decision> {
    if legacy.is_empty() && canonical.is_empty() {
        return vec![Decision::new(DecisionKind::NoAction, employee_id)];
    }

    if canonical.is_empty() {
        let mut seen = BTreeSet::new();
        return legacy
            .iter()
            .filter(|pair| seen.insert(pair.machine_id.as_str()))
            .map(|pair| {
                let mut fields = Fields::new();
                fields.insert(Concept::EmployeeRef.canonical_field().into(), json!(employee_id));
                fields.insert(Concept::MachineRef.canonical_field().into(), json!(pair.machine_id));
                fields.insert(Concept::PreferenceOrder.canonical_field().into(), json!(pair.preference_order));
                fields.insert(Concept::Competency.canonical_field().into(), json!(policy.default_competency));

                let mut decision = Decision::new(DecisionKind::Create, pair_key(employee_id, &pair.machine_id));
                decision.write = Some(WriteOp::Create {
                    collection: policy.collection.clone(),
                    fields,
                });
                decision
            })
            .collect();
    }

    let mut decisions = Vec::new();

    // Ranks for filling a missing order when legacy has no slot for the machine
    let canonical_rank: BTreeMap<&str, u32> = canonical
        .iter()
        .map(|a| a.machine_id.as_str())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .zip(1u32..)
        .collect();

    for incomplete in &comparison.incomplete {
        let mut fields = Fields::new();
        let mut changes = Vec::new();

        if incomplete.missing_order {
            let order = legacy
                .iter()
                .find(|p| p.machine_id == incomplete.machine_id)
                .map(|p| p.preference_order)
                .or_else(|| canonical_rank.get(incomplete.machine_id.as_str()).copied())
                .unwrap_or(1);
            let field = Concept::PreferenceOrder.canonical_field();
            fields.insert(field.into(), json!(order));
            changes.push(FieldChange { field: field.into(), old: None, new: json!(order) });
        }
        if incomplete.missing_competency {
            let field = Concept::Competency.canonical_field();
            fields.insert(field.into(), json!(policy.default_competency));
            changes.push(FieldChange {
                field: field.into(),
                old: None,
                new: json!(policy.default_competency),
            });
        }

        let mut decision = Decision::new(DecisionKind::Update, pair_key(employee_id, &incomplete.machine_id));
        decision.write = Some(WriteOp::Update {
            collection: policy.collection.clone(),
            id: incomplete.assignment_id.clone(),
            fields,
        });
        decision.changes = changes;
        decisions.push(decision);
    }

    if !comparison.coincide {
        let mut decision = Decision::new(DecisionKind::FlagConflict, employee_id);
        decision.conflict = Some(Conflict {
            key: employee_id.to_string(),
            only_in_legacy: comparison.only_in_legacy.clone(),
            only_in_canonical: comparison.only_in_canonical.clone(),
        });
        decisions.push(decision);
    }

    if decisions.is_empty() {
        decisions.push(Decision::new(DecisionKind::NoAction, employee_id));
    }
    decisions
}

/// Existing single-valued target, already projected onto canonical names
pub struct Existing<'a> {
    pub id: &'a str,
    pub fields: &'a Fields,
}

/// CREATE / UPDATE / SKIP for a key that maps to at most one target record.
///
/// Every field the source provides in `desired` is compared by exact
/// equality. Fields the source leaves out are never cleared on the target.
pub fn reconcile_single(
    collection: &str,
    key: &str,
    desired: &Fields,
    existing: Option<Existing<'_>>,
) -> Decision {
    let Some(existing) = existing else {
        let mut decision = Decision::new(DecisionKind::Create, key);
        decision.changes = desired
            .iter()
            .map(|(field, value)| FieldChange { field: field.clone(), old: None, new: value.clone() })
            .collect();
        decision.write = Some(WriteOp::Create {
            collection: collection.to_string(),
            fields: desired.clone(),
        });
        return decision;
    };

    let changes: Vec<FieldChange> = desired
        .iter()
        .filter(|(field, value)| existing.fields.get(field.as_str()) != Some(*value))
        .map(|(field, value)| FieldChange {
            field: field.clone(),
            old: existing.fields.get(field.as_str()).cloned(),
            new: value.clone(),
        })
        .collect();

    if changes.is_empty() {
        return Decision::new(DecisionKind::Skip, key);
    }

    let fields: Fields = changes
        .iter()
        .map(|c| (c.field.clone(), c.new.clone()))
        .collect();

    let mut decision = Decision::new(DecisionKind::Update, key);
    decision.write = Some(WriteOp::Update {
        collection: collection.to_string(),
        id: existing.id.to_string(),
        fields,
    });
    decision.changes = changes;
    decision
}

/// Group records by natural key and keep the newest of each group.
///
/// The survivor has the greatest creation timestamp; a missing or
/// unparseable timestamp counts as oldest and equal timestamps fall back to
/// the greatest storage id. Groups of one produce nothing, so the sole
/// record for a key is never marked. Records without a key are ignored.
pub fn resolve_duplicates<F>(records: &[StoredRecord], key_of: F) -> Vec<Retention>
where
    F: Fn(&StoredRecord) -> Option<String>,
{
    let mut groups: BTreeMap<String, Vec<&StoredRecord>> = BTreeMap::new();
    for record in records {
        if let Some(key) = key_of(record) {
            groups.entry(key).or_default().push(record);
        }
    }

    groups
        .into_iter()
        .filter(|(_, group)| group.len() > 1)
        .filter_map(|(key, group)| {
            let survivor = group
                .iter()
                .max_by(|a, b| (a.created_at(), a.id.as_str()).cmp(&(b.created_at(), b.id.as_str())))?;
            let delete = group
                .iter()
                .filter(|r| r.id != survivor.id)
                .map(|r| r.id.clone())
                .collect();
            Some(Retention {
                key,
                keep: survivor.id.clone(),
                delete,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compare::compare;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn policy() -> SkillPolicy {
        SkillPolicy {
            collection: "EmployeeMachineSkill".into(),
            default_competency: 1,
        }
    }

    fn pair(machine: &str, order: u32) -> LegacyPair {
        LegacyPair { employee_id: "E1".into(), machine_id: machine.into(), preference_order: order }
    }

    fn assignment(id: &str, machine: &str, order: Option<u32>, competency: Option<u32>) -> CanonicalAssignment {
        CanonicalAssignment {
            id: id.into(),
            employee_id: "E1".into(),
            machine_id: machine.into(),
            preference_order: order,
            competency,
            created_date: None,
        }
    }

    fn run(legacy: &[LegacyPair], canonical: &[CanonicalAssignment]) -> Vec<Decision> {
        reconcile_skills("E1", legacy, canonical, &compare(legacy, canonical), &policy())
    }

    fn kinds(decisions: &[Decision]) -> Vec<DecisionKind> {
        decisions.iter().map(|d| d.kind).collect()
    }

    #[test]
    fn test_decision_kind_strings() {
        assert_eq!(DecisionKind::NoAction.to_string(), "NO_ACTION");
        assert_eq!(DecisionKind::FlagConflict.as_ref(), "FLAG_CONFLICT");
        assert_eq!("SKIP".parse::<DecisionKind>().unwrap(), DecisionKind::Skip);
    }

    #[test]
    fn test_scenario_a_two_creates_in_slot_order() {
        let decisions = run(&[pair("M7", 1), pair("M3", 2)], &[]);

        assert_eq!(kinds(&decisions), [DecisionKind::Create, DecisionKind::Create]);
        let orders: Vec<_> = decisions
            .iter()
            .map(|d| match &d.write {
                Some(WriteOp::Create { fields, .. }) => {
                    (fields["machine_id"].clone(), fields["orden_preferencia"].clone())
                }
                other => panic!("expected create, got {:?}", other),
            })
            .collect();
        assert_eq!(orders, [(json!("M7"), json!(1)), (json!("M3"), json!(2))]);
    }

    #[test]
    fn test_duplicate_legacy_slot_creates_once() {
        let decisions = run(&[pair("M7", 1), pair("M7", 2)], &[]);
        assert_eq!(kinds(&decisions), [DecisionKind::Create]);
    }

    #[test]
    fn test_scenario_b_missing_order_is_update() {
        let decisions = run(&[pair("M7", 1)], &[assignment("s1", "M7", None, Some(3))]);

        assert_eq!(kinds(&decisions), [DecisionKind::Update]);
        assert_eq!(
            decisions[0].write,
            Some(WriteOp::Update {
                collection: "EmployeeMachineSkill".into(),
                id: "s1".into(),
                fields: [("orden_preferencia".to_string(), json!(1))].into_iter().collect(),
            })
        );
    }

    #[test]
    fn test_missing_order_without_legacy_slot_uses_canonical_rank() {
        let canonical = [
            assignment("s1", "M2", Some(1), Some(1)),
            assignment("s2", "M9", None, None),
        ];
        let decisions = run(&[], &canonical);

        // Sets disagree (legacy empty) and s2 is incomplete
        assert_eq!(kinds(&decisions), [DecisionKind::Update, DecisionKind::FlagConflict]);
        let Some(WriteOp::Update { fields, .. }) = &decisions[0].write else {
            panic!("expected update");
        };
        assert_eq!(fields["orden_preferencia"], json!(2));
        assert_eq!(fields["nivel_competencia"], json!(1));
    }

    #[test]
    fn test_disagreeing_sets_flag_conflict_without_writes() {
        let decisions = run(&[pair("M7", 1)], &[assignment("s1", "M3", Some(1), Some(2))]);

        assert_eq!(kinds(&decisions), [DecisionKind::FlagConflict]);
        assert!(decisions[0].write.is_none());
        assert_eq!(
            decisions[0].conflict,
            Some(Conflict {
                key: "E1".into(),
                only_in_legacy: vec!["M7".into()],
                only_in_canonical: vec!["M3".into()],
            })
        );
    }

    #[test]
    fn test_agreeing_complete_sets_need_no_action() {
        let decisions = run(
            &[pair("M7", 1), pair("M3", 2)],
            &[assignment("a", "M3", Some(2), Some(1)), assignment("b", "M7", Some(1), Some(4))],
        );
        assert_eq!(kinds(&decisions), [DecisionKind::NoAction]);
        assert_eq!(kinds(&run(&[], &[])), [DecisionKind::NoAction]);
    }

    fn fields(pairs: &[(&str, &str)]) -> Fields {
        pairs.iter().map(|(k, v)| (k.to_string(), json!(v))).collect()
    }

    #[test]
    fn test_single_valued_create_update_skip() {
        let desired = fields(&[("codigo", "D1"), ("department_name", "PRODUCCIÓN")]);

        let created = reconcile_single("Department", "D1", &desired, None);
        assert_eq!(created.kind, DecisionKind::Create);

        let same = desired.clone();
        let skipped = reconcile_single("Department", "D1", &desired, Some(Existing { id: "x", fields: &same }));
        assert_eq!(skipped.kind, DecisionKind::Skip);
        assert!(skipped.write.is_none());

        // Scenario D: stored FABRICACION, source now PRODUCCIÓN
        let stale = fields(&[("codigo", "D1"), ("department_name", "FABRICACION")]);
        let updated = reconcile_single("Department", "D1", &desired, Some(Existing { id: "x", fields: &stale }));
        assert_eq!(updated.kind, DecisionKind::Update);
        assert_eq!(
            updated.changes,
            vec![FieldChange {
                field: "department_name".into(),
                old: Some(json!("FABRICACION")),
                new: json!("PRODUCCIÓN"),
            }]
        );
    }

    #[test]
    fn test_single_valued_does_not_clear_fields_the_source_lacks() {
        let desired = fields(&[("employee_id", "E1"), ("numero_taquilla", "14")]);
        let stored = fields(&[("employee_id", "E1"), ("numero_taquilla", "14"), ("vestuario", "B")]);

        let decision = reconcile_single("LockerAssignment", "E1", &desired, Some(Existing { id: "l1", fields: &stored }));
        assert_eq!(decision.kind, DecisionKind::Skip);
    }

    fn role(id: &str, code: &str, created: Option<&str>) -> StoredRecord {
        let record = StoredRecord::new(id, fields(&[("role_id", code)]));
        match created {
            Some(ts) => record.with_created_date(ts),
            None => record,
        }
    }

    fn role_key(record: &StoredRecord) -> Option<String> {
        record.field("role_id").and_then(|v| v.as_str()).map(str::to_string)
    }

    #[test]
    fn test_scenario_c_newest_duplicate_survives() {
        let records = [
            role("r1", "ADMIN", Some("2024-01-01T00:00:00Z")),
            role("r3", "ADMIN", Some("2024-03-01T00:00:00Z")),
            role("r2", "ADMIN", Some("2024-02-01T00:00:00Z")),
            role("u1", "USER", Some("2024-01-01T00:00:00Z")),
        ];

        let retentions = resolve_duplicates(&records, role_key);
        assert_eq!(
            retentions,
            vec![Retention {
                key: "ADMIN".into(),
                keep: "r3".into(),
                delete: vec!["r1".into(), "r2".into()],
            }]
        );
    }

    #[test]
    fn test_missing_timestamp_counts_as_oldest() {
        let records = [role("a", "X", None), role("b", "X", Some("2020-01-01T00:00:00Z"))];
        let retentions = resolve_duplicates(&records, role_key);
        assert_eq!(retentions[0].keep, "b");
        assert_eq!(retentions[0].delete, vec!["a".to_string()]);
    }

    #[test]
    fn test_single_record_is_never_marked() {
        let records = [role("a", "X", None)];
        assert!(resolve_duplicates(&records, role_key).is_empty());
    }

    proptest! {
        #[test]
        fn prop_exactly_one_survivor_per_key(
            entries in proptest::collection::vec((0u8..4, 0u32..1000), 1..30)
        ) {
            let records: Vec<StoredRecord> = entries
                .iter()
                .enumerate()
                .map(|(i, (key, secs))| {
                    let created = chrono::DateTime::from_timestamp(*secs as i64, 0).unwrap().to_rfc3339();
                    role(&format!("id{:03}", i), &format!("K{}", key), Some(&created))
                })
                .collect();

            let retentions = resolve_duplicates(&records, role_key);
            for retention in &retentions {
                let group: Vec<&StoredRecord> =
                    records.iter().filter(|r| role_key(r).as_deref() == Some(retention.key.as_str())).collect();
                prop_assert!(group.len() > 1);
                prop_assert_eq!(retention.delete.len(), group.len() - 1);
                prop_assert!(!retention.delete.contains(&retention.keep));

                let newest = group.iter().map(|r| r.created_at()).max().unwrap();
                let survivor = group.iter().find(|r| r.id == retention.keep).unwrap();
                prop_assert_eq!(survivor.created_at(), newest);
            }
            let marked_keys = retentions.len();
            let duplicate_keys = {
                let mut counts = BTreeMap::new();
                for r in &records { *counts.entry(role_key(r)).or_insert(0) += 1; }
                counts.values().filter(|c| **c > 1).count()
            };
            prop_assert_eq!(marked_keys, duplicate_keys);
        }
    }
}
