use chrono::{DateTime, Utc};
use serde::Serialize;
use strum::{AsRefStr, Display};

use crate::executor::{ExecutionOutcome, PlannedWrite, RecordError};
use crate::reconcile::{Conflict, Decision, DecisionKind, Retention, WriteOp};

#[derive(AsRefStr, Display, Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    IncompleteAssignment,
    MissingIdentity,
    DuplicateSource,
    PartialRead,
}

/// Non-fatal finding. Never blocks a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DataQualityWarning {
    pub kind: WarningKind,
    pub key: String,
    pub message: String,
}

impl DataQualityWarning {
    pub fn new(kind: WarningKind, key: impl Into<String>, message: impl Into<String>) -> Self {
        DataQualityWarning {
            kind,
            key: key.into(),
            message: message.into(),
        }
    }
}

/// Everything a job decided, before anything is written
#[derive(Debug, Default)]
pub struct Plan {
    pub decisions: Vec<Decision>,
    pub duplicates: Vec<Retention>,
    pub deletes: Vec<PlannedWrite>,
    pub warnings: Vec<DataQualityWarning>,
}

impl Plan {
    /// Duplicate removals first, then decision writes in decision order.
    /// Each decision write carries the field diff that produced it.
    pub fn writes(&self) -> Vec<PlannedWrite> {
        let mut writes = self.deletes.clone();
        writes.extend(self.decisions.iter().filter_map(|d| {
            let op = d.write.clone()?;
            Some(PlannedWrite::new(d.key.clone(), op).with_changes(d.changes.clone()))
        }));
        writes
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DecisionCounts {
    pub no_action: usize,
    pub create: usize,
    pub update: usize,
    pub flag_conflict: usize,
    pub skip: usize,
    pub duplicates_marked: usize,
}

impl DecisionCounts {
    fn count(decisions: &[Decision], duplicates: &[Retention]) -> Self {
        let mut counts = DecisionCounts {
            duplicates_marked: duplicates.iter().map(|r| r.delete.len()).sum(),
            ..Default::default()
        };
        for decision in decisions {
            let target = match decision.kind {
                DecisionKind::NoAction => &mut counts.no_action,
                DecisionKind::Create => &mut counts.create,
                DecisionKind::Update => &mut counts.update,
                DecisionKind::FlagConflict => &mut counts.flag_conflict,
                DecisionKind::Skip => &mut counts.skip,
            };
            *target += 1;
        }
        counts
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WriteCounts {
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconciliationReport {
    pub job: String,
    pub dry_run: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub decisions: DecisionCounts,
    pub writes: WriteCounts,
    /// Writes that reached the store (or would have, in a dry run)
    pub applied: Vec<PlannedWrite>,
    pub conflicts: Vec<Conflict>,
    pub duplicates: Vec<Retention>,
    pub warnings: Vec<DataQualityWarning>,
    pub errors: Vec<RecordError>,
}

impl ReconciliationReport {
    pub fn summary(&self) -> String {
        format!(
            "{}: {} created, {} updated, {} deleted, {} skipped, {} unchanged, {} conflicts, {} warnings, {} errors{}",
            self.job,
            self.writes.created,
            self.writes.updated,
            self.writes.deleted,
            self.decisions.skip,
            self.decisions.no_action,
            self.decisions.flag_conflict,
            self.warnings.len(),
            self.errors.len(),
            if self.dry_run { " (dry run)" } else { "" }
        )
    }
}

pub struct ReportBuilder {
    job: String,
    dry_run: bool,
    started_at: DateTime<Utc>,
}

impl ReportBuilder {
    pub fn start(job: impl Into<String>, dry_run: bool) -> Self {
        ReportBuilder {
            job: job.into(),
            dry_run,
            started_at: Utc::now(),
        }
    }

    pub fn finish(self, plan: Plan, outcome: ExecutionOutcome) -> ReconciliationReport {
        self.finish_at(plan, outcome, Utc::now())
    }

    pub fn finish_at(
        self,
        plan: Plan,
        outcome: ExecutionOutcome,
        finished_at: DateTime<Utc>,
    ) -> ReconciliationReport {
        // A dry run reports what it would have written
        let applied = if self.dry_run { plan.writes() } else { outcome.applied };

        let mut writes = WriteCounts {
            failed: outcome.errors.len(),
            ..Default::default()
        };
        for write in &applied {
            match write.op {
                WriteOp::Create { .. } => writes.created += 1,
                WriteOp::Update { .. } => writes.updated += 1,
                WriteOp::Delete { .. } => writes.deleted += 1,
            }
        }

        let decisions = DecisionCounts::count(&plan.decisions, &plan.duplicates);
        let conflicts = plan
            .decisions
            .into_iter()
            .filter_map(|d| d.conflict)
            .collect();

        ReconciliationReport {
            job: self.job,
            dry_run: self.dry_run,
            started_at: self.started_at,
            finished_at,
            decisions,
            writes,
            applied,
            conflicts,
            duplicates: plan.duplicates,
            warnings: plan.warnings,
            errors: outcome.errors,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reconcile::FieldChange;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn decision(kind: DecisionKind, key: &str, write: Option<WriteOp>) -> Decision {
        Decision {
            kind,
            key: key.into(),
            write,
            changes: vec![],
            conflict: None,
        }
    }

    fn sample_plan() -> Plan {
        let create = WriteOp::Create { collection: "Department".into(), fields: Default::default() };
        let update = WriteOp::Update { collection: "Department".into(), id: "d2".into(), fields: Default::default() };
        let mut conflict = decision(DecisionKind::FlagConflict, "E1", None);
        conflict.conflict = Some(Conflict {
            key: "E1".into(),
            only_in_legacy: vec!["M1".into()],
            only_in_canonical: vec![],
        });

        Plan {
            decisions: vec![
                decision(DecisionKind::Create, "D1", Some(create)),
                decision(DecisionKind::Update, "D2", Some(update)),
                decision(DecisionKind::Skip, "D3", None),
                conflict,
            ],
            duplicates: vec![Retention { key: "D9".into(), keep: "x".into(), delete: vec!["y".into()] }],
            deletes: vec![PlannedWrite::new(
                "D9",
                WriteOp::Delete { collection: "Department".into(), id: "y".into() },
            )],
            warnings: vec![],
        }
    }

    #[test]
    fn test_plan_writes_put_deletes_first() {
        let writes = sample_plan().writes();
        let keys: Vec<_> = writes.iter().map(|w| w.key.as_str()).collect();
        assert_eq!(keys, ["D9", "D1", "D2"]);
    }

    #[test]
    fn test_counts_by_kind_and_outcome() {
        let plan = sample_plan();
        let outcome = ExecutionOutcome {
            applied: plan.writes().into_iter().take(2).collect(),
            errors: vec![RecordError {
                key: "D2".into(),
                collection: "Department".into(),
                id: Some("d2".into()),
                error: "boom".into(),
            }],
        };

        let report = ReportBuilder::start("departments", false).finish(plan, outcome);
        assert_eq!(
            report.decisions,
            DecisionCounts { no_action: 0, create: 1, update: 1, flag_conflict: 1, skip: 1, duplicates_marked: 1 }
        );
        assert_eq!(report.writes, WriteCounts { created: 1, updated: 0, deleted: 1, failed: 1 });
        assert_eq!(report.conflicts.len(), 1);
        assert!(report.finished_at >= report.started_at);
    }

    #[test]
    fn test_dry_run_reports_planned_writes() {
        let report = ReportBuilder::start("departments", true).finish(sample_plan(), ExecutionOutcome::default());
        assert_eq!(report.writes, WriteCounts { created: 1, updated: 1, deleted: 1, failed: 0 });
        assert!(report.summary().ends_with("(dry run)"));
    }

    #[test]
    fn test_applied_writes_keep_old_and_new_values() {
        let mut plan = Plan::default();
        let mut update = decision(
            DecisionKind::Update,
            "D10",
            Some(WriteOp::Update {
                collection: "Department".into(),
                id: "d1".into(),
                fields: [("department_name".to_string(), json!("PRODUCCIÓN"))].into_iter().collect(),
            }),
        );
        update.changes = vec![FieldChange {
            field: "department_name".into(),
            old: Some(json!("FABRICACION")),
            new: json!("PRODUCCIÓN"),
        }];
        plan.decisions.push(update);

        let outcome = ExecutionOutcome { applied: plan.writes(), errors: vec![] };
        let report = ReportBuilder::start("departments", false).finish(plan, outcome);
        let value = serde_json::to_value(&report).unwrap();

        assert_eq!(
            value["applied"][0]["changes"],
            json!([{"field": "department_name", "old": "FABRICACION", "new": "PRODUCCIÓN"}])
        );
    }

    #[test]
    fn test_report_json_shape() {
        let report = ReportBuilder::start("roles", false).finish(Plan::default(), ExecutionOutcome::default());
        let value = serde_json::to_value(&report).unwrap();

        assert_eq!(value["job"], json!("roles"));
        assert_eq!(value["decisions"]["skip"], json!(0));
        assert!(value["errors"].as_array().unwrap().is_empty());
    }
}
