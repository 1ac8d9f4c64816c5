//! Reconciliation jobs.
//!
//! A job reads what it needs, normalizes and compares it, and returns a
//! [`Plan`]. [`run_job`] then hands the plan's writes to the executor and
//! folds the outcome into a report.

mod departments;
mod lockers;
mod roles;
mod skills;

use std::time::Duration;

use log::info;
use serde::Serialize;
use strum::{AsRefStr, Display, EnumIter, EnumString, IntoEnumIterator};

use crate::config::{CollectionsConfig, Config};
use crate::error::RosterSyncError;
use crate::executor::{MigrationExecutor, PlannedWrite};
use crate::model::StoredRecord;
use crate::reader::{CollectionRead, EntityReader};
use crate::reconcile::{resolve_duplicates, Retention, WriteOp};
use crate::report::{DataQualityWarning, Plan, ReconciliationReport, ReportBuilder, WarningKind};
use crate::store::RemoteStore;

#[derive(AsRefStr, Display, EnumIter, EnumString, Debug, PartialEq, Eq, Copy, Clone, Serialize)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    Skills,
    Lockers,
    Departments,
    Roles,
}

impl JobKind {
    pub fn description(&self) -> &'static str {
        match self {
            JobKind::Skills => {
                "Verify and migrate legacy machine slots into canonical skill assignments"
            }
            JobKind::Lockers => "Sync locker assignments from the employee master",
            JobKind::Departments => "Sync upstream department names into canonical departments",
            JobKind::Roles => "Remove duplicate role records, keeping the newest per code",
        }
    }

    pub fn parse(name: &str) -> Result<Self, RosterSyncError> {
        name.trim()
            .parse::<JobKind>()
            .map_err(|_| RosterSyncError::UnknownJob(name.to_string()))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct JobInfo {
    pub name: String,
    pub description: String,
}

pub fn list_jobs() -> Vec<JobInfo> {
    JobKind::iter()
        .map(|job| JobInfo {
            name: job.to_string(),
            description: job.description().to_string(),
        })
        .collect()
}

/// Per-run knobs, resolved from configuration and the request
#[derive(Debug, Clone)]
pub struct RunSettings {
    pub collections: CollectionsConfig,
    pub page_size: usize,
    pub sort_key: Option<String>,
    pub abort_on_read_error: bool,
    pub default_competency: u32,
    pub write_delay: Duration,
    pub dry_run: bool,
}

impl RunSettings {
    pub fn from_config(config: &Config) -> Self {
        RunSettings {
            collections: config.collections.clone(),
            page_size: config.reader.page_size,
            sort_key: config.reader.sort_key(),
            abort_on_read_error: config.reader.abort_on_error,
            default_competency: config.skills.default_competency_level,
            write_delay: config.executor.write_delay(),
            dry_run: config.executor.dry_run,
        }
    }

    fn reader<'a, S: RemoteStore + ?Sized>(&self, store: &'a S) -> EntityReader<'a, S> {
        EntityReader::new(store, self.page_size, self.abort_on_read_error)
            .sorted_by(self.sort_key.clone())
    }
}

/// Run one job end to end against `store`.
///
/// Read failures abort the run (unless configured otherwise) and surface as
/// the returned error. Write failures never do; they land in the report.
pub async fn run_job<S: RemoteStore + ?Sized>(
    store: &S,
    job: JobKind,
    settings: &RunSettings,
) -> Result<ReconciliationReport, RosterSyncError> {
    info!("Starting {} reconciliation (dry run: {})", job, settings.dry_run);
    let builder = ReportBuilder::start(job.to_string(), settings.dry_run);
    let reader = settings.reader(store);

    let plan = match job {
        JobKind::Skills => skills::plan(&reader, settings).await?,
        JobKind::Lockers => lockers::plan(&reader, settings).await?,
        JobKind::Departments => departments::plan(&reader, settings).await?,
        JobKind::Roles => roles::plan(&reader, settings).await?,
    };

    let executor = MigrationExecutor::new(store, settings.write_delay, settings.dry_run);
    let outcome = executor.apply(&plan.writes()).await;

    let report = builder.finish(plan, outcome);
    info!("{}", report.summary());
    Ok(report)
}

/// Warn about a collection whose read was cut short
fn note_partial_read(read: &CollectionRead, plan: &mut Plan) {
    if let Some(reason) = &read.interrupted {
        plan.warnings.push(DataQualityWarning::new(
            WarningKind::PartialRead,
            read.collection.clone(),
            format!("only {} records read: {}", read.records.len(), reason),
        ));
    }
}

/// Resolve duplicates among `records`, queue deletes for the losers, and
/// return the records that survive
fn dedupe<F>(
    records: Vec<StoredRecord>,
    collection: &str,
    plan: &mut Plan,
    key_of: F,
) -> Vec<StoredRecord>
where
    F: Fn(&StoredRecord) -> Option<String>,
{
    let retentions: Vec<Retention> = resolve_duplicates(&records, key_of);
    let doomed: Vec<&str> = retentions
        .iter()
        .flat_map(|r| r.delete.iter().map(String::as_str))
        .collect();

    for retention in &retentions {
        for id in &retention.delete {
            plan.deletes.push(PlannedWrite::new(
                format!("{} (duplicate of {})", retention.key, retention.keep),
                WriteOp::Delete {
                    collection: collection.to_string(),
                    id: id.clone(),
                },
            ));
        }
    }

    let survivors = records
        .into_iter()
        .filter(|r| !doomed.contains(&r.id.as_str()))
        .collect();
    plan.duplicates.extend(retentions);
    survivors
}
