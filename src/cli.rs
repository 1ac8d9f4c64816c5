use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use log::info;

use crate::api::AppState;
use crate::config::Config;
use crate::error::RosterSyncError;
use crate::jobs::{list_jobs, run_job, JobKind, RunSettings};
use crate::report::ReconciliationReport;
use crate::store::{HttpStore, MemoryStore};

#[derive(Parser)]
#[command(
    name = "rostersync",
    version,
    about = "RosterSync: reconcile legacy workforce records into canonical collections"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Start the server (default if no command specified)
    Serve,

    /// Run one reconciliation job and print its report
    Run {
        /// Job name (see `jobs`)
        job: String,

        /// Plan and report without writing anything
        #[arg(long = "dry-run", default_value_t = false)]
        dry_run: bool,

        /// Run against a JSON snapshot instead of the configured backend
        #[arg(long = "snapshot", short = 's')]
        snapshot: Option<PathBuf>,

        /// Save the snapshot store's state after the run (requires 'snapshot')
        #[arg(long = "write-snapshot", requires = "snapshot")]
        write_snapshot: Option<PathBuf>,
    },

    /// List the available reconciliation jobs
    Jobs,
}

impl Cli {
    pub fn handle_command_line() -> Result<(), RosterSyncError> {
        let args = Cli::parse();

        // Default to Serve if no command specified
        match args.command.unwrap_or(Command::Serve) {
            Command::Serve => Self::start_server(),
            Command::Run {
                job,
                dry_run,
                snapshot,
                write_snapshot,
            } => Self::run(&job, dry_run, snapshot.as_deref(), write_snapshot.as_deref()),
            Command::Jobs => {
                for job in list_jobs() {
                    println!("{:<12} {}", job.name, job.description);
                }
                Ok(())
            }
        }
    }

    fn runtime() -> Result<tokio::runtime::Runtime, RosterSyncError> {
        tokio::runtime::Runtime::new()
            .map_err(|e| RosterSyncError::Error(format!("Failed to create runtime: {}", e)))
    }

    fn start_server() -> Result<(), RosterSyncError> {
        let config = Config::get();
        let host = Config::get_server_host();
        let port = Config::get_server_port();

        let store = HttpStore::new(&config.store)?;
        let state = AppState::new(Arc::new(store), RunSettings::from_config(&config));

        info!("Starting server on {}:{}", host, port);

        let rt = Self::runtime()?;
        rt.block_on(async {
            let web_server = crate::server::WebServer::new(host, port, state);
            web_server.start().await
        })
    }

    fn run(
        job: &str,
        dry_run: bool,
        snapshot: Option<&Path>,
        write_snapshot: Option<&Path>,
    ) -> Result<(), RosterSyncError> {
        let job = JobKind::parse(job)?;
        let config = Config::get();
        let mut settings = RunSettings::from_config(&config);
        settings.dry_run |= dry_run;

        let rt = Self::runtime()?;
        let report = match snapshot {
            Some(path) => rt.block_on(run_on_snapshot(job, &settings, path, write_snapshot))?,
            None => {
                let store = HttpStore::new(&config.store)?;
                rt.block_on(run_job(&store, job, &settings))?
            }
        };

        println!("{}", report.summary());
        println!("{}", serde_json::to_string_pretty(&report)?);
        Ok(())
    }
}

async fn run_on_snapshot(
    job: JobKind,
    settings: &RunSettings,
    snapshot: &Path,
    write_snapshot: Option<&Path>,
) -> Result<ReconciliationReport, RosterSyncError> {
    info!("Running {} against snapshot {}", job, snapshot.display());
    let store = MemoryStore::load_snapshot(snapshot)?;
    let report = run_job(&store, job, settings).await?;
    if let Some(out) = write_snapshot {
        store.save_snapshot(out)?;
    }
    Ok(report)
}
