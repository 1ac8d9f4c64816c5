mod api;
mod auth;
mod cli;
mod compare;
mod config;
mod error;
mod executor;
mod jobs;
mod model;
mod normalize;
mod reader;
mod reconcile;
mod report;
mod server;
mod store;

use cli::Cli;
use config::{Config, CONFIG};
use directories::ProjectDirs;
use flexi_logger::{
    detailed_format, Cleanup, Criterion, Duplicate, FileSpec, Logger, LoggerHandle, Naming,
};
use log::{debug, error};

const LOG_FILE_SIZE: u64 = 10 * 1024 * 1024;
const LOG_FILES_KEPT: usize = 5;

fn setup_logging(project_dirs: &ProjectDirs, config: &Config) -> Option<LoggerHandle> {
    let log_dir = project_dirs.data_local_dir().join("logs");

    let started = Logger::try_with_str(config.logging.log_spec()).and_then(|logger| {
        logger
            .log_to_file(
                FileSpec::default()
                    .directory(&log_dir)
                    .basename("rostersync"),
            )
            .duplicate_to_stderr(Duplicate::Warn)
            .rotate(
                Criterion::Size(LOG_FILE_SIZE),
                Naming::Numbers,
                Cleanup::KeepLogFiles(LOG_FILES_KEPT),
            )
            .format(detailed_format)
            .start()
    });

    match started {
        Ok(handle) => Some(handle),
        Err(e) => {
            eprintln!("Failed to start logging in {}: {}", log_dir.display(), e);
            None
        }
    }
}

fn main() {
    let Some(project_dirs) = ProjectDirs::from("", "", "rostersync") else {
        eprintln!("Could not determine the project directory");
        std::process::exit(1);
    };

    let config = Config::load_config(&project_dirs);

    // The handle flushes and stops the logger when dropped
    let _logger = setup_logging(&project_dirs, &config);

    let _ = CONFIG.set(config);
    debug!("Command-line args: {:?}", std::env::args_os().collect::<Vec<_>>());

    if let Err(err) = Cli::handle_command_line() {
        error!("{:?}", err);
        eprintln!("{}", err);
        std::process::exit(1);
    }
}
