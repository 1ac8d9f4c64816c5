use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

pub static CONFIG: OnceCell<Config> = OnceCell::new();

/// Environment overrides look like ROSTERSYNC_EXECUTOR__WRITE_DELAY_MS
pub const ENV_PREFIX: &str = "ROSTERSYNC_";

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct LoggingConfig {
    pub rostersync: String,
    pub reqwest: String,
}

impl LoggingConfig {
    const LOG_LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];
    const ROSTERSYNC_LEVEL: &str = "info";
    const REQWEST_LEVEL: &str = "warn";

    fn default() -> Self {
        LoggingConfig {
            rostersync: Self::ROSTERSYNC_LEVEL.to_string(),
            reqwest: Self::REQWEST_LEVEL.to_string(),
        }
    }

    fn ensure_valid(&mut self) {
        Self::ensure_level(&mut self.rostersync, "rostersync", Self::ROSTERSYNC_LEVEL);
        Self::ensure_level(&mut self.reqwest, "reqwest", Self::REQWEST_LEVEL);
    }

    fn ensure_level(level: &mut String, name: &str, default: &str) {
        let original = level.clone();
        *level = level.trim().to_ascii_lowercase();
        if !Self::LOG_LEVELS.contains(&level.as_str()) {
            eprintln!(
                "Config error: {} log level of '{}' is invalid - using default of '{}'",
                name, original, default
            );
            *level = default.to_owned();
        }
    }

    /// flexi_logger spec string for both modules
    pub fn log_spec(&self) -> String {
        format!("rostersync={}, reqwest={}", self.rostersync, self.reqwest)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    fn default() -> Self {
        ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 8088,
        }
    }

    fn ensure_valid(&mut self) {
        if self.host.trim().is_empty() {
            eprintln!("Config error: server host is empty - using default of '127.0.0.1'");
            self.host = "127.0.0.1".to_string();
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct StoreConfig {
    /// Application base URL of the entity API, e.g. https://host/api/apps/<app-id>
    pub base_url: String,
    pub api_key: Option<String>,
    pub request_timeout_secs: u64,
}

impl StoreConfig {
    const TIMEOUT_SECS: u64 = 30;

    fn default() -> Self {
        StoreConfig {
            base_url: String::new(),
            api_key: None,
            request_timeout_secs: Self::TIMEOUT_SECS,
        }
    }

    fn ensure_valid(&mut self) {
        if self.request_timeout_secs == 0 {
            eprintln!(
                "Config error: store request timeout of 0 is invalid - using default of {}",
                Self::TIMEOUT_SECS
            );
            self.request_timeout_secs = Self::TIMEOUT_SECS;
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ReaderConfig {
    pub page_size: usize,
    /// Field the backend orders listings by while paging; empty for the
    /// backend's own order
    pub sort_key: String,
    /// When false, a failed page keeps what was read so far and the run
    /// continues with a warning
    pub abort_on_error: bool,
}

impl ReaderConfig {
    const PAGE_SIZE: usize = 500;
    const MAX_PAGE_SIZE: usize = 5000;
    const SORT_KEY: &str = "created_date";

    fn default() -> Self {
        ReaderConfig {
            page_size: Self::PAGE_SIZE,
            sort_key: Self::SORT_KEY.to_string(),
            abort_on_error: true,
        }
    }

    pub fn sort_key(&self) -> Option<String> {
        Some(self.sort_key.clone()).filter(|key| !key.is_empty())
    }

    fn ensure_valid(&mut self) {
        self.sort_key = self.sort_key.trim().to_string();

        if self.page_size == 0 || self.page_size > Self::MAX_PAGE_SIZE {
            eprintln!(
                "Config error: reader page size of {} is invalid - using default of {}",
                self.page_size,
                Self::PAGE_SIZE
            );
            self.page_size = Self::PAGE_SIZE;
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ExecutorConfig {
    /// Fixed pause between consecutive remote writes
    pub write_delay_ms: u64,
    pub dry_run: bool,
}

impl ExecutorConfig {
    fn default() -> Self {
        ExecutorConfig {
            write_delay_ms: 150,
            dry_run: false,
        }
    }

    pub fn write_delay(&self) -> Duration {
        Duration::from_millis(self.write_delay_ms)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SkillsConfig {
    /// Competency written when a created or repaired assignment has none
    pub default_competency_level: u32,
}

impl SkillsConfig {
    const DEFAULT_LEVEL: u32 = 1;

    fn default() -> Self {
        SkillsConfig {
            default_competency_level: Self::DEFAULT_LEVEL,
        }
    }

    fn ensure_valid(&mut self) {
        if self.default_competency_level == 0 {
            eprintln!(
                "Config error: default competency level of 0 is invalid - using default of {}",
                Self::DEFAULT_LEVEL
            );
            self.default_competency_level = Self::DEFAULT_LEVEL;
        }
    }
}

/// Remote collection names, one per entity the jobs touch
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CollectionsConfig {
    pub employees: String,
    pub skills: String,
    pub lockers: String,
    pub departments: String,
    pub department_source: String,
    pub roles: String,
}

impl CollectionsConfig {
    fn default() -> Self {
        CollectionsConfig {
            employees: "EmployeeMasterDatabase".to_string(),
            skills: "EmployeeMachineSkill".to_string(),
            lockers: "LockerAssignment".to_string(),
            departments: "Department".to_string(),
            department_source: "DepartmentSource".to_string(),
            roles: "UserRole".to_string(),
        }
    }

    fn ensure_valid(&mut self) {
        let defaults = Self::default();
        let pairs = [
            (&mut self.employees, defaults.employees, "employees"),
            (&mut self.skills, defaults.skills, "skills"),
            (&mut self.lockers, defaults.lockers, "lockers"),
            (&mut self.departments, defaults.departments, "departments"),
            (&mut self.department_source, defaults.department_source, "department_source"),
            (&mut self.roles, defaults.roles, "roles"),
        ];
        for (value, default, name) in pairs {
            if value.trim().is_empty() {
                eprintln!(
                    "Config error: collection name for '{}' is empty - using default of '{}'",
                    name, default
                );
                *value = default;
            }
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Config {
    pub logging: LoggingConfig,
    pub server: ServerConfig,
    pub store: StoreConfig,
    pub reader: ReaderConfig,
    pub executor: ExecutorConfig,
    pub skills: SkillsConfig,
    pub collections: CollectionsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            logging: LoggingConfig::default(),
            server: ServerConfig::default(),
            store: StoreConfig::default(),
            reader: ReaderConfig::default(),
            executor: ExecutorConfig::default(),
            skills: SkillsConfig::default(),
            collections: CollectionsConfig::default(),
        }
    }
}

pub fn get_config_path(project_dirs: &ProjectDirs) -> PathBuf {
    project_dirs.data_local_dir().join("config.toml")
}

impl Config {
    /// Loads the configuration from a TOML file located in the app's data directory.
    /// If the file is missing or fails to parse, defaults are used.
    /// Additionally, writes the default config to disk if no file exists.
    pub fn load_config(project_dirs: &ProjectDirs) -> Self {
        Self::load_from_path(&get_config_path(project_dirs))
    }

    pub fn load_from_path(config_path: &Path) -> Self {
        let default_config = Config::default();

        // If the config file doesn't exist, write the default configuration to disk.
        if !config_path.exists() {
            if let Some(parent) = config_path.parent() {
                if let Err(e) = fs::create_dir_all(parent) {
                    eprintln!(
                        "Failed to create configuration directory {}: {}",
                        parent.display(),
                        e
                    );
                }
            }
            if let Ok(toml_string) = toml::to_string_pretty(&default_config) {
                if let Err(e) = fs::write(config_path, toml_string) {
                    eprintln!(
                        "Failed to write default config to {}: {}",
                        config_path.display(),
                        e
                    );
                }
            } else {
                eprintln!("Failed to serialize default config.");
            }
        }

        // Defaults, then the TOML file, then environment overrides
        let figment = Figment::from(Serialized::defaults(default_config.clone()))
            .merge(Toml::file(config_path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"));

        let mut config: Config = figment.extract().unwrap_or_else(|err| {
            eprintln!(
                "Could not load config file {}: {}. Using default configuration.",
                config_path.display(),
                err
            );
            default_config
        });

        config.ensure_valid();

        config
    }

    fn ensure_valid(&mut self) {
        self.logging.ensure_valid();
        self.server.ensure_valid();
        self.store.ensure_valid();
        self.reader.ensure_valid();
        self.skills.ensure_valid();
        self.collections.ensure_valid();
    }

    pub fn get() -> Config {
        CONFIG.get().cloned().unwrap_or_default()
    }

    pub fn get_server_host() -> String {
        Self::get().server.host
    }

    pub fn get_server_port() -> u16 {
        Self::get().server.port
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn test_missing_file_writes_defaults() {
        Jail::expect_with(|jail| {
            let path = jail.directory().join("nested").join("config.toml");
            let config = Config::load_from_path(&path);

            assert!(path.exists());
            assert_eq!(config.reader.page_size, 500);
            assert_eq!(config.reader.sort_key(), Some("created_date".to_string()));
            assert_eq!(config.collections.skills, "EmployeeMachineSkill");
            Ok(())
        });
    }

    #[test]
    fn test_file_then_env_override() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "config.toml",
                r#"
                [executor]
                write_delay_ms = 400
                dry_run = true

                [collections]
                roles = "Roles"
                "#,
            )?;
            jail.set_env("ROSTERSYNC_EXECUTOR__WRITE_DELAY_MS", "25");

            let config = Config::load_from_path(&jail.directory().join("config.toml"));
            assert_eq!(config.executor.write_delay_ms, 25);
            assert!(config.executor.dry_run);
            assert_eq!(config.collections.roles, "Roles");
            // Untouched sections keep their defaults
            assert_eq!(config.collections.lockers, "LockerAssignment");
            Ok(())
        });
    }

    #[test]
    fn test_invalid_values_are_repaired() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "config.toml",
                r#"
                [logging]
                rostersync = " DEBUG "
                reqwest = "loud"

                [reader]
                page_size = 0
                sort_key = "  "
                abort_on_error = false

                [skills]
                default_competency_level = 0
                "#,
            )?;

            let config = Config::load_from_path(&jail.directory().join("config.toml"));
            assert_eq!(config.logging.rostersync, "debug");
            assert_eq!(config.logging.reqwest, "warn");
            assert_eq!(config.reader.page_size, 500);
            assert!(!config.reader.abort_on_error);
            assert_eq!(config.reader.sort_key(), None);
            assert_eq!(config.skills.default_competency_level, 1);
            Ok(())
        });
    }

    #[test]
    fn test_log_spec() {
        let logging = LoggingConfig::default();
        assert_eq!(logging.log_spec(), "rostersync=info, reqwest=warn");
    }
}
