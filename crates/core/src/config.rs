use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub server: ServerConfig,
    pub scheduler: SchedulerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub health_check_port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct SchedulerConfig {
    pub enabled: bool,
    pub sweep_interval_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

/// Programmatic overrides, applied last. CLI flags and tests use these.
#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub scheduler_enabled: Option<bool>,
    pub sweep_interval_secs: Option<u64>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://procura.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                health_check_port: 8081,
                graceful_shutdown_secs: 15,
            },
            scheduler: SchedulerConfig { enabled: true, sweep_interval_secs: 300 },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

// File shape: every key optional so a partial procura.toml patches defaults.
#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    server: Option<ServerPatch>,
    scheduler: Option<SchedulerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    health_check_port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct SchedulerPatch {
    enabled: Option<bool>,
    sweep_interval_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("procura.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }
        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(health_check_port) = server.health_check_port {
                self.server.health_check_port = health_check_port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }
        if let Some(scheduler) = patch.scheduler {
            if let Some(enabled) = scheduler.enabled {
                self.scheduler.enabled = enabled;
            }
            if let Some(sweep_interval_secs) = scheduler.sweep_interval_secs {
                self.scheduler.sweep_interval_secs = sweep_interval_secs;
            }
        }
        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(url) = env::var("PROCURA_DATABASE_URL") {
            self.database.url = url;
        }
        if let Ok(level) = env::var("PROCURA_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = env::var("PROCURA_LOG_FORMAT") {
            self.logging.format = format.parse()?;
        }
        if let Ok(port) = env::var("PROCURA_SERVER_PORT") {
            self.server.port = port.parse().map_err(|_| ConfigError::InvalidEnvOverride {
                key: "PROCURA_SERVER_PORT".to_string(),
                value: port,
            })?;
        }
        if let Ok(enabled) = env::var("PROCURA_SCHEDULER_ENABLED") {
            self.scheduler.enabled = parse_bool(&enabled).ok_or_else(|| {
                ConfigError::InvalidEnvOverride {
                    key: "PROCURA_SCHEDULER_ENABLED".to_string(),
                    value: enabled,
                }
            })?;
        }
        if let Ok(interval) = env::var("PROCURA_SWEEP_INTERVAL_SECS") {
            self.scheduler.sweep_interval_secs =
                interval.parse().map_err(|_| ConfigError::InvalidEnvOverride {
                    key: "PROCURA_SWEEP_INTERVAL_SECS".to_string(),
                    value: interval,
                })?;
        }
        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(url) = overrides.database_url {
            self.database.url = url;
        }
        if let Some(level) = overrides.log_level {
            self.logging.level = level;
        }
        if let Some(enabled) = overrides.scheduler_enabled {
            self.scheduler.enabled = enabled;
        }
        if let Some(interval) = overrides.sweep_interval_secs {
            self.scheduler.sweep_interval_secs = interval;
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.database.url.trim().is_empty() {
            return Err(ConfigError::Validation("database.url must not be empty".to_string()));
        }
        if self.database.max_connections == 0 {
            return Err(ConfigError::Validation(
                "database.max_connections must be at least 1".to_string(),
            ));
        }
        if self.scheduler.sweep_interval_secs == 0 {
            return Err(ConfigError::Validation(
                "scheduler.sweep_interval_secs must be at least 1".to_string(),
            ));
        }
        if self.server.port == self.server.health_check_port {
            return Err(ConfigError::Validation(
                "server.port and server.health_check_port must differ".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn resolve_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return path.exists().then(|| path.to_path_buf());
    }
    if let Ok(from_env) = env::var("PROCURA_CONFIG") {
        let path = PathBuf::from(from_env);
        if path.exists() {
            return Some(path);
        }
    }
    let default = PathBuf::from("procura.toml");
    default.exists().then_some(default)
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;
    toml::from_str(&raw)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::path::PathBuf;

    use super::{AppConfig, ConfigError, ConfigOverrides, LoadOptions};

    fn load_without_ambient_file(options: LoadOptions) -> Result<AppConfig, ConfigError> {
        // Point at a path that cannot exist so a stray procura.toml in the
        // working directory does not leak into the test.
        let mut options = options;
        if options.config_path.is_none() {
            options.config_path = Some(PathBuf::from("/nonexistent/procura.toml"));
        }
        AppConfig::load(options)
    }

    #[test]
    fn defaults_validate() {
        let config = load_without_ambient_file(LoadOptions::default()).expect("defaults load");
        assert_eq!(config.database.max_connections, 5);
        assert!(config.scheduler.enabled);
    }

    #[test]
    fn file_patch_overrides_defaults() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(
            file,
            "[database]\nurl = \"sqlite::memory:\"\n\n[scheduler]\nsweep_interval_secs = 60\n"
        )
        .expect("write config");

        let config = AppConfig::load(LoadOptions {
            config_path: Some(file.path().to_path_buf()),
            require_file: true,
            overrides: ConfigOverrides::default(),
        })
        .expect("load from file");

        assert_eq!(config.database.url, "sqlite::memory:");
        assert_eq!(config.scheduler.sweep_interval_secs, 60);
        // Untouched sections keep defaults.
        assert_eq!(config.server.port, 8080);
    }

    #[test]
    fn missing_required_file_fails() {
        let result = AppConfig::load(LoadOptions {
            config_path: Some(PathBuf::from("/nonexistent/procura.toml")),
            require_file: true,
            overrides: ConfigOverrides::default(),
        });
        assert!(matches!(result, Err(ConfigError::MissingConfigFile(_))));
    }

    #[test]
    fn programmatic_overrides_win() {
        let config = load_without_ambient_file(LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some("sqlite://elsewhere.db".to_string()),
                scheduler_enabled: Some(false),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .expect("load with overrides");

        assert_eq!(config.database.url, "sqlite://elsewhere.db");
        assert!(!config.scheduler.enabled);
    }

    #[test]
    fn zero_sweep_interval_is_rejected() {
        let result = load_without_ambient_file(LoadOptions {
            overrides: ConfigOverrides {
                sweep_interval_secs: Some(0),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        });
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }
}
