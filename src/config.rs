//! Process configuration.
//!
//! All types derive serde traits. Keys are camelCase in both the TOML file
//! and the `/config` JSON dump; every field has a default, so an empty file
//! (or no file at all) is a valid configuration.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Environment variable naming a TOML config file.
pub const CONFIG_ENV: &str = "KVGATE_CONFIG";

/// Environment variable overriding `store.password`.
pub const PASSWORD_ENV: &str = "KVGATE_STORE_PASSWORD";

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    /// Interface to listen on. Empty means all interfaces.
    pub host: String,

    pub port: u16,

    /// JSON log file, written in addition to stdout. The active file is
    /// `<stem>.<date>.<ext>` next to this path.
    pub log_path: Option<PathBuf>,

    pub log_rotation: LogRotation,

    /// Log files kept on disk, the active one included.
    pub log_max_files: usize,

    pub store: StoreConfig,

    pub timeouts: TimeoutConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 8080,
            log_path: Some(PathBuf::from("/tmp/kvgate.log")),
            log_rotation: LogRotation::Daily,
            log_max_files: 2,
            store: StoreConfig::default(),
            timeouts: TimeoutConfig::default(),
        }
    }
}

/// How often the log file rolls over.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    Hourly,
    #[default]
    Daily,
    Never,
}

/// Which store implementation backs the service.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Redis,
    Memory,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct StoreConfig {
    pub backend: Backend,
    pub host: String,
    pub port: u16,

    /// Never serialized.
    #[serde(skip_serializing)]
    pub password: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: Backend::Redis,
            host: "localhost".to_string(),
            port: 10010,
            password: String::new(),
        }
    }
}

/// Timeouts, in milliseconds.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct TimeoutConfig {
    /// Budget for each store call made while handling a request.
    pub request_ms: u64,

    /// Budget for the initial store connectivity check.
    pub connect_ms: u64,

    /// Budget for each shutdown step (listener, then store).
    pub shutdown_step_ms: u64,

    /// Budget for reading a request head, and separately its body.
    pub read_ms: u64,

    /// A response write that makes no progress for this long closes the
    /// connection.
    pub write_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request_ms: 3_000,
            connect_ms: 5_000,
            shutdown_step_ms: 5_000,
            read_ms: 10_000,
            write_ms: 10_000,
        }
    }
}

impl TimeoutConfig {
    pub fn request(&self) -> Duration { Duration::from_millis(self.request_ms) }
    pub fn connect(&self) -> Duration { Duration::from_millis(self.connect_ms) }
    pub fn shutdown_step(&self) -> Duration { Duration::from_millis(self.shutdown_step_ms) }
    pub fn read(&self) -> Duration { Duration::from_millis(self.read_ms) }
    pub fn write(&self) -> Duration { Duration::from_millis(self.write_ms) }
}

impl Config {
    /// `host:port` for the listener.
    pub fn listen_addr(&self) -> String {
        let host = if self.host.is_empty() { "0.0.0.0" } else { self.host.as_str() };
        if host.contains(':') {
            format!("[{host}]:{}", self.port)
        } else {
            format!("{host}:{}", self.port)
        }
    }

    /// Loads the file named by [`CONFIG_ENV`] if set, defaults otherwise,
    /// then applies [`PASSWORD_ENV`] and validates.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = match std::env::var_os(CONFIG_ENV) {
            Some(path) => load_file(Path::new(&path))?,
            None => Config::default(),
        };
        if let Ok(password) = std::env::var(PASSWORD_ENV) {
            config.store.password = password;
        }
        validate(&config)?;
        Ok(config)
    }
}

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("reading {path}: {source}")]
    Io { path: PathBuf, source: std::io::Error },

    #[error("parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Validation(String),
}

/// Reads and parses a TOML config file. Does not validate.
pub fn load_file(path: &Path) -> Result<Config, ConfigError> {
    let content = fs::read_to_string(path)
        .map_err(|source| ConfigError::Io { path: path.to_owned(), source })?;
    Ok(toml::from_str(&content)?)
}

pub fn validate(config: &Config) -> Result<(), ConfigError> {
    let t = &config.timeouts;
    for (name, ms) in [
        ("timeouts.requestMs", t.request_ms),
        ("timeouts.connectMs", t.connect_ms),
        ("timeouts.shutdownStepMs", t.shutdown_step_ms),
        ("timeouts.readMs", t.read_ms),
        ("timeouts.writeMs", t.write_ms),
    ] {
        if ms == 0 {
            return Err(ConfigError::Validation(format!("{name} must be greater than zero")));
        }
    }
    if config.log_path.is_some() && config.log_max_files == 0 {
        return Err(ConfigError::Validation("logMaxFiles must be greater than zero".into()));
    }
    if config.store.backend == Backend::Redis && config.store.host.is_empty() {
        return Err(ConfigError::Validation("store.host is required for the redis backend".into()));
    }
    Ok(())
}
