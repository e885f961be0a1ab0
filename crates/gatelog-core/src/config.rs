//! Application configuration management.
//!
//! Configuration is layered with the `config` crate:
//!
//! 1. Built-in defaults (every field has one)
//! 2. A TOML file (`/etc/gatelog/config.toml` on Linux)
//! 3. `GATELOG__<SECTION>__<KEY>` environment variables, e.g.
//!    `GATELOG__READER__HOST=192.168.1.50`
//!
//! Every duration the engine uses is configuration, never a hardcoded
//! constant. Durations are stored as whole seconds or milliseconds so the
//! file stays hand-editable; the accessor methods return [`Duration`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Environment, File, FileFormat, Map};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Environment variable that overrides the configuration file location.
pub const CONFIG_PATH_ENV: &str = "GATELOG_CONFIG";

/// Prefix for environment overrides (`GATELOG__READER__PORT=49152`).
const ENV_PREFIX: &str = "GATELOG";
const ENV_SEPARATOR: &str = "__";

// =============================================================================
// ERRORS
// =============================================================================

/// Errors raised while loading, saving or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file does not exist.
    #[error("Configuration file not found: {}", .0.display())]
    NotFound(PathBuf),

    /// The layered sources could not be read or deserialized.
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    /// The configuration could not be serialized to TOML.
    #[error("Failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// The configuration file could not be written.
    #[error("Failed to write {}: {source}", .path.display())]
    WriteError {
        /// Destination path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A single field failed validation.
    #[error("{field}: {message}")]
    ValidationError {
        /// Dotted field path, e.g. `reader.port`.
        field: String,
        /// What is wrong with it.
        message: String,
    },

    /// Several fields failed validation.
    #[error("{} configuration fields are invalid", .0.len())]
    MultipleValidationErrors(Vec<ConfigError>),
}

/// Result type for configuration operations.
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// =============================================================================
// SECTIONS
// =============================================================================

/// Main application configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// RFID reader connection settings.
    pub reader: ReaderConfig,
    /// Duplicate suppression settings.
    pub dedup: DedupConfig,
    /// Connection health monitoring and alerting.
    pub health: HealthConfig,
    /// Signal quality statistics.
    pub signal: SignalConfig,
    /// Unknown tag archive.
    pub archive: ArchiveConfig,
    /// Periodic network reachability probe.
    pub reachability: ReachabilityConfig,
    /// HTTP server and process settings.
    pub server: ServerConfig,
}

/// RFID reader connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderConfig {
    /// Reader host name or IP address.
    pub host: String,
    /// Reader TCP port.
    pub port: u16,
    /// Upper bound on a single connect attempt.
    pub connect_timeout_secs: u64,
    /// Fixed delay between a failure and the next connect attempt.
    pub reconnect_delay_secs: u64,
    /// TCP keep-alive probe interval while connected.
    pub keepalive_interval_secs: u64,
    /// Size of the socket read buffer; one read becomes one frame.
    pub read_buffer_size: usize,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            host: "10.10.100.254".to_string(),
            port: 49152,
            connect_timeout_secs: 10,
            reconnect_delay_secs: 5,
            keepalive_interval_secs: 10,
            read_buffer_size: 1024,
        }
    }
}

impl ReaderConfig {
    /// `host:port` string used for dialling and logging.
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Connect timeout as a [`Duration`].
    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Reconnect delay as a [`Duration`].
    #[must_use]
    pub const fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }

    /// Keep-alive interval as a [`Duration`].
    #[must_use]
    pub const fn keepalive_interval(&self) -> Duration {
        Duration::from_secs(self.keepalive_interval_secs)
    }
}

/// Duplicate suppression settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    /// Trailing window in which a repeat detection is suppressed.
    /// Zero disables suppression.
    pub window_secs: u64,
    /// How often stale entries are swept from the dedup map.
    pub sweep_interval_secs: u64,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            window_secs: 30,
            sweep_interval_secs: 300,
        }
    }
}

impl DedupConfig {
    /// Dedup window as a [`Duration`].
    #[must_use]
    pub const fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }

    /// Sweep interval as a [`Duration`].
    #[must_use]
    pub const fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

/// Connection health monitoring and alerting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Consecutive failures that raise a critical alert.
    pub consecutive_failure_threshold: u32,
    /// Success rate (0.0-1.0) below which a warning is raised.
    pub success_rate_threshold: f64,
    /// Attempts required before the success rate is judged at all.
    pub min_attempts_for_rate_alert: u64,
    /// Mean recent latency above which a warning is raised.
    pub latency_threshold_ms: u64,
    /// Number of most recent latency samples averaged for the latency check.
    pub latency_window: usize,
    /// Minimum time between two alerts of any level.
    pub alert_cooldown_secs: u64,
    /// How often a health snapshot is published.
    pub broadcast_interval_secs: u64,
    /// Capacity of the latency sample ring.
    pub max_latency_samples: usize,
    /// Capacity of the connection history ring.
    pub max_history: usize,
    /// Capacity of the raised alert list.
    pub max_alerts: usize,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            consecutive_failure_threshold: 5,
            success_rate_threshold: 0.8,
            min_attempts_for_rate_alert: 10,
            latency_threshold_ms: 1000,
            latency_window: 10,
            alert_cooldown_secs: 30,
            broadcast_interval_secs: 3,
            max_latency_samples: 100,
            max_history: 100,
            max_alerts: 50,
        }
    }
}

impl HealthConfig {
    /// Alert cooldown as a [`Duration`].
    #[must_use]
    pub const fn alert_cooldown(&self) -> Duration {
        Duration::from_secs(self.alert_cooldown_secs)
    }

    /// Broadcast interval as a [`Duration`].
    #[must_use]
    pub const fn broadcast_interval(&self) -> Duration {
        Duration::from_secs(self.broadcast_interval_secs)
    }
}

/// Signal quality statistics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalConfig {
    /// Number of recent samples kept in the history ring.
    pub history_size: usize,
    /// How often a signal snapshot is published.
    pub broadcast_interval_secs: u64,
}

impl Default for SignalConfig {
    fn default() -> Self {
        Self {
            history_size: 100,
            broadcast_interval_secs: 5,
        }
    }
}

impl SignalConfig {
    /// Broadcast interval as a [`Duration`].
    #[must_use]
    pub const fn broadcast_interval(&self) -> Duration {
        Duration::from_secs(self.broadcast_interval_secs)
    }
}

/// Unknown tag archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArchiveConfig {
    /// Maximum number of archived records.
    pub capacity: usize,
    /// Undecodable frames shorter than this many bytes are ignored.
    pub min_frame_len: usize,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            capacity: 1000,
            min_frame_len: 4,
        }
    }
}

/// Periodic network reachability probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReachabilityConfig {
    /// Whether the periodic probe runs at all.
    pub enabled: bool,
    /// How often the reader address is probed.
    pub interval_secs: u64,
    /// Upper bound on a single probe.
    pub timeout_ms: u64,
}

impl Default for ReachabilityConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 30,
            timeout_ms: 3000,
        }
    }
}

impl ReachabilityConfig {
    /// Probe interval as a [`Duration`].
    #[must_use]
    pub const fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    /// Probe timeout as a [`Duration`].
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Default tracing filter. Lifecycle events from the engine and supervisor
/// are kept at `debug`; the per-frame pipeline and decoder stay at `info`.
pub const DEFAULT_LOG_FILTER: &str = "info,gatelog_server=debug,gatelog_core=debug,\
    gatelog_core::pipeline=info,gatelog_core::decoder=info";

/// HTTP server and process settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Socket address the HTTP API binds to.
    pub bind_address: String,
    /// Production logging (JSON files + compact stdout).
    pub production: bool,
    /// Directory for production log files. Platform default when unset.
    pub log_dir: Option<PathBuf>,
    /// Rolled log files kept in `log_dir`.
    pub log_max_files: usize,
    /// `tracing` filter directives used when neither `RUST_LOG` nor
    /// `GATELOG_LOG_LEVEL` is set.
    pub log_filter: String,
    /// Optional JSON file of vehicles registered at startup.
    pub vehicles_path: Option<PathBuf>,
    /// Capacity of the event broadcast bus.
    pub event_bus_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:3000".to_string(),
            production: false,
            log_dir: None,
            log_max_files: 14,
            log_filter: DEFAULT_LOG_FILTER.to_string(),
            vehicles_path: None,
            event_bus_capacity: 1024,
        }
    }
}

// =============================================================================
// LOADING & SAVING
// =============================================================================

impl Config {
    /// Load configuration from `path`, which must exist.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NotFound`] if the file is missing, or a load
    /// or validation error.
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        Self::load_layered(path, true, None)
    }

    /// Load configuration from `path`, falling back to defaults (plus any
    /// environment overrides) when the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be parsed, or if the
    /// resulting configuration is invalid.
    pub fn load_or_default(path: impl AsRef<Path>) -> ConfigResult<Self> {
        Self::load_layered(path.as_ref(), false, None)
    }

    /// Shared loader. `env` replaces the process environment when given.
    fn load_layered(
        path: &Path,
        required: bool,
        env: Option<Map<String, String>>,
    ) -> ConfigResult<Self> {
        let environment = Environment::with_prefix(ENV_PREFIX)
            .prefix_separator(ENV_SEPARATOR)
            .separator(ENV_SEPARATOR)
            .try_parsing(true)
            .source(env);

        let config: Self = config::Config::builder()
            .add_source(
                File::from(path)
                    .format(FileFormat::Toml)
                    .required(required),
            )
            .add_source(environment)
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Write the configuration to `path` as TOML, creating parent
    /// directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub fn save(&self, path: impl AsRef<Path>) -> ConfigResult<()> {
        let path = path.as_ref();
        let write_err = |source| ConfigError::WriteError {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(write_err)?;
        Ok(())
    }

    /// Resolve the configuration file path.
    ///
    /// `GATELOG_CONFIG` wins; otherwise `/etc/gatelog/config.toml` on Linux
    /// and the platform config directory elsewhere.
    #[must_use]
    pub fn default_path() -> PathBuf {
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            return PathBuf::from(path);
        }
        #[cfg(target_os = "linux")]
        {
            PathBuf::from("/etc/gatelog/config.toml")
        }
        #[cfg(not(target_os = "linux"))]
        {
            directories::ProjectDirs::from("", "", "gatelog").map_or_else(
                || PathBuf::from("gatelog.toml"),
                |dirs| dirs.config_dir().join("config.toml"),
            )
        }
    }

    /// Check every field, collecting all problems rather than stopping at
    /// the first.
    ///
    /// # Errors
    ///
    /// Returns the single error, or [`ConfigError::MultipleValidationErrors`].
    pub fn validate(&self) -> ConfigResult<()> {
        let mut errors = Vec::new();
        let mut check = |ok: bool, field: &str, message: &str| {
            if !ok {
                errors.push(ConfigError::ValidationError {
                    field: field.to_string(),
                    message: message.to_string(),
                });
            }
        };

        check(!self.reader.host.trim().is_empty(), "reader.host", "must not be empty");
        check(self.reader.port != 0, "reader.port", "must be between 1 and 65535");
        check(
            self.reader.connect_timeout_secs > 0,
            "reader.connect_timeout_secs",
            "must be greater than zero",
        );
        check(
            self.reader.reconnect_delay_secs > 0,
            "reader.reconnect_delay_secs",
            "must be greater than zero",
        );
        check(
            self.reader.read_buffer_size >= 64,
            "reader.read_buffer_size",
            "must be at least 64 bytes",
        );
        check(
            self.dedup.sweep_interval_secs > 0,
            "dedup.sweep_interval_secs",
            "must be greater than zero",
        );
        check(
            self.health.consecutive_failure_threshold > 0,
            "health.consecutive_failure_threshold",
            "must be greater than zero",
        );
        check(
            (0.0..=1.0).contains(&self.health.success_rate_threshold),
            "health.success_rate_threshold",
            "must be between 0.0 and 1.0",
        );
        check(
            self.health.latency_window > 0,
            "health.latency_window",
            "must be greater than zero",
        );
        check(
            self.health.broadcast_interval_secs > 0,
            "health.broadcast_interval_secs",
            "must be greater than zero",
        );
        check(
            self.health.max_latency_samples > 0
                && self.health.max_history > 0
                && self.health.max_alerts > 0,
            "health.max_*",
            "history capacities must be greater than zero",
        );
        check(
            self.signal.history_size > 0,
            "signal.history_size",
            "must be greater than zero",
        );
        check(
            self.signal.broadcast_interval_secs > 0,
            "signal.broadcast_interval_secs",
            "must be greater than zero",
        );
        check(self.archive.capacity > 0, "archive.capacity", "must be greater than zero");
        check(
            !self.reachability.enabled || self.reachability.interval_secs > 0,
            "reachability.interval_secs",
            "must be greater than zero when the probe is enabled",
        );
        check(
            !self.server.log_filter.trim().is_empty(),
            "server.log_filter",
            "must not be empty",
        );
        check(
            self.server.log_max_files > 0,
            "server.log_max_files",
            "must be greater than zero",
        );
        check(
            self.server.event_bus_capacity > 0,
            "server.event_bus_capacity",
            "must be greater than zero",
        );

        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(ConfigError::MultipleValidationErrors(errors)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn no_env() -> Option<Map<String, String>> {
        Some(Map::new())
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.reader.address(), "10.10.100.254:49152");
        assert_eq!(config.dedup.window(), Duration::from_secs(30));
        assert_eq!(config.health.alert_cooldown(), Duration::from_secs(30));
    }

    #[test]
    fn test_load_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[reader]\nhost = \"192.168.1.50\"\n\n[dedup]\nwindow_secs = 120").unwrap();

        let config = Config::load_layered(file.path(), true, no_env()).unwrap();
        assert_eq!(config.reader.host, "192.168.1.50");
        assert_eq!(config.reader.port, 49152);
        assert_eq!(config.dedup.window_secs, 120);
        assert_eq!(config.health, HealthConfig::default());
    }

    #[test]
    fn test_environment_overrides_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[reader]\nport = 4000").unwrap();

        let mut env = Map::new();
        env.insert("GATELOG__READER__PORT".to_string(), "5000".to_string());
        env.insert("GATELOG__DEDUP__WINDOW_SECS".to_string(), "0".to_string());

        let config = Config::load_layered(file.path(), true, Some(env)).unwrap();
        assert_eq!(config.reader.port, 5000);
        assert_eq!(config.dedup.window_secs, 0);
    }

    #[test]
    fn test_environment_sets_logging() {
        let mut env = Map::new();
        env.insert("GATELOG__SERVER__LOG_DIR".to_string(), "/srv/gatelog/logs".to_string());
        env.insert("GATELOG__SERVER__LOG_FILTER".to_string(), "warn".to_string());

        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_layered(&dir.path().join("none.toml"), false, Some(env)).unwrap();
        assert_eq!(config.server.log_dir, Some(PathBuf::from("/srv/gatelog/logs")));
        assert_eq!(config.server.log_filter, "warn");
        assert_eq!(config.server.log_max_files, 14);
    }

    #[test]
    fn test_blank_log_filter_is_invalid() {
        let mut config = Config::default();
        config.server.log_filter = String::new();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError { field, .. }) if field == "server.log_filter"
        ));
    }

    #[test]
    fn test_load_missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let result = Config::load(dir.path().join("missing.toml"));
        assert!(matches!(result, Err(ConfigError::NotFound(_))));
    }

    #[test]
    fn test_load_or_default_without_file() {
        let dir = tempfile::tempdir().unwrap();
        let config =
            Config::load_layered(&dir.path().join("missing.toml"), false, no_env()).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.reader.host = "reader.local".to_string();
        config.archive.capacity = 10;
        config.save(&path).unwrap();

        let loaded = Config::load_layered(&path, true, no_env()).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_validation_collects_every_error() {
        let mut config = Config::default();
        config.reader.port = 0;
        config.archive.capacity = 0;
        config.health.success_rate_threshold = 1.5;

        match config.validate() {
            Err(ConfigError::MultipleValidationErrors(errors)) => assert_eq!(errors.len(), 3),
            other => panic!("expected multiple errors, got {other:?}"),
        }
    }

    #[test]
    fn test_single_validation_error() {
        let mut config = Config::default();
        config.reader.host = "  ".to_string();

        match config.validate() {
            Err(ConfigError::ValidationError { field, .. }) => assert_eq!(field, "reader.host"),
            other => panic!("expected a validation error, got {other:?}"),
        }
    }
}
