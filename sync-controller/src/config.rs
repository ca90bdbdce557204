//! Configuration loading for the controller.
//!
//! Configuration is loaded from a TOML file (default: `controller.toml`).
//! Every section and field is optional.

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use sync_core::LivenessPolicy;

/// Root configuration for the controller.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Inbound HTTP listener.
    #[serde(default)]
    pub server: ServerConfig,
    /// Storage configuration.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Per-satellite timing and queue settings.
    #[serde(default)]
    pub satellites: SatelliteConfig,
    /// Rate limiting configuration.
    #[serde(default)]
    pub limits: LimitsConfig,
    /// Status endpoints configuration.
    #[serde(default)]
    pub http: HttpConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind address for the sync endpoints (default: 0.0.0.0:47670).
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
}

/// Storage configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Path to SQLite database file.
    #[serde(default = "default_database_path")]
    pub database: PathBuf,
}

/// Per-satellite settings.
#[derive(Debug, Clone, Deserialize)]
pub struct SatelliteConfig {
    /// Bound on each satellite's outbound command queue (default: 64).
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Sleep between poll checks in seconds (default: 15).
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    /// Quiet time after which the controller pulls (default: 45).
    #[serde(default = "default_pull_after")]
    pub pull_after_secs: u64,
    /// Quiet time at which a satellite is offline (default: 60).
    #[serde(default = "default_offline_after")]
    pub offline_after_secs: u64,
    /// Heartbeat interval for online satellites (default: 30).
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_secs: u64,
    /// Timeout for outbound requests to a node (default: 10).
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    /// Port appended to addresses that carry none (default: 47670).
    #[serde(default = "default_node_port")]
    pub default_port: u16,
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    /// Inbound pushes per satellite per minute (default: 600).
    #[serde(default = "default_pushes_per_minute")]
    pub pushes_per_minute: u32,
    /// Inbound requests per second across all satellites (default: 200).
    #[serde(default = "default_global_rps")]
    pub global_requests_per_second: u32,
    /// Seconds between evictions of idle limiter entries (default: 300).
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_secs: u64,
}

/// Status endpoints configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    /// Expose the status endpoints (default: true).
    #[serde(default = "default_status_enabled")]
    pub status_enabled: bool,
}

// Default value functions
fn default_bind_address() -> String {
    "0.0.0.0:47670".to_string()
}

fn default_database_path() -> PathBuf {
    PathBuf::from("roomlink.db")
}

fn default_queue_capacity() -> usize {
    64
}

fn default_poll_interval() -> u64 {
    15
}

fn default_pull_after() -> u64 {
    45
}

fn default_offline_after() -> u64 {
    60
}

fn default_heartbeat_interval() -> u64 {
    30
}

fn default_request_timeout() -> u64 {
    10
}

fn default_node_port() -> u16 {
    47670
}

fn default_pushes_per_minute() -> u32 {
    600
}

fn default_global_rps() -> u32 {
    200
}

fn default_cleanup_interval() -> u64 {
    300
}

fn default_status_enabled() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database: default_database_path(),
        }
    }
}

impl Default for SatelliteConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            poll_interval_secs: default_poll_interval(),
            pull_after_secs: default_pull_after(),
            offline_after_secs: default_offline_after(),
            heartbeat_interval_secs: default_heartbeat_interval(),
            request_timeout_secs: default_request_timeout(),
            default_port: default_node_port(),
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            pushes_per_minute: default_pushes_per_minute(),
            global_requests_per_second: default_global_rps(),
            cleanup_interval_secs: default_cleanup_interval(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            status_enabled: default_status_enabled(),
        }
    }
}

impl SatelliteConfig {
    /// Staleness windows derived from this section.
    pub fn liveness_policy(&self) -> LivenessPolicy {
        LivenessPolicy::new(
            Duration::from_secs(self.pull_after_secs),
            Duration::from_secs(self.offline_after_secs),
        )
    }

    /// Sleep between poll checks.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Heartbeat interval.
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    /// Outbound request timeout.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if a value
    /// is out of range.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the runtime cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let checks: [(&'static str, bool); 7] = [
            ("satellites.queue_capacity", self.satellites.queue_capacity > 0),
            ("satellites.poll_interval_secs", self.satellites.poll_interval_secs > 0),
            (
                "satellites.heartbeat_interval_secs",
                self.satellites.heartbeat_interval_secs > 0,
            ),
            (
                "satellites.offline_after_secs",
                self.satellites.offline_after_secs > self.satellites.pull_after_secs,
            ),
            ("limits.pushes_per_minute", self.limits.pushes_per_minute > 0),
            (
                "limits.global_requests_per_second",
                self.limits.global_requests_per_second > 0,
            ),
            ("limits.cleanup_interval_secs", self.limits.cleanup_interval_secs > 0),
        ];

        match checks.into_iter().find(|(_, ok)| !ok) {
            Some((field, _)) => Err(ConfigError::Invalid { field }),
            None => Ok(()),
        }
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse configuration file.
    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying TOML parse error.
        source: toml::de::Error,
    },
    /// A field holds a value the controller cannot run with.
    #[error("invalid configuration value: {field}")]
    Invalid {
        /// Dotted field name.
        field: &'static str,
    },
}
