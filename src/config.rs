//! Configuration types for dns-overseer.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::OverseerError;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Daemon configuration.
    #[serde(default)]
    pub overseer: OverseerConfig,

    /// Telemetry configuration.
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Paths, interval and bounds used by the iteration loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OverseerConfig {
    /// Directory holding one `*.toml` resource definition per resource.
    pub resources_dir: PathBuf,

    /// Root that resource `src` template names are relative to.
    pub templates_dir: PathBuf,

    /// File holding the addresses observed on the last iteration.
    pub state_file: PathBuf,

    /// Pause between the end of one iteration and the start of the next.
    pub interval_secs: u64,

    /// Upper bound for a single host lookup.
    pub resolve_timeout_secs: u64,

    /// Upper bound for a single reload command.
    pub reload_timeout_secs: u64,

    /// Render+reload pipelines allowed in flight at once.
    pub concurrency: usize,

    /// Re-read `resources_dir` at the start of every iteration.
    pub refresh_resources: bool,
}

impl Default for OverseerConfig {
    fn default() -> Self {
        Self {
            resources_dir: PathBuf::from("/etc/overseer/resources"),
            templates_dir: PathBuf::from("/etc/overseer/templates"),
            state_file: PathBuf::from("/var/overseer/state.toml"),
            interval_secs: 60,
            resolve_timeout_secs: 10,
            reload_timeout_secs: 60,
            concurrency: 1,
            refresh_resources: true,
        }
    }
}

impl OverseerConfig {
    /// Reject values the scheduler cannot work with.
    pub fn validate(&self) -> Result<(), OverseerError> {
        if self.interval_secs == 0 {
            return Err(OverseerError::Config(
                "interval_secs must be greater than zero".to_string(),
            ));
        }
        if self.concurrency == 0 {
            return Err(OverseerError::Config(
                "concurrency must be at least 1".to_string(),
            ));
        }
        if self.resolve_timeout_secs == 0 || self.reload_timeout_secs == 0 {
            return Err(OverseerError::Config(
                "timeouts must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Pause between iterations.
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    /// Bound for one DNS lookup.
    pub fn resolve_timeout(&self) -> Duration {
        Duration::from_secs(self.resolve_timeout_secs)
    }

    /// Bound for one reload command.
    pub fn reload_timeout(&self) -> Duration {
        Duration::from_secs(self.reload_timeout_secs)
    }
}

/// Telemetry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Log level filter (e.g., "info", "debug", "dns_overseer=debug,warn").
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Prometheus metrics exporter address.
    #[serde(default)]
    pub prometheus_addr: Option<SocketAddr>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            prometheus_addr: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}
