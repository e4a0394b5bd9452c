//! Node configuration
//!
//! JSON file, every field optional. Defaults:
//! - version GC every 1000 commits or 60s idle
//! - L1 GC every 60s
//! - view GC back-off 10s
//! - GC RPC timeout 15s

mod errors;

pub use errors::{ConfigError, ConfigResult};

use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::observability::Severity;

/// Cluster-wide version GC settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VersionGcConfig {
    pub enabled: bool,
    /// Committed transactions that trigger a cycle once exceeded
    pub commit_threshold: u64,
    /// Longest time between two cycles
    pub max_idle_ms: u64,
}

impl Default for VersionGcConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            commit_threshold: 1000,
            max_idle_ms: 60_000,
        }
    }
}

/// Node-local L1 GC settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct L1GcConfig {
    pub enabled: bool,
    pub interval_ms: u64,
}

impl Default for L1GcConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_ms: 60_000,
        }
    }
}

/// Coordinator-only view GC settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewGcConfig {
    pub enabled: bool,
    /// Delay after a trigger before the next attempt
    pub backoff_ms: u64,
}

impl Default for ViewGcConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            backoff_ms: 10_000,
        }
    }
}

/// Configuration of one node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GmuConfig {
    pub version_gc: VersionGcConfig,
    pub l1_gc: L1GcConfig,
    pub view_gc: ViewGcConfig,
    /// Timeout of each GC gather
    pub rpc_timeout_ms: u64,
    /// Every node holds every key; there is no L1 cache to collect
    pub fully_replicated: bool,
    /// Record blocking waits on entries in the metrics
    pub track_waiting: bool,
    pub log_level: String,
}

impl Default for GmuConfig {
    fn default() -> Self {
        Self {
            version_gc: VersionGcConfig::default(),
            l1_gc: L1GcConfig::default(),
            view_gc: ViewGcConfig::default(),
            rpc_timeout_ms: 15_000,
            fully_replicated: false,
            track_waiting: false,
            log_level: "info".to_string(),
        }
    }
}

impl GmuConfig {
    /// Load and validate configuration from a JSON file
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_json(&content)
    }

    /// Parse and validate configuration from JSON text
    pub fn from_json(content: &str) -> ConfigResult<Self> {
        let config: GmuConfig =
            serde_json::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.version_gc.commit_threshold == 0 {
            return Err(ConfigError::Invalid(
                "version_gc.commit_threshold must be > 0".into(),
            ));
        }
        if self.version_gc.max_idle_ms == 0 {
            return Err(ConfigError::Invalid("version_gc.max_idle_ms must be > 0".into()));
        }
        if self.l1_gc.interval_ms == 0 {
            return Err(ConfigError::Invalid("l1_gc.interval_ms must be > 0".into()));
        }
        if self.view_gc.backoff_ms == 0 {
            return Err(ConfigError::Invalid("view_gc.backoff_ms must be > 0".into()));
        }
        if self.rpc_timeout_ms == 0 {
            return Err(ConfigError::Invalid("rpc_timeout_ms must be > 0".into()));
        }
        self.severity()?;
        Ok(())
    }

    /// Minimum log severity named by `log_level`
    pub fn severity(&self) -> ConfigResult<Severity> {
        Severity::from_str(&self.log_level).map_err(|_| {
            ConfigError::Invalid(format!("unknown log_level '{}'", self.log_level))
        })
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.rpc_timeout_ms)
    }

    pub fn version_gc_max_idle(&self) -> Duration {
        Duration::from_millis(self.version_gc.max_idle_ms)
    }

    pub fn l1_gc_interval(&self) -> Duration {
        Duration::from_millis(self.l1_gc.interval_ms)
    }

    pub fn view_gc_backoff(&self) -> Duration {
        Duration::from_millis(self.view_gc.backoff_ms)
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| "{}".to_string())
    }
}
