//! Configuration System
//!
//! Handles loading engine settings from files and environment variables.
//! Supports TOML config files and environment variable overrides.

use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Main settings structure for one import engine instance
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Path of the delimited source file to import
    pub source_file: String,

    /// Create the source file's parent directory at startup if missing
    #[serde(default)]
    pub auto_create_source_dir: bool,

    /// Cron expression driving scheduled imports (seconds field included)
    #[serde(default = "default_schedule")]
    pub schedule: String,

    /// Pause between a schedule fire and the import itself, in seconds.
    /// Clamped to under one minute at runtime.
    #[serde(default = "default_settling_delay")]
    pub settling_delay_secs: u64,

    /// Comma-separated column indices forming the base identifier
    #[serde(default = "default_id_columns")]
    pub id_columns: String,

    /// Comma-separated column indices holding the numeric values
    #[serde(default = "default_data_columns")]
    pub data_columns: String,

    /// Comma-separated metric name suffixes, one per data column
    #[serde(default = "default_metric_suffixes")]
    pub metric_suffixes: String,

    /// Emit samples for NaN cells instead of skipping them
    #[serde(default)]
    pub import_nan_values: bool,

    /// Delete the source file after each run
    #[serde(default)]
    pub delete_after_import: bool,

    /// How long to wait for the source file to become readable
    #[serde(default = "default_read_lock_timeout")]
    pub read_lock_timeout_secs: u64,

    /// Number of leading header rows to skip
    #[serde(default = "default_header_rows")]
    pub header_rows_to_skip: usize,

    /// Display name of this engine instance, substituted into the
    /// parent group template
    #[serde(default = "default_instance_name")]
    pub instance_name: String,

    /// Template for the parent group's reference name; `{name}` expands
    /// to `instance_name`
    #[serde(default = "default_parent_group_template")]
    pub parent_group_template: String,

    /// Offset stored on each catalog record, applied downstream
    #[serde(default)]
    pub value_adder: f64,

    /// Scale factor stored on each catalog record, applied downstream
    #[serde(default = "default_value_multiplier")]
    pub value_multiplier: f64,

    /// Kind of catalog point created for each metric
    #[serde(default)]
    pub point_kind: PointKind,

    #[serde(default)]
    pub catalog: CatalogConfig,

    #[serde(default)]
    pub log: LogConfig,
}

fn default_schedule() -> String {
    // Every 5 minutes
    "0 */5 * * * *".to_string()
}

fn default_settling_delay() -> u64 {
    30
}

fn default_id_columns() -> String {
    "0,1".to_string()
}

fn default_data_columns() -> String {
    "10,11,12,13".to_string()
}

fn default_metric_suffixes() -> String {
    "HighAlert,HighWarning,LowWarning,LowAlert".to_string()
}

fn default_read_lock_timeout() -> u64 {
    5
}

fn default_header_rows() -> usize {
    1
}

fn default_instance_name() -> String {
    "limitflow".to_string()
}

fn default_parent_group_template() -> String {
    "LIMITS!{name}".to_string()
}

fn default_value_multiplier() -> f64 {
    1_000_000.0
}

/// Kind of time-series point a catalog record represents
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PointKind {
    /// Continuous numeric value (the default for limit thresholds)
    #[default]
    Analog,
    /// Two-state value
    Binary,
    /// Monotonic counter
    Counter,
}

impl std::fmt::Display for PointKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PointKind::Analog => write!(f, "analog"),
            PointKind::Binary => write!(f, "binary"),
            PointKind::Counter => write!(f, "counter"),
        }
    }
}

impl std::str::FromStr for PointKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "analog" => Ok(PointKind::Analog),
            "binary" => Ok(PointKind::Binary),
            "counter" => Ok(PointKind::Counter),
            other => Err(format!("unknown point kind: {}", other)),
        }
    }
}

/// Catalog store configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogConfig {
    /// Path of the SQLite catalog database
    #[serde(default = "default_catalog_path")]
    pub path: String,
}

fn default_catalog_path() -> String {
    dirs::data_local_dir()
        .map(|p| {
            p.join("limitflow")
                .join("catalog.db")
                .to_string_lossy()
                .to_string()
        })
        .unwrap_or_else(|| "./limitflow_catalog.db".to_string())
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            path: default_catalog_path(),
        }
    }
}

/// Activity log configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    #[serde(default = "default_log_enabled")]
    pub enabled: bool,

    /// Path of the activity log file
    #[serde(default = "default_log_path")]
    pub path: String,

    /// Maximum log size in megabytes, clamped to 1..=10
    #[serde(default = "default_log_size_mb")]
    pub size_mb: u64,

    /// What to do when the log reaches its size bound
    #[serde(default)]
    pub when_full: RolloverBehavior,
}

fn default_log_enabled() -> bool {
    true
}

fn default_log_path() -> String {
    dirs::data_local_dir()
        .map(|p| {
            p.join("limitflow")
                .join("activity.log")
                .to_string_lossy()
                .to_string()
        })
        .unwrap_or_else(|| "./limitflow_activity.log".to_string())
}

fn default_log_size_mb() -> u64 {
    1
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            enabled: default_log_enabled(),
            path: default_log_path(),
            size_mb: default_log_size_mb(),
            when_full: RolloverBehavior::default(),
        }
    }
}

/// Behavior when the activity log reaches its size bound
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RolloverBehavior {
    /// Discard the existing contents and start over
    #[default]
    Truncate,
    /// Rename the full log aside and start a fresh one
    Archive,
}

impl Settings {
    /// Load settings from a TOML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        let settings: Settings = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Ok(settings)
    }

    /// Load settings with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut settings = Self::load(path)?;
        settings.apply_env_overrides();
        Ok(settings)
    }

    /// Load from the default config locations
    pub fn load_default() -> Result<Self, ConfigError> {
        let config_paths = [
            dirs::config_dir().map(|p| p.join("limitflow").join("config.toml")),
            Some(PathBuf::from("/etc/limitflow/config.toml")),
            Some(PathBuf::from("./config.toml")),
        ];

        for path_opt in config_paths.iter().flatten() {
            if path_opt.exists() {
                match Self::load_with_env(path_opt) {
                    Ok(settings) => {
                        tracing::info!("Loaded config from {:?}", path_opt);
                        return Ok(settings);
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load config from {:?}: {}", path_opt, e);
                    }
                }
            }
        }

        Err(ConfigError::NoConfig)
    }

    /// Apply environment variable overrides to existing settings
    fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var("LIMITFLOW_SOURCE_FILE") {
            self.source_file = path;
        }
        if let Ok(schedule) = std::env::var("LIMITFLOW_SCHEDULE") {
            self.schedule = schedule;
        }
        if let Ok(path) = std::env::var("LIMITFLOW_CATALOG_PATH") {
            self.catalog.path = path;
        }
        if let Ok(path) = std::env::var("LIMITFLOW_LOG_PATH") {
            self.log.path = path;
        }
    }

    /// Parent group reference name, with `{name}` expanded
    pub fn parent_group_name(&self) -> String {
        self.parent_group_template
            .replace("{name}", &self.instance_name)
    }

    /// Log size bound in bytes, clamped to the 1..=10 MB range
    pub fn log_size_bytes(&self) -> u64 {
        self.log.size_mb.clamp(1, 10) * 1024 * 1024
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },

    #[error("No config file found in default locations")]
    NoConfig,

    #[error("Invalid cron expression {expr:?}: {error}")]
    BadSchedule { expr: String, error: String },

    #[error("No id columns configured")]
    NoIdColumns,

    #[error("No data columns configured")]
    NoDataColumns,

    #[error("No metric suffixes configured")]
    NoSuffixes,

    #[error("{data} data columns configured but {suffixes} metric suffixes")]
    ColumnSuffixMismatch { data: usize, suffixes: usize },
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# Limitflow Configuration
#
# Environment variables override these settings:
# - LIMITFLOW_SOURCE_FILE
# - LIMITFLOW_SCHEDULE
# - LIMITFLOW_CATALOG_PATH
# - LIMITFLOW_LOG_PATH

# Delimited file to import (required)
source_file = "/data/exports/limits.csv"

# Create the source directory at startup if missing
auto_create_source_dir = false

# Cron schedule (seconds minutes hours day-of-month month day-of-week)
schedule = "0 */5 * * * *"

# Seconds to wait after a schedule fire before importing (< 60)
settling_delay_secs = 30

# Columns joined with "." to form the base identifier
id_columns = "0,1"

# Columns carrying numeric values, and the metric suffix for each
data_columns = "10,11,12,13"
metric_suffixes = "HighAlert,HighWarning,LowWarning,LowAlert"

# Emit NaN cells as samples instead of skipping them
import_nan_values = false

# Remove the source file once a run completes
delete_after_import = false

# Seconds to wait for the file to become readable
read_lock_timeout_secs = 5

# Leading rows to skip
header_rows_to_skip = 1

# Instance name, substituted into the parent group template
instance_name = "limitflow"
parent_group_template = "LIMITS!{name}"

# Offset and scale stored on each catalog record
value_adder = 0.0
value_multiplier = 1000000.0

# Kind of catalog point: analog, binary or counter
point_kind = "analog"

[catalog]
# SQLite catalog database
path = "~/.local/share/limitflow/catalog.db"

[log]
# Append-only activity log
enabled = true
path = "~/.local/share/limitflow/activity.log"

# Size bound in MB (1-10) and what to do when it is reached
size_mb = 1
when_full = "truncate"
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_minimal_toml() {
        let settings: Settings = toml::from_str(r#"source_file = "/tmp/limits.csv""#).unwrap();

        assert_eq!(settings.schedule, "0 */5 * * * *");
        assert_eq!(settings.settling_delay_secs, 30);
        assert_eq!(settings.id_columns, "0,1");
        assert_eq!(settings.data_columns, "10,11,12,13");
        assert_eq!(
            settings.metric_suffixes,
            "HighAlert,HighWarning,LowWarning,LowAlert"
        );
        assert!(!settings.import_nan_values);
        assert!(!settings.delete_after_import);
        assert_eq!(settings.read_lock_timeout_secs, 5);
        assert_eq!(settings.header_rows_to_skip, 1);
        assert_eq!(settings.value_adder, 0.0);
        assert_eq!(settings.value_multiplier, 1_000_000.0);
        assert_eq!(settings.point_kind, PointKind::Analog);
        assert!(settings.log.enabled);
    }

    #[test]
    fn test_parent_group_name_expansion() {
        let mut settings: Settings =
            toml::from_str(r#"source_file = "/tmp/limits.csv""#).unwrap();
        settings.instance_name = "plant7".to_string();

        assert_eq!(settings.parent_group_name(), "LIMITS!plant7");
    }

    #[test]
    fn test_log_size_clamped() {
        let mut settings: Settings =
            toml::from_str(r#"source_file = "/tmp/limits.csv""#).unwrap();

        settings.log.size_mb = 0;
        assert_eq!(settings.log_size_bytes(), 1024 * 1024);

        settings.log.size_mb = 25;
        assert_eq!(settings.log_size_bytes(), 10 * 1024 * 1024);
    }

    #[test]
    fn test_missing_source_file_is_parse_error() {
        let result: Result<Settings, _> = toml::from_str("schedule = \"0 * * * * *\"");
        assert!(result.is_err());
    }

    #[test]
    fn test_generated_config_parses() {
        let content = generate_default_config();
        let settings: Settings = toml::from_str(&content).unwrap();
        assert_eq!(settings.source_file, "/data/exports/limits.csv");
        assert_eq!(settings.log.when_full, RolloverBehavior::Truncate);
    }
}
