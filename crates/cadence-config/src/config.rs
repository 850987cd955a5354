//! Configuration types and loading for the cadence system.
//!
//! The main entry point is [`CadenceConfig`], which represents the contents of
//! `.cadence/config.yaml`. [`load_layered`] merges defaults, that file and
//! `CADENCE_*` environment variables; [`load_config`] and [`save_config`]
//! read and write the YAML file alone.

use std::path::{Path, PathBuf};

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Yaml};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// File name of the configuration inside the data directory.
pub const CONFIG_FILE: &str = "config.yaml";

/// Prefix of environment variables that override configuration values.
pub const ENV_PREFIX: &str = "CADENCE_";

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    /// The configuration file contained invalid YAML.
    #[error("failed to parse config file: {0}")]
    ParseError(#[from] serde_yaml::Error),

    /// Merging the configuration layers failed.
    #[error("failed to load configuration: {0}")]
    Layered(#[from] Box<figment::Error>),

    /// The `.cadence/` directory was not found.
    #[error("no .cadence directory found (run 'cadence init' first)")]
    DataDirNotFound,

    /// A configuration value was invalid.
    #[error("invalid configuration value for key '{key}': {reason}")]
    InvalidValue {
        /// The configuration key that had an invalid value.
        key: String,
        /// A description of why the value is invalid.
        reason: String,
    },
}

impl From<figment::Error> for ConfigError {
    fn from(e: figment::Error) -> Self {
        Self::Layered(Box::new(e))
    }
}

/// A specialized `Result` type for configuration operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

fn invalid(key: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        reason: reason.into(),
    }
}

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

/// Which record store backs the collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// One `<collection>.jsonl` file per collection (default).
    #[default]
    Jsonl,
    /// A single `cadence.db` SQLite database.
    Sqlite,
    /// Process memory only; nothing is persisted.
    Memory,
}

impl StorageBackend {
    /// Returns the configuration string for this backend.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Jsonl => "jsonl",
            Self::Sqlite => "sqlite",
            Self::Memory => "memory",
        }
    }
}

/// Storage configuration section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct StorageConfig {
    /// The record store backend.
    #[serde(default)]
    pub backend: StorageBackend,

    /// Directory for data files; defaults to the discovered `.cadence/`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
}

/// Task repository configuration section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TasksConfig {
    /// Prefix for generated task ids.
    #[serde(default = "default_id_prefix")]
    pub id_prefix: String,

    /// Tree depth used by list/show when none is given.
    #[serde(default = "default_max_depth")]
    pub default_max_depth: usize,
}

impl Default for TasksConfig {
    fn default() -> Self {
        Self {
            id_prefix: default_id_prefix(),
            default_max_depth: default_max_depth(),
        }
    }
}

fn default_id_prefix() -> String {
    "task".to_string()
}

fn default_max_depth() -> usize {
    3
}

/// Engagement tracker configuration section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngagementConfig {
    /// Once a profile's total exceeds this, its hourly scores are halved.
    /// `0` disables decay.
    #[serde(default = "default_max_total_events")]
    pub max_total_events: u64,
}

impl Default for EngagementConfig {
    fn default() -> Self {
        Self {
            max_total_events: default_max_total_events(),
        }
    }
}

fn default_max_total_events() -> u64 {
    1000
}

/// Content of the daily notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationConfig {
    #[serde(default = "default_title")]
    pub title: String,
    #[serde(default = "default_body")]
    pub body: String,
    /// Client-side deduplication tag.
    #[serde(default = "default_tag")]
    pub tag: String,
    /// Click-through target.
    #[serde(default = "default_url")]
    pub url: String,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            title: default_title(),
            body: default_body(),
            tag: default_tag(),
            url: default_url(),
        }
    }
}

fn default_title() -> String {
    "Daily check-in".to_string()
}

fn default_body() -> String {
    "Your tasks for today are waiting.".to_string()
}

fn default_tag() -> String {
    "daily-checkin".to_string()
}

fn default_url() -> String {
    "/".to_string()
}

/// Push scheduler configuration section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushConfig {
    /// Seconds between scheduler ticks.
    #[serde(default = "default_tick_interval")]
    pub tick_interval_secs: u64,

    /// Minutes past the target hour before delivery is attempted.
    #[serde(default)]
    pub minute_offset: u32,

    /// Candidate hours cycled through while exploring.
    #[serde(default = "default_probe_hours")]
    pub probe_hours: Vec<u32>,

    /// Engagement events needed before the learned hour is used.
    #[serde(default = "default_min_learned_events")]
    pub min_learned_events: u64,

    /// IANA zone used when a registration does not carry one.
    #[serde(default = "default_timezone")]
    pub default_timezone: String,

    /// Timeout for webhook deliveries.
    #[serde(default = "default_webhook_timeout")]
    pub webhook_timeout_secs: u64,

    #[serde(default)]
    pub notification: NotificationConfig,
}

impl Default for PushConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: default_tick_interval(),
            minute_offset: 0,
            probe_hours: default_probe_hours(),
            min_learned_events: default_min_learned_events(),
            default_timezone: default_timezone(),
            webhook_timeout_secs: default_webhook_timeout(),
            notification: NotificationConfig::default(),
        }
    }
}

fn default_tick_interval() -> u64 {
    60
}

fn default_probe_hours() -> Vec<u32> {
    vec![9, 11, 13, 16, 19, 21]
}

fn default_min_learned_events() -> u64 {
    3
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_webhook_timeout() -> u64 {
    10
}

// ---------------------------------------------------------------------------
// CadenceConfig
// ---------------------------------------------------------------------------

/// The complete contents of `.cadence/config.yaml`.
///
/// All fields are optional in YAML and default to sensible values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct CadenceConfig {
    /// Actor identity override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor: Option<String>,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub tasks: TasksConfig,

    #[serde(default)]
    pub engagement: EngagementConfig,

    #[serde(default)]
    pub push: PushConfig,
}

impl CadenceConfig {
    /// Checks value ranges that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.push.probe_hours.is_empty() {
            return Err(invalid("push.probe_hours", "must contain at least one hour"));
        }
        if let Some(h) = self.push.probe_hours.iter().find(|h| **h > 23) {
            return Err(invalid(
                "push.probe_hours",
                format!("{h} is not an hour of the day (0-23)"),
            ));
        }
        if self.push.minute_offset > 59 {
            return Err(invalid(
                "push.minute_offset",
                format!("{} is not a minute (0-59)", self.push.minute_offset),
            ));
        }
        if self.push.tick_interval_secs == 0 {
            return Err(invalid("push.tick_interval_secs", "must be greater than zero"));
        }
        if self.tasks.id_prefix.trim().is_empty() {
            return Err(invalid("tasks.id_prefix", "must not be empty"));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Load / Save
// ---------------------------------------------------------------------------

/// Builds the layered configuration source for `data_dir`: defaults, then
/// `config.yaml`, then `CADENCE_*` environment variables (`__` separates
/// nested keys, e.g. `CADENCE_PUSH__MINUTE_OFFSET=15`).
pub fn figment(data_dir: &Path) -> Figment {
    Figment::from(Serialized::defaults(CadenceConfig::default()))
        .merge(Yaml::file(data_dir.join(CONFIG_FILE)))
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
}

/// Extracts and validates a configuration from `figment`.
pub fn extract(figment: &Figment) -> Result<CadenceConfig> {
    let config: CadenceConfig = figment.extract()?;
    config.validate()?;
    Ok(config)
}

/// Loads the fully layered configuration for `data_dir`.
///
/// # Errors
///
/// Returns [`ConfigError::Layered`] when a layer cannot be parsed, or
/// [`ConfigError::InvalidValue`] when the merged result fails validation.
pub fn load_layered(data_dir: &Path) -> Result<CadenceConfig> {
    extract(&figment(data_dir))
}

/// Load configuration from `config.yaml` inside the given data directory.
///
/// If the file does not exist, a default [`CadenceConfig`] is returned.
///
/// # Errors
///
/// Returns [`ConfigError::ReadError`] if the file exists but cannot be read,
/// or [`ConfigError::ParseError`] if it contains invalid YAML.
pub fn load_config(data_dir: &Path) -> Result<CadenceConfig> {
    let config_path = data_dir.join(CONFIG_FILE);

    if !config_path.exists() {
        return Ok(CadenceConfig::default());
    }

    let content = std::fs::read_to_string(&config_path)?;

    // An empty file is valid and yields default config.
    if content.trim().is_empty() {
        return Ok(CadenceConfig::default());
    }

    let config: CadenceConfig = serde_yaml::from_str(&content)?;
    Ok(config)
}

/// Save configuration to `config.yaml` inside the given data directory.
///
/// The directory is created if it does not exist.
pub fn save_config(data_dir: &Path, config: &CadenceConfig) -> Result<()> {
    std::fs::create_dir_all(data_dir)?;

    let config_path = data_dir.join(CONFIG_FILE);
    let yaml = serde_yaml::to_string(config)?;
    std::fs::write(config_path, yaml)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_default_config() {
        let cfg = CadenceConfig::default();
        assert_eq!(cfg.storage.backend, StorageBackend::Jsonl);
        assert_eq!(cfg.tasks.id_prefix, "task");
        assert_eq!(cfg.tasks.default_max_depth, 3);
        assert_eq!(cfg.push.probe_hours, vec![9, 11, 13, 16, 19, 21]);
        assert_eq!(cfg.push.tick_interval_secs, 60);
        assert_eq!(cfg.push.min_learned_events, 3);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_load_missing_config_returns_default() {
        let dir = PathBuf::from("/nonexistent/path/.cadence");
        let cfg = load_config(&dir).unwrap();
        assert_eq!(cfg, CadenceConfig::default());
    }

    #[test]
    fn test_roundtrip_config() {
        let dir = tempfile::tempdir().unwrap();
        let data_dir = dir.path().join(".cadence");

        let mut cfg = CadenceConfig::default();
        cfg.storage.backend = StorageBackend::Sqlite;
        cfg.push.minute_offset = 30;

        save_config(&data_dir, &cfg).unwrap();
        let loaded = load_config(&data_dir).unwrap();
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn test_deserialize_partial_yaml() {
        let yaml = "push:\n  minute_offset: 15\n";
        let cfg: CadenceConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(cfg.push.minute_offset, 15);
        // Everything else should be default
        assert_eq!(cfg.push.default_timezone, "UTC");
        assert_eq!(cfg.engagement.max_total_events, 1000);
    }

    #[test]
    fn test_layered_file_over_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE),
            "storage:\n  backend: memory\npush:\n  probe_hours: [8, 20]\n",
        )
        .unwrap();

        let figment = figment(dir.path()).merge(Serialized::default("push.minute_offset", 45));
        let cfg = extract(&figment).unwrap();
        assert_eq!(cfg.storage.backend, StorageBackend::Memory);
        assert_eq!(cfg.push.probe_hours, vec![8, 20]);
        assert_eq!(cfg.push.minute_offset, 45);
        assert_eq!(cfg.tasks.id_prefix, "task");
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut cfg = CadenceConfig::default();
        cfg.push.probe_hours = vec![9, 24];
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::InvalidValue { ref key, .. }) if key == "push.probe_hours"
        ));

        let mut cfg = CadenceConfig::default();
        cfg.push.probe_hours.clear();
        assert!(cfg.validate().is_err());

        let mut cfg = CadenceConfig::default();
        cfg.push.minute_offset = 60;
        assert!(cfg.validate().is_err());

        let mut cfg = CadenceConfig::default();
        cfg.push.tick_interval_secs = 0;
        assert!(cfg.validate().is_err());
    }
}
