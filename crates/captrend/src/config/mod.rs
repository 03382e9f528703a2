use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::{CaptrendError, Result};

/// Main configuration structure for captrend
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// Document store location and target collection
    #[serde(default)]
    pub storage: StorageConfig,
    /// Two-tier retention policy
    #[serde(default)]
    pub retention: RetentionConfig,
    /// Deletion worker pool
    #[serde(default)]
    pub deletion: DeletionConfig,
    /// Deletion audit log
    #[serde(default)]
    pub audit: AuditConfig,
}

/// Document store configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Base directory of the LanceDB database
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Collection compacted when none is given on the command line
    #[serde(default = "default_collection")]
    pub collection: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            collection: default_collection(),
        }
    }
}

pub fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".captrend"))
        .unwrap_or_else(|| PathBuf::from(".captrend"))
}

fn default_collection() -> String {
    "capacity_trends".to_string()
}

/// Retention policy configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RetentionConfig {
    /// Observations younger than this many days are in the recent partition
    #[serde(default = "default_recent_window_days")]
    pub recent_window_days: i64,
    /// Minimum change in perc_used (percentage points) for a recent record to survive
    #[serde(default = "default_change_threshold")]
    pub change_threshold: f64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            recent_window_days: default_recent_window_days(),
            change_threshold: default_change_threshold(),
        }
    }
}

/// Upper bound for `retention.recent_window_days` (about a century)
pub const MAX_RECENT_WINDOW_DAYS: i64 = 36_500;

fn default_recent_window_days() -> i64 {
    7
}

fn default_change_threshold() -> f64 {
    0.01
}

/// Deletion configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DeletionConfig {
    /// Maximum number of delete calls in flight
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl Default for DeletionConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
        }
    }
}

fn default_concurrency() -> usize {
    8
}

/// Audit log configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AuditConfig {
    /// Table receiving one row per deleted document
    #[serde(default = "default_audit_table")]
    pub table: String,
    /// Number of deletion records buffered before a write
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            table: default_audit_table(),
            batch_size: default_batch_size(),
        }
    }
}

fn default_audit_table() -> String {
    "deleted_docs".to_string()
}

fn default_batch_size() -> usize {
    500
}

impl Config {
    /// Load configuration from an explicit path, or from the first default
    /// location that exists, falling back to defaults.
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        if let Some(path) = config_path {
            tracing::info!("Loading config from: {}", path.display());
            return Self::from_file(path);
        }

        let default_paths = [
            dirs::home_dir().map(|h| h.join(".captrend").join("config.toml")),
            dirs::config_dir().map(|c| c.join("captrend").join("config.toml")),
            Some(PathBuf::from("config.toml")),
        ];

        for path in default_paths.iter().flatten() {
            if path.exists() {
                tracing::info!("Loading config from: {}", path.display());
                return Self::from_file(path);
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            CaptrendError::Config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| CaptrendError::Config(format!("Failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.storage.collection.trim().is_empty() {
            return Err(CaptrendError::Config(
                "storage.collection must not be empty".to_string(),
            ));
        }
        let window = self.retention.recent_window_days;
        if !(0..=MAX_RECENT_WINDOW_DAYS).contains(&window) {
            return Err(CaptrendError::Config(format!(
                "retention.recent_window_days must be between 0 and {MAX_RECENT_WINDOW_DAYS}, got {window}"
            )));
        }
        let threshold = self.retention.change_threshold;
        if threshold.is_nan() || threshold < 0.0 {
            return Err(CaptrendError::Config(format!(
                "retention.change_threshold must be >= 0, got {}",
                self.retention.change_threshold
            )));
        }
        if self.deletion.concurrency == 0 {
            return Err(CaptrendError::Config(
                "deletion.concurrency must be at least 1".to_string(),
            ));
        }
        if self.audit.batch_size == 0 {
            return Err(CaptrendError::Config(
                "audit.batch_size must be at least 1".to_string(),
            ));
        }
        if self.audit.table.trim().is_empty() {
            return Err(CaptrendError::Config(
                "audit.table must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}
