//! Configuration for the coach services.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::accelerator::config::AcceleratorConfig;
use crate::core::errors::{CoachError, CoachResult};

/// Top-level configuration for every service in the crate.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CoachConfig {
    /// Memory deduplication and retrieval settings.
    pub memory: MemoryServiceConfig,
    /// Attachment retention settings.
    pub retention: RetentionConfig,
    /// Nutrition aggregation settings.
    pub nutrition: NutritionConfig,
    /// Remote accelerator settings.
    pub accelerator: AcceleratorConfig,
    /// Performance monitoring settings.
    pub monitoring: MonitoringConfig,
    /// Storage settings.
    pub storage: StorageConfig,
    /// Coach prompt construction settings.
    pub prompt: PromptConfig,
}

impl CoachConfig {
    /// Build a configuration from defaults plus `WELLCOACH_*` environment overrides.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from defaults plus overrides found by `lookup`.
    ///
    /// Unparseable values are ignored and the default is kept.
    #[must_use]
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(path) = lookup("WELLCOACH_SQLITE_PATH") {
            config.storage.sqlite_path = PathBuf::from(path);
        }
        if let Some(dir) = lookup("WELLCOACH_UPLOADS_DIR") {
            config.retention.uploads_dir = PathBuf::from(dir);
        }
        if let Some(url) = lookup("WELLCOACH_ACCELERATOR_URL") {
            config.accelerator.base_url = url;
        }
        if let Some(enabled) = lookup("WELLCOACH_ACCELERATOR_ENABLED").and_then(|v| parse_flag(&v)) {
            config.accelerator.enabled = enabled;
        }
        if let Some(ms) = lookup("WELLCOACH_ACCELERATOR_TIMEOUT_MS").and_then(|v| v.parse().ok()) {
            config.accelerator.request_timeout = Duration::from_millis(ms);
        }
        if let Some(retries) = lookup("WELLCOACH_ACCELERATOR_RETRIES").and_then(|v| v.parse().ok()) {
            config.accelerator.max_retries = retries;
        }

        config
    }

    /// Validate configuration invariants.
    ///
    /// # Errors
    /// Returns an error if any values are out of range or invalid.
    pub fn validate(&self) -> CoachResult<()> {
        if self.memory.context_limit == 0 {
            return Err(CoachError::InvalidConfig(
                "memory.context_limit must be > 0".to_string(),
            ));
        }

        if self.memory.context_ttl_seconds == 0 {
            return Err(CoachError::InvalidConfig(
                "memory.context_ttl_seconds must be > 0".to_string(),
            ));
        }

        if self.memory.hash_fragment_len == 0 || self.memory.hash_fragment_len > 16 {
            return Err(CoachError::InvalidConfig(
                "memory.hash_fragment_len must be in 1..=16".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.memory.similarity_threshold) {
            return Err(CoachError::InvalidConfig(
                "memory.similarity_threshold must be in 0..=1".to_string(),
            ));
        }

        if self.nutrition.cache_ttl_seconds == 0 {
            return Err(CoachError::InvalidConfig(
                "nutrition.cache_ttl_seconds must be > 0".to_string(),
            ));
        }

        if self.nutrition.utc_offset_minutes.abs() >= 24 * 60 {
            return Err(CoachError::InvalidConfig(
                "nutrition.utc_offset_minutes must be within one day".to_string(),
            ));
        }

        if self.retention.sweep_interval_seconds == 0 {
            return Err(CoachError::InvalidConfig(
                "retention.sweep_interval_seconds must be > 0".to_string(),
            ));
        }

        if self.prompt.max_chars == 0 {
            return Err(CoachError::InvalidConfig(
                "prompt.max_chars must be > 0".to_string(),
            ));
        }

        self.accelerator.validate()?;
        Ok(())
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Memory deduplication and contextual retrieval settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MemoryServiceConfig {
    /// TTL of the contextual-retrieval cache.
    pub context_ttl_seconds: u64,
    /// Number of memories returned for a query.
    pub context_limit: usize,
    /// Query prefix length used in the cache key.
    pub query_prefix_chars: usize,
    /// Length of the hash fragment used for duplicate containment checks.
    pub hash_fragment_len: usize,
    /// Optional cap on cached query results.
    pub max_cache_entries: Option<usize>,
    /// Minimum similarity for accelerator-ranked memories.
    pub similarity_threshold: f64,
}

impl Default for MemoryServiceConfig {
    fn default() -> Self {
        Self {
            context_ttl_seconds: 300,
            context_limit: 5,
            query_prefix_chars: 50,
            hash_fragment_len: 8,
            max_cache_entries: Some(10_000),
            similarity_threshold: 0.7,
        }
    }
}

/// Attachment retention settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RetentionConfig {
    /// Whether the background sweeper runs.
    pub enabled: bool,
    /// Directory holding uploaded attachments.
    pub uploads_dir: PathBuf,
    /// Interval between sweeps.
    pub sweep_interval_seconds: u64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            uploads_dir: PathBuf::from("uploads"),
            sweep_interval_seconds: 60 * 60 * 24,
        }
    }
}

/// Nutrition aggregation settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NutritionConfig {
    /// TTL of cached daily summaries.
    pub cache_ttl_seconds: u64,
    /// Offset of the users' local day from UTC, in minutes.
    pub utc_offset_minutes: i32,
}

impl Default for NutritionConfig {
    fn default() -> Self {
        Self {
            cache_ttl_seconds: 3600,
            utc_offset_minutes: 0,
        }
    }
}

/// Performance monitoring settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MonitoringConfig {
    /// Slow-operation threshold applied when no override exists.
    pub default_threshold_ms: u64,
    /// Per-operation slow thresholds.
    pub thresholds_ms: HashMap<String, u64>,
    /// Error ratio above which an alert is raised.
    pub max_error_rate: f64,
    /// Minimum events before the error ratio is evaluated.
    pub min_events_for_error_rate: usize,
    /// Number of alerts kept in memory.
    pub max_alerts: usize,
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        let mut thresholds_ms = HashMap::new();
        thresholds_ms.insert("memory.context".to_string(), 100);
        thresholds_ms.insert("memory.dedupe".to_string(), 250);
        Self {
            default_threshold_ms: 1000,
            thresholds_ms,
            max_error_rate: 0.1,
            min_events_for_error_rate: 20,
            max_alerts: 100,
        }
    }
}

/// Storage configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StorageConfig {
    /// `SQLite` database path.
    pub sqlite_path: PathBuf,
    /// Memory entry table name.
    pub memory_table: String,
    /// Health record table name.
    pub health_table: String,
    /// Attachment table name.
    pub attachment_table: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            sqlite_path: PathBuf::from("wellcoach.sqlite"),
            memory_table: "memory_entries".to_string(),
            health_table: "health_records".to_string(),
            attachment_table: "attachments".to_string(),
        }
    }
}

/// Coach prompt construction settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PromptConfig {
    /// Maximum context block size in characters.
    pub max_chars: usize,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self { max_chars: 2400 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = CoachConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.memory.context_limit, 5);
        assert_eq!(config.memory.context_ttl_seconds, 300);
        assert!(!config.accelerator.enabled);
    }

    #[test]
    fn test_lookup_overrides() {
        let config = CoachConfig::from_lookup(|key| match key {
            "WELLCOACH_ACCELERATOR_ENABLED" => Some("true".to_string()),
            "WELLCOACH_ACCELERATOR_URL" => Some("http://accel:9000".to_string()),
            "WELLCOACH_ACCELERATOR_TIMEOUT_MS" => Some("250".to_string()),
            "WELLCOACH_ACCELERATOR_RETRIES" => Some("oops".to_string()),
            _ => None,
        });

        assert!(config.accelerator.enabled);
        assert_eq!(config.accelerator.base_url, "http://accel:9000");
        assert_eq!(config.accelerator.request_timeout, Duration::from_millis(250));
        assert_eq!(config.accelerator.max_retries, 3);
    }

    #[test]
    fn test_validate_rejects_zero_limit() {
        let mut config = CoachConfig::default();
        config.memory.context_limit = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_accelerator_url() {
        let mut config = CoachConfig::default();
        config.accelerator.base_url = "not a url".to_string();
        assert!(config.validate().is_err());
    }
}
