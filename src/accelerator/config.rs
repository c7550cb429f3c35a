//! Configuration for the remote accelerator client.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::core::errors::{CoachError, CoachResult};

/// Remote accelerator settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AcceleratorConfig {
    /// Whether the accelerator may be called at all.
    pub enabled: bool,
    /// Base URL of the accelerator service.
    pub base_url: String,
    /// Per-attempt request timeout.
    #[serde(with = "duration_ms_serde")]
    pub request_timeout: Duration,
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Fixed delay between attempts.
    #[serde(with = "duration_ms_serde")]
    pub retry_delay: Duration,
    /// Upper bound on the time spent on one call, retries included.
    #[serde(with = "duration_ms_serde")]
    pub request_deadline: Duration,
    /// Interval between background health checks.
    #[serde(with = "duration_ms_serde")]
    pub health_check_interval: Duration,
    /// Age after which the last health check no longer counts.
    #[serde(with = "duration_ms_serde")]
    pub health_stale_after: Duration,
}

impl Default for AcceleratorConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: "http://127.0.0.1:8081".to_string(),
            request_timeout: Duration::from_millis(5000),
            max_retries: 3,
            retry_delay: Duration::from_millis(1000),
            request_deadline: Duration::from_secs(30),
            health_check_interval: Duration::from_secs(30),
            health_stale_after: Duration::from_secs(60),
        }
    }
}

impl AcceleratorConfig {
    /// Enable the accelerator at `base_url`.
    #[must_use]
    pub fn enabled_at(base_url: impl Into<String>) -> Self {
        Self {
            enabled: true,
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Set the per-attempt timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Set the retry budget and delay.
    #[must_use]
    pub const fn with_retries(mut self, max_retries: u32, retry_delay: Duration) -> Self {
        self.max_retries = max_retries;
        self.retry_delay = retry_delay;
        self
    }

    /// Validate the configuration.
    ///
    /// # Errors
    /// Returns an error if the base URL does not parse or a duration is zero.
    pub fn validate(&self) -> CoachResult<()> {
        Url::parse(&self.base_url)?;

        if self.request_timeout.is_zero() {
            return Err(CoachError::InvalidConfig(
                "accelerator.request_timeout must be > 0".to_string(),
            ));
        }

        if self.health_check_interval.is_zero() {
            return Err(CoachError::InvalidConfig(
                "accelerator.health_check_interval must be > 0".to_string(),
            ));
        }

        if self.health_stale_after < self.health_check_interval {
            return Err(CoachError::InvalidConfig(
                "accelerator.health_stale_after must be >= health_check_interval".to_string(),
            ));
        }

        Ok(())
    }
}

/// Serde module for millisecond `Duration` fields.
mod duration_ms_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        u64::try_from(duration.as_millis())
            .unwrap_or(u64::MAX)
            .serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AcceleratorConfig::default();
        assert!(!config.enabled);
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.health_check_interval, Duration::from_secs(30));
        assert_eq!(config.health_stale_after, Duration::from_secs(60));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_durations_serialize_as_millis() {
        let config = AcceleratorConfig::default().with_timeout(Duration::from_millis(750));
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["request_timeout"], 750);

        let restored: AcceleratorConfig = serde_json::from_value(json).unwrap();
        assert_eq!(restored.request_timeout, Duration::from_millis(750));
    }

    #[test]
    fn test_stale_window_must_cover_interval() {
        let mut config = AcceleratorConfig::enabled_at("http://localhost:1");
        config.health_stale_after = Duration::from_secs(1);
        assert!(config.validate().is_err());
    }
}
