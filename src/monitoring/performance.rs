//! In-process latency and error tracking.
//!
//! Each operation keeps a rolling window of its most recent durations. Slow
//! samples and high error rates raise [`PerformanceAlert`]s, which are logged
//! and kept in a bounded log.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use tracing::warn;

use crate::core::clock::Clock;
use crate::core::config::MonitoringConfig;

/// Samples kept per operation.
pub const MAX_SAMPLES_PER_OPERATION: usize = 1000;

#[derive(Debug, Default)]
struct OperationWindow {
    durations: VecDeque<Duration>,
    successes: u64,
    errors: u64,
}

impl OperationWindow {
    fn push(&mut self, duration: Duration) {
        if self.durations.len() == MAX_SAMPLES_PER_OPERATION {
            self.durations.pop_front();
        }
        self.durations.push_back(duration);
        self.successes += 1;
    }

    #[allow(clippy::cast_precision_loss)]
    fn error_rate(&self) -> f64 {
        let total = self.successes + self.errors;
        if total == 0 {
            0.0
        } else {
            self.errors as f64 / total as f64
        }
    }
}

/// Latency statistics over the current window.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct OperationStats {
    /// Operation name.
    pub operation: String,
    /// Samples in the window.
    pub count: usize,
    /// Errors recorded since start.
    pub error_count: u64,
    /// Mean duration in milliseconds.
    pub mean_ms: f64,
    /// Fastest sample in milliseconds.
    pub min_ms: f64,
    /// Slowest sample in milliseconds.
    pub max_ms: f64,
    /// 95th percentile (nearest rank) in milliseconds.
    pub p95_ms: f64,
}

/// What triggered an alert.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AlertKind {
    /// A single sample exceeded the operation threshold.
    SlowOperation {
        /// Observed duration.
        duration_ms: u64,
        /// Threshold in force.
        threshold_ms: u64,
    },
    /// The error rate exceeded the configured maximum.
    HighErrorRate {
        /// Observed rate in `0.0..=1.0`.
        rate: f64,
        /// Maximum allowed rate.
        threshold: f64,
    },
}

/// A recorded alert.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PerformanceAlert {
    /// Operation name.
    pub operation: String,
    /// Trigger.
    pub kind: AlertKind,
    /// When it was raised.
    pub raised_at: DateTime<Utc>,
}

/// Hit and miss counters for one cache.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CacheCounters {
    /// Lookups served from cache.
    pub hits: u64,
    /// Lookups that fell through.
    pub misses: u64,
}

impl CacheCounters {
    /// Fraction of lookups served from cache.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            return 0.0;
        }
        self.hits as f64 / total as f64
    }
}

/// Process-wide performance monitor.
pub struct PerformanceMonitor {
    config: MonitoringConfig,
    clock: Arc<dyn Clock>,
    operations: DashMap<String, OperationWindow>,
    caches: DashMap<String, CacheCounters>,
    alerts: Mutex<VecDeque<PerformanceAlert>>,
}

impl PerformanceMonitor {
    /// Create a monitor.
    #[must_use]
    pub fn new(config: MonitoringConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            operations: DashMap::new(),
            caches: DashMap::new(),
            alerts: Mutex::new(VecDeque::new()),
        }
    }

    /// Threshold applied to `operation`.
    #[must_use]
    pub fn threshold_for(&self, operation: &str) -> Duration {
        let ms = self
            .config
            .thresholds_ms
            .get(operation)
            .copied()
            .unwrap_or(self.config.default_threshold_ms);
        Duration::from_millis(ms)
    }

    /// Record a successful sample.
    pub fn record(&self, operation: &str, duration: Duration) {
        self.operations
            .entry(operation.to_string())
            .or_default()
            .push(duration);

        let threshold = self.threshold_for(operation);
        if duration > threshold {
            self.raise(
                operation,
                AlertKind::SlowOperation {
                    duration_ms: millis(duration),
                    threshold_ms: millis(threshold),
                },
            );
        }
    }

    /// Record a failed call.
    pub fn record_error(&self, operation: &str) {
        let (events, rate) = {
            let mut window = self.operations.entry(operation.to_string()).or_default();
            window.errors += 1;
            (window.successes + window.errors, window.error_rate())
        };

        let enough = usize::try_from(events).unwrap_or(usize::MAX) >= self.config.min_events_for_error_rate;
        if enough && rate > self.config.max_error_rate {
            self.raise(
                operation,
                AlertKind::HighErrorRate {
                    rate,
                    threshold: self.config.max_error_rate,
                },
            );
        }
    }

    /// Time `future` and record it as a sample or an error.
    ///
    /// # Errors
    /// Returns the future's own error unchanged.
    pub async fn track<T, E, F>(&self, operation: &str, future: F) -> Result<T, E>
    where
        F: Future<Output = Result<T, E>>,
    {
        let started = Instant::now();
        let result = future.await;
        match &result {
            Ok(_) => self.record(operation, started.elapsed()),
            Err(_) => self.record_error(operation),
        }
        result
    }

    /// Count a cache hit.
    pub fn record_cache_hit(&self, cache: &str) {
        self.caches.entry(cache.to_string()).or_default().hits += 1;
    }

    /// Count a cache miss.
    pub fn record_cache_miss(&self, cache: &str) {
        self.caches.entry(cache.to_string()).or_default().misses += 1;
    }

    /// Counters for `cache`.
    #[must_use]
    pub fn cache_counters(&self, cache: &str) -> CacheCounters {
        self.caches.get(cache).map(|c| *c).unwrap_or_default()
    }

    /// Statistics for `operation`, if it has been seen.
    #[must_use]
    pub fn stats(&self, operation: &str) -> Option<OperationStats> {
        let window = self.operations.get(operation)?;
        Some(compute_stats(operation, &window))
    }

    /// Statistics for every operation, sorted by name.
    #[must_use]
    pub fn all_stats(&self) -> Vec<OperationStats> {
        let mut stats: Vec<_> = self
            .operations
            .iter()
            .map(|entry| compute_stats(entry.key(), entry.value()))
            .collect();
        stats.sort_by(|a, b| a.operation.cmp(&b.operation));
        stats
    }

    /// Alerts currently retained, oldest first.
    #[must_use]
    pub fn alerts(&self) -> Vec<PerformanceAlert> {
        self.alerts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    /// Drop all samples, counters, and alerts.
    pub fn reset(&self) {
        self.operations.clear();
        self.caches.clear();
        self.alerts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    fn raise(&self, operation: &str, kind: AlertKind) {
        warn!(operation, alert = ?kind, "Performance alert");

        let alert = PerformanceAlert {
            operation: operation.to_string(),
            kind,
            raised_at: self.clock.now(),
        };

        let mut alerts = self.alerts.lock().unwrap_or_else(PoisonError::into_inner);
        while alerts.len() >= self.config.max_alerts.max(1) {
            alerts.pop_front();
        }
        alerts.push_back(alert);
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[allow(clippy::cast_precision_loss)]
fn compute_stats(operation: &str, window: &OperationWindow) -> OperationStats {
    let mut samples: Vec<f64> = window
        .durations
        .iter()
        .map(|d| d.as_secs_f64() * 1000.0)
        .collect();
    samples.sort_by(f64::total_cmp);

    let count = samples.len();
    let (mean_ms, min_ms, max_ms, p95_ms) = if count == 0 {
        (0.0, 0.0, 0.0, 0.0)
    } else {
        let mean = samples.iter().sum::<f64>() / count as f64;
        let rank = (count * 95).div_ceil(100).max(1);
        (mean, samples[0], samples[count - 1], samples[rank - 1])
    };

    OperationStats {
        operation: operation.to_string(),
        count,
        error_count: window.errors,
        mean_ms,
        min_ms,
        max_ms,
        p95_ms,
    }
}
