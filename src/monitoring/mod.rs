//! Performance and telemetry tracking.

pub mod performance;

pub use performance::{
    AlertKind, CacheCounters, MAX_SAMPLES_PER_OPERATION, OperationStats, PerformanceAlert,
    PerformanceMonitor,
};
