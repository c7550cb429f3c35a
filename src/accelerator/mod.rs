//! Optional remote accelerator for vector-similarity work.
//!
//! The accelerator can be absent or down at any time. Callers check
//! [`AcceleratorClient::is_available`] and keep a local fallback path.

pub mod client;
pub mod config;
pub mod error;
pub mod health;
pub mod types;

pub use client::AcceleratorClient;
pub use config::AcceleratorConfig;
pub use error::AcceleratorError;
pub use health::{AcceleratorStatus, HealthMonitor, HealthState};
pub use types::{EmbeddedMemory, RelevantMemory, TaskPriority};
