//! Shared building blocks: configuration, errors, identifiers, clocks, and outcomes.

pub mod clock;
pub mod config;
pub mod errors;
pub mod ids;
pub mod outcome;
pub mod patterns;

use std::future::Future;
use std::pin::Pin;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{
    CoachConfig, MemoryServiceConfig, MonitoringConfig, NutritionConfig, PromptConfig,
    RetentionConfig, StorageConfig,
};
pub use errors::{CoachError, CoachResult};
pub use ids::{ConversationId, MemoryId, RecordId, UserId};
pub use outcome::Outcome;

/// Boxed future type for store operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
