//! Memory service orchestration.

pub mod core;

pub use self::core::{DedupeDecision, MemoryService};
