//! Coach memory subsystem.
//!
//! - `core`: persisted entries and categories
//! - `ingest`: semantic hashing and keyword classification
//! - `storage`: `SQLite` memory store
//! - `prompt`: coach context block and budget enforcement
//! - `engine`: deduplicating memory service with context caching

pub mod core;
pub mod engine;
pub mod ingest;
pub mod prompt;
pub mod storage;

pub use self::core::{MemoryCategory, MemoryEntry};
pub use engine::{DedupeDecision, MemoryService};
pub use ingest::{MemoryClassification, MemoryClassifier, semantic_hash};
pub use prompt::{CoachContextParts, build_coach_context, enforce_budget};
pub use storage::{MemoryStore, SqliteMemoryStore};
