//! Core memory types.

pub mod item;
pub mod kinds;

pub use item::MemoryEntry;
pub use kinds::{MemoryCategory, MemoryCategoryParseError};
