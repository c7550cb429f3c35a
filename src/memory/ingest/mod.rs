//! Message ingestion: semantic hashing and classification.

pub mod classifier;
pub mod dedupe;

pub use classifier::{MemoryClassification, MemoryClassifier};
pub use dedupe::{hash_fragment, normalize_text, semantic_hash, significant_words};
