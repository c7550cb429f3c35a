//! Attachment classification and retention.

pub mod classifier;
pub mod file_store;
pub mod metadata;
pub mod retention;
pub mod source;
pub mod sweeper;

pub use classifier::{
    AttachmentClassification, AttachmentClassifier, AttachmentTier, KEEP_FOREVER,
    TaxonomySuggestion,
};
pub use file_store::{FileStat, FileStore, LocalFileStore};
pub use metadata::{AttachmentMetadata, AttachmentRecord};
pub use retention::{RetentionEvaluator, SweepReport, file_age_days, should_delete};
pub use source::{AttachmentSource, SqliteAttachmentSource};
pub use sweeper::RetentionSweeper;
