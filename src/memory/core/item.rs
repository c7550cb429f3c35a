//! Persisted coach memory.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::errors::{CoachError, CoachResult};
use crate::core::ids::{MemoryId, UserId};
use crate::memory::core::kinds::MemoryCategory;

const REF_MARKER_OPEN: &str = " [ref:";

/// A memory the coach keeps about a user.
///
/// Entries are never edited after insertion; the only state change is
/// deactivation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MemoryEntry {
    /// Unique memory identifier.
    pub id: MemoryId,
    /// Owner of the memory.
    pub user_id: UserId,
    /// Stored text, including the trailing dedup reference marker.
    pub content: String,
    /// Semantic category.
    pub category: MemoryCategory,
    /// Importance in `0.0..=1.0`.
    pub importance_score: f64,
    /// Keywords that triggered the classification.
    pub keywords: Vec<String>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Inactive entries are ignored by lookups.
    pub is_active: bool,
}

impl MemoryEntry {
    /// Create an active entry whose content carries `hash` as a reference marker.
    ///
    /// # Errors
    /// Returns an error if the message is empty or the importance is out of range.
    pub fn new(
        user_id: UserId,
        message: &str,
        hash: &str,
        category: MemoryCategory,
        importance_score: f64,
        keywords: Vec<String>,
        created_at: DateTime<Utc>,
    ) -> CoachResult<Self> {
        let trimmed = message.trim();
        if trimmed.is_empty() {
            return Err(CoachError::InvalidRecord(
                "memory content is empty".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&importance_score) {
            return Err(CoachError::InvalidRecord(format!(
                "importance score {importance_score} outside 0..=1"
            )));
        }

        Ok(Self {
            id: MemoryId::new(),
            user_id,
            content: format!("{trimmed}{REF_MARKER_OPEN}{hash}]"),
            category,
            importance_score,
            keywords,
            created_at,
            is_active: true,
        })
    }

    /// Content without the dedup reference marker.
    #[must_use]
    pub fn display_content(&self) -> &str {
        match self.content.rfind(REF_MARKER_OPEN) {
            Some(idx) if self.content.ends_with(']') => &self.content[..idx],
            _ => &self.content,
        }
    }

    /// The semantic hash embedded in the content, if present.
    #[must_use]
    pub fn reference_hash(&self) -> Option<&str> {
        let idx = self.content.rfind(REF_MARKER_OPEN)?;
        self.content[idx + REF_MARKER_OPEN.len()..].strip_suffix(']')
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(message: &str) -> MemoryEntry {
        MemoryEntry::new(
            UserId::new(),
            message,
            "0123456789abcdef",
            MemoryCategory::Goals,
            0.8,
            vec!["lose".to_string()],
            Utc::now(),
        )
        .unwrap()
    }

    #[test]
    fn test_content_carries_reference() {
        let item = entry("  I want to lose 10 pounds ");
        assert_eq!(item.content, "I want to lose 10 pounds [ref:0123456789abcdef]");
        assert_eq!(item.display_content(), "I want to lose 10 pounds");
        assert_eq!(item.reference_hash(), Some("0123456789abcdef"));
        assert!(item.is_active);
    }

    #[test]
    fn test_rejects_empty_and_out_of_range() {
        let user = UserId::new();
        assert!(
            MemoryEntry::new(user, "   ", "h", MemoryCategory::Context, 0.3, vec![], Utc::now())
                .is_err()
        );
        assert!(
            MemoryEntry::new(user, "text", "h", MemoryCategory::Context, 1.5, vec![], Utc::now())
                .is_err()
        );
    }
}
