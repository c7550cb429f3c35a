//! Prompt budget enforcement for the coach context.

use crate::memory::core::item::MemoryEntry;
use crate::memory::prompt::prompt_builder::build_coach_context;
use crate::nutrition::types::DailyNutritionSummary;

/// Coach context parts before formatting.
#[derive(Clone, Debug)]
pub struct CoachContextParts {
    /// Retrieved memories, most important first.
    pub memories: Vec<MemoryEntry>,
    /// Today's nutrition, when available.
    pub nutrition: Option<DailyNutritionSummary>,
    /// Current user message.
    pub user_message: String,
}

/// Enforce the character budget.
///
/// Drops the least important memory first, then the nutrition line. The user
/// message is never trimmed, so the result can still exceed `max_chars`.
#[must_use]
pub fn enforce_budget(mut parts: CoachContextParts, max_chars: usize) -> CoachContextParts {
    loop {
        if build_coach_context(&parts).len() <= max_chars {
            break;
        }

        if let Some(idx) = least_important(&parts.memories) {
            parts.memories.remove(idx);
            continue;
        }

        if parts.nutrition.take().is_some() {
            continue;
        }

        break;
    }

    parts
}

/// Index of the lowest-importance memory, the latest one on ties.
fn least_important(memories: &[MemoryEntry]) -> Option<usize> {
    memories
        .iter()
        .enumerate()
        .min_by(|(ia, a), (ib, b)| {
            a.importance_score
                .total_cmp(&b.importance_score)
                .then(ib.cmp(ia))
        })
        .map(|(idx, _)| idx)
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, Utc};

    use super::*;
    use crate::core::ids::UserId;
    use crate::memory::core::kinds::MemoryCategory;

    fn memory(text: &str, category: MemoryCategory) -> MemoryEntry {
        MemoryEntry::new(
            UserId::new(),
            text,
            "0123456789abcdef",
            category,
            category.default_importance(),
            Vec::new(),
            Utc::now(),
        )
        .unwrap()
    }

    fn parts() -> CoachContextParts {
        CoachContextParts {
            memories: vec![
                memory("I have asthma", MemoryCategory::Health),
                memory("I like tea", MemoryCategory::Preferences),
                memory("Run a marathon", MemoryCategory::Goals),
            ],
            nutrition: Some(DailyNutritionSummary::empty(UserId::new(), NaiveDate::MIN)),
            user_message: "What should I eat?".to_string(),
        }
    }

    #[test]
    fn test_within_budget_is_untouched() {
        let trimmed = enforce_budget(parts(), 10_000);
        assert_eq!(trimmed.memories.len(), 3);
        assert!(trimmed.nutrition.is_some());
    }

    #[test]
    fn test_drops_least_important_first() {
        let full = build_coach_context(&parts()).len();
        let trimmed = enforce_budget(parts(), full - 1);

        let kept: Vec<_> = trimmed.memories.iter().map(|m| m.category).collect();
        assert_eq!(kept, vec![MemoryCategory::Health, MemoryCategory::Goals]);
        assert!(trimmed.nutrition.is_some());
    }

    #[test]
    fn test_drops_nutrition_after_memories() {
        let trimmed = enforce_budget(parts(), 1);
        assert!(trimmed.memories.is_empty());
        assert!(trimmed.nutrition.is_none());
        assert_eq!(trimmed.user_message, "What should I eat?");
    }
}
