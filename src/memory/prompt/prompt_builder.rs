//! Coach context block rendering.

use std::fmt::Write;

use crate::memory::core::item::MemoryEntry;
use crate::memory::prompt::prompt_budget::CoachContextParts;
use crate::nutrition::types::DailyNutritionSummary;

/// Build a deterministic context block from prepared parts.
#[must_use]
pub fn build_coach_context(parts: &CoachContextParts) -> String {
    let mut out = String::with_capacity(256 + parts.user_message.len());

    out.push_str("[COACH_MEMORIES]\n");
    for entry in &parts.memories {
        render_memory(&mut out, entry);
    }

    out.push_str("[NUTRITION_TODAY]\n");
    if let Some(summary) = &parts.nutrition {
        render_nutrition(&mut out, summary);
    }

    out.push_str("[USER_MESSAGE]\n");
    out.push_str(&parts.user_message);
    out.push('\n');

    out
}

fn render_memory(out: &mut String, entry: &MemoryEntry) {
    let _ = writeln!(
        out,
        "* ({}) {} [importance: {:.1}]",
        entry.category,
        entry.display_content(),
        entry.importance_score
    );
}

fn render_nutrition(out: &mut String, summary: &DailyNutritionSummary) {
    let totals = &summary.totals;
    let _ = writeln!(
        out,
        "{}: {:.0} kcal, protein {:.1} g, carbs {:.1} g, fat {:.1} g ({} entries)",
        summary.date, totals.calories, totals.protein, totals.carbs, totals.fat, summary.entry_count
    );
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, Utc};

    use super::*;
    use crate::core::ids::UserId;
    use crate::memory::core::kinds::MemoryCategory;
    use crate::nutrition::types::{MealType, NutrientTotals};

    #[test]
    fn test_block_layout() {
        let user = UserId::new();
        let memory = MemoryEntry::new(
            user,
            "I have asthma",
            "0123456789abcdef",
            MemoryCategory::Health,
            0.9,
            vec!["asthma".to_string()],
            Utc::now(),
        )
        .unwrap();

        let date = NaiveDate::from_ymd_opt(2024, 3, 10).unwrap();
        let mut summary = DailyNutritionSummary::empty(user, date);
        summary.add_entry(
            MealType::Lunch,
            &NutrientTotals {
                calories: 640.0,
                protein: 32.5,
                ..NutrientTotals::default()
            },
        );

        let block = build_coach_context(&CoachContextParts {
            memories: vec![memory],
            nutrition: Some(summary),
            user_message: "Can I run today?".to_string(),
        });

        assert_eq!(
            block,
            "[COACH_MEMORIES]\n\
             * (health) I have asthma [importance: 0.9]\n\
             [NUTRITION_TODAY]\n\
             2024-03-10: 640 kcal, protein 32.5 g, carbs 0.0 g, fat 0.0 g (1 entries)\n\
             [USER_MESSAGE]\n\
             Can I run today?\n"
        );
    }

    #[test]
    fn test_empty_sections_keep_headers() {
        let block = build_coach_context(&CoachContextParts {
            memories: Vec::new(),
            nutrition: None,
            user_message: "hi".to_string(),
        });
        assert_eq!(block, "[COACH_MEMORIES]\n[NUTRITION_TODAY]\n[USER_MESSAGE]\nhi\n");
    }
}
