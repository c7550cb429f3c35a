//! Keyword classification of chat messages into memory categories.

use tracing::debug;

use crate::core::patterns::KeywordTable;
use crate::memory::core::kinds::MemoryCategory;

/// Category keyword rows, highest priority first.
const MEMORY_PATTERNS: &[(MemoryCategory, &[&str])] = &[
    (
        MemoryCategory::Health,
        &[
            "lab", "labs", "blood work", "blood pressure", "cholesterol", "diabetes",
            "diabetic", "diagnosed", "diagnosis", "doctor", "physician", "medication",
            "medications", "prescription", "allergy", "allergic", "injury", "injured",
            "surgery", "condition", "asthma", "pregnant", "thyroid", "insulin", "pain",
        ],
    ),
    (
        MemoryCategory::Constraints,
        &[
            "can't", "cannot", "avoid", "vegan", "vegetarian", "gluten", "lactose",
            "intolerant", "kosher", "halal", "no time", "only have", "budget",
            "don't eat", "night shift",
        ],
    ),
    (
        MemoryCategory::Goals,
        &[
            "goal", "goals", "want to", "trying to", "plan to", "aim to", "lose", "gain",
            "target", "pounds", "lbs", "kg", "marathon", "build muscle",
        ],
    ),
    (
        MemoryCategory::Preferences,
        &[
            "prefer", "like", "love", "enjoy", "favorite", "favourite", "hate", "dislike",
            "workout", "workouts", "usually", "morning", "evening",
        ],
    ),
];

/// Classification result for one message.
#[derive(Clone, Debug, PartialEq)]
pub struct MemoryClassification {
    /// Winning category, `Context` when nothing matched.
    pub category: MemoryCategory,
    /// Importance assigned to the category.
    pub importance: f64,
    /// Whether the message should become a memory.
    pub should_remember: bool,
    /// Matched keywords.
    pub keywords: Vec<String>,
}

/// Pure first-match-wins classifier over [`MEMORY_PATTERNS`].
#[derive(Clone, Debug)]
pub struct MemoryClassifier {
    table: KeywordTable<MemoryCategory>,
}

impl MemoryClassifier {
    /// Compile the keyword tables.
    ///
    /// # Errors
    /// Returns an error if a keyword pattern is invalid.
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            table: KeywordTable::new(MEMORY_PATTERNS)?,
        })
    }

    /// Classify a message.
    #[must_use]
    pub fn classify(&self, message: &str) -> MemoryClassification {
        let lowered = message.to_lowercase();
        match self.table.first_match(&lowered) {
            Some(found) => {
                debug!(category = %found.category, keywords = ?found.keywords, "message classified");
                MemoryClassification {
                    category: found.category,
                    importance: found.category.default_importance(),
                    should_remember: true,
                    keywords: found.keywords,
                }
            }
            None => MemoryClassification {
                category: MemoryCategory::Context,
                importance: MemoryCategory::Context.default_importance(),
                should_remember: false,
                keywords: Vec::new(),
            },
        }
    }
}
