//! Nutrition aggregation over stored meal records.

pub mod aggregator;
pub mod store;
pub mod types;

pub use aggregator::NutritionAggregator;
pub use store::{HealthRecordStore, SqliteHealthRecordStore};
pub use types::{
    DailyNutritionSummary, HealthRecord, MealBreakdown, MealType, NUTRITION_CATEGORY,
    NutrientTotals, NutritionEntry, NutritionMetadata, WeeklyNutritionAverages,
};
