//! Nutrition records and daily summaries.

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::ids::{RecordId, UserId};

/// Health record category holding meal entries.
pub const NUTRITION_CATEGORY: &str = "nutrition";

/// Meal slot of an entry.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MealType {
    /// Morning meal.
    Breakfast,
    /// Midday meal.
    Lunch,
    /// Evening meal.
    Dinner,
    /// Anything else.
    #[default]
    Snack,
}

impl MealType {
    /// All meal slots in display order.
    pub const ALL: [Self; 4] = [Self::Breakfast, Self::Lunch, Self::Dinner, Self::Snack];

    /// Parse a stored tag. Missing or unknown tags are snacks.
    #[must_use]
    pub fn from_tag(tag: Option<&str>) -> Self {
        match tag.map(|t| t.trim().to_ascii_lowercase()).as_deref() {
            Some("breakfast") => Self::Breakfast,
            Some("lunch") => Self::Lunch,
            Some("dinner") => Self::Dinner,
            _ => Self::Snack,
        }
    }

    /// Stable string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Breakfast => "breakfast",
            Self::Lunch => "lunch",
            Self::Dinner => "dinner",
            Self::Snack => "snack",
        }
    }
}

impl fmt::Display for MealType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Summed nutrients. Calories in kcal, sodium in mg, the rest in grams.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct NutrientTotals {
    /// Energy.
    pub calories: f64,
    /// Protein.
    pub protein: f64,
    /// Carbohydrates.
    pub carbs: f64,
    /// Fat.
    pub fat: f64,
    /// Fiber.
    pub fiber: f64,
    /// Sugar.
    pub sugar: f64,
    /// Sodium.
    pub sodium: f64,
}

impl NutrientTotals {
    /// Add `other` field by field.
    pub fn add(&mut self, other: &Self) {
        self.calories += other.calories;
        self.protein += other.protein;
        self.carbs += other.carbs;
        self.fat += other.fat;
        self.fiber += other.fiber;
        self.sugar += other.sugar;
        self.sodium += other.sodium;
    }

    /// Divide every field by `divisor`.
    #[must_use]
    pub fn divided_by(&self, divisor: f64) -> Self {
        if divisor <= 0.0 {
            return Self::default();
        }
        Self {
            calories: self.calories / divisor,
            protein: self.protein / divisor,
            carbs: self.carbs / divisor,
            fat: self.fat / divisor,
            fiber: self.fiber / divisor,
            sugar: self.sugar / divisor,
            sodium: self.sodium / divisor,
        }
    }
}

/// Totals per meal slot.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MealBreakdown {
    /// Breakfast totals.
    pub breakfast: NutrientTotals,
    /// Lunch totals.
    pub lunch: NutrientTotals,
    /// Dinner totals.
    pub dinner: NutrientTotals,
    /// Snack totals.
    pub snack: NutrientTotals,
}

impl MealBreakdown {
    /// Totals of one slot.
    #[must_use]
    pub const fn get(&self, meal: MealType) -> &NutrientTotals {
        match meal {
            MealType::Breakfast => &self.breakfast,
            MealType::Lunch => &self.lunch,
            MealType::Dinner => &self.dinner,
            MealType::Snack => &self.snack,
        }
    }

    /// Mutable totals of one slot.
    pub fn get_mut(&mut self, meal: MealType) -> &mut NutrientTotals {
        match meal {
            MealType::Breakfast => &mut self.breakfast,
            MealType::Lunch => &mut self.lunch,
            MealType::Dinner => &mut self.dinner,
            MealType::Snack => &mut self.snack,
        }
    }

    /// Sum across all slots.
    #[must_use]
    pub fn sum(&self) -> NutrientTotals {
        let mut total = NutrientTotals::default();
        for meal in MealType::ALL {
            total.add(self.get(meal));
        }
        total
    }
}

/// One user's nutrition for one local day.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DailyNutritionSummary {
    /// Owner.
    pub user_id: UserId,
    /// Local calendar date.
    pub date: NaiveDate,
    /// Day totals.
    pub totals: NutrientTotals,
    /// Totals per meal slot. Slots sum to `totals`.
    pub meal_breakdown: MealBreakdown,
    /// Entries folded in.
    pub entry_count: usize,
}

impl DailyNutritionSummary {
    /// A summary with nothing logged.
    #[must_use]
    pub fn empty(user_id: UserId, date: NaiveDate) -> Self {
        Self {
            user_id,
            date,
            totals: NutrientTotals::default(),
            meal_breakdown: MealBreakdown::default(),
            entry_count: 0,
        }
    }

    /// Fold one entry into its meal slot.
    ///
    /// `totals` is recomputed from the slots so it always equals their sum,
    /// whatever order entries arrive in.
    pub fn add_entry(&mut self, meal: MealType, nutrients: &NutrientTotals) {
        self.meal_breakdown.get_mut(meal).add(nutrients);
        self.totals = self.meal_breakdown.sum();
        self.entry_count += 1;
    }
}

/// Averages over the logged days of a week.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WeeklyNutritionAverages {
    /// Owner.
    pub user_id: UserId,
    /// First day of the week.
    pub start_date: NaiveDate,
    /// Last day of the week.
    pub end_date: NaiveDate,
    /// Days with at least one entry.
    pub days_logged: usize,
    /// Sum over the week.
    pub totals: NutrientTotals,
    /// Per-day average over the logged days.
    pub daily_average: NutrientTotals,
}

/// Optional nutrition fields carried in a health record's metadata.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct NutritionMetadata {
    /// Meal slot tag.
    pub meal_type: Option<String>,
    /// Food description.
    pub food_name: Option<String>,
    /// Protein in grams.
    pub protein: Option<f64>,
    /// Carbohydrates in grams.
    pub carbs: Option<f64>,
    /// Fat in grams.
    pub fat: Option<f64>,
    /// Fiber in grams.
    pub fiber: Option<f64>,
    /// Sugar in grams.
    pub sugar: Option<f64>,
    /// Sodium in milligrams.
    pub sodium: Option<f64>,
}

impl NutritionMetadata {
    /// Read metadata from a loosely shaped JSON value.
    ///
    /// Numbers may be JSON numbers or numeric strings. Non-numeric, negative,
    /// or non-finite values are treated as absent. `mealType` and `meal_type`
    /// spellings are both accepted.
    #[must_use]
    pub fn from_value(value: &Value) -> Self {
        let text = |keys: &[&str]| {
            keys.iter()
                .find_map(|key| value.get(*key).and_then(Value::as_str))
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(ToString::to_string)
        };

        Self {
            meal_type: text(&["mealType", "meal_type"]),
            food_name: text(&["foodName", "food_name"]),
            protein: lenient_number(value.get("protein")),
            carbs: lenient_number(value.get("carbs")),
            fat: lenient_number(value.get("fat")),
            fiber: lenient_number(value.get("fiber")),
            sugar: lenient_number(value.get("sugar")),
            sodium: lenient_number(value.get("sodium")),
        }
    }

    /// JSON shape written to the store.
    #[must_use]
    pub fn to_value(&self) -> Value {
        let mut map = Map::new();
        if let Some(meal_type) = &self.meal_type {
            map.insert("mealType".to_string(), Value::from(meal_type.as_str()));
        }
        if let Some(food_name) = &self.food_name {
            map.insert("foodName".to_string(), Value::from(food_name.as_str()));
        }
        for (key, field) in [
            ("protein", self.protein),
            ("carbs", self.carbs),
            ("fat", self.fat),
            ("fiber", self.fiber),
            ("sugar", self.sugar),
            ("sodium", self.sodium),
        ] {
            if let Some(amount) = field {
                map.insert(key.to_string(), Value::from(amount));
            }
        }
        Value::Object(map)
    }

    /// Meal slot, defaulting to snack.
    #[must_use]
    pub fn meal(&self) -> MealType {
        MealType::from_tag(self.meal_type.as_deref())
    }

    /// Nutrients of this entry given its calories.
    #[must_use]
    pub fn nutrients(&self, calories: f64) -> NutrientTotals {
        NutrientTotals {
            calories,
            protein: self.protein.unwrap_or_default(),
            carbs: self.carbs.unwrap_or_default(),
            fat: self.fat.unwrap_or_default(),
            fiber: self.fiber.unwrap_or_default(),
            sugar: self.sugar.unwrap_or_default(),
            sodium: self.sodium.unwrap_or_default(),
        }
    }
}

fn lenient_number(value: Option<&Value>) -> Option<f64> {
    let number = match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    (number.is_finite() && number >= 0.0).then_some(number)
}

/// A stored health record. Meal entries use the `nutrition` category.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HealthRecord {
    /// Record identifier.
    pub id: RecordId,
    /// Owner.
    pub user_id: UserId,
    /// Record category, e.g. `nutrition`.
    pub category: String,
    /// Data type within the category, e.g. `meal`.
    pub data_type: String,
    /// When the record applies.
    pub timestamp: DateTime<Utc>,
    /// Primary value as stored. Calories for nutrition records.
    pub value: String,
    /// Free-form metadata.
    pub metadata: Value,
}

/// A meal to log.
#[derive(Clone, Debug, PartialEq)]
pub struct NutritionEntry {
    /// Meal slot.
    pub meal_type: MealType,
    /// Food description.
    pub food_name: Option<String>,
    /// Energy in kcal.
    pub calories: f64,
    /// Other nutrients. `calories` is ignored here.
    pub nutrients: NutrientTotals,
    /// When the meal was eaten.
    pub eaten_at: DateTime<Utc>,
}

impl NutritionEntry {
    /// Convert to a storable health record.
    #[must_use]
    pub fn into_record(self, user_id: UserId) -> HealthRecord {
        let metadata = NutritionMetadata {
            meal_type: Some(self.meal_type.as_str().to_string()),
            food_name: self.food_name,
            protein: Some(self.nutrients.protein),
            carbs: Some(self.nutrients.carbs),
            fat: Some(self.nutrients.fat),
            fiber: Some(self.nutrients.fiber),
            sugar: Some(self.nutrients.sugar),
            sodium: Some(self.nutrients.sodium),
        };

        HealthRecord {
            id: RecordId::new(),
            user_id,
            category: NUTRITION_CATEGORY.to_string(),
            data_type: "meal".to_string(),
            timestamp: self.eaten_at,
            value: self.calories.to_string(),
            metadata: metadata.to_value(),
        }
    }
}
