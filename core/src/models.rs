use anyhow::{Result, bail};
use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Declares a string-backed enum with `as_str` / `parse` helpers used both for
/// storage columns and for lenient decoding of assistant payloads.
macro_rules! string_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident {
            $($variant:ident => $text:literal $(| $alias:literal)*),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            #[must_use]
            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }

            /// Case-insensitive; `-` and spaces are treated as `_`.
            #[must_use]
            pub fn parse(value: &str) -> Option<Self> {
                let normalized = value.trim().to_lowercase().replace(['-', ' '], "_");
                match normalized.as_str() {
                    $($text $(| $alias)* => Some($name::$variant),)+
                    _ => None,
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

string_enum! {
    pub enum MealCategory {
        Breakfast => "breakfast",
        Lunch => "lunch",
        Dinner => "dinner",
        Snack => "snack",
        Other => "other",
    }
}

string_enum! {
    /// Where a food item's nutrition values came from.
    pub enum FoodSource {
        Manual => "manual",
        Catalog => "catalog" | "open_food_facts" | "openfoodfacts",
        Barcode => "barcode",
        Vision => "vision",
        Chat => "chat",
    }
}

impl FoodSource {
    /// Name used by the remote API, which calls the catalog `open_food_facts`.
    #[must_use]
    pub fn wire_str(self) -> &'static str {
        match self {
            FoodSource::Catalog => "open_food_facts",
            other => other.as_str(),
        }
    }
}

string_enum! {
    pub enum WorkoutCategory {
        Strength => "strength",
        Cardio => "cardio",
        Hiit => "hiit",
        Flexibility => "flexibility",
        Sports => "sports",
        Walking => "walking",
        Running => "running",
        Cycling => "cycling",
        Swimming => "swimming",
        Other => "other",
    }
}

string_enum! {
    pub enum LogSource {
        Manual => "manual",
        HealthKit => "health_kit",
        Chat => "chat",
    }
}

string_enum! {
    pub enum Sex {
        Male => "male" | "m",
        Female => "female" | "f",
    }
}

string_enum! {
    pub enum ActivityLevel {
        Sedentary => "sedentary",
        Light => "light",
        Moderate => "moderate",
        Active => "active",
        VeryActive => "very_active",
    }
}

string_enum! {
    pub enum GoalType {
        Cut => "cut" | "lose",
        Maintain => "maintain",
        Bulk => "bulk" | "gain",
    }
}

string_enum! {
    /// Macro split selection. Every plan except `Custom` has a fixed split.
    pub enum MacroPlan {
        Balanced => "balanced",
        HighProtein => "high_protein",
        LowCarb => "low_carb",
        Keto => "keto",
        Custom => "custom",
    }
}

string_enum! {
    pub enum TargetSource {
        Server => "server",
        Local => "local",
    }
}

/// Protein / carbs / fat as percentages of target calories.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MacroSplit {
    pub protein_pct: f64,
    pub carbs_pct: f64,
    pub fat_pct: f64,
}

impl MacroSplit {
    #[must_use]
    pub const fn new(protein_pct: f64, carbs_pct: f64, fat_pct: f64) -> Self {
        Self {
            protein_pct,
            carbs_pct,
            fat_pct,
        }
    }

    #[must_use]
    pub fn sum(&self) -> f64 {
        self.protein_pct + self.carbs_pct + self.fat_pct
    }
}

impl MacroPlan {
    /// The fixed split for this plan; `None` for `Custom`.
    #[must_use]
    pub fn fixed_split(self) -> Option<MacroSplit> {
        match self {
            MacroPlan::Balanced => Some(MacroSplit::new(30.0, 40.0, 30.0)),
            MacroPlan::HighProtein => Some(MacroSplit::new(40.0, 35.0, 25.0)),
            MacroPlan::LowCarb => Some(MacroSplit::new(40.0, 20.0, 40.0)),
            MacroPlan::Keto => Some(MacroSplit::new(25.0, 5.0, 70.0)),
            MacroPlan::Custom => None,
        }
    }
}

// --- Meals ---

/// Cached aggregate nutrition for a meal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MealTotals {
    pub calories: f64,
    pub protein_g: f64,
    pub carbs_g: f64,
    pub fat_g: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fiber_g: Option<f64>,
}

impl MealTotals {
    /// Sum over the children. Fiber stays `None` unless some item reports it.
    #[must_use]
    pub fn from_items<'a, I>(items: I) -> Self
    where
        I: IntoIterator<Item = &'a NewFoodItem>,
    {
        let mut totals = MealTotals::default();
        for item in items {
            totals.calories += item.calories;
            totals.protein_g += item.protein_g;
            totals.carbs_g += item.carbs_g;
            totals.fat_g += item.fat_g;
            if let Some(fiber) = item.extra.fiber_g {
                *totals.fiber_g.get_or_insert(0.0) += fiber;
            }
        }
        totals
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtendedNutrition {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fiber_g: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sodium_mg: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sugar_g: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub saturated_fat_g: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Meal {
    pub id: i64,
    pub uuid: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_id: Option<String>,
    pub user_id: String,
    pub name: String,
    pub category: MealCategory,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub totals: MealTotals,
    pub is_synced: bool,
    pub items: Vec<FoodItem>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct FoodItem {
    pub id: i64,
    pub meal_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_id: Option<String>,
    pub position: i64,
    pub name: String,
    pub source: FoodSource,
    pub grams: f64,
    pub calories: f64,
    pub protein_g: f64,
    pub carbs_g: f64,
    pub fat_g: f64,
    #[serde(flatten)]
    pub extra: ExtendedNutrition,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub barcode: Option<String>,
}

/// Full description of a meal aggregate to be written to the store.
#[derive(Debug, Clone)]
pub struct NewMeal {
    pub remote_id: Option<String>,
    pub name: String,
    pub category: MealCategory,
    pub timestamp: DateTime<Utc>,
    pub notes: Option<String>,
    pub items: Vec<NewFoodItem>,
    /// Totals reported by the server; they replace the local sum after it is computed.
    pub reported_totals: Option<MealTotals>,
    pub is_synced: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewFoodItem {
    pub remote_id: Option<String>,
    pub name: String,
    pub source: FoodSource,
    pub grams: f64,
    pub calories: f64,
    pub protein_g: f64,
    pub carbs_g: f64,
    pub fat_g: f64,
    pub extra: ExtendedNutrition,
    pub barcode: Option<String>,
}

impl From<&FoodItem> for NewFoodItem {
    fn from(item: &FoodItem) -> Self {
        Self {
            remote_id: item.remote_id.clone(),
            name: item.name.clone(),
            source: item.source,
            grams: item.grams,
            calories: item.calories,
            protein_g: item.protein_g,
            carbs_g: item.carbs_g,
            fat_g: item.fat_g,
            extra: item.extra,
            barcode: item.barcode.clone(),
        }
    }
}

// --- Workouts ---

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkoutMetrics {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub calories_burned: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_heart_rate: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_heart_rate: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance_km: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkoutLog {
    pub id: i64,
    pub uuid: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_id: Option<String>,
    pub user_id: String,
    /// Remote id of the plan this session followed. Not owned, may dangle.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan_remote_id: Option<String>,
    pub name: String,
    pub category: WorkoutCategory,
    pub source: LogSource,
    pub start_time: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    pub duration_min: i64,
    pub metrics: WorkoutMetrics,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub is_synced: bool,
    pub sets: Vec<SetLog>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SetLog {
    pub id: i64,
    pub log_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_id: Option<String>,
    pub position: i64,
    pub exercise_name: String,
    pub set_number: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reps: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weight_kg: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_sec: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distance_m: Option<f64>,
    pub completed: bool,
    pub is_warmup: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rpe: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewWorkoutLog {
    pub remote_id: Option<String>,
    pub plan_remote_id: Option<String>,
    pub name: String,
    pub category: WorkoutCategory,
    pub source: LogSource,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub duration_min: i64,
    pub metrics: WorkoutMetrics,
    pub notes: Option<String>,
    pub sets: Vec<NewSetLog>,
    pub is_synced: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewSetLog {
    pub remote_id: Option<String>,
    pub exercise_name: String,
    pub set_number: i64,
    pub reps: Option<i64>,
    pub weight_kg: Option<f64>,
    pub duration_sec: Option<i64>,
    pub distance_m: Option<f64>,
    pub completed: bool,
    pub is_warmup: bool,
    pub rpe: Option<i64>,
    pub notes: Option<String>,
}

impl NewSetLog {
    #[must_use]
    pub fn numbered(exercise_name: &str, set_number: i64) -> Self {
        Self {
            remote_id: None,
            exercise_name: exercise_name.to_string(),
            set_number,
            reps: None,
            weight_kg: None,
            duration_sec: None,
            distance_m: None,
            completed: true,
            is_warmup: false,
            rpe: None,
            notes: None,
        }
    }
}

impl From<&SetLog> for NewSetLog {
    fn from(set: &SetLog) -> Self {
        Self {
            remote_id: set.remote_id.clone(),
            exercise_name: set.exercise_name.clone(),
            set_number: set.set_number,
            reps: set.reps,
            weight_kg: set.weight_kg,
            duration_sec: set.duration_sec,
            distance_m: set.distance_m,
            completed: set.completed,
            is_warmup: set.is_warmup,
            rpe: set.rpe,
            notes: set.notes.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkoutPlan {
    pub id: i64,
    pub uuid: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_id: Option<String>,
    pub user_id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub category: WorkoutCategory,
    /// Weekday indices, 0 = Monday.
    pub scheduled_days: BTreeSet<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_duration_min: Option<i64>,
    pub is_active: bool,
    pub is_synced: bool,
    pub exercises: Vec<Exercise>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Exercise {
    pub id: i64,
    pub plan_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_id: Option<String>,
    pub position: i64,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub muscle_group: Option<String>,
    pub sets: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reps_min: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reps_max: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_sec: Option<i64>,
    pub rest_sec: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewWorkoutPlan {
    pub remote_id: Option<String>,
    pub name: String,
    pub description: Option<String>,
    pub category: WorkoutCategory,
    pub scheduled_days: BTreeSet<u8>,
    pub estimated_duration_min: Option<i64>,
    pub is_active: bool,
    pub exercises: Vec<NewExercise>,
    pub is_synced: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewExercise {
    pub remote_id: Option<String>,
    pub name: String,
    pub muscle_group: Option<String>,
    pub sets: i64,
    pub reps_min: Option<i64>,
    pub reps_max: Option<i64>,
    pub duration_sec: Option<i64>,
    pub rest_sec: i64,
    pub notes: Option<String>,
}

pub const DEFAULT_EXERCISE_SETS: i64 = 3;
pub const DEFAULT_REST_SEC: i64 = 60;

impl NewExercise {
    #[must_use]
    pub fn named(name: &str) -> Self {
        Self {
            remote_id: None,
            name: name.to_string(),
            muscle_group: None,
            sets: DEFAULT_EXERCISE_SETS,
            reps_min: None,
            reps_max: None,
            duration_sec: None,
            rest_sec: DEFAULT_REST_SEC,
            notes: None,
        }
    }
}

/// Keep only valid weekday indices (0 = Monday .. 6 = Sunday).
#[must_use]
pub fn normalize_schedule<I: IntoIterator<Item = i64>>(days: I) -> BTreeSet<u8> {
    days.into_iter()
        .filter(|d| (0..=6).contains(d))
        .map(|d| d as u8)
        .collect()
}

// --- Lightweight tracking entries ---

#[derive(Debug, Clone, Serialize)]
pub struct WaterEntry {
    pub id: i64,
    pub uuid: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_id: Option<String>,
    pub user_id: String,
    pub amount_ml: i64,
    pub timestamp: DateTime<Utc>,
    pub source: String,
    pub is_synced: bool,
}

#[derive(Debug, Clone)]
pub struct NewWaterEntry {
    pub remote_id: Option<String>,
    pub amount_ml: i64,
    pub timestamp: DateTime<Utc>,
    pub source: String,
    pub is_synced: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct WeightEntry {
    pub id: i64,
    pub uuid: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_id: Option<String>,
    pub user_id: String,
    pub weight_kg: f64,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub source: String,
    pub is_synced: bool,
}

#[derive(Debug, Clone)]
pub struct NewWeightEntry {
    pub remote_id: Option<String>,
    pub weight_kg: f64,
    pub timestamp: DateTime<Utc>,
    pub notes: Option<String>,
    pub source: String,
    pub is_synced: bool,
}

// --- Profile and targets ---

/// Manually pinned target values that win over any computed value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MacroOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub calories: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protein_g: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub carbs_g: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fat_g: Option<f64>,
}

impl MacroOverrides {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.calories.is_none()
            && self.protein_g.is_none()
            && self.carbs_g.is_none()
            && self.fat_g.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserProfile {
    pub user_id: String,
    pub sex: Option<Sex>,
    pub birth_date: Option<NaiveDate>,
    pub height_cm: Option<f64>,
    pub current_weight_kg: Option<f64>,
    pub activity_level: ActivityLevel,
    pub goal_type: GoalType,
    pub goal_rate_kg_per_week: f64,
    pub target_weight_kg: Option<f64>,
    pub macro_plan: MacroPlan,
    pub custom_split: Option<MacroSplit>,
    pub overrides: MacroOverrides,
}

impl UserProfile {
    #[must_use]
    pub fn new(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            sex: None,
            birth_date: None,
            height_cm: None,
            current_weight_kg: None,
            activity_level: ActivityLevel::Moderate,
            goal_type: GoalType::Maintain,
            goal_rate_kg_per_week: 0.0,
            target_weight_kg: None,
            macro_plan: MacroPlan::Balanced,
            custom_split: None,
            overrides: MacroOverrides::default(),
        }
    }

    /// Whole years between `birth_date` and `today`.
    #[must_use]
    pub fn age_on(&self, today: NaiveDate) -> Option<u32> {
        let birth = self.birth_date?;
        let mut years = today.year() - birth.year();
        if (today.month(), today.day()) < (birth.month(), birth.day()) {
            years -= 1;
        }
        u32::try_from(years).ok()
    }
}

/// The single live targets row for a user.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MacroTargets {
    pub user_id: String,
    pub calories: i64,
    pub protein_g: f64,
    pub carbs_g: f64,
    pub fat_g: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fiber_g: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bmr: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tdee: Option<i64>,
    pub source: TargetSource,
    pub calculated_at: DateTime<Utc>,
}

impl MacroTargets {
    /// Replace computed values with any manual overrides.
    #[must_use]
    pub fn with_overrides(mut self, overrides: &MacroOverrides) -> Self {
        if let Some(calories) = overrides.calories {
            self.calories = calories;
        }
        if let Some(protein) = overrides.protein_g {
            self.protein_g = protein;
        }
        if let Some(carbs) = overrides.carbs_g {
            self.carbs_g = carbs;
        }
        if let Some(fat) = overrides.fat_g {
            self.fat_g = fat;
        }
        self
    }
}

/// Parse a timestamp as sent by the server or the assistant. Offsets are
/// honoured; naive values and bare dates are taken as UTC.
#[must_use]
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Some(ts.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

// --- Validation for direct user input ---

pub fn validate_meal_name(name: &str) -> Result<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        bail!("Meal name must not be empty");
    }
    Ok(trimmed.to_string())
}

pub fn validate_water_amount(amount_ml: i64) -> Result<()> {
    if !(1..=5000).contains(&amount_ml) {
        bail!("Water amount must be between 1 and 5000 ml (got {amount_ml})");
    }
    Ok(())
}

pub fn validate_weight(weight_kg: f64) -> Result<()> {
    if !(20.0..=500.0).contains(&weight_kg) {
        bail!("Weight must be between 20 and 500 kg (got {weight_kg})");
    }
    Ok(())
}

pub fn validate_macro_split(split: &MacroSplit) -> Result<()> {
    let MacroSplit {
        protein_pct,
        carbs_pct,
        fat_pct,
    } = *split;
    if protein_pct < 0.0 || carbs_pct < 0.0 || fat_pct < 0.0 {
        bail!("Macro percentages must be non-negative");
    }
    if split.sum() <= 0.0 {
        bail!("Macro percentages must not all be zero");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn item(calories: f64, fiber: Option<f64>) -> NewFoodItem {
        NewFoodItem {
            remote_id: None,
            name: "item".to_string(),
            source: FoodSource::Chat,
            grams: 100.0,
            calories,
            protein_g: 10.0,
            carbs_g: 20.0,
            fat_g: 5.0,
            extra: ExtendedNutrition {
                fiber_g: fiber,
                ..ExtendedNutrition::default()
            },
            barcode: None,
        }
    }

    #[test]
    fn test_enum_parse_is_lenient_about_case_and_separators() {
        assert_eq!(ActivityLevel::parse("Very-Active"), Some(ActivityLevel::VeryActive));
        assert_eq!(ActivityLevel::parse("very active"), Some(ActivityLevel::VeryActive));
        assert_eq!(MealCategory::parse(" LUNCH "), Some(MealCategory::Lunch));
        assert_eq!(FoodSource::parse("open_food_facts"), Some(FoodSource::Catalog));
        assert_eq!(GoalType::parse("lose"), Some(GoalType::Cut));
        assert_eq!(WorkoutCategory::parse("yoga"), None);
    }

    #[test]
    fn test_enum_round_trips_through_as_str() {
        for plan in MacroPlan::ALL {
            assert_eq!(MacroPlan::parse(plan.as_str()), Some(*plan));
        }
        for category in WorkoutCategory::ALL {
            assert_eq!(WorkoutCategory::parse(category.as_str()), Some(*category));
        }
    }

    #[test]
    fn test_fixed_splits_sum_to_100() {
        for plan in MacroPlan::ALL {
            if let Some(split) = plan.fixed_split() {
                assert!((split.sum() - 100.0).abs() < f64::EPSILON, "{plan}");
            }
        }
        assert!(MacroPlan::Custom.fixed_split().is_none());
    }

    #[test]
    fn test_meal_totals_sum_children() {
        let items = vec![item(300.0, None), item(150.0, None)];
        let totals = MealTotals::from_items(&items);
        assert!((totals.calories - 450.0).abs() < f64::EPSILON);
        assert!((totals.protein_g - 20.0).abs() < f64::EPSILON);
        assert!((totals.carbs_g - 40.0).abs() < f64::EPSILON);
        assert!((totals.fat_g - 10.0).abs() < f64::EPSILON);
        assert!(totals.fiber_g.is_none());
    }

    #[test]
    fn test_meal_totals_fiber_only_when_reported() {
        let items = vec![item(100.0, Some(3.0)), item(100.0, None), item(50.0, Some(1.5))];
        let totals = MealTotals::from_items(&items);
        assert_eq!(totals.fiber_g, Some(4.5));
    }

    #[test]
    fn test_normalize_schedule_discards_out_of_range() {
        let days = normalize_schedule(vec![4, 0, 7, -1, 4, 6]);
        assert_eq!(days.into_iter().collect::<Vec<_>>(), vec![0, 4, 6]);
    }

    #[test]
    fn test_age_on_respects_birthday() {
        let mut profile = UserProfile::new("u1");
        profile.birth_date = NaiveDate::from_ymd_opt(1990, 6, 15);
        let before = NaiveDate::from_ymd_opt(2020, 6, 14).unwrap();
        let on = NaiveDate::from_ymd_opt(2020, 6, 15).unwrap();
        assert_eq!(profile.age_on(before), Some(29));
        assert_eq!(profile.age_on(on), Some(30));
        assert_eq!(UserProfile::new("u2").age_on(on), None);
    }

    #[test]
    fn test_with_overrides_replaces_only_pinned_fields() {
        let targets = MacroTargets {
            user_id: "u1".to_string(),
            calories: 2400,
            protein_g: 180.0,
            carbs_g: 240.0,
            fat_g: 80.0,
            fiber_g: Some(33.6),
            bmr: Some(1780),
            tdee: Some(2759),
            source: TargetSource::Local,
            calculated_at: Utc::now(),
        };
        let overrides = MacroOverrides {
            calories: Some(2000),
            fat_g: Some(60.0),
            ..MacroOverrides::default()
        };
        let pinned = targets.with_overrides(&overrides);
        assert_eq!(pinned.calories, 2000);
        assert!((pinned.fat_g - 60.0).abs() < f64::EPSILON);
        assert!((pinned.protein_g - 180.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_parse_timestamp_formats() {
        let expected = Utc.with_ymd_and_hms(2026, 3, 14, 12, 30, 0).unwrap();
        assert_eq!(parse_timestamp("2026-03-14T12:30:00Z"), Some(expected));
        assert_eq!(parse_timestamp("2026-03-14T14:30:00+02:00"), Some(expected));
        assert_eq!(parse_timestamp("2026-03-14T12:30:00.000"), Some(expected));
        assert_eq!(parse_timestamp("2026-03-14 12:30:00"), Some(expected));
        assert_eq!(
            parse_timestamp("2026-03-14"),
            Some(Utc.with_ymd_and_hms(2026, 3, 14, 0, 0, 0).unwrap())
        );
        assert_eq!(parse_timestamp("yesterday"), None);
    }

    #[test]
    fn test_validate_water_amount_bounds() {
        assert!(validate_water_amount(250).is_ok());
        assert!(validate_water_amount(0).is_err());
        assert!(validate_water_amount(5001).is_err());
    }

    #[test]
    fn test_validate_macro_split() {
        assert!(validate_macro_split(&MacroSplit::new(50.0, 30.0, 30.0)).is_ok());
        assert!(validate_macro_split(&MacroSplit::new(-1.0, 50.0, 51.0)).is_err());
        assert!(validate_macro_split(&MacroSplit::new(0.0, 0.0, 0.0)).is_err());
    }

    #[test]
    fn test_validate_meal_name_trims() {
        assert_eq!(validate_meal_name("  Lunch bowl ").unwrap(), "Lunch bowl");
        assert!(validate_meal_name("   ").is_err());
    }
}
