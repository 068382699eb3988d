//! Contract with the backend: the `RemoteClient` trait, its typed errors and
//! the wire shapes it exchanges.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::models::{
    ExtendedNutrition, FoodSource, LogSource, MacroTargets, Meal, MealCategory, MealTotals,
    NewExercise, NewFoodItem, NewMeal, NewSetLog, NewWaterEntry, NewWeightEntry, NewWorkoutLog,
    NewWorkoutPlan, TargetSource, WaterEntry, WeightEntry, WorkoutCategory, WorkoutLog,
    WorkoutMetrics, normalize_schedule, parse_timestamp, DEFAULT_EXERCISE_SETS, DEFAULT_REST_SEC,
};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RemoteError {
    #[error("not authorized (token missing or expired)")]
    Unauthorized,
    #[error("server returned HTTP {status}: {body}")]
    Http { status: u16, body: String },
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("network error: {0}")]
    Network(String),
    #[error("request timed out")]
    Timeout,
}

impl RemoteError {
    #[must_use]
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, RemoteError::Unauthorized)
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, RemoteError::Http { status: 404, .. })
    }
}

/// Operations the core consumes from the backend. Every call is a single
/// attempt; callers decide what to do on failure.
#[async_trait]
pub trait RemoteClient: Send + Sync {
    async fn send_chat_message(
        &self,
        text: &str,
        conversation_id: Option<&str>,
    ) -> Result<AssistantReply, RemoteError>;

    async fn fetch_meal(&self, id: &str) -> Result<MealDto, RemoteError>;
    async fn fetch_workout_log(&self, id: &str) -> Result<WorkoutLogDto, RemoteError>;
    async fn fetch_workout_plan(&self, id: &str) -> Result<WorkoutPlanDto, RemoteError>;
    /// `Ok(None)` when the server has no targets for the user yet.
    async fn fetch_macro_targets(&self) -> Result<Option<MacroTargetsDto>, RemoteError>;

    async fn create_meal(&self, payload: &MealPayload) -> Result<MealDto, RemoteError>;
    async fn create_workout_log(
        &self,
        payload: &WorkoutLogPayload,
    ) -> Result<WorkoutLogDto, RemoteError>;
    async fn create_water_entry(&self, payload: &WaterPayload) -> Result<WaterDto, RemoteError>;
    async fn create_weight_entry(&self, payload: &WeightPayload)
    -> Result<WeightDto, RemoteError>;

    async fn delete_meal(&self, id: &str) -> Result<(), RemoteError>;
    async fn delete_workout_log(&self, id: &str) -> Result<(), RemoteError>;
    async fn delete_workout_plan(&self, id: &str) -> Result<(), RemoteError>;
}

// --- Chat ---

fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssistantReply {
    #[serde(default)]
    pub message: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub tool_calls: Vec<ToolCall>,
    #[serde(default, alias = "entries", deserialize_with = "null_as_empty")]
    pub created_entries: Vec<EntryDescriptor>,
    #[serde(default)]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub model_used: Option<String>,
}

/// A structured invocation. `arguments` may arrive as an object or as a JSON string.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
}

/// An opaque notification: a `kind` tag plus whatever fields the server sent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryDescriptor {
    #[serde(alias = "type")]
    pub kind: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

// --- Fetched aggregates ---

fn lenient_time(value: Option<&str>) -> Option<DateTime<Utc>> {
    value.and_then(parse_timestamp)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MealDto {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub meal_type: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub total_calories: f64,
    #[serde(default)]
    pub total_protein_g: f64,
    #[serde(default)]
    pub total_carbs_g: f64,
    #[serde(default)]
    pub total_fat_g: f64,
    #[serde(default)]
    pub total_fiber_g: Option<f64>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub items: Vec<FoodItemDto>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FoodItemDto {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub grams: f64,
    #[serde(default)]
    pub calories: f64,
    #[serde(default)]
    pub protein_g: f64,
    #[serde(default)]
    pub carbs_g: f64,
    #[serde(default)]
    pub fat_g: f64,
    #[serde(default)]
    pub fiber_g: Option<f64>,
    #[serde(default)]
    pub sodium_mg: Option<f64>,
    #[serde(default)]
    pub sugar_g: Option<f64>,
    #[serde(default)]
    pub saturated_fat_g: Option<f64>,
    #[serde(default)]
    pub barcode: Option<String>,
}

impl MealDto {
    /// The aggregate to store locally, marked synced, with the server totals as authoritative.
    #[must_use]
    pub fn into_new_meal(self) -> NewMeal {
        NewMeal {
            remote_id: Some(self.id),
            name: self.name,
            category: self
                .meal_type
                .as_deref()
                .and_then(MealCategory::parse)
                .unwrap_or(MealCategory::Other),
            timestamp: lenient_time(self.timestamp.as_deref()).unwrap_or_else(Utc::now),
            notes: self.notes,
            items: self
                .items
                .into_iter()
                .map(|item| NewFoodItem {
                    remote_id: item.id,
                    name: item.name,
                    source: item
                        .source
                        .as_deref()
                        .and_then(FoodSource::parse)
                        .unwrap_or(FoodSource::Manual),
                    grams: item.grams,
                    calories: item.calories,
                    protein_g: item.protein_g,
                    carbs_g: item.carbs_g,
                    fat_g: item.fat_g,
                    extra: ExtendedNutrition {
                        fiber_g: item.fiber_g,
                        sodium_mg: item.sodium_mg,
                        sugar_g: item.sugar_g,
                        saturated_fat_g: item.saturated_fat_g,
                    },
                    barcode: item.barcode,
                })
                .collect(),
            reported_totals: Some(MealTotals {
                calories: self.total_calories,
                protein_g: self.total_protein_g,
                carbs_g: self.total_carbs_g,
                fat_g: self.total_fat_g,
                fiber_g: self.total_fiber_g,
            }),
            is_synced: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkoutLogDto {
    pub id: String,
    #[serde(default)]
    pub plan_id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub workout_type: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub end_time: Option<String>,
    #[serde(default)]
    pub duration_min: i64,
    #[serde(default)]
    pub calories_burned: Option<i64>,
    #[serde(default)]
    pub avg_heart_rate: Option<i64>,
    #[serde(default)]
    pub max_heart_rate: Option<i64>,
    #[serde(default)]
    pub distance_km: Option<f64>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub sets: Vec<SetLogDto>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetLogDto {
    #[serde(default)]
    pub id: Option<String>,
    pub exercise_name: String,
    #[serde(default = "first_set")]
    pub set_number: i64,
    #[serde(default)]
    pub reps: Option<i64>,
    #[serde(default)]
    pub weight_kg: Option<f64>,
    #[serde(default)]
    pub duration_sec: Option<i64>,
    #[serde(default)]
    pub distance_m: Option<f64>,
    #[serde(default = "yes")]
    pub completed: bool,
    #[serde(default)]
    pub is_warmup: bool,
    #[serde(default)]
    pub rpe: Option<i64>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub order_index: i64,
}

fn first_set() -> i64 {
    1
}

fn yes() -> bool {
    true
}

impl WorkoutLogDto {
    #[must_use]
    pub fn into_new_workout_log(self) -> NewWorkoutLog {
        let mut sets = self.sets;
        sets.sort_by_key(|s| s.order_index);
        NewWorkoutLog {
            remote_id: Some(self.id),
            plan_remote_id: self.plan_id,
            name: self.name,
            category: self
                .workout_type
                .as_deref()
                .and_then(WorkoutCategory::parse)
                .unwrap_or(WorkoutCategory::Other),
            source: self
                .source
                .as_deref()
                .and_then(LogSource::parse)
                .unwrap_or(LogSource::Manual),
            start_time: lenient_time(self.start_time.as_deref()).unwrap_or_else(Utc::now),
            end_time: lenient_time(self.end_time.as_deref()),
            duration_min: self.duration_min,
            metrics: WorkoutMetrics {
                calories_burned: self.calories_burned,
                avg_heart_rate: self.avg_heart_rate,
                max_heart_rate: self.max_heart_rate,
                distance_km: self.distance_km,
            },
            notes: self.notes,
            sets: sets
                .into_iter()
                .map(|s| NewSetLog {
                    remote_id: s.id,
                    exercise_name: s.exercise_name,
                    set_number: s.set_number,
                    reps: s.reps,
                    weight_kg: s.weight_kg,
                    duration_sec: s.duration_sec,
                    distance_m: s.distance_m,
                    completed: s.completed,
                    is_warmup: s.is_warmup,
                    rpe: s.rpe,
                    notes: s.notes,
                })
                .collect(),
            is_synced: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkoutPlanDto {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub workout_type: Option<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub scheduled_days: Vec<i64>,
    #[serde(default)]
    pub estimated_duration_min: Option<i64>,
    #[serde(default = "yes")]
    pub is_active: bool,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub exercises: Vec<ExerciseDto>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExerciseDto {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub muscle_group: Option<String>,
    #[serde(default)]
    pub sets: Option<i64>,
    #[serde(default)]
    pub reps_min: Option<i64>,
    #[serde(default)]
    pub reps_max: Option<i64>,
    #[serde(default)]
    pub duration_sec: Option<i64>,
    #[serde(default)]
    pub rest_sec: Option<i64>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub order_index: i64,
}

impl WorkoutPlanDto {
    #[must_use]
    pub fn into_new_workout_plan(self) -> NewWorkoutPlan {
        let mut exercises = self.exercises;
        exercises.sort_by_key(|e| e.order_index);
        NewWorkoutPlan {
            remote_id: Some(self.id),
            name: self.name,
            description: self.description,
            category: self
                .workout_type
                .as_deref()
                .and_then(WorkoutCategory::parse)
                .unwrap_or(WorkoutCategory::Other),
            scheduled_days: normalize_schedule(self.scheduled_days),
            estimated_duration_min: self.estimated_duration_min,
            is_active: self.is_active,
            exercises: exercises
                .into_iter()
                .map(|e| NewExercise {
                    remote_id: e.id,
                    name: e.name,
                    muscle_group: e.muscle_group,
                    sets: e.sets.unwrap_or(DEFAULT_EXERCISE_SETS),
                    reps_min: e.reps_min,
                    reps_max: e.reps_max,
                    duration_sec: e.duration_sec,
                    rest_sec: e.rest_sec.unwrap_or(DEFAULT_REST_SEC),
                    notes: e.notes,
                })
                .collect(),
            is_synced: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WaterDto {
    pub id: String,
    pub amount_ml: i64,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
}

impl WaterDto {
    #[must_use]
    pub fn into_new_water_entry(self) -> NewWaterEntry {
        NewWaterEntry {
            remote_id: Some(self.id),
            amount_ml: self.amount_ml,
            timestamp: lenient_time(self.timestamp.as_deref()).unwrap_or_else(Utc::now),
            source: self.source.unwrap_or_else(|| "manual".to_string()),
            is_synced: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeightDto {
    pub id: String,
    pub weight_kg: f64,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
}

impl WeightDto {
    #[must_use]
    pub fn into_new_weight_entry(self) -> NewWeightEntry {
        NewWeightEntry {
            remote_id: Some(self.id),
            weight_kg: self.weight_kg,
            timestamp: lenient_time(self.timestamp.as_deref()).unwrap_or_else(Utc::now),
            notes: self.notes,
            source: self.source.unwrap_or_else(|| "manual".to_string()),
            is_synced: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MacroTargetsDto {
    pub calories: f64,
    pub protein_g: f64,
    pub carbs_g: f64,
    pub fat_g: f64,
    #[serde(default)]
    pub fiber_g: Option<f64>,
    #[serde(default)]
    pub bmr: Option<f64>,
    #[serde(default)]
    pub tdee: Option<f64>,
    #[serde(default)]
    pub calculated_at: Option<String>,
}

impl MacroTargetsDto {
    /// Server values are stored as-is; only integer fields are rounded.
    #[must_use]
    pub fn into_row(self, user_id: &str) -> MacroTargets {
        MacroTargets {
            user_id: user_id.to_string(),
            calories: self.calories.round() as i64,
            protein_g: self.protein_g,
            carbs_g: self.carbs_g,
            fat_g: self.fat_g,
            fiber_g: self.fiber_g,
            bmr: self.bmr.map(|v| v.round() as i64),
            tdee: self.tdee.map(|v| v.round() as i64),
            source: TargetSource::Server,
            calculated_at: lenient_time(self.calculated_at.as_deref()).unwrap_or_else(Utc::now),
        }
    }
}

// --- Outbound payloads ---

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MealPayload {
    pub name: String,
    pub meal_type: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub items: Vec<FoodItemPayload>,
    /// Local uuid, lets the server recognise a retried create.
    pub local_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FoodItemPayload {
    pub name: String,
    pub source: String,
    pub grams: f64,
    pub calories: i64,
    pub protein_g: f64,
    pub carbs_g: f64,
    pub fat_g: f64,
    #[serde(flatten)]
    pub extra: ExtendedNutrition,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub barcode: Option<String>,
}

impl From<&Meal> for MealPayload {
    fn from(meal: &Meal) -> Self {
        Self {
            name: meal.name.clone(),
            meal_type: meal.category.as_str().to_string(),
            timestamp: meal.timestamp,
            notes: meal.notes.clone(),
            items: meal
                .items
                .iter()
                .map(|item| FoodItemPayload {
                    name: item.name.clone(),
                    source: item.source.wire_str().to_string(),
                    grams: item.grams,
                    calories: item.calories.round() as i64,
                    protein_g: item.protein_g,
                    carbs_g: item.carbs_g,
                    fat_g: item.fat_g,
                    extra: item.extra,
                    barcode: item.barcode.clone(),
                })
                .collect(),
            local_id: meal.uuid.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkoutLogPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan_id: Option<String>,
    pub name: String,
    pub workout_type: String,
    pub source: String,
    pub start_time: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    pub duration_min: i64,
    #[serde(flatten)]
    pub metrics: WorkoutMetrics,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub sets: Vec<SetLogPayload>,
    pub local_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SetLogPayload {
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
    pub order_index: i64,
}

impl From<&WorkoutLog> for WorkoutLogPayload {
    fn from(log: &WorkoutLog) -> Self {
        Self {
            plan_id: log.plan_remote_id.clone(),
            name: log.name.clone(),
            workout_type: log.category.as_str().to_string(),
            source: log.source.as_str().to_string(),
            start_time: log.start_time,
            end_time: log.end_time,
            duration_min: log.duration_min.max(1),
            metrics: log.metrics,
            notes: log.notes.clone(),
            sets: log
                .sets
                .iter()
                .map(|s| SetLogPayload {
                    exercise_name: s.exercise_name.clone(),
                    set_number: s.set_number,
                    reps: s.reps,
                    weight_kg: s.weight_kg,
                    duration_sec: s.duration_sec,
                    distance_m: s.distance_m,
                    completed: s.completed,
                    is_warmup: s.is_warmup,
                    rpe: s.rpe,
                    notes: s.notes.clone(),
                    order_index: s.position,
                })
                .collect(),
            local_id: log.uuid.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WaterPayload {
    pub amount_ml: i64,
    pub timestamp: DateTime<Utc>,
    pub source: String,
    pub local_id: String,
}

impl From<&WaterEntry> for WaterPayload {
    fn from(entry: &WaterEntry) -> Self {
        Self {
            amount_ml: entry.amount_ml,
            timestamp: entry.timestamp,
            source: entry.source.clone(),
            local_id: entry.uuid.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeightPayload {
    pub weight_kg: f64,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub source: String,
    pub local_id: String,
}

impl From<&WeightEntry> for WeightPayload {
    fn from(entry: &WeightEntry) -> Self {
        Self {
            weight_kg: entry.weight_kg,
            timestamp: entry.timestamp,
            notes: entry.notes.clone(),
            source: entry.source.clone(),
            local_id: entry.uuid.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_reply_treats_null_lists_as_empty() {
        let reply: AssistantReply = serde_json::from_value(json!({
            "message": "Logged it.",
            "tool_calls": null,
            "created_entries": null,
            "conversation_id": "c-1",
            "model_used": "gpt"
        }))
        .unwrap();
        assert!(reply.tool_calls.is_empty());
        assert!(reply.created_entries.is_empty());
        assert_eq!(reply.conversation_id.as_deref(), Some("c-1"));
    }

    #[test]
    fn test_entry_descriptor_accepts_type_alias() {
        let reply: AssistantReply = serde_json::from_value(json!({
            "message": "",
            "created_entries": [
                {"type": "meal", "data": {"meal_id": "m-1", "name": "Oats"}},
                {"kind": "create_water_entry", "amount_ml": 300}
            ]
        }))
        .unwrap();
        assert_eq!(reply.created_entries.len(), 2);
        assert_eq!(reply.created_entries[0].kind, "meal");
        assert!(reply.created_entries[0].fields.contains_key("data"));
        assert_eq!(reply.created_entries[1].fields["amount_ml"], json!(300));
    }

    #[test]
    fn test_meal_dto_into_new_meal() {
        let dto: MealDto = serde_json::from_value(json!({
            "id": "m-1",
            "name": "Breakfast",
            "meal_type": "BREAKFAST",
            "timestamp": "2026-03-14T08:00:00",
            "total_calories": 451,
            "total_protein_g": 20.5,
            "total_carbs_g": 60.0,
            "total_fat_g": 12.0,
            "items": [
                {"id": "f-1", "name": "Oats", "source": "open_food_facts", "grams": 80,
                 "calories": 300, "protein_g": 10, "carbs_g": 50, "fat_g": 6, "fiber_g": 8},
                {"name": "Milk", "grams": 200, "calories": 150, "protein_g": 10.5,
                 "carbs_g": 10, "fat_g": 6}
            ]
        }))
        .unwrap();
        let meal = dto.into_new_meal();
        assert_eq!(meal.remote_id.as_deref(), Some("m-1"));
        assert_eq!(meal.category, MealCategory::Breakfast);
        assert!(meal.is_synced);
        assert_eq!(meal.items.len(), 2);
        assert_eq!(meal.items[0].source, FoodSource::Catalog);
        assert_eq!(meal.items[1].source, FoodSource::Manual);
        assert_eq!(meal.reported_totals.unwrap().calories, 451.0);
    }

    #[test]
    fn test_plan_dto_orders_exercises_and_defaults() {
        let dto: WorkoutPlanDto = serde_json::from_value(json!({
            "id": "p-1",
            "name": "Full body",
            "workout_type": "strength",
            "scheduled_days": [0, 3, 9],
            "exercises": [
                {"name": "Row", "order_index": 1},
                {"name": "Squat", "order_index": 0, "sets": 5, "rest_sec": 120}
            ]
        }))
        .unwrap();
        let plan = dto.into_new_workout_plan();
        assert_eq!(plan.exercises[0].name, "Squat");
        assert_eq!(plan.exercises[0].sets, 5);
        assert_eq!(plan.exercises[1].sets, DEFAULT_EXERCISE_SETS);
        assert_eq!(plan.exercises[1].rest_sec, DEFAULT_REST_SEC);
        assert_eq!(plan.scheduled_days.len(), 2);
        assert!(plan.is_active);
    }

    #[test]
    fn test_targets_dto_into_row() {
        let dto: MacroTargetsDto = serde_json::from_value(json!({
            "calories": 2100, "protein_g": 160.0, "carbs_g": 210.0, "fat_g": 70.0,
            "fiber_g": 29.4, "bmr": 1700, "tdee": 2600,
            "calculated_at": "2026-03-14T10:00:00Z"
        }))
        .unwrap();
        let row = dto.into_row("u1");
        assert_eq!(row.calories, 2100);
        assert_eq!(row.source, TargetSource::Server);
        assert_eq!(row.tdee, Some(2600));
    }

    #[test]
    fn test_error_helpers() {
        assert!(RemoteError::Unauthorized.is_unauthorized());
        assert!(
            RemoteError::Http {
                status: 404,
                body: String::new()
            }
            .is_not_found()
        );
        assert!(!RemoteError::Timeout.is_not_found());
    }
}
