//! Turns an assistant reply into an ordered list of typed commands.
//!
//! Replies carry two notification shapes: entry descriptors (a `kind` tag
//! plus an untyped field map) and tool calls (a `name` plus arguments).
//! Both are decoded by one decoder per command kind. Coercion is per field:
//! a value that cannot be read is reported and omitted, and the rest of the
//! command is kept.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::issue::Issue;
use crate::models::{
    ActivityLevel, ExtendedNutrition, FoodSource, GoalType, MacroPlan, MealCategory, NewExercise,
    NewFoodItem, NewSetLog, WorkoutCategory, normalize_schedule, parse_timestamp,
    DEFAULT_EXERCISE_SETS, DEFAULT_REST_SEC,
};
use crate::remote::{AssistantReply, EntryDescriptor, ToolCall};

/// Upper bound on sets expanded from a single `{name, sets: N}` exercise.
const MAX_EXPANDED_SETS: i64 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    CreateMeal,
    CreateWaterEntry,
    CreateWeightEntry,
    CreateWorkoutLog,
    CreateWorkoutPlan,
    SetGoal,
    SetCustomMacros,
}

impl CommandKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            CommandKind::CreateMeal => "create_meal",
            CommandKind::CreateWaterEntry => "create_water_entry",
            CommandKind::CreateWeightEntry => "create_weight_entry",
            CommandKind::CreateWorkoutLog => "create_workout_log",
            CommandKind::CreateWorkoutPlan => "create_workout_plan",
            CommandKind::SetGoal => "set_goal",
            CommandKind::SetCustomMacros => "set_custom_macros",
        }
    }

    /// Resolve a descriptor kind or tool name. `None` for anything unrecognised.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        let normalized = name.trim().to_lowercase().replace('-', "_");
        let kind = match normalized.as_str() {
            "create_meal" | "add_meal" => CommandKind::CreateMeal,
            "create_water_entry" | "add_water" => CommandKind::CreateWaterEntry,
            "create_weight_entry" | "add_weight" => CommandKind::CreateWeightEntry,
            "create_workout_log" | "add_workout" => CommandKind::CreateWorkoutLog,
            "create_workout_plan" | "create_plan" => CommandKind::CreateWorkoutPlan,
            "set_goal" => CommandKind::SetGoal,
            "set_custom_macros" => CommandKind::SetCustomMacros,
            _ => return None,
        };
        Some(kind)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    CreateMeal(MealCommand),
    CreateWaterEntry(WaterCommand),
    CreateWeightEntry(WeightCommand),
    CreateWorkoutLog(WorkoutLogCommand),
    CreateWorkoutPlan(WorkoutPlanCommand),
    SetGoal(GoalCommand),
    SetCustomMacros(CustomMacrosCommand),
}

impl Command {
    #[must_use]
    pub fn kind(&self) -> CommandKind {
        match self {
            Command::CreateMeal(_) => CommandKind::CreateMeal,
            Command::CreateWaterEntry(_) => CommandKind::CreateWaterEntry,
            Command::CreateWeightEntry(_) => CommandKind::CreateWeightEntry,
            Command::CreateWorkoutLog(_) => CommandKind::CreateWorkoutLog,
            Command::CreateWorkoutPlan(_) => CommandKind::CreateWorkoutPlan,
            Command::SetGoal(_) => CommandKind::SetGoal,
            Command::SetCustomMacros(_) => CommandKind::SetCustomMacros,
        }
    }

    #[must_use]
    pub fn remote_id(&self) -> Option<&str> {
        match self {
            Command::CreateMeal(c) => c.remote_id.as_deref(),
            Command::CreateWaterEntry(c) => c.remote_id.as_deref(),
            Command::CreateWeightEntry(c) => c.remote_id.as_deref(),
            Command::CreateWorkoutLog(c) => c.remote_id.as_deref(),
            Command::CreateWorkoutPlan(c) => c.remote_id.as_deref(),
            Command::SetGoal(_) | Command::SetCustomMacros(_) => None,
        }
    }

    /// Goal-affecting commands trigger the end-of-batch targets refresh.
    #[must_use]
    pub fn affects_goal(&self) -> bool {
        matches!(self, Command::SetGoal(_) | Command::SetCustomMacros(_))
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MealCommand {
    pub remote_id: Option<String>,
    pub name: Option<String>,
    pub category: Option<MealCategory>,
    pub timestamp: Option<DateTime<Utc>>,
    pub notes: Option<String>,
    pub total_calories: Option<f64>,
    pub total_protein_g: Option<f64>,
    pub total_carbs_g: Option<f64>,
    pub total_fat_g: Option<f64>,
    pub items: Vec<NewFoodItem>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WaterCommand {
    pub remote_id: Option<String>,
    pub amount_ml: Option<i64>,
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WeightCommand {
    pub remote_id: Option<String>,
    pub weight_kg: Option<f64>,
    pub timestamp: Option<DateTime<Utc>>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkoutLogCommand {
    pub remote_id: Option<String>,
    pub plan_remote_id: Option<String>,
    pub name: Option<String>,
    pub category: Option<WorkoutCategory>,
    pub start_time: Option<DateTime<Utc>>,
    pub duration_min: Option<i64>,
    pub calories_burned: Option<i64>,
    pub notes: Option<String>,
    pub sets: Vec<NewSetLog>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorkoutPlanCommand {
    pub remote_id: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub category: Option<WorkoutCategory>,
    pub scheduled_days: Option<BTreeSet<u8>>,
    pub estimated_duration_min: Option<i64>,
    pub exercises: Vec<NewExercise>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GoalCommand {
    pub goal_type: Option<GoalType>,
    pub goal_rate_kg_per_week: Option<f64>,
    pub activity_level: Option<ActivityLevel>,
    pub target_weight_kg: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CustomMacrosCommand {
    pub macro_plan: Option<MacroPlan>,
    pub protein_pct: Option<f64>,
    pub carbs_pct: Option<f64>,
    pub fat_pct: Option<f64>,
    pub override_calories: Option<i64>,
    pub override_protein_g: Option<f64>,
    pub override_carbs_g: Option<f64>,
    pub override_fat_g: Option<f64>,
}

#[derive(Debug, Clone, Default)]
pub struct Interpretation {
    pub commands: Vec<Command>,
    pub issues: Vec<Issue>,
}

#[must_use]
pub fn interpret(reply: &AssistantReply) -> Interpretation {
    interpret_parts(&reply.created_entries, &reply.tool_calls)
}

/// Descriptors come first, in delivery order, followed by any tool calls
/// they did not already report. The first N tool calls of a kind are taken
/// to be covered by the N descriptors of that kind; a covered call's
/// arguments fill the fields its descriptor leaves out.
#[must_use]
pub fn interpret_parts(descriptors: &[EntryDescriptor], tool_calls: &[ToolCall]) -> Interpretation {
    let mut out = Interpretation::default();
    let mut described: Vec<(CommandKind, Map<String, Value>)> = Vec::new();

    for descriptor in descriptors {
        let Some(kind) = CommandKind::from_name(&descriptor.kind) else {
            tracing::debug!(kind = %descriptor.kind, "ignoring unrecognised entry kind");
            continue;
        };
        let fields = match descriptor.fields.get("data") {
            Some(Value::Object(data)) => data,
            _ => &descriptor.fields,
        };
        described.push((kind, fields.clone()));
    }

    let mut covered: HashMap<CommandKind, usize> = HashMap::new();
    let mut uncovered: Vec<(CommandKind, Map<String, Value>)> = Vec::new();
    for call in tool_calls {
        let Some(kind) = CommandKind::from_name(&call.name) else {
            tracing::debug!(name = %call.name, "ignoring unrecognised tool call");
            continue;
        };
        let arguments = call_arguments(kind, &call.arguments, &mut out.issues);
        let seen = covered.entry(kind).or_default();
        let target = described.iter_mut().filter(|(k, _)| *k == kind).nth(*seen);
        match target {
            Some((_, fields)) => {
                *seen += 1;
                for (key, value) in arguments {
                    fields.entry(key).or_insert(value);
                }
            }
            None => uncovered.push((kind, arguments)),
        }
    }

    for (kind, fields) in described.iter().chain(&uncovered) {
        out.commands.push(decode(*kind, fields, &mut out.issues));
    }
    out
}

fn call_arguments(kind: CommandKind, arguments: &Value, issues: &mut Vec<Issue>) -> Map<String, Value> {
    match arguments {
        Value::Object(map) => map.clone(),
        Value::String(raw) => match serde_json::from_str::<Value>(raw) {
            Ok(Value::Object(map)) => map,
            _ => {
                issues.push(Issue::Parse {
                    kind: kind.as_str(),
                    field: "arguments".to_string(),
                    reason: "not a JSON object".to_string(),
                });
                Map::new()
            }
        },
        Value::Null => Map::new(),
        other => {
            issues.push(Issue::Parse {
                kind: kind.as_str(),
                field: "arguments".to_string(),
                reason: format!("expected an object, got {}", describe(other)),
            });
            Map::new()
        }
    }
}

fn decode(kind: CommandKind, fields: &Map<String, Value>, issues: &mut Vec<Issue>) -> Command {
    let mut r = FieldReader::new(kind.as_str(), fields, issues);
    match kind {
        CommandKind::CreateMeal => Command::CreateMeal(decode_meal(&mut r)),
        CommandKind::CreateWaterEntry => Command::CreateWaterEntry(WaterCommand {
            remote_id: r.text(&["id", "entry_id"]),
            amount_ml: r.int(&["amount_ml", "amount"]),
            timestamp: r.timestamp(&["timestamp"]),
        }),
        CommandKind::CreateWeightEntry => Command::CreateWeightEntry(WeightCommand {
            remote_id: r.text(&["id", "entry_id"]),
            weight_kg: r.float(&["weight_kg", "weight"]),
            timestamp: r.timestamp(&["timestamp"]),
            notes: r.text(&["notes"]),
        }),
        CommandKind::CreateWorkoutLog => Command::CreateWorkoutLog(decode_workout_log(&mut r)),
        CommandKind::CreateWorkoutPlan => Command::CreateWorkoutPlan(decode_workout_plan(&mut r)),
        CommandKind::SetGoal => Command::SetGoal(GoalCommand {
            goal_type: r.choice(&["goal_type", "goal"], GoalType::parse),
            goal_rate_kg_per_week: r.float(&["goal_rate_kg_per_week", "rate_kg_per_week", "rate"]),
            activity_level: r.choice(&["activity_level"], ActivityLevel::parse),
            target_weight_kg: r.float(&["target_weight_kg"]),
        }),
        CommandKind::SetCustomMacros => Command::SetCustomMacros(CustomMacrosCommand {
            macro_plan: r.choice(&["macro_plan", "plan"], MacroPlan::parse),
            protein_pct: r.float(&["protein_pct", "protein_percent"]),
            carbs_pct: r.float(&["carbs_pct", "carbs_percent"]),
            fat_pct: r.float(&["fat_pct", "fat_percent"]),
            override_calories: r.int(&["override_calories", "calories"]),
            override_protein_g: r.float(&["override_protein_g", "protein_g"]),
            override_carbs_g: r.float(&["override_carbs_g", "carbs_g"]),
            override_fat_g: r.float(&["override_fat_g", "fat_g"]),
        }),
    }
}

fn decode_meal(r: &mut FieldReader<'_>) -> MealCommand {
    MealCommand {
        remote_id: r.text(&["id", "meal_id"]),
        name: r.text(&["name"]),
        category: r.choice(&["meal_type", "category"], MealCategory::parse),
        timestamp: r.timestamp(&["timestamp"]),
        notes: r.text(&["notes"]),
        total_calories: r.float(&["total_calories", "calories"]),
        total_protein_g: r.float(&["total_protein_g", "protein_g"]),
        total_carbs_g: r.float(&["total_carbs_g", "carbs_g"]),
        total_fat_g: r.float(&["total_fat_g", "fat_g"]),
        items: r.each(&["items", "foods"], |item| {
            let name = item.required_name(&["name"])?;
            Some(NewFoodItem {
                remote_id: item.text(&["id"]),
                name,
                source: item
                    .choice(&["source"], FoodSource::parse)
                    .unwrap_or(FoodSource::Chat),
                grams: item.float(&["grams"]).unwrap_or(100.0),
                calories: item.float(&["calories"]).unwrap_or(0.0),
                protein_g: item.float(&["protein_g"]).unwrap_or(0.0),
                carbs_g: item.float(&["carbs_g"]).unwrap_or(0.0),
                fat_g: item.float(&["fat_g"]).unwrap_or(0.0),
                extra: ExtendedNutrition {
                    fiber_g: item.float(&["fiber_g"]),
                    sodium_mg: item.float(&["sodium_mg"]),
                    sugar_g: item.float(&["sugar_g"]),
                    saturated_fat_g: item.float(&["saturated_fat_g"]),
                },
                barcode: item.text(&["barcode"]),
            })
        }),
    }
}

fn decode_workout_log(r: &mut FieldReader<'_>) -> WorkoutLogCommand {
    let exercises: Vec<Vec<NewSetLog>> = r.each(&["exercises", "sets"], |ex| {
        let name = ex.required_name(&["name", "exercise_name"])?;
        let template = NewSetLog {
            reps: ex.int(&["reps"]),
            weight_kg: ex.float(&["weight_kg", "weight"]),
            duration_sec: ex.int(&["duration_sec"]),
            distance_m: ex.float(&["distance_m"]),
            completed: ex.boolean(&["completed"]).unwrap_or(true),
            is_warmup: ex.boolean(&["is_warmup"]).unwrap_or(false),
            rpe: ex.int(&["rpe"]),
            notes: ex.text(&["notes"]),
            ..NewSetLog::numbered(&name, 1)
        };
        // A row with `set_number` is one logged set; otherwise `sets` is a count.
        if let Some(number) = ex.int(&["set_number"]) {
            return Some(vec![NewSetLog {
                set_number: number,
                ..template
            }]);
        }
        let count = ex.int(&["sets"]).unwrap_or(1).clamp(1, MAX_EXPANDED_SETS);
        Some(
            (1..=count)
                .map(|set_number| NewSetLog {
                    set_number,
                    ..template.clone()
                })
                .collect(),
        )
    });

    WorkoutLogCommand {
        remote_id: r.text(&["id", "workout_id", "log_id"]),
        plan_remote_id: r.text(&["plan_id"]),
        name: r.text(&["name"]),
        category: r.choice(&["workout_type", "category"], WorkoutCategory::parse),
        start_time: r.timestamp(&["start_time", "timestamp"]),
        duration_min: r.int(&["duration_min", "duration"]),
        calories_burned: r.int(&["calories_burned"]),
        notes: r.text(&["notes"]),
        sets: exercises.into_iter().flatten().collect(),
    }
}

fn decode_workout_plan(r: &mut FieldReader<'_>) -> WorkoutPlanCommand {
    WorkoutPlanCommand {
        remote_id: r.text(&["id", "plan_id"]),
        name: r.text(&["name"]),
        description: r.text(&["description"]),
        category: r.choice(&["workout_type", "category"], WorkoutCategory::parse),
        scheduled_days: r.int_list(&["scheduled_days"]).map(normalize_schedule),
        estimated_duration_min: r.int(&["estimated_duration_min"]),
        exercises: r.each(&["exercises"], |ex| {
            let name = ex.required_name(&["name"])?;
            let reps = ex.int(&["reps"]);
            Some(NewExercise {
                remote_id: ex.text(&["id"]),
                name,
                muscle_group: ex.text(&["muscle_group"]),
                sets: ex.int(&["sets"]).unwrap_or(DEFAULT_EXERCISE_SETS),
                reps_min: ex.int(&["reps_min"]).or(reps),
                reps_max: ex.int(&["reps_max"]).or(reps),
                duration_sec: ex.int(&["duration_sec"]),
                rest_sec: ex.int(&["rest_sec"]).unwrap_or(DEFAULT_REST_SEC),
                notes: ex.text(&["notes"]),
            })
        }),
    }
}

fn describe(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(_) => "a boolean".to_string(),
        Value::Number(n) => format!("number {n}"),
        Value::String(s) => format!("string {s:?}"),
        Value::Array(_) => "an array".to_string(),
        Value::Object(_) => "an object".to_string(),
    }
}

/// Reads fields out of an untyped map, converting across representations.
/// Missing and `null` fields read as `None` silently; present but unusable
/// fields read as `None` and leave a `Parse` issue behind.
struct FieldReader<'a> {
    kind: &'static str,
    prefix: String,
    map: &'a Map<String, Value>,
    issues: &'a mut Vec<Issue>,
}

impl<'a> FieldReader<'a> {
    fn new(kind: &'static str, map: &'a Map<String, Value>, issues: &'a mut Vec<Issue>) -> Self {
        Self {
            kind,
            prefix: String::new(),
            map,
            issues,
        }
    }

    fn lookup(&self, keys: &[&'static str]) -> Option<(&'static str, &'a Value)> {
        keys.iter()
            .find_map(|key| match self.map.get(*key) {
                None | Some(Value::Null) => None,
                Some(value) => Some((*key, value)),
            })
    }

    fn reject(&mut self, key: &str, reason: String) {
        self.issues.push(Issue::Parse {
            kind: self.kind,
            field: format!("{}{key}", self.prefix),
            reason,
        });
    }

    fn text(&mut self, keys: &[&'static str]) -> Option<String> {
        let (key, value) = self.lookup(keys)?;
        match value {
            Value::String(s) => {
                let trimmed = s.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_string())
            }
            Value::Number(n) => Some(n.to_string()),
            other => {
                self.reject(key, format!("expected text, got {}", describe(other)));
                None
            }
        }
    }

    fn required_name(&mut self, keys: &[&'static str]) -> Option<String> {
        let name = self.text(keys);
        if name.is_none() {
            self.reject(keys[0], "entry has no name, skipped".to_string());
        }
        name
    }

    fn float(&mut self, keys: &[&'static str]) -> Option<f64> {
        let (key, value) = self.lookup(keys)?;
        let parsed = match value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        };
        match parsed.filter(|v| v.is_finite()) {
            Some(v) => Some(v),
            None => {
                self.reject(key, format!("expected a number, got {}", describe(value)));
                None
            }
        }
    }

    fn int(&mut self, keys: &[&'static str]) -> Option<i64> {
        let (key, value) = self.lookup(keys)?;
        if let Some(i) = value.as_i64() {
            return Some(i);
        }
        let as_float = match value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        };
        match as_float.filter(|v| v.is_finite() && v.abs() < 9.0e15) {
            Some(v) => Some(v.round() as i64),
            None => {
                self.reject(key, format!("expected an integer, got {}", describe(value)));
                None
            }
        }
    }

    fn boolean(&mut self, keys: &[&'static str]) -> Option<bool> {
        let (key, value) = self.lookup(keys)?;
        let parsed = match value {
            Value::Bool(b) => Some(*b),
            Value::Number(n) => n.as_f64().map(|v| v != 0.0),
            Value::String(s) => match s.trim().to_lowercase().as_str() {
                "true" | "yes" | "1" => Some(true),
                "false" | "no" | "0" => Some(false),
                _ => None,
            },
            _ => None,
        };
        if parsed.is_none() {
            self.reject(key, format!("expected a boolean, got {}", describe(value)));
        }
        parsed
    }

    fn timestamp(&mut self, keys: &[&'static str]) -> Option<DateTime<Utc>> {
        let (key, value) = self.lookup(keys)?;
        let parsed = match value {
            Value::String(s) => parse_timestamp(s),
            Value::Number(n) => n.as_f64().and_then(|secs| {
                // Values this large are milliseconds.
                let secs = if secs.abs() > 1.0e12 { secs / 1000.0 } else { secs };
                DateTime::from_timestamp(secs.trunc() as i64, 0)
            }),
            _ => None,
        };
        if parsed.is_none() {
            self.reject(key, format!("expected a timestamp, got {}", describe(value)));
        }
        parsed
    }

    /// Read a string field and map it through `parse`, e.g. an enum name.
    fn choice<T>(&mut self, keys: &[&'static str], parse: fn(&str) -> Option<T>) -> Option<T> {
        let (key, value) = self.lookup(keys)?;
        let parsed = value.as_str().and_then(parse);
        if parsed.is_none() {
            self.reject(key, format!("unrecognised value {}", describe(value)));
        }
        parsed
    }

    fn int_list(&mut self, keys: &[&'static str]) -> Option<Vec<i64>> {
        let (key, value) = self.lookup(keys)?;
        let Value::Array(elements) = value else {
            self.reject(key, format!("expected a list, got {}", describe(value)));
            return None;
        };
        let mut out = Vec::with_capacity(elements.len());
        for (i, element) in elements.iter().enumerate() {
            match element.as_i64().or_else(|| element.as_str()?.trim().parse().ok()) {
                Some(v) => out.push(v),
                None => self.reject(
                    &format!("{key}[{i}]"),
                    format!("expected an integer, got {}", describe(element)),
                ),
            }
        }
        Some(out)
    }

    /// Decode every object in a list with a nested reader. Elements that are
    /// not objects, or that the decoder rejects, are skipped.
    fn each<T>(
        &mut self,
        keys: &[&'static str],
        mut decode: impl FnMut(&mut FieldReader<'_>) -> Option<T>,
    ) -> Vec<T> {
        let Some((key, value)) = self.lookup(keys) else {
            return Vec::new();
        };
        let Value::Array(elements) = value else {
            self.reject(key, format!("expected a list, got {}", describe(value)));
            return Vec::new();
        };
        let mut out = Vec::with_capacity(elements.len());
        for (i, element) in elements.iter().enumerate() {
            let Value::Object(map) = element else {
                self.reject(
                    &format!("{key}[{i}]"),
                    format!("expected an object, got {}", describe(element)),
                );
                continue;
            };
            let mut nested = FieldReader {
                kind: self.kind,
                prefix: format!("{}{key}[{i}].", self.prefix),
                map,
                issues: &mut *self.issues,
            };
            if let Some(decoded) = decode(&mut nested) {
                out.push(decoded);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::issue::IssueClass;
    use serde_json::json;

    fn descriptor(value: Value) -> EntryDescriptor {
        serde_json::from_value(value).unwrap()
    }

    fn tool_call(name: &str, arguments: Value) -> ToolCall {
        ToolCall {
            id: Some(format!("call-{name}")),
            name: name.to_string(),
            arguments,
        }
    }

    #[test]
    fn test_kind_names_are_normalized() {
        assert_eq!(CommandKind::from_name("Create-Meal"), Some(CommandKind::CreateMeal));
        assert_eq!(CommandKind::from_name("add_workout"), Some(CommandKind::CreateWorkoutLog));
        assert_eq!(CommandKind::from_name("create_plan"), Some(CommandKind::CreateWorkoutPlan));
        assert_eq!(CommandKind::from_name("search_food"), None);
        assert_eq!(CommandKind::from_name("log_sleep"), None);
    }

    #[test]
    fn test_unknown_kinds_are_dropped_silently() {
        let result = interpret_parts(
            &[descriptor(json!({"kind": "log_sleep", "hours": 8}))],
            &[tool_call("get_daily_summary", json!({}))],
        );
        assert!(result.commands.is_empty());
        assert!(result.issues.is_empty());
    }

    #[test]
    fn test_meal_descriptor_with_nested_data() {
        let result = interpret_parts(
            &[descriptor(json!({
                "type": "add_meal",
                "data": {"meal_id": "m-1", "name": "Oats", "total_calories": 350, "total_protein_g": "12.5"}
            }))],
            &[],
        );
        assert!(result.issues.is_empty());
        let Command::CreateMeal(meal) = &result.commands[0] else {
            panic!("expected a meal command");
        };
        assert_eq!(meal.remote_id.as_deref(), Some("m-1"));
        assert_eq!(meal.name.as_deref(), Some("Oats"));
        assert_eq!(meal.total_calories, Some(350.0));
        assert_eq!(meal.total_protein_g, Some(12.5));
    }

    #[test]
    fn test_numeric_identifier_becomes_string() {
        let result = interpret_parts(
            &[descriptor(json!({"kind": "create_workout_log", "workout_id": 77, "name": "Run"}))],
            &[],
        );
        assert_eq!(result.commands[0].remote_id(), Some("77"));
    }

    #[test]
    fn test_bad_field_is_omitted_not_fatal() {
        let result = interpret_parts(
            &[descriptor(json!({
                "kind": "create_water_entry",
                "amount_ml": "lots",
                "timestamp": "2026-03-14T09:00:00Z"
            }))],
            &[],
        );
        assert_eq!(result.commands.len(), 1);
        let Command::CreateWaterEntry(water) = &result.commands[0] else {
            panic!("expected a water command");
        };
        assert_eq!(water.amount_ml, None);
        assert!(water.timestamp.is_some());
        assert_eq!(result.issues.len(), 1);
        assert_eq!(result.issues[0].class(), IssueClass::Parse);
    }

    #[test]
    fn test_coercions_across_representations() {
        let result = interpret_parts(
            &[],
            &[tool_call(
                "add_workout",
                json!({
                    "name": "Legs",
                    "workout_type": "Strength",
                    "duration_min": 44.6,
                    "calories_burned": "300",
                    "timestamp": 1_773_475_200,
                    "exercises": [
                        {"name": "Squat", "sets": "3", "reps": 5, "weight_kg": "100"},
                        {"name": "Lunge", "sets": 2, "reps": 10, "completed": "yes"}
                    ]
                }),
            )],
        );
        assert!(result.issues.is_empty(), "{:?}", result.issues);
        let Command::CreateWorkoutLog(log) = &result.commands[0] else {
            panic!("expected a workout command");
        };
        assert_eq!(log.category, Some(WorkoutCategory::Strength));
        assert_eq!(log.duration_min, Some(45));
        assert_eq!(log.calories_burned, Some(300));
        assert!(log.start_time.is_some());
        assert_eq!(log.sets.len(), 5);
        assert_eq!(log.sets[2].set_number, 3);
        assert_eq!(log.sets[2].weight_kg, Some(100.0));
        assert_eq!(log.sets[4].exercise_name, "Lunge");
    }

    #[test]
    fn test_nested_items_skip_unnamed_elements() {
        let result = interpret_parts(
            &[],
            &[tool_call(
                "add_meal",
                json!({
                    "name": "Lunch",
                    "meal_type": "brunch",
                    "items": [
                        {"name": "Rice", "grams": 150, "calories": 195, "protein_g": 4, "carbs_g": 42, "fat_g": 0.4},
                        {"grams": 50},
                        "salad",
                        {"name": "Egg", "calories": "seventy"}
                    ]
                }),
            )],
        );
        let Command::CreateMeal(meal) = &result.commands[0] else {
            panic!("expected a meal command");
        };
        assert_eq!(meal.category, None);
        assert_eq!(meal.items.len(), 2);
        assert_eq!(meal.items[0].source, FoodSource::Chat);
        assert_eq!(meal.items[1].name, "Egg");
        assert_eq!(meal.items[1].calories, 0.0);
        assert_eq!(meal.items[1].grams, 100.0);
        let fields: Vec<_> = result
            .issues
            .iter()
            .filter_map(|issue| match issue {
                Issue::Parse { field, .. } => Some(field.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(
            fields,
            vec!["meal_type", "items[1].name", "items[2]", "items[3].calories"]
        );
    }

    #[test]
    fn test_string_arguments_are_parsed() {
        let result = interpret_parts(
            &[],
            &[
                tool_call("add_water", json!("{\"amount_ml\": 500}")),
                tool_call("add_weight", json!("not json")),
            ],
        );
        assert_eq!(result.commands.len(), 2);
        let Command::CreateWaterEntry(water) = &result.commands[0] else {
            panic!("expected a water command");
        };
        assert_eq!(water.amount_ml, Some(500));
        assert_eq!(result.issues.len(), 1);
    }

    #[test]
    fn test_descriptors_cover_matching_tool_calls() {
        let result = interpret_parts(
            &[descriptor(json!({"type": "add_meal", "data": {"meal_id": "m-1", "name": "Oats"}}))],
            &[
                tool_call("add_meal", json!({"name": "Oats", "items": []})),
                tool_call("add_meal", json!({"name": "Apple", "items": []})),
                tool_call("set_goal", json!({"goal_type": "cut", "goal_rate_kg_per_week": 0.5})),
            ],
        );
        let kinds: Vec<_> = result.commands.iter().map(Command::kind).collect();
        assert_eq!(
            kinds,
            vec![CommandKind::CreateMeal, CommandKind::CreateMeal, CommandKind::SetGoal]
        );
        let Command::CreateMeal(second) = &result.commands[1] else {
            panic!("expected a meal command");
        };
        assert_eq!(second.name.as_deref(), Some("Apple"));
    }

    #[test]
    fn test_covered_tool_call_fills_descriptor_gaps() {
        let result = interpret_parts(
            &[descriptor(json!({"type": "set_goal", "data": {"goal_type": "cut", "activity_level": "moderate"}}))],
            &[tool_call(
                "set_goal",
                json!({"goal_type": "bulk", "goal_rate_kg_per_week": 0.5, "activity_level": "active"}),
            )],
        );
        assert!(result.issues.is_empty());
        assert_eq!(
            result.commands,
            vec![Command::SetGoal(GoalCommand {
                goal_type: Some(GoalType::Cut),
                goal_rate_kg_per_week: Some(0.5),
                activity_level: Some(ActivityLevel::Moderate),
                target_weight_kg: None,
            })]
        );
    }

    #[test]
    fn test_plan_and_goal_decoding() {
        let result = interpret_parts(
            &[
                descriptor(json!({
                    "kind": "create_workout_plan",
                    "plan_id": "p-1",
                    "name": "PPL",
                    "scheduled_days": [0, "2", 4, 8, "x"],
                    "exercises": [{"name": "Bench", "reps": 8}]
                })),
                descriptor(json!({"kind": "set-goal", "goal_type": "bulk", "rate": "0.25", "activity_level": "very-active"})),
                descriptor(json!({"kind": "set_custom_macros", "protein_pct": 50, "carbs_pct": 30, "fat_pct": 30})),
            ],
            &[],
        );
        let Command::CreateWorkoutPlan(plan) = &result.commands[0] else {
            panic!("expected a plan command");
        };
        assert_eq!(plan.scheduled_days, Some(BTreeSet::from([0, 2, 4])));
        assert_eq!(plan.exercises[0].reps_min, Some(8));
        assert_eq!(plan.exercises[0].sets, DEFAULT_EXERCISE_SETS);
        assert_eq!(result.issues.len(), 1);

        let Command::SetGoal(goal) = &result.commands[1] else {
            panic!("expected a goal command");
        };
        assert_eq!(goal.goal_type, Some(GoalType::Bulk));
        assert_eq!(goal.goal_rate_kg_per_week, Some(0.25));
        assert_eq!(goal.activity_level, Some(ActivityLevel::VeryActive));

        let Command::SetCustomMacros(macros) = &result.commands[2] else {
            panic!("expected a macros command");
        };
        assert_eq!(macros.protein_pct, Some(50.0));
        assert!(result.commands[2].affects_goal());
    }

    #[test]
    fn test_interpret_reads_whole_reply() {
        let reply: AssistantReply = serde_json::from_value(json!({
            "message": "Done",
            "tool_calls": [{"id": "1", "name": "add_water", "arguments": {"amount_ml": 250}}],
            "created_entries": [{"type": "add_water", "data": {"entry_id": "w-9", "amount_ml": 250}}],
            "conversation_id": "c-1"
        }))
        .unwrap();
        let result = interpret(&reply);
        assert_eq!(result.commands.len(), 1);
        assert_eq!(result.commands[0].remote_id(), Some("w-9"));
    }
}
