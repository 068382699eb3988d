//! Replace-by-reconstruction for aggregates with children.
//!
//! A merge never diffs nested collections. The root row keeps its local id and
//! uuid, every root column is overwritten, and the children are deleted and
//! rebuilt from the incoming aggregate inside one transaction, so readers see
//! either the old aggregate or the new one.

use anyhow::{Context, Result};
use rusqlite::params;

use crate::db::{Database, write_meal, write_workout_log, write_workout_plan};
use crate::models::{
    Meal, NewMeal, NewWaterEntry, NewWeightEntry, NewWorkoutLog, NewWorkoutPlan, WaterEntry,
    WeightEntry, WorkoutLog, WorkoutPlan,
};

/// Result of an upsert keyed by remote id.
#[derive(Debug, Clone)]
pub enum Upserted<T> {
    Inserted(T),
    Replaced(T),
}

impl<T> Upserted<T> {
    pub fn into_inner(self) -> T {
        match self {
            Upserted::Inserted(v) | Upserted::Replaced(v) => v,
        }
    }

    pub fn was_replaced(&self) -> bool {
        matches!(self, Upserted::Replaced(_))
    }
}

impl Database {
    /// Rebuild meal `id` from `meal`. Totals are recomputed from the new items,
    /// then overwritten by `meal.reported_totals` when present.
    pub fn replace_meal(&self, id: i64, meal: &NewMeal) -> Result<Meal> {
        let tx = self.conn.unchecked_transaction()?;
        ensure_exists(&tx, "meals", id).context("Meal not found")?;
        write_meal(&tx, id, meal)?;
        tx.commit()?;
        self.get_meal(id)
    }

    pub fn upsert_meal(&self, user_id: &str, meal: &NewMeal) -> Result<Upserted<Meal>> {
        let existing = match &meal.remote_id {
            Some(remote_id) => self.find_meal_by_remote_id(remote_id)?,
            None => None,
        };
        match existing {
            Some(current) => Ok(Upserted::Replaced(self.replace_meal(current.id, meal)?)),
            None => Ok(Upserted::Inserted(self.insert_meal(user_id, meal)?)),
        }
    }

    pub fn replace_workout_log(&self, id: i64, log: &NewWorkoutLog) -> Result<WorkoutLog> {
        let tx = self.conn.unchecked_transaction()?;
        ensure_exists(&tx, "workout_logs", id).context("Workout log not found")?;
        write_workout_log(&tx, id, log)?;
        tx.commit()?;
        self.get_workout_log(id)
    }

    pub fn upsert_workout_log(
        &self,
        user_id: &str,
        log: &NewWorkoutLog,
    ) -> Result<Upserted<WorkoutLog>> {
        let existing = match &log.remote_id {
            Some(remote_id) => self.find_workout_log_by_remote_id(remote_id)?,
            None => None,
        };
        match existing {
            Some(current) => Ok(Upserted::Replaced(
                self.replace_workout_log(current.id, log)?,
            )),
            None => Ok(Upserted::Inserted(self.insert_workout_log(user_id, log)?)),
        }
    }

    pub fn replace_workout_plan(&self, id: i64, plan: &NewWorkoutPlan) -> Result<WorkoutPlan> {
        let tx = self.conn.unchecked_transaction()?;
        ensure_exists(&tx, "workout_plans", id).context("Workout plan not found")?;
        write_workout_plan(&tx, id, plan)?;
        tx.commit()?;
        self.get_workout_plan(id)
    }

    pub fn upsert_workout_plan(
        &self,
        user_id: &str,
        plan: &NewWorkoutPlan,
    ) -> Result<Upserted<WorkoutPlan>> {
        let existing = match &plan.remote_id {
            Some(remote_id) => self.find_workout_plan_by_remote_id(remote_id)?,
            None => None,
        };
        match existing {
            Some(current) => Ok(Upserted::Replaced(
                self.replace_workout_plan(current.id, plan)?,
            )),
            None => Ok(Upserted::Inserted(self.insert_workout_plan(user_id, plan)?)),
        }
    }

    pub fn replace_water_entry(&self, id: i64, entry: &NewWaterEntry) -> Result<WaterEntry> {
        let rows = self.conn.execute(
            "UPDATE water_entries SET remote_id = ?1, amount_ml = ?2, timestamp = ?3,
                source = ?4, is_synced = ?5
             WHERE id = ?6",
            params![
                entry.remote_id,
                entry.amount_ml,
                entry.timestamp,
                entry.source,
                entry.is_synced,
                id,
            ],
        )?;
        anyhow::ensure!(rows > 0, "Water entry not found");
        self.get_water_entry(id)
    }

    pub fn replace_weight_entry(&self, id: i64, entry: &NewWeightEntry) -> Result<WeightEntry> {
        let rows = self.conn.execute(
            "UPDATE weight_entries SET remote_id = ?1, weight_kg = ?2, timestamp = ?3,
                notes = ?4, source = ?5, is_synced = ?6
             WHERE id = ?7",
            params![
                entry.remote_id,
                entry.weight_kg,
                entry.timestamp,
                entry.notes,
                entry.source,
                entry.is_synced,
                id,
            ],
        )?;
        anyhow::ensure!(rows > 0, "Weight entry not found");
        self.get_weight_entry(id)
    }
}

fn ensure_exists(conn: &rusqlite::Connection, table: &str, id: i64) -> Result<()> {
    let found: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM {table} WHERE id = ?1"),
        params![id],
        |row| row.get(0),
    )?;
    anyhow::ensure!(found > 0, "no row {id} in {table}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{
        ExtendedNutrition, FoodSource, LogSource, MealCategory, MealTotals, NewExercise,
        NewFoodItem, NewSetLog, WorkoutCategory, WorkoutMetrics,
    };
    use chrono::{TimeZone, Utc};
    use std::collections::BTreeSet;

    fn item(name: &str, calories: f64, protein_g: f64) -> NewFoodItem {
        NewFoodItem {
            remote_id: None,
            name: name.to_string(),
            source: FoodSource::Chat,
            grams: 100.0,
            calories,
            protein_g,
            carbs_g: 0.0,
            fat_g: 0.0,
            extra: ExtendedNutrition::default(),
            barcode: None,
        }
    }

    fn meal(remote_id: Option<&str>, items: Vec<NewFoodItem>) -> NewMeal {
        NewMeal {
            remote_id: remote_id.map(str::to_string),
            name: "Lunch".to_string(),
            category: MealCategory::Lunch,
            timestamp: Utc.with_ymd_and_hms(2026, 3, 14, 12, 0, 0).unwrap(),
            notes: None,
            items,
            reported_totals: None,
            is_synced: false,
        }
    }

    #[test]
    fn test_replace_meal_keeps_identity_and_rebuilds_items() {
        let db = Database::open_in_memory().unwrap();
        let original = db
            .insert_meal("u1", &meal(None, vec![item("Rice", 200.0, 4.0), item("Egg", 70.0, 6.0)]))
            .unwrap();

        let mut incoming = meal(Some("m-1"), vec![item("Chicken", 250.0, 40.0)]);
        incoming.name = "Chicken bowl".to_string();
        incoming.is_synced = true;
        let replaced = db.replace_meal(original.id, &incoming).unwrap();

        assert_eq!(replaced.id, original.id);
        assert_eq!(replaced.uuid, original.uuid);
        assert_eq!(replaced.name, "Chicken bowl");
        assert_eq!(replaced.remote_id.as_deref(), Some("m-1"));
        assert!(replaced.is_synced);
        assert_eq!(replaced.items.len(), 1);
        assert_eq!(replaced.items[0].name, "Chicken");
        assert!((replaced.totals.calories - 250.0).abs() < f64::EPSILON);
        assert!((replaced.totals.protein_g - 40.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_replace_meal_prefers_reported_totals() {
        let db = Database::open_in_memory().unwrap();
        let original = db.insert_meal("u1", &meal(None, vec![])).unwrap();
        let mut incoming = meal(Some("m-2"), vec![item("Toast", 99.6, 3.0)]);
        incoming.reported_totals = Some(MealTotals {
            calories: 100.0,
            protein_g: 3.0,
            carbs_g: 18.0,
            fat_g: 1.0,
            fiber_g: None,
        });
        let replaced = db.replace_meal(original.id, &incoming).unwrap();
        assert!((replaced.totals.calories - 100.0).abs() < f64::EPSILON);
        assert!((replaced.totals.carbs_g - 18.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_replace_missing_meal_fails_without_side_effects() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.replace_meal(42, &meal(Some("m-3"), vec![item("Rice", 1.0, 0.0)])).is_err());
        assert!(db.find_meal_by_remote_id("m-3").unwrap().is_none());
    }

    #[test]
    fn test_upsert_meal_by_remote_id() {
        let db = Database::open_in_memory().unwrap();
        let first = db
            .upsert_meal("u1", &meal(Some("m-1"), vec![item("Rice", 200.0, 4.0)]))
            .unwrap();
        assert!(!first.was_replaced());
        let second = db
            .upsert_meal("u1", &meal(Some("m-1"), vec![item("Rice", 180.0, 4.0)]))
            .unwrap();
        assert!(second.was_replaced());
        let second = second.into_inner();
        assert_eq!(second.id, first.into_inner().id);
        assert_eq!(db.list_recent_meals("u1", 10).unwrap().len(), 1);
        assert!((second.totals.calories - 180.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_upsert_without_remote_id_always_inserts() {
        let db = Database::open_in_memory().unwrap();
        db.upsert_meal("u1", &meal(None, vec![])).unwrap();
        db.upsert_meal("u1", &meal(None, vec![])).unwrap();
        assert_eq!(db.list_recent_meals("u1", 10).unwrap().len(), 2);
    }

    #[test]
    fn test_upsert_workout_log_rebuilds_sets() {
        let db = Database::open_in_memory().unwrap();
        let mut log = NewWorkoutLog {
            remote_id: Some("w-1".to_string()),
            plan_remote_id: Some("p-9".to_string()),
            name: "Push".to_string(),
            category: WorkoutCategory::Strength,
            source: LogSource::Chat,
            start_time: Utc.with_ymd_and_hms(2026, 3, 14, 18, 0, 0).unwrap(),
            end_time: None,
            duration_min: 45,
            metrics: WorkoutMetrics::default(),
            notes: None,
            sets: vec![NewSetLog::numbered("Bench", 1), NewSetLog::numbered("Bench", 2)],
            is_synced: true,
        };
        let first = db.upsert_workout_log("u1", &log).unwrap().into_inner();
        assert_eq!(first.sets.len(), 2);

        log.sets = vec![NewSetLog::numbered("Dips", 1)];
        log.metrics.calories_burned = Some(320);
        let second = db.upsert_workout_log("u1", &log).unwrap().into_inner();
        assert_eq!(second.id, first.id);
        assert_eq!(second.sets.len(), 1);
        assert_eq!(second.sets[0].exercise_name, "Dips");
        assert_eq!(second.metrics.calories_burned, Some(320));
        assert_eq!(second.plan_remote_id.as_deref(), Some("p-9"));
    }

    #[test]
    fn test_upsert_workout_plan_rebuilds_exercises() {
        let db = Database::open_in_memory().unwrap();
        let mut plan = NewWorkoutPlan {
            remote_id: Some("p-1".to_string()),
            name: "Upper".to_string(),
            description: None,
            category: WorkoutCategory::Strength,
            scheduled_days: BTreeSet::from([0, 3]),
            estimated_duration_min: Some(50),
            is_active: true,
            exercises: vec![NewExercise::named("Row"), NewExercise::named("Press")],
            is_synced: true,
        };
        let first = db.upsert_workout_plan("u1", &plan).unwrap().into_inner();
        plan.exercises = vec![NewExercise::named("Pull-up")];
        plan.scheduled_days = BTreeSet::from([1]);
        let second = db.upsert_workout_plan("u1", &plan).unwrap().into_inner();
        assert_eq!(second.id, first.id);
        assert_eq!(second.exercises.len(), 1);
        assert_eq!(second.scheduled_days, BTreeSet::from([1]));
        assert_eq!(db.list_workout_plans("u1").unwrap().len(), 1);
    }

    #[test]
    fn test_replace_water_and_weight() {
        let db = Database::open_in_memory().unwrap();
        let at = Utc.with_ymd_and_hms(2026, 3, 14, 8, 0, 0).unwrap();
        let water = db
            .insert_water_entry(
                "u1",
                &NewWaterEntry {
                    remote_id: None,
                    amount_ml: 250,
                    timestamp: at,
                    source: "manual".to_string(),
                    is_synced: false,
                },
            )
            .unwrap();
        let synced = db
            .replace_water_entry(
                water.id,
                &NewWaterEntry {
                    remote_id: Some("wt-1".to_string()),
                    amount_ml: 250,
                    timestamp: at,
                    source: "manual".to_string(),
                    is_synced: true,
                },
            )
            .unwrap();
        assert!(synced.is_synced);
        assert_eq!(synced.remote_id.as_deref(), Some("wt-1"));

        let missing = db.replace_weight_entry(
            99,
            &NewWeightEntry {
                remote_id: None,
                weight_kg: 80.0,
                timestamp: at,
                notes: None,
                source: "manual".to_string(),
                is_synced: true,
            },
        );
        assert!(missing.is_err());
    }
}
