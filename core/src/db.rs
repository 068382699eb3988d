use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Local, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use uuid::Uuid;

use crate::models::{
    ActivityLevel, ExtendedNutrition, Exercise, FoodItem, FoodSource, GoalType, LogSource,
    MacroOverrides, MacroPlan, MacroSplit, MacroTargets, Meal, MealCategory, MealTotals,
    NewExercise, NewFoodItem, NewMeal, NewSetLog, NewWaterEntry, NewWeightEntry, NewWorkoutLog,
    NewWorkoutPlan, SetLog, Sex, TargetSource, UserProfile, WaterEntry, WeightEntry,
    WorkoutCategory, WorkoutLog, WorkoutMetrics, WorkoutPlan, normalize_schedule,
};

pub struct Database {
    pub(crate) conn: Connection,
}

const MEAL_COLUMNS: &str = "id, uuid, remote_id, user_id, name, category, timestamp, notes,
    total_calories, total_protein_g, total_carbs_g, total_fat_g, total_fiber_g,
    is_synced, created_at, updated_at";

const FOOD_ITEM_COLUMNS: &str = "id, meal_id, remote_id, position, name, source, grams,
    calories, protein_g, carbs_g, fat_g, fiber_g, sodium_mg, sugar_g, saturated_fat_g, barcode";

const WORKOUT_LOG_COLUMNS: &str = "id, uuid, remote_id, user_id, plan_remote_id, name, category,
    source, start_time, end_time, duration_min, calories_burned, avg_heart_rate,
    max_heart_rate, distance_km, notes, is_synced, created_at, updated_at";

const SET_LOG_COLUMNS: &str = "id, log_id, remote_id, position, exercise_name, set_number, reps,
    weight_kg, duration_sec, distance_m, completed, is_warmup, rpe, notes";

const PLAN_COLUMNS: &str = "id, uuid, remote_id, user_id, name, description, category,
    scheduled_days, estimated_duration_min, is_active, is_synced, created_at, updated_at";

const EXERCISE_COLUMNS: &str = "id, plan_id, remote_id, position, name, muscle_group, sets,
    reps_min, reps_max, duration_sec, rest_sec, notes";

const PROFILE_COLUMNS: &str = "user_id, sex, birth_date, height_cm, current_weight_kg,
    activity_level, goal_type, goal_rate_kg_per_week, target_weight_kg, macro_plan,
    custom_protein_pct, custom_carbs_pct, custom_fat_pct, override_calories,
    override_protein_g, override_carbs_g, override_fat_g";

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    #[allow(clippy::too_many_lines)]
    fn migrate(&self) -> Result<()> {
        self.conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        let version: i64 = self
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))?;

        if version < 1 {
            self.conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS settings (
                    key TEXT PRIMARY KEY,
                    value TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS user_profiles (
                    user_id TEXT PRIMARY KEY,
                    sex TEXT,
                    birth_date TEXT,
                    height_cm REAL,
                    current_weight_kg REAL,
                    activity_level TEXT NOT NULL DEFAULT 'moderate',
                    goal_type TEXT NOT NULL DEFAULT 'maintain',
                    goal_rate_kg_per_week REAL NOT NULL DEFAULT 0,
                    target_weight_kg REAL,
                    macro_plan TEXT NOT NULL DEFAULT 'balanced',
                    custom_protein_pct REAL,
                    custom_carbs_pct REAL,
                    custom_fat_pct REAL,
                    override_calories INTEGER,
                    override_protein_g REAL,
                    override_carbs_g REAL,
                    override_fat_g REAL,
                    updated_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS macro_targets (
                    user_id TEXT PRIMARY KEY,
                    calories INTEGER NOT NULL,
                    protein_g REAL NOT NULL,
                    carbs_g REAL NOT NULL,
                    fat_g REAL NOT NULL,
                    fiber_g REAL,
                    bmr INTEGER,
                    tdee INTEGER,
                    source TEXT NOT NULL,
                    calculated_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS meals (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    uuid TEXT NOT NULL UNIQUE,
                    remote_id TEXT UNIQUE,
                    user_id TEXT NOT NULL,
                    name TEXT NOT NULL,
                    category TEXT NOT NULL,
                    timestamp TEXT NOT NULL,
                    notes TEXT,
                    total_calories REAL NOT NULL DEFAULT 0,
                    total_protein_g REAL NOT NULL DEFAULT 0,
                    total_carbs_g REAL NOT NULL DEFAULT 0,
                    total_fat_g REAL NOT NULL DEFAULT 0,
                    total_fiber_g REAL,
                    is_synced INTEGER NOT NULL DEFAULT 0,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS food_items (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    meal_id INTEGER NOT NULL REFERENCES meals(id) ON DELETE CASCADE,
                    remote_id TEXT,
                    position INTEGER NOT NULL,
                    name TEXT NOT NULL,
                    source TEXT NOT NULL,
                    grams REAL NOT NULL,
                    calories REAL NOT NULL,
                    protein_g REAL NOT NULL,
                    carbs_g REAL NOT NULL,
                    fat_g REAL NOT NULL,
                    fiber_g REAL,
                    sodium_mg REAL,
                    sugar_g REAL,
                    saturated_fat_g REAL,
                    barcode TEXT
                );

                CREATE TABLE IF NOT EXISTS workout_plans (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    uuid TEXT NOT NULL UNIQUE,
                    remote_id TEXT UNIQUE,
                    user_id TEXT NOT NULL,
                    name TEXT NOT NULL,
                    description TEXT,
                    category TEXT NOT NULL,
                    scheduled_days TEXT NOT NULL DEFAULT '[]',
                    estimated_duration_min INTEGER,
                    is_active INTEGER NOT NULL DEFAULT 1,
                    is_synced INTEGER NOT NULL DEFAULT 0,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS plan_exercises (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    plan_id INTEGER NOT NULL REFERENCES workout_plans(id) ON DELETE CASCADE,
                    remote_id TEXT,
                    position INTEGER NOT NULL,
                    name TEXT NOT NULL,
                    muscle_group TEXT,
                    sets INTEGER NOT NULL DEFAULT 3,
                    reps_min INTEGER,
                    reps_max INTEGER,
                    duration_sec INTEGER,
                    rest_sec INTEGER NOT NULL DEFAULT 60,
                    notes TEXT
                );

                CREATE TABLE IF NOT EXISTS workout_logs (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    uuid TEXT NOT NULL UNIQUE,
                    remote_id TEXT UNIQUE,
                    user_id TEXT NOT NULL,
                    plan_remote_id TEXT,
                    name TEXT NOT NULL,
                    category TEXT NOT NULL,
                    source TEXT NOT NULL,
                    start_time TEXT NOT NULL,
                    end_time TEXT,
                    duration_min INTEGER NOT NULL,
                    calories_burned INTEGER,
                    avg_heart_rate INTEGER,
                    max_heart_rate INTEGER,
                    distance_km REAL,
                    notes TEXT,
                    is_synced INTEGER NOT NULL DEFAULT 0,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS set_logs (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    log_id INTEGER NOT NULL REFERENCES workout_logs(id) ON DELETE CASCADE,
                    remote_id TEXT,
                    position INTEGER NOT NULL,
                    exercise_name TEXT NOT NULL,
                    set_number INTEGER NOT NULL,
                    reps INTEGER,
                    weight_kg REAL,
                    duration_sec INTEGER,
                    distance_m REAL,
                    completed INTEGER NOT NULL DEFAULT 1,
                    is_warmup INTEGER NOT NULL DEFAULT 0,
                    rpe INTEGER,
                    notes TEXT
                );

                CREATE TABLE IF NOT EXISTS water_entries (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    uuid TEXT NOT NULL UNIQUE,
                    remote_id TEXT,
                    user_id TEXT NOT NULL,
                    amount_ml INTEGER NOT NULL,
                    timestamp TEXT NOT NULL,
                    source TEXT NOT NULL,
                    is_synced INTEGER NOT NULL DEFAULT 0,
                    created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS weight_entries (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    uuid TEXT NOT NULL UNIQUE,
                    remote_id TEXT,
                    user_id TEXT NOT NULL,
                    weight_kg REAL NOT NULL,
                    timestamp TEXT NOT NULL,
                    notes TEXT,
                    source TEXT NOT NULL,
                    is_synced INTEGER NOT NULL DEFAULT 0,
                    created_at TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_meals_user_time ON meals(user_id, timestamp);
                CREATE INDEX IF NOT EXISTS idx_food_items_meal ON food_items(meal_id);
                CREATE INDEX IF NOT EXISTS idx_workout_logs_user_time ON workout_logs(user_id, start_time);
                CREATE INDEX IF NOT EXISTS idx_set_logs_log ON set_logs(log_id);
                CREATE INDEX IF NOT EXISTS idx_plan_exercises_plan ON plan_exercises(plan_id);
                CREATE INDEX IF NOT EXISTS idx_water_user_time ON water_entries(user_id, timestamp);
                CREATE INDEX IF NOT EXISTS idx_weight_user_time ON weight_entries(user_id, timestamp);

                PRAGMA user_version = 1;",
            )?;
        }

        Ok(())
    }

    // --- Row mapping helpers ---

    fn meal_from_row(row: &rusqlite::Row) -> rusqlite::Result<Meal> {
        Ok(Meal {
            id: row.get(0)?,
            uuid: row.get(1)?,
            remote_id: row.get(2)?,
            user_id: row.get(3)?,
            name: row.get(4)?,
            category: row
                .get::<_, String>(5)
                .map(|c| MealCategory::parse(&c).unwrap_or(MealCategory::Other))?,
            timestamp: row.get(6)?,
            notes: row.get(7)?,
            totals: MealTotals {
                calories: row.get(8)?,
                protein_g: row.get(9)?,
                carbs_g: row.get(10)?,
                fat_g: row.get(11)?,
                fiber_g: row.get(12)?,
            },
            is_synced: row.get(13)?,
            items: Vec::new(),
            created_at: row.get(14)?,
            updated_at: row.get(15)?,
        })
    }

    fn food_item_from_row(row: &rusqlite::Row) -> rusqlite::Result<FoodItem> {
        Ok(FoodItem {
            id: row.get(0)?,
            meal_id: row.get(1)?,
            remote_id: row.get(2)?,
            position: row.get(3)?,
            name: row.get(4)?,
            source: row
                .get::<_, String>(5)
                .map(|s| FoodSource::parse(&s).unwrap_or(FoodSource::Manual))?,
            grams: row.get(6)?,
            calories: row.get(7)?,
            protein_g: row.get(8)?,
            carbs_g: row.get(9)?,
            fat_g: row.get(10)?,
            extra: ExtendedNutrition {
                fiber_g: row.get(11)?,
                sodium_mg: row.get(12)?,
                sugar_g: row.get(13)?,
                saturated_fat_g: row.get(14)?,
            },
            barcode: row.get(15)?,
        })
    }

    fn workout_log_from_row(row: &rusqlite::Row) -> rusqlite::Result<WorkoutLog> {
        Ok(WorkoutLog {
            id: row.get(0)?,
            uuid: row.get(1)?,
            remote_id: row.get(2)?,
            user_id: row.get(3)?,
            plan_remote_id: row.get(4)?,
            name: row.get(5)?,
            category: row
                .get::<_, String>(6)
                .map(|c| WorkoutCategory::parse(&c).unwrap_or(WorkoutCategory::Other))?,
            source: row
                .get::<_, String>(7)
                .map(|s| LogSource::parse(&s).unwrap_or(LogSource::Manual))?,
            start_time: row.get(8)?,
            end_time: row.get(9)?,
            duration_min: row.get(10)?,
            metrics: WorkoutMetrics {
                calories_burned: row.get(11)?,
                avg_heart_rate: row.get(12)?,
                max_heart_rate: row.get(13)?,
                distance_km: row.get(14)?,
            },
            notes: row.get(15)?,
            is_synced: row.get(16)?,
            sets: Vec::new(),
            created_at: row.get(17)?,
            updated_at: row.get(18)?,
        })
    }

    fn set_log_from_row(row: &rusqlite::Row) -> rusqlite::Result<SetLog> {
        Ok(SetLog {
            id: row.get(0)?,
            log_id: row.get(1)?,
            remote_id: row.get(2)?,
            position: row.get(3)?,
            exercise_name: row.get(4)?,
            set_number: row.get(5)?,
            reps: row.get(6)?,
            weight_kg: row.get(7)?,
            duration_sec: row.get(8)?,
            distance_m: row.get(9)?,
            completed: row.get(10)?,
            is_warmup: row.get(11)?,
            rpe: row.get(12)?,
            notes: row.get(13)?,
        })
    }

    fn plan_from_row(row: &rusqlite::Row) -> rusqlite::Result<WorkoutPlan> {
        let days: String = row.get(7)?;
        let days: Vec<i64> = serde_json::from_str(&days).unwrap_or_default();
        Ok(WorkoutPlan {
            id: row.get(0)?,
            uuid: row.get(1)?,
            remote_id: row.get(2)?,
            user_id: row.get(3)?,
            name: row.get(4)?,
            description: row.get(5)?,
            category: row
                .get::<_, String>(6)
                .map(|c| WorkoutCategory::parse(&c).unwrap_or(WorkoutCategory::Other))?,
            scheduled_days: normalize_schedule(days),
            estimated_duration_min: row.get(8)?,
            is_active: row.get(9)?,
            is_synced: row.get(10)?,
            exercises: Vec::new(),
            created_at: row.get(11)?,
            updated_at: row.get(12)?,
        })
    }

    fn exercise_from_row(row: &rusqlite::Row) -> rusqlite::Result<Exercise> {
        Ok(Exercise {
            id: row.get(0)?,
            plan_id: row.get(1)?,
            remote_id: row.get(2)?,
            position: row.get(3)?,
            name: row.get(4)?,
            muscle_group: row.get(5)?,
            sets: row.get(6)?,
            reps_min: row.get(7)?,
            reps_max: row.get(8)?,
            duration_sec: row.get(9)?,
            rest_sec: row.get(10)?,
            notes: row.get(11)?,
        })
    }

    fn water_from_row(row: &rusqlite::Row) -> rusqlite::Result<WaterEntry> {
        Ok(WaterEntry {
            id: row.get(0)?,
            uuid: row.get(1)?,
            remote_id: row.get(2)?,
            user_id: row.get(3)?,
            amount_ml: row.get(4)?,
            timestamp: row.get(5)?,
            source: row.get(6)?,
            is_synced: row.get(7)?,
        })
    }

    fn weight_from_row(row: &rusqlite::Row) -> rusqlite::Result<WeightEntry> {
        Ok(WeightEntry {
            id: row.get(0)?,
            uuid: row.get(1)?,
            remote_id: row.get(2)?,
            user_id: row.get(3)?,
            weight_kg: row.get(4)?,
            timestamp: row.get(5)?,
            notes: row.get(6)?,
            source: row.get(7)?,
            is_synced: row.get(8)?,
        })
    }

    fn profile_from_row(row: &rusqlite::Row) -> rusqlite::Result<UserProfile> {
        let sex: Option<String> = row.get(1)?;
        let activity: String = row.get(5)?;
        let goal: String = row.get(6)?;
        let plan: String = row.get(9)?;
        let custom: (Option<f64>, Option<f64>, Option<f64>) =
            (row.get(10)?, row.get(11)?, row.get(12)?);
        Ok(UserProfile {
            user_id: row.get(0)?,
            sex: sex.as_deref().and_then(Sex::parse),
            birth_date: row.get(2)?,
            height_cm: row.get(3)?,
            current_weight_kg: row.get(4)?,
            activity_level: ActivityLevel::parse(&activity).unwrap_or(ActivityLevel::Moderate),
            goal_type: GoalType::parse(&goal).unwrap_or(GoalType::Maintain),
            goal_rate_kg_per_week: row.get(7)?,
            target_weight_kg: row.get(8)?,
            macro_plan: MacroPlan::parse(&plan).unwrap_or(MacroPlan::Balanced),
            custom_split: match custom {
                (Some(p), Some(c), Some(f)) => Some(MacroSplit::new(p, c, f)),
                _ => None,
            },
            overrides: MacroOverrides {
                calories: row.get(13)?,
                protein_g: row.get(14)?,
                carbs_g: row.get(15)?,
                fat_g: row.get(16)?,
            },
        })
    }

    fn targets_from_row(row: &rusqlite::Row) -> rusqlite::Result<MacroTargets> {
        let source: String = row.get(8)?;
        Ok(MacroTargets {
            user_id: row.get(0)?,
            calories: row.get(1)?,
            protein_g: row.get(2)?,
            carbs_g: row.get(3)?,
            fat_g: row.get(4)?,
            fiber_g: row.get(5)?,
            bmr: row.get(6)?,
            tdee: row.get(7)?,
            source: TargetSource::parse(&source).unwrap_or(TargetSource::Local),
            calculated_at: row.get(9)?,
        })
    }

    // --- Settings ---

    pub fn get_setting(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row(
                "SELECT value FROM settings WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    pub fn set_setting(&self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT INTO settings (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    pub fn get_or_create_user_id(&self) -> Result<String> {
        if let Some(user_id) = self.get_setting("user_id")? {
            return Ok(user_id);
        }
        let user_id = Uuid::new_v4().to_string();
        self.set_setting("user_id", &user_id)?;
        Ok(user_id)
    }

    // --- Profile ---

    pub fn get_profile(&self, user_id: &str) -> Result<Option<UserProfile>> {
        let profile = self
            .conn
            .query_row(
                &format!("SELECT {PROFILE_COLUMNS} FROM user_profiles WHERE user_id = ?1"),
                params![user_id],
                Self::profile_from_row,
            )
            .optional()?;
        Ok(profile)
    }

    pub fn get_or_create_profile(&self, user_id: &str) -> Result<UserProfile> {
        if let Some(profile) = self.get_profile(user_id)? {
            return Ok(profile);
        }
        let profile = UserProfile::new(user_id);
        self.save_profile(&profile)?;
        Ok(profile)
    }

    /// Insert or fully overwrite the single profile row for `profile.user_id`.
    pub fn save_profile(&self, profile: &UserProfile) -> Result<()> {
        let now = Local::now().to_rfc3339();
        let custom = profile.custom_split;
        self.conn.execute(
            "INSERT INTO user_profiles (user_id, sex, birth_date, height_cm, current_weight_kg,
                activity_level, goal_type, goal_rate_kg_per_week, target_weight_kg, macro_plan,
                custom_protein_pct, custom_carbs_pct, custom_fat_pct, override_calories,
                override_protein_g, override_carbs_g, override_fat_g, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)
             ON CONFLICT(user_id) DO UPDATE SET
                sex = excluded.sex,
                birth_date = excluded.birth_date,
                height_cm = excluded.height_cm,
                current_weight_kg = excluded.current_weight_kg,
                activity_level = excluded.activity_level,
                goal_type = excluded.goal_type,
                goal_rate_kg_per_week = excluded.goal_rate_kg_per_week,
                target_weight_kg = excluded.target_weight_kg,
                macro_plan = excluded.macro_plan,
                custom_protein_pct = excluded.custom_protein_pct,
                custom_carbs_pct = excluded.custom_carbs_pct,
                custom_fat_pct = excluded.custom_fat_pct,
                override_calories = excluded.override_calories,
                override_protein_g = excluded.override_protein_g,
                override_carbs_g = excluded.override_carbs_g,
                override_fat_g = excluded.override_fat_g,
                updated_at = excluded.updated_at",
            params![
                profile.user_id,
                profile.sex.map(Sex::as_str),
                profile.birth_date,
                profile.height_cm,
                profile.current_weight_kg,
                profile.activity_level.as_str(),
                profile.goal_type.as_str(),
                profile.goal_rate_kg_per_week,
                profile.target_weight_kg,
                profile.macro_plan.as_str(),
                custom.map(|s| s.protein_pct),
                custom.map(|s| s.carbs_pct),
                custom.map(|s| s.fat_pct),
                profile.overrides.calories,
                profile.overrides.protein_g,
                profile.overrides.carbs_g,
                profile.overrides.fat_g,
                now,
            ],
        )?;
        Ok(())
    }

    // --- Macro targets ---

    pub fn get_macro_targets(&self, user_id: &str) -> Result<Option<MacroTargets>> {
        let targets = self
            .conn
            .query_row(
                "SELECT user_id, calories, protein_g, carbs_g, fat_g, fiber_g, bmr, tdee, source, calculated_at
                 FROM macro_targets WHERE user_id = ?1",
                params![user_id],
                Self::targets_from_row,
            )
            .optional()?;
        Ok(targets)
    }

    /// Update the user's targets row, creating it if this is the first one.
    pub fn upsert_macro_targets(&self, targets: &MacroTargets) -> Result<()> {
        self.conn.execute(
            "INSERT INTO macro_targets (user_id, calories, protein_g, carbs_g, fat_g, fiber_g, bmr, tdee, source, calculated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
             ON CONFLICT(user_id) DO UPDATE SET
                calories = excluded.calories,
                protein_g = excluded.protein_g,
                carbs_g = excluded.carbs_g,
                fat_g = excluded.fat_g,
                fiber_g = excluded.fiber_g,
                bmr = excluded.bmr,
                tdee = excluded.tdee,
                source = excluded.source,
                calculated_at = excluded.calculated_at",
            params![
                targets.user_id,
                targets.calories,
                targets.protein_g,
                targets.carbs_g,
                targets.fat_g,
                targets.fiber_g,
                targets.bmr,
                targets.tdee,
                targets.source.as_str(),
                targets.calculated_at,
            ],
        )?;
        Ok(())
    }

    // --- Meals ---

    pub fn insert_meal(&self, user_id: &str, meal: &NewMeal) -> Result<Meal> {
        let tx = self.conn.unchecked_transaction()?;
        let now = Local::now().to_rfc3339();
        tx.execute(
            "INSERT INTO meals (uuid, user_id, name, category, timestamp, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
            params![
                Uuid::new_v4().to_string(),
                user_id,
                meal.name,
                meal.category.as_str(),
                meal.timestamp,
                now,
            ],
        )?;
        let id = tx.last_insert_rowid();
        write_meal(&tx, id, meal)?;
        tx.commit()?;
        self.get_meal(id)
    }

    pub fn get_meal(&self, id: i64) -> Result<Meal> {
        let meal = self
            .conn
            .query_row(
                &format!("SELECT {MEAL_COLUMNS} FROM meals WHERE id = ?1"),
                params![id],
                Self::meal_from_row,
            )
            .context("Meal not found")?;
        self.with_food_items(meal)
    }

    pub fn find_meal_by_remote_id(&self, remote_id: &str) -> Result<Option<Meal>> {
        let meal = self
            .conn
            .query_row(
                &format!("SELECT {MEAL_COLUMNS} FROM meals WHERE remote_id = ?1"),
                params![remote_id],
                Self::meal_from_row,
            )
            .optional()?;
        meal.map(|m| self.with_food_items(m)).transpose()
    }

    pub fn list_meals_between(
        &self,
        user_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Meal>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {MEAL_COLUMNS} FROM meals
             WHERE user_id = ?1 AND timestamp >= ?2 AND timestamp < ?3
             ORDER BY timestamp, id"
        ))?;
        let meals = stmt
            .query_map(params![user_id, start, end], Self::meal_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        meals.into_iter().map(|m| self.with_food_items(m)).collect()
    }

    pub fn list_recent_meals(&self, user_id: &str, limit: usize) -> Result<Vec<Meal>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {MEAL_COLUMNS} FROM meals WHERE user_id = ?1
             ORDER BY timestamp DESC, id DESC LIMIT ?2"
        ))?;
        let meals = stmt
            .query_map(params![user_id, limit as i64], Self::meal_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        meals.into_iter().map(|m| self.with_food_items(m)).collect()
    }

    pub fn list_unsynced_meals(&self, user_id: &str) -> Result<Vec<Meal>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {MEAL_COLUMNS} FROM meals WHERE user_id = ?1 AND is_synced = 0 ORDER BY id"
        ))?;
        let meals = stmt
            .query_map(params![user_id], Self::meal_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        meals.into_iter().map(|m| self.with_food_items(m)).collect()
    }

    pub fn delete_meal(&self, id: i64) -> Result<bool> {
        self.conn
            .execute("DELETE FROM food_items WHERE meal_id = ?1", params![id])?;
        let rows = self
            .conn
            .execute("DELETE FROM meals WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    fn with_food_items(&self, mut meal: Meal) -> Result<Meal> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {FOOD_ITEM_COLUMNS} FROM food_items WHERE meal_id = ?1 ORDER BY position"
        ))?;
        meal.items = stmt
            .query_map(params![meal.id], Self::food_item_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(meal)
    }

    // --- Workout logs ---

    pub fn insert_workout_log(&self, user_id: &str, log: &NewWorkoutLog) -> Result<WorkoutLog> {
        let tx = self.conn.unchecked_transaction()?;
        let now = Local::now().to_rfc3339();
        tx.execute(
            "INSERT INTO workout_logs (uuid, user_id, name, category, source, start_time, duration_min, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
            params![
                Uuid::new_v4().to_string(),
                user_id,
                log.name,
                log.category.as_str(),
                log.source.as_str(),
                log.start_time,
                log.duration_min,
                now,
            ],
        )?;
        let id = tx.last_insert_rowid();
        write_workout_log(&tx, id, log)?;
        tx.commit()?;
        self.get_workout_log(id)
    }

    pub fn get_workout_log(&self, id: i64) -> Result<WorkoutLog> {
        let log = self
            .conn
            .query_row(
                &format!("SELECT {WORKOUT_LOG_COLUMNS} FROM workout_logs WHERE id = ?1"),
                params![id],
                Self::workout_log_from_row,
            )
            .context("Workout log not found")?;
        self.with_set_logs(log)
    }

    pub fn find_workout_log_by_remote_id(&self, remote_id: &str) -> Result<Option<WorkoutLog>> {
        let log = self
            .conn
            .query_row(
                &format!("SELECT {WORKOUT_LOG_COLUMNS} FROM workout_logs WHERE remote_id = ?1"),
                params![remote_id],
                Self::workout_log_from_row,
            )
            .optional()?;
        log.map(|l| self.with_set_logs(l)).transpose()
    }

    pub fn list_workout_logs(&self, user_id: &str, limit: usize) -> Result<Vec<WorkoutLog>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {WORKOUT_LOG_COLUMNS} FROM workout_logs WHERE user_id = ?1
             ORDER BY start_time DESC, id DESC LIMIT ?2"
        ))?;
        let logs = stmt
            .query_map(params![user_id, limit as i64], Self::workout_log_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        logs.into_iter().map(|l| self.with_set_logs(l)).collect()
    }

    pub fn list_unsynced_workout_logs(&self, user_id: &str) -> Result<Vec<WorkoutLog>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {WORKOUT_LOG_COLUMNS} FROM workout_logs WHERE user_id = ?1 AND is_synced = 0 ORDER BY id"
        ))?;
        let logs = stmt
            .query_map(params![user_id], Self::workout_log_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        logs.into_iter().map(|l| self.with_set_logs(l)).collect()
    }

    pub fn delete_workout_log(&self, id: i64) -> Result<bool> {
        self.conn
            .execute("DELETE FROM set_logs WHERE log_id = ?1", params![id])?;
        let rows = self
            .conn
            .execute("DELETE FROM workout_logs WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    fn with_set_logs(&self, mut log: WorkoutLog) -> Result<WorkoutLog> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {SET_LOG_COLUMNS} FROM set_logs WHERE log_id = ?1 ORDER BY position"
        ))?;
        log.sets = stmt
            .query_map(params![log.id], Self::set_log_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(log)
    }

    // --- Workout plans ---

    pub fn insert_workout_plan(&self, user_id: &str, plan: &NewWorkoutPlan) -> Result<WorkoutPlan> {
        let tx = self.conn.unchecked_transaction()?;
        let now = Local::now().to_rfc3339();
        tx.execute(
            "INSERT INTO workout_plans (uuid, user_id, name, category, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
            params![
                Uuid::new_v4().to_string(),
                user_id,
                plan.name,
                plan.category.as_str(),
                now,
            ],
        )?;
        let id = tx.last_insert_rowid();
        write_workout_plan(&tx, id, plan)?;
        tx.commit()?;
        self.get_workout_plan(id)
    }

    pub fn get_workout_plan(&self, id: i64) -> Result<WorkoutPlan> {
        let plan = self
            .conn
            .query_row(
                &format!("SELECT {PLAN_COLUMNS} FROM workout_plans WHERE id = ?1"),
                params![id],
                Self::plan_from_row,
            )
            .context("Workout plan not found")?;
        self.with_exercises(plan)
    }

    pub fn find_workout_plan_by_remote_id(&self, remote_id: &str) -> Result<Option<WorkoutPlan>> {
        let plan = self
            .conn
            .query_row(
                &format!("SELECT {PLAN_COLUMNS} FROM workout_plans WHERE remote_id = ?1"),
                params![remote_id],
                Self::plan_from_row,
            )
            .optional()?;
        plan.map(|p| self.with_exercises(p)).transpose()
    }

    pub fn list_workout_plans(&self, user_id: &str) -> Result<Vec<WorkoutPlan>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {PLAN_COLUMNS} FROM workout_plans WHERE user_id = ?1
             ORDER BY is_active DESC, name"
        ))?;
        let plans = stmt
            .query_map(params![user_id], Self::plan_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        plans.into_iter().map(|p| self.with_exercises(p)).collect()
    }

    pub fn delete_workout_plan(&self, id: i64) -> Result<bool> {
        self.conn
            .execute("DELETE FROM plan_exercises WHERE plan_id = ?1", params![id])?;
        let rows = self
            .conn
            .execute("DELETE FROM workout_plans WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    fn with_exercises(&self, mut plan: WorkoutPlan) -> Result<WorkoutPlan> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {EXERCISE_COLUMNS} FROM plan_exercises WHERE plan_id = ?1 ORDER BY position"
        ))?;
        plan.exercises = stmt
            .query_map(params![plan.id], Self::exercise_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(plan)
    }

    // --- Water ---

    pub fn insert_water_entry(&self, user_id: &str, entry: &NewWaterEntry) -> Result<WaterEntry> {
        let now = Local::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO water_entries (uuid, remote_id, user_id, amount_ml, timestamp, source, is_synced, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                Uuid::new_v4().to_string(),
                entry.remote_id,
                user_id,
                entry.amount_ml,
                entry.timestamp,
                entry.source,
                entry.is_synced,
                now,
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        self.get_water_entry(id)
    }

    pub fn get_water_entry(&self, id: i64) -> Result<WaterEntry> {
        self.conn
            .query_row(
                "SELECT id, uuid, remote_id, user_id, amount_ml, timestamp, source, is_synced
                 FROM water_entries WHERE id = ?1",
                params![id],
                Self::water_from_row,
            )
            .context("Water entry not found")
    }

    pub fn list_water_entries_between(
        &self,
        user_id: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<WaterEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, uuid, remote_id, user_id, amount_ml, timestamp, source, is_synced
             FROM water_entries WHERE user_id = ?1 AND timestamp >= ?2 AND timestamp < ?3
             ORDER BY timestamp, id",
        )?;
        let entries = stmt
            .query_map(params![user_id, start, end], Self::water_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    pub fn list_unsynced_water_entries(&self, user_id: &str) -> Result<Vec<WaterEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, uuid, remote_id, user_id, amount_ml, timestamp, source, is_synced
             FROM water_entries WHERE user_id = ?1 AND is_synced = 0 ORDER BY id",
        )?;
        let entries = stmt
            .query_map(params![user_id], Self::water_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    // --- Weight ---

    pub fn insert_weight_entry(&self, user_id: &str, entry: &NewWeightEntry) -> Result<WeightEntry> {
        let now = Local::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO weight_entries (uuid, remote_id, user_id, weight_kg, timestamp, notes, source, is_synced, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                Uuid::new_v4().to_string(),
                entry.remote_id,
                user_id,
                entry.weight_kg,
                entry.timestamp,
                entry.notes,
                entry.source,
                entry.is_synced,
                now,
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        self.get_weight_entry(id)
    }

    pub fn get_weight_entry(&self, id: i64) -> Result<WeightEntry> {
        self.conn
            .query_row(
                "SELECT id, uuid, remote_id, user_id, weight_kg, timestamp, notes, source, is_synced
                 FROM weight_entries WHERE id = ?1",
                params![id],
                Self::weight_from_row,
            )
            .context("Weight entry not found")
    }

    pub fn list_weight_entries(&self, user_id: &str, limit: usize) -> Result<Vec<WeightEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, uuid, remote_id, user_id, weight_kg, timestamp, notes, source, is_synced
             FROM weight_entries WHERE user_id = ?1 ORDER BY timestamp DESC, id DESC LIMIT ?2",
        )?;
        let entries = stmt
            .query_map(params![user_id, limit as i64], Self::weight_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    pub fn list_unsynced_weight_entries(&self, user_id: &str) -> Result<Vec<WeightEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, uuid, remote_id, user_id, weight_kg, timestamp, notes, source, is_synced
             FROM weight_entries WHERE user_id = ?1 AND is_synced = 0 ORDER BY id",
        )?;
        let entries = stmt
            .query_map(params![user_id], Self::weight_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }
}

// --- Aggregate writers ---
//
// These take a bare `Connection` so that both fresh inserts and merge
// replacements can run them inside the same transaction.

/// Overwrite every root column of meal `id` and rebuild its items and totals.
pub(crate) fn write_meal(conn: &Connection, id: i64, meal: &NewMeal) -> Result<()> {
    conn.execute(
        "UPDATE meals SET remote_id = ?1, name = ?2, category = ?3, timestamp = ?4, notes = ?5,
            is_synced = ?6, updated_at = ?7
         WHERE id = ?8",
        params![
            meal.remote_id,
            meal.name,
            meal.category.as_str(),
            meal.timestamp,
            meal.notes,
            meal.is_synced,
            Local::now().to_rfc3339(),
            id,
        ],
    )?;
    conn.execute("DELETE FROM food_items WHERE meal_id = ?1", params![id])?;
    insert_food_items(conn, id, &meal.items)?;
    let computed = recompute_meal_totals(conn, id)?;
    if let Some(reported) = &meal.reported_totals {
        let authoritative = MealTotals {
            fiber_g: reported.fiber_g.or(computed.fiber_g),
            ..*reported
        };
        overwrite_meal_totals(conn, id, &authoritative)?;
    }
    Ok(())
}

fn insert_food_items(conn: &Connection, meal_id: i64, items: &[NewFoodItem]) -> Result<()> {
    let mut stmt = conn.prepare(
        "INSERT INTO food_items (meal_id, remote_id, position, name, source, grams, calories,
            protein_g, carbs_g, fat_g, fiber_g, sodium_mg, sugar_g, saturated_fat_g, barcode)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
    )?;
    for (position, item) in items.iter().enumerate() {
        stmt.execute(params![
            meal_id,
            item.remote_id,
            position as i64,
            item.name,
            item.source.as_str(),
            item.grams,
            item.calories,
            item.protein_g,
            item.carbs_g,
            item.fat_g,
            item.extra.fiber_g,
            item.extra.sodium_mg,
            item.extra.sugar_g,
            item.extra.saturated_fat_g,
            item.barcode,
        ])?;
    }
    Ok(())
}

/// Set the cached totals of a meal to the sum over its stored items.
pub(crate) fn recompute_meal_totals(conn: &Connection, meal_id: i64) -> Result<MealTotals> {
    let totals = conn.query_row(
        "SELECT COALESCE(SUM(calories), 0), COALESCE(SUM(protein_g), 0),
                COALESCE(SUM(carbs_g), 0), COALESCE(SUM(fat_g), 0), SUM(fiber_g)
         FROM food_items WHERE meal_id = ?1",
        params![meal_id],
        |row| {
            Ok(MealTotals {
                calories: row.get(0)?,
                protein_g: row.get(1)?,
                carbs_g: row.get(2)?,
                fat_g: row.get(3)?,
                fiber_g: row.get(4)?,
            })
        },
    )?;
    overwrite_meal_totals(conn, meal_id, &totals)?;
    Ok(totals)
}

fn overwrite_meal_totals(conn: &Connection, meal_id: i64, totals: &MealTotals) -> Result<()> {
    conn.execute(
        "UPDATE meals SET total_calories = ?1, total_protein_g = ?2, total_carbs_g = ?3,
            total_fat_g = ?4, total_fiber_g = ?5
         WHERE id = ?6",
        params![
            totals.calories,
            totals.protein_g,
            totals.carbs_g,
            totals.fat_g,
            totals.fiber_g,
            meal_id,
        ],
    )?;
    Ok(())
}

/// Overwrite every root column of workout log `id` and rebuild its sets.
pub(crate) fn write_workout_log(conn: &Connection, id: i64, log: &NewWorkoutLog) -> Result<()> {
    conn.execute(
        "UPDATE workout_logs SET remote_id = ?1, plan_remote_id = ?2, name = ?3, category = ?4,
            source = ?5, start_time = ?6, end_time = ?7, duration_min = ?8,
            calories_burned = ?9, avg_heart_rate = ?10, max_heart_rate = ?11, distance_km = ?12,
            notes = ?13, is_synced = ?14, updated_at = ?15
         WHERE id = ?16",
        params![
            log.remote_id,
            log.plan_remote_id,
            log.name,
            log.category.as_str(),
            log.source.as_str(),
            log.start_time,
            log.end_time,
            log.duration_min,
            log.metrics.calories_burned,
            log.metrics.avg_heart_rate,
            log.metrics.max_heart_rate,
            log.metrics.distance_km,
            log.notes,
            log.is_synced,
            Local::now().to_rfc3339(),
            id,
        ],
    )?;
    conn.execute("DELETE FROM set_logs WHERE log_id = ?1", params![id])?;
    insert_set_logs(conn, id, &log.sets)
}

fn insert_set_logs(conn: &Connection, log_id: i64, sets: &[NewSetLog]) -> Result<()> {
    let mut stmt = conn.prepare(
        "INSERT INTO set_logs (log_id, remote_id, position, exercise_name, set_number, reps,
            weight_kg, duration_sec, distance_m, completed, is_warmup, rpe, notes)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
    )?;
    for (position, set) in sets.iter().enumerate() {
        stmt.execute(params![
            log_id,
            set.remote_id,
            position as i64,
            set.exercise_name,
            set.set_number,
            set.reps,
            set.weight_kg,
            set.duration_sec,
            set.distance_m,
            set.completed,
            set.is_warmup,
            set.rpe,
            set.notes,
        ])?;
    }
    Ok(())
}

/// Overwrite every root column of plan `id` and rebuild its exercises.
pub(crate) fn write_workout_plan(conn: &Connection, id: i64, plan: &NewWorkoutPlan) -> Result<()> {
    let days: Vec<u8> = plan.scheduled_days.iter().copied().collect();
    conn.execute(
        "UPDATE workout_plans SET remote_id = ?1, name = ?2, description = ?3, category = ?4,
            scheduled_days = ?5, estimated_duration_min = ?6, is_active = ?7, is_synced = ?8,
            updated_at = ?9
         WHERE id = ?10",
        params![
            plan.remote_id,
            plan.name,
            plan.description,
            plan.category.as_str(),
            serde_json::to_string(&days)?,
            plan.estimated_duration_min,
            plan.is_active,
            plan.is_synced,
            Local::now().to_rfc3339(),
            id,
        ],
    )?;
    conn.execute("DELETE FROM plan_exercises WHERE plan_id = ?1", params![id])?;
    insert_exercises(conn, id, &plan.exercises)
}

fn insert_exercises(conn: &Connection, plan_id: i64, exercises: &[NewExercise]) -> Result<()> {
    let mut stmt = conn.prepare(
        "INSERT INTO plan_exercises (plan_id, remote_id, position, name, muscle_group, sets,
            reps_min, reps_max, duration_sec, rest_sec, notes)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
    )?;
    for (position, exercise) in exercises.iter().enumerate() {
        stmt.execute(params![
            plan_id,
            exercise.remote_id,
            position as i64,
            exercise.name,
            exercise.muscle_group,
            exercise.sets,
            exercise.reps_min,
            exercise.reps_max,
            exercise.duration_sec,
            exercise.rest_sec,
            exercise.notes,
        ])?;
    }
    Ok(())
}
