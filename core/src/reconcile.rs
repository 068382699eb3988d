//! Applies interpreted assistant commands to the local store.
//!
//! Commands run strictly in delivery order, one at a time. Identifier-bearing
//! creations are deduplicated by remote id, then materialized from an
//! authoritative fetch or, when that fails, synthesized from the notification
//! itself. Goal edits land on the profile immediately and trigger one targets
//! refresh after the whole batch. A failing command never stops the batch.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local, Utc};

use crate::interpret::{
    Command, CommandKind, CustomMacrosCommand, GoalCommand, MealCommand, WaterCommand,
    WeightCommand, WorkoutLogCommand, WorkoutPlanCommand,
};
use crate::issue::Issue;
use crate::macro_calc::{self, GoalCheck};
use crate::models::{
    GoalType, LogSource, MacroPlan, MacroSplit, MealCategory, MealTotals, NewMeal, NewWaterEntry,
    NewWeightEntry, NewWorkoutLog, NewWorkoutPlan, TargetSource, WorkoutCategory, WorkoutMetrics,
    validate_macro_split,
};
use crate::remote::{RemoteClient, RemoteError};
use crate::session::{Session, SharedDatabase, lock};

const CHAT_SOURCE: &str = "chat";
const TARGETS_KIND: &str = "macro_targets";

#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// Upper bound on every remote call made during a pass.
    pub fetch_timeout: Duration,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            fetch_timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Already stored under this remote id.
    Skipped { local_id: i64 },
    /// Built from the authoritative fetch.
    Materialized { local_id: i64 },
    /// Built from the notification after the fetch failed.
    Synthesized { local_id: i64 },
    /// Lightweight entry, always inserted.
    Inserted { local_id: i64 },
    ProfileUpdated,
    Dropped,
    Rejected,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CommandOutcome {
    pub kind: CommandKind,
    pub remote_id: Option<String>,
    pub outcome: Outcome,
}

#[derive(Debug, Clone, Default)]
pub struct ReconcileReport {
    pub outcomes: Vec<CommandOutcome>,
    pub issues: Vec<Issue>,
    /// Accepted goal changes the guardrail flagged.
    pub warnings: Vec<String>,
    /// Where the refreshed targets came from, when a refresh wrote a row.
    pub targets: Option<TargetSource>,
    pub unauthorized: bool,
}

impl ReconcileReport {
    #[must_use]
    pub fn count(&self, pred: impl Fn(&Outcome) -> bool) -> usize {
        self.outcomes.iter().filter(|o| pred(&o.outcome)).count()
    }

    /// One line for humans, e.g. `2 created, 1 skipped, targets refreshed (server)`.
    #[must_use]
    pub fn summary(&self) -> String {
        let created = self.count(|o| {
            matches!(
                o,
                Outcome::Materialized { .. } | Outcome::Synthesized { .. } | Outcome::Inserted { .. }
            )
        });
        let mut parts = vec![format!("{created} created")];
        let skipped = self.count(|o| matches!(o, Outcome::Skipped { .. }));
        if skipped > 0 {
            parts.push(format!("{skipped} already stored"));
        }
        let synthesized = self.count(|o| matches!(o, Outcome::Synthesized { .. }));
        if synthesized > 0 {
            parts.push(format!("{synthesized} from fallback"));
        }
        let updated = self.count(|o| *o == Outcome::ProfileUpdated);
        if updated > 0 {
            parts.push(format!("{updated} profile update(s)"));
        }
        let dropped = self.count(|o| matches!(o, Outcome::Dropped | Outcome::Rejected));
        if dropped > 0 {
            parts.push(format!("{dropped} not applied"));
        }
        if let Some(source) = self.targets {
            parts.push(format!("targets refreshed ({source})"));
        }
        parts.join(", ")
    }

    fn record(&mut self, command: &Command, outcome: Outcome) {
        self.outcomes.push(CommandOutcome {
            kind: command.kind(),
            remote_id: command.remote_id().map(str::to_string),
            outcome,
        });
    }

    fn fetch_failed(&mut self, kind: &'static str, remote_id: Option<&str>, err: RemoteError) {
        tracing::warn!(kind, remote_id, error = %err, "remote fetch failed, using fallback");
        if err.is_unauthorized() {
            self.unauthorized = true;
        }
        self.issues.push(Issue::Fetch {
            kind,
            remote_id: remote_id.map(str::to_string),
            source: err,
        });
    }

    fn dropped(&mut self, kind: &'static str, reason: impl Into<String>) -> Outcome {
        let reason = reason.into();
        tracing::warn!(kind, reason = %reason, "command dropped");
        self.issues.push(Issue::Drop { kind, reason });
        Outcome::Dropped
    }

    fn store_failed(&mut self, kind: &'static str, err: &anyhow::Error) -> Outcome {
        tracing::warn!(kind, error = %format!("{err:#}"), "local store write failed");
        self.issues.push(Issue::store(kind, err));
        Outcome::Dropped
    }
}

pub struct Reconciler {
    db: SharedDatabase,
    remote: Arc<dyn RemoteClient>,
    config: ReconcilerConfig,
}

impl Reconciler {
    pub fn new(db: SharedDatabase, remote: Arc<dyn RemoteClient>) -> Self {
        Self::with_config(db, remote, ReconcilerConfig::default())
    }

    pub fn with_config(
        db: SharedDatabase,
        remote: Arc<dyn RemoteClient>,
        config: ReconcilerConfig,
    ) -> Self {
        Self { db, remote, config }
    }

    /// Apply `commands` in order. Never fails as a whole; per-command
    /// problems are collected in the report.
    pub async fn apply(&self, session: &Session, commands: &[Command]) -> ReconcileReport {
        let mut report = ReconcileReport::default();
        let mut goal_dirty = false;

        for command in commands {
            tracing::debug!(kind = command.kind().as_str(), remote_id = command.remote_id(), "applying command");
            let outcome = match command {
                Command::CreateMeal(c) => self.apply_meal(session, c, &mut report).await,
                Command::CreateWorkoutLog(c) => self.apply_workout_log(session, c, &mut report).await,
                Command::CreateWorkoutPlan(c) => {
                    self.apply_workout_plan(session, c, &mut report).await
                }
                Command::CreateWaterEntry(c) => self.apply_water(session, c, &mut report),
                Command::CreateWeightEntry(c) => self.apply_weight(session, c, &mut report),
                Command::SetGoal(c) => self.apply_goal(session, c, &mut report),
                Command::SetCustomMacros(c) => self.apply_custom_macros(session, c, &mut report),
            };
            if command.affects_goal() && outcome == Outcome::ProfileUpdated {
                goal_dirty = true;
            }
            report.record(command, outcome);
        }

        if goal_dirty {
            self.refresh_targets(session, &mut report).await;
        }

        tracing::info!(
            commands = commands.len(),
            issues = report.issues.len(),
            summary = %report.summary(),
            "reconciliation pass finished"
        );
        report
    }

    async fn call<T, F>(&self, fut: F) -> Result<T, RemoteError>
    where
        F: Future<Output = Result<T, RemoteError>>,
    {
        match tokio::time::timeout(self.config.fetch_timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(RemoteError::Timeout),
        }
    }

    async fn apply_meal(
        &self,
        session: &Session,
        cmd: &MealCommand,
        report: &mut ReconcileReport,
    ) -> Outcome {
        let kind = CommandKind::CreateMeal.as_str();
        if let Some(remote_id) = cmd.remote_id.as_deref() {
            match lock(&self.db).and_then(|db| db.find_meal_by_remote_id(remote_id)) {
                Ok(Some(existing)) => return Outcome::Skipped { local_id: existing.id },
                Ok(None) => {}
                Err(e) => return report.store_failed(kind, &e),
            }
            match self.call(self.remote.fetch_meal(remote_id)).await {
                Ok(dto) => {
                    let meal = dto.into_new_meal();
                    return match lock(&self.db).and_then(|db| db.upsert_meal(&session.user_id, &meal)) {
                        Ok(stored) => Outcome::Materialized { local_id: stored.into_inner().id },
                        Err(e) => report.store_failed(kind, &e),
                    };
                }
                Err(err) => report.fetch_failed(kind, Some(remote_id), err),
            }
        }

        let Some(meal) = synthesize_meal(cmd) else {
            return report.dropped(kind, "no meal name to build a local record from");
        };
        match lock(&self.db).and_then(|db| db.upsert_meal(&session.user_id, &meal)) {
            Ok(stored) => Outcome::Synthesized { local_id: stored.into_inner().id },
            Err(e) => report.store_failed(kind, &e),
        }
    }

    async fn apply_workout_log(
        &self,
        session: &Session,
        cmd: &WorkoutLogCommand,
        report: &mut ReconcileReport,
    ) -> Outcome {
        let kind = CommandKind::CreateWorkoutLog.as_str();
        if let Some(remote_id) = cmd.remote_id.as_deref() {
            match lock(&self.db).and_then(|db| db.find_workout_log_by_remote_id(remote_id)) {
                Ok(Some(existing)) => return Outcome::Skipped { local_id: existing.id },
                Ok(None) => {}
                Err(e) => return report.store_failed(kind, &e),
            }
            match self.call(self.remote.fetch_workout_log(remote_id)).await {
                Ok(dto) => {
                    let log = dto.into_new_workout_log();
                    return match lock(&self.db)
                        .and_then(|db| db.upsert_workout_log(&session.user_id, &log))
                    {
                        Ok(stored) => Outcome::Materialized { local_id: stored.into_inner().id },
                        Err(e) => report.store_failed(kind, &e),
                    };
                }
                Err(err) => report.fetch_failed(kind, Some(remote_id), err),
            }
        }

        let Some(log) = synthesize_workout_log(cmd) else {
            return report.dropped(kind, "no workout name to build a local record from");
        };
        match lock(&self.db).and_then(|db| db.upsert_workout_log(&session.user_id, &log)) {
            Ok(stored) => Outcome::Synthesized { local_id: stored.into_inner().id },
            Err(e) => report.store_failed(kind, &e),
        }
    }

    async fn apply_workout_plan(
        &self,
        session: &Session,
        cmd: &WorkoutPlanCommand,
        report: &mut ReconcileReport,
    ) -> Outcome {
        let kind = CommandKind::CreateWorkoutPlan.as_str();
        if let Some(remote_id) = cmd.remote_id.as_deref() {
            match lock(&self.db).and_then(|db| db.find_workout_plan_by_remote_id(remote_id)) {
                Ok(Some(existing)) => return Outcome::Skipped { local_id: existing.id },
                Ok(None) => {}
                Err(e) => return report.store_failed(kind, &e),
            }
            match self.call(self.remote.fetch_workout_plan(remote_id)).await {
                Ok(dto) => {
                    let plan = dto.into_new_workout_plan();
                    return match lock(&self.db)
                        .and_then(|db| db.upsert_workout_plan(&session.user_id, &plan))
                    {
                        Ok(stored) => Outcome::Materialized { local_id: stored.into_inner().id },
                        Err(e) => report.store_failed(kind, &e),
                    };
                }
                Err(err) => report.fetch_failed(kind, Some(remote_id), err),
            }
        }

        let Some(plan) = synthesize_workout_plan(cmd) else {
            return report.dropped(kind, "no plan name to build a local record from");
        };
        match lock(&self.db).and_then(|db| db.upsert_workout_plan(&session.user_id, &plan)) {
            Ok(stored) => Outcome::Synthesized { local_id: stored.into_inner().id },
            Err(e) => report.store_failed(kind, &e),
        }
    }

    fn apply_water(&self, session: &Session, cmd: &WaterCommand, report: &mut ReconcileReport) -> Outcome {
        let kind = CommandKind::CreateWaterEntry.as_str();
        let amount_ml = match cmd.amount_ml {
            Some(ml) if ml > 0 => ml,
            Some(ml) => return report.dropped(kind, format!("non-positive amount {ml} ml")),
            None => return report.dropped(kind, "no amount"),
        };
        let entry = NewWaterEntry {
            remote_id: cmd.remote_id.clone(),
            amount_ml,
            timestamp: cmd.timestamp.unwrap_or_else(Utc::now),
            source: CHAT_SOURCE.to_string(),
            is_synced: true,
        };
        match lock(&self.db).and_then(|db| db.insert_water_entry(&session.user_id, &entry)) {
            Ok(stored) => Outcome::Inserted { local_id: stored.id },
            Err(e) => report.store_failed(kind, &e),
        }
    }

    fn apply_weight(&self, session: &Session, cmd: &WeightCommand, report: &mut ReconcileReport) -> Outcome {
        let kind = CommandKind::CreateWeightEntry.as_str();
        let weight_kg = match cmd.weight_kg {
            Some(kg) if kg > 0.0 => kg,
            Some(kg) => return report.dropped(kind, format!("non-positive weight {kg} kg")),
            None => return report.dropped(kind, "no weight"),
        };
        let entry = NewWeightEntry {
            remote_id: cmd.remote_id.clone(),
            weight_kg,
            timestamp: cmd.timestamp.unwrap_or_else(Utc::now),
            notes: cmd.notes.clone(),
            source: CHAT_SOURCE.to_string(),
            is_synced: true,
        };
        let stored = lock(&self.db).and_then(|db| {
            let stored = db.insert_weight_entry(&session.user_id, &entry)?;
            let mut profile = db.get_or_create_profile(&session.user_id)?;
            profile.current_weight_kg = Some(weight_kg);
            db.save_profile(&profile)?;
            Ok(stored)
        });
        match stored {
            Ok(stored) => Outcome::Inserted { local_id: stored.id },
            Err(e) => report.store_failed(kind, &e),
        }
    }

    fn apply_goal(&self, session: &Session, cmd: &GoalCommand, report: &mut ReconcileReport) -> Outcome {
        let kind = CommandKind::SetGoal.as_str();
        if *cmd == GoalCommand::default() {
            return report.dropped(kind, "no goal fields");
        }
        let result = lock(&self.db).and_then(|db| {
            let mut profile = db.get_or_create_profile(&session.user_id)?;
            let goal_type = cmd.goal_type.unwrap_or(profile.goal_type);
            let rate = match cmd.goal_rate_kg_per_week {
                Some(rate) => rate,
                None if goal_type == GoalType::Maintain => 0.0,
                None => profile.goal_rate_kg_per_week,
            };
            let check = macro_calc::validate_goal_rate(goal_type, rate);
            if let GoalCheck::Reject(_) = check {
                return Ok(check);
            }
            profile.goal_type = goal_type;
            profile.goal_rate_kg_per_week = rate;
            if let Some(level) = cmd.activity_level {
                profile.activity_level = level;
            }
            if let Some(target) = cmd.target_weight_kg {
                profile.target_weight_kg = Some(target);
            }
            db.save_profile(&profile)?;
            Ok(check)
        });
        match result {
            Ok(GoalCheck::Reject(message)) => {
                tracing::info!(kind, reason = %message, "goal change rejected");
                report.issues.push(Issue::Validation { message });
                Outcome::Rejected
            }
            Ok(GoalCheck::Warn(message)) => {
                report.warnings.push(message);
                Outcome::ProfileUpdated
            }
            Ok(GoalCheck::Accept) => Outcome::ProfileUpdated,
            Err(e) => report.store_failed(kind, &e),
        }
    }

    fn apply_custom_macros(
        &self,
        session: &Session,
        cmd: &CustomMacrosCommand,
        report: &mut ReconcileReport,
    ) -> Outcome {
        let kind = CommandKind::SetCustomMacros.as_str();
        if *cmd == CustomMacrosCommand::default() {
            return report.dropped(kind, "no macro fields");
        }
        let result = lock(&self.db).and_then(|db| {
            let mut profile = db.get_or_create_profile(&session.user_id)?;
            let has_percents =
                cmd.protein_pct.is_some() || cmd.carbs_pct.is_some() || cmd.fat_pct.is_some();
            if has_percents {
                let base = profile
                    .custom_split
                    .or_else(|| profile.macro_plan.fixed_split())
                    .unwrap_or(MacroSplit::new(0.0, 0.0, 0.0));
                let split = MacroSplit::new(
                    cmd.protein_pct.unwrap_or(base.protein_pct),
                    cmd.carbs_pct.unwrap_or(base.carbs_pct),
                    cmd.fat_pct.unwrap_or(base.fat_pct),
                );
                if let Err(e) = validate_macro_split(&split) {
                    return Ok(Some(e.to_string()));
                }
                profile.custom_split = Some(split);
            }
            profile.macro_plan = match cmd.macro_plan {
                Some(plan) => plan,
                None if has_percents => MacroPlan::Custom,
                None => profile.macro_plan,
            };
            if let Some(calories) = cmd.override_calories {
                profile.overrides.calories = Some(calories);
            }
            if let Some(protein) = cmd.override_protein_g {
                profile.overrides.protein_g = Some(protein);
            }
            if let Some(carbs) = cmd.override_carbs_g {
                profile.overrides.carbs_g = Some(carbs);
            }
            if let Some(fat) = cmd.override_fat_g {
                profile.overrides.fat_g = Some(fat);
            }
            db.save_profile(&profile)?;
            Ok(None)
        });
        match result {
            Ok(None) => Outcome::ProfileUpdated,
            Ok(Some(message)) => {
                report.issues.push(Issue::Validation { message });
                Outcome::Rejected
            }
            Err(e) => report.store_failed(kind, &e),
        }
    }

    /// One refresh per batch: server values when available, else a local
    /// recompute from the updated profile. Leaves the row alone if neither works.
    async fn refresh_targets(&self, session: &Session, report: &mut ReconcileReport) {
        match self.call(self.remote.fetch_macro_targets()).await {
            Ok(Some(dto)) => {
                let row = dto.into_row(&session.user_id);
                match lock(&self.db).and_then(|db| db.upsert_macro_targets(&row)) {
                    Ok(()) => report.targets = Some(TargetSource::Server),
                    Err(e) => {
                        report.store_failed(TARGETS_KIND, &e);
                    }
                }
                return;
            }
            Ok(None) => tracing::debug!("server has no targets yet, computing locally"),
            Err(err) => report.fetch_failed(TARGETS_KIND, None, err),
        }

        let today = Local::now().date_naive();
        let computed = lock(&self.db).and_then(|db| {
            let profile = db.get_or_create_profile(&session.user_id)?;
            let row = match macro_calc::targets_for_profile(&profile, today, Utc::now()) {
                Ok(row) => row,
                Err(e) => return Ok(Err(e.to_string())),
            };
            db.upsert_macro_targets(&row)?;
            Ok(Ok(()))
        });
        match computed {
            Ok(Ok(())) => report.targets = Some(TargetSource::Local),
            Ok(Err(reason)) => {
                report.dropped(TARGETS_KIND, format!("cannot recompute targets: {reason}"));
            }
            Err(e) => {
                report.store_failed(TARGETS_KIND, &e);
            }
        }
    }
}

fn synthesize_meal(cmd: &MealCommand) -> Option<NewMeal> {
    let name = cmd.name.clone()?;
    let computed = MealTotals::from_items(&cmd.items);
    let reported = [
        cmd.total_calories,
        cmd.total_protein_g,
        cmd.total_carbs_g,
        cmd.total_fat_g,
    ]
    .iter()
    .any(Option::is_some)
    .then(|| MealTotals {
        calories: cmd.total_calories.unwrap_or(computed.calories),
        protein_g: cmd.total_protein_g.unwrap_or(computed.protein_g),
        carbs_g: cmd.total_carbs_g.unwrap_or(computed.carbs_g),
        fat_g: cmd.total_fat_g.unwrap_or(computed.fat_g),
        fiber_g: computed.fiber_g,
    });
    Some(NewMeal {
        remote_id: cmd.remote_id.clone(),
        name,
        category: cmd.category.unwrap_or(MealCategory::Other),
        timestamp: cmd.timestamp.unwrap_or_else(Utc::now),
        notes: cmd.notes.clone(),
        items: cmd.items.clone(),
        reported_totals: reported,
        is_synced: true,
    })
}

fn synthesize_workout_log(cmd: &WorkoutLogCommand) -> Option<NewWorkoutLog> {
    let name = cmd.name.clone()?;
    let start_time: DateTime<Utc> = cmd.start_time.unwrap_or_else(Utc::now);
    let duration_min = cmd.duration_min.unwrap_or(0).max(0);
    Some(NewWorkoutLog {
        remote_id: cmd.remote_id.clone(),
        plan_remote_id: cmd.plan_remote_id.clone(),
        name,
        category: cmd.category.unwrap_or(WorkoutCategory::Other),
        source: LogSource::Chat,
        start_time,
        end_time: cmd
            .duration_min
            .map(|_| start_time + chrono::Duration::minutes(duration_min)),
        duration_min,
        metrics: WorkoutMetrics {
            calories_burned: cmd.calories_burned,
            ..WorkoutMetrics::default()
        },
        notes: cmd.notes.clone(),
        sets: cmd.sets.clone(),
        is_synced: true,
    })
}

fn synthesize_workout_plan(cmd: &WorkoutPlanCommand) -> Option<NewWorkoutPlan> {
    let name = cmd.name.clone()?;
    Some(NewWorkoutPlan {
        remote_id: cmd.remote_id.clone(),
        name,
        description: cmd.description.clone(),
        category: cmd.category.unwrap_or(WorkoutCategory::Strength),
        scheduled_days: cmd.scheduled_days.clone().unwrap_or_default(),
        estimated_duration_min: cmd.estimated_duration_min,
        is_active: true,
        exercises: cmd.exercises.clone(),
        is_synced: true,
    })
}
