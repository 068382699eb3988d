use anyhow::{Context, Result, bail};
use chrono::{Local, NaiveDate};

use ada_core::db::Database;
use ada_core::macro_calc::{GoalCheck, validate_goal_rate};
use ada_core::models::{
    ActivityLevel, GoalType, MacroOverrides, MacroPlan, MacroSplit, Sex, UserProfile,
    validate_macro_split, validate_weight,
};

use super::target::{print_targets, recalc_targets};

/// Fields to change; `None` keeps the stored value.
#[derive(Debug, Default)]
pub(crate) struct ProfileUpdate {
    pub sex: Option<String>,
    pub birth_date: Option<String>,
    pub height_cm: Option<f64>,
    pub weight_kg: Option<f64>,
    pub activity: Option<String>,
    pub goal: Option<String>,
    pub rate: Option<f64>,
    pub target_weight_kg: Option<f64>,
    pub plan: Option<String>,
    pub protein_pct: Option<f64>,
    pub carbs_pct: Option<f64>,
    pub fat_pct: Option<f64>,
    pub calories: Option<i64>,
    pub protein_g: Option<f64>,
    pub carbs_g: Option<f64>,
    pub fat_g: Option<f64>,
    pub clear_overrides: bool,
}

impl ProfileUpdate {
    fn touches_targets(&self) -> bool {
        self.sex.is_some()
            || self.birth_date.is_some()
            || self.height_cm.is_some()
            || self.weight_kg.is_some()
            || self.activity.is_some()
            || self.goal.is_some()
            || self.rate.is_some()
            || self.plan.is_some()
            || self.protein_pct.is_some()
            || self.carbs_pct.is_some()
            || self.fat_pct.is_some()
            || self.calories.is_some()
            || self.protein_g.is_some()
            || self.carbs_g.is_some()
            || self.fat_g.is_some()
            || self.clear_overrides
    }
}

fn parse_choice<T>(value: Option<&str>, what: &str, parse: fn(&str) -> Option<T>) -> Result<Option<T>> {
    value
        .map(|v| parse(v).with_context(|| format!("Invalid {what} '{v}'")))
        .transpose()
}

/// Merge `update` into `profile`. Returns the guardrail warning, if any.
/// A rejected goal leaves `profile` untouched.
pub(crate) fn apply_update(profile: &mut UserProfile, update: &ProfileUpdate) -> Result<Option<String>> {
    let mut next = profile.clone();

    if let Some(sex) = parse_choice(update.sex.as_deref(), "sex", Sex::parse)? {
        next.sex = Some(sex);
    }
    if let Some(date) = &update.birth_date {
        let date = NaiveDate::parse_from_str(date, "%Y-%m-%d")
            .with_context(|| format!("Invalid birth date '{date}'. Use YYYY-MM-DD"))?;
        if date >= Local::now().date_naive() {
            bail!("Birth date must be in the past");
        }
        next.birth_date = Some(date);
    }
    if let Some(height) = update.height_cm {
        if !(50.0..=300.0).contains(&height) {
            bail!("Height must be between 50 and 300 cm (got {height})");
        }
        next.height_cm = Some(height);
    }
    if let Some(weight) = update.weight_kg {
        validate_weight(weight)?;
        next.current_weight_kg = Some(weight);
    }
    if let Some(target) = update.target_weight_kg {
        validate_weight(target)?;
        next.target_weight_kg = Some(target);
    }
    if let Some(level) = parse_choice(update.activity.as_deref(), "activity level", ActivityLevel::parse)? {
        next.activity_level = level;
    }

    let goal = parse_choice(update.goal.as_deref(), "goal", GoalType::parse)?;
    let mut warning = None;
    if goal.is_some() || update.rate.is_some() {
        let goal_type = goal.unwrap_or(next.goal_type);
        let rate = match update.rate {
            Some(rate) => rate,
            None if goal_type == GoalType::Maintain => 0.0,
            None => next.goal_rate_kg_per_week,
        };
        match validate_goal_rate(goal_type, rate) {
            GoalCheck::Reject(msg) => bail!(msg),
            GoalCheck::Warn(msg) => warning = Some(msg),
            GoalCheck::Accept => {}
        }
        next.goal_type = goal_type;
        next.goal_rate_kg_per_week = rate;
    }

    let has_percents =
        update.protein_pct.is_some() || update.carbs_pct.is_some() || update.fat_pct.is_some();
    if has_percents {
        let base = next
            .custom_split
            .or_else(|| next.macro_plan.fixed_split())
            .unwrap_or(MacroSplit::new(0.0, 0.0, 0.0));
        let split = MacroSplit::new(
            update.protein_pct.unwrap_or(base.protein_pct),
            update.carbs_pct.unwrap_or(base.carbs_pct),
            update.fat_pct.unwrap_or(base.fat_pct),
        );
        validate_macro_split(&split)?;
        next.custom_split = Some(split);
        next.macro_plan = MacroPlan::Custom;
    }
    if let Some(plan) = parse_choice(update.plan.as_deref(), "macro plan", MacroPlan::parse)? {
        next.macro_plan = plan;
    }

    if update.clear_overrides {
        next.overrides = MacroOverrides::default();
    }
    if let Some(calories) = update.calories {
        if calories <= 0 {
            bail!("Calorie override must be greater than 0");
        }
        next.overrides.calories = Some(calories);
    }
    if let Some(protein) = update.protein_g {
        next.overrides.protein_g = Some(protein.max(0.0));
    }
    if let Some(carbs) = update.carbs_g {
        next.overrides.carbs_g = Some(carbs.max(0.0));
    }
    if let Some(fat) = update.fat_g {
        next.overrides.fat_g = Some(fat.max(0.0));
    }

    *profile = next;
    Ok(warning)
}

fn print_profile(profile: &UserProfile) {
    let unset = || "-".to_string();
    let today = Local::now().date_naive();
    println!("Sex:            {}", profile.sex.map_or_else(unset, |s| s.to_string()));
    println!(
        "Age:            {}",
        profile.age_on(today).map_or_else(unset, |a| a.to_string())
    );
    println!(
        "Height:         {}",
        profile.height_cm.map_or_else(unset, |h| format!("{h:.0} cm"))
    );
    println!(
        "Weight:         {}",
        profile.current_weight_kg.map_or_else(unset, |w| format!("{w:.1} kg"))
    );
    println!(
        "Target weight:  {}",
        profile.target_weight_kg.map_or_else(unset, |w| format!("{w:.1} kg"))
    );
    println!("Activity:       {}", profile.activity_level);
    println!(
        "Goal:           {} ({} kg/week)",
        profile.goal_type, profile.goal_rate_kg_per_week
    );
    match (profile.macro_plan, profile.custom_split) {
        (MacroPlan::Custom, Some(s)) => println!(
            "Macro plan:     custom (P {:.0}% / C {:.0}% / F {:.0}%)",
            s.protein_pct, s.carbs_pct, s.fat_pct
        ),
        (plan, _) => println!("Macro plan:     {plan}"),
    }
    let o = &profile.overrides;
    if !o.is_empty() {
        let parts: Vec<String> = [
            o.calories.map(|c| format!("{c} kcal")),
            o.protein_g.map(|p| format!("P {p:.0}g")),
            o.carbs_g.map(|c| format!("C {c:.0}g")),
            o.fat_g.map(|f| format!("F {f:.0}g")),
        ]
        .into_iter()
        .flatten()
        .collect();
        println!("Overrides:      {}", parts.join(", "));
    }
}

pub(crate) fn cmd_profile_show(db: &Database, user_id: &str, json: bool) -> Result<()> {
    let profile = db.get_or_create_profile(user_id)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&profile)?);
    } else {
        print_profile(&profile);
    }
    Ok(())
}

pub(crate) fn cmd_profile_set(
    db: &Database,
    user_id: &str,
    update: &ProfileUpdate,
    json: bool,
) -> Result<()> {
    let mut profile = db.get_or_create_profile(user_id)?;
    let warning = apply_update(&mut profile, update)?;
    db.save_profile(&profile)?;

    if let Some(warning) = &warning {
        eprintln!("Warning: {warning}");
    }

    let targets = if update.touches_targets() {
        match recalc_targets(db, user_id) {
            Ok(targets) => Some(targets),
            Err(e) => {
                tracing::debug!(error = %format!("{e:#}"), "targets not recomputed");
                None
            }
        }
    } else {
        None
    };

    if json {
        let output = serde_json::json!({ "profile": profile, "targets": targets, "warning": warning });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        print_profile(&profile);
        if let Some(targets) = &targets {
            println!();
            print_targets(targets);
        }
    }
    Ok(())
}
