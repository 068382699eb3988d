use anyhow::{Context, Result};
use chrono::{Local, Utc};
use serde::Serialize;
use std::process;

use ada_core::db::Database;
use ada_core::macro_calc::{GoalCheck, estimate_weeks_to_goal, targets_for_profile, validate_goal_rate};
use ada_core::models::{GoalType, MacroTargets};

use super::helpers::{json_error, local_time};

pub(crate) fn print_targets(targets: &MacroTargets) {
    println!(
        "Targets: {} kcal | P:{:.0}g C:{:.0}g F:{:.0}g",
        targets.calories, targets.protein_g, targets.carbs_g, targets.fat_g
    );
    if let Some(fiber) = targets.fiber_g {
        println!("  Fiber: {fiber:.0}g");
    }
    if let (Some(bmr), Some(tdee)) = (targets.bmr, targets.tdee) {
        println!("  BMR: {bmr} kcal, TDEE: {tdee} kcal");
    }
    println!(
        "  Source: {} ({})",
        targets.source,
        local_time(targets.calculated_at)
    );
}

pub(crate) fn cmd_targets_show(db: &Database, user_id: &str, json: bool) -> Result<()> {
    let Some(targets) = db.get_macro_targets(user_id)? else {
        if json {
            println!("{}", json_error("No macro targets yet"));
        } else {
            eprintln!("No macro targets yet. Fill in your profile and run `ada targets recalc`.");
        }
        process::exit(2);
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&targets)?);
    } else {
        print_targets(&targets);
    }
    Ok(())
}

/// Recompute targets from the stored profile and replace the current row.
pub(crate) fn recalc_targets(db: &Database, user_id: &str) -> Result<MacroTargets> {
    let profile = db.get_or_create_profile(user_id)?;
    let targets = targets_for_profile(&profile, Local::now().date_naive(), Utc::now())
        .context("Cannot compute targets; complete your profile with `ada profile set`")?;
    db.upsert_macro_targets(&targets)?;
    Ok(targets)
}

pub(crate) fn cmd_targets_recalc(db: &Database, user_id: &str, json: bool) -> Result<()> {
    let targets = recalc_targets(db, user_id)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&targets)?);
    } else {
        print_targets(&targets);
    }
    Ok(())
}

#[derive(Serialize)]
struct GoalCheckOutput<'a> {
    goal: GoalType,
    rate_kg_per_week: f64,
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    weeks_to_goal: Option<i64>,
}

pub(crate) fn cmd_goal_check(
    db: &Database,
    user_id: &str,
    goal: &str,
    rate: f64,
    json: bool,
) -> Result<()> {
    let goal = GoalType::parse(goal)
        .with_context(|| format!("Invalid goal '{goal}'. Use cut, maintain or bulk"))?;
    let check = validate_goal_rate(goal, rate);
    let profile = db.get_or_create_profile(user_id)?;
    let weeks = match (profile.current_weight_kg, profile.target_weight_kg) {
        (Some(current), Some(target)) if check.is_accepted() => {
            estimate_weeks_to_goal(current, target, rate)
        }
        _ => None,
    };
    let status = match check {
        GoalCheck::Accept => "accept",
        GoalCheck::Warn(_) => "warn",
        GoalCheck::Reject(_) => "reject",
    };

    if json {
        let output = GoalCheckOutput {
            goal,
            rate_kg_per_week: rate,
            status,
            message: check.message(),
            weeks_to_goal: weeks,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        match check.message() {
            Some(msg) => println!("{goal} at {rate} kg/week: {status}. {msg}"),
            None => println!("{goal} at {rate} kg/week: ok"),
        }
        if let Some(weeks) = weeks {
            println!("  About {weeks} weeks to reach your target weight");
        }
    }

    if !check.is_accepted() {
        process::exit(2);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ada_core::models::{Sex, TargetSource};
    use chrono::NaiveDate;

    #[test]
    fn test_recalc_needs_body_metrics() {
        let db = Database::open_in_memory().unwrap();
        let user_id = db.get_or_create_user_id().unwrap();
        let err = recalc_targets(&db, &user_id).unwrap_err();
        assert!(format!("{err:#}").contains("birth date"));
        assert!(db.get_macro_targets(&user_id).unwrap().is_none());
    }

    #[test]
    fn test_recalc_writes_single_local_row() {
        let db = Database::open_in_memory().unwrap();
        let user_id = db.get_or_create_user_id().unwrap();
        let mut profile = db.get_or_create_profile(&user_id).unwrap();
        profile.sex = Some(Sex::Male);
        profile.birth_date = NaiveDate::from_ymd_opt(1990, 3, 1);
        profile.height_cm = Some(180.0);
        profile.current_weight_kg = Some(80.0);
        profile.overrides.calories = Some(2500);
        db.save_profile(&profile).unwrap();

        recalc_targets(&db, &user_id).unwrap();
        let targets = recalc_targets(&db, &user_id).unwrap();
        assert_eq!(targets.source, TargetSource::Local);
        assert_eq!(targets.calories, 2500);
        assert_eq!(db.get_macro_targets(&user_id).unwrap(), Some(targets));
    }
}
