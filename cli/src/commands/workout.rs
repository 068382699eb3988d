use anyhow::Result;
use std::collections::BTreeSet;
use std::process;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use ada_core::db::Database;
use ada_core::sync::Syncer;

use super::helpers::{json_error, local_time, truncate};

const WEEKDAYS: [&str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];

fn format_days(days: &BTreeSet<u8>) -> String {
    if days.is_empty() {
        return "-".to_string();
    }
    days.iter()
        .filter_map(|d| WEEKDAYS.get(usize::from(*d)).copied())
        .collect::<Vec<_>>()
        .join(" ")
}

pub(crate) fn cmd_workouts(db: &Database, user_id: &str, limit: usize, json: bool) -> Result<()> {
    let logs = db.list_workout_logs(user_id, limit)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&logs)?);
        return Ok(());
    }
    if logs.is_empty() {
        eprintln!("No workouts logged yet.");
        return Ok(());
    }

    #[derive(Tabled)]
    struct LogRow {
        #[tabled(rename = "ID")]
        id: i64,
        #[tabled(rename = "Start")]
        start: String,
        #[tabled(rename = "Name")]
        name: String,
        #[tabled(rename = "Type")]
        category: String,
        #[tabled(rename = "Min")]
        duration: i64,
        #[tabled(rename = "Sets")]
        sets: usize,
        #[tabled(rename = "kcal")]
        calories: String,
        #[tabled(rename = "Source")]
        source: String,
    }

    let rows: Vec<LogRow> = logs
        .iter()
        .map(|l| LogRow {
            id: l.id,
            start: local_time(l.start_time),
            name: truncate(&l.name, 28),
            category: l.category.to_string(),
            duration: l.duration_min,
            sets: l.sets.len(),
            calories: l
                .metrics
                .calories_burned
                .map_or_else(|| "-".to_string(), |c| c.to_string()),
            source: l.source.to_string(),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(4..7)).with(Alignment::right()))
        .to_string();
    println!("{table}");
    Ok(())
}

pub(crate) fn cmd_plans(db: &Database, user_id: &str, json: bool) -> Result<()> {
    let plans = db.list_workout_plans(user_id)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&plans)?);
        return Ok(());
    }
    if plans.is_empty() {
        eprintln!("No workout plans yet. Ask the assistant to create one with `ada chat`.");
        return Ok(());
    }

    for plan in &plans {
        let status = if plan.is_active { "" } else { " (inactive)" };
        println!(
            "[{}] {} — {}{status} — {}",
            plan.id,
            plan.name,
            plan.category,
            format_days(&plan.scheduled_days)
        );
        if let Some(description) = &plan.description {
            println!("    {description}");
        }
        for exercise in &plan.exercises {
            let reps = match (exercise.reps_min, exercise.reps_max) {
                (Some(min), Some(max)) if min != max => format!("{min}-{max} reps"),
                (Some(n), _) | (None, Some(n)) => format!("{n} reps"),
                (None, None) => exercise
                    .duration_sec
                    .map_or_else(String::new, |s| format!("{s}s")),
            };
            println!(
                "    - {} {}x {reps} (rest {}s)",
                exercise.name, exercise.sets, exercise.rest_sec
            );
        }
    }
    Ok(())
}

fn print_deleted(what: &str, id: i64, deleted: bool, json: bool) {
    if deleted {
        if json {
            println!("{}", serde_json::json!({ "deleted": id }));
        } else {
            println!("Deleted {what} {id}");
        }
    } else {
        if json {
            println!("{}", json_error(&format!("No {what} with id {id}")));
        } else {
            eprintln!("No {what} with id {id}");
        }
        process::exit(2);
    }
}

pub(crate) async fn cmd_workout_delete(syncer: &Syncer, id: i64, json: bool) -> Result<()> {
    let deleted = syncer.delete_workout_log(id).await?;
    print_deleted("workout", id, deleted, json);
    Ok(())
}

pub(crate) async fn cmd_plan_delete(syncer: &Syncer, id: i64, json: bool) -> Result<()> {
    let deleted = syncer.delete_workout_plan(id).await?;
    print_deleted("plan", id, deleted, json);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_days() {
        assert_eq!(format_days(&BTreeSet::new()), "-");
        assert_eq!(format_days(&BTreeSet::from([0, 2, 4])), "Mon Wed Fri");
        assert_eq!(format_days(&BTreeSet::from([6])), "Sun");
    }
}
