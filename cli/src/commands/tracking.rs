use anyhow::Result;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use ada_core::db::Database;
use ada_core::models::{NewWaterEntry, NewWeightEntry, WeightEntry, validate_water_amount};

use super::helpers::{LBS_PER_KG, local_day_bounds, local_time, parse_date, timestamp_on, to_kg};

const MANUAL_SOURCE: &str = "manual";

pub(crate) fn cmd_water_add(
    db: &Database,
    user_id: &str,
    amount_ml: i64,
    date: Option<String>,
    json: bool,
) -> Result<()> {
    validate_water_amount(amount_ml)?;
    let date = parse_date(date)?;
    let entry = db.insert_water_entry(
        user_id,
        &NewWaterEntry {
            remote_id: None,
            amount_ml,
            timestamp: timestamp_on(date)?,
            source: MANUAL_SOURCE.to_string(),
            is_synced: false,
        },
    )?;

    if json {
        println!("{}", serde_json::to_string_pretty(&entry)?);
    } else {
        let (start, end) = local_day_bounds(date)?;
        let total: i64 = db
            .list_water_entries_between(user_id, start, end)?
            .iter()
            .map(|e| e.amount_ml)
            .sum();
        println!("Logged {amount_ml} ml of water ({total} ml on {date})");
    }
    Ok(())
}

pub(crate) fn cmd_water_show(db: &Database, user_id: &str, date: Option<String>, json: bool) -> Result<()> {
    let date = parse_date(date)?;
    let (start, end) = local_day_bounds(date)?;
    let entries = db.list_water_entries_between(user_id, start, end)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
    } else if entries.is_empty() {
        eprintln!("No water logged on {date}");
    } else {
        for e in &entries {
            println!("  {}  {:>5} ml  [{}]", local_time(e.timestamp), e.amount_ml, e.source);
        }
        let total: i64 = entries.iter().map(|e| e.amount_ml).sum();
        println!("  TOTAL: {total} ml");
    }
    Ok(())
}

/// Log a weight and make it the profile's current weight.
pub(crate) fn cmd_weight_log(
    db: &Database,
    user_id: &str,
    value: f64,
    unit: &str,
    date: Option<String>,
    notes: Option<String>,
    json: bool,
) -> Result<()> {
    let weight_kg = to_kg(value, unit)?;
    let date = parse_date(date)?;
    let entry = record_weight(db, user_id, weight_kg, timestamp_on(date)?, notes)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&entry)?);
    } else {
        let lbs = entry.weight_kg * LBS_PER_KG;
        println!("Logged {:.1} kg ({lbs:.1} lbs) for {date}", entry.weight_kg);
        if let Some(ref n) = entry.notes {
            println!("  Notes: {n}");
        }
    }
    Ok(())
}

fn record_weight(
    db: &Database,
    user_id: &str,
    weight_kg: f64,
    timestamp: chrono::DateTime<chrono::Utc>,
    notes: Option<String>,
) -> Result<WeightEntry> {
    let entry = db.insert_weight_entry(
        user_id,
        &NewWeightEntry {
            remote_id: None,
            weight_kg,
            timestamp,
            notes,
            source: MANUAL_SOURCE.to_string(),
            is_synced: false,
        },
    )?;
    let mut profile = db.get_or_create_profile(user_id)?;
    profile.current_weight_kg = Some(weight_kg);
    db.save_profile(&profile)?;
    Ok(entry)
}

pub(crate) fn cmd_weight_history(db: &Database, user_id: &str, limit: usize, json: bool) -> Result<()> {
    let entries = db.list_weight_entries(user_id, limit)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
    } else if entries.is_empty() {
        eprintln!("No weight entries found. Use `ada weight log` to record your weight.");
    } else {
        #[derive(Tabled)]
        struct WeightRow {
            #[tabled(rename = "ID")]
            id: i64,
            #[tabled(rename = "Time")]
            time: String,
            #[tabled(rename = "Weight (kg)")]
            kg: String,
            #[tabled(rename = "Weight (lbs)")]
            lbs: String,
            #[tabled(rename = "Source")]
            source: String,
            #[tabled(rename = "Notes")]
            notes: String,
        }

        let rows: Vec<WeightRow> = entries
            .iter()
            .map(|e| WeightRow {
                id: e.id,
                time: local_time(e.timestamp),
                kg: format!("{:.1}", e.weight_kg),
                lbs: format!("{:.1}", e.weight_kg * LBS_PER_KG),
                source: e.source.clone(),
                notes: e.notes.clone().unwrap_or_default(),
            })
            .collect();

        let table = Table::new(&rows)
            .with(Style::rounded())
            .with(Modify::new(Columns::new(2..4)).with(Alignment::right()))
            .to_string();
        println!("{table}");
    }
    Ok(())
}
