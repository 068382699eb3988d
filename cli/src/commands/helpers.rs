use anyhow::{Context, Result, bail};
use chrono::{DateTime, Local, NaiveDate, TimeZone, Utc};
use serde::Serialize;

use ada_core::issue::Issue;
use ada_core::models::validate_weight;

const KG_PER_LB: f64 = 0.453_592;
pub(crate) const LBS_PER_KG: f64 = 2.20462;

pub(crate) fn parse_date(date_str: Option<String>) -> Result<NaiveDate> {
    match date_str {
        None => Ok(Local::now().date_naive()),
        Some(s) => match s.as_str() {
            "today" => Ok(Local::now().date_naive()),
            "yesterday" => Ok(Local::now().date_naive() - chrono::Duration::days(1)),
            "tomorrow" => Ok(Local::now().date_naive() + chrono::Duration::days(1)),
            _ => NaiveDate::parse_from_str(&s, "%Y-%m-%d").with_context(|| {
                format!("Invalid date '{s}'. Use YYYY-MM-DD or today/yesterday/tomorrow")
            }),
        },
    }
}

/// UTC bounds of a local calendar day, `[start, end)`.
pub(crate) fn local_day_bounds(date: NaiveDate) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
    let start = local_midnight(date)?;
    let next = date.succ_opt().context("Date out of range")?;
    Ok((start, local_midnight(next)?))
}

fn local_midnight(date: NaiveDate) -> Result<DateTime<Utc>> {
    let naive = date.and_hms_opt(0, 0, 0).context("Invalid date")?;
    let local = Local
        .from_local_datetime(&naive)
        .earliest()
        .with_context(|| format!("No local midnight on {date}"))?;
    Ok(local.with_timezone(&Utc))
}

/// A timestamp for an entry logged on `date`: now for today, local noon otherwise.
pub(crate) fn timestamp_on(date: NaiveDate) -> Result<DateTime<Utc>> {
    if date == Local::now().date_naive() {
        return Ok(Utc::now());
    }
    let noon = date.and_hms_opt(12, 0, 0).context("Invalid date")?;
    let local = Local
        .from_local_datetime(&noon)
        .earliest()
        .with_context(|| format!("No local noon on {date}"))?;
    Ok(local.with_timezone(&Utc))
}

pub(crate) fn to_kg(value: f64, unit: &str) -> Result<f64> {
    let kg = match unit.to_lowercase().as_str() {
        "kg" => value,
        "lbs" | "lb" => {
            let kg = no_neg_zero(value * KG_PER_LB);
            eprintln!("Converting {value:.1} lbs → {kg:.2} kg");
            kg
        }
        _ => bail!("Invalid unit '{unit}'. Use 'kg' or 'lbs'"),
    };
    validate_weight(kg)?;
    Ok(kg)
}

pub(crate) fn local_time(ts: DateTime<Utc>) -> String {
    ts.with_timezone(&Local).format("%Y-%m-%d %H:%M").to_string()
}

pub(crate) fn print_issues(issues: &[Issue]) {
    for issue in issues {
        if issue.is_user_facing() {
            eprintln!("! {issue}");
        } else {
            eprintln!("  note: {issue}");
        }
    }
}

pub(crate) fn json_error(message: &str) -> String {
    #[derive(Serialize)]
    struct CliError<'a> {
        error: &'a str,
    }
    serde_json::to_string(&CliError { error: message })
        .unwrap_or_else(|_| format!("{{\"error\":\"{message}\"}}"))
}

pub(crate) fn no_neg_zero(v: f64) -> f64 {
    if v == 0.0 { 0.0 } else { v }
}

pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let end = s.char_indices().nth(max - 3).map_or(s.len(), |(i, _)| i);
        format!("{}...", &s[..end])
    }
}
