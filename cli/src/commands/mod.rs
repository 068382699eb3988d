mod chat;
mod helpers;
mod meal;
mod profile;
mod target;
mod tracking;
mod workout;

use anyhow::{Result, bail};

use crate::config::Config;

pub(crate) use chat::{cmd_chat, cmd_sync};
pub(crate) use meal::{MealInput, cmd_meal_add, cmd_meal_delete, cmd_meal_show, cmd_meals};
pub(crate) use profile::{ProfileUpdate, cmd_profile_set, cmd_profile_show};
pub(crate) use target::{cmd_goal_check, cmd_targets_recalc, cmd_targets_show};
pub(crate) use tracking::{cmd_water_add, cmd_water_show, cmd_weight_history, cmd_weight_log};
pub(crate) use workout::{cmd_plan_delete, cmd_plans, cmd_workout_delete, cmd_workouts};

pub(crate) fn cmd_login(config: &Config, token: &str, json: bool) -> Result<()> {
    if token.trim().is_empty() {
        bail!("Token must not be empty");
    }
    let path = config.save_token(token)?;
    if json {
        println!("{}", serde_json::json!({ "saved": path.display().to_string() }));
    } else {
        println!("Token saved to {}", path.display());
    }
    Ok(())
}
