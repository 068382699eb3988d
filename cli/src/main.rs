mod commands;
mod config;
mod remote;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::process;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;

use crate::commands::{
    MealInput, ProfileUpdate, cmd_chat, cmd_goal_check, cmd_login, cmd_meal_add, cmd_meal_delete,
    cmd_meal_show, cmd_meals, cmd_plan_delete, cmd_plans, cmd_profile_set, cmd_profile_show,
    cmd_sync, cmd_targets_recalc, cmd_targets_show, cmd_water_add, cmd_water_show,
    cmd_weight_history, cmd_weight_log, cmd_workout_delete, cmd_workouts,
};
use crate::config::Config;
use crate::remote::HttpRemoteClient;
use ada_core::chat::ChatSession;
use ada_core::db::Database;
use ada_core::reconcile::ReconcilerConfig;
use ada_core::remote::RemoteClient;
use ada_core::session::{Session, shared};
use ada_core::sync::Syncer;

#[derive(Parser)]
#[command(
    name = "ada",
    version,
    about = "A local-first health tracker with an assistant that logs for you"
)]
struct Cli {
    /// Backend base URL
    #[arg(long, global = true, env = "ADA_API_URL", default_value = "http://localhost:8000")]
    api_url: String,
    /// API token (defaults to the one saved by `ada login`)
    #[arg(long, global = true, env = "ADA_TOKEN", hide_env_values = true)]
    token: Option<String>,
    /// Timeout for each backend request, in seconds
    #[arg(long, global = true, env = "ADA_TIMEOUT_SECS", default_value = "10")]
    timeout_secs: u64,
    /// Log debug output to stderr
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Talk to the assistant; anything it logs is stored locally
    Chat {
        /// Message to send (omit for an interactive conversation)
        message: Option<String>,
        /// Start a new conversation
        #[arg(long)]
        new: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Push locally created records to the backend
    Sync {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List meals for a day (defaults to today)
    Meals {
        /// Date (YYYY-MM-DD or today/yesterday/tomorrow)
        #[arg(long)]
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show, add or delete a meal
    Meal {
        #[command(subcommand)]
        command: MealCommands,
    },
    /// Track water intake
    Water {
        #[command(subcommand)]
        command: WaterCommands,
    },
    /// Track body weight
    Weight {
        #[command(subcommand)]
        command: WeightCommands,
    },
    /// List recent workouts
    Workouts {
        /// Number of workouts to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete a workout
    Workout {
        #[command(subcommand)]
        command: DeleteCommand,
    },
    /// List workout plans
    Plans {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete a workout plan
    Plan {
        #[command(subcommand)]
        command: DeleteCommand,
    },
    /// Show or edit your profile
    Profile {
        #[command(subcommand)]
        command: ProfileCommands,
    },
    /// Show or recompute your daily macro targets
    Targets {
        #[command(subcommand)]
        command: TargetCommands,
    },
    /// Check a weight-change goal against the safety guardrail
    Goal {
        #[command(subcommand)]
        command: GoalCommands,
    },
    /// Save the API token for later commands
    Login {
        /// API token issued by the backend
        token: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum MealCommands {
    /// Show a meal and its food items
    Show {
        /// Meal ID
        id: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Log a meal by hand (synced on the next `ada sync`)
    Add {
        /// Meal name
        name: String,
        /// Meal type: breakfast, lunch, dinner, snack, other
        #[arg(short, long, default_value = "snack")]
        meal: String,
        /// Calories
        #[arg(long)]
        calories: f64,
        /// Protein in grams
        #[arg(long, default_value = "0")]
        protein: f64,
        /// Carbs in grams
        #[arg(long, default_value = "0")]
        carbs: f64,
        /// Fat in grams
        #[arg(long, default_value = "0")]
        fat: f64,
        /// Portion size in grams
        #[arg(long, default_value = "100")]
        grams: f64,
        /// Optional notes
        #[arg(long)]
        notes: Option<String>,
        /// Date (YYYY-MM-DD or today/yesterday/tomorrow, default: today)
        #[arg(long)]
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete a meal (on the backend too, if it was synced)
    Delete {
        /// Meal ID
        id: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum WaterCommands {
    /// Log water in millilitres
    Add {
        /// Amount in ml
        amount_ml: i64,
        /// Date (YYYY-MM-DD or today/yesterday/tomorrow, default: today)
        #[arg(long)]
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show water logged on a day
    Show {
        /// Date (YYYY-MM-DD or today/yesterday/tomorrow, default: today)
        #[arg(long)]
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum WeightCommands {
    /// Log a weight entry
    Log {
        /// Weight value (number)
        value: f64,
        /// Unit: kg or lbs (default: kg)
        #[arg(short, long, default_value = "kg")]
        unit: String,
        /// Date (YYYY-MM-DD or today/yesterday/tomorrow, default: today)
        #[arg(long)]
        date: Option<String>,
        /// Optional notes
        #[arg(long)]
        notes: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show weight history
    History {
        /// Number of entries to show
        #[arg(short, long, default_value = "30")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum DeleteCommand {
    /// Delete by ID (on the backend too, if it was synced)
    Delete {
        /// Local ID
        id: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum ProfileCommands {
    /// Show your profile
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Update profile fields; targets are recomputed when possible
    Set {
        /// male or female
        #[arg(long)]
        sex: Option<String>,
        /// Birth date (YYYY-MM-DD)
        #[arg(long)]
        birth_date: Option<String>,
        /// Height in cm
        #[arg(long)]
        height: Option<f64>,
        /// Current weight in kg
        #[arg(long)]
        weight: Option<f64>,
        /// sedentary, light, moderate, active, very_active
        #[arg(long)]
        activity: Option<String>,
        /// cut, maintain or bulk
        #[arg(long)]
        goal: Option<String>,
        /// Goal rate in kg per week
        #[arg(long)]
        rate: Option<f64>,
        /// Target weight in kg
        #[arg(long)]
        target_weight: Option<f64>,
        /// balanced, high_protein, low_carb, keto, custom
        #[arg(long)]
        plan: Option<String>,
        /// Custom protein share (%)
        #[arg(long)]
        protein_pct: Option<f64>,
        /// Custom carbs share (%)
        #[arg(long)]
        carbs_pct: Option<f64>,
        /// Custom fat share (%)
        #[arg(long)]
        fat_pct: Option<f64>,
        /// Pin daily calories
        #[arg(long)]
        calories: Option<i64>,
        /// Pin daily protein (g)
        #[arg(long)]
        protein_g: Option<f64>,
        /// Pin daily carbs (g)
        #[arg(long)]
        carbs_g: Option<f64>,
        /// Pin daily fat (g)
        #[arg(long)]
        fat_g: Option<f64>,
        /// Remove all pinned values
        #[arg(long)]
        clear_overrides: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum TargetCommands {
    /// Show the current targets
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Recompute targets locally from your profile
    Recalc {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum GoalCommands {
    /// Validate a goal and rate without saving anything
    Check {
        /// cut, maintain or bulk
        goal: String,
        /// Rate in kg per week
        #[arg(default_value = "0")]
        rate: f64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::WARN
    };
    let env_var = if std::env::var_os("ADA_LOG").is_some() {
        "ADA_LOG"
    } else {
        EnvFilter::DEFAULT_ENV
    };
    let env_filter = EnvFilter::builder()
        .with_default_directive(default_level.into())
        .with_env_var(env_var)
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

/// The backend client, with the saved token used when none is given.
fn remote_client(
    cli_token: Option<String>,
    config: &Config,
    api_url: &str,
    timeout: Duration,
) -> Result<Arc<dyn RemoteClient>> {
    let token = match cli_token {
        Some(token) => Some(token),
        None => config.load_token()?,
    };
    if token.is_none() {
        tracing::debug!("no API token configured");
    }
    Ok(Arc::new(HttpRemoteClient::new(api_url, token, timeout)))
}

#[allow(clippy::too_many_lines)]
async fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;
    let db = Database::open(&config.db_path)?;
    let session = Session::load(&db)?;
    let user_id = session.user_id.clone();
    let timeout = Duration::from_secs(cli.timeout_secs);

    match cli.command {
        Commands::Chat { message, new, json } => {
            let remote = remote_client(cli.token, &config, &cli.api_url, timeout)?;
            let reconciler_config = ReconcilerConfig {
                fetch_timeout: timeout,
            };
            let chat = ChatSession::with_config(shared(db), remote, session, reconciler_config);
            cmd_chat(&chat, message, new, json).await
        }
        Commands::Sync { json } => {
            let remote = remote_client(cli.token, &config, &cli.api_url, timeout)?;
            let syncer = Syncer::new(shared(db), remote, timeout);
            cmd_sync(&syncer, &session, json).await
        }
        Commands::Meals { date, json } => cmd_meals(&db, &user_id, date, json),
        Commands::Meal { command } => match command {
            MealCommands::Show { id, json } => cmd_meal_show(&db, id, json),
            MealCommands::Add {
                name,
                meal,
                calories,
                protein,
                carbs,
                fat,
                grams,
                notes,
                date,
                json,
            } => {
                let input = MealInput {
                    name,
                    meal_type: meal,
                    calories,
                    protein,
                    carbs,
                    fat,
                    grams,
                    notes,
                    date,
                };
                cmd_meal_add(&db, &user_id, input, json)
            }
            MealCommands::Delete { id, json } => {
                let remote = remote_client(cli.token, &config, &cli.api_url, timeout)?;
                let syncer = Syncer::new(shared(db), remote, timeout);
                cmd_meal_delete(&syncer, id, json).await
            }
        },
        Commands::Water { command } => match command {
            WaterCommands::Add {
                amount_ml,
                date,
                json,
            } => cmd_water_add(&db, &user_id, amount_ml, date, json),
            WaterCommands::Show { date, json } => cmd_water_show(&db, &user_id, date, json),
        },
        Commands::Weight { command } => match command {
            WeightCommands::Log {
                value,
                unit,
                date,
                notes,
                json,
            } => cmd_weight_log(&db, &user_id, value, &unit, date, notes, json),
            WeightCommands::History { limit, json } => {
                cmd_weight_history(&db, &user_id, limit, json)
            }
        },
        Commands::Workouts { limit, json } => cmd_workouts(&db, &user_id, limit, json),
        Commands::Workout {
            command: DeleteCommand::Delete { id, json },
        } => {
            let remote = remote_client(cli.token, &config, &cli.api_url, timeout)?;
            let syncer = Syncer::new(shared(db), remote, timeout);
            cmd_workout_delete(&syncer, id, json).await
        }
        Commands::Plans { json } => cmd_plans(&db, &user_id, json),
        Commands::Plan {
            command: DeleteCommand::Delete { id, json },
        } => {
            let remote = remote_client(cli.token, &config, &cli.api_url, timeout)?;
            let syncer = Syncer::new(shared(db), remote, timeout);
            cmd_plan_delete(&syncer, id, json).await
        }
        Commands::Profile { command } => match command {
            ProfileCommands::Show { json } => cmd_profile_show(&db, &user_id, json),
            ProfileCommands::Set {
                sex,
                birth_date,
                height,
                weight,
                activity,
                goal,
                rate,
                target_weight,
                plan,
                protein_pct,
                carbs_pct,
                fat_pct,
                calories,
                protein_g,
                carbs_g,
                fat_g,
                clear_overrides,
                json,
            } => {
                let update = ProfileUpdate {
                    sex,
                    birth_date,
                    height_cm: height,
                    weight_kg: weight,
                    activity,
                    goal,
                    rate,
                    target_weight_kg: target_weight,
                    plan,
                    protein_pct,
                    carbs_pct,
                    fat_pct,
                    calories,
                    protein_g,
                    carbs_g,
                    fat_g,
                    clear_overrides,
                };
                cmd_profile_set(&db, &user_id, &update, json)
            }
        },
        Commands::Targets { command } => match command {
            TargetCommands::Show { json } => cmd_targets_show(&db, &user_id, json),
            TargetCommands::Recalc { json } => cmd_targets_recalc(&db, &user_id, json),
        },
        Commands::Goal {
            command: GoalCommands::Check { goal, rate, json },
        } => cmd_goal_check(&db, &user_id, &goal, rate, json),
        Commands::Login { token, json } => cmd_login(&config, &token, json),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_chat_with_globals() {
        let cli = Cli::try_parse_from([
            "ada",
            "chat",
            "I had oats",
            "--api-url",
            "http://example.test",
            "--timeout-secs",
            "3",
        ])
        .unwrap();
        assert_eq!(cli.api_url, "http://example.test");
        assert_eq!(cli.timeout_secs, 3);
        assert!(matches!(
            cli.command,
            Commands::Chat { message: Some(ref m), new: false, json: false } if m == "I had oats"
        ));
    }

    #[test]
    fn test_parse_goal_check() {
        let cli = Cli::try_parse_from(["ada", "goal", "check", "cut", "0.5", "--json"]).unwrap();
        match cli.command {
            Commands::Goal {
                command: GoalCommands::Check { goal, rate, json },
            } => {
                assert_eq!(goal, "cut");
                assert!((rate - 0.5).abs() < f64::EPSILON);
                assert!(json);
            }
            _ => panic!("expected goal check"),
        }
    }
}
