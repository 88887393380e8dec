mod commands;
mod config;
mod gemini;
mod server;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use crate::commands::{
    ProfileUpdate, active_user, cmd_food_add, cmd_food_list, cmd_goals, cmd_history, cmd_log,
    cmd_models, cmd_profile_set, cmd_profile_show, cmd_summary, cmd_undo, cmd_user_add,
    cmd_user_list, cmd_water_add, cmd_water_show, cmd_weight_history, cmd_weight_log,
};
use crate::config::Config;
use crate::gemini::GeminiClient;
use platelog_core::analyzer::MealAnalyzer;
use platelog_core::service::NutritionService;

#[derive(Parser)]
#[command(
    name = "platelog",
    version,
    about = "A personal nutrition tracker with AI meal logging",
    long_about = "Describe or photograph a meal and let Gemini estimate calories and macros.\n\
                  Tracks food, water and weight per user against targets derived from your profile."
)]
struct Cli {
    /// User to act as (registered on first use)
    #[arg(long, global = true, env = "PLATELOG_USER")]
    user: Option<String>,
    /// Log debug output to stderr
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage users
    User {
        #[command(subcommand)]
        command: UserCommands,
    },
    /// Show or update the body profile
    Profile {
        #[command(subcommand)]
        command: ProfileCommands,
    },
    /// Show daily targets derived from the profile
    Goals {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Log a meal from a description and/or photo using Gemini
    Log {
        /// What you ate (e.g. "two eggs and toast")
        description: Option<String>,
        /// Photo of the meal (jpg, png, webp, heic)
        #[arg(short, long, value_name = "PATH")]
        image: Option<PathBuf>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Remove the last meal logged on a date
    Undo {
        /// Date (YYYY-MM-DD or today/yesterday, default: today)
        #[arg(long)]
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List food entries or add one by hand
    Food {
        #[command(subcommand)]
        command: FoodCommands,
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
    /// Show the daily dashboard (defaults to today)
    Summary {
        /// Date to show (YYYY-MM-DD, default: today)
        date: Option<String>,
        /// Calories burned by exercise, counted towards the burn target
        #[arg(long)]
        burned: Option<i64>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show per-day totals for the last N days
    History {
        /// Number of days to show
        #[arg(short, long, default_value = "7", value_parser = clap::value_parser!(u32).range(1..=366))]
        days: u32,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List Gemini models available to the configured API key
    Models {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Start the REST API server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "8080")]
        port: u16,
        /// Address to bind to (default: 127.0.0.1, use 0.0.0.0 to expose to network)
        #[arg(short, long, default_value = "127.0.0.1")]
        bind: String,
        /// Disable API key authentication (for development/testing)
        #[arg(long)]
        no_auth: bool,
    },
}

#[derive(Subcommand)]
enum UserCommands {
    /// Register a user
    Add {
        /// Display name
        name: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List registered users
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum ProfileCommands {
    /// Show the stored profile
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Update profile fields; anything omitted keeps its current value
    Set {
        /// Current weight in kg
        #[arg(long)]
        weight: Option<f64>,
        /// Goal weight in kg
        #[arg(long)]
        goal_weight: Option<f64>,
        /// Height in cm
        #[arg(long)]
        height: Option<f64>,
        /// Age in years
        #[arg(long)]
        age: Option<u32>,
        /// male or female
        #[arg(long)]
        gender: Option<String>,
        /// recomposition, bulk or cut
        #[arg(long)]
        goal: Option<String>,
        /// Activity multiplier (1.2 sedentary to 1.9 very active)
        #[arg(long)]
        activity: Option<f64>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum FoodCommands {
    /// Log food with known nutrition values
    Add {
        /// Food name
        name: String,
        /// Calories (kcal)
        #[arg(long)]
        calories: f64,
        /// Protein in grams
        #[arg(long)]
        protein: Option<f64>,
        /// Carbs in grams
        #[arg(long)]
        carbs: Option<f64>,
        /// Fat in grams
        #[arg(long)]
        fat: Option<f64>,
        /// Meal slot: breakfast, lunch, snack, dinner, other (default: from the time)
        #[arg(short, long)]
        meal: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List food entries for a date
    List {
        /// Date (YYYY-MM-DD or today/yesterday, default: today)
        #[arg(long)]
        date: Option<String>,
        /// List every entry regardless of date
        #[arg(long, conflicts_with = "date")]
        all: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum WaterCommands {
    /// Log water intake
    Add {
        /// Volume in ml
        ml: f64,
        /// Date (YYYY-MM-DD or today/yesterday, default: today)
        #[arg(long)]
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show water total for a date
    Show {
        /// Date (YYYY-MM-DD or today/yesterday, default: today)
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum WeightCommands {
    /// Log a weight entry (replaces any entry on the same date)
    Log {
        /// Weight value (number)
        value: f64,
        /// Unit: kg or lbs (default: kg)
        #[arg(short, long, default_value = "kg")]
        unit: String,
        /// Date (YYYY-MM-DD or today/yesterday/tomorrow, default: today)
        #[arg(long)]
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show weight history, newest first
    History {
        /// Number of entries to show (default: all)
        #[arg(short, long)]
        limit: Option<usize>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn init_logging(verbose: bool, serving: bool) {
    let default = match (verbose, serving) {
        (true, _) => "debug",
        (false, true) => "info,platelog=debug,platelog_core=debug",
        (false, false) => "warn",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose, matches!(cli.command, Commands::Serve { .. }));

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

#[allow(clippy::too_many_lines)]
async fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;
    debug!(?config, "loaded configuration");
    let svc = NutritionService::new(&config.data_dir, Arc::new(config.clock()))?;
    let user = cli.user.as_deref();

    match cli.command {
        Commands::User { command } => match command {
            UserCommands::Add { name, json } => cmd_user_add(&svc, &name, json),
            UserCommands::List { json } => cmd_user_list(&svc, json),
        },
        Commands::Profile { command } => {
            let user = active_user(&svc, user)?;
            match command {
                ProfileCommands::Show { json } => cmd_profile_show(&svc, &user, json),
                ProfileCommands::Set {
                    weight,
                    goal_weight,
                    height,
                    age,
                    gender,
                    goal,
                    activity,
                    json,
                } => {
                    let update = ProfileUpdate {
                        weight_kg: weight,
                        goal_weight_kg: goal_weight,
                        height_cm: height,
                        age,
                        gender,
                        goal,
                        activity_factor: activity,
                    };
                    cmd_profile_set(&svc, &user, update, json)
                }
            }
        }
        Commands::Goals { json } => cmd_goals(&svc, &active_user(&svc, user)?, json),
        Commands::Log {
            description,
            image,
            json,
        } => {
            let user = active_user(&svc, user)?;
            cmd_log(&svc, &config, &user, description, image.as_deref(), json)
        }
        Commands::Undo { date, json } => {
            cmd_undo(&svc, &active_user(&svc, user)?, date.as_deref(), json)
        }
        Commands::Food { command } => {
            let user = active_user(&svc, user)?;
            match command {
                FoodCommands::Add {
                    name,
                    calories,
                    protein,
                    carbs,
                    fat,
                    meal,
                    json,
                } => cmd_food_add(
                    &svc,
                    &user,
                    &name,
                    calories,
                    protein,
                    carbs,
                    fat,
                    meal.as_deref(),
                    json,
                ),
                FoodCommands::List { date, all, json } => {
                    cmd_food_list(&svc, &user, date.as_deref(), all, json)
                }
            }
        }
        Commands::Water { command } => {
            let user = active_user(&svc, user)?;
            match command {
                WaterCommands::Add { ml, date, json } => {
                    cmd_water_add(&svc, &user, ml, date.as_deref(), json)
                }
                WaterCommands::Show { date, json } => {
                    cmd_water_show(&svc, &user, date.as_deref(), json)
                }
            }
        }
        Commands::Weight { command } => {
            let user = active_user(&svc, user)?;
            match command {
                WeightCommands::Log {
                    value,
                    unit,
                    date,
                    json,
                } => cmd_weight_log(&svc, &user, value, &unit, date.as_deref(), json),
                WeightCommands::History { limit, json } => {
                    cmd_weight_history(&svc, &user, limit, json)
                }
            }
        }
        Commands::Summary { date, burned, json } => {
            let user = active_user(&svc, user)?;
            cmd_summary(&svc, &user, date.as_deref(), burned, json)
        }
        Commands::History { days, json } => {
            cmd_history(&svc, &active_user(&svc, user)?, days, json)
        }
        Commands::Models { json } => cmd_models(&config, json).await,
        Commands::Serve {
            port,
            bind,
            no_auth,
        } => {
            let api_key = if no_auth {
                None
            } else {
                let (key, new) = config.load_or_create_api_key()?;
                debug!(new, "server API key ready");
                Some(key)
            };
            let analyzer: Option<Arc<dyn MealAnalyzer>> = match config.gemini_api_key() {
                Ok(key) => Some(Arc::new(GeminiClient::new(
                    key,
                    &config.model,
                    config.ai_timeout,
                )?)),
                Err(_) => None,
            };
            server::start_server(svc, analyzer, port, &bind, api_key).await
        }
    }
}
