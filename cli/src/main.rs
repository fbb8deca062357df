mod commands;
mod config;
mod llm;
mod server;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::commands::{
    cmd_goals_set, cmd_goals_show, cmd_log_add, cmd_log_remove, cmd_log_show, cmd_log_week,
    cmd_meal_add, cmd_meal_delete, cmd_meal_favorite, cmd_meal_list, cmd_save_suggestion,
    cmd_suggest, cmd_user_add,
};
use crate::config::{Config, LlmConfig};
use crate::llm::generators_from_config;
use macrolog_core::models::{MacroNeeds, NewMeal, NewUserGoal};
use macrolog_core::service::MacroService;

#[derive(Parser)]
#[command(
    name = "macrolog",
    version,
    about = "Track meals and macros, with AI meal suggestions"
)]
struct Cli {
    /// Path to the SQLite database (default: platform data directory)
    #[arg(long, global = true, env = "MACROLOG_DB", value_name = "PATH")]
    db: Option<PathBuf>,
    /// User to act as for local commands
    #[arg(short, long, global = true, env = "MACROLOG_USER", default_value = "demo")]
    user: String,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the REST API server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "8080")]
        port: u16,
        /// Address to bind to (default: 127.0.0.1, use 0.0.0.0 to expose to network)
        #[arg(short, long, default_value = "127.0.0.1")]
        bind: String,
        /// Keep all data in memory; nothing survives a restart
        #[arg(long)]
        memory: bool,
        /// Seed a demo user (demo/demo) with goals, meals and today's log
        #[arg(long)]
        demo: bool,
        #[command(flatten)]
        llm: LlmConfig,
    },
    /// Manage users
    User {
        #[command(subcommand)]
        command: UserCommands,
    },
    /// Manage daily macro goals
    Goals {
        #[command(subcommand)]
        command: GoalCommands,
    },
    /// Manage saved meals
    Meal {
        #[command(subcommand)]
        command: MealCommands,
    },
    /// View and edit the daily log
    Log {
        #[command(subcommand)]
        command: LogCommands,
    },
    /// Ask for an AI meal suggestion (falls back to a built-in meal)
    Suggest {
        /// What you feel like eating
        prompt: String,
        /// Target protein in grams
        #[arg(long)]
        protein: Option<f64>,
        /// Target carbs in grams
        #[arg(long)]
        carbs: Option<f64>,
        /// Target fat in grams
        #[arg(long)]
        fat: Option<f64>,
        /// Save the suggestion as a meal
        #[arg(long)]
        save: bool,
        #[command(flatten)]
        llm: LlmConfig,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum UserCommands {
    /// Create a user
    Add {
        /// Username
        username: String,
        /// Password
        #[arg(long, env = "MACROLOG_PASSWORD", hide_env_values = true)]
        password: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum GoalCommands {
    /// Set daily macro goals in grams (calories are derived)
    Set {
        #[arg(long)]
        protein: i64,
        #[arg(long)]
        carbs: i64,
        #[arg(long)]
        fat: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show daily macro goals
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum MealCommands {
    /// Add a meal
    Add {
        /// Meal name
        name: String,
        /// Protein in grams
        #[arg(long)]
        protein: f64,
        /// Carbs in grams
        #[arg(long)]
        carbs: f64,
        /// Fat in grams
        #[arg(long)]
        fat: f64,
        /// Calories (default: 4/4/9 per gram of protein/carbs/fat)
        #[arg(long)]
        calories: Option<f64>,
        /// Meal type: breakfast, lunch, dinner, snack, other
        #[arg(short = 't', long = "type", default_value = "other")]
        meal_type: String,
        /// Mark as favorite
        #[arg(long)]
        favorite: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List meals
    List {
        /// Filter by name
        #[arg(short, long)]
        search: Option<String>,
        /// Only favorites
        #[arg(long)]
        favorites: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Toggle a meal's favorite flag
    Favorite {
        /// Meal ID
        id: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete a meal
    Delete {
        /// Meal ID
        id: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Save a stored AI suggestion as a meal
    FromAi {
        /// AI meal request ID
        request_id: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum LogCommands {
    /// Show the log for a day (default: today)
    Show {
        /// Date (YYYY-MM-DD or today/yesterday/tomorrow)
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Log a saved meal
    Add {
        /// Meal ID
        meal_id: i64,
        /// Date (YYYY-MM-DD or today/yesterday/tomorrow, default: today)
        #[arg(long)]
        date: Option<String>,
        /// Time eaten (HH:MM, default: now)
        #[arg(long)]
        time: Option<String>,
        /// Number of servings
        #[arg(short, long, default_value = "1")]
        servings: f64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Remove an entry by its position in the day's log
    Remove {
        /// Date (YYYY-MM-DD or today/yesterday/tomorrow)
        date: String,
        /// Entry index as shown by `log show`
        index: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Per-day totals and averages for a range
    Week {
        /// Last day of the range (default: today)
        #[arg(long)]
        end: Option<String>,
        /// Number of days
        #[arg(short, long, default_value = "7")]
        days: u32,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn init_tracing(default_filter: &str) {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()))
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

fn macro_needs(protein: Option<f64>, carbs: Option<f64>, fat: Option<f64>) -> Option<MacroNeeds> {
    if protein.is_none() && carbs.is_none() && fat.is_none() {
        return None;
    }
    Some(MacroNeeds {
        protein: protein.unwrap_or(0.0),
        carbs: carbs.unwrap_or(0.0),
        fat: fat.unwrap_or(0.0),
    })
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

fn open_service(db: Option<PathBuf>) -> Result<MacroService> {
    let config = Config::load(db)?;
    info!(path = %config.db_path.display(), "Opening database");
    MacroService::open(&config.db_path)
}

#[allow(clippy::too_many_lines)]
async fn run(cli: Cli) -> Result<()> {
    if matches!(cli.command, Commands::Serve { .. }) {
        init_tracing("macrolog=info,macrolog_core=info,tower_http=info");
    } else {
        init_tracing("warn");
    }
    let user = cli.user.as_str();

    match cli.command {
        Commands::Serve {
            port,
            bind,
            memory,
            demo,
            llm,
        } => {
            let service = if memory {
                MacroService::new_in_memory()?
            } else {
                open_service(cli.db)?
            };
            if demo {
                let user = service.db().seed_demo()?;
                info!(user = %user.username, "Demo data ready");
            }
            let generators = generators_from_config(&llm)?;
            server::start_server(service, generators, port, &bind).await
        }
        Commands::User { command } => {
            let svc = open_service(cli.db)?;
            match command {
                UserCommands::Add {
                    username,
                    password,
                    json,
                } => cmd_user_add(&svc, &username, &password, json),
            }
        }
        Commands::Goals { command } => {
            let svc = open_service(cli.db)?;
            match command {
                GoalCommands::Set {
                    protein,
                    carbs,
                    fat,
                    json,
                } => {
                    let goal = NewUserGoal {
                        protein_goal: protein,
                        carbs_goal: carbs,
                        fat_goal: fat,
                    };
                    cmd_goals_set(&svc, user, &goal, json)
                }
                GoalCommands::Show { json } => cmd_goals_show(&svc, user, json),
            }
        }
        Commands::Meal { command } => {
            let svc = open_service(cli.db)?;
            match command {
                MealCommands::Add {
                    name,
                    protein,
                    carbs,
                    fat,
                    calories,
                    meal_type,
                    favorite,
                    json,
                } => {
                    let meal = NewMeal {
                        name,
                        protein,
                        carbs,
                        fat,
                        calories,
                        meal_type,
                        is_ai_generated: false,
                        is_favorite: favorite,
                        image_url: None,
                    };
                    cmd_meal_add(&svc, user, &meal, json)
                }
                MealCommands::List {
                    search,
                    favorites,
                    json,
                } => cmd_meal_list(&svc, user, search.as_deref(), favorites, json),
                MealCommands::Favorite { id, json } => cmd_meal_favorite(&svc, user, id, json),
                MealCommands::Delete { id, json } => cmd_meal_delete(&svc, user, id, json),
                MealCommands::FromAi { request_id, json } => {
                    cmd_save_suggestion(&svc, user, request_id, json)
                }
            }
        }
        Commands::Log { command } => {
            let svc = open_service(cli.db)?;
            match command {
                LogCommands::Show { date, json } => cmd_log_show(&svc, user, date, json),
                LogCommands::Add {
                    meal_id,
                    date,
                    time,
                    servings,
                    json,
                } => cmd_log_add(&svc, user, meal_id, date, time, servings, json),
                LogCommands::Remove { date, index, json } => {
                    cmd_log_remove(&svc, user, Some(date), index, json)
                }
                LogCommands::Week { end, days, json } => {
                    cmd_log_week(&svc, user, end, days, json)
                }
            }
        }
        Commands::Suggest {
            prompt,
            protein,
            carbs,
            fat,
            save,
            llm,
            json,
        } => {
            let svc = open_service(cli.db)?;
            let generators = generators_from_config(&llm)?;
            let needs = macro_needs(protein, carbs, fat);
            cmd_suggest(&svc, user, &generators, &prompt, needs, save, json).await
        }
    }
}
