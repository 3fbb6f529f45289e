mod commands;
mod config;
mod openfoodfacts;
mod recipe_service;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::process;

use crate::commands::{
    App, PlanArgs, SyncArgs, cmd_enrich, cmd_plan, cmd_recipes_list, cmd_recipes_show, cmd_sync,
    cmd_test_connection,
};
use crate::config::{Config, Overrides};
use mealprep_core::remote::Credentials;
use mealprep_core::surface::Flag;

#[derive(Parser)]
#[command(
    name = "mealprep",
    version,
    about = "Sync recipes, enrich them with nutrition data, and plan a week of meals"
)]
struct Cli {
    /// Path to the local recipe database
    #[arg(long, global = true, env = "MEALPREP_DB")]
    db: Option<PathBuf>,
    /// Base URL of the recipe service API
    #[arg(long, global = true, env = "MEALPREP_API_BASE")]
    api_base: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct Login {
    /// Recipe service account (email)
    #[arg(short, long, env = "MEALPREP_USERNAME")]
    username: Option<String>,
    /// Recipe service password
    #[arg(short, long, env = "MEALPREP_PASSWORD", hide_env_values = true)]
    password: Option<String>,
}

impl Login {
    fn credentials(self) -> Result<Credentials> {
        let Some(username) = self.username else {
            bail!("No username given. Pass --username or set MEALPREP_USERNAME");
        };
        Ok(Credentials::new(username, self.password.unwrap_or_default()))
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Check the recipe service credentials without touching the local store
    TestConnection {
        #[command(flatten)]
        login: Login,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Pull recipes from the recipe service (or push local changes back)
    Sync {
        #[command(flatten)]
        login: Login,
        /// Upload locally modified recipes instead of pulling
        #[arg(long)]
        push: bool,
        /// Do not compute nutrition while pulling
        #[arg(long)]
        no_enrich: bool,
        /// Recompute nutrition for every recipe after the pull
        #[arg(long)]
        force: bool,
        /// Skip nutrition lookups (ingredients stay unresolved)
        #[arg(long)]
        offline: bool,
        /// Seconds between enrichment passes while the pull runs
        #[arg(long)]
        enrich_interval: Option<u64>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Compute nutrition for stored recipes that lack it
    Enrich {
        /// Recompute every recipe, not just those without nutrition data
        #[arg(long)]
        force: bool,
        /// Skip nutrition lookups (ingredients stay unresolved)
        #[arg(long)]
        offline: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Build a meal plan from the stored recipes and print it
    Plan {
        /// First day: monday-sunday or mon-sun (default: monday)
        start: Option<String>,
        /// Last day (default: sunday; before start means start only)
        end: Option<String>,
        /// Start the plan on today's weekday
        #[arg(long, conflicts_with = "start")]
        from_today: bool,
        /// Redraw one meal at random, e.g. "tue:dinner" (repeatable)
        #[arg(long, value_name = "DAY:MEAL")]
        reroll: Vec<String>,
        /// Put a specific recipe in a slot, e.g. "tue:dinner=UID" (repeatable)
        #[arg(long, value_name = "DAY:MEAL=UID")]
        set: Vec<String>,
        /// Pull from the recipe service first and wait for it to finish
        #[arg(long)]
        sync: bool,
        #[command(flatten)]
        login: Login,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Browse the local recipe store
    Recipes {
        #[command(subcommand)]
        command: RecipeCommands,
    },
}

#[derive(Subcommand)]
enum RecipeCommands {
    /// List stored recipes
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show one recipe
    Show {
        /// Recipe uid
        uid: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    // Agents call blocking capability methods from their own threads, so the
    // runtime is driven through a handle rather than from an async main.
    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    let enrich_interval_secs = match &cli.command {
        Commands::Sync {
            enrich_interval, ..
        } => *enrich_interval,
        _ => None,
    };
    let config = Config::load(Overrides {
        db_path: cli.db,
        api_base: cli.api_base,
        enrich_interval_secs,
    })?;
    let app = App::open(config, rt.handle().clone())?;

    let result = dispatch(&app, cli.command);
    app.surface.set(Flag::AppRunning, false);
    result
}

fn dispatch(app: &App, command: Commands) -> Result<()> {
    match command {
        Commands::TestConnection { login, json } => {
            cmd_test_connection(app, login.credentials()?, json)
        }
        Commands::Sync {
            login,
            push,
            no_enrich,
            force,
            offline,
            enrich_interval: _,
            json,
        } => cmd_sync(
            app,
            login.credentials()?,
            &SyncArgs {
                push,
                no_enrich,
                force,
                offline,
                json,
            },
        ),
        Commands::Enrich {
            force,
            offline,
            json,
        } => cmd_enrich(app, force, offline, json),
        Commands::Plan {
            start,
            end,
            from_today,
            reroll,
            set,
            sync,
            login,
            json,
        } => {
            let credentials = if sync {
                Some(login.credentials()?)
            } else {
                None
            };
            cmd_plan(
                app,
                credentials,
                PlanArgs {
                    start,
                    end,
                    from_today,
                    reroll,
                    set,
                    json,
                },
            )
        }
        Commands::Recipes { command } => match command {
            RecipeCommands::List { json } => cmd_recipes_list(&app.store, json),
            RecipeCommands::Show { uid, json } => cmd_recipes_show(&app.store, &uid, json),
        },
    }
}
