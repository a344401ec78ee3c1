pub mod output;
pub mod server;

use std::{env, path::PathBuf};

use anyhow::Result;
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::level_filters::LevelFilter;

use crate::{
    engine::{
        category,
        config::{AppSource, ConfigFileSource},
        goals::{GoalManager, GoalPeriod, GoalType},
        run_engine,
        store::{statistics, usage_store},
    },
    utils::{
        dir::create_application_default_path,
        logging::{enable_logging, CLI_PREFIX, DAEMON_PREFIX},
    },
};

#[derive(Parser, Debug)]
#[command(name = "Appwatch", version, long_about = None)]
#[command(about = "Usage tracking and goals for launcher applications", long_about = None)]
struct Args {
    #[command(subcommand)]
    commands: Commands,
    #[arg(long, help = "Enable verbose logging")]
    log: bool,
}

const DIR_HELP: &str =
    "Application directory. By default tries to save into $XDG_STATE_HOME or $HOME/.local/state";

#[derive(Subcommand, Debug)]
#[command(version, about, long_about = None)]
enum Commands {
    #[command(about = "Start a tracking daemon in the background")]
    Init {
        #[arg(long, help = DIR_HELP)]
        dir: Option<PathBuf>,
    },
    #[command(
        about = "Run the tracker directly in the current console. Used for creating a daemon internally and for debugging"
    )]
    Serve {
        #[arg(long, help = DIR_HELP)]
        dir: Option<PathBuf>,
    },
    #[command(about = "Stop a currently running daemon")]
    Stop {},
    #[command(about = "Display per-application usage statistics")]
    Stats {
        #[arg(long, default_value_t = 7, help = "Length of the reported window in days")]
        days: i64,
        #[arg(long, help = DIR_HELP)]
        dir: Option<PathBuf>,
    },
    #[command(about = "Display usage aggregated by application category")]
    Categories {
        #[arg(long, default_value_t = 7, help = "Length of the reported window in days")]
        days: i64,
        #[arg(long, help = DIR_HELP)]
        dir: Option<PathBuf>,
    },
    #[command(about = "Manage usage goals")]
    Goal {
        #[command(subcommand)]
        command: GoalCommands,
        #[arg(long, help = DIR_HELP)]
        dir: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum GoalTypeArg {
    /// Cap the time spent in the application.
    Max,
    /// Encourage a minimum amount of use.
    Min,
}

impl From<GoalTypeArg> for GoalType {
    fn from(value: GoalTypeArg) -> Self {
        match value {
            GoalTypeArg::Max => GoalType::MaxTime,
            GoalTypeArg::Min => GoalType::MinTime,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum GoalPeriodArg {
    Daily,
    Weekly,
    Monthly,
}

impl From<GoalPeriodArg> for GoalPeriod {
    fn from(value: GoalPeriodArg) -> Self {
        match value {
            GoalPeriodArg::Daily => GoalPeriod::Daily,
            GoalPeriodArg::Weekly => GoalPeriod::Weekly,
            GoalPeriodArg::Monthly => GoalPeriod::Monthly,
        }
    }
}

#[derive(Subcommand, Debug)]
enum GoalCommands {
    #[command(about = "Add a goal, overwriting any goal with the same app, type and period")]
    Add {
        #[arg(help = "Application or category name the goal applies to")]
        app: String,
        #[arg(value_enum, help = "Whether the limit is a cap or a floor")]
        goal_type: GoalTypeArg,
        #[arg(long, help = "Limit in seconds")]
        limit: f64,
        #[arg(long, value_enum, default_value_t = GoalPeriodArg::Daily)]
        period: GoalPeriodArg,
        #[arg(long, help = "Show the goal on the launcher's pinned list")]
        pinned: bool,
    },
    #[command(about = "Remove a goal by id")]
    Remove { id: String },
    #[command(about = "Enable or disable a goal by id")]
    Toggle { id: String },
    #[command(about = "Remove every goal referencing an application")]
    Clear { app: String },
    #[command(about = "List goals with their current progress")]
    List {
        #[arg(long, help = "Only show pinned goals")]
        pinned: bool,
        #[arg(long, help = "Hide goals that already reached 100%")]
        hide_completed: bool,
    },
}

pub async fn run_cli() -> Result<()> {
    let args = Args::parse();

    let logging_level = if args.log {
        Some(LevelFilter::TRACE)
    } else {
        None
    };

    match args.commands {
        Commands::Init { dir } => {
            server::restart_server(dir.as_deref())?;
            Ok(())
        }
        Commands::Stop {} => {
            let process_name = env::current_exe().expect("Can't operate without an executable");
            server::kill_previous_servers(&process_name);
            Ok(())
        }
        Commands::Serve { dir } => {
            let dir = resolve_dir(dir)?;
            enable_logging(DAEMON_PREFIX, &dir, logging_level, args.log)?;
            run_engine(dir).await
        }
        Commands::Stats { days, dir } => {
            let dir = resolve_dir(dir)?;
            enable_logging(CLI_PREFIX, &dir, logging_level, args.log)?;
            let document = usage_store(&dir).load().await;
            let stats = statistics(&document, days, Utc::now());
            output::print_statistics(&stats, days);
            Ok(())
        }
        Commands::Categories { days, dir } => {
            let dir = resolve_dir(dir)?;
            enable_logging(CLI_PREFIX, &dir, logging_level, args.log)?;
            let document = usage_store(&dir).load().await;
            let stats = statistics(&document, days, Utc::now());
            let apps = ConfigFileSource::new(&dir).applications();
            output::print_categories(&category::category_usage(&stats, &apps), days);
            Ok(())
        }
        Commands::Goal { command, dir } => {
            let dir = resolve_dir(dir)?;
            enable_logging(CLI_PREFIX, &dir, logging_level, args.log)?;
            process_goal_command(command, dir).await
        }
    }
}

fn resolve_dir(dir: Option<PathBuf>) -> Result<PathBuf> {
    dir.map_or_else(create_application_default_path, Ok)
}

async fn process_goal_command(command: GoalCommands, dir: PathBuf) -> Result<()> {
    let manager = GoalManager::load(&dir).await;

    match command {
        GoalCommands::Add {
            app,
            goal_type,
            limit,
            period,
            pinned,
        } => {
            let id = manager
                .add_goal(&app, goal_type.into(), limit, period.into(), pinned, Utc::now())
                .await?;
            println!("Added goal {id}");
        }
        GoalCommands::Remove { id } => {
            if manager.remove_goal(&id).await? {
                println!("Removed goal {id}");
            } else {
                println!("No goal with id {id}");
            }
        }
        GoalCommands::Toggle { id } => match manager.toggle_goal(&id).await? {
            Some(true) => println!("Enabled goal {id}"),
            Some(false) => println!("Disabled goal {id}"),
            None => println!("No goal with id {id}"),
        },
        GoalCommands::Clear { app } => {
            let removed = manager.remove_goals_for_app(&app).await?;
            println!("Removed {removed} goal(s) for {app}");
        }
        GoalCommands::List {
            pinned,
            hide_completed,
        } => {
            let document = usage_store(&dir).load().await;
            let apps = ConfigFileSource::new(&dir).applications();
            let now = Utc::now();

            if pinned {
                for entry in manager.pinned_goals(hide_completed, &document, &apps, now) {
                    output::print_goal(&entry.goal_id, &entry.goal, Some(&entry.progress));
                }
            } else {
                let mut goals = manager.goals().into_iter().collect::<Vec<_>>();
                goals.sort_by(|a, b| a.0.cmp(&b.0));
                for (id, goal) in goals {
                    let progress = manager.goal_progress(&id, &document, &apps, now);
                    if hide_completed
                        && progress.as_ref().is_some_and(|p| p.percentage >= 100.)
                    {
                        continue;
                    }
                    output::print_goal(&id, &goal, progress.as_ref());
                }
            }
        }
    }
    Ok(())
}
