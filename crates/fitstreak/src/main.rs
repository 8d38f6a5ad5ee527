//! fitstreak - engagement streak engine command-line front end
//!
//! Wires together:
//! - Configuration loading
//! - Store initialization
//! - Notifier (structured log output)
//! - Streak engine

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use fitstreak_api::{StreakSnapshot, WorkoutEvent};
use fitstreak_config::{StreakPolicy, load_config};
use fitstreak_core::{NotificationStatus, StreakEngine, StreakTransition, WorkoutOutcome};
use fitstreak_notify::LogNotifier;
use fitstreak_store::{SqliteStore, Store};
use fitstreak_util::{
    Clock, DATABASE_FILENAME, FITSTREAK_DATA_DIR_ENV, SystemClock, UserId, WorkoutId,
    default_config_path, is_mock_time_active,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// fitstreak - workout streaks, badges and reminders
#[derive(Parser, Debug)]
#[command(name = "fitstreak", version)]
#[command(about = "Workout streak tracking: streaks, weekly goals and milestone badges", long_about = None)]
struct Args {
    /// Configuration file path (default: ~/.config/fitstreak/config.toml)
    #[arg(short, long, default_value_os_t = default_config_path())]
    config: PathBuf,

    /// Data directory override (or set FITSTREAK_DATA_DIR env var)
    #[arg(short, long, env = FITSTREAK_DATA_DIR_ENV)]
    data_dir: Option<PathBuf>,

    /// Log level
    #[arg(short, long, default_value = "warn")]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Log a workout and update the streak
    Log {
        user: String,

        /// When the workout happened (RFC 3339); defaults to now
        #[arg(long)]
        at: Option<String>,
    },

    /// Show the current streak
    Status {
        user: String,

        #[arg(long)]
        json: bool,
    },

    /// List logged workouts
    History { user: String },

    /// Rebuild the streak from the full workout history
    Recompute { user: String },

    /// Delete a logged workout and recompute
    Delete { user: String, workout_id: String },

    /// Refresh all users, sending broken-streak and at-risk notifications
    Sweep {
        #[arg(long)]
        json: bool,
    },

    /// Show recent audit events
    Audit {
        #[arg(short = 'n', long, default_value_t = 20)]
        limit: usize,
    },
}

fn init_logging(args: &Args) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    if args.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .init();
    }
}

fn load_policy(args: &Args) -> Result<StreakPolicy> {
    if !args.config.exists() {
        debug!(config_path = %args.config.display(), "No config file, using defaults");
        return Ok(StreakPolicy::default());
    }

    let policy = load_config(&args.config)
        .with_context(|| format!("Failed to load config from {:?}", args.config))?;

    info!(
        config_path = %args.config.display(),
        weekly_goal = policy.weekly_goal,
        milestones = ?policy.thresholds(),
        "Configuration loaded"
    );

    Ok(policy)
}

fn open_engine(args: &Args, policy: &StreakPolicy) -> Result<(StreakEngine, Arc<dyn Store>)> {
    let data_dir = args
        .data_dir
        .clone()
        .unwrap_or_else(|| policy.storage.data_dir.clone());

    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("Failed to create data directory {:?}", data_dir))?;

    let db_path = data_dir.join(DATABASE_FILENAME);
    let store: Arc<dyn Store> = Arc::new(
        SqliteStore::open(&db_path)
            .with_context(|| format!("Failed to open database {:?}", db_path))?,
    );
    debug!(db_path = %db_path.display(), "Store initialized");

    if is_mock_time_active() {
        warn!("Mock time is active; streaks are computed against a shifted clock");
    }

    let engine = StreakEngine::new(
        policy,
        store.clone(),
        Arc::new(LogNotifier::new()),
        Arc::new(SystemClock),
    )?;

    Ok((engine, store))
}

fn print_snapshot(user: &UserId, snapshot: &StreakSnapshot) {
    println!("{}", user);
    println!("  Current streak: {} days", snapshot.current_streak);
    println!("  Longest streak: {} days", snapshot.longest_streak);
    match snapshot.last_workout_date {
        Some(day) => println!("  Last workout:   {}", day),
        None => println!("  Last workout:   never"),
    }
    println!(
        "  This week:      {}/{} days ({}%){}",
        snapshot.weekly_progress,
        snapshot.weekly_goal,
        snapshot.weekly_progress_percent(),
        if snapshot.weekly_goal_met() { ", goal met" } else { "" }
    );
    println!(
        "  Next milestone: {} days ({} to go)",
        snapshot.next_milestone,
        snapshot.days_to_next_milestone()
    );
}

fn print_outcome(event: &WorkoutEvent, outcome: &WorkoutOutcome) {
    println!("Logged workout {} at {}", event.id, event.timestamp.to_rfc3339());

    match outcome.transition {
        StreakTransition::Started => println!("Streak started!"),
        StreakTransition::Restarted => println!("New streak started."),
        StreakTransition::Extended => {
            println!("Streak extended to {} days.", outcome.snapshot.current_streak)
        }
        StreakTransition::Broken | StreakTransition::Unchanged => {}
    }

    if let Some(badge) = &outcome.triggered_badge {
        println!("Badge earned: {}", badge);
    }
    if let NotificationStatus::Failed { kind, error } = &outcome.notification {
        eprintln!("Warning: {} notification not delivered: {}", kind, error);
    }

    println!();
    print_snapshot(&event.user_id, &outcome.snapshot);
}

fn run(args: Args) -> Result<()> {
    let policy = load_policy(&args)?;
    let (engine, store) = open_engine(&args, &policy)?;

    match args.command {
        Command::Log { user, at } => {
            let event = match at {
                Some(ts) => WorkoutEvent::parse(&user, &ts)?,
                None => {
                    let event = WorkoutEvent::new(user, SystemClock.now());
                    event.validate()?;
                    event
                }
            };
            let outcome = engine.record_workout(&event)?;
            print_outcome(&event, &outcome);
        }

        Command::Status { user, json } => {
            let user = UserId::new(user);
            let outcome = engine.refresh(&user)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
            } else {
                print_snapshot(&user, &outcome.snapshot);
            }
        }

        Command::History { user } => {
            let user = UserId::new(user);
            let events = store.list_workout_events(&user)?;
            if events.is_empty() {
                println!("No workouts logged for {}", user);
            }
            let calendar = engine.calculator().calendar();
            for event in events {
                println!(
                    "{}  {}  {}",
                    calendar.day_of(event.timestamp),
                    event.timestamp.to_rfc3339(),
                    event.id
                );
            }
        }

        Command::Recompute { user } => {
            let user = UserId::new(user);
            let snapshot = engine.recompute(&user)?;
            print_snapshot(&user, &snapshot);
        }

        Command::Delete { user, workout_id } => {
            let user = UserId::new(user);
            let Some(id) = WorkoutId::parse(&workout_id) else {
                bail!("'{}' is not a workout id", workout_id);
            };
            let snapshot = engine.delete_workout(&user, &id)?;
            println!("Deleted workout {}", id);
            println!();
            print_snapshot(&user, &snapshot);
        }

        Command::Sweep { json } => {
            let report = engine.sweep()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!(
                    "Checked {} users: {} reminded, {} broken, {} failed",
                    report.checked,
                    report.reminded,
                    report.broken,
                    report.failures.len()
                );
                for failure in &report.failures {
                    println!("  {}: {}", failure.user_id, failure.error);
                }
            }
        }

        Command::Audit { limit } => {
            for event in store.get_recent_audits(limit)? {
                println!(
                    "{:>6}  {}  {}",
                    event.id,
                    event.timestamp.to_rfc3339(),
                    serde_json::to_string(&event.event)?
                );
            }
        }
    }

    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args);

    debug!(version = env!("CARGO_PKG_VERSION"), "fitstreak starting");

    run(args)
}
