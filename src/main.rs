use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use secrecy::SecretString;

use cadence_core::{Frequency, HabitId};
use cadence_engine::{spawn_scheduler, LocalHabits, SyncEngine};
use cadence_remote::{CompletionService, HttpRemote};
use cadence_store::Database;

#[derive(Parser)]
#[command(name = "cadence", about = "Offline-first habit tracker")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create a habit (offline; sync pushes it to the server)
    Add {
        title: String,
        #[arg(short, long, default_value = "daily")]
        frequency: Frequency,
        #[arg(short, long = "tag", required = true)]
        tags: Vec<String>,
    },
    /// List cached habits with streaks
    List,
    /// Edit a habit's title, frequency, and tags
    Edit {
        id: String,
        title: String,
        #[arg(short, long, default_value = "daily")]
        frequency: Frequency,
        #[arg(short, long = "tag", required = true)]
        tags: Vec<String>,
    },
    /// Delete a habit
    Rm { id: String },
    /// Mark a habit completed (or not) for a period
    Done {
        id: String,
        /// Date inside the period, YYYY-MM-DD; defaults to today
        #[arg(short, long)]
        date: Option<chrono::NaiveDate>,
        #[arg(long)]
        undo: bool,
    },
    /// Run one reconciliation pass against the remote store
    Sync,
    /// Show week/month completion stats for a habit
    Stats { id: i64 },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();

    let db_path = data_dir().join("cadence.db");
    let db = Database::open(&db_path).context("failed to open local cache")?;
    let local = LocalHabits::new(db.clone());

    match cli.command {
        Command::Add { title, frequency, tags } => {
            let habit = local.create(&title, frequency, tags)?;
            println!("added \"{}\" ({}); saved offline, run `cadence sync`", habit.title, habit.id);
        }
        Command::List => {
            let habits = local.list()?;
            if habits.is_empty() {
                println!("no habits yet");
            }
            for h in habits.iter().filter(|h| !h.deleted) {
                let mark = if h.completed_today { "x" } else { " " };
                println!(
                    "[{mark}] {:<30} {:<8} streak {:>3}  {}",
                    h.title,
                    h.frequency.to_string(),
                    h.streak_count,
                    h.id
                );
            }
        }
        Command::Edit { id, title, frequency, tags } => {
            let habit = local.edit(&parse_id(&id), &title, frequency, tags)?;
            println!("edited \"{}\"; will sync on next pass", habit.title);
        }
        Command::Rm { id } => {
            local.remove(&parse_id(&id))?;
            println!("removed; will sync on next pass");
        }
        Command::Done { id, date, undo } => {
            let date = date.unwrap_or_else(|| chrono::Local::now().date_naive());
            let key = local.set_completed(&parse_id(&id), date, !undo)?;
            println!("recorded {} for period {key}; saved offline", if undo { "undo" } else { "done" });
        }
        Command::Sync => {
            let engine = Arc::new(SyncEngine::new(db, remote()?));
            let (trigger, handle) = spawn_scheduler(engine);
            trigger.trigger();
            drop(trigger);
            handle.await.context("sync task panicked")?;
        }
        Command::Stats { id } => {
            let stats = remote()?.stats(id).await?;
            println!("{} ({})", stats.habit.title, stats.habit.frequency);
            println!("streak: {}  total: {}", stats.habit.streak_count, stats.habit.total_completions);
            println!("this week:");
            for cell in &stats.week {
                println!("  {} {}", cell.date, if cell.completed { "done" } else { "-" });
            }
            println!("this month:");
            for cell in &stats.month {
                println!("  {} {}", cell.date, if cell.completed { "done" } else { "-" });
            }
        }
    }

    Ok(())
}

fn remote() -> anyhow::Result<Arc<HttpRemote>> {
    let base_url =
        std::env::var("CADENCE_API_URL").unwrap_or_else(|_| "http://localhost:3000".to_string());
    let token = std::env::var("CADENCE_TOKEN").ok().map(SecretString::from);
    Ok(Arc::new(HttpRemote::new(base_url, token)))
}

fn parse_id(raw: &str) -> HabitId {
    match raw.parse::<i64>() {
        Ok(n) => HabitId::Remote(n),
        Err(_) => HabitId::Offline(raw.to_string()),
    }
}

fn data_dir() -> PathBuf {
    std::env::var("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/tmp"))
        .join(".cadence")
}
