//! oxide-dbsync CLI
//!
//! Command-line tool for bringing a database in line with a grain score.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use oxide_dbsync::catalog::GRAINS_TABLE;
use oxide_dbsync::prelude::*;
use oxide_score::grain::SYSTEM_GRAIN;
use oxide_score::score::Score;

/// Reconciles a live database with a grain score.
#[derive(Parser)]
#[command(name = "oxide-dbsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Database URL (SQLite path or connection string).
    #[arg(short, long, env = "DATABASE_URL", default_value = "sqlite:db.sqlite3")]
    database: String,

    /// Directory holding the grain files.
    #[arg(short, long, env = "CELESTA_SCORE_PATH", default_value = "score")]
    score_dir: PathBuf,

    /// Create the system tables even if the database already has tables.
    #[arg(short, long)]
    force: bool,

    /// Enable verbose output.
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Bring the database up to date with the score.
    Update {
        /// Print the executed DDL after the update.
        #[arg(long)]
        show_sql: bool,
    },

    /// Validate the score without touching the database.
    Check,

    /// Show the recorded state of grains.
    Status {
        /// Grain name to show (all if not specified).
        #[arg(short, long)]
        grain: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .without_time()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Check => {
            let score = load(&cli.score_dir)?;
            info!("Score is valid.");

            println!("\nGrains in update order:");
            println!("{:-<60}", "");
            for grain in score.grains() {
                println!(
                    " [ ] {} {} ({})",
                    grain.name(),
                    grain.version(),
                    grain.fingerprint()
                );
            }
            println!();
        }

        Commands::Update { show_sql } => {
            let score = load(&cli.score_dir)?;

            // Connect to database
            let adaptor = SqliteAdaptor::connect(&cli.database).await?;
            let mut updater =
                DbUpdater::new(adaptor).config(UpdaterConfig::new().force_init(cli.force));

            info!("Updating database...");
            let outcome = updater.update_db(&score).await;

            if show_sql {
                let ddl = updater.adaptor().executed_ddl();
                if ddl.is_empty() {
                    info!("No DDL was executed.");
                } else {
                    println!("\nExecuted DDL:");
                    println!("{:-<60}", "");
                    for sql in ddl {
                        println!("{sql};");
                    }
                    println!();
                }
            }

            outcome?;
            info!("Database is up to date.");
        }

        Commands::Status { grain } => {
            // Connect to database
            let mut adaptor = SqliteAdaptor::connect(&cli.database).await?;
            let records = if adaptor.table_exists(SYSTEM_GRAIN, GRAINS_TABLE).await? {
                adaptor.grain_records().await?
            } else {
                Vec::new()
            };

            if records.is_empty() {
                info!("No grains have been recorded yet.");
            } else {
                println!("\nGrain states:");
                println!("{:-<60}", "");

                for record in &records {
                    if grain.as_ref().is_some_and(|g| g != &record.id) {
                        continue;
                    }
                    let mark = if record.state == GrainState::Ready {
                        'X'
                    } else {
                        ' '
                    };
                    println!(
                        " [{mark}] {} {} {} ({})",
                        record.id,
                        record.version,
                        record.state,
                        record.lastmodified.format("%Y-%m-%d %H:%M:%S")
                    );
                    if !record.message.is_empty() {
                        println!("     {}", record.message);
                    }
                }
                println!();
            }
        }
    }

    Ok(())
}

fn load(dir: &Path) -> anyhow::Result<Score> {
    let raw = load_score_dir(dir)?;
    info!(grains = raw.len(), dir = %dir.display(), "Loaded grain files");
    Ok(Score::build(raw)?)
}
