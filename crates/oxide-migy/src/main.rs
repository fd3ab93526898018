//! migy CLI
//!
//! Command-line tool for numbered SQL migrations.

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{bail, Context};
use chrono::NaiveDateTime;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use oxide_migy::prelude::*;

/// Numbered SQL migrations with up/down reversibility checks.
#[derive(Parser)]
#[command(name = "migy")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Migrations directory.
    #[arg(short, long, env = "MIGY_DIR", default_value = ".")]
    dir: PathBuf,

    /// Target database URL (`sqlite:...` or `mysql://...`).
    #[arg(long, env = "DATABASE_URL")]
    database: Option<String>,

    /// Disposable database used by check, snapshot and dump replays.
    #[arg(long, env = "MIGY_SCRATCH_URL", default_value = "sqlite::memory:")]
    scratch: String,

    /// Enable verbose output.
    #[arg(short, long)]
    verbose: bool,

    /// Only report warnings and errors.
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show every migration and whether it is applied.
    Status {
        /// Read the state from a dump file instead of the target database.
        dump: Option<PathBuf>,

        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },

    /// List the files that bring the database to a migration.
    List {
        /// Read the state from a dump file instead of the target database.
        dump: Option<PathBuf>,

        /// Target migration number (the last one if not specified).
        #[arg(short, long)]
        number: Option<u64>,
    },

    /// Apply the files that bring the database to a migration.
    Apply {
        /// Target migration number (the last one if not specified).
        #[arg(short, long)]
        number: Option<u64>,

        /// Do not ask for confirmation.
        #[arg(short, long)]
        yes: bool,
    },

    /// Check that an up/down pair is reversible.
    Check {
        /// Migration to check (the last one if not specified).
        #[arg(short, long)]
        number: Option<u64>,

        /// Check every migration from this number through --number.
        #[arg(long)]
        from: Option<u64>,
    },

    /// Write the `.all.sql` snapshot of a migration.
    Snapshot {
        /// Migration number (the last one if not specified).
        #[arg(short, long)]
        number: Option<u64>,

        /// Overwrite an existing snapshot file.
        #[arg(short, long)]
        force: bool,
    },

    /// Create a new up/down migration pair.
    Create {
        /// Migration title, used in the file names.
        title: String,

        /// Migration number (next multiple of ten if not specified).
        #[arg(short, long)]
        number: Option<u64>,

        /// SQL dialect of the generated files.
        #[arg(long, value_enum)]
        dialect: Option<Dialect>,
    },

    /// Write the baseline migration that creates `_migrations`.
    Init {
        /// Overwrite an existing baseline.
        #[arg(short, long)]
        force: bool,

        /// SQL dialect of the generated file.
        #[arg(long, value_enum)]
        dialect: Option<Dialect>,
    },
}

/// One line of `migy status --json`.
#[derive(Serialize)]
struct StatusEntry<'a> {
    number: u64,
    title: &'a str,
    applied: Option<NaiveDateTime>,
    up_down: bool,
    snapshot: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    db_title: Option<&'a str>,
    missing_file: bool,
}

impl<'a> From<&'a Status<'a>> for StatusEntry<'a> {
    fn from(status: &'a Status<'a>) -> Self {
        Self {
            number: status.migration.number,
            title: &status.migration.title,
            applied: status.applied_at(),
            up_down: status.migration.up_down,
            snapshot: status.migration.snapshot,
            db_title: status.db_title(),
            missing_file: status.is_missing_file(),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    // Setup logging
    let log_level = if cli.verbose {
        Level::DEBUG
    } else if cli.quiet {
        Level::WARN
    } else {
        Level::INFO
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(io::stderr)
        .with_target(false)
        .without_time()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match &cli.command {
        Commands::Status { dump, json } => {
            let migrations = Migrations::load(&cli.dir)?;
            let db = target_db(&cli, dump.as_deref()).await?;
            let histories = match load_histories(db.as_ref()).await {
                Err(MigrateError::NoMigrationTable) => {
                    warn!("no _migrations table found");
                    Vec::new()
                }
                other => other?,
            };

            let statuses: Vec<Status<'_>> = build_status(&migrations, &histories).collect();
            for status in statuses.iter().filter(|s| s.is_missing_file()) {
                warn!(
                    number = status.migration.number,
                    title = %status.migration.title,
                    "applied migration has no file"
                );
            }

            if *json {
                let entries: Vec<StatusEntry<'_>> = statuses.iter().map(StatusEntry::from).collect();
                println!("{}", serde_json::to_string_pretty(&entries)?);
            } else {
                print_status(&statuses);
            }
        }

        Commands::List { dump, number } => {
            let migrations = Migrations::load(&cli.dir)?;
            let db = target_db(&cli, dump.as_deref()).await?;
            for file in files_to_apply(db.as_ref(), &migrations, *number).await? {
                println!("{file}");
            }
        }

        Commands::Apply { number, yes } => {
            let migrations = Migrations::load(&cli.dir)?;
            let db = target_db(&cli, None).await?;
            let files = files_to_apply(db.as_ref(), &migrations, *number).await?;
            if files.is_empty() {
                info!("Nothing to apply.");
                return Ok(ExitCode::SUCCESS);
            }

            for file in &files {
                println!("{file}");
            }
            if !*yes && !confirm(&format!("Apply {} file(s)?", files.len()))? {
                info!("Cancelled.");
                return Ok(ExitCode::SUCCESS);
            }
            apply_files(db.as_ref(), &cli.dir, &files).await?;
            info!("Applied {} file(s).", files.len());
        }

        Commands::Check { number, from } => {
            let migrations = Migrations::load(&cli.dir)?;
            let scratch = connect(&cli.scratch).await?;
            let numbers = match from {
                Some(from) => numbers_to_check(&migrations, *from, *number)?,
                None => vec![number.unwrap_or_else(|| last_number(&migrations))],
            };

            for n in numbers {
                info!("==== check {n:06}");
                let report = check_migration(scratch.as_ref(), &cli.dir, &migrations, n).await?;
                if !report.is_empty() {
                    println!("{report}");
                    error!("check failed: {n:06}");
                    return Ok(ExitCode::FAILURE);
                }
            }
        }

        Commands::Snapshot { number, force } => {
            let migrations = Migrations::load(&cli.dir)?;
            let scratch = connect(&cli.scratch).await?;
            let number = number.unwrap_or_else(|| last_number(&migrations));
            let path =
                write_snapshot_file(scratch.as_ref(), &cli.dir, &migrations, number, *force)
                    .await?;
            info!("Wrote {}", path.display());
        }

        Commands::Create {
            title,
            number,
            dialect,
        } => {
            let migrations = Migrations::load(&cli.dir)?;
            let dialect = resolve_dialect(&cli, *dialect)?;
            let (up, down) =
                create_migration_files(&cli.dir, &migrations, title, *number, dialect)?;
            println!("{}", up.display());
            println!("{}", down.display());
        }

        Commands::Init { force, dialect } => {
            let dialect = resolve_dialect(&cli, *dialect)?;
            let path = init_file(&cli.dir, *force, dialect)?;
            println!("{}", path.display());
        }
    }

    Ok(ExitCode::SUCCESS)
}

/// The database a command inspects: the dump replayed on the scratch
/// database when one is given, the target database otherwise.
async fn target_db(cli: &Cli, dump: Option<&Path>) -> anyhow::Result<Box<dyn Database>> {
    if let Some(dump) = dump {
        let scratch = connect(&cli.scratch).await?;
        scratch.reset().await?;
        apply_file(scratch.as_ref(), dump).await?;
        return Ok(scratch);
    }

    let Some(url) = &cli.database else {
        bail!("no target database: set --database or DATABASE_URL");
    };
    connect(url)
        .await
        .with_context(|| format!("cannot connect to {url}"))
}

/// Dialect of scaffolded files: `--dialect`, else the target database, else
/// the scratch database that `check` will run them on.
fn resolve_dialect(cli: &Cli, dialect: Option<Dialect>) -> anyhow::Result<Dialect> {
    if let Some(dialect) = dialect {
        return Ok(dialect);
    }
    let url = cli.database.as_deref().unwrap_or(&cli.scratch);
    Ok(Dialect::from_url(url)?)
}

fn last_number(migrations: &Migrations) -> u64 {
    migrations.last().map_or(0, |m| m.number)
}

fn confirm(prompt: &str) -> anyhow::Result<bool> {
    eprint!("{prompt} [y/N] ");
    io::stderr().flush()?;
    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim(), "y" | "Y" | "yes"))
}

fn print_status(statuses: &[Status<'_>]) {
    println!("{:<6}  {:<19}  title", "number", "applied");
    for status in statuses {
        let applied = status
            .applied_at()
            .map_or_else(|| "-".to_owned(), |t| t.format("%Y-%m-%d %H:%M:%S").to_string());
        let mut line = format!(
            "{:06}  {applied:<19}  {}",
            status.migration.number, status.migration.title
        );
        if let Some(db_title) = status.db_title() {
            line.push_str(&format!(" (db: {db_title})"));
        }
        if status.is_missing_file() {
            line.push_str(" (no file)");
        }
        println!("{line}");
    }
}
