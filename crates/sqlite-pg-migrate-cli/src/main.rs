//! sqlite-pg-migrate CLI - SQLite to PostgreSQL schema and data portability.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use sqlite_pg_migrate::{
    connect, seed, Config, Dialect, EvolutionEngine, MigrateError, Orchestrator, SeedMode,
};
use tracing::{info, Level};
use tracing_subscriber::fmt::format::FmtSpan;

#[derive(Parser)]
#[command(name = "sqlite-pg-migrate")]
#[command(about = "SQLite to PostgreSQL schema and data portability")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Export the source database as a replayable PostgreSQL artifact set
    Export {
        /// Output directory (defaults to export.output_dir from the config)
        #[arg(long)]
        output: Option<PathBuf>,

        /// Write only the schema artifact, skipping row data
        #[arg(long)]
        schema_only: bool,
    },

    /// Check generated DDL for target-dialect compatibility
    Validate {
        /// Target dialect to validate against
        #[arg(long, default_value = "postgres")]
        target: Dialect,
    },

    /// Apply, revert or inspect schema migration steps
    Migrate {
        /// List every step with its applied/pending state
        #[arg(long)]
        status: bool,

        /// Apply pending steps up to and including REV (default: head)
        #[arg(long, value_name = "REV", num_args = 0..=1, default_missing_value = "head")]
        upgrade: Option<String>,

        /// Revert applied steps down to REV (-1 = one step, base = all)
        #[arg(
            long,
            value_name = "REV",
            num_args = 0..=1,
            default_missing_value = "-1",
            allow_hyphen_values = true
        )]
        downgrade: Option<String>,

        /// Diff the live schema against the chain and write a new step file
        #[arg(long)]
        autogenerate: bool,

        /// Name for the generated step
        #[arg(long, value_name = "NAME")]
        message: Option<String>,

        /// Set the version marker to the newest revision without running steps
        #[arg(long)]
        stamp_head: bool,
    },

    /// Load idempotent seed data
    Seed {
        /// Drop and recreate the managed tables before loading
        #[arg(long)]
        reset: bool,

        /// Comma-separated seed categories to load
        #[arg(long, value_delimiter = ',', value_name = "LIST")]
        only: Vec<String>,
    },

    /// Resynchronize auto-increment counters with the loaded data
    FixSequences,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<(), MigrateError> {
    let cli = Cli::parse();

    // Conflicting flags fail before the config file is even read.
    check_usage(&cli.command)?;

    setup_logging(&cli.verbosity, &cli.log_format);

    let config = Config::load(&cli.config)?;
    info!("Loaded configuration from {:?}", cli.config);

    match cli.command {
        Commands::Export {
            output,
            schema_only,
        } => {
            let orchestrator = Orchestrator::new(config);
            let result = orchestrator.export(output, schema_only).await?;

            println!("\nExport completed!");
            println!("  Output: {}", result.output_dir.display());
            println!("  Schema: {}", result.schema_file.display());
            if let Some(ref data_file) = result.data_file {
                println!("  Data: {} ({} rows)", data_file.display(), result.total_rows());
            }
            println!("  Combined: {}", result.combined_file.display());
            println!("  README: {}", result.readme_file.display());
            if !result.warnings.is_empty() {
                println!("  Translation warnings: {}", result.warnings.len());
            }
        }

        Commands::Validate { target } => {
            let orchestrator = Orchestrator::new(config);
            let issues = orchestrator.validate(target).await?;

            if issues.is_empty() {
                println!("Validation passed: generated DDL is compatible with {}", target);
            } else {
                println!("Validation found {} issue(s):", issues.len());
                for issue in &issues {
                    println!("  {} [{}]: {}", issue.table, issue.token, issue.detail);
                }
                return Err(MigrateError::Validation(format!(
                    "{} dialect compatibility issue(s)",
                    issues.len()
                )));
            }
        }

        Commands::Migrate {
            status,
            upgrade,
            downgrade,
            autogenerate,
            message,
            stamp_head,
        } => {
            let db = connect(&config.database).await?;
            let engine = EvolutionEngine::new(db.as_ref(), &config);

            if status {
                let steps = engine.status().await?;
                if steps.is_empty() {
                    println!("No migration steps found");
                }
                for step in steps {
                    println!(
                        "  {:04}  {}  {:<9}  {}",
                        step.ordinal,
                        step.revision,
                        step.state.to_string(),
                        step.name
                    );
                }
            } else if let Some(target) = upgrade {
                let applied = engine.upgrade(&target).await?;
                println!("Applied {} step(s)", applied);
            } else if let Some(target) = downgrade {
                let reverted = engine.downgrade(&target).await?;
                println!("Reverted {} step(s)", reverted);
            } else if autogenerate {
                // check_usage guarantees the message is present
                let name = message.unwrap_or_default();
                let path = engine.autogenerate(&name).await?;
                println!("Wrote {}", path.display());
            } else {
                debug_assert!(stamp_head);
                match engine.stamp_head().await? {
                    Some(revision) => println!("Marker stamped to {}", revision),
                    None => println!("No migration steps found; marker cleared"),
                }
            }
        }

        Commands::Seed { reset, only } => {
            let mode = if reset {
                SeedMode::Reset
            } else if !only.is_empty() {
                SeedMode::Only(only)
            } else {
                SeedMode::All
            };

            let db = connect(&config.database).await?;
            let results = seed::run(db.as_ref(), &config, mode).await?;

            println!("\nSeed completed!");
            for result in &results {
                println!("  {}", result);
            }
        }

        Commands::FixSequences => {
            let orchestrator = Orchestrator::new(config);
            let resynced = orchestrator.fix_sequences().await?;

            if resynced.is_empty() {
                println!("No serial counters needed resynchronization");
            } else {
                println!("Resynchronized {} counter(s):", resynced.len());
                for table in &resynced {
                    println!("  {}", table);
                }
            }
        }
    }

    Ok(())
}

/// Reject conflicting or incomplete flag combinations before any I/O.
fn check_usage(command: &Commands) -> Result<(), MigrateError> {
    match command {
        Commands::Migrate {
            status,
            upgrade,
            downgrade,
            autogenerate,
            message,
            stamp_head,
        } => {
            let selected = [
                *status,
                upgrade.is_some(),
                downgrade.is_some(),
                *autogenerate,
                *stamp_head,
            ]
            .iter()
            .filter(|v| **v)
            .count();
            if selected != 1 {
                return Err(MigrateError::Usage(
                    "migrate needs exactly one of --status, --upgrade, --downgrade, \
                     --autogenerate, --stamp-head"
                        .to_string(),
                ));
            }
            if *autogenerate && message.is_none() {
                return Err(MigrateError::Usage(
                    "--autogenerate requires --message NAME".to_string(),
                ));
            }
            if message.is_some() && !*autogenerate {
                return Err(MigrateError::Usage(
                    "--message only applies to --autogenerate".to_string(),
                ));
            }
        }
        Commands::Seed { reset, only } => {
            if *reset && !only.is_empty() {
                return Err(MigrateError::Usage(
                    "--reset and --only conflict; reset always reloads every category"
                        .to_string(),
                ));
            }
        }
        _ => {}
    }
    Ok(())
}

fn setup_logging(verbosity: &str, format: &str) {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(false);

    if format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}
