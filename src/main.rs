//! Database Backup Tool
//!
//! Takes logical and physical PostgreSQL backups into a local artifact
//! store, validates them, lists them and prunes old ones.

// dbvault/src/main.rs
mod backup;
mod config;
mod errors;
mod retention;
mod store;
mod utils;
mod validate;

#[cfg(test)]
mod test_support;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use backup::BackupRequest;
use config::AppConfig;
use errors::Result;
use store::ArtifactKind;
use store::ArtifactStore;
use utils::setting::{PostgresProbe, preflight};

#[derive(Parser, Debug)]
#[command(name = "dbvault", version, about = "PostgreSQL backup orchestration and validation")]
struct Cli {
    /// JSON config file; environment variables override its values
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create a logical or physical backup
    Backup {
        #[arg(long, value_enum, default_value_t = ArtifactKind::Logical)]
        kind: ArtifactKind,

        /// Database to dump; omit for the whole cluster
        #[arg(long)]
        database: Option<String>,

        /// Validate the artifact once it is written
        #[arg(long)]
        validate: bool,
    },
    /// Validate an existing artifact
    Validate {
        path: PathBuf,
    },
    /// List artifacts in the store
    List {
        #[arg(long)]
        json: bool,
    },
    /// Remove artifacts older than the retention window
    Cleanup {
        #[arg(long, value_name = "DAYS")]
        max_age_days: Option<u32>,
    },
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("dbvault=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run_app(cli: Cli) -> Result<()> {
    let config = AppConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Backup {
            kind,
            database,
            validate,
        } => {
            let request = BackupRequest {
                kind,
                target: database,
                validate,
            };
            let outcome = backup::run_backup_flow(&config, &request, &PostgresProbe::default())?;
            if let Some(cleanup) = &outcome.cleanup {
                info!(
                    "Retention before backup removed {} logical, {} physical, {} incomplete",
                    cleanup.removed(ArtifactKind::Logical),
                    cleanup.removed(ArtifactKind::Physical),
                    cleanup.partials_removed
                );
            }
            if let Some(report) = &outcome.report {
                info!(
                    "Validation passed with {} advisory finding(s)",
                    report.advisories().count()
                );
            }
            println!("{}", outcome.artifact.location.display());
        }
        Commands::Validate { path } => {
            validate::run_validate_flow(&config, &path)?;
        }
        Commands::List { json } => {
            store::catalog::run_list_flow(&config, json)?;
        }
        Commands::Cleanup { max_age_days } => {
            let store = ArtifactStore::new(&config.store_root);
            preflight(&config, &store, &PostgresProbe::default())?;
            let report = retention::run_cleanup_flow(&config, max_age_days)?;
            println!(
                "Removed {} logical, {} physical and {} incomplete artifact(s)",
                report.removed(ArtifactKind::Logical),
                report.removed(ArtifactKind::Physical),
                report.partials_removed
            );
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    dotenv::dotenv().ok();
    init_logging();

    match run_app(Cli::parse()) {
        Ok(()) => {
            info!("✅ Operation completed successfully.");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("❌ {}", e);
            ExitCode::from(e.exit_code())
        }
    }
}
