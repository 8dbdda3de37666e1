use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};
use uuid::Uuid;

use sawal::config::Config;
use sawal::db::Database;
use sawal::logging::configure_logging;
use sawal::pipeline;

/// Slack before a crashed run's lock is considered abandoned, on top of the
/// review window.
const LOCK_SLACK_SECS: u64 = 600;

#[derive(Parser)]
#[command(
    name = "sawal",
    about = "Approval-gated political news posting pipeline",
    version
)]
struct Cli {
    /// Override DATABASE_PATH for this invocation.
    #[arg(long)]
    database_path: Option<String>,

    /// Override DRAFTS_DIR for this invocation.
    #[arg(long)]
    drafts_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    configure_logging();
    let cli = Cli::parse();

    let mut cfg = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(err) => {
            error!("{}", err);
            eprintln!("{}", err);
            return ExitCode::from(1);
        }
    };
    if let Some(database_path) = cli.database_path {
        cfg.database_path = database_path;
    }
    if let Some(drafts_dir) = cli.drafts_dir {
        cfg.drafts_dir = drafts_dir;
    }

    let db = match Database::new(&cfg.database_path).await {
        Ok(db) => db,
        Err(err) => {
            error!("Failed to open database {}: {}", cfg.database_path, err);
            return ExitCode::from(1);
        }
    };

    let run_id = Uuid::new_v4();

    // Single-flight: a run still in review (or wedged short of its lock TTL)
    // rejects this invocation rather than queueing behind it.
    let lock_ttl = cfg.review_timeout + std::time::Duration::from_secs(LOCK_SLACK_SECS);
    match db.acquire_run_lock(run_id, lock_ttl).await {
        Ok(true) => {}
        Ok(false) => {
            error!("Another run is still in flight; refusing to overlap");
            return ExitCode::from(1);
        }
        Err(err) => {
            error!("Failed to acquire run lock: {}", err);
            return ExitCode::from(1);
        }
    }

    info!("Starting run {}", run_id);
    let outcome = pipeline::execute(&cfg, &db, run_id).await;

    if let Err(err) = db.release_run_lock(run_id).await {
        error!("Failed to release run lock: {}", err);
    }

    info!("Run {} finished: {}", run_id, outcome.label());
    ExitCode::from(outcome.exit_code() as u8)
}
