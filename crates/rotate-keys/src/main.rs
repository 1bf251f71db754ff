//! `rotate-keys`: operator CLI that moves every encrypted field to a new key.
//!
//! Startup sequence:
//! 1. Parse arguments and load [`Config`](config::Config) from environment variables.
//! 2. Initialise structured JSON logging (stderr).
//! 3. Derive the old and new keys.
//! 4. Open the record database. It must already exist.
//! 5. Run the rotation on a blocking thread, racing it against Ctrl-C.
//!
//! Exit status: `0` when no record failed, `1` when any record failed, `2` on
//! configuration errors or an aborted run, `130` when interrupted.

mod cli;
mod config;
mod output;
mod telemetry;

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};
use vault::{RotationBatchRunner, SqliteStore};

const EXIT_CONFIG: u8 = 2;
const EXIT_INTERRUPTED: i32 = 130;

#[tokio::main]
async fn main() -> ExitCode {
    let args = cli::Args::parse();
    match run(args).await {
        Ok(code) => code,
        Err(e) => {
            error!(error = %format!("{e:#}"), "rotate-keys failed");
            eprintln!("ERROR: rotate-keys: {e:#}");
            ExitCode::from(EXIT_CONFIG)
        }
    }
}

async fn run(args: cli::Args) -> Result<ExitCode> {
    // -----------------------------------------------------------------------
    // 1. Configuration
    // -----------------------------------------------------------------------
    let cfg = config::Config::from_env().context("configuration invalid")?;

    // -----------------------------------------------------------------------
    // 2. Telemetry
    // -----------------------------------------------------------------------
    telemetry::init(&cfg.log_level)?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        model = ?args.model,
        chunk_size = args.chunk_size,
        dry_run = args.dry_run,
        "rotate-keys starting"
    );

    // -----------------------------------------------------------------------
    // 3. Keys
    // -----------------------------------------------------------------------
    let new_key = cfg.new_key()?;
    let old_key = cfg.old_key()?;
    if let Some(old) = &old_key {
        if old.fingerprint() == new_key.fingerprint() {
            warn!(
                key_fingerprint = %new_key.fingerprint(),
                "old and new keys are identical; records will only be re-sealed"
            );
        }
    }

    // -----------------------------------------------------------------------
    // 4. Storage
    // -----------------------------------------------------------------------
    let store = open_store(&cfg.database_path)?;

    // -----------------------------------------------------------------------
    // 5. Rotation
    // -----------------------------------------------------------------------
    let options = args.rotation_options(cfg.progress_every);
    let json = args.json;
    let task = tokio::task::spawn_blocking(move || {
        let runner = RotationBatchRunner::new(&store, old_key, Some(new_key), options);
        let mut job = runner.new_job();
        let mut reporter = output::StdoutReporter::new(json);
        let result = runner.run(&mut job, &mut reporter);
        (job, result)
    });

    tokio::select! {
        joined = task => {
            let (job, result) = joined.context("rotation task failed")?;
            output::print_summary(&job.summary(), json)?;
            match result {
                Ok(()) => Ok(ExitCode::from(job.exit_code())),
                Err(e) => {
                    eprintln!("ERROR: rotation aborted: {e}");
                    Ok(ExitCode::from(e.exit_code()))
                }
            }
        }
        Ok(()) = tokio::signal::ctrl_c() => {
            warn!(
                "rotation interrupted: records are split between the old and new keys; \
                 keep the old key until a completed run reports zero failures"
            );
            eprintln!("interrupted: rotation incomplete, keep the old key configured");
            std::process::exit(EXIT_INTERRUPTED);
        }
    }
}

/// Open the existing record database. A missing file is an error, never a
/// fresh empty database.
fn open_store(path: &str) -> Result<SqliteStore> {
    SqliteStore::open_existing(path).with_context(|| format!("failed to open database at {path}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_database_is_an_error_and_is_not_created() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.db");
        let path_str = path.to_str().unwrap();

        let err = open_store(path_str).err().unwrap();
        assert!(format!("{err:#}").contains("failed to open database"));
        assert!(!path.exists());
    }

    #[test]
    fn existing_database_opens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.db");
        drop(SqliteStore::open(&path).unwrap());
        assert!(open_store(path.to_str().unwrap()).is_ok());
    }
}
