//! Binary crate for the `rainalert` command-line tool.
//!
//! This crate focuses on:
//! - Parsing CLI arguments
//! - Logging setup and exit codes for cron
//! - Interactive configuration

use clap::Parser;
use rainalert_core::RunError;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

mod cli;

// One run makes at most three sequential requests; no worker threads needed.
#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cmd = cli::Cli::parse();

    match cmd.run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let code = err.downcast_ref::<RunError>().map_or(1, RunError::exit_code);
            tracing::error!(exit_code = code, "{err:#}");
            ExitCode::from(code)
        }
    }
}
