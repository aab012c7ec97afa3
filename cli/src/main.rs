//! Thin entry point: parses nothing but `--version`/`--help`, initializes
//! tracing, and hands off to [`core::Manager`] (§1, §4.7 ambient CLI note).

#![deny(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing, clippy::panic)]
#![warn(missing_docs, rust_2018_idioms, missing_debug_implementations)]

use clap::Parser;
use orchestrator::Manager;
use std::process::ExitCode;
use tracing::error;
use tracing_subscriber::EnvFilter;

/// Copies a key-scoped, referentially-closed slice of one PostgreSQL
/// database into another.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args;

fn init_tracing(log_directory: Option<&str>, log_filename: Option<&str>) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    match (log_directory, log_filename) {
        (Some(directory), Some(filename)) => {
            let appender = tracing_appender::rolling::daily(directory, filename);
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt().with_env_filter(filter).with_writer(non_blocking).init();
            Some(guard)
        }
        _ => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
            None
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let _args = Args::parse();

    let manager = match Manager::from_env() {
        Ok(manager) => manager,
        Err(source) => {
            eprintln!("{source}");
            return ExitCode::FAILURE;
        }
    };

    let config = manager.config().clone();
    let _tracing_guard = init_tracing(config.log_directory.as_deref(), config.log_filename.as_deref());

    if let Err(source) = manager.run().await {
        error!(error = %source, "run failed");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}
