//! testbed - test-environment bootstrap pipeline
//!
//! ```text
//! testbed run [--config FILE] [--python 2.7,3.4] [--workdir DIR] [--report FILE]
//! testbed plan [--config FILE]
//! testbed init [--output FILE] [--force]
//! ```
//!
//! Exit code 0 when every run of the matrix succeeded, 1 otherwise.

mod cli;
mod commands;
mod error;

use std::process::ExitCode;

use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::cli::{Cli, Command};

/// Logs go to stderr so `plan` output stays machine-readable.
fn init_tracing(log_json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let result = match cli.command {
        Command::Run(args) => commands::run(args).await,
        Command::Plan(args) => commands::plan(args),
        Command::Init(args) => commands::init(args),
    };

    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            error!(error = %err, "testbed failed");
            ExitCode::FAILURE
        }
    }
}
