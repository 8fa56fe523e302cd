//! Command-line arguments.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use testbed_core::config;

#[derive(Debug, Parser)]
#[command(
    name = "testbed",
    version,
    about = "Provision, fetch fixtures, start a display, test and report coverage"
)]
pub(crate) struct Cli {
    /// Log as JSON lines instead of text.
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub(crate) enum Command {
    /// Run the pipeline for every interpreter of the matrix.
    Run(RunArgs),

    /// Print the resolved plan of every run as JSON.
    Plan(ConfigArgs),

    /// Write the built-in configuration as YAML.
    Init(InitArgs),
}

#[derive(Debug, Args)]
pub(crate) struct ConfigArgs {
    /// Pipeline configuration. Defaults to $TESTBED_CONFIG, then ./testbed.yml,
    /// then the built-in pipeline.
    #[arg(long, short)]
    pub config: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub(crate) struct RunArgs {
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Only these interpreter versions (comma-separated).
    #[arg(long)]
    pub python: Option<String>,

    /// Working directory of the run.
    #[arg(long)]
    pub workdir: Option<PathBuf>,

    /// Write the run reports as JSON to this file.
    #[arg(long)]
    pub report: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub(crate) struct InitArgs {
    #[arg(long, short, default_value = config::DEFAULT_CONFIG_FILE)]
    pub output: PathBuf,

    /// Overwrite an existing file.
    #[arg(long)]
    pub force: bool,
}
