//! Subcommand implementations. Each returns whether the process should exit
//! successfully.

use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use testbed_core::app::{Pipeline, PipelineBuilder};
use testbed_core::config;
use testbed_core::domain::{PipelineSpec, RunReport, RunState, StageKind};
use testbed_core::impls::{HttpDownloader, ProcessRunner, TracingEventSink};
use testbed_core::ports::{CommandRunner, Downloader};
use testbed_core::stages;
use tracing::{debug, error, info};

use crate::cli::{ConfigArgs, InitArgs, RunArgs};
use crate::error::{CliError, Result};

/// Written by `run --report`.
#[derive(Debug, Serialize)]
pub(crate) struct MatrixReport {
    pub succeeded: bool,
    pub runs: Vec<RunReport>,
}

impl MatrixReport {
    pub(crate) fn new(runs: Vec<RunReport>) -> Self {
        Self {
            succeeded: !runs.is_empty() && runs.iter().all(|r| r.state == RunState::Succeeded),
            runs,
        }
    }
}

fn load_spec(args: &ConfigArgs, cwd: &Path) -> Result<PipelineSpec> {
    let env = std::env::var(config::ENV_CONFIG).ok();
    let spec = match config::locate(args.config.as_deref(), env, cwd) {
        Some(path) => {
            info!(config = %path.display(), "loading configuration");
            config::load(&path)?
        }
        None => {
            debug!("no configuration file, using the built-in pipeline");
            config::load_default()?
        }
    };
    Ok(spec)
}

fn write_file(path: &Path, contents: &str) -> Result<()> {
    std::fs::write(path, contents).map_err(|source| CliError::Write {
        path: path.to_path_buf(),
        source,
    })
}

/// The standard pipeline on real processes and HTTP.
pub(crate) fn build_pipeline() -> Result<Pipeline> {
    let runner: Arc<dyn CommandRunner> = Arc::new(ProcessRunner::new());
    let downloader: Arc<dyn Downloader> = Arc::new(HttpDownloader::default());
    let pipeline = PipelineBuilder::new()
        .register_all(stages::standard(runner, downloader))?
        .expect_stages(&StageKind::ORDER)
        .event_sink(Arc::new(TracingEventSink))
        .build()?;
    Ok(pipeline)
}

/// Apply the command-line overrides and make the workdir absolute.
pub(crate) fn resolve_spec(args: &RunArgs, cwd: &Path) -> Result<PipelineSpec> {
    let mut spec = load_spec(&args.config, cwd)?;
    if let Some(dir) = &args.workdir {
        spec.workdir = dir.clone();
    }
    if let Some(list) = &args.python {
        spec.interpreters = list
            .split(',')
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(String::from)
            .collect();
    }
    config::anchor_workdir(&mut spec, cwd);
    config::validate(&spec)?;
    Ok(spec)
}

pub(crate) async fn run(args: RunArgs) -> Result<bool> {
    let cwd = std::env::current_dir().map_err(CliError::CurrentDir)?;
    let spec = resolve_spec(&args, &cwd)?;
    execute(&spec, &build_pipeline()?, args.report.as_deref()).await
}

pub(crate) async fn execute(
    spec: &PipelineSpec,
    pipeline: &Pipeline,
    report: Option<&Path>,
) -> Result<bool> {
    let plans = config::plans(spec)?;
    info!(
        workdir = %spec.workdir.display(),
        interpreters = ?spec.interpreters,
        "starting matrix"
    );

    let matrix = MatrixReport::new(pipeline.run_matrix(plans).await);
    for run in &matrix.runs {
        if run.state == RunState::Succeeded {
            info!(python = %run.python, run_id = %run.run_id, "run succeeded");
        } else {
            error!(python = %run.python, run_id = %run.run_id, "run failed");
        }
    }

    if let Some(path) = report {
        write_file(path, &serde_json::to_string_pretty(&matrix)?)?;
        info!(report = %path.display(), "report written");
    }
    Ok(matrix.succeeded)
}

pub(crate) fn plan(args: ConfigArgs) -> Result<bool> {
    let cwd = std::env::current_dir().map_err(CliError::CurrentDir)?;
    let mut spec = load_spec(&args, &cwd)?;
    config::anchor_workdir(&mut spec, &cwd);
    let plans = config::plans(&spec)?;
    println!("{}", serde_json::to_string_pretty(&plans)?);
    Ok(true)
}

pub(crate) fn init(args: InitArgs) -> Result<bool> {
    if args.output.exists() && !args.force {
        return Err(CliError::Exists(args.output));
    }
    let yaml = config::to_yaml(&PipelineSpec::default())?;
    write_file(&args.output, &yaml)?;
    info!(path = %args.output.display(), "configuration written");
    Ok(true)
}
