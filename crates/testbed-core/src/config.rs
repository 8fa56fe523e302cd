//! Pipeline configuration: YAML loading, environment overrides, validation,
//! and resolution of a `PipelineSpec` into one `RunPlan` per interpreter.
//!
//! # Placeholders
//! - `{python}`: interpreter version of the run
//! - `{workdir}`: absolute-or-given working directory
//! - `{project}`: project directory (resolved against `workdir`)
//! - `{package}`: package instrumented for coverage
//! - `{env}`: environment prefix (not available inside `env_prefix` itself)
//! - `{display}`: display endpoint
//!
//! `{{` and `}}` stand for literal braces. Unknown placeholders are
//! configuration errors, caught at load time.
//!
//! # 設定ファイルの探索
//! `--config` → `$TESTBED_CONFIG` → `./testbed.yml` → 組み込み設定

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;

use crate::domain::{
    ArchiveFormat, CommandSpec, CoveragePlan, DatasetPlan, DatasetSpec, DisplayPlan,
    InstallerPlan, PipelineError, PipelineSpec, ProvisionPlan, RunPlan, TestPlan,
};

pub const ENV_CONFIG: &str = "TESTBED_CONFIG";
pub const ENV_WORKDIR: &str = "TESTBED_WORKDIR";
pub const ENV_PYTHON: &str = "TESTBED_PYTHON";
pub const ENV_DISPLAY: &str = "TESTBED_DISPLAY";

/// `testbed init` が書き、探索で拾うファイル名
pub const DEFAULT_CONFIG_FILE: &str = "testbed.yml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse pipeline YAML: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("unknown placeholder `{{{name}}}` in `{template}`")]
    UnknownPlaceholder { name: String, template: String },

    #[error("unclosed placeholder in `{0}`")]
    Unclosed(String),

    #[error("{0}")]
    Invalid(String),
}

impl From<ConfigError> for PipelineError {
    fn from(err: ConfigError) -> Self {
        PipelineError::Config(err.to_string())
    }
}

/// Read, override from the process environment, and validate.
pub fn load(path: &Path) -> Result<PipelineSpec, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let mut spec = from_yaml(&text)?;
    apply_env_overrides(&mut spec, |key| std::env::var(key).ok());
    validate(&spec)?;
    Ok(spec)
}

/// 読み込む設定ファイルを決める。`None` なら組み込み設定を使う。
///
/// 相対パスは `cwd` 基準。`env` は `$TESTBED_CONFIG` の値。
pub fn locate(explicit: Option<&Path>, env: Option<String>, cwd: &Path) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(resolve(cwd, path));
    }
    if let Some(path) = env.filter(|v| !v.trim().is_empty()) {
        return Some(resolve(cwd, Path::new(&path)));
    }
    let local = cwd.join(DEFAULT_CONFIG_FILE);
    local.is_file().then_some(local)
}

/// The built-in pipeline with environment overrides applied.
pub fn load_default() -> Result<PipelineSpec, ConfigError> {
    let mut spec = PipelineSpec::default();
    apply_env_overrides(&mut spec, |key| std::env::var(key).ok());
    validate(&spec)?;
    Ok(spec)
}

pub fn from_yaml(text: &str) -> Result<PipelineSpec, ConfigError> {
    Ok(serde_yaml::from_str(text)?)
}

pub fn to_yaml(spec: &PipelineSpec) -> Result<String, ConfigError> {
    Ok(serde_yaml::to_string(spec)?)
}

/// `lookup` is `std::env::var` in production and a map in tests.
pub fn apply_env_overrides<F>(spec: &mut PipelineSpec, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(dir) = lookup(ENV_WORKDIR).filter(|v| !v.trim().is_empty()) {
        spec.workdir = PathBuf::from(dir);
    }
    if let Some(list) = lookup(ENV_PYTHON) {
        let versions: Vec<String> = list
            .split(',')
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(String::from)
            .collect();
        if !versions.is_empty() {
            spec.interpreters = versions;
        }
    }
    if let Some(display) = lookup(ENV_DISPLAY).filter(|v| !v.trim().is_empty()) {
        spec.display.display = display;
    }
}

/// Structural checks plus a full resolution of every run plan.
pub fn validate(spec: &PipelineSpec) -> Result<(), ConfigError> {
    if spec.interpreters.is_empty() {
        return Err(ConfigError::Invalid(
            "at least one interpreter version is required".into(),
        ));
    }
    if spec.interpreters.iter().any(|v| v.trim().is_empty()) {
        return Err(ConfigError::Invalid("interpreter versions must not be empty".into()));
    }
    if spec.package.trim().is_empty() {
        return Err(ConfigError::Invalid("package must not be empty".into()));
    }
    if spec.tests.command.is_empty() {
        return Err(ConfigError::Invalid("tests.command must not be empty".into()));
    }
    if spec.coverage.enabled && spec.coverage.command.is_empty() {
        return Err(ConfigError::Invalid("coverage.command must not be empty".into()));
    }
    if spec.display.enabled && spec.display.command.is_empty() {
        return Err(ConfigError::Invalid("display.command must not be empty".into()));
    }
    let mut names = HashSet::new();
    for ds in &spec.datasets {
        if !names.insert(ds.name.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "duplicate dataset name `{}`",
                ds.name
            )));
        }
        if ds.url.trim().is_empty() {
            return Err(ConfigError::Invalid(format!("dataset `{}` has no url", ds.name)));
        }
    }
    plans(spec).map(|_| ())
}

/// インタプリタごとに 1 つの plan（マトリクス順）
pub fn plans(spec: &PipelineSpec) -> Result<Vec<RunPlan>, ConfigError> {
    spec.interpreters
        .iter()
        .map(|python| plan_for(spec, python))
        .collect()
}

/// Vars は 1 回の実行のプレースホルダ値
#[derive(Debug, Clone, Default)]
pub struct Vars(BTreeMap<&'static str, String>);

impl Vars {
    pub fn with(mut self, key: &'static str, value: impl Into<String>) -> Self {
        self.0.insert(key, value.into());
        self
    }

    pub fn expand(&self, template: &str) -> Result<String, ConfigError> {
        let mut out = String::with_capacity(template.len());
        let mut rest = template;
        while let Some(pos) = rest.find(['{', '}']) {
            out.push_str(&rest[..pos]);
            let tail = &rest[pos..];
            if let Some(after) = tail.strip_prefix("{{") {
                out.push('{');
                rest = after;
                continue;
            }
            if let Some(after) = tail.strip_prefix("}}") {
                out.push('}');
                rest = after;
                continue;
            }
            if let Some(after) = tail.strip_prefix('}') {
                // a lone `}` is kept as is
                out.push('}');
                rest = after;
                continue;
            }

            let after = &tail[1..];
            let end = after
                .find('}')
                .ok_or_else(|| ConfigError::Unclosed(template.to_string()))?;
            let name = &after[..end];
            let value = self
                .0
                .get(name)
                .ok_or_else(|| ConfigError::UnknownPlaceholder {
                    name: name.to_string(),
                    template: template.to_string(),
                })?;
            out.push_str(value);
            rest = &after[end + 1..];
        }
        out.push_str(rest);
        Ok(out)
    }

    pub fn expand_all(&self, templates: &[String]) -> Result<Vec<String>, ConfigError> {
        templates.iter().map(|t| self.expand(t)).collect()
    }

    /// Expand, then resolve relative paths against `base`.
    pub fn expand_path(&self, template: &str, base: &Path) -> Result<PathBuf, ConfigError> {
        Ok(resolve(base, Path::new(&self.expand(template)?)))
    }
}

/// Make a relative `workdir` absolute against `cwd`.
pub fn anchor_workdir(spec: &mut PipelineSpec, cwd: &Path) {
    spec.workdir = resolve(cwd, &spec.workdir);
}

/// Relative paths join `base`; `.` components in the middle are dropped.
fn resolve(base: &Path, path: &Path) -> PathBuf {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    };
    joined.components().collect()
}

/// Socket path of an X display such as `:99` or `:99.0`.
pub fn display_socket(socket_dir: &Path, display: &str) -> Result<PathBuf, ConfigError> {
    let number = display
        .rsplit_once(':')
        .map(|(_, n)| n.split('.').next().unwrap_or(n))
        .filter(|n| !n.is_empty() && n.chars().all(|c| c.is_ascii_digit()))
        .ok_or_else(|| ConfigError::Invalid(format!("invalid display `{display}`")))?;
    Ok(socket_dir.join(format!("X{number}")))
}

pub fn plan_for(spec: &PipelineSpec, python: &str) -> Result<RunPlan, ConfigError> {
    let workdir = spec.workdir.clone();
    let project_dir = resolve(&workdir, &spec.project_dir);

    let base = Vars::default()
        .with("python", python)
        .with("workdir", workdir.display().to_string())
        .with("project", project_dir.display().to_string())
        .with("package", spec.package.as_str())
        .with("display", spec.display.display.as_str());

    let p = &spec.provision;
    let env_prefix = base.expand_path(&p.env_prefix, &workdir)?;
    let vars = base.with("env", env_prefix.display().to_string());

    let provision = if p.enabled {
        let installer = match &p.installer_url {
            Some(url) => Some(InstallerPlan {
                url: vars.expand(url)?,
                script: vars.expand_path(&p.installer_script, &workdir)?,
                prefix: vars.expand_path(&p.installer_prefix, &workdir)?,
            }),
            None => None,
        };
        let manager = match &installer {
            Some(inst) => inst.prefix.join("bin").join(&p.manager).display().to_string(),
            None => p.manager.clone(),
        };
        Some(ProvisionPlan {
            installer,
            manager,
            env_prefix: env_prefix.clone(),
            packages: vars.expand_all(&p.packages)?,
            tools: vars.expand_all(&p.tools)?,
            editable: p.editable,
        })
    } else {
        None
    };

    let datasets = spec
        .datasets
        .iter()
        .map(|ds| dataset_plan(ds, &vars, &workdir))
        .collect::<Result<Vec<_>, _>>()?;

    let display = if spec.display.enabled {
        let argv = vars.expand_all(&spec.display.command)?;
        let command = CommandSpec::from_argv(&argv)
            .ok_or_else(|| ConfigError::Invalid("display.command must not be empty".into()))?;
        Some(DisplayPlan {
            display: spec.display.display.clone(),
            command,
            socket: display_socket(&spec.display.socket_dir, &spec.display.display)?,
            startup_timeout: Duration::from_millis(spec.display.startup_timeout_ms),
        })
    } else {
        None
    };

    let argv = vars.expand_all(&spec.tests.command)?;
    let tests = TestPlan {
        command: CommandSpec::from_argv(&argv)
            .ok_or_else(|| ConfigError::Invalid("tests.command must not be empty".into()))?
            .cwd(project_dir.clone()),
        coverage_file: match &spec.tests.coverage_file {
            Some(file) => Some(vars.expand_path(file, &project_dir)?),
            None => None,
        },
    };

    let coverage = if spec.coverage.enabled {
        let argv = vars.expand_all(&spec.coverage.command)?;
        Some(CoveragePlan {
            command: CommandSpec::from_argv(&argv)
                .ok_or_else(|| ConfigError::Invalid("coverage.command must not be empty".into()))?
                .cwd(project_dir.clone()),
            fatal: spec.coverage.fatal,
        })
    } else {
        None
    };

    Ok(RunPlan {
        python: python.to_string(),
        workdir,
        project_dir,
        package: spec.package.clone(),
        provision,
        datasets,
        display,
        tests,
        coverage,
    })
}

fn dataset_plan(ds: &DatasetSpec, vars: &Vars, workdir: &Path) -> Result<DatasetPlan, ConfigError> {
    let archive = vars.expand_path(&ds.download_to, workdir)?;
    let format = match ds.format {
        Some(format) => format,
        None => archive
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(ArchiveFormat::from_file_name)
            .ok_or_else(|| {
                ConfigError::Invalid(format!(
                    "dataset `{}`: cannot infer archive format of {}",
                    ds.name,
                    archive.display()
                ))
            })?,
    };
    Ok(DatasetPlan {
        name: ds.name.clone(),
        url: vars.expand(&ds.url)?,
        archive,
        format,
        dest: vars.expand_path(&ds.extract_to, workdir)?,
        flatten: match &ds.flatten {
            Some(sub) => Some(vars.expand(sub)?),
            None => None,
        },
    })
}
