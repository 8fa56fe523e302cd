//! Resolved plan of one run: every placeholder expanded, every path absolute
//! (relative to the workdir), every command an argv.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;

use super::spec::ArchiveFormat;
use super::stage::StageKind;

/// CommandSpec はシェルを介さずに実行するコマンド
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub cwd: Option<PathBuf>,

    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            env: BTreeMap::new(),
        }
    }

    /// Build from an argv; `None` when it is empty.
    pub fn from_argv(argv: &[String]) -> Option<Self> {
        let (program, args) = argv.split_first()?;
        Some(Self::new(program.clone()).args(args.iter().cloned()))
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn cwd(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Shell-like rendering for logs and reports.
    pub fn display_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunPlan {
    pub python: String,
    pub workdir: PathBuf,
    pub project_dir: PathBuf,
    pub package: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub provision: Option<ProvisionPlan>,
    pub datasets: Vec<DatasetPlan>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display: Option<DisplayPlan>,
    pub tests: TestPlan,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coverage: Option<CoveragePlan>,
}

impl RunPlan {
    /// Whether a stage is part of this plan.
    pub fn includes(&self, kind: StageKind) -> bool {
        match kind {
            StageKind::Provision => self.provision.is_some(),
            StageKind::FetchDatasets => !self.datasets.is_empty(),
            StageKind::StartDisplay => self.display.is_some(),
            StageKind::RunTests => true,
            StageKind::ReportCoverage => self.coverage.is_some(),
        }
    }

    /// `kind` の失敗で実行を中断するか
    pub fn is_fatal(&self, kind: StageKind) -> bool {
        match kind {
            StageKind::ReportCoverage => self.coverage.as_ref().is_some_and(|c| c.fatal),
            _ => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstallerPlan {
    pub url: String,
    pub script: PathBuf,
    pub prefix: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProvisionPlan {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub installer: Option<InstallerPlan>,

    /// Environment manager executable (inside the installer prefix when bootstrapped).
    pub manager: String,
    pub env_prefix: PathBuf,
    pub packages: Vec<String>,
    pub tools: Vec<String>,
    pub editable: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatasetPlan {
    pub name: String,
    pub url: String,
    pub archive: PathBuf,
    pub format: ArchiveFormat,
    pub dest: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub flatten: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DisplayPlan {
    pub display: String,
    pub command: CommandSpec,
    pub socket: PathBuf,
    #[serde(with = "duration_ms")]
    pub startup_timeout: Duration,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TestPlan {
    pub command: CommandSpec,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coverage_file: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CoveragePlan {
    pub command: CommandSpec,
    pub fatal: bool,
}

mod duration_ms {
    use std::time::Duration;

    use serde::Serializer;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_from_argv_splits_program() {
        let argv = vec!["nosetests".to_string(), "--with-coverage".to_string()];
        let cmd = CommandSpec::from_argv(&argv).unwrap();
        assert_eq!(cmd.program, "nosetests");
        assert_eq!(cmd.args, vec!["--with-coverage"]);
        assert_eq!(cmd.display_line(), "nosetests --with-coverage");

        assert!(CommandSpec::from_argv(&[]).is_none());
    }

    #[test]
    fn command_serializes_without_empty_fields() {
        let v = serde_json::to_value(CommandSpec::new("coveralls")).unwrap();
        assert_eq!(v, serde_json::json!({"program": "coveralls", "args": []}));
    }
}
