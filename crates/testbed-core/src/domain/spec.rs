//! Input specs for a pipeline (the YAML configuration shape).
//!
//! Every section is defaulted, so an empty document describes the original
//! `nimfa` CI bootstrap: a conda runtime for Python 2.7 and 3.4, the
//! MovieLens and CBCL faces fixtures, Xvfb on `:99`, nose with coverage and a
//! coveralls upload.
//!
//! String fields may contain `{placeholders}`; see `config::Vars`.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineSpec {
    /// Interpreter versions of the matrix, run in this order.
    pub interpreters: Vec<String>,

    /// Root for every relative path below.
    pub workdir: PathBuf,

    /// Project under test, relative to `workdir`.
    pub project_dir: PathBuf,

    /// Package instrumented for coverage.
    pub package: String,

    pub provision: ProvisionSpec,
    pub datasets: Vec<DatasetSpec>,
    pub display: DisplaySpec,
    pub tests: TestSpec,
    pub coverage: CoverageSpec,
}

impl Default for PipelineSpec {
    fn default() -> Self {
        Self {
            interpreters: vec!["2.7".to_string(), "3.4".to_string()],
            workdir: PathBuf::from("."),
            project_dir: PathBuf::from("."),
            package: "nimfa".to_string(),
            provision: ProvisionSpec::default(),
            datasets: DatasetSpec::defaults(),
            display: DisplaySpec::default(),
            tests: TestSpec::default(),
            coverage: CoverageSpec::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProvisionSpec {
    pub enabled: bool,

    /// Installer script for a self-contained environment manager.
    /// `None` uses `manager` from `PATH`.
    pub installer_url: Option<String>,

    /// Where the installer script is saved.
    pub installer_script: String,

    /// Batch-mode install prefix of the environment manager.
    pub installer_prefix: String,

    /// Environment manager binary name (`conda`).
    pub manager: String,

    /// Prefix of the per-interpreter environment.
    pub env_prefix: String,

    /// Packages installed together with the interpreter.
    pub packages: Vec<String>,

    /// Test/coverage/style tools installed with pip afterwards.
    pub tools: Vec<String>,

    /// `pip install -e <project_dir>`.
    pub editable: bool,
}

impl Default for ProvisionSpec {
    fn default() -> Self {
        Self {
            enabled: true,
            installer_url: Some(
                "https://repo.anaconda.com/miniconda/Miniconda3-latest-Linux-x86_64.sh".to_string(),
            ),
            installer_script: "{workdir}/.testbed/miniconda.sh".to_string(),
            installer_prefix: "{workdir}/.testbed/miniconda".to_string(),
            manager: "conda".to_string(),
            env_prefix: "{workdir}/.testbed/envs/py{python}".to_string(),
            packages: ["numpy", "scipy", "matplotlib", "pillow"]
                .map(String::from)
                .to_vec(),
            tools: ["nose", "coverage", "coveralls", "pep8"]
                .map(String::from)
                .to_vec(),
            editable: true,
        }
    }
}

/// ArchiveFormat はダウンロードしたフィクスチャのアーカイブ形式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArchiveFormat {
    Zip,
    TarGz,
    Tar,
}

impl ArchiveFormat {
    /// Infer the format from a file name.
    pub fn from_file_name(name: &str) -> Option<Self> {
        let lower = name.to_ascii_lowercase();
        if lower.ends_with(".zip") {
            Some(Self::Zip)
        } else if lower.ends_with(".tar.gz") || lower.ends_with(".tgz") {
            Some(Self::TarGz)
        } else if lower.ends_with(".tar") {
            Some(Self::Tar)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatasetSpec {
    pub name: String,
    pub url: String,

    /// Local path of the downloaded archive.
    pub download_to: String,

    /// Directory the archive is extracted into.
    pub extract_to: String,

    /// Inferred from `download_to` when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<ArchiveFormat>,

    /// Sub-directory of `extract_to` whose entries are moved up one level.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flatten: Option<String>,
}

impl DatasetSpec {
    /// The two fixtures the `nimfa` test suite reads.
    pub fn defaults() -> Vec<Self> {
        vec![
            Self {
                name: "movielens".to_string(),
                url: "http://files.grouplens.org/datasets/movielens/ml-100k.zip".to_string(),
                download_to: "{workdir}/ml-100k.zip".to_string(),
                extract_to: "{project}/{package}/datasets/MovieLens".to_string(),
                format: None,
                flatten: Some("ml-100k".to_string()),
            },
            Self {
                name: "cbcl_faces".to_string(),
                url: "http://cbcl.mit.edu/projects/cbcl/software-datasets/faces.tar.gz"
                    .to_string(),
                download_to: "{workdir}/faces.tar.gz".to_string(),
                extract_to: "{project}/{package}/datasets/CBCL_faces".to_string(),
                format: None,
                flatten: None,
            },
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DisplaySpec {
    pub enabled: bool,

    /// Display endpoint exported as `DISPLAY`.
    pub display: String,

    /// Server command line; `{display}` is available.
    pub command: Vec<String>,

    /// Directory holding the `X<n>` sockets.
    pub socket_dir: PathBuf,

    pub startup_timeout_ms: u64,
}

impl Default for DisplaySpec {
    fn default() -> Self {
        Self {
            enabled: true,
            display: ":99".to_string(),
            command: ["Xvfb", "{display}", "-screen", "0", "1024x768x24"]
                .map(String::from)
                .to_vec(),
            socket_dir: PathBuf::from("/tmp/.X11-unix"),
            startup_timeout_ms: 5_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TestSpec {
    pub command: Vec<String>,

    /// Coverage data written by the test command, relative to the project.
    pub coverage_file: Option<String>,
}

impl Default for TestSpec {
    fn default() -> Self {
        Self {
            command: ["nosetests", "--with-coverage", "--cover-package={package}"]
                .map(String::from)
                .to_vec(),
            coverage_file: Some(".coverage".to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CoverageSpec {
    pub enabled: bool,
    pub command: Vec<String>,

    /// Abort the run when the upload fails.
    pub fatal: bool,
}

impl Default for CoverageSpec {
    fn default() -> Self {
        Self {
            enabled: true,
            command: vec!["coveralls".to_string()],
            fatal: false,
        }
    }
}
