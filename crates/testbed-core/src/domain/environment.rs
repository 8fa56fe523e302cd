//! Artifacts handed from one stage to the next within a run.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// EnvironmentDescriptor は provision ステージが作る隔離環境
///
/// 実行ごとに 1 回作られ、以後変更されません。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentDescriptor {
    pub python: String,
    pub packages: Vec<String>,
    pub tools: Vec<String>,
    pub prefix: PathBuf,
    pub bin_dir: PathBuf,
}

impl EnvironmentDescriptor {
    pub fn new(
        python: impl Into<String>,
        prefix: impl Into<PathBuf>,
        packages: Vec<String>,
        tools: Vec<String>,
    ) -> Self {
        let prefix = prefix.into();
        Self {
            python: python.into(),
            packages,
            tools,
            bin_dir: prefix.join("bin"),
            prefix,
        }
    }

    /// Path of an executable installed in the environment.
    pub fn bin(&self, name: &str) -> PathBuf {
        self.bin_dir.join(name)
    }
}

/// FixtureReport は展開済みデータセット 1 つ分の記録
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixtureReport {
    pub name: String,
    pub url: String,
    pub archive: PathBuf,
    pub dest: PathBuf,
    pub bytes: u64,
    pub entries: usize,
}
