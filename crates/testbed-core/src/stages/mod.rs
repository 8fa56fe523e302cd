//! Stages - パイプラインの各ステージ
//!
//! 各ステージは `Stage` trait を実装し、`StageContext` を通して
//! 前のステージの成果物（環境、DISPLAY、フィクスチャ）を受け取ります。
//!
//! # 順序
//! provision → fetch_datasets → start_display → run_tests → report_coverage
//!
//! ステージ自身は失敗を回復しません。エラーはそのまま返し、
//! Runner が `Outcome` に変換して Decider に判断させます。

pub mod coverage;
pub mod display;
pub mod fetch;
pub mod provision;
pub mod run_tests;

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::warn;

use crate::domain::{
    Artifact, CommandSpec, EnvironmentDescriptor, ErrorKind, FixtureReport, Outcome,
    PipelineError, RunId, RunPlan, StageKind,
};
use crate::ports::{BackgroundProcess, CommandRunner, Downloader};

pub use self::coverage::CoverageStage;
pub use self::display::DisplayStage;
pub use self::fetch::FetchStage;
pub use self::provision::ProvisionStage;
pub use self::run_tests::TestStage;

/// Stage はパイプラインの 1 ステップ
///
/// # 使用例
/// ```ignore
/// struct Echo;
///
/// #[async_trait]
/// impl Stage for Echo {
///     fn kind(&self) -> StageKind { StageKind::RunTests }
///     async fn run(&self, ctx: &mut StageContext) -> Result<Outcome, PipelineError> {
///         Ok(Outcome::success())
///     }
/// }
/// ```
#[async_trait]
pub trait Stage: Send + Sync {
    fn kind(&self) -> StageKind;

    async fn run(&self, ctx: &mut StageContext) -> Result<Outcome, PipelineError>;
}

/// StageContext は 1 回の実行の中でステージ間が共有する状態
///
/// Runner が所有します。drop すると、明示的に止めていない
/// バックグラウンドプロセスは kill されます。
pub struct StageContext {
    pub run_id: RunId,
    pub plan: RunPlan,

    /// provision ステージが設定
    pub environment: Option<EnvironmentDescriptor>,

    /// Display endpoint exported to later commands (e.g. `:99`).
    pub display: Option<String>,

    pub fixtures: Vec<FixtureReport>,

    /// Written by the test stage, consumed by the coverage upload.
    pub coverage_file: Option<PathBuf>,

    background: Vec<Box<dyn BackgroundProcess>>,
    base_path: Option<String>,
}

impl StageContext {
    /// `PATH` of later commands starts from the one of this process.
    pub fn new(run_id: RunId, plan: RunPlan) -> Self {
        let base_path = std::env::var("PATH").ok();
        Self::with_base_path(run_id, plan, base_path)
    }

    pub fn with_base_path(run_id: RunId, plan: RunPlan, base_path: Option<String>) -> Self {
        Self {
            run_id,
            plan,
            environment: None,
            display: None,
            fixtures: Vec::new(),
            coverage_file: None,
            background: Vec::new(),
            base_path,
        }
    }

    /// Add the run environment to `cmd`: the environment `bin` in front of
    /// `PATH` once provisioned, and `DISPLAY` once a display is up.
    pub fn prepare(&self, mut cmd: CommandSpec) -> CommandSpec {
        if let Some(env) = &self.environment {
            let bin = env.bin_dir.display().to_string();
            let path = match self.base_path.as_deref().filter(|p| !p.is_empty()) {
                Some(base) => format!("{bin}:{base}"),
                None => bin,
            };
            cmd.env.insert("PATH".to_string(), path);
        }
        if let Some(display) = &self.display {
            cmd.env.insert("DISPLAY".to_string(), display.clone());
        }
        cmd
    }

    /// 実行の終わりまでバックグラウンドプロセスを保持
    pub fn adopt(&mut self, process: Box<dyn BackgroundProcess>) {
        self.background.push(process);
    }

    pub fn background_count(&self) -> usize {
        self.background.len()
    }

    /// バックグラウンドプロセスを新しい順に停止。失敗はログのみ
    pub async fn shutdown(&mut self) {
        while let Some(process) = self.background.pop() {
            let pid = process.pid();
            if let Err(err) = process.terminate().await {
                warn!(run_id = %self.run_id, ?pid, error = %err, "failed to stop background process");
            }
        }
    }
}

/// Run a prepared command and fail with `kind` on a non-zero exit.
pub(crate) async fn exec(
    runner: &dyn CommandRunner,
    cmd: CommandSpec,
    kind: ErrorKind,
) -> Result<Artifact, PipelineError> {
    runner.run(&cmd).await?.ensure_success(kind, &cmd)?;
    Ok(Artifact::Command(cmd.display_line()))
}

/// 5 つのステージをパイプライン順で返す
pub fn standard(
    runner: Arc<dyn CommandRunner>,
    downloader: Arc<dyn Downloader>,
) -> Vec<Arc<dyn Stage>> {
    vec![
        Arc::new(ProvisionStage::new(runner.clone(), downloader.clone())),
        Arc::new(FetchStage::new(downloader)),
        Arc::new(DisplayStage::new(runner.clone())),
        Arc::new(TestStage::new(runner.clone())),
        Arc::new(CoverageStage::new(runner)),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{plan_in, run_id};

    #[test]
    fn prepare_adds_nothing_before_provisioning() {
        let ctx = StageContext::with_base_path(run_id(), plan_in("/ci"), Some("/usr/bin".into()));
        let cmd = ctx.prepare(CommandSpec::new("nosetests"));
        assert!(cmd.env.is_empty());
    }

    #[test]
    fn prepare_prepends_env_bin_and_exports_display() {
        let mut ctx =
            StageContext::with_base_path(run_id(), plan_in("/ci"), Some("/usr/bin:/bin".into()));
        ctx.environment = Some(EnvironmentDescriptor::new(
            "3.4",
            "/ci/envs/py3.4",
            vec![],
            vec![],
        ));
        ctx.display = Some(":99".into());

        let cmd = ctx.prepare(CommandSpec::new("nosetests").env("KEEP", "1"));
        assert_eq!(cmd.env["PATH"], "/ci/envs/py3.4/bin:/usr/bin:/bin");
        assert_eq!(cmd.env["DISPLAY"], ":99");
        assert_eq!(cmd.env["KEEP"], "1");
    }

    #[test]
    fn prepare_without_inherited_path_uses_env_bin_only() {
        let mut ctx = StageContext::with_base_path(run_id(), plan_in("/ci"), None);
        ctx.environment = Some(EnvironmentDescriptor::new("2.7", "/e", vec![], vec![]));
        assert_eq!(ctx.prepare(CommandSpec::new("x")).env["PATH"], "/e/bin");
    }

    #[test]
    fn standard_stages_follow_pipeline_order() {
        let (runner, downloader) = crate::testing::fakes();
        let kinds: Vec<_> = standard(runner, downloader).iter().map(|s| s.kind()).collect();
        assert_eq!(kinds, StageKind::ORDER.to_vec());
    }
}
