//! Test stage: run the coverage-instrumented suite in the project directory.
//!
//! カバレッジファイルは実行前に消します。マトリクスの前の実行が残した
//! ファイルを今回の結果として扱わないためです。

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::domain::{Artifact, ErrorKind, Outcome, PipelineError, StageKind};
use crate::ports::CommandRunner;

use super::{Stage, StageContext, exec};

pub struct TestStage {
    runner: Arc<dyn CommandRunner>,
}

impl TestStage {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl Stage for TestStage {
    fn kind(&self) -> StageKind {
        StageKind::RunTests
    }

    async fn run(&self, ctx: &mut StageContext) -> Result<Outcome, PipelineError> {
        let plan = ctx.plan.tests.clone();
        ctx.coverage_file = None;
        if let Some(file) = &plan.coverage_file {
            match tokio::fs::remove_file(file).await {
                Ok(()) => debug!(
                    run_id = %ctx.run_id,
                    coverage = %file.display(),
                    "removed stale coverage data"
                ),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(PipelineError::io(
                        ErrorKind::Test,
                        format!("removing stale {}", file.display()),
                        e,
                    ));
                }
            }
        }

        let cmd = ctx.prepare(plan.command);
        let command = exec(self.runner.as_ref(), cmd, ErrorKind::Test).await?;
        let mut outcome = Outcome::success().with_artifact(command);

        if let Some(file) = plan.coverage_file {
            if file.is_file() {
                info!(run_id = %ctx.run_id, coverage = %file.display(), "coverage data written");
                outcome = outcome.with_artifact(Artifact::FilePath(file.display().to_string()));
                ctx.coverage_file = Some(file);
            } else {
                warn!(run_id = %ctx.run_id, coverage = %file.display(), "no coverage data after test run");
            }
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::EnvironmentDescriptor;
    use crate::testing::{RecordingRunner, plan_in, run_id};

    #[tokio::test]
    async fn runs_in_project_dir_with_env_and_display() {
        let dir = tempfile::tempdir().unwrap();
        let runner =
            Arc::new(RecordingRunner::new().creates("nosetests", dir.path().join(".coverage")));
        let mut ctx =
            StageContext::with_base_path(run_id(), plan_in(dir.path()), Some("/usr/bin".into()));
        ctx.environment = Some(EnvironmentDescriptor::new("2.7", "/envs/py2.7", vec![], vec![]));
        ctx.display = Some(":99".into());

        let outcome = TestStage::new(runner.clone()).run(&mut ctx).await.unwrap();

        let cmd = runner.find("nosetests").unwrap();
        assert_eq!(cmd.args, vec!["--with-coverage", "--cover-package=nimfa"]);
        assert_eq!(cmd.cwd.as_deref(), Some(dir.path()));
        assert_eq!(cmd.env["PATH"], "/envs/py2.7/bin:/usr/bin");
        assert_eq!(cmd.env["DISPLAY"], ":99");

        let coverage = dir.path().join(".coverage");
        assert_eq!(ctx.coverage_file.as_deref(), Some(coverage.as_path()));
        assert!(
            outcome
                .artifacts
                .contains(&Artifact::FilePath(coverage.display().to_string()))
        );
    }

    #[tokio::test]
    async fn failing_suite_is_a_test_error() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(RecordingRunner::new().exit_code("nosetests", 1));
        let mut ctx = StageContext::with_base_path(run_id(), plan_in(dir.path()), None);

        let err = TestStage::new(runner).run(&mut ctx).await.unwrap_err();
        assert!(matches!(
            err,
            PipelineError::CommandFailed { kind: ErrorKind::Test, code: Some(1), .. }
        ));
        assert!(ctx.coverage_file.is_none());
    }

    #[tokio::test]
    async fn coverage_left_by_an_earlier_run_is_not_reported() {
        let dir = tempfile::tempdir().unwrap();
        let stale = dir.path().join(".coverage");
        std::fs::write(&stale, b"!coverage from 2.7").unwrap();
        let runner = Arc::new(RecordingRunner::new());
        let mut ctx = StageContext::with_base_path(run_id(), plan_in(dir.path()), None);

        let outcome = TestStage::new(runner).run(&mut ctx).await.unwrap();

        assert!(ctx.coverage_file.is_none());
        assert!(!stale.exists());
        assert!(
            !outcome
                .artifacts
                .contains(&Artifact::FilePath(stale.display().to_string()))
        );
    }

    #[tokio::test]
    async fn missing_coverage_file_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(RecordingRunner::new());
        let mut ctx = StageContext::with_base_path(run_id(), plan_in(dir.path()), None);

        let outcome = TestStage::new(runner).run(&mut ctx).await.unwrap();
        assert!(outcome.is_success());
        assert!(ctx.coverage_file.is_none());
    }
}
