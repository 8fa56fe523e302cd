//! Coverage stage: upload the coverage data once after a green test run.

use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::{ErrorKind, Outcome, PipelineError, StageKind};
use crate::ports::CommandRunner;

use super::{Stage, StageContext, exec};

pub struct CoverageStage {
    runner: Arc<dyn CommandRunner>,
}

impl CoverageStage {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl Stage for CoverageStage {
    fn kind(&self) -> StageKind {
        StageKind::ReportCoverage
    }

    async fn run(&self, ctx: &mut StageContext) -> Result<Outcome, PipelineError> {
        let plan = ctx
            .plan
            .coverage
            .clone()
            .ok_or(PipelineError::MissingContext("coverage plan"))?;
        let cmd = ctx.prepare(plan.command);
        let command = exec(self.runner.as_ref(), cmd, ErrorKind::Reporting).await?;
        Ok(Outcome::success().with_artifact(command))
    }
}
