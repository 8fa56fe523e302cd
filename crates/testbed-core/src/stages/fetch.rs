//! Fetch stage: download every dataset archive, unpack it into its fixture
//! directory and check the directory is populated.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::domain::{
    Artifact, DatasetPlan, ErrorKind, FixtureReport, Outcome, PipelineError, StageKind,
};
use crate::impls::archive;
use crate::ports::Downloader;

use super::{Stage, StageContext};

pub struct FetchStage {
    downloader: Arc<dyn Downloader>,
}

impl FetchStage {
    pub fn new(downloader: Arc<dyn Downloader>) -> Self {
        Self { downloader }
    }

    async fn fetch(&self, ds: &DatasetPlan) -> Result<FixtureReport, PipelineError> {
        let bytes = self.downloader.download(&ds.url, &ds.archive).await?;

        let unpack = ds.clone();
        let entries = tokio::task::spawn_blocking(move || {
            archive::extract(&unpack.archive, unpack.format, &unpack.dest)?;
            if let Some(sub) = &unpack.flatten {
                archive::flatten(&unpack.dest, sub)?;
            }
            archive::ensure_populated(&unpack.dest)
        })
        .await
        .map_err(|e| PipelineError::Extract {
            archive: ds.archive.clone(),
            reason: format!("extraction task failed: {e}"),
        })??;

        Ok(FixtureReport {
            name: ds.name.clone(),
            url: ds.url.clone(),
            archive: ds.archive.clone(),
            dest: ds.dest.clone(),
            bytes,
            entries,
        })
    }
}

#[async_trait]
impl Stage for FetchStage {
    fn kind(&self) -> StageKind {
        StageKind::FetchDatasets
    }

    async fn run(&self, ctx: &mut StageContext) -> Result<Outcome, PipelineError> {
        let datasets = ctx.plan.datasets.clone();
        let mut outcome = Outcome::success();

        for ds in &datasets {
            let report = self.fetch(ds).await?;
            info!(
                run_id = %ctx.run_id,
                dataset = %report.name,
                dest = %report.dest.display(),
                bytes = report.bytes,
                entries = report.entries,
                "fixture ready"
            );
            let json = serde_json::to_value(&report)
                .map_err(|e| PipelineError::io(ErrorKind::Fetch, "encoding fixture report", e.into()))?;
            outcome = outcome.with_artifacts([
                Artifact::Url(report.url.clone()),
                Artifact::FilePath(report.dest.display().to_string()),
                Artifact::Json(json),
            ]);
            ctx.fixtures.push(report);
        }

        // recheck once every archive is unpacked
        for report in &ctx.fixtures {
            archive::ensure_populated(&report.dest)?;
        }
        Ok(outcome)
    }
}
