//! Provision stage: build an isolated interpreter environment and install the
//! project under test into it.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::domain::{
    Artifact, CommandSpec, EnvironmentDescriptor, ErrorKind, Outcome, PipelineError, StageKind,
};
use crate::ports::{CommandRunner, Downloader};

use super::{Stage, StageContext, exec};

const KIND: ErrorKind = ErrorKind::Provisioning;

pub struct ProvisionStage {
    runner: Arc<dyn CommandRunner>,
    downloader: Arc<dyn Downloader>,
}

impl ProvisionStage {
    pub fn new(runner: Arc<dyn CommandRunner>, downloader: Arc<dyn Downloader>) -> Self {
        Self { runner, downloader }
    }
}

#[async_trait]
impl Stage for ProvisionStage {
    fn kind(&self) -> StageKind {
        StageKind::Provision
    }

    async fn run(&self, ctx: &mut StageContext) -> Result<Outcome, PipelineError> {
        let plan = ctx
            .plan
            .provision
            .clone()
            .ok_or(PipelineError::MissingContext("provision plan"))?;
        let python = ctx.plan.python.clone();
        let runner = self.runner.as_ref();
        let mut artifacts = Vec::new();

        if let Some(installer) = &plan.installer {
            self.downloader
                .download(&installer.url, &installer.script)
                .await
                .map_err(|e| match e {
                    PipelineError::Download { url, reason } => PipelineError::Download {
                        url,
                        reason: format!("installer: {reason}"),
                    },
                    other => other,
                })?;
            artifacts.push(Artifact::Url(installer.url.clone()));

            // -u lets a second run reuse an existing prefix
            let cmd = CommandSpec::new("bash")
                .arg(installer.script.display().to_string())
                .args(["-b", "-u", "-p"])
                .arg(installer.prefix.display().to_string());
            artifacts.push(exec(runner, ctx.prepare(cmd), KIND).await?);
        }

        let create = CommandSpec::new(plan.manager.clone())
            .args(["create", "-q", "-y", "-p"])
            .arg(plan.env_prefix.display().to_string())
            .arg(format!("python={python}"))
            .args(plan.packages.iter().cloned());
        artifacts.push(exec(runner, ctx.prepare(create), KIND).await?);

        let env = EnvironmentDescriptor::new(
            python,
            plan.env_prefix.clone(),
            plan.packages.clone(),
            plan.tools.clone(),
        );
        let pip = env.bin("pip").display().to_string();

        if !plan.tools.is_empty() {
            let cmd = CommandSpec::new(pip.clone())
                .arg("install")
                .args(plan.tools.iter().cloned());
            artifacts.push(exec(runner, ctx.prepare(cmd), KIND).await?);
        }

        if plan.editable {
            let cmd = CommandSpec::new(pip)
                .args(["install", "-e"])
                .arg(ctx.plan.project_dir.display().to_string())
                .cwd(ctx.plan.project_dir.clone());
            artifacts.push(exec(runner, ctx.prepare(cmd), KIND).await?);
        }

        info!(
            run_id = %ctx.run_id,
            python = %env.python,
            prefix = %env.prefix.display(),
            "environment ready"
        );
        let descriptor = serde_json::to_value(&env).map_err(|e| {
            PipelineError::io(KIND, "encoding environment", e.into())
        })?;
        ctx.environment = Some(env);

        Ok(Outcome::success()
            .with_artifacts(artifacts)
            .with_artifact(Artifact::Json(descriptor)))
    }
}
