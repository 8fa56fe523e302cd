//! Display stage: start a headless X server in the background and wait for its
//! socket.
//!
//! The server stays up for the rest of the run; the runner stops it through
//! `StageContext::shutdown` when the run ends.
//!
//! 前回の実行が残したソケットは起動前に消します。残っていると新しい
//! サーバーがまだ listen していなくても ready と判定してしまうためです。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::domain::{Artifact, ErrorKind, Outcome, PipelineError, StageKind};
use crate::ports::CommandRunner;

use super::{Stage, StageContext};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

pub struct DisplayStage {
    runner: Arc<dyn CommandRunner>,
}

impl DisplayStage {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }
}

#[async_trait]
impl Stage for DisplayStage {
    fn kind(&self) -> StageKind {
        StageKind::StartDisplay
    }

    async fn run(&self, ctx: &mut StageContext) -> Result<Outcome, PipelineError> {
        let plan = ctx
            .plan
            .display
            .clone()
            .ok_or(PipelineError::MissingContext("display plan"))?;
        let not_ready = |reason: String| PipelineError::Display {
            display: plan.display.clone(),
            reason,
        };

        match tokio::fs::remove_file(&plan.socket).await {
            Ok(()) => warn!(
                run_id = %ctx.run_id,
                socket = %plan.socket.display(),
                "removed stale display socket"
            ),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(PipelineError::io(
                    ErrorKind::Display,
                    format!("removing stale {}", plan.socket.display()),
                    e,
                ));
            }
        }

        let cmd = ctx.prepare(plan.command.clone());
        let mut process = self.runner.spawn(&cmd).await?;
        let deadline = Instant::now() + plan.startup_timeout;

        loop {
            if let Some(status) = process.try_status()? {
                return Err(not_ready(match status.code {
                    Some(code) => format!("server exited with code {code}"),
                    None => "server was killed".to_string(),
                }));
            }
            if plan.socket.exists() {
                break;
            }
            if Instant::now() >= deadline {
                if let Err(err) = process.terminate().await {
                    warn!(run_id = %ctx.run_id, error = %err, "failed to stop display server");
                }
                return Err(not_ready(format!(
                    "{} did not appear within {}ms",
                    plan.socket.display(),
                    plan.startup_timeout.as_millis()
                )));
            }
            debug!(socket = %plan.socket.display(), "waiting for display socket");
            tokio::time::sleep(POLL_INTERVAL).await;
        }

        info!(
            run_id = %ctx.run_id,
            display = %plan.display,
            pid = ?process.pid(),
            "display ready"
        );
        ctx.adopt(process);
        ctx.display = Some(plan.display.clone());

        Ok(Outcome::success()
            .with_artifact(Artifact::Command(cmd.display_line()))
            .with_artifact(Artifact::Display(plan.display.clone())))
    }
}
