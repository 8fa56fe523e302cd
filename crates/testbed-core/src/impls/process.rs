//! `CommandRunner` on top of `tokio::process`.
//!
//! stdout/stderr are inherited: the tools print to the CI console directly.
//!
//! バックグラウンドプロセスの停止は SIGTERM → 猶予 → SIGKILL の順です。
//! Xvfb は SIGTERM でソケットとロックファイルを片付けます。

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::{Child, Command};
use tracing::{debug, info, instrument, warn};

use crate::domain::{CommandSpec, ErrorKind, PipelineError};
use crate::ports::{BackgroundProcess, CommandRunner, CommandStatus};

/// SIGTERM から SIGKILL までの既定の猶予
pub const DEFAULT_TERM_GRACE: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy)]
pub struct ProcessRunner {
    term_grace: Duration,
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self {
            term_grace: DEFAULT_TERM_GRACE,
        }
    }
}

impl ProcessRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// バックグラウンドプロセスが SIGTERM 後に終了するまで待つ時間
    pub fn with_term_grace(mut self, grace: Duration) -> Self {
        self.term_grace = grace;
        self
    }

    fn command(cmd: &CommandSpec) -> Command {
        let mut command = Command::new(&cmd.program);
        command
            .args(&cmd.args)
            .envs(&cmd.env)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        if let Some(dir) = &cmd.cwd {
            command.current_dir(dir);
        }
        command
    }

    fn spawn_error(cmd: &CommandSpec, source: std::io::Error) -> PipelineError {
        PipelineError::Spawn {
            program: cmd.program.clone(),
            source,
        }
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    #[instrument(name = "command_run", skip(self, cmd), fields(command = %cmd.display_line()))]
    async fn run(&self, cmd: &CommandSpec) -> Result<CommandStatus, PipelineError> {
        info!("command start");
        let status = Self::command(cmd)
            .status()
            .await
            .map_err(|e| Self::spawn_error(cmd, e))?;
        let status = CommandStatus {
            code: status.code(),
        };
        info!(code = ?status.code, "command exit");
        Ok(status)
    }

    #[instrument(name = "command_spawn", skip(self, cmd), fields(command = %cmd.display_line()))]
    async fn spawn(&self, cmd: &CommandSpec) -> Result<Box<dyn BackgroundProcess>, PipelineError> {
        let child = Self::command(cmd)
            .stdout(Stdio::null())
            .spawn()
            .map_err(|e| Self::spawn_error(cmd, e))?;
        info!(pid = ?child.id(), "background process started");
        Ok(Box::new(ChildProcess {
            child,
            program: cmd.program.clone(),
            grace: self.term_grace,
        }))
    }
}

struct ChildProcess {
    child: Child,
    program: String,
    grace: Duration,
}

impl ChildProcess {
    fn io_err(&self, action: &str, source: std::io::Error) -> PipelineError {
        PipelineError::io(ErrorKind::Display, format!("{action} {}", self.program), source)
    }

    /// SIGTERM を送る。送れなかった場合は false。
    #[cfg(unix)]
    fn request_stop(&self) -> bool {
        use nix::sys::signal::{Signal, kill};
        use nix::unistd::Pid;

        let Some(pid) = self.child.id().and_then(|id| i32::try_from(id).ok()) else {
            return false;
        };
        match kill(Pid::from_raw(pid), Signal::SIGTERM) {
            Ok(()) => true,
            Err(errno) => {
                debug!(program = %self.program, pid, %errno, "SIGTERM not delivered");
                false
            }
        }
    }

    #[cfg(not(unix))]
    fn request_stop(&self) -> bool {
        false
    }
}

#[async_trait]
impl BackgroundProcess for ChildProcess {
    fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    fn try_status(&mut self) -> Result<Option<CommandStatus>, PipelineError> {
        self.child
            .try_wait()
            .map(|s| s.map(|s| CommandStatus { code: s.code() }))
            .map_err(|e| self.io_err("polling", e))
    }

    async fn terminate(self: Box<Self>) -> Result<(), PipelineError> {
        let mut this = self;
        if this.try_status()?.is_some() {
            return Ok(());
        }
        debug!(program = %this.program, "terminating background process");
        if this.request_stop() {
            match tokio::time::timeout(this.grace, this.child.wait()).await {
                Ok(Ok(_)) => return Ok(()),
                Ok(Err(e)) => return Err(this.io_err("waiting for", e)),
                Err(_) => warn!(
                    program = %this.program,
                    grace_ms = this.grace.as_millis() as u64,
                    "still running after SIGTERM, killing"
                ),
            }
        }
        let result = this.child.kill().await;
        result.map_err(|e| this.io_err("killing", e))
    }
}
