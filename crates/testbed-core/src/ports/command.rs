//! CommandRunner port - 外部コマンドの実行
//!
//! プロビジョニング、テスト、カバレッジ送信はすべて外部コマンドです。
//! ステージはこの trait 越しにコマンドを実行するので、テストでは
//! 記録用の fake に差し替えられます。

use async_trait::async_trait;

use crate::domain::{CommandSpec, ErrorKind, PipelineError};

/// Exit status of a finished command. `code` is `None` when killed by a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandStatus {
    pub code: Option<i32>,
}

impl CommandStatus {
    pub fn exited(code: i32) -> Self {
        Self { code: Some(code) }
    }

    pub fn success(self) -> bool {
        self.code == Some(0)
    }

    /// Turn a non-zero exit into a `CommandFailed` of `kind`.
    pub fn ensure_success(self, kind: ErrorKind, cmd: &CommandSpec) -> Result<(), PipelineError> {
        if self.success() {
            Ok(())
        } else {
            Err(PipelineError::CommandFailed {
                kind,
                command: cmd.display_line(),
                code: self.code,
            })
        }
    }
}

/// BackgroundProcess は実行が所有する常駐プロセス（ディスプレイサーバー）
///
/// ハンドルを drop するとプロセスは kill されます。
#[async_trait]
pub trait BackgroundProcess: Send {
    fn pid(&self) -> Option<u32>;

    /// 終了済みなら `Some`
    fn try_status(&mut self) -> Result<Option<CommandStatus>, PipelineError>;

    async fn terminate(self: Box<Self>) -> Result<(), PipelineError>;
}

#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// 完了まで実行。出力はコンソールへ
    async fn run(&self, cmd: &CommandSpec) -> Result<CommandStatus, PipelineError>;

    /// バックグラウンドで起動
    async fn spawn(&self, cmd: &CommandSpec) -> Result<Box<dyn BackgroundProcess>, PipelineError>;
}
