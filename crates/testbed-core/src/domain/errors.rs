//! Errors - エラー型と分類
//!
//! `ErrorKind` は運用上の分類（どのステージで止まったか）、
//! `PipelineError` は実際のエラー値です。

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// ErrorKind は失敗の運用上の分類
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Config,
    Provisioning,
    Fetch,
    Display,
    Test,
    Reporting,
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("failed to start `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` exited with {}", exit_label(.code))]
    CommandFailed {
        kind: ErrorKind,
        command: String,
        code: Option<i32>,
    },

    #[error("download of {url} failed: {reason}")]
    Download { url: String, reason: String },

    #[error("extracting {} failed: {reason}", .archive.display())]
    Extract { archive: PathBuf, reason: String },

    #[error("fixture directory {} is missing or empty", .0.display())]
    FixtureMissing(PathBuf),

    #[error("display server {display} not ready: {reason}")]
    Display { display: String, reason: String },

    #[error("stage requires {0}, which has not been produced")]
    MissingContext(&'static str),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("{context}: {source}")]
    Io {
        kind: ErrorKind,
        context: String,
        #[source]
        source: std::io::Error,
    },
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("exit code {code}"),
        None => "a signal".to_string(),
    }
}

impl PipelineError {
    pub fn io(kind: ErrorKind, context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            kind,
            context: context.into(),
            source,
        }
    }

    /// Stage-independent errors fall back to `fallback`.
    pub fn kind_or(&self, fallback: ErrorKind) -> ErrorKind {
        match self {
            PipelineError::CommandFailed { kind, .. } | PipelineError::Io { kind, .. } => *kind,
            PipelineError::Extract { .. } | PipelineError::FixtureMissing(_) => ErrorKind::Fetch,
            PipelineError::Display { .. } => ErrorKind::Display,
            PipelineError::Config(_) => ErrorKind::Config,
            PipelineError::Spawn { .. }
            | PipelineError::Download { .. }
            | PipelineError::MissingContext(_) => fallback,
        }
    }
}
