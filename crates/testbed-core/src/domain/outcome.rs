//! Outcome model: common result format for a stage execution.
//!
//! A stage returns an `Outcome` on success; stage errors are converted into a
//! `FAILURE` outcome by the runner so every stage leaves the same shape
//! behind in the run report.

use serde::{Deserialize, Serialize};

use super::errors::ErrorKind;

/// OutcomeKind はステージ結果の分類
///
/// Serialized as SCREAMING_SNAKE_CASE: SUCCESS / FAILURE / SKIPPED.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutcomeKind {
    Success,
    Failure,
    Skipped,
}

/// Artifact はステージ中に生成・観測されたもの
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value")]
pub enum Artifact {
    /// A command line that was executed.
    Command(String),

    /// Path to a file or directory produced/used.
    FilePath(String),

    /// URL that was fetched.
    Url(String),

    /// Display endpoint exported to later stages (e.g. `:99`).
    Display(String),

    /// Structured observation.
    Json(serde_json::Value),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Outcome {
    pub kind: OutcomeKind,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub artifacts: Vec<Artifact>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
}

impl Outcome {
    pub fn success() -> Self {
        Self {
            kind: OutcomeKind::Success,
            artifacts: Vec::new(),
            reason: None,
            error_kind: None,
        }
    }

    pub fn failure(error_kind: ErrorKind, reason: impl Into<String>) -> Self {
        Self {
            kind: OutcomeKind::Failure,
            artifacts: Vec::new(),
            reason: Some(reason.into()),
            error_kind: Some(error_kind),
        }
    }

    pub fn skipped(reason: impl Into<String>) -> Self {
        Self {
            kind: OutcomeKind::Skipped,
            artifacts: Vec::new(),
            reason: Some(reason.into()),
            error_kind: None,
        }
    }

    pub fn with_artifact(mut self, artifact: Artifact) -> Self {
        self.artifacts.push(artifact);
        self
    }

    pub fn with_artifacts(mut self, artifacts: impl IntoIterator<Item = Artifact>) -> Self {
        self.artifacts.extend(artifacts);
        self
    }

    pub fn is_success(&self) -> bool {
        self.kind == OutcomeKind::Success
    }
}
