//! Stage and decision records: the execution history of a run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::StageRunId;
use super::outcome::{Outcome, OutcomeKind};
use super::stage::{StageKind, StageState};

/// StageRecord は 1 ステージ分の実行記録
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageRecord {
    pub stage: StageKind,
    pub state: StageState,

    /// Only set once the stage actually started.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage_run_id: Option<StageRunId>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<Outcome>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
}

impl StageRecord {
    pub fn pending(stage: StageKind) -> Self {
        Self {
            stage,
            state: StageState::Pending,
            stage_run_id: None,
            outcome: None,
            started_at: None,
            finished_at: None,
        }
    }

    pub fn start(&mut self, id: StageRunId, now: DateTime<Utc>) {
        self.state = StageState::Running;
        self.stage_run_id = Some(id);
        self.started_at = Some(now);
    }

    /// Record the outcome; `tolerated` marks a failure of a non-fatal stage.
    pub fn finish(&mut self, outcome: Outcome, tolerated: bool, now: DateTime<Utc>) {
        self.state = match outcome.kind {
            OutcomeKind::Success => StageState::Succeeded,
            OutcomeKind::Failure if tolerated => StageState::Tolerated,
            OutcomeKind::Failure => StageState::Failed,
            OutcomeKind::Skipped => StageState::Skipped,
        };
        self.outcome = Some(outcome);
        self.finished_at = Some(now);
    }

    pub fn skip(&mut self, reason: impl Into<String>) {
        self.state = StageState::Skipped;
        self.outcome = Some(Outcome::skipped(reason));
    }

    pub fn duration_ms(&self) -> Option<i64> {
        match (self.started_at, self.finished_at) {
            (Some(start), Some(end)) => Some((end - start).num_milliseconds()),
            _ => None,
        }
    }
}

/// DecisionRecord はステージ後に続行・停止した理由
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionRecord {
    pub stage: StageKind,

    /// Outcome that triggered the decision.
    pub trigger: OutcomeKind,

    /// Policy applied (e.g. "fail_fast").
    pub policy: String,

    /// "proceed", "tolerate" or "abort".
    pub decision: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    pub decided_at: DateTime<Utc>,
}
