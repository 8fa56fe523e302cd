//! Events - ドメインイベント
//!
//! Runner が状態遷移ごとに EventSink へ送ります。
//! テストでは順序の検証（provision が先に終わる、など）に使います。

use serde::Serialize;

use super::ids::{RunId, StageRunId};
use super::outcome::OutcomeKind;
use super::run::RunState;
use super::stage::{StageKind, StageState};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum DomainEvent {
    RunStarted {
        run_id: RunId,
        python: String,
    },
    StageStarted {
        run_id: RunId,
        stage_run_id: StageRunId,
        stage: StageKind,
    },
    StageFinished {
        run_id: RunId,
        stage_run_id: StageRunId,
        stage: StageKind,
        outcome: OutcomeKind,
        /// `tolerated` when a non-fatal stage failed.
        state: StageState,
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    StageSkipped {
        run_id: RunId,
        stage: StageKind,
        reason: String,
    },
    RunFinished {
        run_id: RunId,
        state: RunState,
    },
}

impl DomainEvent {
    pub fn run_id(&self) -> RunId {
        match self {
            DomainEvent::RunStarted { run_id, .. }
            | DomainEvent::StageStarted { run_id, .. }
            | DomainEvent::StageFinished { run_id, .. }
            | DomainEvent::StageSkipped { run_id, .. }
            | DomainEvent::RunFinished { run_id, .. } => *run_id,
        }
    }

    /// Stage this event concerns, if any.
    pub fn stage(&self) -> Option<StageKind> {
        match self {
            DomainEvent::StageStarted { stage, .. }
            | DomainEvent::StageFinished { stage, .. }
            | DomainEvent::StageSkipped { stage, .. } => Some(*stage),
            DomainEvent::RunStarted { .. } | DomainEvent::RunFinished { .. } => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            DomainEvent::RunStarted { .. } => "run_started",
            DomainEvent::StageStarted { .. } => "stage_started",
            DomainEvent::StageFinished { .. } => "stage_finished",
            DomainEvent::StageSkipped { .. } => "stage_skipped",
            DomainEvent::RunFinished { .. } => "run_finished",
        }
    }
}
