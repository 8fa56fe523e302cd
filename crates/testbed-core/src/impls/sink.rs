//! EventSink implementations.

use std::sync::{Mutex, PoisonError};

use tracing::{error, info, warn};

use crate::domain::{DomainEvent, RunState, StageState};
use crate::ports::EventSink;

/// TracingEventSink はイベントを `tracing` に流す
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn emit(&self, event: &DomainEvent) {
        match event {
            DomainEvent::RunStarted { run_id, python } => {
                info!(%run_id, %python, "run started");
            }
            DomainEvent::StageStarted {
                run_id,
                stage_run_id,
                stage,
            } => {
                info!(%run_id, %stage_run_id, %stage, "stage started");
            }
            DomainEvent::StageFinished {
                run_id,
                stage,
                state: StageState::Failed,
                reason,
                ..
            } => {
                error!(%run_id, %stage, reason = reason.as_deref().unwrap_or(""), "stage failed");
            }
            DomainEvent::StageFinished {
                run_id,
                stage,
                state: StageState::Tolerated,
                reason,
                ..
            } => {
                warn!(%run_id, %stage, reason = reason.as_deref().unwrap_or(""), "stage failed, continuing");
            }
            DomainEvent::StageFinished {
                run_id,
                stage,
                outcome,
                ..
            } => {
                info!(%run_id, %stage, ?outcome, "stage finished");
            }
            DomainEvent::StageSkipped {
                run_id,
                stage,
                reason,
            } => {
                info!(%run_id, %stage, %reason, "stage skipped");
            }
            DomainEvent::RunFinished {
                run_id,
                state: RunState::Failed,
            } => {
                error!(%run_id, "run failed");
            }
            DomainEvent::RunFinished { run_id, state } => {
                info!(%run_id, ?state, "run finished");
            }
        }
    }
}

/// MemoryEventSink は全イベントをメモリに保持（テスト用）
#[derive(Debug, Default)]
pub struct MemoryEventSink {
    events: Mutex<Vec<DomainEvent>>,
}

impl MemoryEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<DomainEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl EventSink for MemoryEventSink {
    fn emit(&self, event: &DomainEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event.clone());
    }
}
