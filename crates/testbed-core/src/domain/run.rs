//! Run record and report.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::RunId;
use super::record::{DecisionRecord, StageRecord};
use super::stage::{StageKind, StageState};

/// RunState は実行の状態（ステージから集計）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    /// At least one stage is pending or running.
    Running,

    /// Every stage succeeded, was tolerated or was disabled.
    Succeeded,

    /// A fatal stage failed.
    Failed,
}

/// RunRecord はマトリクスの 1 インタプリタ分の実行記録
///
/// 状態遷移はメソッド経由のみ。所有者は Runner です。
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub run_id: RunId,
    pub python: String,
    pub state: RunState,
    pub stages: Vec<StageRecord>,
    pub decisions: Vec<DecisionRecord>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl RunRecord {
    pub fn new(run_id: RunId, python: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            run_id,
            python: python.into(),
            state: RunState::Running,
            stages: StageKind::ORDER.iter().copied().map(StageRecord::pending).collect(),
            decisions: Vec::new(),
            started_at: now,
            finished_at: None,
        }
    }

    pub fn stage(&self, kind: StageKind) -> &StageRecord {
        // ORDER index == position, built in `new`
        &self.stages[kind as usize]
    }

    pub fn stage_mut(&mut self, kind: StageKind) -> &mut StageRecord {
        &mut self.stages[kind as usize]
    }

    /// Skip every stage still pending.
    pub fn skip_pending(&mut self, reason: &str) -> Vec<StageKind> {
        let mut skipped = Vec::new();
        for rec in &mut self.stages {
            if rec.state == StageState::Pending {
                rec.skip(reason);
                skipped.push(rec.stage);
            }
        }
        skipped
    }

    pub fn finish(&mut self, now: DateTime<Utc>) {
        self.update_state_from_stages();
        self.finished_at = Some(now);
    }

    /// Update run state based on stage states.
    pub fn update_state_from_stages(&mut self) {
        self.state = if self.stages.iter().any(|s| s.state == StageState::Failed) {
            RunState::Failed
        } else if self.stages.iter().all(|s| s.state.is_terminal()) {
            RunState::Succeeded
        } else {
            RunState::Running
        };
    }

    pub fn report(&self) -> RunReport {
        RunReport {
            run_id: self.run_id,
            python: self.python.clone(),
            state: self.state,
            started_at: self.started_at,
            finished_at: self.finished_at,
            counts: StageCounts::from_stages(&self.stages),
            stages: self.stages.clone(),
            decisions: self.decisions.clone(),
        }
    }
}

/// Number of stages per terminal state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageCounts {
    pub succeeded: usize,
    pub failed: usize,
    pub tolerated: usize,
    pub skipped: usize,
}

impl StageCounts {
    pub fn from_stages(stages: &[StageRecord]) -> Self {
        let mut counts = Self::default();
        for s in stages {
            match s.state {
                StageState::Succeeded => counts.succeeded += 1,
                StageState::Failed => counts.failed += 1,
                StageState::Tolerated => counts.tolerated += 1,
                StageState::Skipped => counts.skipped += 1,
                StageState::Pending | StageState::Running => {}
            }
        }
        counts
    }
}

/// RunReport は `testbed run --report` が書き出す実行結果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: RunId,
    pub python: String,
    pub state: RunState,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    pub counts: StageCounts,
    pub stages: Vec<StageRecord>,
    pub decisions: Vec<DecisionRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ErrorKind, Outcome, StageRunId};
    use chrono::TimeZone;
    use rstest::rstest;
    use ulid::Ulid;

    fn new_run() -> RunRecord {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        RunRecord::new(RunId::from_ulid(Ulid::new()), "3.4", now)
    }

    fn set(run: &mut RunRecord, kind: StageKind, state: StageState) {
        run.stage_mut(kind).state = state;
    }

    #[test]
    fn new_run_has_every_stage_pending_in_order() {
        let run = new_run();
        assert_eq!(run.state, RunState::Running);
        let kinds: Vec<_> = run.stages.iter().map(|s| s.stage).collect();
        assert_eq!(kinds, StageKind::ORDER.to_vec());
        for kind in StageKind::ORDER {
            assert_eq!(run.stage(kind).stage, kind);
        }
    }

    #[test]
    fn all_terminal_without_failure_is_succeeded() {
        let mut run = new_run();
        for kind in StageKind::ORDER {
            set(&mut run, kind, StageState::Succeeded);
        }
        set(&mut run, StageKind::ReportCoverage, StageState::Tolerated);
        set(&mut run, StageKind::StartDisplay, StageState::Skipped);

        run.update_state_from_stages();
        assert_eq!(run.state, RunState::Succeeded);
    }

    #[rstest]
    #[case::pending(StageState::Pending)]
    #[case::running(StageState::Running)]
    fn unfinished_stage_keeps_run_running(#[case] state: StageState) {
        let mut run = new_run();
        for kind in StageKind::ORDER {
            set(&mut run, kind, StageState::Succeeded);
        }
        set(&mut run, StageKind::RunTests, state);

        run.update_state_from_stages();
        assert_eq!(run.state, RunState::Running);
    }

    #[test]
    fn failed_stage_fails_the_run_and_skips_the_rest() {
        let mut run = new_run();
        let now = run.started_at;
        set(&mut run, StageKind::Provision, StageState::Succeeded);
        let fetch = run.stage_mut(StageKind::FetchDatasets);
        fetch.start(StageRunId::from_ulid(Ulid::new()), now);
        fetch.finish(Outcome::failure(ErrorKind::Fetch, "404"), false, now);

        let skipped = run.skip_pending("fetch_datasets failed");
        assert_eq!(
            skipped,
            vec![
                StageKind::StartDisplay,
                StageKind::RunTests,
                StageKind::ReportCoverage
            ]
        );

        run.finish(now);
        assert_eq!(run.state, RunState::Failed);

        let report = run.report();
        assert_eq!(
            report.counts,
            StageCounts {
                succeeded: 1,
                failed: 1,
                tolerated: 0,
                skipped: 3
            }
        );
        let v = serde_json::to_value(&report).unwrap();
        assert_eq!(v["state"], "failed");
        assert_eq!(v["stages"][1]["state"], "failed");
    }
}
