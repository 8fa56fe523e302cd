//! Pipeline - fail-fast の逐次実行
//!
//! 1 つの RunPlan（インタプリタ 1 バージョン）を順番に実行します。
//!
//! # 流れ
//! 1. RunRecord を作り RunStarted を送る
//! 2. StageKind::ORDER の順にステージを実行
//!    - プランに含まれないステージは "disabled" で Skipped
//!    - エラーは FAILURE の Outcome に変換し、Decider に判断させる
//!    - Abort なら残りを Skipped にして終了、Tolerate なら警告して続行
//! 3. バックグラウンドプロセス（ディスプレイ）を止めて RunFinished を送る

use std::sync::Arc;

use tracing::{info, warn};

use crate::domain::{
    Decider, Decision, DecisionRecord, DomainEvent, ErrorKind, Outcome, OutcomeKind, RunPlan,
    RunRecord, RunReport, StageKind,
};
use crate::ports::{Clock, EventSink, IdGenerator};
use crate::stages::StageContext;

use super::registry::StageRegistry;

/// Pipeline は登録済みステージで RunPlan を実行する
///
/// `PipelineBuilder` から作ります。
pub struct Pipeline {
    registry: StageRegistry,
    decider: Arc<dyn Decider>,
    sink: Arc<dyn EventSink>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
}

impl Pipeline {
    pub(crate) fn new(
        registry: StageRegistry,
        decider: Arc<dyn Decider>,
        sink: Arc<dyn EventSink>,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
    ) -> Self {
        Self {
            registry,
            decider,
            sink,
            clock,
            ids,
        }
    }

    /// Run every plan, one after another. A failed run does not stop the
    /// following ones.
    pub async fn run_matrix(&self, plans: Vec<RunPlan>) -> Vec<RunReport> {
        let mut reports = Vec::with_capacity(plans.len());
        for plan in plans {
            reports.push(self.run(plan).await);
        }
        reports
    }

    /// 1 つの plan を最後まで実行
    pub async fn run(&self, plan: RunPlan) -> RunReport {
        let run_id = self.ids.generate_run_id();
        let mut record = RunRecord::new(run_id, plan.python.clone(), self.clock.now());
        self.sink.emit(&DomainEvent::RunStarted {
            run_id,
            python: plan.python.clone(),
        });

        let mut ctx = StageContext::new(run_id, plan);
        for kind in StageKind::ORDER {
            if !ctx.plan.includes(kind) {
                self.skip(&mut record, kind, "disabled");
                continue;
            }

            let decision = self.run_stage(&mut record, &mut ctx, kind).await;
            match decision {
                Decision::Proceed => {}
                Decision::Tolerate { reason } => {
                    warn!(%run_id, stage = %kind, %reason, "non-fatal stage failed");
                }
                Decision::Abort { reason } => {
                    for skipped in record.skip_pending(&reason) {
                        self.sink.emit(&DomainEvent::StageSkipped {
                            run_id,
                            stage: skipped,
                            reason: reason.clone(),
                        });
                    }
                    break;
                }
            }
        }

        ctx.shutdown().await;
        record.finish(self.clock.now());
        info!(%run_id, python = %record.python, state = ?record.state, "run complete");
        self.sink.emit(&DomainEvent::RunFinished {
            run_id,
            state: record.state,
        });
        record.report()
    }

    fn skip(&self, record: &mut RunRecord, kind: StageKind, reason: &str) {
        record.stage_mut(kind).skip(reason);
        self.sink.emit(&DomainEvent::StageSkipped {
            run_id: record.run_id,
            stage: kind,
            reason: reason.to_string(),
        });
    }

    async fn run_stage(
        &self,
        record: &mut RunRecord,
        ctx: &mut StageContext,
        kind: StageKind,
    ) -> Decision {
        let run_id = record.run_id;
        let stage_run_id = self.ids.generate_stage_run_id();
        record.stage_mut(kind).start(stage_run_id, self.clock.now());
        self.sink.emit(&DomainEvent::StageStarted {
            run_id,
            stage_run_id,
            stage: kind,
        });

        let outcome = match self.registry.get(kind) {
            Some(stage) => match stage.run(ctx).await {
                Ok(outcome) => outcome,
                Err(err) => Outcome::failure(err.kind_or(kind.error_kind()), err.to_string()),
            },
            None => Outcome::failure(ErrorKind::Config, format!("no stage registered for {kind}")),
        };

        let decision = self
            .decider
            .decide(kind, ctx.plan.is_fatal(kind), &outcome);
        let now = self.clock.now();
        if outcome.kind != OutcomeKind::Success {
            record.decisions.push(DecisionRecord {
                stage: kind,
                trigger: outcome.kind,
                policy: self.decider.policy().to_string(),
                decision: decision.label().to_string(),
                reason: decision.reason().map(str::to_string),
                decided_at: now,
            });
        }

        let reason = outcome.reason.clone();
        let outcome_kind = outcome.kind;
        let stage = record.stage_mut(kind);
        stage.finish(outcome, matches!(decision, Decision::Tolerate { .. }), now);
        self.sink.emit(&DomainEvent::StageFinished {
            run_id,
            stage_run_id,
            stage: kind,
            outcome: outcome_kind,
            state: stage.state,
            reason,
        });
        decision
    }
}
