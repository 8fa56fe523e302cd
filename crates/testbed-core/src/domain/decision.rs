//! Decision model: what the runner does after a stage finished.
//!
//! The pipeline never retries: a failed stage either stops the run or, for a
//! non-fatal stage, is tolerated.

use super::outcome::{Outcome, OutcomeKind};
use super::stage::StageKind;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Continue with the next stage.
    Proceed,

    /// The stage failed, but it is not fatal.
    Tolerate { reason: String },

    /// Stop the run; remaining stages are skipped.
    Abort { reason: String },
}

impl Decision {
    pub fn label(&self) -> &'static str {
        match self {
            Decision::Proceed => "proceed",
            Decision::Tolerate { .. } => "tolerate",
            Decision::Abort { .. } => "abort",
        }
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Decision::Proceed => None,
            Decision::Tolerate { reason } | Decision::Abort { reason } => Some(reason),
        }
    }
}

/// Decider はステージの Outcome から次の行動を決める
///
/// Decider は純粋です。決定の適用は Runner が行います。
pub trait Decider: Send + Sync {
    fn policy(&self) -> &'static str;

    fn decide(&self, stage: StageKind, fatal: bool, outcome: &Outcome) -> Decision;
}

/// FailFastDecider は最初の致命的な失敗で実行を止める
#[derive(Debug, Clone, Copy, Default)]
pub struct FailFastDecider;

impl Decider for FailFastDecider {
    fn policy(&self) -> &'static str {
        "fail_fast"
    }

    fn decide(&self, stage: StageKind, fatal: bool, outcome: &Outcome) -> Decision {
        match outcome.kind {
            OutcomeKind::Success | OutcomeKind::Skipped => Decision::Proceed,
            OutcomeKind::Failure => {
                let reason = format!(
                    "{stage} failed: {}",
                    outcome.reason.as_deref().unwrap_or("unknown error")
                );
                if fatal {
                    Decision::Abort { reason }
                } else {
                    Decision::Tolerate { reason }
                }
            }
        }
    }
}
