//! Stage kinds and the per-stage state machine.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::errors::ErrorKind;

/// StageKind はパイプラインの 5 つのステージ（実行順固定）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    Provision,
    FetchDatasets,
    StartDisplay,
    RunTests,
    ReportCoverage,
}

impl StageKind {
    /// Execution order of a complete pipeline.
    pub const ORDER: [StageKind; 5] = [
        StageKind::Provision,
        StageKind::FetchDatasets,
        StageKind::StartDisplay,
        StageKind::RunTests,
        StageKind::ReportCoverage,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            StageKind::Provision => "provision",
            StageKind::FetchDatasets => "fetch_datasets",
            StageKind::StartDisplay => "start_display",
            StageKind::RunTests => "run_tests",
            StageKind::ReportCoverage => "report_coverage",
        }
    }

    /// Classification of a failure of this stage.
    pub fn error_kind(self) -> ErrorKind {
        match self {
            StageKind::Provision => ErrorKind::Provisioning,
            StageKind::FetchDatasets => ErrorKind::Fetch,
            StageKind::StartDisplay => ErrorKind::Display,
            StageKind::RunTests => ErrorKind::Test,
            StageKind::ReportCoverage => ErrorKind::Reporting,
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// StageState はステージの状態
///
/// 状態遷移:
/// - Pending -> Running -> Succeeded
/// - Pending -> Running -> Failed
/// - Pending -> Running -> Tolerated (failed, but the stage is non-fatal)
/// - Pending -> Skipped (an earlier fatal stage failed)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageState {
    Pending,
    Running,
    Succeeded,
    Failed,
    Tolerated,
    Skipped,
}

impl StageState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, StageState::Pending | StageState::Running)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn order_is_the_pipeline_order() {
        let mut sorted = StageKind::ORDER;
        sorted.sort();
        assert_eq!(sorted, StageKind::ORDER);
        assert_eq!(StageKind::ORDER[0], StageKind::Provision);
        assert_eq!(StageKind::ORDER[4], StageKind::ReportCoverage);
    }

    #[test]
    fn kind_serializes_as_its_name() {
        for kind in StageKind::ORDER {
            let s = serde_json::to_string(&kind).unwrap();
            assert_eq!(s, format!("\"{}\"", kind.as_str()));
        }
    }

    #[rstest]
    #[case::pending(StageState::Pending, false)]
    #[case::running(StageState::Running, false)]
    #[case::succeeded(StageState::Succeeded, true)]
    #[case::failed(StageState::Failed, true)]
    #[case::tolerated(StageState::Tolerated, true)]
    #[case::skipped(StageState::Skipped, true)]
    fn terminal_states(#[case] state: StageState, #[case] terminal: bool) {
        assert_eq!(state.is_terminal(), terminal);
    }
}
