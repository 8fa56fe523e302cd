//! Domain model (IDs, specs, plans, outcomes, records, ...).

pub mod decision;
pub mod environment;
pub mod errors;
pub mod events;
pub mod ids;
pub mod outcome;
pub mod plan;
pub mod record;
pub mod run;
pub mod spec;
pub mod stage;

pub use decision::{Decider, Decision, FailFastDecider};
pub use environment::{EnvironmentDescriptor, FixtureReport};
pub use errors::{ErrorKind, PipelineError};
pub use events::DomainEvent;
pub use ids::{RunId, StageRunId};
pub use outcome::{Artifact, Outcome, OutcomeKind};
pub use plan::{
    CommandSpec, CoveragePlan, DatasetPlan, DisplayPlan, InstallerPlan, ProvisionPlan, RunPlan,
    TestPlan,
};
pub use record::{DecisionRecord, StageRecord};
pub use run::{RunRecord, RunReport, RunState, StageCounts};
pub use spec::{
    ArchiveFormat, CoverageSpec, DatasetSpec, DisplaySpec, PipelineSpec, ProvisionSpec, TestSpec,
};
pub use stage::{StageKind, StageState};
