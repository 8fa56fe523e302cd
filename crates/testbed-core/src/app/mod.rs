//! App - パイプラインの組み立てと実行

pub mod builder;
pub mod registry;
pub mod runner;

pub use self::builder::{BuildError, PipelineBuilder};
pub use self::registry::{RegistryError, StageRegistry};
pub use self::runner::Pipeline;
