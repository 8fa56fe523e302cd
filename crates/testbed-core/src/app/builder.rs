//! PipelineBuilder - パイプラインの構築とワイヤリング
//!
//! # Fail-fast 設計
//! - expect_stages() で必要な StageKind を宣言
//! - build() 時に「期待集合 ⊆ 登録済み集合」をチェック
//! - 不足があれば BuildError を返す（実行前に止まる）

use std::sync::Arc;

use crate::domain::{Decider, FailFastDecider, StageKind};
use crate::ports::{Clock, EventSink, IdGenerator, NoopEventSink, SystemClock, UlidGenerator};
use crate::stages::Stage;

use super::registry::{RegistryError, StageRegistry};
use super::runner::Pipeline;

/// PipelineBuilder は [`Pipeline`] を組み立てる
///
/// # 使用例
/// ```ignore
/// let pipeline = PipelineBuilder::new()
///     .register_all(stages::standard(runner, downloader))?
///     .expect_stages(&StageKind::ORDER)
///     .event_sink(Arc::new(TracingEventSink))
///     .build()?;
/// ```
pub struct PipelineBuilder {
    registry: StageRegistry,
    expected: Option<Vec<StageKind>>,
    decider: Arc<dyn Decider>,
    sink: Arc<dyn EventSink>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
}

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("missing stages: {0:?}. These stages were expected but not registered.")]
    MissingStages(Vec<StageKind>),
}

impl PipelineBuilder {
    pub fn new() -> Self {
        Self {
            registry: StageRegistry::new(),
            expected: None,
            decider: Arc::new(FailFastDecider),
            sink: Arc::new(NoopEventSink),
            clock: Arc::new(SystemClock),
            ids: Arc::new(UlidGenerator::new(SystemClock)),
        }
    }

    pub fn register(mut self, stage: Arc<dyn Stage>) -> Result<Self, RegistryError> {
        self.registry.register(stage)?;
        Ok(self)
    }

    pub fn register_all(
        mut self,
        stages: impl IntoIterator<Item = Arc<dyn Stage>>,
    ) -> Result<Self, RegistryError> {
        for stage in stages {
            self.registry.register(stage)?;
        }
        Ok(self)
    }

    pub fn expect_stages(mut self, kinds: &[StageKind]) -> Self {
        self.expected = Some(kinds.to_vec());
        self
    }

    pub fn decider(mut self, decider: Arc<dyn Decider>) -> Self {
        self.decider = decider;
        self
    }

    pub fn event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    /// # 検証
    /// - expect_stages() の StageKind が全て登録されているか
    pub fn build(self) -> Result<Pipeline, BuildError> {
        if let Some(expected) = &self.expected {
            let registered = self.registry.registered_kinds();
            let missing: Vec<StageKind> = expected
                .iter()
                .filter(|k| !registered.contains(k))
                .copied()
                .collect();
            if !missing.is_empty() {
                return Err(BuildError::MissingStages(missing));
            }
        }
        Ok(Pipeline::new(
            self.registry,
            self.decider,
            self.sink,
            self.clock,
            self.ids,
        ))
    }
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}
