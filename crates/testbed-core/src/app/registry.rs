//! StageRegistry - ステージの登録と管理
//!
//! StageKind ごとに 1 つの `Stage` を保持します。二重登録はエラーです。

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::domain::StageKind;
use crate::stages::Stage;

#[derive(Default)]
pub struct StageRegistry {
    stages: BTreeMap<StageKind, Arc<dyn Stage>>,
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("a stage for '{0}' is already registered")]
    AlreadyRegistered(StageKind),
}

impl StageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, stage: Arc<dyn Stage>) -> Result<(), RegistryError> {
        let kind = stage.kind();
        if self.stages.contains_key(&kind) {
            return Err(RegistryError::AlreadyRegistered(kind));
        }
        self.stages.insert(kind, stage);
        Ok(())
    }

    pub fn get(&self, kind: StageKind) -> Option<Arc<dyn Stage>> {
        self.stages.get(&kind).cloned()
    }

    /// 登録済みの StageKind（パイプライン順）
    pub fn registered_kinds(&self) -> Vec<StageKind> {
        self.stages.keys().copied().collect()
    }
}
