//! EventSink port - イベント記録の抽象化
//!
//! # 実装
//! - TracingEventSink: tracing にイベントを流す（CLI のデフォルト）
//! - MemoryEventSink: イベントを保持する（テスト、レポート用）

use crate::domain::DomainEvent;

pub trait EventSink: Send + Sync {
    fn emit(&self, event: &DomainEvent);
}

/// NoopEventSink は何もしない
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEventSink;

impl EventSink for NoopEventSink {
    fn emit(&self, _event: &DomainEvent) {}
}
