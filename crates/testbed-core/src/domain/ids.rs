//! Domain identifiers (strongly-typed IDs).
//!
//! ULID ベースの ID を Phantom type パターンで型付けしています。
//! `RunId` と `StageRunId` は同じ表現（128-bit）を持ちますが、
//! コンパイル時に混同できません。
//!
//! ULID は時刻でソート可能なので、レポート内の並びが生成順と一致します。

use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use ulid::Ulid;

/// IdMarker は各 ID 型の表示用プレフィックスを与えるマーカー trait
pub trait IdMarker: Send + Sync + 'static {
    fn prefix() -> &'static str;
}

/// Id<T> は ULID ベースの汎用 ID。`T` はコンパイル時のみ存在
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Id<T: IdMarker> {
    ulid: Ulid,
    #[serde(skip)]
    _marker: PhantomData<T>,
}

impl<T: IdMarker> Id<T> {
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self {
            ulid,
            _marker: PhantomData,
        }
    }

    pub fn as_ulid(&self) -> Ulid {
        self.ulid
    }
}

impl<T: IdMarker> From<Ulid> for Id<T> {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
    }
}

impl<T: IdMarker> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", T::prefix(), self.ulid)
    }
}

/// Run のマーカー型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Run {}

impl IdMarker for Run {
    fn prefix() -> &'static str {
        "run-"
    }
}

/// Stage 実行のマーカー型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StageRun {}

impl IdMarker for StageRun {
    fn prefix() -> &'static str {
        "stage-"
    }
}

/// Identifier of one pipeline run (one interpreter version of the matrix).
pub type RunId = Id<Run>;

/// Identifier of one stage execution inside a run.
pub type StageRunId = Id<StageRun>;
