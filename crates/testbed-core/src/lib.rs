//! testbed-core
//!
//! Core building blocks for the testbed pipeline: provisioning a test
//! environment, fetching fixture datasets, starting a headless display,
//! running a coverage-instrumented test suite and uploading the coverage.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, spec, plan, stage, outcome, record, run, decision, environment, errors, events）
//! - **config**: YAML の読み込み、環境変数による上書き、テンプレート展開
//! - **ports**: 抽象化レイヤー（CommandRunner, Downloader, EventSink, Clock, IdGenerator）
//! - **impls**: 実装（tokio::process, reqwest, tar/zip 展開, tracing sink）
//! - **stages**: 5 つのステージ（provision, fetch, display, tests, coverage）
//! - **app**: PipelineBuilder と Runner（fail-fast の逐次実行）

pub mod app;
pub mod config;
pub mod domain;
pub mod impls;
pub mod ports;
pub mod stages;

#[cfg(test)]
pub(crate) mod testing;
