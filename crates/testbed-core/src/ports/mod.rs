//! Ports - 抽象化レイヤー
//!
//! ステージが外部世界（プロセス、ネットワーク、時刻、ログ）に触れる
//! 境界をすべて trait にしています。実装は `impls` にあります。

pub mod clock;
pub mod command;
pub mod downloader;
pub mod event_sink;
pub mod id_generator;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::command::{BackgroundProcess, CommandRunner, CommandStatus};
pub use self::downloader::Downloader;
pub use self::event_sink::{EventSink, NoopEventSink};
pub use self::id_generator::{IdGenerator, UlidGenerator};
