//! Implementations of the ports.

pub mod archive;
pub mod http;
pub mod process;
pub mod sink;

pub use self::http::HttpDownloader;
pub use self::process::ProcessRunner;
pub use self::sink::{MemoryEventSink, TracingEventSink};
