//! Sink implementations
//!
//! Contains LogSink, JsonLinesSink, and MemorySink.

mod json_lines;
mod log;
mod memory;

pub use self::json_lines::JsonLinesSink;
pub use self::log::LogSink;
pub use self::memory::{MemoryRecords, MemorySink};
