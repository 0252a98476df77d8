//! # Dispatcher
//!
//! Fire-and-forget persistence of composed station records.
//!
//! Responsibilities:
//! - Consume `StationRecord`s from the sensor manager
//! - Fan-out to every configured sink
//! - Isolate slow or failing sinks so polling is never blocked

pub mod dispatcher;
pub mod error;
pub mod handle;
pub mod metrics;
pub mod sinks;

pub use contracts::{RecordSink, StationRecord};
pub use dispatcher::{create_dispatcher, Dispatcher, DispatcherBuilder, DispatcherConfig};
pub use error::DispatcherError;
pub use handle::SinkHandle;
pub use metrics::{MetricsSnapshot, SinkMetrics};
pub use sinks::{JsonLinesSink, LogSink, MemoryRecords, MemorySink};
