//! RecordSink trait - persistence output interface
//!
//! Defines the abstract interface for persistence sinks.

use crate::{ContractError, StationRecord};

/// Durable storage of composed station records
///
/// All sink implementations must implement this trait. A failed `store`
/// must leave the sink as it was before the call.
#[trait_variant::make(RecordSink: Send)]
pub trait LocalRecordSink {
    /// Sink name (used for logging/metrics)
    fn name(&self) -> &str;

    /// Store one composed record
    ///
    /// # Errors
    /// Returns write error (should include context)
    async fn store(&mut self, record: &StationRecord) -> Result<(), ContractError>;

    /// Flush buffer (if any)
    async fn flush(&mut self) -> Result<(), ContractError>;

    /// Close sink
    async fn close(&mut self) -> Result<(), ContractError>;
}
