//! MemorySink - in-process record buffer

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use contracts::{ContractError, RecordSink, StationRecord};

/// Shared view of a [`MemorySink`]'s buffer
///
/// Stays readable after the sink itself moved into its worker.
#[derive(Debug, Clone, Default)]
pub struct MemoryRecords {
    records: Arc<Mutex<Vec<StationRecord>>>,
    failing: Arc<AtomicBool>,
}

impl MemoryRecords {
    fn lock(&self) -> MutexGuard<'_, Vec<StationRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Copy of everything stored so far, oldest first
    pub fn snapshot(&self) -> Vec<StationRecord> {
        self.lock().clone()
    }

    /// Make subsequent stores fail (without storing)
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::Relaxed);
    }
}

/// Sink keeping records in memory, optionally bounded
pub struct MemorySink {
    name: String,
    max_records: Option<usize>,
    shared: MemoryRecords,
}

impl MemorySink {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            max_records: None,
            shared: MemoryRecords::default(),
        }
    }

    /// Keep only the newest `max` records
    pub fn with_max_records(mut self, max: usize) -> Self {
        self.max_records = Some(max.max(1));
        self
    }

    pub fn records(&self) -> MemoryRecords {
        self.shared.clone()
    }
}

impl RecordSink for MemorySink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn store(&mut self, record: &StationRecord) -> Result<(), ContractError> {
        if self.shared.failing.load(Ordering::Relaxed) {
            return Err(ContractError::sink_write(&self.name, "store refused"));
        }
        let mut records = self.shared.lock();
        records.push(record.clone());
        if let Some(max) = self.max_records {
            let excess = records.len().saturating_sub(max);
            records.drain(..excess);
        }
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), ContractError> {
        Ok(())
    }

    async fn close(&mut self) -> Result<(), ContractError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn record(secs: i64) -> StationRecord {
        StationRecord {
            timestamp: Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap(),
            scd40: Default::default(),
            dht22: Default::default(),
            sgp41: Default::default(),
        }
    }

    #[tokio::test]
    async fn test_bounded_buffer_keeps_newest() {
        let mut sink = MemorySink::new("memory").with_max_records(2);
        let records = sink.records();

        for i in 0..3 {
            sink.store(&record(i)).await.unwrap();
        }

        let stored = records.snapshot();
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0], record(1));
        assert_eq!(stored[1], record(2));
    }

    #[tokio::test]
    async fn test_failing_store_leaves_buffer_untouched() {
        let mut sink = MemorySink::new("memory");
        let records = sink.records();
        sink.store(&record(0)).await.unwrap();

        records.set_failing(true);
        assert!(sink.store(&record(1)).await.is_err());
        assert_eq!(records.len(), 1);
    }
}
