//! Per-sink counters and metric emission

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use metrics::counter;

/// Counters of a single sink worker
#[derive(Debug, Default)]
pub struct SinkMetrics {
    queue_len: AtomicUsize,
    stored: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
}

impl SinkMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue_len(&self) -> usize {
        self.queue_len.load(Ordering::Relaxed)
    }

    pub fn set_queue_len(&self, len: usize) {
        self.queue_len.store(len, Ordering::Relaxed);
    }

    /// Records the sink stored successfully
    pub fn stored(&self) -> u64 {
        self.stored.load(Ordering::Relaxed)
    }

    /// Records the sink refused (rolled back)
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    /// Records never handed to the sink because its queue was full
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub(crate) fn on_stored(&self, sink: &str) {
        self.stored.fetch_add(1, Ordering::Relaxed);
        record_persisted(sink, "stored");
    }

    pub(crate) fn on_failed(&self, sink: &str) {
        self.failed.fetch_add(1, Ordering::Relaxed);
        record_persisted(sink, "failed");
    }

    pub(crate) fn on_dropped(&self, sink: &str) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
        record_persisted(sink, "dropped");
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            queue_len: self.queue_len(),
            stored: self.stored(),
            failed: self.failed(),
            dropped: self.dropped(),
        }
    }
}

/// Snapshot of sink metrics (for reporting)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub queue_len: usize,
    pub stored: u64,
    pub failed: u64,
    pub dropped: u64,
}

fn record_persisted(sink: &str, status: &'static str) {
    counter!(
        "airwatch_records_persisted_total",
        "sink" => sink.to_string(),
        "status" => status
    )
    .increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_counts() {
        let metrics = SinkMetrics::new();
        metrics.on_stored("log");
        metrics.on_stored("log");
        metrics.on_failed("log");
        metrics.on_dropped("log");
        metrics.set_queue_len(3);

        assert_eq!(
            metrics.snapshot(),
            MetricsSnapshot {
                queue_len: 3,
                stored: 2,
                failed: 1,
                dropped: 1,
            }
        );
    }
}
