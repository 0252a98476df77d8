//! SinkHandle - one sink behind its own queue and worker task

use std::sync::Arc;

use contracts::{RecordSink, StationRecord};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, instrument, warn};

use crate::metrics::SinkMetrics;

/// Handle to a running sink worker
pub struct SinkHandle {
    name: String,
    tx: mpsc::Sender<StationRecord>,
    metrics: Arc<SinkMetrics>,
    worker: JoinHandle<()>,
}

impl SinkHandle {
    /// Spawn the worker task of `sink`
    pub fn spawn<S: RecordSink + Send + 'static>(sink: S, queue_capacity: usize) -> Self {
        let name = sink.name().to_string();
        let (tx, rx) = mpsc::channel(queue_capacity.max(1));
        let metrics = Arc::new(SinkMetrics::new());

        let worker = tokio::spawn(sink_worker(sink, rx, Arc::clone(&metrics), name.clone()));

        Self {
            name,
            tx,
            metrics,
            worker,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn metrics(&self) -> &Arc<SinkMetrics> {
        &self.metrics
    }

    /// Queue a record without waiting
    ///
    /// Returns false if the record was dropped (queue full or worker gone).
    pub fn try_send(&self, record: StationRecord) -> bool {
        match self.tx.try_send(record) {
            Ok(()) => {
                self.metrics
                    .set_queue_len(self.tx.max_capacity() - self.tx.capacity());
                true
            }
            Err(mpsc::error::TrySendError::Full(record)) => {
                self.metrics.on_dropped(&self.name);
                warn!(
                    sink = %self.name,
                    timestamp = %record.timestamp,
                    "queue full, record dropped"
                );
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.metrics.on_dropped(&self.name);
                error!(sink = %self.name, "sink worker closed unexpectedly");
                false
            }
        }
    }

    /// Drain the queue, then flush and close the sink
    #[instrument(name = "sink_handle_shutdown", skip(self), fields(sink = %self.name))]
    pub async fn shutdown(self) {
        drop(self.tx);
        if let Err(e) = self.worker.await {
            error!(sink = %self.name, error = ?e, "sink worker panicked");
        }
        debug!(sink = %self.name, "sink handle shut down");
    }
}

#[instrument(name = "sink_worker_loop", skip(sink, rx, metrics), fields(sink = %name))]
async fn sink_worker<S: RecordSink>(
    mut sink: S,
    mut rx: mpsc::Receiver<StationRecord>,
    metrics: Arc<SinkMetrics>,
    name: String,
) {
    debug!(sink = %name, "sink worker started");

    while let Some(record) = rx.recv().await {
        metrics.set_queue_len(rx.len());

        match sink.store(&record).await {
            Ok(()) => metrics.on_stored(&name),
            Err(e) => {
                // the sink rolled back; keep consuming
                metrics.on_failed(&name);
                error!(
                    sink = %name,
                    timestamp = %record.timestamp,
                    error = %e,
                    "record store failed"
                );
            }
        }
    }

    if let Err(e) = sink.flush().await {
        error!(sink = %name, error = %e, "flush failed on shutdown");
    }
    if let Err(e) = sink.close().await {
        error!(sink = %name, error = %e, "close failed on shutdown");
    }

    debug!(sink = %name, "sink worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sinks::MemorySink;
    use chrono::{TimeZone, Utc};
    use contracts::{ContractError, Dht22Fields};
    use tokio::time::{sleep, Duration};

    fn record(secs: i64) -> StationRecord {
        StationRecord {
            timestamp: Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap(),
            scd40: Default::default(),
            dht22: Dht22Fields {
                temperature: Some(21.0),
                humidity: Some(40.0),
            },
            sgp41: Default::default(),
        }
    }

    /// Sink that takes a while per record
    struct SlowSink {
        delay: Duration,
    }

    impl RecordSink for SlowSink {
        fn name(&self) -> &str {
            "slow"
        }

        async fn store(&mut self, _record: &StationRecord) -> Result<(), ContractError> {
            sleep(self.delay).await;
            Ok(())
        }

        async fn flush(&mut self) -> Result<(), ContractError> {
            Ok(())
        }

        async fn close(&mut self) -> Result<(), ContractError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_records_reach_sink() {
        let sink = MemorySink::new("memory");
        let records = sink.records();
        let handle = SinkHandle::spawn(sink, 10);

        for i in 0..5 {
            assert!(handle.try_send(record(i)));
        }
        let metrics = Arc::clone(handle.metrics());
        handle.shutdown().await;

        assert_eq!(records.len(), 5);
        assert_eq!(metrics.stored(), 5);
    }

    #[tokio::test]
    async fn test_queue_full_drops() {
        let handle = SinkHandle::spawn(
            SlowSink {
                delay: Duration::from_millis(100),
            },
            2,
        );

        for i in 0..10 {
            handle.try_send(record(i));
        }
        assert!(handle.metrics().dropped() > 0);

        handle.shutdown().await;
    }

    #[tokio::test]
    async fn test_failures_do_not_stop_worker() {
        let sink = MemorySink::new("flaky");
        let records = sink.records();
        records.set_failing(true);
        let handle = SinkHandle::spawn(sink, 10);

        handle.try_send(record(0));
        handle.try_send(record(1));
        sleep(Duration::from_millis(50)).await;
        assert_eq!(handle.metrics().failed(), 2);

        records.set_failing(false);
        handle.try_send(record(2));
        let metrics = Arc::clone(handle.metrics());
        handle.shutdown().await;

        assert_eq!(metrics.stored(), 1);
        assert_eq!(records.len(), 1);
    }
}
