//! Dispatcher - fan-out of composed records to sinks

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument};

use contracts::{SinkConfig, SinkType, StationRecord};

use crate::error::DispatcherError;
use crate::handle::SinkHandle;
use crate::metrics::MetricsSnapshot;
use crate::sinks::{JsonLinesSink, LogSink, MemorySink};

/// Dispatcher configuration
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub sinks: Vec<SinkConfig>,
}

/// Builder for creating a Dispatcher
pub struct DispatcherBuilder {
    config: DispatcherConfig,
    input_rx: mpsc::Receiver<StationRecord>,
}

impl DispatcherBuilder {
    pub fn new(config: DispatcherConfig, input_rx: mpsc::Receiver<StationRecord>) -> Self {
        Self { config, input_rx }
    }

    /// Open every sink and spawn its worker
    ///
    /// Must be called inside a tokio runtime.
    #[instrument(
        name = "dispatcher_builder_build",
        skip(self),
        fields(sink_count = self.config.sinks.len())
    )]
    pub fn build(self) -> Result<Dispatcher, DispatcherError> {
        let handles = self
            .config
            .sinks
            .iter()
            .map(create_sink_handle)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Dispatcher {
            handles,
            input_rx: self.input_rx,
        })
    }
}

#[instrument(
    name = "dispatcher_create_sink_handle",
    skip(config),
    fields(sink = %config.name, sink_type = ?config.sink_type)
)]
fn create_sink_handle(config: &SinkConfig) -> Result<SinkHandle, DispatcherError> {
    let handle = match config.sink_type {
        SinkType::Log => SinkHandle::spawn(LogSink::new(&config.name), config.queue_capacity),
        SinkType::JsonLines => {
            let path = config.params.get("path").ok_or_else(|| {
                DispatcherError::sink_creation(&config.name, "missing 'path' parameter")
            })?;
            let sink = JsonLinesSink::open(&config.name, path)
                .map_err(|e| DispatcherError::sink_creation(&config.name, e.to_string()))?;
            SinkHandle::spawn(sink, config.queue_capacity)
        }
        SinkType::Memory => {
            let mut sink = MemorySink::new(&config.name);
            if let Some(raw) = config.params.get("max_records") {
                let max = raw.parse::<usize>().map_err(|e| {
                    DispatcherError::sink_creation(
                        &config.name,
                        format!("invalid max_records '{raw}': {e}"),
                    )
                })?;
                sink = sink.with_max_records(max);
            }
            SinkHandle::spawn(sink, config.queue_capacity)
        }
    };
    Ok(handle)
}

/// Consumes records and hands each one to every sink
pub struct Dispatcher {
    handles: Vec<SinkHandle>,
    input_rx: mpsc::Receiver<StationRecord>,
}

impl Dispatcher {
    /// Create a dispatcher with custom sink handles (for testing)
    pub fn with_handles(
        handles: Vec<SinkHandle>,
        input_rx: mpsc::Receiver<StationRecord>,
    ) -> Self {
        Self { handles, input_rx }
    }

    pub fn metrics(&self) -> Vec<(String, MetricsSnapshot)> {
        self.handles
            .iter()
            .map(|h| (h.name().to_string(), h.metrics().snapshot()))
            .collect()
    }

    /// Run until the input channel closes, then drain and close every sink
    ///
    /// Returns the final counters of each sink.
    #[instrument(name = "dispatcher_run", skip(self))]
    pub async fn run(mut self) -> Vec<(String, MetricsSnapshot)> {
        info!(sinks = self.handles.len(), "Dispatcher started");

        let mut record_count: u64 = 0;

        while let Some(record) = self.input_rx.recv().await {
            record_count += 1;
            for handle in &self.handles {
                handle.try_send(record.clone());
            }

            if record_count.is_multiple_of(100) {
                debug!(records = record_count, "Dispatcher progress");
            }
        }

        info!(records = record_count, "Dispatcher input closed, shutting down");

        let mut totals = Vec::with_capacity(self.handles.len());
        for handle in self.handles {
            let name = handle.name().to_string();
            let metrics = Arc::clone(handle.metrics());
            handle.shutdown().await;
            let snap = metrics.snapshot();
            info!(
                sink = %name,
                stored = snap.stored,
                failed = snap.failed,
                dropped = snap.dropped,
                "sink closed"
            );
            totals.push((name, snap));
        }

        info!("Dispatcher shutdown complete");
        totals
    }

    pub fn spawn(self) -> JoinHandle<Vec<(String, MetricsSnapshot)>> {
        tokio::spawn(self.run())
    }
}

/// Convenience function to create a dispatcher from sink configs
pub fn create_dispatcher(
    sink_configs: Vec<SinkConfig>,
    input_rx: mpsc::Receiver<StationRecord>,
) -> Result<Dispatcher, DispatcherError> {
    DispatcherBuilder::new(
        DispatcherConfig {
            sinks: sink_configs,
        },
        input_rx,
    )
    .build()
}
