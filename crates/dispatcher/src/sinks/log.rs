//! LogSink - one structured log line per record

use contracts::{ContractError, RecordSink, StationRecord};
use tracing::{info, instrument};

/// Sink that writes every record to the log
pub struct LogSink {
    name: String,
}

impl LogSink {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl RecordSink for LogSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(name = "log_sink_store", skip(self, record), fields(sink = %self.name))]
    async fn store(&mut self, record: &StationRecord) -> Result<(), ContractError> {
        info!(
            sink = %self.name,
            timestamp = %record.timestamp,
            co2 = ?record.scd40.co2,
            temperature = ?record.dht22.temperature,
            humidity = ?record.dht22.humidity,
            voc_index = ?record.sgp41.voc_index,
            nox_index = ?record.sgp41.nox_index,
            "station record"
        );
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), ContractError> {
        Ok(())
    }

    #[instrument(name = "log_sink_close", skip(self))]
    async fn close(&mut self) -> Result<(), ContractError> {
        info!(sink = %self.name, "LogSink closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[tokio::test]
    async fn test_log_sink_store() {
        let mut sink = LogSink::new("log");
        let record = StationRecord {
            timestamp: Utc::now(),
            scd40: Default::default(),
            dht22: Default::default(),
            sgp41: Default::default(),
        };

        assert!(sink.store(&record).await.is_ok());
        assert!(sink.close().await.is_ok());
        assert_eq!(sink.name(), "log");
    }
}
