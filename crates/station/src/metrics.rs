//! Station counters and metric emission

use std::sync::atomic::{AtomicU64, Ordering};

use contracts::{FilterChannel, OverallHealth, SensorKind, SensorStatus};
use metrics::{counter, gauge, histogram};

/// Process-local counters of the polling loops
#[derive(Debug, Default)]
pub struct StationCounters {
    cycles: AtomicU64,
    reads_ok: AtomicU64,
    reads_failed: AtomicU64,
    records_sent: AtomicU64,
    records_dropped: AtomicU64,
}

impl StationCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_cycles(&self) {
        self.cycles.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_reads_ok(&self) {
        self.reads_ok.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_reads_failed(&self) {
        self.reads_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a record handed to persistence, returns the new total
    pub fn inc_records_sent(&self) -> u64 {
        self.records_sent.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn inc_records_dropped(&self) {
        self.records_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CountersSnapshot {
        CountersSnapshot {
            cycles: self.cycles.load(Ordering::Relaxed),
            reads_ok: self.reads_ok.load(Ordering::Relaxed),
            reads_failed: self.reads_failed.load(Ordering::Relaxed),
            records_sent: self.records_sent.load(Ordering::Relaxed),
            records_dropped: self.records_dropped.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of station counters (for reporting)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CountersSnapshot {
    pub cycles: u64,
    pub reads_ok: u64,
    pub reads_failed: u64,
    pub records_sent: u64,
    pub records_dropped: u64,
}

pub(crate) fn record_read(sensor: SensorKind, outcome: &'static str) {
    counter!(
        "airwatch_reads_total",
        "sensor" => sensor.as_str(),
        "outcome" => outcome
    )
    .increment(1);
}

pub(crate) fn record_filter_rejection(sensor: SensorKind, channel: FilterChannel) {
    counter!(
        "airwatch_filter_rejections_total",
        "sensor" => sensor.as_str(),
        "channel" => channel.as_str()
    )
    .increment(1);
}

pub(crate) fn record_sensor_status(sensor: SensorKind, status: SensorStatus) {
    let online = if status == SensorStatus::Online { 1.0 } else { 0.0 };
    gauge!("airwatch_sensor_online", "sensor" => sensor.as_str()).set(online);
}

pub(crate) fn record_health(overall: OverallHealth) {
    let value = match overall {
        OverallHealth::Healthy => 0.0,
        OverallHealth::Degraded => 1.0,
        OverallHealth::Unhealthy => 2.0,
    };
    gauge!("airwatch_health_status").set(value);
}

pub(crate) fn record_cycle(group: &str, duration_ms: f64) {
    histogram!("airwatch_poll_cycle_ms", "group" => group.to_string()).record(duration_ms);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_snapshot() {
        let counters = StationCounters::new();
        counters.inc_cycles();
        counters.inc_reads_ok();
        counters.inc_reads_ok();
        counters.inc_reads_failed();
        assert_eq!(counters.inc_records_sent(), 1);
        assert_eq!(counters.inc_records_sent(), 2);
        counters.inc_records_dropped();

        let snap = counters.snapshot();
        assert_eq!(snap.cycles, 1);
        assert_eq!(snap.reads_ok, 2);
        assert_eq!(snap.reads_failed, 1);
        assert_eq!(snap.records_sent, 2);
        assert_eq!(snap.records_dropped, 1);
    }
}
