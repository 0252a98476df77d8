//! Run statistics.

use std::time::Duration;

use contracts::OverallHealth;
use dispatcher::MetricsSnapshot;
use observability::PollStatsAggregator;
use station::CountersSnapshot;

/// Statistics from a station run
#[derive(Debug, Clone, Default)]
pub struct RunStats {
    pub duration: Duration,

    /// Sensors configured and enabled
    pub active_sensors: usize,

    /// Sensors whose device opened
    pub open_sensors: usize,

    pub poll: PollStatsAggregator,

    /// Station counters at shutdown
    pub counters: CountersSnapshot,

    /// Per-sink counters at shutdown
    pub sinks: Vec<(String, MetricsSnapshot)>,

    /// Overall health at the last evaluation
    pub final_health: Option<OverallHealth>,
}

impl RunStats {
    /// Records handed to persistence per minute
    pub fn records_per_minute(&self) -> f64 {
        let minutes = self.duration.as_secs_f64() / 60.0;
        if minutes > 0.0 {
            self.counters.records_sent as f64 / minutes
        } else {
            0.0
        }
    }

    pub fn print_summary(&self) {
        println!("\n╔══════════════════════════════════════════════════════════════╗");
        println!("║                      Station Statistics                      ║");
        println!("╚══════════════════════════════════════════════════════════════╝\n");

        println!("Overview");
        println!("   ├─ Duration: {:.2}s", self.duration.as_secs_f64());
        println!(
            "   ├─ Sensors: {} configured, {} opened",
            self.active_sensors, self.open_sensors
        );
        println!("   ├─ Poll cycles: {}", self.counters.cycles);
        println!(
            "   ├─ Records: {} sent, {} dropped ({:.2}/min)",
            self.counters.records_sent,
            self.counters.records_dropped,
            self.records_per_minute()
        );
        match self.final_health {
            Some(health) => println!("   └─ Final health: {health}"),
            None => println!("   └─ Final health: not evaluated"),
        }

        let summary = self.poll.summary();
        println!("\nPolling");
        println!(
            "   ├─ Reads: {} ok, {} failed ({:.2}%)",
            summary.reads_ok, summary.reads_failed, summary.read_failure_rate
        );
        for group in &summary.groups {
            println!("   ├─ {} cycle (ms): {}", group.group, group.duration_ms);
        }
        println!("   └─ Cycles persisted: {}", summary.records_persisted);

        if !self.sinks.is_empty() {
            println!("\nSinks");
            for (name, snap) in &self.sinks {
                println!(
                    "   ├─ {}: {} stored, {} failed, {} dropped",
                    name, snap.stored, snap.failed, snap.dropped
                );
            }
        }

        println!();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_records_per_minute() {
        let stats = RunStats {
            duration: Duration::from_secs(120),
            counters: CountersSnapshot {
                records_sent: 4,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!((stats.records_per_minute() - 2.0).abs() < 1e-10);
        assert_eq!(RunStats::default().records_per_minute(), 0.0);
    }
}
