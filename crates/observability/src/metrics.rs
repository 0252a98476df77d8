//! Poll cycle metrics and run statistics
//!
//! `record_*` helpers feed the metrics facade; [`PollStatsAggregator`]
//! keeps an in-memory summary for the end-of-run report.

use std::collections::BTreeMap;

use contracts::{CycleReport, HealthReport, SensorStatus};
use metrics::{counter, gauge};

/// Record one completed polling cycle
pub fn record_cycle_report(report: &CycleReport) {
    counter!("airwatch_cycles_total", "group" => report.group.clone()).increment(1);
    if report.reads_failed > 0 {
        counter!("airwatch_cycle_read_failures_total", "group" => report.group.clone())
            .increment(u64::from(report.reads_failed));
    }
}

/// Record per-sensor freshness of a health evaluation
pub fn record_health_report(report: &HealthReport) {
    gauge!("airwatch_sensors_online").set(report.online_count as f64);
    gauge!("airwatch_sensors_configured").set(report.configured_count as f64);

    for (kind, health) in &report.sensors {
        let fresh = if health.status == SensorStatus::Online { 1.0 } else { 0.0 };
        gauge!("airwatch_sensor_fresh", "sensor" => kind.as_str()).set(fresh);
        if let Some(age) = health.age_seconds {
            gauge!("airwatch_snapshot_age_seconds", "sensor" => kind.as_str()).set(age);
        }
    }
}

/// Aggregates cycle reports of a run
#[derive(Debug, Clone, Default)]
pub struct PollStatsAggregator {
    pub total_cycles: u64,
    pub reads_ok: u64,
    pub reads_failed: u64,
    /// Cycles that handed a record to persistence
    pub records_persisted: u64,
    /// Cycle duration (ms) per group
    pub durations: BTreeMap<String, RunningStats>,
}

impl PollStatsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, report: &CycleReport) {
        self.total_cycles += 1;
        self.reads_ok += u64::from(report.reads_ok);
        self.reads_failed += u64::from(report.reads_failed);
        if report.persisted {
            self.records_persisted += 1;
        }
        self.durations
            .entry(report.group.clone())
            .or_default()
            .push(report.duration_ms);
    }

    pub fn summary(&self) -> PollSummary {
        let reads = self.reads_ok + self.reads_failed;
        PollSummary {
            total_cycles: self.total_cycles,
            reads_ok: self.reads_ok,
            reads_failed: self.reads_failed,
            records_persisted: self.records_persisted,
            read_failure_rate: if reads > 0 {
                self.reads_failed as f64 / reads as f64 * 100.0
            } else {
                0.0
            },
            groups: self
                .durations
                .iter()
                .map(|(group, stats)| GroupSummary {
                    group: group.clone(),
                    duration_ms: StatsSummary::from(stats),
                })
                .collect(),
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Cycle duration summary of one group
#[derive(Debug, Clone, Default)]
pub struct GroupSummary {
    pub group: String,
    pub duration_ms: StatsSummary,
}

/// Run summary
#[derive(Debug, Clone, Default)]
pub struct PollSummary {
    pub total_cycles: u64,
    pub reads_ok: u64,
    pub reads_failed: u64,
    pub records_persisted: u64,
    /// Percent of failed reads
    pub read_failure_rate: f64,
    pub groups: Vec<GroupSummary>,
}

impl std::fmt::Display for PollSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Poll Summary ===")?;
        writeln!(f, "Total cycles: {}", self.total_cycles)?;
        writeln!(
            f,
            "Reads: {} ok, {} failed ({:.2}%)",
            self.reads_ok, self.reads_failed, self.read_failure_rate
        )?;
        writeln!(f, "Records persisted: {}", self.records_persisted)?;

        if !self.groups.is_empty() {
            writeln!(f, "Cycle duration (ms):")?;
            for group in &self.groups {
                writeln!(f, "  {}: {}", group.group, group.duration_ms)?;
            }
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct StatsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl From<&RunningStats> for StatsSummary {
    fn from(stats: &RunningStats) -> Self {
        Self {
            count: stats.count(),
            min: stats.min(),
            max: stats.max(),
            mean: stats.mean(),
            std_dev: stats.std_dev(),
        }
    }
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.count == 0 {
            write!(f, "N/A")
        } else {
            write!(
                f,
                "min={:.3}, max={:.3}, mean={:.3}, std={:.3} (n={})",
                self.min, self.max, self.mean, self.std_dev, self.count
            )
        }
    }
}

/// Online mean/variance (Welford)
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    pub fn push(&mut self, value: f64) {
        self.count += 1;
        if self.count == 1 {
            self.min = value;
            self.max = value;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);
        }

        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (value - self.mean);
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        self.mean
    }

    /// Sample variance (0 below two samples)
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }
}
