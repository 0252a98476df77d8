//! Health derivation
//!
//! Health is never stored: every call re-derives it from the snapshot and the
//! runtime state map at the given instant.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use contracts::{
    HealthReport, OverallHealth, SensorHealth, SensorKind, SensorRuntimeState, SensorStatus,
    Snapshot, StationBlueprint,
};

/// Lower bound of every freshness threshold
pub const MIN_FRESHNESS: Duration = Duration::from_secs(30);

/// Pure health evaluator over the configured sensor set
#[derive(Debug, Clone, Default)]
pub struct HealthEvaluator {
    sensors: Vec<(SensorKind, Duration)>,
}

impl HealthEvaluator {
    /// Evaluator over `(kind, poll interval)` pairs
    pub fn new(sensors: impl IntoIterator<Item = (SensorKind, Duration)>) -> Self {
        Self {
            sensors: sensors.into_iter().collect(),
        }
    }

    /// Evaluator over every enabled sensor of `blueprint`
    pub fn from_blueprint(blueprint: &StationBlueprint) -> Self {
        Self::new(
            blueprint
                .enabled_sensors()
                .map(|s| (s.kind, s.poll_interval())),
        )
    }

    pub fn configured_count(&self) -> usize {
        self.sensors.len()
    }

    /// `max(2 × poll_interval, 30 s)`
    pub fn freshness_threshold(poll_interval: Duration) -> Duration {
        (poll_interval * 2).max(MIN_FRESHNESS)
    }

    /// Quorum over the configured count
    ///
    /// - all online: healthy
    /// - more than half online: degraded
    /// - otherwise (including no sensors at all): unhealthy
    pub fn overall(online: usize, configured: usize) -> OverallHealth {
        if configured == 0 {
            OverallHealth::Unhealthy
        } else if online == configured {
            OverallHealth::Healthy
        } else if online * 2 > configured {
            OverallHealth::Degraded
        } else {
            OverallHealth::Unhealthy
        }
    }

    /// Health of one sensor
    ///
    /// A sensor whose runtime state is missing counts as offline.
    pub fn sensor_health(
        &self,
        kind: SensorKind,
        poll_interval: Duration,
        snapshot: &Snapshot,
        state: Option<&SensorRuntimeState>,
        now: DateTime<Utc>,
    ) -> SensorHealth {
        let threshold = Self::freshness_threshold(poll_interval).as_secs_f64();
        let age = snapshot.age_seconds(now);

        let status = match state {
            Some(state) if state.status == SensorStatus::Online => {
                let fresh = age.is_some_and(|age| age < threshold);
                if fresh && snapshot.has_required_fields(kind) {
                    SensorStatus::Online
                } else {
                    SensorStatus::Degraded
                }
            }
            _ => SensorStatus::Offline,
        };

        SensorHealth {
            status,
            description: status.description().to_string(),
            age_seconds: age,
            freshness_threshold_seconds: threshold,
        }
    }

    pub fn evaluate(
        &self,
        snapshot: &Snapshot,
        states: &BTreeMap<SensorKind, SensorRuntimeState>,
        now: DateTime<Utc>,
    ) -> HealthReport {
        let sensors: BTreeMap<SensorKind, SensorHealth> = self
            .sensors
            .iter()
            .map(|&(kind, interval)| {
                (
                    kind,
                    self.sensor_health(kind, interval, snapshot, states.get(&kind), now),
                )
            })
            .collect();

        let online_count = sensors
            .values()
            .filter(|h| h.status == SensorStatus::Online)
            .count();

        HealthReport {
            overall: Self::overall(online_count, self.sensors.len()),
            sensors,
            online_count,
            configured_count: self.sensors.len(),
            evaluated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    fn full_snapshot(ts: DateTime<Utc>) -> Snapshot {
        let mut snap = Snapshot::default().merged(&[], ts);
        snap.scd40.co2 = Some(650);
        snap.dht22.temperature = Some(21.0);
        snap.dht22.humidity = Some(40.0);
        snap.sgp41.voc_index = Some(100);
        snap
    }

    fn all_online() -> BTreeMap<SensorKind, SensorRuntimeState> {
        SensorKind::ALL
            .iter()
            .map(|k| (*k, SensorRuntimeState::online()))
            .collect()
    }

    fn station() -> HealthEvaluator {
        HealthEvaluator::from_blueprint(&StationBlueprint::default_station())
    }

    #[test]
    fn test_freshness_threshold() {
        assert_eq!(
            HealthEvaluator::freshness_threshold(Duration::from_secs(1)),
            Duration::from_secs(30)
        );
        assert_eq!(
            HealthEvaluator::freshness_threshold(Duration::from_secs(30)),
            Duration::from_secs(60)
        );
    }

    #[test]
    fn test_all_fresh_is_healthy() {
        let report = station().evaluate(&full_snapshot(at(0)), &all_online(), at(10));
        assert_eq!(report.overall, OverallHealth::Healthy);
        assert_eq!(report.online_count, 3);
        assert_eq!(report.configured_count, 3);
    }

    #[test]
    fn test_stale_snapshot_never_online() {
        let evaluator = station();
        let snapshot = full_snapshot(at(0));

        // sgp41 polls every second: threshold is the 30 s floor, strict
        let report = evaluator.evaluate(&snapshot, &all_online(), at(30));
        assert_eq!(report.sensors[&SensorKind::Sgp41].status, SensorStatus::Degraded);
        assert_eq!(report.sensors[&SensorKind::Dht22].status, SensorStatus::Online);

        let report = evaluator.evaluate(&snapshot, &all_online(), at(60));
        assert_eq!(report.online_count, 0);
        assert_eq!(report.overall, OverallHealth::Unhealthy);
    }

    #[test]
    fn test_missing_required_field_degrades() {
        let mut snapshot = full_snapshot(at(0));
        snapshot.scd40.co2 = None;
        let report = station().evaluate(&snapshot, &all_online(), at(1));
        let scd = &report.sensors[&SensorKind::Scd40];
        assert_eq!(scd.status, SensorStatus::Degraded);
        assert_eq!(scd.description, "readings unreliable");
        assert_eq!(report.overall, OverallHealth::Degraded);
    }

    #[test]
    fn test_runtime_state_not_online_is_offline() {
        let mut states = all_online();
        states.insert(SensorKind::Dht22, SensorRuntimeState::unavailable("no device"));
        states.get_mut(&SensorKind::Sgp41).unwrap().status = SensorStatus::Degraded;

        let report = station().evaluate(&full_snapshot(at(0)), &states, at(1));
        assert_eq!(report.sensors[&SensorKind::Dht22].status, SensorStatus::Offline);
        assert_eq!(report.sensors[&SensorKind::Sgp41].status, SensorStatus::Offline);
        assert_eq!(report.overall, OverallHealth::Unhealthy);
    }

    #[test]
    fn test_quorum_follows_configured_count() {
        assert_eq!(HealthEvaluator::overall(3, 3), OverallHealth::Healthy);
        assert_eq!(HealthEvaluator::overall(2, 3), OverallHealth::Degraded);
        assert_eq!(HealthEvaluator::overall(1, 3), OverallHealth::Unhealthy);
        assert_eq!(HealthEvaluator::overall(2, 2), OverallHealth::Healthy);
        assert_eq!(HealthEvaluator::overall(1, 2), OverallHealth::Unhealthy);
        assert_eq!(HealthEvaluator::overall(3, 4), OverallHealth::Degraded);
        assert_eq!(HealthEvaluator::overall(0, 0), OverallHealth::Unhealthy);
    }

    #[test]
    fn test_never_merged_snapshot() {
        let report = station().evaluate(&Snapshot::default(), &all_online(), at(0));
        assert!(report
            .sensors
            .values()
            .all(|h| h.status == SensorStatus::Degraded && h.age_seconds.is_none()));
    }
}
