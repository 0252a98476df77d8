//! Aggregate snapshot and the persisted record composed from it

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Dht22Fields, Scd40Fields, SensorKind, SensorReading, Sgp41Fields};

/// Latest reading set across all sensors plus a single capture timestamp
///
/// Owned by the sensor manager; consumers only ever receive clones.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Time of the most recent merge (`None` before the first cycle)
    pub timestamp: Option<DateTime<Utc>>,
    pub scd40: Scd40Fields,
    pub dht22: Dht22Fields,
    pub sgp41: Sgp41Fields,
}

impl Snapshot {
    /// Build the successor snapshot with `readings` merged in
    ///
    /// Sensors not present in `readings` keep their previous fields.
    /// The timestamp never moves backwards, even if the wall clock does.
    pub fn merged(&self, readings: &[SensorReading], now: DateTime<Utc>) -> Snapshot {
        let mut next = self.clone();
        for reading in readings {
            match reading {
                SensorReading::Scd40(fields) => next.scd40 = *fields,
                SensorReading::Dht22(fields) => next.dht22 = *fields,
                SensorReading::Sgp41(fields) => next.sgp41 = *fields,
            }
        }
        next.timestamp = Some(match self.timestamp {
            Some(prev) if prev > now => prev,
            _ => now,
        });
        next
    }

    /// Current fields of one sensor
    pub fn reading(&self, kind: SensorKind) -> SensorReading {
        match kind {
            SensorKind::Scd40 => SensorReading::Scd40(self.scd40),
            SensorKind::Dht22 => SensorReading::Dht22(self.dht22),
            SensorKind::Sgp41 => SensorReading::Sgp41(self.sgp41),
        }
    }

    /// Whether the fields health evaluation requires for `kind` are present
    ///
    /// - scd40: co2
    /// - dht22: temperature
    /// - sgp41: voc_index or nox_index
    pub fn has_required_fields(&self, kind: SensorKind) -> bool {
        match kind {
            SensorKind::Scd40 => self.scd40.co2.is_some(),
            SensorKind::Dht22 => self.dht22.temperature.is_some(),
            SensorKind::Sgp41 => self.sgp41.voc_index.is_some() || self.sgp41.nox_index.is_some(),
        }
    }

    /// Temperature/humidity pair from a climate-capable sensor, if both are present
    pub fn climate_from(&self, source: SensorKind) -> Option<(f64, f64)> {
        let (temperature, humidity) = match source {
            SensorKind::Scd40 => (self.scd40.temperature, self.scd40.humidity),
            SensorKind::Dht22 => (self.dht22.temperature, self.dht22.humidity),
            SensorKind::Sgp41 => return None,
        };
        Some((temperature?, humidity?))
    }

    /// Age relative to `now` in seconds (`None` before the first merge)
    pub fn age_seconds(&self, now: DateTime<Utc>) -> Option<f64> {
        self.timestamp
            .map(|ts| (now - ts).num_milliseconds() as f64 / 1000.0)
    }

    pub fn has_any_value(&self) -> bool {
        SensorKind::ALL
            .iter()
            .any(|kind| self.reading(*kind).has_any_value())
    }
}

/// Composed row handed to persistence sinks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationRecord {
    pub timestamp: DateTime<Utc>,
    pub scd40: Scd40Fields,
    pub dht22: Dht22Fields,
    pub sgp41: Sgp41Fields,
}

impl StationRecord {
    /// Compose a record from a snapshot
    ///
    /// Returns `None` if the snapshot was never merged or holds no values.
    pub fn from_snapshot(snapshot: &Snapshot) -> Option<Self> {
        let timestamp = snapshot.timestamp?;
        if !snapshot.has_any_value() {
            return None;
        }
        Some(Self {
            timestamp,
            scd40: snapshot.scd40,
            dht22: snapshot.dht22,
            sgp41: snapshot.sgp41,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn test_merge_replaces_only_given_sensor() {
        let base = Snapshot::default().merged(
            &[SensorReading::Scd40(Scd40Fields {
                co2: Some(800),
                ..Default::default()
            })],
            at(0),
        );
        let next = base.merged(
            &[SensorReading::Dht22(Dht22Fields {
                temperature: Some(22.0),
                humidity: Some(40.0),
            })],
            at(5),
        );

        assert_eq!(next.scd40.co2, Some(800));
        assert_eq!(next.dht22.temperature, Some(22.0));
        assert_eq!(next.timestamp, Some(at(5)));
        // previous instance untouched
        assert_eq!(base.dht22.temperature, None);
    }

    #[test]
    fn test_timestamp_never_moves_backwards() {
        let snap = Snapshot::default().merged(&[], at(10));
        let next = snap.merged(&[], at(3));
        assert_eq!(next.timestamp, Some(at(10)));
    }

    #[test]
    fn test_required_fields() {
        let mut snap = Snapshot::default();
        assert!(!snap.has_required_fields(SensorKind::Sgp41));
        snap.sgp41.nox_index = Some(1);
        assert!(snap.has_required_fields(SensorKind::Sgp41));
        snap.dht22.humidity = Some(40.0);
        assert!(!snap.has_required_fields(SensorKind::Dht22));
    }

    #[test]
    fn test_climate_needs_both_values() {
        let mut snap = Snapshot::default();
        snap.dht22.temperature = Some(19.5);
        assert_eq!(snap.climate_from(SensorKind::Dht22), None);
        snap.dht22.humidity = Some(61.0);
        assert_eq!(snap.climate_from(SensorKind::Dht22), Some((19.5, 61.0)));
        assert_eq!(snap.climate_from(SensorKind::Sgp41), None);
    }

    #[test]
    fn test_record_requires_values() {
        let empty = Snapshot::default().merged(&[], at(0));
        assert!(StationRecord::from_snapshot(&empty).is_none());

        let mut snap = empty.clone();
        snap.sgp41.voc_index = Some(0);
        let record = StationRecord::from_snapshot(&snap).unwrap();
        assert_eq!(record.timestamp, at(0));
        assert_eq!(record.sgp41.voc_index, Some(0));
    }
}
