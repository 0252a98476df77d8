//! Sensor kinds and their capability set
//!
//! The set of supported sensors is closed. Every feature that only some
//! kinds have (filtering, compensation, conditioning) is resolved here from
//! the kind itself, never by probing a driver at runtime.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Physical sensor kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorKind {
    /// CO2 (NDIR photoacoustic) with on-chip temperature/humidity, I2C
    Scd40,
    /// Temperature/humidity, single-wire GPIO
    Dht22,
    /// VOC/NOx raw signal, converted to indices by the gas index algorithm, I2C
    Sgp41,
}

impl SensorKind {
    /// All supported kinds, in reporting order
    pub const ALL: [SensorKind; 3] = [SensorKind::Scd40, SensorKind::Dht22, SensorKind::Sgp41];

    /// Stable lowercase name used in logs, metrics and configuration
    pub fn as_str(&self) -> &'static str {
        match self {
            SensorKind::Scd40 => "scd40",
            SensorKind::Dht22 => "dht22",
            SensorKind::Sgp41 => "sgp41",
        }
    }

    /// Capability set of this kind
    pub fn capabilities(&self) -> Capabilities {
        match self {
            SensorKind::Scd40 => Capabilities {
                filterable: false,
                compensable: false,
                conditionable: false,
                provides_climate: true,
            },
            SensorKind::Dht22 => Capabilities {
                filterable: true,
                compensable: false,
                conditionable: false,
                provides_climate: true,
            },
            SensorKind::Sgp41 => Capabilities {
                filterable: true,
                compensable: true,
                conditionable: true,
                provides_climate: false,
            },
        }
    }

    /// Numeric channels this kind may route through a `DataFilter`
    pub fn filter_channels(&self) -> &'static [FilterChannel] {
        match self {
            SensorKind::Scd40 => &[],
            SensorKind::Dht22 => &[FilterChannel::Temperature, FilterChannel::Humidity],
            SensorKind::Sgp41 => &[FilterChannel::VocIndex, FilterChannel::NoxIndex],
        }
    }

    /// Default hardware channel name
    pub fn default_bus(&self) -> &'static str {
        match self {
            SensorKind::Scd40 | SensorKind::Sgp41 => "i2c-1",
            SensorKind::Dht22 => "gpio-4",
        }
    }

    /// Natural polling cadence in milliseconds
    pub fn default_poll_interval_ms(&self) -> u64 {
        match self {
            SensorKind::Scd40 | SensorKind::Dht22 => 30_000,
            SensorKind::Sgp41 => 1_000,
        }
    }

    pub fn default_retry_attempts(&self) -> u32 {
        match self {
            SensorKind::Scd40 | SensorKind::Sgp41 => 3,
            SensorKind::Dht22 => 5,
        }
    }

    pub fn default_retry_delay_ms(&self) -> u64 {
        match self {
            SensorKind::Scd40 => 2_000,
            SensorKind::Dht22 | SensorKind::Sgp41 => 1_000,
        }
    }

    /// Whether composed records are persisted by default from this sensor's loop
    pub fn persists_by_default(&self) -> bool {
        !matches!(self, SensorKind::Sgp41)
    }
}

impl fmt::Display for SensorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SensorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "scd40" => Ok(SensorKind::Scd40),
            "dht22" => Ok(SensorKind::Dht22),
            "sgp41" => Ok(SensorKind::Sgp41),
            other => Err(format!("unknown sensor kind: {other}")),
        }
    }
}

/// Capability flags resolved from the sensor kind
///
/// Every kind is readable; the remaining capabilities are optional.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    /// Has numeric channels routed through a `DataFilter`
    pub filterable: bool,
    /// Accepts ambient temperature/humidity compensation inputs
    pub compensable: bool,
    /// Needs a time-bounded conditioning phase before valid reads
    pub conditionable: bool,
    /// Produces temperature/humidity usable as compensation input
    pub provides_climate: bool,
}

/// Filterable numeric stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterChannel {
    Temperature,
    Humidity,
    VocIndex,
    NoxIndex,
}

impl FilterChannel {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterChannel::Temperature => "temperature",
            FilterChannel::Humidity => "humidity",
            FilterChannel::VocIndex => "voc_index",
            FilterChannel::NoxIndex => "nox_index",
        }
    }
}

impl fmt::Display for FilterChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_roundtrip_names() {
        for kind in SensorKind::ALL {
            assert_eq!(kind.as_str().parse::<SensorKind>(), Ok(kind));
        }
        assert!("bme280".parse::<SensorKind>().is_err());
    }

    #[test]
    fn test_capabilities_match_channels() {
        for kind in SensorKind::ALL {
            let caps = kind.capabilities();
            assert_eq!(caps.filterable, !kind.filter_channels().is_empty());
        }
        assert!(SensorKind::Sgp41.capabilities().conditionable);
        assert!(!SensorKind::Dht22.capabilities().compensable);
    }

    #[test]
    fn test_kind_serde_snake_case() {
        let json = serde_json::to_string(&SensorKind::Sgp41).unwrap();
        assert_eq!(json, "\"sgp41\"");
        let channel: FilterChannel = serde_json::from_str("\"voc_index\"").unwrap();
        assert_eq!(channel, FilterChannel::VocIndex);
    }
}
