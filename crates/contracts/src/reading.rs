//! Reading payloads produced by drivers
//!
//! A field is `None` when the sensor produced no trustworthy value for it
//! during the cycle. Payloads are plain `Copy` data: once produced they are
//! never mutated, only replaced.

use serde::{Deserialize, Serialize};

use crate::SensorKind;

/// SCD40 output
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Scd40Fields {
    /// CO2 concentration (ppm)
    pub co2: Option<u16>,
    /// On-chip temperature (°C)
    pub temperature: Option<f64>,
    /// On-chip relative humidity (%RH)
    pub humidity: Option<f64>,
}

/// DHT22 output
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Dht22Fields {
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
}

/// SGP41 output: raw ticks and the derived indices
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Sgp41Fields {
    pub sraw_voc: Option<u16>,
    pub sraw_nox: Option<u16>,
    /// VOC index, 0..=500 (0 while the algorithm is still learning)
    pub voc_index: Option<i32>,
    /// NOx index, 0..=500 (0 while the algorithm is still learning)
    pub nox_index: Option<i32>,
}

/// One sensor's reading set for a single cycle
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "sensor", rename_all = "snake_case")]
pub enum SensorReading {
    Scd40(Scd40Fields),
    Dht22(Dht22Fields),
    Sgp41(Sgp41Fields),
}

impl SensorReading {
    /// Empty reading for a kind (every field absent)
    pub fn empty(kind: SensorKind) -> Self {
        match kind {
            SensorKind::Scd40 => SensorReading::Scd40(Scd40Fields::default()),
            SensorKind::Dht22 => SensorReading::Dht22(Dht22Fields::default()),
            SensorKind::Sgp41 => SensorReading::Sgp41(Sgp41Fields::default()),
        }
    }

    pub fn kind(&self) -> SensorKind {
        match self {
            SensorReading::Scd40(_) => SensorKind::Scd40,
            SensorReading::Dht22(_) => SensorKind::Dht22,
            SensorReading::Sgp41(_) => SensorKind::Sgp41,
        }
    }

    /// True if at least one field carries a value
    pub fn has_any_value(&self) -> bool {
        match self {
            SensorReading::Scd40(f) => {
                f.co2.is_some() || f.temperature.is_some() || f.humidity.is_some()
            }
            SensorReading::Dht22(f) => f.temperature.is_some() || f.humidity.is_some(),
            SensorReading::Sgp41(f) => {
                f.sraw_voc.is_some()
                    || f.sraw_nox.is_some()
                    || f.voc_index.is_some()
                    || f.nox_index.is_some()
            }
        }
    }
}

/// Ambient values fed to a compensable sensor before its read
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Compensation {
    /// Temperature (°C)
    pub temperature: f64,
    /// Relative humidity (%RH)
    pub humidity: f64,
    /// Whether the values came from a live sensor rather than configured defaults
    pub from_sensor: bool,
}

impl Compensation {
    pub const DEFAULT_TEMPERATURE: f64 = 25.0;
    pub const DEFAULT_HUMIDITY: f64 = 50.0;

    /// Fallback compensation used before any climate reading exists
    pub fn fallback(temperature: f64, humidity: f64) -> Self {
        Self {
            temperature,
            humidity,
            from_sensor: false,
        }
    }
}

impl Default for Compensation {
    fn default() -> Self {
        Self::fallback(Self::DEFAULT_TEMPERATURE, Self::DEFAULT_HUMIDITY)
    }
}
