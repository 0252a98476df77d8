//! Hardware boundary.
//!
//! A [`RawDevice`] performs exactly one bus transaction per call and knows
//! nothing about retries, locking or plausibility; drivers layer those on top.

use async_trait::async_trait;
use contracts::{AlgorithmTuning, Compensation, FilterChannel, SensorConfig, SensorKind};

use crate::error::HardwareError;
use crate::gas_index::{AdaptiveGasIndex, GasIndexAlgorithm};

/// Unconverted values of one measurement
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RawSample {
    Scd40 {
        co2: u16,
        temperature: f64,
        humidity: f64,
    },
    Dht22 {
        temperature: f64,
        humidity: f64,
    },
    Sgp41 {
        sraw_voc: u16,
        sraw_nox: u16,
    },
}

impl RawSample {
    pub fn kind(&self) -> SensorKind {
        match self {
            RawSample::Scd40 { .. } => SensorKind::Scd40,
            RawSample::Dht22 { .. } => SensorKind::Dht22,
            RawSample::Sgp41 { .. } => SensorKind::Sgp41,
        }
    }
}

/// One physical sensor
#[async_trait]
pub trait RawDevice: Send {
    fn kind(&self) -> SensorKind;

    /// Perform a single measurement
    ///
    /// Compensable devices use `compensation`; others ignore it.
    async fn sample(&mut self, compensation: Compensation) -> Result<RawSample, HardwareError>;

    /// Re-open the device after it stopped responding
    async fn reinitialize(&mut self) -> Result<(), HardwareError>;

    /// Issue the conditioning command of a gas sensor
    async fn condition(&mut self, _compensation: Compensation) -> Result<(), HardwareError> {
        Ok(())
    }
}

/// Opens devices and builds gas index algorithms for a station
pub trait DeviceFactory: Send + Sync {
    /// Open the device described by `config`
    ///
    /// A failure leaves the sensor offline for the lifetime of the station.
    fn open(&self, config: &SensorConfig) -> Result<Box<dyn RawDevice>, HardwareError>;

    /// Algorithm turning raw ticks of `channel` into an index
    fn gas_index(
        &self,
        channel: FilterChannel,
        tuning: &AlgorithmTuning,
    ) -> Box<dyn GasIndexAlgorithm> {
        Box::new(AdaptiveGasIndex::new(channel, *tuning))
    }
}
