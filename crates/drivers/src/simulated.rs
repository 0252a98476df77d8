//! Simulated devices
//!
//! Random-walk signals with occasional glitches, used when the station runs
//! without hardware attached.

use std::collections::HashSet;

use async_trait::async_trait;
use contracts::{Compensation, SensorConfig, SensorKind};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, trace};

use crate::device::{DeviceFactory, RawDevice, RawSample};
use crate::error::HardwareError;

/// Simulated device configuration
#[derive(Debug, Clone)]
pub struct SimulationConfig {
    /// Probability of a transient error per sample
    pub glitch_rate: f64,
    /// Fixed seed for reproducible runs
    pub seed: Option<u64>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            glitch_rate: 0.05,
            seed: None,
        }
    }
}

pub struct SimulatedDevice {
    kind: SensorKind,
    rng: StdRng,
    glitch_rate: f64,
    co2: f64,
    temperature: f64,
    humidity: f64,
    sraw_voc: f64,
    sraw_nox: f64,
}

impl SimulatedDevice {
    pub fn new(kind: SensorKind, config: &SimulationConfig) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed ^ kind as u64),
            None => StdRng::from_os_rng(),
        };
        Self {
            kind,
            rng,
            glitch_rate: config.glitch_rate.clamp(0.0, 1.0),
            co2: 650.0,
            temperature: 22.0,
            humidity: 45.0,
            sraw_voc: 30_000.0,
            sraw_nox: 15_000.0,
        }
    }

    fn walk(&mut self, value: f64, step: f64, min: f64, max: f64) -> f64 {
        (value + self.rng.random_range(-step..=step)).clamp(min, max)
    }

    fn glitch(&mut self) -> Option<HardwareError> {
        if !self.rng.random_bool(self.glitch_rate) {
            return None;
        }
        let error = match self.kind {
            SensorKind::Scd40 => {
                if self.rng.random_bool(0.5) {
                    HardwareError::NotReady
                } else {
                    HardwareError::Sentinel(32768)
                }
            }
            SensorKind::Dht22 => HardwareError::from_message("Checksum did not validate. Try again."),
            SensorKind::Sgp41 => HardwareError::ZeroTicks,
        };
        Some(error)
    }
}

#[async_trait]
impl RawDevice for SimulatedDevice {
    fn kind(&self) -> SensorKind {
        self.kind
    }

    async fn sample(&mut self, compensation: Compensation) -> Result<RawSample, HardwareError> {
        if let Some(err) = self.glitch() {
            trace!(sensor = %self.kind, error = %err, "simulated glitch");
            return Err(err);
        }

        let sample = match self.kind {
            SensorKind::Scd40 => {
                self.co2 = self.walk(self.co2, 15.0, 420.0, 2000.0);
                self.temperature = self.walk(self.temperature, 0.2, 15.0, 30.0);
                self.humidity = self.walk(self.humidity, 0.5, 25.0, 70.0);
                RawSample::Scd40 {
                    co2: self.co2.round() as u16,
                    temperature: self.temperature + 0.8,
                    humidity: self.humidity - 2.0,
                }
            }
            SensorKind::Dht22 => {
                self.temperature = self.walk(self.temperature, 0.2, 15.0, 30.0);
                self.humidity = self.walk(self.humidity, 0.5, 25.0, 70.0);
                RawSample::Dht22 {
                    temperature: self.temperature,
                    humidity: self.humidity,
                }
            }
            SensorKind::Sgp41 => {
                // raw signal shifts slightly with ambient humidity
                let drift = (compensation.humidity - 50.0) * 4.0;
                self.sraw_voc = self.walk(self.sraw_voc, 120.0, 20_000.0, 40_000.0);
                self.sraw_nox = self.walk(self.sraw_nox, 60.0, 10_000.0, 20_000.0);
                RawSample::Sgp41 {
                    sraw_voc: (self.sraw_voc + drift).round() as u16,
                    sraw_nox: self.sraw_nox.round() as u16,
                }
            }
        };
        Ok(sample)
    }

    async fn reinitialize(&mut self) -> Result<(), HardwareError> {
        debug!(sensor = %self.kind, "simulated device reinitialised");
        Ok(())
    }

    async fn condition(&mut self, compensation: Compensation) -> Result<(), HardwareError> {
        debug!(
            sensor = %self.kind,
            temperature = compensation.temperature,
            humidity = compensation.humidity,
            "simulated conditioning command"
        );
        Ok(())
    }
}

/// Opens [`SimulatedDevice`]s
#[derive(Debug, Clone, Default)]
pub struct SimulatedDeviceFactory {
    config: SimulationConfig,
    absent: HashSet<SensorKind>,
}

impl SimulatedDeviceFactory {
    pub fn new(config: SimulationConfig) -> Self {
        Self {
            config,
            absent: HashSet::new(),
        }
    }

    /// Pretend `kind` is not wired
    pub fn without(mut self, kind: SensorKind) -> Self {
        self.absent.insert(kind);
        self
    }
}

impl DeviceFactory for SimulatedDeviceFactory {
    fn open(&self, config: &SensorConfig) -> Result<Box<dyn RawDevice>, HardwareError> {
        if self.absent.contains(&config.kind) {
            return Err(HardwareError::NotFound(format!(
                "no {} on {}",
                config.kind,
                config.bus_name()
            )));
        }
        debug!(sensor = %config.kind, bus = config.bus_name(), "opened simulated device");
        Ok(Box::new(SimulatedDevice::new(config.kind, &self.config)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_samples_stay_plausible() {
        let config = SimulationConfig {
            glitch_rate: 0.0,
            seed: Some(7),
        };
        let mut device = SimulatedDevice::new(SensorKind::Scd40, &config);
        for _ in 0..200 {
            match device.sample(Compensation::default()).await.unwrap() {
                RawSample::Scd40 { co2, humidity, .. } => {
                    assert!((420..=2000).contains(&co2));
                    assert!((0.0..=100.0).contains(&humidity));
                }
                other => panic!("unexpected sample {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn test_glitches_are_transient() {
        let config = SimulationConfig {
            glitch_rate: 1.0,
            seed: Some(1),
        };
        let mut device = SimulatedDevice::new(SensorKind::Dht22, &config);
        let err = device.sample(Compensation::default()).await.unwrap_err();
        assert_eq!(err.class(), crate::error::ErrorClass::Transient);
    }

    #[test]
    fn test_factory_absent_kind() {
        let factory = SimulatedDeviceFactory::default().without(SensorKind::Sgp41);
        assert!(factory
            .open(&SensorConfig::with_defaults(SensorKind::Sgp41))
            .is_err());
        assert!(factory
            .open(&SensorConfig::with_defaults(SensorKind::Dht22))
            .is_ok());
    }
}
