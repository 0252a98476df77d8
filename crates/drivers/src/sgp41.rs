//! SGP41 VOC/NOx sensor (I2C, conditionable, compensable).

use contracts::{Compensation, SensorConfig, SensorKind, Sgp41Fields, ValidRanges};
use tokio::time::Instant;
use tracing::{debug, info, instrument};

use crate::device::RawSample;
use crate::error::{DriverError, HardwareError, Result};
use crate::gas_index::{ConditioningHandle, GasIndexAdapter};
use crate::retry::DeviceLink;

/// One gas measurement with the learning state of each index
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GasReading {
    pub fields: Sgp41Fields,
    pub voc_learning: bool,
    pub nox_learning: bool,
}

pub struct Sgp41Driver {
    link: DeviceLink,
    ranges: ValidRanges,
    adapter: GasIndexAdapter,
}

impl Sgp41Driver {
    pub fn new(config: &SensorConfig, link: DeviceLink, adapter: GasIndexAdapter) -> Self {
        Self {
            link,
            ranges: config.valid_ranges_or_default(),
            adapter,
        }
    }

    pub fn link(&self) -> &DeviceLink {
        &self.link
    }

    pub fn link_mut(&mut self) -> &mut DeviceLink {
        &mut self.link
    }

    pub fn conditioning(&self) -> ConditioningHandle {
        self.adapter.conditioning().clone()
    }

    /// Run the conditioning phase unless it is still valid or already running
    ///
    /// The command is sent under the bus lock; the wait happens without it.
    #[instrument(name = "sgp41_condition", skip(self, compensation))]
    pub async fn condition(&mut self, compensation: Compensation) -> Result<()> {
        let handle = self.adapter.conditioning().clone();
        let now = Instant::now();
        let duration = handle.with(|t| {
            if t.is_conditioned(now) || t.in_progress(now) {
                None
            } else {
                t.begin(now);
                Some(t.duration())
            }
        });
        let Some(duration) = duration else {
            debug!("conditioning still valid, skipping");
            return Ok(());
        };

        info!(
            duration_ms = duration.as_millis() as u64,
            temperature = compensation.temperature,
            humidity = compensation.humidity,
            "conditioning started"
        );
        if let Err(err) = self.link.condition(compensation).await {
            handle.with(|t| t.fail());
            return Err(err);
        }

        tokio::time::sleep(duration).await;
        handle.with(|t| t.complete(Instant::now()));
        info!("conditioning complete");
        Ok(())
    }

    /// Bounded-retry read of the raw signals, converted to indices
    ///
    /// # Errors
    /// `NotConditioned` before conditioning completed; nothing is sampled then.
    #[instrument(name = "sgp41_read", skip(self, compensation))]
    pub async fn read(&mut self, compensation: Compensation) -> Result<GasReading> {
        if !self.adapter.conditioning().is_conditioned() {
            return Err(DriverError::NotConditioned {
                sensor: SensorKind::Sgp41,
            });
        }

        let ranges = self.ranges;
        let (sraw_voc, sraw_nox) = self
            .link
            .read(compensation, |sample| match sample? {
                RawSample::Sgp41 { sraw_voc, sraw_nox } => interpret(&ranges, sraw_voc, sraw_nox),
                other => Err(HardwareError::Io(format!(
                    "unexpected {} sample",
                    other.kind()
                ))),
            })
            .await?;

        let output = self.adapter.process(sraw_voc, sraw_nox)?;
        debug!(
            sraw_voc,
            sraw_nox,
            voc_index = output.voc_index,
            nox_index = output.nox_index,
            "gas indices computed"
        );
        Ok(GasReading {
            fields: Sgp41Fields {
                sraw_voc: Some(sraw_voc),
                sraw_nox: Some(sraw_nox),
                voc_index: Some(output.voc_index),
                nox_index: Some(output.nox_index),
            },
            voc_learning: output.voc_learning,
            nox_learning: output.nox_learning,
        })
    }
}

fn interpret(
    ranges: &ValidRanges,
    sraw_voc: u16,
    sraw_nox: u16,
) -> std::result::Result<(u16, u16), HardwareError> {
    if sraw_voc == 0 || sraw_nox == 0 {
        return Err(HardwareError::ZeroTicks);
    }
    if let Some(range) = ranges.sraw_voc {
        if !range.contains(f64::from(sraw_voc)) {
            return Err(HardwareError::invalid("sraw_voc", f64::from(sraw_voc)));
        }
    }
    if let Some(range) = ranges.sraw_nox {
        if !range.contains(f64::from(sraw_nox)) {
            return Err(HardwareError::invalid("sraw_nox", f64::from(sraw_nox)));
        }
    }
    Ok((sraw_voc, sraw_nox))
}

/// TVOC concentration (ppb) per the WELL building standard
pub fn tvoc_well(voc_index: i32) -> Option<f64> {
    tvoc(voc_index, -996.94)
}

/// TVOC concentration (µg/m³) per the RESET Air standard
pub fn tvoc_reset(voc_index: i32) -> Option<f64> {
    tvoc(voc_index, -878.53)
}

fn tvoc(voc_index: i32, factor: f64) -> Option<f64> {
    if voc_index >= 501 {
        return None;
    }
    let value = ((501.0 - f64::from(voc_index)).ln() - 6.24) * factor;
    Some(value.max(0.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{AlgorithmTuning, ConditioningConfig, FilterChannel};
    use std::time::Duration;

    use crate::bus::BusLock;
    use crate::gas_index::AdaptiveGasIndex;
    use crate::retry::RetryPolicy;
    use crate::scripted::ScriptedDevice;

    fn driver(script: &ScriptedDevice) -> Sgp41Driver {
        let config = SensorConfig::with_defaults(SensorKind::Sgp41);
        let link = DeviceLink::new(
            SensorKind::Sgp41,
            Ok(Box::new(script.clone())),
            BusLock::new("i2c-1"),
            RetryPolicy::from_config(&config),
        );
        let adapter = GasIndexAdapter::new(
            Box::new(AdaptiveGasIndex::with_learning_samples(
                FilterChannel::VocIndex,
                AlgorithmTuning::voc(),
                1,
            )),
            Box::new(AdaptiveGasIndex::with_learning_samples(
                FilterChannel::NoxIndex,
                AlgorithmTuning::nox(),
                1,
            )),
            &ConditioningConfig::default(),
        )
        .unwrap();
        Sgp41Driver::new(&config, link, adapter)
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_before_conditioning_fails_without_sampling() {
        let script = ScriptedDevice::new(SensorKind::Sgp41);
        script.repeat(Ok(RawSample::Sgp41 {
            sraw_voc: 30_000,
            sraw_nox: 15_000,
        }));
        let mut driver = driver(&script);

        let err = driver.read(Compensation::default()).await.unwrap_err();
        assert!(matches!(err, DriverError::NotConditioned { .. }));
        assert_eq!(script.sample_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_conditioning_then_learning_then_index() {
        let script = ScriptedDevice::new(SensorKind::Sgp41);
        script.push(Ok(RawSample::Sgp41 {
            sraw_voc: 0,
            sraw_nox: 15_000,
        }));
        script.repeat(Ok(RawSample::Sgp41 {
            sraw_voc: 30_000,
            sraw_nox: 15_000,
        }));
        let mut driver = driver(&script);

        let start = Instant::now();
        driver.condition(Compensation::default()).await.unwrap();
        assert_eq!(start.elapsed(), Duration::from_secs(10));
        assert_eq!(script.condition_calls(), 1);
        assert!(driver.conditioning().status().is_conditioned);

        // zero ticks retried, then the first index is still learning
        let first = driver.read(Compensation::default()).await.unwrap();
        assert_eq!(first.fields.voc_index, Some(0));
        assert!(first.voc_learning);
        assert_eq!(script.sample_calls(), 2);

        let second = driver.read(Compensation::default()).await.unwrap();
        assert!(!second.voc_learning);
        assert_eq!(second.fields.voc_index, Some(100));
        assert_eq!(second.fields.sraw_nox, Some(15_000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_conditioning_skipped_while_valid() {
        let script = ScriptedDevice::new(SensorKind::Sgp41);
        let mut driver = driver(&script);
        driver.condition(Compensation::default()).await.unwrap();
        driver.condition(Compensation::default()).await.unwrap();
        assert_eq!(script.condition_calls(), 1);

        tokio::time::advance(Duration::from_secs(601)).await;
        driver.condition(Compensation::default()).await.unwrap();
        assert_eq!(script.condition_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_conditioning_failure_marks_tracker() {
        let script = ScriptedDevice::new(SensorKind::Sgp41);
        script.fail_condition(true);
        let mut driver = driver(&script);

        let err = driver.condition(Compensation::default()).await.unwrap_err();
        assert!(matches!(err, DriverError::Conditioning { .. }));
        let status = driver.conditioning().status();
        assert!(!status.is_conditioned);
        assert!(!status.in_progress);
    }

    #[test]
    fn test_tvoc_conversions() {
        assert_eq!(tvoc_well(501), None);
        assert_eq!(tvoc_reset(600), None);
        assert!(tvoc_well(0).unwrap() > 0.0);
        assert!(tvoc_well(100).unwrap() < tvoc_well(300).unwrap());

        let well = tvoc_well(400).unwrap();
        let expected = ((101.0f64).ln() - 6.24) * -996.94;
        assert!((well - expected).abs() < 1e-9);
        let reset = tvoc_reset(400).unwrap();
        assert!(reset < well);
    }
}
