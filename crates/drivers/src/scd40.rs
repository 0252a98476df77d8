//! SCD40 CO2 sensor (I2C).

use std::time::Duration;

use contracts::{Compensation, Scd40Fields, SensorConfig, ValidRanges, ValueRange};
use tokio::time::Instant;
use tracing::{debug, instrument};

use crate::device::RawSample;
use crate::error::{HardwareError, Result};
use crate::retry::DeviceLink;

/// CO2 value the sensor reports when a measurement failed
pub const CO2_ERROR_SENTINEL: u16 = 32768;

pub struct Scd40Driver {
    link: DeviceLink,
    ranges: ValidRanges,
    ready_at: Instant,
    cache_ttl: Duration,
    cache: Option<(Instant, Scd40Fields)>,
}

impl Scd40Driver {
    pub fn new(config: &SensorConfig, link: DeviceLink) -> Self {
        Self {
            link,
            ranges: config.valid_ranges_or_default(),
            ready_at: Instant::now() + config.warmup(),
            cache_ttl: config.cache_ttl(),
            cache: None,
        }
    }

    pub fn link(&self) -> &DeviceLink {
        &self.link
    }

    pub fn link_mut(&mut self) -> &mut DeviceLink {
        &mut self.link
    }

    /// Bounded-retry read
    ///
    /// Waits out the warm-up period first (no lock held). While the device
    /// reports data-not-ready, a cached reading younger than the cache TTL is
    /// returned instead.
    #[instrument(name = "scd40_read", skip(self))]
    pub async fn read(&mut self) -> Result<Scd40Fields> {
        tokio::time::sleep_until(self.ready_at).await;

        let now = Instant::now();
        let cached = self
            .cache
            .filter(|(at, _)| now.saturating_duration_since(*at) < self.cache_ttl)
            .map(|(_, fields)| fields);
        let ranges = self.ranges;

        let (fields, fresh) = self
            .link
            .read(Compensation::default(), |sample| match sample {
                Ok(RawSample::Scd40 {
                    co2,
                    temperature,
                    humidity,
                }) => interpret(&ranges, co2, temperature, humidity).map(|f| (f, true)),
                Ok(other) => Err(HardwareError::Io(format!(
                    "unexpected {} sample",
                    other.kind()
                ))),
                Err(HardwareError::NotReady) => match cached {
                    Some(fields) => Ok((fields, false)),
                    None => Err(HardwareError::NotReady),
                },
                Err(err) => Err(err),
            })
            .await?;

        if fresh {
            self.cache = Some((Instant::now(), fields));
        } else {
            debug!(co2 = ?fields.co2, "data not ready, using cached reading");
        }
        Ok(fields)
    }
}

fn interpret(
    ranges: &ValidRanges,
    co2: u16,
    temperature: f64,
    humidity: f64,
) -> std::result::Result<Scd40Fields, HardwareError> {
    if co2 == CO2_ERROR_SENTINEL {
        return Err(HardwareError::Sentinel(u32::from(co2)));
    }
    if !within(ranges.co2, f64::from(co2)) {
        return Err(HardwareError::invalid("co2", f64::from(co2)));
    }
    Ok(Scd40Fields {
        co2: Some(co2),
        temperature: within(ranges.temperature, temperature).then(|| round1(temperature)),
        humidity: within(ranges.humidity, humidity).then(|| round1(humidity)),
    })
}

fn within(range: Option<ValueRange>, value: f64) -> bool {
    range.map_or(value.is_finite(), |r| r.contains(value))
}

pub(crate) fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::SensorKind;

    use crate::bus::BusLock;
    use crate::error::DriverError;
    use crate::retry::RetryPolicy;
    use crate::scripted::ScriptedDevice;

    fn driver(script: &ScriptedDevice, config: &SensorConfig) -> Scd40Driver {
        let link = DeviceLink::new(
            SensorKind::Scd40,
            Ok(Box::new(script.clone())),
            BusLock::new("i2c-1"),
            RetryPolicy::from_config(config),
        );
        Scd40Driver::new(config, link)
    }

    fn config() -> SensorConfig {
        let mut config = SensorConfig::with_defaults(SensorKind::Scd40);
        config.warmup_ms = Some(0);
        config
    }

    fn sample(co2: u16) -> RawSample {
        RawSample::Scd40 {
            co2,
            temperature: 22.34,
            humidity: 41.26,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_sentinel_is_retried() {
        let script = ScriptedDevice::new(SensorKind::Scd40);
        script.push(Ok(sample(CO2_ERROR_SENTINEL)));
        script.push(Ok(sample(812)));
        let mut driver = driver(&script, &config());

        let fields = driver.read().await.unwrap();
        assert_eq!(fields.co2, Some(812));
        assert_eq!(fields.temperature, Some(22.3));
        assert_eq!(fields.humidity, Some(41.3));
        assert_eq!(script.sample_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_out_of_range_co2_exhausts_retries() {
        let script = ScriptedDevice::new(SensorKind::Scd40);
        script.repeat(Ok(sample(120)));
        let mut driver = driver(&script, &config());

        let err = driver.read().await.unwrap_err();
        assert!(matches!(err, DriverError::RetriesExhausted { attempts: 3, .. }));
        assert_eq!(script.sample_calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_not_ready_served_from_fresh_cache() {
        let script = ScriptedDevice::new(SensorKind::Scd40);
        script.push(Ok(sample(650)));
        script.repeat(Err(HardwareError::NotReady));
        let mut driver = driver(&script, &config());

        assert_eq!(driver.read().await.unwrap().co2, Some(650));
        tokio::time::advance(Duration::from_secs(5)).await;
        assert_eq!(driver.read().await.unwrap().co2, Some(650));
        assert_eq!(script.sample_calls(), 2);

        tokio::time::advance(Duration::from_secs(6)).await;
        assert!(driver.read().await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_read_waits_for_warmup() {
        let script = ScriptedDevice::new(SensorKind::Scd40);
        script.repeat(Ok(sample(700)));
        let mut config = config();
        config.warmup_ms = Some(10_000);
        let mut driver = driver(&script, &config);

        let start = Instant::now();
        driver.read().await.unwrap();
        assert!(start.elapsed() >= Duration::from_secs(10));
    }
}
