//! DHT22 temperature/humidity sensor (single-wire GPIO).

use contracts::{Compensation, Dht22Fields, SensorConfig, ValidRanges};
use tracing::instrument;

use crate::device::RawSample;
use crate::error::{HardwareError, Result};
use crate::retry::DeviceLink;
use crate::scd40::round1;

pub struct Dht22Driver {
    link: DeviceLink,
    ranges: ValidRanges,
}

impl Dht22Driver {
    pub fn new(config: &SensorConfig, link: DeviceLink) -> Self {
        Self {
            link,
            ranges: config.valid_ranges_or_default(),
        }
    }

    pub fn link(&self) -> &DeviceLink {
        &self.link
    }

    pub fn link_mut(&mut self) -> &mut DeviceLink {
        &mut self.link
    }

    /// Bounded-retry read, values rounded to one decimal
    #[instrument(name = "dht22_read", skip(self))]
    pub async fn read(&mut self) -> Result<Dht22Fields> {
        let ranges = self.ranges;
        self.link
            .read(Compensation::default(), |sample| match sample? {
                RawSample::Dht22 {
                    temperature,
                    humidity,
                } => interpret(&ranges, temperature, humidity),
                other => Err(HardwareError::Io(format!(
                    "unexpected {} sample",
                    other.kind()
                ))),
            })
            .await
    }
}

fn interpret(
    ranges: &ValidRanges,
    temperature: f64,
    humidity: f64,
) -> std::result::Result<Dht22Fields, HardwareError> {
    // all-zero frame is a wiring glitch, not a reading
    if temperature == 0.0 && humidity == 0.0 {
        return Err(HardwareError::invalid("temperature", temperature));
    }
    if let Some(range) = ranges.temperature {
        if !range.contains(temperature) {
            return Err(HardwareError::invalid("temperature", temperature));
        }
    }
    if let Some(range) = ranges.humidity {
        if !range.contains(humidity) {
            return Err(HardwareError::invalid("humidity", humidity));
        }
    }
    Ok(Dht22Fields {
        temperature: Some(round1(temperature)),
        humidity: Some(round1(humidity)),
    })
}
