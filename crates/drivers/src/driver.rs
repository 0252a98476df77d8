//! Closed set of sensor drivers.

use contracts::{
    Compensation, ContractError, FilterChannel, SensorConfig, SensorKind, SensorReading,
};
use tracing::{error, info};

use crate::bus::BusRegistry;
use crate::device::DeviceFactory;
use crate::dht22::Dht22Driver;
use crate::error::{HardwareError, Result};
use crate::gas_index::{ConditioningHandle, GasIndexAdapter};
use crate::retry::{DeviceLink, RetryPolicy};
use crate::scd40::Scd40Driver;
use crate::sgp41::Sgp41Driver;

/// Result of one driver read
#[derive(Debug, Clone, PartialEq)]
pub struct DriverReading {
    pub reading: SensorReading,
    /// Channels produced by an algorithm still in its learning phase
    pub learning: Vec<FilterChannel>,
}

impl DriverReading {
    fn settled(reading: SensorReading) -> Self {
        Self {
            reading,
            learning: Vec::new(),
        }
    }
}

pub enum SensorDriver {
    Scd40(Scd40Driver),
    Dht22(Dht22Driver),
    Sgp41(Sgp41Driver),
}

impl SensorDriver {
    /// Build the driver of `config`, opening its device
    ///
    /// A device that fails to open still yields a driver; it reports
    /// `is_open() == false` and every read fails with `DeviceUnavailable`.
    ///
    /// # Errors
    /// Invalid gas index or conditioning settings.
    pub fn open(
        config: &SensorConfig,
        factory: &dyn DeviceFactory,
        buses: &mut BusRegistry,
    ) -> Result<Self> {
        let kind = config.kind;
        let device = factory.open(config);
        match &device {
            Ok(_) => info!(sensor = %kind, bus = config.bus_name(), "device opened"),
            Err(err) => error!(sensor = %kind, bus = config.bus_name(), error = %err, "device open failed"),
        }
        let link = DeviceLink::new(
            kind,
            device,
            buses.get_or_create(config.bus_name()),
            RetryPolicy::from_config(config),
        );

        let driver = match kind {
            SensorKind::Scd40 => SensorDriver::Scd40(Scd40Driver::new(config, link)),
            SensorKind::Dht22 => SensorDriver::Dht22(Dht22Driver::new(config, link)),
            SensorKind::Sgp41 => {
                let conditioning = config
                    .conditioning_or_default()
                    .ok_or_else(|| ContractError::capability_missing(kind, "conditioning"))?;
                let tuning = config
                    .gas_index_or_default()
                    .ok_or_else(|| ContractError::capability_missing(kind, "gas_index"))?;
                let adapter = GasIndexAdapter::new(
                    factory.gas_index(FilterChannel::VocIndex, &tuning.voc),
                    factory.gas_index(FilterChannel::NoxIndex, &tuning.nox),
                    &conditioning,
                )?;
                SensorDriver::Sgp41(Sgp41Driver::new(config, link, adapter))
            }
        };
        Ok(driver)
    }

    pub fn kind(&self) -> SensorKind {
        self.link().kind()
    }

    fn link(&self) -> &DeviceLink {
        match self {
            SensorDriver::Scd40(d) => d.link(),
            SensorDriver::Dht22(d) => d.link(),
            SensorDriver::Sgp41(d) => d.link(),
        }
    }

    fn link_mut(&mut self) -> &mut DeviceLink {
        match self {
            SensorDriver::Scd40(d) => d.link_mut(),
            SensorDriver::Dht22(d) => d.link_mut(),
            SensorDriver::Sgp41(d) => d.link_mut(),
        }
    }

    pub fn is_open(&self) -> bool {
        self.link().is_open()
    }

    pub fn open_error(&self) -> Option<&HardwareError> {
        self.link().open_error()
    }

    /// Bounded-retry read
    ///
    /// `compensation` is only used by compensable sensors.
    pub async fn read(&mut self, compensation: Compensation) -> Result<DriverReading> {
        match self {
            SensorDriver::Scd40(d) => Ok(DriverReading::settled(SensorReading::Scd40(
                d.read().await?,
            ))),
            SensorDriver::Dht22(d) => Ok(DriverReading::settled(SensorReading::Dht22(
                d.read().await?,
            ))),
            SensorDriver::Sgp41(d) => {
                let gas = d.read(compensation).await?;
                let mut learning = Vec::new();
                if gas.voc_learning {
                    learning.push(FilterChannel::VocIndex);
                }
                if gas.nox_learning {
                    learning.push(FilterChannel::NoxIndex);
                }
                Ok(DriverReading {
                    reading: SensorReading::Sgp41(gas.fields),
                    learning,
                })
            }
        }
    }

    pub async fn reinitialize(&mut self) -> Result<()> {
        self.link_mut().reinitialize().await
    }

    /// Conditioning state, `None` for kinds that do not condition
    pub fn conditioning(&self) -> Option<ConditioningHandle> {
        match self {
            SensorDriver::Sgp41(d) => Some(d.conditioning()),
            _ => None,
        }
    }

    /// Whether a read would fail for lack of conditioning
    pub fn needs_conditioning(&self) -> bool {
        self.conditioning().is_some_and(|c| !c.is_conditioned())
    }

    /// Run conditioning if this kind requires it
    pub async fn condition(&mut self, compensation: Compensation) -> Result<()> {
        match self {
            SensorDriver::Sgp41(d) => d.condition(compensation).await,
            _ => Ok(()),
        }
    }
}

impl std::fmt::Debug for SensorDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SensorDriver")
            .field("link", self.link())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::ConditioningConfig;

    use crate::device::RawSample;
    use crate::error::DriverError;
    use crate::scripted::ScriptedFactory;

    #[tokio::test]
    async fn test_open_failure_yields_closed_driver() {
        let factory = ScriptedFactory::new();
        factory.fail_open(SensorKind::Dht22);
        let mut buses = BusRegistry::new();

        let mut driver = SensorDriver::open(
            &SensorConfig::with_defaults(SensorKind::Dht22),
            &factory,
            &mut buses,
        )
        .unwrap();
        assert!(!driver.is_open());
        assert!(driver.open_error().is_some());
        assert!(matches!(
            driver.read(Compensation::default()).await,
            Err(DriverError::DeviceUnavailable { .. })
        ));
    }

    #[test]
    fn test_conditioning_duration_above_maximum_rejected() {
        let factory = ScriptedFactory::new();
        let mut buses = BusRegistry::new();
        let mut config = SensorConfig::with_defaults(SensorKind::Sgp41);
        config.conditioning = Some(ConditioningConfig {
            duration_ms: 15_000,
            validity_ms: 600_000,
        });

        let err = SensorDriver::open(&config, &factory, &mut buses).unwrap_err();
        assert!(err.to_string().contains("vendor maximum"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_gas_reading_reports_learning_channels() {
        let factory = ScriptedFactory::with_learning_samples(2);
        factory.script(SensorKind::Sgp41).repeat(Ok(RawSample::Sgp41 {
            sraw_voc: 28_000,
            sraw_nox: 14_000,
        }));
        let mut buses = BusRegistry::new();
        let mut driver = SensorDriver::open(
            &SensorConfig::with_defaults(SensorKind::Sgp41),
            &factory,
            &mut buses,
        )
        .unwrap();

        assert!(driver.needs_conditioning());
        driver.condition(Compensation::default()).await.unwrap();
        assert!(!driver.needs_conditioning());

        let reading = driver.read(Compensation::default()).await.unwrap();
        assert_eq!(
            reading.learning,
            vec![FilterChannel::VocIndex, FilterChannel::NoxIndex]
        );
    }

    #[test]
    fn test_sensors_on_same_bus_share_lock() {
        let factory = ScriptedFactory::new();
        let mut buses = BusRegistry::new();
        SensorDriver::open(&SensorConfig::with_defaults(SensorKind::Scd40), &factory, &mut buses)
            .unwrap();
        SensorDriver::open(&SensorConfig::with_defaults(SensorKind::Sgp41), &factory, &mut buses)
            .unwrap();
        SensorDriver::open(&SensorConfig::with_defaults(SensorKind::Dht22), &factory, &mut buses)
            .unwrap();
        assert_eq!(buses.len(), 2);
    }
}
