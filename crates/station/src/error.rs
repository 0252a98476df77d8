//! Station error types

use contracts::{ContractError, SensorKind};
use drivers::DriverError;
use thiserror::Error;

/// Errors surfaced by the sensor manager's query and diagnostic API
#[derive(Debug, Error)]
pub enum StationError {
    /// Sensor is not configured or disabled
    #[error("sensor '{0}' is not configured")]
    NotConfigured(SensorKind),

    /// Requested capability is not present on this sensor kind
    #[error("sensor '{sensor}' has no {capability}")]
    CapabilityMissing {
        sensor: SensorKind,
        capability: &'static str,
    },

    /// Sensor device could not be opened
    #[error("sensor '{sensor}' is unavailable: {message}")]
    Unavailable { sensor: SensorKind, message: String },

    #[error(transparent)]
    Driver(#[from] DriverError),

    #[error(transparent)]
    Contract(#[from] ContractError),
}

impl StationError {
    pub fn capability_missing(sensor: SensorKind, capability: &'static str) -> Self {
        Self::CapabilityMissing { sensor, capability }
    }
}

/// Station Result type alias
pub type Result<T> = std::result::Result<T, StationError>;
