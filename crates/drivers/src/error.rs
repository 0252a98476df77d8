//! Driver error types

use contracts::{ContractError, SensorKind};
use thiserror::Error;

/// How a hardware error is handled by the retry loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Glitch expected to clear on the next attempt
    Transient,
    /// Device not responding; triggers re-initialisation
    Absent,
    /// I/O failure or implausible data
    Fault,
}

impl ErrorClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorClass::Transient => "transient",
            ErrorClass::Absent => "absent",
            ErrorClass::Fault => "fault",
        }
    }
}

/// Error raised by one hardware access
#[derive(Debug, Clone, Error, PartialEq)]
pub enum HardwareError {
    #[error("checksum mismatch")]
    Checksum,

    #[error("bus busy: {0}")]
    BusBusy(String),

    #[error("data not ready")]
    NotReady,

    #[error("sensor not found: {0}")]
    NotFound(String),

    #[error("raw signal is zero")]
    ZeroTicks,

    #[error("sensor returned error sentinel {0}")]
    Sentinel(u32),

    #[error("implausible {quantity}: {value}")]
    InvalidData { quantity: &'static str, value: f64 },

    #[error("i/o error: {0}")]
    Io(String),
}

impl HardwareError {
    pub fn class(&self) -> ErrorClass {
        match self {
            HardwareError::Checksum
            | HardwareError::BusBusy(_)
            | HardwareError::NotReady
            | HardwareError::ZeroTicks
            | HardwareError::Sentinel(_) => ErrorClass::Transient,
            HardwareError::NotFound(_) => ErrorClass::Absent,
            HardwareError::InvalidData { .. } | HardwareError::Io(_) => ErrorClass::Fault,
        }
    }

    /// Classify a free-form message reported by a single-wire sensor library
    pub fn from_message(message: &str) -> Self {
        let lower = message.to_lowercase();
        if lower.contains("checksum") {
            HardwareError::Checksum
        } else if lower.contains("full buffer") || lower.contains("buffer was not returned") {
            HardwareError::BusBusy(message.to_string())
        } else if lower.contains("sensor not found") || lower.contains("no response") {
            HardwareError::NotFound(message.to_string())
        } else {
            HardwareError::Io(message.to_string())
        }
    }

    pub fn invalid(quantity: &'static str, value: f64) -> Self {
        HardwareError::InvalidData { quantity, value }
    }
}

/// Error returned by a driver operation
#[derive(Debug, Error)]
pub enum DriverError {
    /// Device was never opened or is gone
    #[error("{sensor} device is not available")]
    DeviceUnavailable { sensor: SensorKind },

    /// Every attempt of a bounded-retry read failed
    #[error("{sensor} read failed after {attempts} attempts: {last}")]
    RetriesExhausted {
        sensor: SensorKind,
        attempts: u32,
        #[source]
        last: HardwareError,
    },

    /// Gas sensor read before conditioning completed
    #[error("{sensor} is not conditioned")]
    NotConditioned { sensor: SensorKind },

    #[error("{sensor} conditioning failed: {message}")]
    Conditioning { sensor: SensorKind, message: String },

    #[error("{sensor} re-initialisation failed: {source}")]
    Reinitialize {
        sensor: SensorKind,
        #[source]
        source: HardwareError,
    },

    #[error(transparent)]
    Contract(#[from] ContractError),
}

impl DriverError {
    /// Whether the last hardware error reported an absent device
    pub fn is_absent(&self) -> bool {
        matches!(
            self,
            DriverError::RetriesExhausted { last, .. } if last.class() == ErrorClass::Absent
        )
    }

    pub fn conditioning(sensor: SensorKind, message: impl Into<String>) -> Self {
        Self::Conditioning {
            sensor,
            message: message.into(),
        }
    }
}

/// Result alias
pub type Result<T> = std::result::Result<T, DriverError>;
