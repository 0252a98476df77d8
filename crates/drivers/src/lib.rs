//! # Drivers
//!
//! Sensor drivers for the station.
//!
//! Responsibilities:
//! - Abstract physical sensors behind the [`RawDevice`] boundary
//! - Serialize bus access through a per-bus [`BusLock`]
//! - Bounded-retry reads with transient/absent/fault classification
//! - Rate-limited logging of repeated hardware errors
//! - Gas index conversion gated by conditioning
//! - Simulated and scripted devices for runs without hardware
//!
//! ## Example
//!
//! ```ignore
//! use drivers::{BusRegistry, SensorDriver, SimulatedDeviceFactory};
//!
//! let mut buses = BusRegistry::new();
//! let factory = SimulatedDeviceFactory::default();
//! let mut driver = SensorDriver::open(&config, &factory, &mut buses)?;
//! let reading = driver.read(Compensation::default()).await?;
//! ```

mod bus;
mod device;
mod dht22;
mod driver;
mod error;
mod gas_index;
mod retry;
mod scd40;
mod scripted;
mod sgp41;
mod simulated;
mod throttle;

pub use bus::{BusLock, BusRegistry};
pub use device::{DeviceFactory, RawDevice, RawSample};
pub use dht22::Dht22Driver;
pub use driver::{DriverReading, SensorDriver};
pub use error::{DriverError, ErrorClass, HardwareError, Result};
pub use gas_index::{
    AdaptiveGasIndex, ConditioningHandle, ConditioningTracker, GasIndexAdapter,
    GasIndexAlgorithm, GasIndexOutput, INITIAL_LEARNING_SAMPLES, MAX_INDEX,
};
pub use retry::{DeviceLink, RetryPolicy};
pub use scd40::{Scd40Driver, CO2_ERROR_SENTINEL};
pub use scripted::{ScriptedDevice, ScriptedFactory};
pub use sgp41::{tvoc_reset, tvoc_well, GasReading, Sgp41Driver};
pub use simulated::{SimulatedDevice, SimulatedDeviceFactory, SimulationConfig};
pub use throttle::{LogThrottle, Severity};
