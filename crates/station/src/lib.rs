//! # Station
//!
//! Multi-cadence acquisition engine.
//!
//! - [`SensorManager`]: opens the configured sensors, runs one polling loop per
//!   cadence group, cross-feeds compensation, keeps the aggregate snapshot and
//!   hands composed records to persistence
//! - [`HealthEvaluator`]: pure per-sensor and quorum health derivation
//!
//! ## Example
//!
//! ```ignore
//! use drivers::SimulatedDeviceFactory;
//! use station::SensorManager;
//!
//! let manager = SensorManager::new(&blueprint, &SimulatedDeviceFactory::default(), Some(tx))?;
//! manager.start();
//! let health = manager.get_health_status();
//! manager.stop().await;
//! ```

mod error;
mod health;
mod manager;
mod metrics;
mod slot;

pub use error::{Result, StationError};
pub use health::{HealthEvaluator, MIN_FRESHNESS};
pub use manager::{CadenceGroup, SensorManager};
pub use metrics::{CountersSnapshot, StationCounters};
