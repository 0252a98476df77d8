//! # Contracts
//!
//! Frozen interface contracts shared by every airwatch crate: sensor kinds,
//! reading payloads, the aggregate snapshot, health/status records, the
//! station blueprint and the persistence sink trait.
//! Business crates depend on this crate only; reverse dependencies are prohibited.
//!
//! ## Time Model
//! - Wall-clock capture timestamps are `chrono::DateTime<Utc>`
//! - Durations in configuration are milliseconds (`*_ms` fields)

mod blueprint;
mod error;
mod reading;
mod sensor;
mod sink;
mod snapshot;
mod status;

pub use blueprint::*;
pub use error::*;
pub use reading::*;
pub use sensor::*;
pub use sink::*;
pub use snapshot::*;
pub use status::*;
