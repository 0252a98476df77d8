//! Station run orchestration.

mod orchestrator;
mod stats;

pub use orchestrator::{StationRun, StationRunConfig};
pub use stats::RunStats;
