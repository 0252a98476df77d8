//! Error types for CLI operations.

use contracts::ContractError;
use dispatcher::DispatcherError;
use station::StationError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: String },

    #[error("Invalid configuration: {0}")]
    Config(#[from] ContractError),

    #[error("Station error: {0}")]
    Station(#[from] StationError),

    #[error("Dispatcher error: {0}")]
    Dispatcher(#[from] DispatcherError),
}

impl CliError {
    pub fn config_not_found(path: impl Into<String>) -> Self {
        Self::ConfigNotFound { path: path.into() }
    }
}
