//! Command implementations.

mod diagnose;
mod info;
mod run;
mod validate;

use std::path::Path;

use contracts::StationBlueprint;
use drivers::{SimulatedDeviceFactory, SimulationConfig};
use tracing::info;

use crate::cli::DeviceArgs;
use crate::error::CliError;

pub use diagnose::run_diagnose;
pub use info::run_info;
pub use run::run_station;
pub use validate::run_validate;

/// Load and validate the blueprint at `path`
pub(crate) fn load_blueprint(path: &Path) -> Result<StationBlueprint, CliError> {
    if !path.exists() {
        return Err(CliError::config_not_found(path.display().to_string()));
    }
    Ok(config_loader::ConfigLoader::load_from_path(path)?)
}

/// Blueprint from `path`, or the built-in station when none is given
pub(crate) fn load_or_default(path: Option<&Path>) -> Result<StationBlueprint, CliError> {
    match path {
        Some(path) => {
            info!(config = %path.display(), "Loading configuration");
            load_blueprint(path)
        }
        None => {
            info!("No configuration given, using built-in station defaults");
            Ok(StationBlueprint::default_station())
        }
    }
}

pub(crate) fn device_factory(args: &DeviceArgs) -> SimulatedDeviceFactory {
    SimulatedDeviceFactory::new(SimulationConfig {
        glitch_rate: args.glitch_rate,
        seed: args.seed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_missing_config_reported() {
        let err = load_blueprint(Path::new("/nonexistent/station.toml")).unwrap_err();
        assert!(matches!(err, CliError::ConfigNotFound { .. }));
    }

    #[test]
    fn test_invalid_config_reported() {
        let mut file = NamedTempFile::with_suffix(".toml").unwrap();
        writeln!(file, "[[sensors]]\nkind = \"bme680\"").unwrap();
        let err = load_blueprint(file.path()).unwrap_err();
        assert!(matches!(err, CliError::Config(_)));
    }

    #[test]
    fn test_default_station_without_path() {
        let bp = load_or_default(None).unwrap();
        assert_eq!(bp.sensors.len(), 3);
    }
}
