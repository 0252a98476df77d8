//! `validate` command implementation.

use anyhow::{Context, Result};
use contracts::StationBlueprint;
use serde::Serialize;
use std::path::Path;
use tracing::info;

use super::load_blueprint;
use crate::cli::ValidateArgs;

/// Validation result for JSON output
#[derive(Serialize)]
struct ValidationResult {
    valid: bool,
    config_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    warnings: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<ConfigSummary>,
}

#[derive(Serialize)]
struct ConfigSummary {
    version: String,
    station: String,
    sensor_count: usize,
    enabled_sensor_count: usize,
    sink_count: usize,
}

/// Execute the `validate` command
pub fn run_validate(args: &ValidateArgs) -> Result<()> {
    info!(config = %args.config.display(), "Validating configuration");

    let result = validate_config(&args.config);

    if args.json {
        let json = serde_json::to_string_pretty(&result)
            .context("Failed to serialize validation result")?;
        println!("{}", json);
    } else {
        print_validation_result(&result);
    }

    if result.valid {
        Ok(())
    } else {
        anyhow::bail!("Configuration validation failed")
    }
}

fn validate_config(path: &Path) -> ValidationResult {
    let config_path = path.display().to_string();

    match load_blueprint(path) {
        Ok(blueprint) => ValidationResult {
            valid: true,
            config_path,
            error: None,
            warnings: config_loader::ConfigLoader::warnings(&blueprint),
            summary: Some(summarize(&blueprint)),
        },
        Err(e) => ValidationResult {
            valid: false,
            config_path,
            error: Some(e.to_string()),
            warnings: Vec::new(),
            summary: None,
        },
    }
}

fn summarize(blueprint: &StationBlueprint) -> ConfigSummary {
    ConfigSummary {
        version: format!("{:?}", blueprint.version),
        station: blueprint.station.name.clone(),
        sensor_count: blueprint.sensors.len(),
        enabled_sensor_count: blueprint.enabled_sensors().count(),
        sink_count: blueprint.sinks.len(),
    }
}

fn print_validation_result(result: &ValidationResult) {
    if result.valid {
        println!("✓ Configuration is valid: {}", result.config_path);

        if let Some(ref summary) = result.summary {
            println!("\n  Version: {}", summary.version);
            println!("  Station: {}", summary.station);
            println!(
                "  Sensors: {} ({} enabled)",
                summary.sensor_count, summary.enabled_sensor_count
            );
            println!("  Sinks: {}", summary.sink_count);
        }

        if !result.warnings.is_empty() {
            println!("\n⚠ Warnings:");
            for warning in &result.warnings {
                println!("  - {}", warning);
            }
        }
    } else {
        println!("✗ Configuration is invalid: {}", result.config_path);
        if let Some(ref error) = result.error {
            println!("\n  Error: {}", error);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_config(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::with_suffix(".toml").unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_valid_config_with_warning() {
        let file = write_config(
            r#"
[station]
name = "kitchen"

[[sensors]]
kind = "dht22"
"#,
        );

        let result = validate_config(file.path());
        assert!(result.valid);
        let summary = result.summary.unwrap();
        assert_eq!(summary.station, "kitchen");
        assert_eq!(summary.enabled_sensor_count, 1);
        assert!(result.warnings.iter().any(|w| w.contains("No sinks")));
    }

    #[test]
    fn test_invalid_config() {
        let file = write_config(
            r#"
[[sensors]]
kind = "sgp41"
[sensors.conditioning]
duration_ms = 20000
"#,
        );

        let result = validate_config(file.path());
        assert!(!result.valid);
        assert!(result.error.is_some());
        assert!(result.summary.is_none());
    }

    #[test]
    fn test_shipped_config_is_valid() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../config/station.toml");
        let result = validate_config(&path);
        assert!(result.valid, "{:?}", result.error);
        assert_eq!(result.summary.unwrap().enabled_sensor_count, 3);
    }

    #[test]
    fn test_missing_file() {
        let result = validate_config(Path::new("/nonexistent/station.toml"));
        assert!(!result.valid);
        assert!(result.error.unwrap().contains("not found"));
    }
}
