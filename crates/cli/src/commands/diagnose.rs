//! `diagnose` command implementation.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use contracts::{DiagnosticOutcome, DiagnosticResult, SensorKind, StationBlueprint};
use drivers::DeviceFactory;
use station::SensorManager;
use tracing::info;

use super::{device_factory, load_or_default};
use crate::cli::DiagnoseArgs;
use crate::error::CliError;

/// Execute the `diagnose` command
pub async fn run_diagnose(args: &DiagnoseArgs) -> Result<()> {
    let blueprint = load_or_default(args.config.as_deref())?;
    let factory = device_factory(&args.device);

    info!(sensors = blueprint.enabled_sensors().count(), "Running sensor diagnostics");
    let results = diagnose(&blueprint, &factory)
        .await
        .context("Failed to set up sensors")?;

    if args.json {
        let json = serde_json::to_string_pretty(&results)
            .context("Failed to serialize diagnostic results")?;
        println!("{}", json);
    } else {
        print_results(&results);
    }

    let failed = results
        .values()
        .filter(|r| r.status != DiagnosticOutcome::Passed)
        .count();
    if failed > 0 {
        anyhow::bail!("{failed} sensor(s) did not pass diagnostics");
    }
    Ok(())
}

async fn diagnose(
    blueprint: &StationBlueprint,
    factory: &dyn DeviceFactory,
) -> Result<BTreeMap<SensorKind, DiagnosticResult>, CliError> {
    let manager = SensorManager::new(blueprint, factory, None)?;
    Ok(manager.test_sensors().await)
}

fn print_results(results: &BTreeMap<SensorKind, DiagnosticResult>) {
    println!("\n=== Sensor Diagnostics ===\n");
    for (kind, result) in results {
        let mark = match result.status {
            DiagnosticOutcome::Passed => "✓",
            DiagnosticOutcome::Failed => "✗",
            DiagnosticOutcome::Error => "!",
            DiagnosticOutcome::Offline => "-",
        };
        println!(
            "  {} {:<6} {:<8} {}",
            mark,
            kind.as_str(),
            result.status.as_str(),
            result.details
        );
        if let Some(reading) = &result.reading {
            if let Ok(line) = serde_json::to_string(reading) {
                println!("           {}", line);
            }
        }
    }
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::SensorConfig;
    use drivers::{RawSample, ScriptedFactory};

    #[tokio::test(start_paused = true)]
    async fn test_diagnose_reports_every_sensor() {
        let factory = ScriptedFactory::new();
        factory.script(SensorKind::Dht22).repeat(Ok(RawSample::Dht22 {
            temperature: 20.0,
            humidity: 50.0,
        }));
        factory.fail_open(SensorKind::Scd40);

        let mut bp = StationBlueprint::default_station();
        bp.sensors = vec![
            SensorConfig::with_defaults(SensorKind::Scd40),
            SensorConfig::with_defaults(SensorKind::Dht22),
        ];

        let results = diagnose(&bp, &factory).await.unwrap();
        assert_eq!(results[&SensorKind::Dht22].status, DiagnosticOutcome::Passed);
        assert_eq!(results[&SensorKind::Scd40].status, DiagnosticOutcome::Offline);

        let json = serde_json::to_value(&results).unwrap();
        assert_eq!(json["dht22"]["status"], "passed");
    }
}
