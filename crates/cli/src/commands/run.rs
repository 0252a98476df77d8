//! `run` command implementation.

use anyhow::Result;
use contracts::StationBlueprint;
use std::time::Duration;
use tracing::info;

use super::{device_factory, load_or_default};
use crate::cli::RunArgs;
use crate::pipeline::{StationRun, StationRunConfig};

/// Execute the `run` command
pub async fn run_station(args: &RunArgs) -> Result<()> {
    let blueprint = load_or_default(args.config.as_deref())?;

    info!(
        station = %blueprint.station.name,
        sensors = blueprint.enabled_sensors().count(),
        sinks = blueprint.sinks.len(),
        "Configuration loaded"
    );

    if args.dry_run {
        info!("Dry run mode - configuration is valid, exiting");
        print_config_summary(&blueprint);
        return Ok(());
    }

    let config = StationRunConfig {
        blueprint,
        duration: (args.duration > 0).then(|| Duration::from_secs(args.duration)),
        health_interval: Duration::from_secs(args.health_interval.max(1)),
        buffer_size: args.buffer_size,
        metrics_port: (args.metrics_port > 0).then_some(args.metrics_port),
    };

    let factory = device_factory(&args.device);
    let stats = StationRun::new(config)
        .run(&factory, shutdown_signal())
        .await?;

    stats.print_summary();
    info!("airwatch finished");
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM
///
/// A handler that cannot be installed never resolves; the other one and
/// `--duration` still apply.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Print configuration summary for dry-run mode
fn print_config_summary(blueprint: &StationBlueprint) {
    println!("\n=== Configuration Summary ===\n");
    println!("Station: {}", blueprint.station.name);

    println!("\nSensors ({}):", blueprint.enabled_sensors().count());
    for sensor in blueprint.enabled_sensors() {
        println!(
            "  - {} on {} every {}s{}",
            sensor.kind,
            sensor.bus_name(),
            sensor.poll_interval().as_secs(),
            if sensor.persists() { " (persists)" } else { "" }
        );
    }

    if !blueprint.sinks.is_empty() {
        println!("\nSinks ({}):", blueprint.sinks.len());
        for sink in &blueprint.sinks {
            println!("  - {} ({:?})", sink.name, sink.sink_type);
        }
    }

    println!();
}
