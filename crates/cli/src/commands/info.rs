//! `info` command implementation.

use anyhow::{Context, Result};
use contracts::{SensorConfig, SensorKind, StationBlueprint};
use serde::Serialize;
use tracing::info;

use super::load_blueprint;
use crate::cli::InfoArgs;

/// Configuration info for JSON output
#[derive(Serialize)]
struct ConfigInfo {
    version: String,
    station: String,
    sensors: Vec<SensorInfo>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    sinks: Vec<SinkInfo>,
}

#[derive(Serialize)]
struct SensorInfo {
    kind: SensorKind,
    enabled: bool,
    bus: String,
    poll_interval_secs: u64,
    persists: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    filtered_channels: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    conditioning_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    compensation_source: Option<SensorKind>,
}

#[derive(Serialize)]
struct SinkInfo {
    name: String,
    sink_type: String,
    queue_capacity: usize,
}

/// Execute the `info` command
pub fn run_info(args: &InfoArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration info");

    let blueprint = load_blueprint(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    if args.json {
        let json = serde_json::to_string_pretty(&build_config_info(&blueprint))
            .context("Failed to serialize config info")?;
        println!("{}", json);
    } else {
        print_config_info(&blueprint);
    }

    Ok(())
}

fn sensor_info(sensor: &SensorConfig) -> SensorInfo {
    SensorInfo {
        kind: sensor.kind,
        enabled: sensor.enabled,
        bus: sensor.bus_name().to_string(),
        poll_interval_secs: sensor.poll_interval().as_secs(),
        persists: sensor.persists(),
        filtered_channels: sensor
            .filter_or_default()
            .map(|f| {
                f.channels()
                    .into_iter()
                    .filter(|(_, c)| c.enabled)
                    .map(|(channel, _)| channel.to_string())
                    .collect()
            })
            .unwrap_or_default(),
        conditioning_ms: sensor.conditioning_or_default().map(|c| c.duration_ms),
        compensation_source: sensor.compensation_or_default().map(|c| c.source),
    }
}

fn build_config_info(blueprint: &StationBlueprint) -> ConfigInfo {
    ConfigInfo {
        version: format!("{:?}", blueprint.version),
        station: blueprint.station.name.clone(),
        sensors: blueprint.sensors.iter().map(sensor_info).collect(),
        sinks: blueprint
            .sinks
            .iter()
            .map(|s| SinkInfo {
                name: s.name.clone(),
                sink_type: format!("{:?}", s.sink_type),
                queue_capacity: s.queue_capacity,
            })
            .collect(),
    }
}

fn print_config_info(blueprint: &StationBlueprint) {
    let info = build_config_info(blueprint);

    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║                 airwatch Station Configuration               ║");
    println!("╚══════════════════════════════════════════════════════════════╝\n");

    println!("Station");
    println!("   ├─ Version: {}", info.version);
    println!("   └─ Name: {}", info.station);

    println!("\nSensors ({})", info.sensors.len());
    for (i, sensor) in info.sensors.iter().enumerate() {
        let is_last = i == info.sensors.len() - 1;
        let prefix = if is_last { "└─" } else { "├─" };
        let child = if is_last { "   " } else { "│  " };

        let state = if sensor.enabled { "" } else { " [disabled]" };
        println!("   {} {} on {}{}", prefix, sensor.kind, sensor.bus, state);
        println!(
            "   {}  ├─ every {}s{}",
            child,
            sensor.poll_interval_secs,
            if sensor.persists { ", persists records" } else { "" }
        );
        if !sensor.filtered_channels.is_empty() {
            println!("   {}  ├─ filtered: {}", child, sensor.filtered_channels.join(", "));
        }
        if let Some(ms) = sensor.conditioning_ms {
            println!("   {}  ├─ conditioning: {} ms", child, ms);
        }
        match sensor.compensation_source {
            Some(source) => println!("   {}  └─ compensated from {}", child, source),
            None => println!("   {}  └─ no compensation", child),
        }
    }

    if !info.sinks.is_empty() {
        println!("\nSinks ({})", info.sinks.len());
        for (i, sink) in info.sinks.iter().enumerate() {
            let prefix = if i == info.sinks.len() - 1 { "└─" } else { "├─" };
            println!(
                "   {} {} ({}, queue {})",
                prefix, sink.name, sink.sink_type, sink.queue_capacity
            );
        }
    }

    println!();
}
