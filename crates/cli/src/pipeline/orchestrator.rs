//! Station orchestrator - wires sensor manager, dispatcher and reporting.

use std::future::Future;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use contracts::{StationBlueprint, StationRecord};
use dispatcher::Dispatcher;
use drivers::DeviceFactory;
use observability::{record_cycle_report, record_health_report};
use station::SensorManager;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use super::RunStats;
use crate::error::CliError;

/// Bound on waiting for sinks to drain after the station stopped
const DISPATCHER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct StationRunConfig {
    pub blueprint: StationBlueprint,

    /// Stop after this long (None = until shutdown signal)
    pub duration: Option<Duration>,

    /// Interval between health log lines
    pub health_interval: Duration,

    /// Record queue capacity between station and dispatcher
    pub buffer_size: usize,

    /// Metrics server port (None = disabled)
    pub metrics_port: Option<u16>,
}

/// One run of the station from start to graceful stop
pub struct StationRun {
    config: StationRunConfig,
}

impl StationRun {
    pub fn new(config: StationRunConfig) -> Self {
        Self { config }
    }

    /// Run until `shutdown` resolves or the configured duration elapses
    pub async fn run(
        self,
        factory: &dyn DeviceFactory,
        shutdown: impl Future<Output = ()>,
    ) -> Result<RunStats> {
        let start_time = Instant::now();
        let blueprint = &self.config.blueprint;

        if let Some(port) = self.config.metrics_port {
            observability::init_metrics_only(port)?;
        }

        if blueprint.sinks.is_empty() {
            warn!("No sinks configured - composed records will not be persisted");
        }

        let (manager, dispatcher) = build(blueprint, factory, self.config.buffer_size)
            .context("Failed to set up station")?;
        let dispatcher_handle = dispatcher.spawn();

        let mut stats = RunStats {
            active_sensors: manager.sensors().len(),
            open_sensors: manager
                .sensor_states()
                .values()
                .filter(|s| s.device_open)
                .count(),
            ..Default::default()
        };

        let mut cycles = manager.subscribe_cycles();
        manager.start();
        info!(
            station = %blueprint.station.name,
            sensors = stats.active_sensors,
            open = stats.open_sensors,
            sinks = blueprint.sinks.len(),
            duration_secs = ?self.config.duration.map(|d| d.as_secs()),
            "Station running"
        );

        let deadline = async {
            match self.config.duration {
                Some(duration) => tokio::time::sleep(duration).await,
                None => std::future::pending().await,
            }
        };
        tokio::pin!(deadline);
        tokio::pin!(shutdown);

        let mut health_tick = tokio::time::interval(self.config.health_interval);
        health_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // the first tick fires immediately; sensors have not been read yet
        health_tick.tick().await;

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    warn!("Received shutdown signal, stopping station...");
                    break;
                }
                _ = &mut deadline => {
                    info!("Run duration elapsed, stopping station...");
                    break;
                }
                _ = health_tick.tick() => {
                    stats.final_health = Some(log_health(&manager));
                }
                received = cycles.recv() => match received {
                    Ok(report) => {
                        record_cycle_report(&report);
                        stats.poll.update(&report);
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(missed, "Cycle reports lagged behind");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            }
        }

        manager.stop().await;
        stats.final_health = Some(log_health(&manager));
        stats.counters = manager.counters();

        // the manager owns the record sender; dropping it lets the dispatcher drain
        drop(manager);
        match tokio::time::timeout(DISPATCHER_DRAIN_TIMEOUT, dispatcher_handle).await {
            Ok(Ok(totals)) => stats.sinks = totals,
            Ok(Err(e)) => warn!(error = %e, "Dispatcher task failed"),
            Err(_) => warn!(
                timeout_secs = DISPATCHER_DRAIN_TIMEOUT.as_secs(),
                "Dispatcher did not drain in time"
            ),
        }

        stats.duration = start_time.elapsed();
        info!(
            duration_secs = stats.duration.as_secs_f64(),
            cycles = stats.counters.cycles,
            records = stats.counters.records_sent,
            "Station shutdown complete"
        );

        Ok(stats)
    }
}

fn build(
    blueprint: &StationBlueprint,
    factory: &dyn DeviceFactory,
    buffer_size: usize,
) -> Result<(SensorManager, Dispatcher), CliError> {
    let (record_tx, record_rx) = mpsc::channel::<StationRecord>(buffer_size.max(1));
    let dispatcher = dispatcher::create_dispatcher(blueprint.sinks.clone(), record_rx)?;
    let manager = SensorManager::new(blueprint, factory, Some(record_tx))?;
    Ok((manager, dispatcher))
}

fn log_health(manager: &SensorManager) -> contracts::OverallHealth {
    let report = manager.get_health_status();
    record_health_report(&report);

    for (kind, health) in &report.sensors {
        debug!(
            sensor = %kind,
            status = %health.status,
            age_seconds = ?health.age_seconds,
            "sensor health"
        );
    }
    info!(
        overall = %report.overall,
        online = report.online_count,
        configured = report.configured_count,
        "Station health"
    );

    report.overall
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{OverallHealth, SensorConfig, SensorKind, SinkConfig, SinkType};
    use drivers::{RawSample, ScriptedFactory};
    use std::collections::HashMap;
    use tempfile::tempdir;

    fn config(blueprint: StationBlueprint, duration_secs: u64) -> StationRunConfig {
        StationRunConfig {
            blueprint,
            duration: Some(Duration::from_secs(duration_secs)),
            health_interval: Duration::from_secs(20),
            buffer_size: 16,
            metrics_port: None,
        }
    }

    fn climate_station(path: &str) -> StationBlueprint {
        let mut bp = StationBlueprint::default_station();
        bp.sensors = vec![SensorConfig::with_defaults(SensorKind::Dht22)];
        bp.sinks = vec![SinkConfig {
            name: "jsonl".to_string(),
            sink_type: SinkType::JsonLines,
            queue_capacity: 16,
            params: HashMap::from([("path".to_string(), path.to_string())]),
        }];
        bp
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_until_duration_persists_records() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("records.jsonl");
        let factory = ScriptedFactory::new();
        factory.script(SensorKind::Dht22).repeat(Ok(RawSample::Dht22 {
            temperature: 21.0,
            humidity: 40.0,
        }));

        let run = StationRun::new(config(climate_station(path.to_str().unwrap()), 65));
        let stats = run
            .run(&factory, std::future::pending::<()>())
            .await
            .unwrap();

        // cycles at t=0, 30 and 60
        assert_eq!(stats.counters.cycles, 3);
        assert_eq!(stats.counters.records_sent, 3);
        assert_eq!(stats.poll.total_cycles, 3);
        assert_eq!(stats.final_health, Some(OverallHealth::Healthy));
        assert_eq!(stats.sinks.len(), 1);
        assert_eq!(stats.sinks[0].1.stored, 3);

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_signal_stops_run() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("records.jsonl");
        let factory = ScriptedFactory::new();
        factory.script(SensorKind::Dht22).repeat(Ok(RawSample::Dht22 {
            temperature: 21.0,
            humidity: 40.0,
        }));

        let mut cfg = config(climate_station(path.to_str().unwrap()), 0);
        cfg.duration = None;
        let shutdown = tokio::time::sleep(Duration::from_secs(5));

        let stats = StationRun::new(cfg).run(&factory, shutdown).await.unwrap();
        assert_eq!(stats.counters.cycles, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unopened_sensor_reported() {
        let factory = ScriptedFactory::new();
        factory.fail_open(SensorKind::Dht22);
        let mut bp = StationBlueprint::default_station();
        bp.sensors = vec![SensorConfig::with_defaults(SensorKind::Dht22)];

        let stats = StationRun::new(config(bp, 1))
            .run(&factory, std::future::pending::<()>())
            .await
            .unwrap();

        assert_eq!(stats.active_sensors, 1);
        assert_eq!(stats.open_sensors, 0);
        assert_eq!(stats.counters.cycles, 0);
        assert_eq!(stats.final_health, Some(OverallHealth::Unhealthy));
    }

    #[tokio::test]
    async fn test_bad_sink_fails_setup() {
        let factory = ScriptedFactory::new();
        let mut bp = StationBlueprint::default_station();
        bp.sinks[0].sink_type = SinkType::JsonLines;

        let err = StationRun::new(config(bp, 1))
            .run(&factory, std::future::pending::<()>())
            .await
            .unwrap_err();
        assert!(format!("{err:#}").contains("path"));
    }
}
