//! # Integration Tests
//!
//! End-to-end scenarios across crates.
//!
//! Covers:
//! - configuration text to running station
//! - station to dispatcher to sinks
//! - cross-sensor compensation, filtering and health under scripted hardware

#[cfg(test)]
mod contract_tests {
    use contracts::{SensorKind, StationBlueprint};

    #[test]
    fn test_default_station_round_trips_through_loader() {
        let bp = StationBlueprint::default_station();
        let toml = config_loader::ConfigLoader::to_toml(&bp).unwrap();
        let parsed =
            config_loader::ConfigLoader::load_from_str(&toml, config_loader::ConfigFormat::Toml)
                .unwrap();
        assert_eq!(parsed.sensors.len(), SensorKind::ALL.len());
        assert_eq!(parsed.sinks.len(), 1);
    }
}

#[cfg(test)]
mod e2e_tests {
    use std::time::Duration;

    use config_loader::{ConfigFormat, ConfigLoader};
    use contracts::{
        DiagnosticOutcome, OverallHealth, SensorKind, SensorStatus, StationBlueprint,
        StationRecord,
    };
    use dispatcher::{create_dispatcher, Dispatcher, MemorySink, SinkHandle};
    use dispatcher::MetricsSnapshot;
    use drivers::{RawSample, ScriptedFactory, SimulatedDeviceFactory, SimulationConfig};
    use observability::PollStatsAggregator;
    use station::SensorManager;
    use tokio::sync::mpsc;
    use tokio::task::JoinHandle;
    use tokio::time::sleep;

    const STATION_TOML: &str = r#"
[station]
name = "e2e"

[[sensors]]
kind = "scd40"
warmup_ms = 0

[[sensors]]
kind = "dht22"

[[sensors]]
kind = "sgp41"
"#;

    fn blueprint(extra: &str) -> StationBlueprint {
        ConfigLoader::load_from_str(&format!("{STATION_TOML}{extra}"), ConfigFormat::Toml).unwrap()
    }

    fn scripted_station() -> ScriptedFactory {
        let factory = ScriptedFactory::new();
        factory.script(SensorKind::Scd40).repeat(Ok(RawSample::Scd40 {
            co2: 800,
            temperature: 23.0,
            humidity: 44.0,
        }));
        factory.script(SensorKind::Dht22).repeat(Ok(RawSample::Dht22 {
            temperature: 21.0,
            humidity: 40.0,
        }));
        factory.script(SensorKind::Sgp41).repeat(Ok(RawSample::Sgp41 {
            sraw_voc: 30_000,
            sraw_nox: 15_000,
        }));
        factory
    }

    /// Stop the manager and drain the dispatcher
    async fn shutdown(manager: SensorManager, dispatcher: JoinHandle<Vec<(String, MetricsSnapshot)>>) {
        manager.stop().await;
        drop(manager);
        dispatcher.await.unwrap();
    }

    /// Configuration text -> SensorManager -> Dispatcher -> MemorySink
    #[tokio::test(start_paused = true)]
    async fn test_e2e_scripted_station() {
        let bp = blueprint("");
        let factory = scripted_station();

        let (tx, rx) = mpsc::channel::<StationRecord>(16);
        let sink = MemorySink::new("memory");
        let records = sink.records();
        let dispatcher = Dispatcher::with_handles(vec![SinkHandle::spawn(sink, 16)], rx).spawn();

        let manager = SensorManager::new(&bp, &factory, Some(tx)).unwrap();
        let mut cycles = manager.subscribe_cycles();
        assert!(manager.start());

        sleep(Duration::from_secs(61)).await;

        let mut stats = PollStatsAggregator::new();
        while let Ok(report) = cycles.try_recv() {
            stats.update(&report);
        }

        let health = manager.get_health_status();
        assert_eq!(health.overall, OverallHealth::Healthy);
        assert_eq!(health.online_count, 3);

        // gas sensor compensated with the climate sensor's values
        let compensation = factory.script(SensorKind::Sgp41).last_compensation().unwrap();
        assert!(compensation.from_sensor);
        assert_eq!(compensation.temperature, 21.0);
        assert_eq!(compensation.humidity, 40.0);

        shutdown(manager, dispatcher).await;

        // slow group persists at t=0, 30 and 60; the gas group never persists
        let stored = records.snapshot();
        assert_eq!(stored.len(), 3);
        assert!(stored.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
        assert_eq!(stored[0].scd40.co2, Some(800));
        assert_eq!(stored[0].dht22.temperature, Some(21.0));
        // still conditioning at t=0
        assert_eq!(stored[0].sgp41.voc_index, None);
        assert!(stored[2].sgp41.voc_index.is_some());
        assert!(stored[2].sgp41.sraw_voc.is_some());

        let summary = stats.summary();
        assert_eq!(summary.records_persisted, 3);
        assert_eq!(summary.groups.len(), 2);
    }

    /// A temperature spike never reaches the persisted file
    #[tokio::test(start_paused = true)]
    async fn test_e2e_spike_filtered_before_persistence() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.jsonl");
        let bp = blueprint(&format!(
            "\n[[sinks]]\nname = \"jsonl\"\nsink_type = \"json_lines\"\nparams = {{ path = {:?} }}\n",
            path.to_str().unwrap()
        ));

        let factory = scripted_station();
        let dht = factory.script(SensorKind::Dht22);
        for t in [20.0, 21.0, 19.0, 20.0, 30.0] {
            dht.push(Ok(RawSample::Dht22 {
                temperature: t,
                humidity: 40.0,
            }));
        }
        dht.repeat(Ok(RawSample::Dht22 {
            temperature: 20.0,
            humidity: 40.0,
        }));

        let (tx, rx) = mpsc::channel(16);
        let dispatcher = create_dispatcher(bp.sinks.clone(), rx).unwrap().spawn();
        let manager = SensorManager::new(&bp, &factory, Some(tx)).unwrap();
        manager.start();

        // samples at t=0, 30, 60, 90, 120
        sleep(Duration::from_secs(121)).await;
        let stats = manager.filter_stats(SensorKind::Dht22).unwrap();
        shutdown(manager, dispatcher).await;

        let content = std::fs::read_to_string(&path).unwrap();
        let temperatures: Vec<Option<f64>> = content
            .lines()
            .map(|line| serde_json::from_str::<StationRecord>(line).unwrap().dht22.temperature)
            .collect();

        assert_eq!(temperatures.len(), 5);
        assert!(temperatures.iter().all(|t| *t != Some(30.0)));
        assert_eq!(temperatures[4], Some(20.0));

        let temperature = stats
            .channels
            .iter()
            .find(|c| c.channel == contracts::FilterChannel::Temperature)
            .unwrap();
        assert_eq!(temperature.rejected, 1);
    }

    /// One missing sensor degrades the station without stopping persistence
    #[tokio::test(start_paused = true)]
    async fn test_e2e_missing_sensor_degrades() {
        let bp = blueprint("");
        let factory = scripted_station();
        factory.fail_open(SensorKind::Scd40);

        let (tx, rx) = mpsc::channel(16);
        let sink = MemorySink::new("memory");
        let records = sink.records();
        let dispatcher = Dispatcher::with_handles(vec![SinkHandle::spawn(sink, 16)], rx).spawn();

        let manager = SensorManager::new(&bp, &factory, Some(tx)).unwrap();
        manager.start();
        sleep(Duration::from_secs(12)).await;

        let status = manager.get_sensor_status();
        assert_eq!(status[&SensorKind::Scd40], SensorStatus::Offline);
        assert_eq!(status[&SensorKind::Dht22], SensorStatus::Online);

        let health = manager.get_health_status();
        assert_eq!(health.overall, OverallHealth::Degraded);
        assert_eq!(health.sensors[&SensorKind::Scd40].status, SensorStatus::Offline);

        let diagnostics = manager.test_sensors().await;
        assert_eq!(diagnostics[&SensorKind::Scd40].status, DiagnosticOutcome::Offline);
        assert_eq!(diagnostics[&SensorKind::Dht22].status, DiagnosticOutcome::Passed);

        shutdown(manager, dispatcher).await;

        let stored = records.snapshot();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].scd40.co2, None);
        assert_eq!(stored[0].dht22.humidity, Some(40.0));
    }

    /// Simulated hardware produces a complete snapshot
    #[tokio::test(start_paused = true)]
    async fn test_simulated_station_fills_snapshot() {
        let factory = SimulatedDeviceFactory::new(SimulationConfig {
            glitch_rate: 0.0,
            seed: Some(42),
        });
        let manager =
            SensorManager::new(&StationBlueprint::default_station(), &factory, None).unwrap();
        manager.start();

        // scd40 warm-up, then one slow cycle after the gas sensor conditioned
        sleep(Duration::from_secs(45)).await;
        let snapshot = manager.get_latest_data();
        manager.stop().await;

        assert!(snapshot.scd40.co2.is_some());
        assert!(snapshot.dht22.temperature.is_some());
        assert!(snapshot.sgp41.sraw_voc.is_some());
        assert!(snapshot.timestamp.is_some());
    }
}
