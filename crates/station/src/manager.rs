//! Sensor manager
//!
//! Owns one [`SensorSlot`] per enabled sensor and runs one polling loop per
//! cadence group (sensors sharing a poll interval). Loops share the aggregate
//! [`Snapshot`] behind a short-held lock; hardware access is serialized per
//! bus inside the drivers and is never held while the snapshot is touched.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use chrono::Utc;
use contracts::{
    Compensation, ConditioningStatus, CycleReport, DiagnosticResult, FilterStats, HealthReport,
    SensorKind, SensorReading, SensorRuntimeState, SensorStatus, Snapshot, StationBlueprint,
    StationConfig, StationRecord,
};
use drivers::{BusRegistry, DeviceFactory};
use tokio::sync::{broadcast, mpsc, Notify};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, instrument, trace, warn};

use crate::error::{Result, StationError};
use crate::health::HealthEvaluator;
use crate::metrics::{record_cycle, record_health, CountersSnapshot, StationCounters};
use crate::slot::SensorSlot;

const CYCLE_REPORT_CAPACITY: usize = 64;

/// Sensors polled together at one interval
#[derive(Debug, Clone, PartialEq)]
pub struct CadenceGroup {
    /// Member kinds joined with `+`
    pub name: String,
    pub interval: Duration,
    pub members: Vec<SensorKind>,
    /// Whether cycles of this group hand composed records to persistence
    pub persists: bool,
}

/// Group sensors by poll interval, slowest group first
fn cadence_groups(slots: &[SensorSlot]) -> Vec<CadenceGroup> {
    let mut by_interval: BTreeMap<Duration, Vec<&SensorSlot>> = BTreeMap::new();
    for slot in slots {
        by_interval.entry(slot.poll_interval()).or_default().push(slot);
    }
    by_interval
        .into_iter()
        .rev()
        .map(|(interval, members)| CadenceGroup {
            name: members
                .iter()
                .map(|s| s.kind().as_str())
                .collect::<Vec<_>>()
                .join("+"),
            interval,
            persists: members.iter().any(|s| s.persists()),
            members: members.iter().map(|s| s.kind()).collect(),
        })
        .collect()
}

struct Shared {
    station: StationConfig,
    slots: Vec<SensorSlot>,
    groups: Vec<CadenceGroup>,
    health: HealthEvaluator,
    snapshot: RwLock<Snapshot>,
    records: Option<mpsc::Sender<StationRecord>>,
    cycles: broadcast::Sender<CycleReport>,
    counters: StationCounters,
    shutdown: Notify,
}

/// Loops spawned by one `start()`
struct Run {
    running: Arc<AtomicBool>,
    tasks: Vec<(String, JoinHandle<()>)>,
}

pub struct SensorManager {
    shared: Arc<Shared>,
    run: Mutex<Option<Run>>,
}

impl SensorManager {
    /// Open every enabled sensor of `blueprint`
    ///
    /// A sensor whose device fails to open is kept and reported offline.
    /// `records` receives composed rows from persisting groups; `None`
    /// disables persistence.
    ///
    /// # Errors
    /// Invalid per-sensor settings (e.g. a conditioning duration above the
    /// vendor maximum).
    pub fn new(
        blueprint: &StationBlueprint,
        factory: &dyn DeviceFactory,
        records: Option<mpsc::Sender<StationRecord>>,
    ) -> Result<Self> {
        let mut buses = BusRegistry::new();
        let slots = blueprint
            .enabled_sensors()
            .map(|config| SensorSlot::open(config, factory, &mut buses))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        for slot in &slots {
            if let Some(compensation) = slot.compensation() {
                if blueprint.sensor(compensation.source).is_none() {
                    warn!(
                        sensor = %slot.kind(),
                        source = %compensation.source,
                        "compensation source not configured, using defaults"
                    );
                }
            }
        }

        let groups = cadence_groups(&slots);
        for group in &groups {
            debug!(
                group = %group.name,
                interval_ms = group.interval.as_millis() as u64,
                persists = group.persists,
                "cadence group"
            );
        }

        info!(
            station = %blueprint.station.name,
            sensors = slots.len(),
            groups = groups.len(),
            buses = buses.len(),
            "sensor manager initialised"
        );

        let (cycles, _) = broadcast::channel(CYCLE_REPORT_CAPACITY);
        Ok(Self {
            shared: Arc::new(Shared {
                station: blueprint.station.clone(),
                health: HealthEvaluator::new(slots.iter().map(|s| (s.kind(), s.poll_interval()))),
                slots,
                groups,
                snapshot: RwLock::new(Snapshot::default()),
                records,
                cycles,
                counters: StationCounters::new(),
                shutdown: Notify::new(),
            }),
            run: Mutex::new(None),
        })
    }

    /// Spawn one polling loop per cadence group
    ///
    /// Returns `false` if the loops were already running.
    pub fn start(&self) -> bool {
        let mut run = self.run.lock().unwrap_or_else(PoisonError::into_inner);
        if run.is_some() {
            debug!("sensor manager already running");
            return false;
        }

        let running = Arc::new(AtomicBool::new(true));
        let mut tasks = Vec::new();
        for group in &self.shared.groups {
            let pollable = group
                .members
                .iter()
                .filter_map(|kind| self.shared.slot(*kind))
                .any(SensorSlot::is_pollable);
            if !pollable {
                warn!(group = %group.name, "no sensor of this group is available, loop not started");
                continue;
            }
            let handle = tokio::spawn(run_group(
                Arc::clone(&self.shared),
                group.clone(),
                Arc::clone(&running),
            ));
            tasks.push((group.name.clone(), handle));
        }

        info!(loops = tasks.len(), "sensor manager started");
        *run = Some(Run { running, tasks });
        true
    }

    /// Clear the running flag and join every loop
    ///
    /// A loop in the middle of a read finishes that read first. Loops that
    /// do not finish within the stop timeout are detached.
    pub async fn stop(&self) {
        let run = self
            .run
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(run) = run else {
            debug!("sensor manager not running");
            return;
        };

        run.running.store(false, Ordering::SeqCst);
        self.shared.shutdown.notify_waiters();

        let timeout = self.shared.station.stop_timeout();
        for (group, handle) in run.tasks {
            match tokio::time::timeout(timeout, handle).await {
                Ok(Ok(())) => debug!(group = %group, "polling loop joined"),
                Ok(Err(err)) => error!(group = %group, error = %err, "polling loop panicked"),
                Err(_) => warn!(
                    group = %group,
                    timeout_ms = timeout.as_millis() as u64,
                    "polling loop did not stop in time, detaching"
                ),
            }
        }
        info!("sensor manager stopped");
    }

    pub fn is_running(&self) -> bool {
        self.run
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Run one cycle of every cadence group now, slowest group first
    pub async fn poll_once(&self) -> Vec<CycleReport> {
        let mut reports = Vec::with_capacity(self.shared.groups.len());
        for group in &self.shared.groups {
            reports.push(self.shared.poll_cycle(group).await);
        }
        reports
    }

    pub fn groups(&self) -> &[CadenceGroup] {
        &self.shared.groups
    }

    /// Configured sensors in declaration order
    pub fn sensors(&self) -> Vec<SensorKind> {
        self.shared.slots.iter().map(SensorSlot::kind).collect()
    }

    /// Copy of the aggregate snapshot
    pub fn get_latest_data(&self) -> Snapshot {
        self.shared.read_snapshot().clone()
    }

    pub fn get_sensor_status(&self) -> BTreeMap<SensorKind, SensorStatus> {
        self.shared
            .slots
            .iter()
            .map(|s| (s.kind(), s.state().status))
            .collect()
    }

    /// Copy of every sensor's runtime state
    pub fn sensor_states(&self) -> BTreeMap<SensorKind, SensorRuntimeState> {
        self.shared.states()
    }

    /// Health derived now from the snapshot and runtime states
    pub fn get_health_status(&self) -> HealthReport {
        let snapshot = self.get_latest_data();
        let report = self
            .shared
            .health
            .evaluate(&snapshot, &self.shared.states(), Utc::now());
        record_health(report.overall);
        report
    }

    /// One-shot diagnostic read of every configured sensor
    ///
    /// Conditionable sensors are conditioned first if needed. Each sensor's
    /// driver is exclusive, so a test waits for an in-flight poll of that
    /// sensor to finish, including its conditioning wait and retry delays.
    #[instrument(name = "station_test_sensors", skip(self))]
    pub async fn test_sensors(&self) -> BTreeMap<SensorKind, DiagnosticResult> {
        info!("testing sensors");
        let mut results = BTreeMap::new();
        for slot in &self.shared.slots {
            let compensation = self.shared.compensation_for(slot);
            let result = slot.diagnose(compensation).await;
            info!(sensor = %slot.kind(), status = result.status.as_str(), details = %result.details, "sensor test");
            results.insert(slot.kind(), result);
        }
        results
    }

    /// Unfiltered one-shot read outside the polling loops
    ///
    /// Waits for an in-flight poll of the same sensor, as [`Self::test_sensors`] does.
    ///
    /// # Errors
    /// `NotConditioned` for a conditionable sensor that has not completed
    /// conditioning; nothing is sampled in that case.
    pub async fn read_sensor(&self, kind: SensorKind) -> Result<SensorReading> {
        let slot = self.shared.require(kind)?;
        let state = slot.state();
        if !state.device_open {
            return Err(StationError::Unavailable {
                sensor: kind,
                message: state.last_error.unwrap_or_default(),
            });
        }
        let compensation = self.shared.compensation_for(slot);
        Ok(slot.read_once(compensation).await?.reading)
    }

    pub fn filter_stats(&self, kind: SensorKind) -> Result<FilterStats> {
        self.shared
            .require(kind)?
            .filter_stats()
            .ok_or_else(|| StationError::capability_missing(kind, "filter"))
    }

    pub fn reset_filter(&self, kind: SensorKind) -> Result<()> {
        if self.shared.require(kind)?.reset_filter() {
            info!(sensor = %kind, "filter reset");
            Ok(())
        } else {
            Err(StationError::capability_missing(kind, "filter"))
        }
    }

    pub fn conditioning_status(&self, kind: SensorKind) -> Result<ConditioningStatus> {
        self.shared
            .require(kind)?
            .conditioning()
            .map(|c| c.status())
            .ok_or_else(|| StationError::capability_missing(kind, "conditioning"))
    }

    /// Receive a report after every polling cycle
    pub fn subscribe_cycles(&self) -> broadcast::Receiver<CycleReport> {
        self.shared.cycles.subscribe()
    }

    pub fn counters(&self) -> CountersSnapshot {
        self.shared.counters.snapshot()
    }
}

impl std::fmt::Debug for SensorManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SensorManager")
            .field("station", &self.shared.station.name)
            .field("slots", &self.shared.slots)
            .field("groups", &self.shared.groups)
            .field("running", &self.is_running())
            .finish()
    }
}

impl Shared {
    fn slot(&self, kind: SensorKind) -> Option<&SensorSlot> {
        self.slots.iter().find(|s| s.kind() == kind)
    }

    fn require(&self, kind: SensorKind) -> Result<&SensorSlot> {
        self.slot(kind).ok_or(StationError::NotConfigured(kind))
    }

    fn read_snapshot(&self) -> std::sync::RwLockReadGuard<'_, Snapshot> {
        self.snapshot.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn states(&self) -> BTreeMap<SensorKind, SensorRuntimeState> {
        self.slots.iter().map(|s| (s.kind(), s.state())).collect()
    }

    /// Climate values for a compensable sensor, copied out under the snapshot lock
    fn compensation_for(&self, slot: &SensorSlot) -> Compensation {
        let Some(config) = slot.compensation() else {
            return Compensation::default();
        };
        let climate = self.read_snapshot().climate_from(config.source);
        match climate {
            Some((temperature, humidity)) => Compensation {
                temperature,
                humidity,
                from_sensor: true,
            },
            None => Compensation::fallback(config.default_temperature, config.default_humidity),
        }
    }

    /// Merge `readings` and return the new snapshot
    fn merge(&self, readings: &[SensorReading]) -> Snapshot {
        let mut snapshot = self.snapshot.write().unwrap_or_else(PoisonError::into_inner);
        let next = snapshot.merged(readings, Utc::now());
        *snapshot = next.clone();
        next
    }

    async fn poll_cycle(&self, group: &CadenceGroup) -> CycleReport {
        let started = Instant::now();
        let mut readings = Vec::with_capacity(group.members.len());
        let (mut reads_ok, mut reads_failed) = (0, 0);

        for slot in group.members.iter().filter_map(|kind| self.slot(*kind)) {
            if !slot.is_pollable() {
                continue;
            }
            let compensation = self.compensation_for(slot);
            match slot.poll(compensation).await {
                Some(reading) => {
                    reads_ok += 1;
                    self.counters.inc_reads_ok();
                    readings.push(reading);
                }
                None => {
                    reads_failed += 1;
                    self.counters.inc_reads_failed();
                    readings.push(SensorReading::empty(slot.kind()));
                }
            }
        }

        let snapshot = self.merge(&readings);
        let persisted = group.persists
            && readings.iter().any(SensorReading::has_any_value)
            && self.persist(&snapshot);

        self.counters.inc_cycles();
        let duration_ms = started.elapsed().as_secs_f64() * 1000.0;
        record_cycle(&group.name, duration_ms);

        let report = CycleReport {
            group: group.name.clone(),
            duration_ms,
            reads_ok,
            reads_failed,
            persisted,
        };
        trace!(group = %group.name, reads_ok, reads_failed, persisted, "poll cycle complete");
        // no subscribers is fine
        let _ = self.cycles.send(report.clone());
        report
    }

    /// Hand a composed record to persistence without waiting
    fn persist(&self, snapshot: &Snapshot) -> bool {
        let Some(records) = &self.records else {
            return false;
        };
        let Some(record) = StationRecord::from_snapshot(snapshot) else {
            return false;
        };

        match records.try_send(record) {
            Ok(()) => {
                let stored = self.counters.inc_records_sent();
                if stored % self.station.progress_log_every.max(1) == 0 {
                    info!(records = stored, "sensor records persisted");
                }
                true
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                self.counters.inc_records_dropped();
                warn!("persistence queue full, record dropped");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.counters.inc_records_dropped();
                warn!("persistence channel closed, record dropped");
                false
            }
        }
    }
}

async fn run_group(shared: Arc<Shared>, group: CadenceGroup, running: Arc<AtomicBool>) {
    info!(
        group = %group.name,
        interval_ms = group.interval.as_millis() as u64,
        "polling loop started"
    );

    loop {
        // registered before the flag check so a stop cannot slip in between
        let shutdown = shared.shutdown.notified();
        tokio::pin!(shutdown);
        shutdown.as_mut().enable();

        if !running.load(Ordering::SeqCst) {
            break;
        }

        shared.poll_cycle(&group).await;

        tokio::select! {
            _ = tokio::time::sleep(group.interval) => {}
            _ = &mut shutdown => break,
        }
    }

    info!(group = %group.name, "polling loop stopped");
}
