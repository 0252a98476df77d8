//! One configured sensor: driver, filter and runtime state.

use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use contracts::{
    Compensation, CompensationConfig, DiagnosticOutcome, DiagnosticResult, Dht22Fields,
    FilterChannel, FilterStats, SensorConfig, SensorKind, SensorReading, SensorRuntimeState,
    SensorStatus, Sgp41Fields,
};
use data_filter::DataFilter;
use drivers::{
    BusRegistry, ConditioningHandle, DeviceFactory, DriverError, DriverReading, HardwareError,
    SensorDriver,
};
use tracing::{debug, error, info, instrument, warn};

use crate::metrics::{record_filter_rejection, record_read, record_sensor_status};

pub(crate) struct SensorSlot {
    kind: SensorKind,
    poll_interval: std::time::Duration,
    max_reinit_attempts: u32,
    persists: bool,
    compensation: Option<CompensationConfig>,
    driver: tokio::sync::Mutex<SensorDriver>,
    conditioning: Option<ConditioningHandle>,
    filter: Option<Mutex<DataFilter>>,
    state: Mutex<SensorRuntimeState>,
}

impl SensorSlot {
    pub fn open(
        config: &SensorConfig,
        factory: &dyn DeviceFactory,
        buses: &mut BusRegistry,
    ) -> drivers::Result<Self> {
        let kind = config.kind;
        let driver = SensorDriver::open(config, factory, buses)?;
        let state = match driver.open_error() {
            None => SensorRuntimeState::online(),
            Some(err) => SensorRuntimeState::unavailable(err.to_string()),
        };
        record_sensor_status(kind, state.status);

        Ok(Self {
            kind,
            poll_interval: config.poll_interval(),
            max_reinit_attempts: config.max_reinit_attempts.max(1),
            persists: config.persists(),
            compensation: config.compensation_or_default(),
            conditioning: driver.conditioning(),
            filter: config
                .filter_or_default()
                .map(|f| Mutex::new(DataFilter::new(kind, &f))),
            driver: tokio::sync::Mutex::new(driver),
            state: Mutex::new(state),
        })
    }

    pub fn kind(&self) -> SensorKind {
        self.kind
    }

    pub fn poll_interval(&self) -> std::time::Duration {
        self.poll_interval
    }

    pub fn persists(&self) -> bool {
        self.persists
    }

    pub fn compensation(&self) -> Option<&CompensationConfig> {
        self.compensation.as_ref()
    }

    pub fn conditioning(&self) -> Option<&ConditioningHandle> {
        self.conditioning.as_ref()
    }

    fn lock_state(&self) -> MutexGuard<'_, SensorRuntimeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_filter(&self) -> Option<MutexGuard<'_, DataFilter>> {
        self.filter
            .as_ref()
            .map(|f| f.lock().unwrap_or_else(PoisonError::into_inner))
    }

    pub fn state(&self) -> SensorRuntimeState {
        self.lock_state().clone()
    }

    /// Devices that never opened are reported, not polled
    pub fn is_pollable(&self) -> bool {
        self.lock_state().device_open
    }

    fn set_status(&self, state: &mut SensorRuntimeState, status: SensorStatus) {
        if state.status != status {
            info!(sensor = %self.kind, from = %state.status, to = %status, "sensor status changed");
            state.status = status;
            record_sensor_status(self.kind, status);
        }
    }

    /// One polling read: condition if needed, read, filter
    ///
    /// Returns `None` when no trustworthy reading was produced this cycle.
    /// The driver stays locked for the whole poll, conditioning wait and
    /// retry delays included; only the bus lock is released between steps.
    #[instrument(name = "sensor_poll", skip(self, compensation), fields(sensor = %self.kind))]
    pub async fn poll(&self, compensation: Compensation) -> Option<SensorReading> {
        let mut driver = self.driver.lock().await;

        if driver.needs_conditioning() {
            if let Err(err) = driver.condition(compensation).await {
                error!(sensor = %self.kind, error = %err, "conditioning failed");
                let mut state = self.lock_state();
                state.last_error = Some(err.to_string());
                self.set_status(&mut state, SensorStatus::Degraded);
                record_read(self.kind, "not_conditioned");
                return None;
            }
        }

        match driver.read(compensation).await {
            Ok(reading) => {
                drop(driver);
                self.on_success();
                record_read(self.kind, "ok");
                Some(self.filter_reading(reading))
            }
            Err(err) => {
                let absent = err.is_absent();
                record_read(self.kind, if absent { "absent" } else { "failed" });
                self.on_failure(&err, absent);
                if absent {
                    self.reinitialize(&mut driver).await;
                }
                None
            }
        }
    }

    fn on_success(&self) {
        let mut state = self.lock_state();
        state.last_success = Some(Utc::now());
        state.last_error = None;
        state.consecutive_failures = 0;
        state.reinit_failures = 0;
        self.set_status(&mut state, SensorStatus::Online);
    }

    fn on_failure(&self, err: &DriverError, absent: bool) {
        let mut state = self.lock_state();
        state.consecutive_failures += 1;
        state.last_error = Some(err.to_string());
        if absent && state.status == SensorStatus::Online {
            self.set_status(&mut state, SensorStatus::Degraded);
        }
        debug!(
            sensor = %self.kind,
            consecutive_failures = state.consecutive_failures,
            "read failed"
        );
    }

    async fn reinitialize(&self, driver: &mut SensorDriver) {
        match driver.reinitialize().await {
            Ok(()) => {
                info!(sensor = %self.kind, "device re-initialised");
                self.lock_state().reinit_failures = 0;
            }
            Err(err) => {
                let mut state = self.lock_state();
                state.reinit_failures += 1;
                if state.reinit_failures >= self.max_reinit_attempts {
                    if state.status != SensorStatus::Offline {
                        error!(
                            sensor = %self.kind,
                            attempts = state.reinit_failures,
                            error = %err,
                            "re-initialisation keeps failing, marking sensor offline"
                        );
                    }
                    self.set_status(&mut state, SensorStatus::Offline);
                } else {
                    warn!(
                        sensor = %self.kind,
                        attempt = state.reinit_failures,
                        max = self.max_reinit_attempts,
                        error = %err,
                        "re-initialisation failed"
                    );
                }
            }
        }
    }

    /// Route numeric channels through this sensor's filter
    ///
    /// Index channels still learning pass through unfiltered.
    fn filter_reading(&self, reading: DriverReading) -> SensorReading {
        let Some(mut filter) = self.lock_filter() else {
            return reading.reading;
        };

        match reading.reading {
            SensorReading::Dht22(fields) => SensorReading::Dht22(Dht22Fields {
                temperature: fields
                    .temperature
                    .and_then(|v| self.filter_value(&mut filter, FilterChannel::Temperature, v)),
                humidity: fields
                    .humidity
                    .and_then(|v| self.filter_value(&mut filter, FilterChannel::Humidity, v)),
            }),
            SensorReading::Sgp41(fields) => SensorReading::Sgp41(Sgp41Fields {
                voc_index: fields.voc_index.and_then(|v| {
                    self.filter_index(&mut filter, FilterChannel::VocIndex, v, &reading.learning)
                }),
                nox_index: fields.nox_index.and_then(|v| {
                    self.filter_index(&mut filter, FilterChannel::NoxIndex, v, &reading.learning)
                }),
                ..fields
            }),
            other => other,
        }
    }

    fn filter_value(&self, filter: &mut DataFilter, channel: FilterChannel, value: f64) -> Option<f64> {
        let outcome = filter.evaluate(channel, value);
        if let Some(rejection) = outcome.rejection {
            debug!(
                sensor = %self.kind,
                channel = %channel,
                value,
                reason = rejection.as_str(),
                substitute = ?outcome.value,
                "value rejected"
            );
            record_filter_rejection(self.kind, channel);
        }
        outcome.value
    }

    fn filter_index(
        &self,
        filter: &mut DataFilter,
        channel: FilterChannel,
        value: i32,
        learning: &[FilterChannel],
    ) -> Option<i32> {
        if learning.contains(&channel) {
            return Some(value);
        }
        self.filter_value(filter, channel, f64::from(value))
            .map(|v| v.round() as i32)
    }

    pub fn filter_stats(&self) -> Option<FilterStats> {
        self.lock_filter().map(|f| f.stats())
    }

    /// Returns false if this sensor has no filter
    pub fn reset_filter(&self) -> bool {
        match self.lock_filter() {
            Some(mut filter) => {
                filter.reset();
                true
            }
            None => false,
        }
    }

    /// Unfiltered one-shot read; does not touch the snapshot or runtime state
    pub async fn read_once(&self, compensation: Compensation) -> drivers::Result<DriverReading> {
        self.driver.lock().await.read(compensation).await
    }

    /// One-shot diagnostic read
    #[instrument(name = "sensor_diagnose", skip(self, compensation), fields(sensor = %self.kind))]
    pub async fn diagnose(&self, compensation: Compensation) -> DiagnosticResult {
        let state = self.state();
        if !state.device_open {
            let details = state
                .last_error
                .unwrap_or_else(|| "device unavailable".to_string());
            return DiagnosticResult::new(DiagnosticOutcome::Offline, details);
        }

        let mut driver = self.driver.lock().await;
        if let Err(err) = driver.condition(compensation).await {
            return DiagnosticResult::new(DiagnosticOutcome::Failed, err.to_string());
        }

        let reading = match driver.read(compensation).await {
            Ok(reading) => reading.reading,
            Err(err) => {
                return DiagnosticResult::new(diagnostic_outcome(&err), err.to_string());
            }
        };

        let passed = match &reading {
            SensorReading::Scd40(f) => f.co2.is_some(),
            SensorReading::Dht22(f) => f.temperature.is_some() && f.humidity.is_some(),
            SensorReading::Sgp41(f) => {
                f.sraw_voc.is_some()
                    && f.sraw_nox.is_some()
                    && f.voc_index.is_some()
                    && f.nox_index.is_some()
            }
        };
        let result = if passed {
            DiagnosticResult::new(DiagnosticOutcome::Passed, "reading valid")
        } else {
            DiagnosticResult::new(DiagnosticOutcome::Failed, "invalid reading")
        };
        result.with_reading(reading)
    }
}

/// A sensor that answered with implausible data failed; anything else is an error
fn diagnostic_outcome(err: &DriverError) -> DiagnosticOutcome {
    match err {
        DriverError::RetriesExhausted {
            last: HardwareError::InvalidData { .. } | HardwareError::Sentinel(_),
            ..
        } => DiagnosticOutcome::Failed,
        _ => DiagnosticOutcome::Error,
    }
}

impl std::fmt::Debug for SensorSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SensorSlot")
            .field("kind", &self.kind)
            .field("poll_interval", &self.poll_interval)
            .field("state", &self.state())
            .finish()
    }
}
