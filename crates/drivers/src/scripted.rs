//! Scripted devices for tests.
//!
//! A [`ScriptedDevice`] replays queued outcomes, then repeats a fallback
//! outcome forever. Clones share the script, so a test keeps one clone to
//! steer the device and inspect call counts after handing the other to a
//! driver.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use contracts::{AlgorithmTuning, Compensation, FilterChannel, SensorConfig, SensorKind};

use crate::device::{DeviceFactory, RawDevice, RawSample};
use crate::error::HardwareError;
use crate::gas_index::{AdaptiveGasIndex, GasIndexAlgorithm};

type Outcome = Result<RawSample, HardwareError>;

#[derive(Debug)]
struct Script {
    queue: VecDeque<Outcome>,
    fallback: Outcome,
    sample_calls: u32,
    reinit_calls: u32,
    condition_calls: u32,
    fail_reinit: bool,
    fail_condition: bool,
    compensation: Option<Compensation>,
}

#[derive(Debug, Clone)]
pub struct ScriptedDevice {
    kind: SensorKind,
    script: Arc<Mutex<Script>>,
}

impl ScriptedDevice {
    /// Device answering `NotReady` until outcomes are queued
    pub fn new(kind: SensorKind) -> Self {
        Self {
            kind,
            script: Arc::new(Mutex::new(Script {
                queue: VecDeque::new(),
                fallback: Err(HardwareError::NotReady),
                sample_calls: 0,
                reinit_calls: 0,
                condition_calls: 0,
                fail_reinit: false,
                fail_condition: false,
                compensation: None,
            })),
        }
    }

    fn with_script<R>(&self, f: impl FnOnce(&mut Script) -> R) -> R {
        let mut script = self.script.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut script)
    }

    /// Queue one outcome
    pub fn push(&self, outcome: Outcome) {
        self.with_script(|s| s.queue.push_back(outcome));
    }

    /// Outcome returned once the queue is drained
    pub fn repeat(&self, outcome: Outcome) {
        self.with_script(|s| s.fallback = outcome);
    }

    pub fn fail_reinit(&self, fail: bool) {
        self.with_script(|s| s.fail_reinit = fail);
    }

    pub fn fail_condition(&self, fail: bool) {
        self.with_script(|s| s.fail_condition = fail);
    }

    pub fn sample_calls(&self) -> u32 {
        self.with_script(|s| s.sample_calls)
    }

    pub fn reinit_calls(&self) -> u32 {
        self.with_script(|s| s.reinit_calls)
    }

    pub fn condition_calls(&self) -> u32 {
        self.with_script(|s| s.condition_calls)
    }

    /// Compensation passed with the most recent sample or conditioning call
    pub fn last_compensation(&self) -> Option<Compensation> {
        self.with_script(|s| s.compensation)
    }
}

#[async_trait]
impl RawDevice for ScriptedDevice {
    fn kind(&self) -> SensorKind {
        self.kind
    }

    async fn sample(&mut self, compensation: Compensation) -> Result<RawSample, HardwareError> {
        self.with_script(|s| {
            s.sample_calls += 1;
            s.compensation = Some(compensation);
            s.queue.pop_front().unwrap_or_else(|| s.fallback.clone())
        })
    }

    async fn reinitialize(&mut self) -> Result<(), HardwareError> {
        self.with_script(|s| {
            s.reinit_calls += 1;
            if s.fail_reinit {
                Err(HardwareError::NotFound("reinitialisation refused".into()))
            } else {
                Ok(())
            }
        })
    }

    async fn condition(&mut self, compensation: Compensation) -> Result<(), HardwareError> {
        self.with_script(|s| {
            s.condition_calls += 1;
            s.compensation = Some(compensation);
            if s.fail_condition {
                Err(HardwareError::Io("conditioning command not acknowledged".into()))
            } else {
                Ok(())
            }
        })
    }
}

/// Factory handing out [`ScriptedDevice`]s, one script per kind
#[derive(Debug, Default)]
pub struct ScriptedFactory {
    scripts: Mutex<HashMap<SensorKind, ScriptedDevice>>,
    missing: Mutex<HashSet<SensorKind>>,
    learning_samples: u32,
}

impl ScriptedFactory {
    /// Gas index algorithms report indices from the first sample
    pub fn new() -> Self {
        Self::default()
    }

    /// Gas index algorithms learn for `samples` samples first
    pub fn with_learning_samples(samples: u32) -> Self {
        Self {
            learning_samples: samples,
            ..Self::default()
        }
    }

    /// Script of `kind`, created on first use
    pub fn script(&self, kind: SensorKind) -> ScriptedDevice {
        self.scripts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(kind)
            .or_insert_with(|| ScriptedDevice::new(kind))
            .clone()
    }

    /// Make opening `kind` fail as if the sensor were not wired
    pub fn fail_open(&self, kind: SensorKind) {
        self.missing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(kind);
    }
}

impl DeviceFactory for ScriptedFactory {
    fn open(&self, config: &SensorConfig) -> Result<Box<dyn RawDevice>, HardwareError> {
        let missing = self
            .missing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&config.kind);
        if missing {
            return Err(HardwareError::NotFound(format!(
                "no {} on {}",
                config.kind,
                config.bus_name()
            )));
        }
        Ok(Box::new(self.script(config.kind)))
    }

    fn gas_index(
        &self,
        channel: FilterChannel,
        tuning: &AlgorithmTuning,
    ) -> Box<dyn GasIndexAlgorithm> {
        Box::new(AdaptiveGasIndex::with_learning_samples(
            channel,
            *tuning,
            self.learning_samples,
        ))
    }
}
