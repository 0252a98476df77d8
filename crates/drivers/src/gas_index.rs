//! Gas index boundary.
//!
//! The vendor algorithm turning raw ticks into a 0..=500 index is consumed
//! through [`GasIndexAlgorithm`]. [`GasIndexAdapter`] pairs a VOC and a NOx
//! instance with the conditioning state that gates them.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use contracts::{
    AlgorithmTuning, ConditioningConfig, ConditioningStatus, ContractError, FilterChannel,
    SensorKind, MAX_CONDITIONING_MS,
};
use tokio::time::Instant;

use crate::error::{DriverError, Result};

/// Upper bound of every index
pub const MAX_INDEX: i32 = 500;

/// Samples an algorithm spends learning before it reports an index
pub const INITIAL_LEARNING_SAMPLES: u32 = 45;

/// Stateful raw-ticks-to-index algorithm
pub trait GasIndexAlgorithm: Send {
    /// Feed one raw sample, returning the index (0 while learning)
    fn process(&mut self, sraw: u16) -> i32;

    /// Whether the algorithm is still in its initial adaptation window
    fn is_learning(&self) -> bool;
}

/// Baseline-tracking index algorithm
///
/// Tracks a running mean of the raw signal and reports the deviation from it
/// scaled around `index_offset`. Used when no vendor implementation is linked.
#[derive(Debug, Clone)]
pub struct AdaptiveGasIndex {
    channel: FilterChannel,
    tuning: AlgorithmTuning,
    learning_samples: u32,
    seen: u32,
    mean: f64,
}

impl AdaptiveGasIndex {
    pub fn new(channel: FilterChannel, tuning: AlgorithmTuning) -> Self {
        Self::with_learning_samples(channel, tuning, INITIAL_LEARNING_SAMPLES)
    }

    pub fn with_learning_samples(
        channel: FilterChannel,
        tuning: AlgorithmTuning,
        learning_samples: u32,
    ) -> Self {
        Self {
            channel,
            tuning,
            learning_samples,
            seen: 0,
            mean: 0.0,
        }
    }

    pub fn channel(&self) -> FilterChannel {
        self.channel
    }

    /// Baseline window in samples, derived from the learning time offset
    fn baseline_window(&self) -> f64 {
        (self.tuning.learning_time_offset_hours.max(1) as f64 * 3600.0).min(f64::from(u16::MAX))
    }
}

impl GasIndexAlgorithm for AdaptiveGasIndex {
    fn process(&mut self, sraw: u16) -> i32 {
        let sample = f64::from(sraw);
        self.seen = self.seen.saturating_add(1);
        let weight = 1.0 / (self.seen as f64).min(self.baseline_window());
        self.mean += (sample - self.mean) * weight;

        if self.seen <= self.learning_samples {
            return 0;
        }

        let std = f64::from(self.tuning.std_initial.max(1));
        let gain = f64::from(self.tuning.gain_factor) / 230.0;
        let deviation = (self.mean - sample) / std;
        let offset = f64::from(self.tuning.index_offset.max(1));
        let index = offset * (1.0 + deviation * gain);
        index.round().clamp(1.0, f64::from(MAX_INDEX)) as i32
    }

    fn is_learning(&self) -> bool {
        self.seen <= self.learning_samples
    }
}

/// Conditioning phase bookkeeping
///
/// All queries take `now` so they can be answered without touching the device.
#[derive(Debug, Clone)]
pub struct ConditioningTracker {
    duration: Duration,
    validity: Duration,
    started_at: Option<Instant>,
    completed_at: Option<Instant>,
    /// Last measurement taken while conditioned; renews the validity window
    last_used: Option<Instant>,
    failed: bool,
}

impl ConditioningTracker {
    pub fn new(config: &ConditioningConfig) -> std::result::Result<Self, ContractError> {
        if config.duration_ms == 0 || config.duration_ms > MAX_CONDITIONING_MS {
            return Err(ContractError::config_validation(
                "conditioning.duration_ms",
                format!(
                    "{} ms must be in 1..={MAX_CONDITIONING_MS} (vendor maximum)",
                    config.duration_ms
                ),
            ));
        }
        Ok(Self {
            duration: config.duration(),
            validity: config.validity(),
            started_at: None,
            completed_at: None,
            last_used: None,
            failed: false,
        })
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn begin(&mut self, now: Instant) {
        self.started_at = Some(now);
        self.completed_at = None;
        self.last_used = None;
        self.failed = false;
    }

    pub fn complete(&mut self, now: Instant) {
        self.completed_at = Some(now);
        self.failed = false;
    }

    pub fn fail(&mut self) {
        self.completed_at = None;
        self.last_used = None;
        self.failed = true;
    }

    /// Record a measurement; keeps a conditioned sensor conditioned
    ///
    /// Has no effect once the validity window already lapsed.
    pub fn touch(&mut self, now: Instant) {
        if self.is_conditioned(now) {
            self.last_used = Some(now);
        }
    }

    pub fn has_failed(&self) -> bool {
        self.failed
    }

    /// Conditioned, and neither conditioning nor the last measurement is
    /// older than the validity window
    pub fn is_conditioned(&self, now: Instant) -> bool {
        let Some(completed) = self.completed_at else {
            return false;
        };
        let since = self.last_used.map_or(completed, |used| used.max(completed));
        now.saturating_duration_since(since) < self.validity
    }

    pub fn in_progress(&self, now: Instant) -> bool {
        match (self.started_at, self.completed_at) {
            (Some(started), None) if !self.failed => {
                now.saturating_duration_since(started) < self.duration
            }
            _ => false,
        }
    }

    pub fn remaining(&self, now: Instant) -> Duration {
        if !self.in_progress(now) {
            return Duration::ZERO;
        }
        self.started_at.map_or(Duration::ZERO, |started| {
            self.duration
                .saturating_sub(now.saturating_duration_since(started))
        })
    }

    pub fn status(&self, now: Instant) -> ConditioningStatus {
        ConditioningStatus {
            is_conditioned: self.is_conditioned(now),
            in_progress: self.in_progress(now),
            remaining_time_seconds: self.remaining(now).as_secs_f64(),
        }
    }
}

/// Shared handle to a [`ConditioningTracker`]
///
/// Status queries go through this handle so they never wait on a driver that
/// is busy conditioning.
#[derive(Debug, Clone)]
pub struct ConditioningHandle(Arc<Mutex<ConditioningTracker>>);

impl ConditioningHandle {
    pub fn new(tracker: ConditioningTracker) -> Self {
        Self(Arc::new(Mutex::new(tracker)))
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut ConditioningTracker) -> R) -> R {
        let mut tracker = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut tracker)
    }

    pub fn status(&self) -> ConditioningStatus {
        self.with(|t| t.status(Instant::now()))
    }

    pub fn is_conditioned(&self) -> bool {
        self.with(|t| t.is_conditioned(Instant::now()))
    }
}

/// Indices of one gas measurement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GasIndexOutput {
    pub voc_index: i32,
    pub nox_index: i32,
    pub voc_learning: bool,
    pub nox_learning: bool,
}

/// VOC and NOx algorithms gated by conditioning
pub struct GasIndexAdapter {
    voc: Box<dyn GasIndexAlgorithm>,
    nox: Box<dyn GasIndexAlgorithm>,
    conditioning: ConditioningHandle,
}

impl GasIndexAdapter {
    pub fn new(
        voc: Box<dyn GasIndexAlgorithm>,
        nox: Box<dyn GasIndexAlgorithm>,
        conditioning: &ConditioningConfig,
    ) -> Result<Self> {
        let tracker = ConditioningTracker::new(conditioning)?;
        Ok(Self {
            voc,
            nox,
            conditioning: ConditioningHandle::new(tracker),
        })
    }

    pub fn conditioning(&self) -> &ConditioningHandle {
        &self.conditioning
    }

    /// Convert raw ticks into indices
    ///
    /// # Errors
    /// `NotConditioned` until conditioning has completed, and again once no
    /// measurement was taken for longer than the validity window.
    pub fn process(&mut self, sraw_voc: u16, sraw_nox: u16) -> Result<GasIndexOutput> {
        let conditioned = self.conditioning.with(|t| {
            let now = Instant::now();
            let conditioned = t.is_conditioned(now);
            t.touch(now);
            conditioned
        });
        if !conditioned {
            return Err(DriverError::NotConditioned {
                sensor: SensorKind::Sgp41,
            });
        }
        let voc_index = self.voc.process(sraw_voc).clamp(0, MAX_INDEX);
        let nox_index = self.nox.process(sraw_nox).clamp(0, MAX_INDEX);
        Ok(GasIndexOutput {
            voc_index,
            nox_index,
            voc_learning: self.voc.is_learning(),
            nox_learning: self.nox.is_learning(),
        })
    }
}

impl std::fmt::Debug for GasIndexAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GasIndexAdapter")
            .field("conditioning", &self.conditioning)
            .finish_non_exhaustive()
    }
}
