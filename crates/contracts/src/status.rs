//! Runtime status, health and introspection records

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{FilterChannel, SensorKind, SensorReading};

/// Per-sensor status tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorStatus {
    Online,
    Degraded,
    Offline,
}

impl SensorStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SensorStatus::Online => "online",
            SensorStatus::Degraded => "degraded",
            SensorStatus::Offline => "offline",
        }
    }

    /// Human readable description shown to operators
    pub fn description(&self) -> &'static str {
        match self {
            SensorStatus::Online => "operating normally",
            SensorStatus::Degraded => "readings unreliable",
            SensorStatus::Offline => "not responding",
        }
    }
}

impl fmt::Display for SensorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Driver-side state of one sensor, maintained by the manager
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorRuntimeState {
    pub status: SensorStatus,
    /// Whether the hardware handle was opened successfully
    pub device_open: bool,
    pub last_success: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    /// Reads in a row that exhausted their retries
    pub consecutive_failures: u32,
    /// Re-initialisation attempts in a row that failed
    pub reinit_failures: u32,
}

impl SensorRuntimeState {
    /// State of a sensor whose device opened successfully
    pub fn online() -> Self {
        Self {
            status: SensorStatus::Online,
            device_open: true,
            last_success: None,
            last_error: None,
            consecutive_failures: 0,
            reinit_failures: 0,
        }
    }

    /// State of a sensor whose device could not be opened
    pub fn unavailable(error: impl Into<String>) -> Self {
        Self {
            status: SensorStatus::Offline,
            device_open: false,
            last_success: None,
            last_error: Some(error.into()),
            consecutive_failures: 0,
            reinit_failures: 0,
        }
    }
}

/// Overall station health
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallHealth {
    Healthy,
    Degraded,
    Unhealthy,
}

impl OverallHealth {
    pub fn as_str(&self) -> &'static str {
        match self {
            OverallHealth::Healthy => "healthy",
            OverallHealth::Degraded => "degraded",
            OverallHealth::Unhealthy => "unhealthy",
        }
    }
}

impl fmt::Display for OverallHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Derived health of one sensor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorHealth {
    pub status: SensorStatus,
    pub description: String,
    /// Snapshot age at evaluation time
    pub age_seconds: Option<f64>,
    pub freshness_threshold_seconds: f64,
}

/// Health derived from snapshot and runtime state; never stored
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub overall: OverallHealth,
    pub sensors: BTreeMap<SensorKind, SensorHealth>,
    pub online_count: usize,
    pub configured_count: usize,
    pub evaluated_at: DateTime<Utc>,
}

/// Conditioning progress of a conditionable sensor
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConditioningStatus {
    pub is_conditioned: bool,
    pub in_progress: bool,
    pub remaining_time_seconds: f64,
}

/// Counters and history of one filter channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelStats {
    pub channel: FilterChannel,
    pub enabled: bool,
    pub total: u64,
    pub rejected: u64,
    pub history_size: usize,
    pub last_accepted: Option<f64>,
}

/// Aggregate statistics of a sensor's filter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterStats {
    pub total: u64,
    pub rejected: u64,
    /// `rejected / total`, 0 when nothing was filtered yet
    pub rejection_rate: f64,
    pub window_size: usize,
    pub channels: Vec<ChannelStats>,
}

impl FilterStats {
    /// Aggregate per-channel statistics
    pub fn from_channels(window_size: usize, channels: Vec<ChannelStats>) -> Self {
        let total: u64 = channels.iter().map(|c| c.total).sum();
        let rejected: u64 = channels.iter().map(|c| c.rejected).sum();
        Self {
            total,
            rejected,
            rejection_rate: if total > 0 {
                rejected as f64 / total as f64
            } else {
                0.0
            },
            window_size,
            channels,
        }
    }
}

/// Outcome of a one-shot diagnostic read
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticOutcome {
    Passed,
    Failed,
    Error,
    Offline,
}

impl DiagnosticOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiagnosticOutcome::Passed => "passed",
            DiagnosticOutcome::Failed => "failed",
            DiagnosticOutcome::Error => "error",
            DiagnosticOutcome::Offline => "offline",
        }
    }
}

/// Result of `test_sensors` for one sensor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticResult {
    pub status: DiagnosticOutcome,
    pub details: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reading: Option<SensorReading>,
}

impl DiagnosticResult {
    pub fn new(status: DiagnosticOutcome, details: impl Into<String>) -> Self {
        Self {
            status,
            details: details.into(),
            reading: None,
        }
    }

    pub fn with_reading(mut self, reading: SensorReading) -> Self {
        self.reading = Some(reading);
        self
    }
}

/// Summary of one polling cycle of a cadence group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleReport {
    /// Cadence group name (member kinds joined with `+`)
    pub group: String,
    pub duration_ms: f64,
    pub reads_ok: u32,
    pub reads_failed: u32,
    /// Whether a composed record was handed to persistence
    pub persisted: bool,
}
