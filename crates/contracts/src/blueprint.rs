//! StationBlueprint - Config Loader output
//!
//! Describes the full station: sensors with their polling, retry, plausibility,
//! filter, conditioning and compensation settings, plus persistence routing.
//! Per-kind defaults are applied through the `*_or_default` accessors so a
//! minimal configuration only has to name the sensors it wants.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::{FilterChannel, SensorKind};

/// Vendor-documented upper bound for the gas sensor conditioning phase
pub const MAX_CONDITIONING_MS: u64 = 10_000;

/// Configuration version
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConfigVersion {
    #[default]
    V1,
}

/// Complete station blueprint
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct StationBlueprint {
    /// Configuration version
    #[serde(default)]
    pub version: ConfigVersion,

    /// Station-wide settings
    #[serde(default)]
    #[validate(nested)]
    pub station: StationConfig,

    /// Sensor definitions
    #[serde(default)]
    #[validate(nested)]
    pub sensors: Vec<SensorConfig>,

    /// Persistence routing
    #[serde(default)]
    #[validate(nested)]
    pub sinks: Vec<SinkConfig>,
}

impl StationBlueprint {
    /// Blueprint with every supported sensor at its defaults and a log sink
    pub fn default_station() -> Self {
        Self {
            version: ConfigVersion::V1,
            station: StationConfig::default(),
            sensors: SensorKind::ALL
                .iter()
                .map(|kind| SensorConfig::with_defaults(*kind))
                .collect(),
            sinks: vec![SinkConfig {
                name: "log".to_string(),
                sink_type: SinkType::Log,
                queue_capacity: default_queue_capacity(),
                params: HashMap::new(),
            }],
        }
    }

    /// Enabled sensor definitions, in declaration order
    pub fn enabled_sensors(&self) -> impl Iterator<Item = &SensorConfig> {
        self.sensors.iter().filter(|s| s.enabled)
    }

    /// Enabled definition for a kind
    pub fn sensor(&self, kind: SensorKind) -> Option<&SensorConfig> {
        self.enabled_sensors().find(|s| s.kind == kind)
    }
}

/// Station-wide settings
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct StationConfig {
    /// Station name (logs only)
    #[serde(default = "default_station_name")]
    #[validate(length(min = 1))]
    pub name: String,

    /// Bound on how long `stop()` waits for each polling loop
    #[serde(default = "default_stop_timeout_ms")]
    #[validate(range(min = 1))]
    pub stop_timeout_ms: u64,

    /// Log a progress line every N persisted records
    #[serde(default = "default_progress_log_every")]
    #[validate(range(min = 1))]
    pub progress_log_every: u64,
}

impl StationConfig {
    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }
}

impl Default for StationConfig {
    fn default() -> Self {
        Self {
            name: default_station_name(),
            stop_timeout_ms: default_stop_timeout_ms(),
            progress_log_every: default_progress_log_every(),
        }
    }
}

fn default_station_name() -> String {
    "airwatch".to_string()
}

fn default_stop_timeout_ms() -> u64 {
    5_000
}

fn default_progress_log_every() -> u64 {
    50
}

fn default_true() -> bool {
    true
}

/// One physical sensor
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SensorConfig {
    /// Sensor kind
    pub kind: SensorKind,

    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Hardware channel; sensors naming the same bus share one access lock
    #[serde(default)]
    pub bus: Option<String>,

    #[serde(default)]
    #[validate(range(min = 1))]
    pub poll_interval_ms: Option<u64>,

    #[serde(default)]
    #[validate(range(min = 1))]
    pub retry_attempts: Option<u32>,

    #[serde(default)]
    pub retry_delay_ms: Option<u64>,

    /// Consecutive failed re-initialisations before the sensor is marked offline
    #[serde(default = "default_max_reinit_attempts")]
    #[validate(range(min = 1))]
    pub max_reinit_attempts: u32,

    /// Whether this sensor's loop persists composed records
    #[serde(default)]
    pub persist: Option<bool>,

    /// Driver plausibility limits
    #[serde(default)]
    pub valid_ranges: ValidRanges,

    #[serde(default)]
    pub filter: Option<FilterConfig>,

    #[serde(default)]
    pub conditioning: Option<ConditioningConfig>,

    #[serde(default)]
    pub gas_index: Option<GasIndexTuning>,

    #[serde(default)]
    pub compensation: Option<CompensationConfig>,

    /// Wait after start-up before the first read (scd40)
    #[serde(default)]
    pub warmup_ms: Option<u64>,

    /// How long a cached reading may stand in while data is not ready (scd40)
    #[serde(default)]
    pub cache_ttl_ms: Option<u64>,
}

fn default_max_reinit_attempts() -> u32 {
    3
}

impl SensorConfig {
    /// Definition using the kind's defaults throughout
    pub fn with_defaults(kind: SensorKind) -> Self {
        Self {
            kind,
            enabled: true,
            bus: None,
            poll_interval_ms: None,
            retry_attempts: None,
            retry_delay_ms: None,
            max_reinit_attempts: default_max_reinit_attempts(),
            persist: None,
            valid_ranges: ValidRanges::default(),
            filter: None,
            conditioning: None,
            gas_index: None,
            compensation: None,
            warmup_ms: None,
            cache_ttl_ms: None,
        }
    }

    pub fn bus_name(&self) -> &str {
        self.bus.as_deref().unwrap_or(self.kind.default_bus())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(
            self.poll_interval_ms
                .unwrap_or(self.kind.default_poll_interval_ms()),
        )
    }

    pub fn retry_attempts(&self) -> u32 {
        self.retry_attempts
            .unwrap_or(self.kind.default_retry_attempts())
            .max(1)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(
            self.retry_delay_ms
                .unwrap_or(self.kind.default_retry_delay_ms()),
        )
    }

    pub fn persists(&self) -> bool {
        self.persist.unwrap_or(self.kind.persists_by_default())
    }

    pub fn warmup(&self) -> Duration {
        let default = match self.kind {
            SensorKind::Scd40 => 10_000,
            _ => 0,
        };
        Duration::from_millis(self.warmup_ms.unwrap_or(default))
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_millis(self.cache_ttl_ms.unwrap_or(10_000))
    }

    /// Plausibility limits with kind defaults filled in
    pub fn valid_ranges_or_default(&self) -> ValidRanges {
        self.valid_ranges.or(&ValidRanges::for_kind(self.kind))
    }

    /// Filter settings, `None` for kinds without filterable channels
    pub fn filter_or_default(&self) -> Option<FilterConfig> {
        if !self.kind.capabilities().filterable {
            return None;
        }
        Some(
            self.filter
                .clone()
                .unwrap_or_else(|| FilterConfig::for_kind(self.kind)),
        )
    }

    /// Conditioning settings, `None` for kinds that do not condition
    pub fn conditioning_or_default(&self) -> Option<ConditioningConfig> {
        if !self.kind.capabilities().conditionable {
            return None;
        }
        Some(self.conditioning.clone().unwrap_or_default())
    }

    pub fn gas_index_or_default(&self) -> Option<GasIndexTuning> {
        if !self.kind.capabilities().conditionable {
            return None;
        }
        Some(self.gas_index.clone().unwrap_or_default())
    }

    /// Compensation settings, `None` for kinds that take no compensation
    pub fn compensation_or_default(&self) -> Option<CompensationConfig> {
        if !self.kind.capabilities().compensable {
            return None;
        }
        Some(self.compensation.clone().unwrap_or_default())
    }
}

/// Inclusive value range
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValueRange {
    pub min: f64,
    pub max: f64,
}

impl ValueRange {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

/// Driver plausibility limits per quantity
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidRanges {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub co2: Option<ValueRange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<ValueRange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub humidity: Option<ValueRange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sraw_voc: Option<ValueRange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sraw_nox: Option<ValueRange>,
}

impl ValidRanges {
    /// Datasheet limits of each kind
    pub fn for_kind(kind: SensorKind) -> Self {
        match kind {
            SensorKind::Scd40 => Self {
                co2: Some(ValueRange::new(400.0, 5000.0)),
                temperature: Some(ValueRange::new(-10.0, 60.0)),
                humidity: Some(ValueRange::new(0.0, 100.0)),
                ..Default::default()
            },
            SensorKind::Dht22 => Self {
                temperature: Some(ValueRange::new(-40.0, 80.0)),
                humidity: Some(ValueRange::new(0.0, 100.0)),
                ..Default::default()
            },
            SensorKind::Sgp41 => Self {
                sraw_voc: Some(ValueRange::new(1.0, 65535.0)),
                sraw_nox: Some(ValueRange::new(1.0, 65535.0)),
                ..Default::default()
            },
        }
    }

    /// Fill unset limits from `fallback`
    pub fn or(&self, fallback: &ValidRanges) -> ValidRanges {
        ValidRanges {
            co2: self.co2.or(fallback.co2),
            temperature: self.temperature.or(fallback.temperature),
            humidity: self.humidity.or(fallback.humidity),
            sraw_voc: self.sraw_voc.or(fallback.sraw_voc),
            sraw_nox: self.sraw_nox.or(fallback.sraw_nox),
        }
    }

    /// Every configured range, labelled by quantity
    pub fn entries(&self) -> Vec<(&'static str, ValueRange)> {
        [
            ("co2", self.co2),
            ("temperature", self.temperature),
            ("humidity", self.humidity),
            ("sraw_voc", self.sraw_voc),
            ("sraw_nox", self.sraw_nox),
        ]
        .into_iter()
        .filter_map(|(name, range)| range.map(|r| (name, r)))
        .collect()
    }
}

/// Outlier filter settings of one sensor (up to two channels)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterConfig {
    /// History window shared by all channels
    #[serde(default = "default_window_size")]
    pub window_size: usize,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<ChannelFilterConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub humidity: Option<ChannelFilterConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub voc_index: Option<ChannelFilterConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nox_index: Option<ChannelFilterConfig>,
}

fn default_window_size() -> usize {
    5
}

impl FilterConfig {
    /// Tuned defaults of each filterable kind
    pub fn for_kind(kind: SensorKind) -> Self {
        let mut config = Self {
            window_size: default_window_size(),
            temperature: None,
            humidity: None,
            voc_index: None,
            nox_index: None,
        };
        match kind {
            SensorKind::Scd40 => {}
            SensorKind::Dht22 => {
                config.temperature = Some(ChannelFilterConfig::new(5.0, 40.0, 5.0, 2.5));
                config.humidity = Some(ChannelFilterConfig::new(10.0, 90.0, 15.0, 5.0));
            }
            SensorKind::Sgp41 => {
                config.voc_index = Some(ChannelFilterConfig::new(1.0, 500.0, 50.0, 20.0));
                config.nox_index = Some(ChannelFilterConfig::new(1.0, 500.0, 50.0, 20.0));
            }
        }
        config
    }

    /// Thresholds configured for a channel
    pub fn channel(&self, channel: FilterChannel) -> Option<&ChannelFilterConfig> {
        match channel {
            FilterChannel::Temperature => self.temperature.as_ref(),
            FilterChannel::Humidity => self.humidity.as_ref(),
            FilterChannel::VocIndex => self.voc_index.as_ref(),
            FilterChannel::NoxIndex => self.nox_index.as_ref(),
        }
    }

    /// Configured channels in a fixed order
    pub fn channels(&self) -> Vec<(FilterChannel, ChannelFilterConfig)> {
        [
            FilterChannel::Temperature,
            FilterChannel::Humidity,
            FilterChannel::VocIndex,
            FilterChannel::NoxIndex,
        ]
        .into_iter()
        .filter_map(|c| self.channel(c).map(|cfg| (c, *cfg)))
        .collect()
    }
}

/// Thresholds of one filter channel
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ChannelFilterConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Lower bound of the range check
    pub min: f64,
    /// Upper bound of the range check
    pub max: f64,
    /// Largest accepted jump from the last accepted value
    pub max_change: f64,
    /// Lower bound on the standard deviation used by the statistical check
    pub std_floor: f64,
}

impl ChannelFilterConfig {
    pub const fn new(min: f64, max: f64, max_change: f64, std_floor: f64) -> Self {
        Self {
            enabled: true,
            min,
            max,
            max_change,
            std_floor,
        }
    }

    /// Pass-through configuration
    pub const fn disabled() -> Self {
        Self {
            enabled: false,
            min: f64::NEG_INFINITY,
            max: f64::INFINITY,
            max_change: f64::INFINITY,
            std_floor: 0.0,
        }
    }
}

/// Gas sensor conditioning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditioningConfig {
    /// Length of the conditioning phase, at most `MAX_CONDITIONING_MS`
    #[serde(default = "default_conditioning_ms")]
    pub duration_ms: u64,

    /// How long a completed conditioning stays valid
    #[serde(default = "default_conditioning_validity_ms")]
    pub validity_ms: u64,
}

fn default_conditioning_ms() -> u64 {
    MAX_CONDITIONING_MS
}

fn default_conditioning_validity_ms() -> u64 {
    600_000
}

impl ConditioningConfig {
    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }

    pub fn validity(&self) -> Duration {
        Duration::from_millis(self.validity_ms)
    }
}

impl Default for ConditioningConfig {
    fn default() -> Self {
        Self {
            duration_ms: default_conditioning_ms(),
            validity_ms: default_conditioning_validity_ms(),
        }
    }
}

/// Tuning of the two gas index algorithm instances
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GasIndexTuning {
    #[serde(default = "AlgorithmTuning::voc")]
    pub voc: AlgorithmTuning,
    #[serde(default = "AlgorithmTuning::nox")]
    pub nox: AlgorithmTuning,
}

impl Default for GasIndexTuning {
    fn default() -> Self {
        Self {
            voc: AlgorithmTuning::voc(),
            nox: AlgorithmTuning::nox(),
        }
    }
}

/// Vendor algorithm tuning parameters, set once at construction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlgorithmTuning {
    pub index_offset: i32,
    pub learning_time_offset_hours: i32,
    pub learning_time_gain_hours: i32,
    pub gating_max_duration_minutes: i32,
    pub std_initial: i32,
    pub gain_factor: i32,
}

impl AlgorithmTuning {
    /// Vendor defaults for the VOC index
    pub fn voc() -> Self {
        Self {
            index_offset: 100,
            learning_time_offset_hours: 12,
            learning_time_gain_hours: 12,
            gating_max_duration_minutes: 180,
            std_initial: 50,
            gain_factor: 230,
        }
    }

    /// Vendor defaults for the NOx index
    pub fn nox() -> Self {
        Self {
            index_offset: 1,
            learning_time_offset_hours: 12,
            learning_time_gain_hours: 12,
            gating_max_duration_minutes: 720,
            std_initial: 50,
            gain_factor: 230,
        }
    }
}

/// Where a compensable sensor takes its ambient values from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompensationConfig {
    #[serde(default = "default_compensation_source")]
    pub source: SensorKind,
    #[serde(default = "default_compensation_temperature")]
    pub default_temperature: f64,
    #[serde(default = "default_compensation_humidity")]
    pub default_humidity: f64,
}

fn default_compensation_source() -> SensorKind {
    SensorKind::Dht22
}

fn default_compensation_temperature() -> f64 {
    crate::Compensation::DEFAULT_TEMPERATURE
}

fn default_compensation_humidity() -> f64 {
    crate::Compensation::DEFAULT_HUMIDITY
}

impl Default for CompensationConfig {
    fn default() -> Self {
        Self {
            source: default_compensation_source(),
            default_temperature: default_compensation_temperature(),
            default_humidity: default_compensation_humidity(),
        }
    }
}

/// Persistence sink routing
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SinkConfig {
    /// Sink name
    #[validate(length(min = 1))]
    pub name: String,

    /// Sink type
    pub sink_type: SinkType,

    /// Record queue capacity of the sink worker
    #[serde(default = "default_queue_capacity")]
    #[validate(range(min = 1))]
    pub queue_capacity: usize,

    /// Sink-specific parameters
    #[serde(default)]
    pub params: HashMap<String, String>,
}

fn default_queue_capacity() -> usize {
    100
}

/// Sink type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkType {
    /// Structured log line per record
    Log,
    /// Append-only JSON lines file
    JsonLines,
    /// In-process buffer (tests, diagnostics)
    Memory,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_station_covers_all_kinds() {
        let bp = StationBlueprint::default_station();
        assert_eq!(bp.sensors.len(), 3);
        assert!(bp.sensor(SensorKind::Sgp41).is_some());
        assert!(bp.validate().is_ok());
    }

    #[test]
    fn test_kind_defaults() {
        let dht = SensorConfig::with_defaults(SensorKind::Dht22);
        assert_eq!(dht.poll_interval(), Duration::from_secs(30));
        assert_eq!(dht.retry_attempts(), 5);
        assert_eq!(dht.bus_name(), "gpio-4");
        assert!(dht.persists());
        assert!(dht.conditioning_or_default().is_none());

        let filter = dht.filter_or_default().unwrap();
        assert_eq!(filter.window_size, 5);
        let temp = filter.channel(FilterChannel::Temperature).unwrap();
        assert_eq!(temp.max_change, 5.0);
        assert_eq!(temp.std_floor, 2.5);

        let sgp = SensorConfig::with_defaults(SensorKind::Sgp41);
        assert_eq!(sgp.poll_interval(), Duration::from_secs(1));
        assert!(!sgp.persists());
        assert_eq!(
            sgp.conditioning_or_default().unwrap().duration_ms,
            MAX_CONDITIONING_MS
        );
        assert_eq!(
            sgp.compensation_or_default().unwrap().source,
            SensorKind::Dht22
        );
    }

    #[test]
    fn test_valid_ranges_fill_from_kind() {
        let mut scd = SensorConfig::with_defaults(SensorKind::Scd40);
        scd.valid_ranges.co2 = Some(ValueRange::new(350.0, 4000.0));
        let ranges = scd.valid_ranges_or_default();
        assert_eq!(ranges.co2, Some(ValueRange::new(350.0, 4000.0)));
        assert_eq!(ranges.humidity, Some(ValueRange::new(0.0, 100.0)));
        assert!(ranges.sraw_voc.is_none());
    }

    #[test]
    fn test_validator_rejects_zero_queue() {
        let mut bp = StationBlueprint::default_station();
        bp.sinks[0].queue_capacity = 0;
        assert!(bp.validate().is_err());
    }
}
