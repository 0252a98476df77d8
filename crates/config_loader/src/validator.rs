//! Configuration validation
//!
//! Rules:
//! - field-level constraints declared on the blueprint (`validator` derive)
//! - at least one enabled sensor, each kind at most once
//! - value ranges with min <= max
//! - filter windows >= 1, channels allowed for the kind, positive thresholds
//! - conditioning within the vendor maximum and shorter than its validity
//! - compensation sourced from a climate-capable kind
//! - sink names unique, file sinks have a path

use std::collections::HashSet;

use ::validator::Validate;
use contracts::{
    ContractError, SensorConfig, SinkType, StationBlueprint, ValueRange, MAX_CONDITIONING_MS,
};

/// Validate a StationBlueprint
///
/// Returns the first error encountered, or Ok(()).
pub fn validate(blueprint: &StationBlueprint) -> Result<(), ContractError> {
    validate_fields(blueprint)?;
    validate_sensor_kinds(blueprint)?;
    for (idx, sensor) in blueprint.sensors.iter().enumerate() {
        validate_ranges(idx, sensor)?;
        validate_filter(idx, sensor)?;
        validate_conditioning(idx, sensor)?;
        validate_compensation(idx, sensor)?;
    }
    validate_sinks(blueprint)?;
    Ok(())
}

/// Declarative field constraints
fn validate_fields(blueprint: &StationBlueprint) -> Result<(), ContractError> {
    blueprint
        .validate()
        .map_err(|e| ContractError::config_validation("blueprint", e.to_string()))
}

/// At least one enabled sensor; every kind configured once
fn validate_sensor_kinds(blueprint: &StationBlueprint) -> Result<(), ContractError> {
    if blueprint.enabled_sensors().next().is_none() {
        return Err(ContractError::config_validation(
            "sensors",
            "at least one enabled sensor is required",
        ));
    }

    let mut seen = HashSet::new();
    for sensor in &blueprint.sensors {
        if !seen.insert(sensor.kind) {
            return Err(ContractError::config_validation(
                format!("sensors[kind={}]", sensor.kind),
                "duplicate sensor kind",
            ));
        }
    }
    Ok(())
}

fn check_range(field: String, range: &ValueRange) -> Result<(), ContractError> {
    if range.min.is_nan() || range.max.is_nan() || range.min > range.max {
        return Err(ContractError::config_validation(
            field,
            format!("min ({}) must be <= max ({})", range.min, range.max),
        ));
    }
    Ok(())
}

fn validate_ranges(idx: usize, sensor: &SensorConfig) -> Result<(), ContractError> {
    for (name, range) in sensor.valid_ranges.entries() {
        check_range(format!("sensors[{idx}].valid_ranges.{name}"), &range)?;
    }
    Ok(())
}

fn validate_filter(idx: usize, sensor: &SensorConfig) -> Result<(), ContractError> {
    let Some(filter) = &sensor.filter else {
        return Ok(());
    };
    let allowed = sensor.kind.filter_channels();
    if allowed.is_empty() {
        return Err(ContractError::config_validation(
            format!("sensors[{idx}].filter"),
            format!("{} has no filterable channels", sensor.kind),
        ));
    }
    if filter.window_size == 0 {
        return Err(ContractError::config_validation(
            format!("sensors[{idx}].filter.window_size"),
            "window_size must be >= 1",
        ));
    }

    let channels = filter.channels();
    if channels.len() > 2 {
        return Err(ContractError::config_validation(
            format!("sensors[{idx}].filter"),
            "at most two channels per filter",
        ));
    }
    for (channel, config) in channels {
        let field = format!("sensors[{idx}].filter.{channel}");
        if !allowed.contains(&channel) {
            return Err(ContractError::config_validation(
                field,
                format!("channel not available on {}", sensor.kind),
            ));
        }
        if !config.enabled {
            continue;
        }
        check_range(field.clone(), &ValueRange::new(config.min, config.max))?;
        if config.max_change.is_nan() || config.max_change <= 0.0 {
            return Err(ContractError::config_validation(
                format!("{field}.max_change"),
                format!("max_change must be > 0, got {}", config.max_change),
            ));
        }
        if config.std_floor.is_nan() || config.std_floor < 0.0 {
            return Err(ContractError::config_validation(
                format!("{field}.std_floor"),
                format!("std_floor must be >= 0, got {}", config.std_floor),
            ));
        }
    }
    Ok(())
}

fn validate_conditioning(idx: usize, sensor: &SensorConfig) -> Result<(), ContractError> {
    if !sensor.kind.capabilities().conditionable {
        if sensor.conditioning.is_some() {
            return Err(ContractError::config_validation(
                format!("sensors[{idx}].conditioning"),
                format!("{} does not support conditioning", sensor.kind),
            ));
        }
        return Ok(());
    }

    let Some(conditioning) = sensor.conditioning_or_default() else {
        return Ok(());
    };
    let field = format!("sensors[{idx}].conditioning.duration_ms");
    if conditioning.duration_ms == 0 {
        return Err(ContractError::config_validation(
            field,
            "conditioning duration must be > 0",
        ));
    }
    if conditioning.duration_ms > MAX_CONDITIONING_MS {
        return Err(ContractError::config_validation(
            field,
            format!(
                "conditioning duration {}ms exceeds vendor maximum of {}ms",
                conditioning.duration_ms, MAX_CONDITIONING_MS
            ),
        ));
    }
    if conditioning.validity_ms <= conditioning.duration_ms {
        return Err(ContractError::config_validation(
            format!("sensors[{idx}].conditioning.validity_ms"),
            "validity window must be longer than the conditioning duration",
        ));
    }
    Ok(())
}

fn validate_compensation(idx: usize, sensor: &SensorConfig) -> Result<(), ContractError> {
    let Some(compensation) = &sensor.compensation else {
        return Ok(());
    };
    let field = format!("sensors[{idx}].compensation");
    if !sensor.kind.capabilities().compensable {
        return Err(ContractError::config_validation(
            field,
            format!("{} does not accept compensation", sensor.kind),
        ));
    }
    if !compensation.source.capabilities().provides_climate {
        return Err(ContractError::config_validation(
            format!("{field}.source"),
            format!("{} provides no temperature/humidity", compensation.source),
        ));
    }
    Ok(())
}

/// Validate sink configuration
fn validate_sinks(blueprint: &StationBlueprint) -> Result<(), ContractError> {
    let mut seen = HashSet::new();
    for (idx, sink) in blueprint.sinks.iter().enumerate() {
        if sink.name.is_empty() {
            return Err(ContractError::config_validation(
                format!("sinks[{}].name", idx),
                "sink name cannot be empty",
            ));
        }
        if !seen.insert(sink.name.as_str()) {
            return Err(ContractError::config_validation(
                format!("sinks[name={}]", sink.name),
                "duplicate sink name",
            ));
        }
        if sink.sink_type == SinkType::JsonLines && !sink.params.contains_key("path") {
            return Err(ContractError::config_validation(
                format!("sinks[{}].params.path", idx),
                "json_lines sink requires a path",
            ));
        }
    }
    Ok(())
}

/// Non-fatal observations about a valid blueprint
pub fn collect_warnings(blueprint: &StationBlueprint) -> Vec<String> {
    let mut warnings = Vec::new();

    if blueprint.sinks.is_empty() {
        warnings.push("No sinks configured - composed records will not be persisted".to_string());
    }

    for sensor in blueprint.enabled_sensors() {
        if let Some(compensation) = sensor.compensation_or_default() {
            if blueprint.sensor(compensation.source).is_none() {
                warnings.push(format!(
                    "{} compensation source '{}' is not enabled - defaults ({} °C, {} %RH) will be used",
                    sensor.kind,
                    compensation.source,
                    compensation.default_temperature,
                    compensation.default_humidity
                ));
            }
        }
    }

    if !blueprint.enabled_sensors().any(|s| s.persists()) {
        warnings.push("No enabled sensor persists records".to_string());
    }

    warnings
}
