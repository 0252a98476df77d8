//! Bounded-retry access to one device.

use std::time::Duration;

use contracts::{Compensation, SensorConfig, SensorKind};
use metrics::counter;
use tracing::{debug, error, warn};

use crate::bus::BusLock;
use crate::device::{RawDevice, RawSample};
use crate::error::{DriverError, ErrorClass, HardwareError, Result};
use crate::throttle::{LogThrottle, Severity};

/// Attempt count and inter-attempt delay of a read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(attempts: u32, delay: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            delay,
        }
    }

    pub fn from_config(config: &SensorConfig) -> Self {
        Self::new(config.retry_attempts(), config.retry_delay())
    }
}

/// A device together with the bus it sits on
///
/// The bus lock is taken per attempt and released before the retry delay.
pub struct DeviceLink {
    kind: SensorKind,
    device: Option<Box<dyn RawDevice>>,
    open_error: Option<HardwareError>,
    bus: BusLock,
    policy: RetryPolicy,
    throttle: LogThrottle,
}

impl DeviceLink {
    pub fn new(
        kind: SensorKind,
        device: std::result::Result<Box<dyn RawDevice>, HardwareError>,
        bus: BusLock,
        policy: RetryPolicy,
    ) -> Self {
        let (device, open_error) = match device {
            Ok(device) => (Some(device), None),
            Err(err) => (None, Some(err)),
        };
        Self {
            kind,
            device,
            open_error,
            bus,
            policy,
            throttle: LogThrottle::default(),
        }
    }

    pub fn kind(&self) -> SensorKind {
        self.kind
    }

    pub fn is_open(&self) -> bool {
        self.device.is_some()
    }

    /// Why the device could not be opened
    pub fn open_error(&self) -> Option<&HardwareError> {
        self.open_error.as_ref()
    }

    pub fn bus(&self) -> &BusLock {
        &self.bus
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Sample the device until `interpret` accepts a result
    ///
    /// `interpret` sees every raw outcome, errors included, so a driver can
    /// turn an error into a value (for example a cached reading) or reject a
    /// sample it considers implausible.
    pub async fn read<T>(
        &mut self,
        compensation: Compensation,
        mut interpret: impl FnMut(
            std::result::Result<RawSample, HardwareError>,
        ) -> std::result::Result<T, HardwareError>,
    ) -> Result<T> {
        let kind = self.kind;
        let attempts = self.policy.attempts;
        let device = self
            .device
            .as_mut()
            .ok_or(DriverError::DeviceUnavailable { sensor: kind })?;

        let mut attempt = 1;
        loop {
            counter!("airwatch_read_attempts_total", "sensor" => kind.as_str()).increment(1);

            let sample = {
                let _bus = self.bus.lock().await;
                device.sample(compensation).await
            };

            match interpret(sample) {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(sensor = %kind, attempt, "read recovered after retry");
                    }
                    return Ok(value);
                }
                Err(err) => {
                    log_attempt(&mut self.throttle, kind, attempt, attempts, &err);
                    if attempt >= attempts {
                        return Err(DriverError::RetriesExhausted {
                            sensor: kind,
                            attempts,
                            last: err,
                        });
                    }
                }
            }

            tokio::time::sleep(self.policy.delay).await;
            attempt += 1;
        }
    }

    /// Re-open a device that stopped responding
    pub async fn reinitialize(&mut self) -> Result<()> {
        let kind = self.kind;
        let device = self
            .device
            .as_mut()
            .ok_or(DriverError::DeviceUnavailable { sensor: kind })?;
        let result = {
            let _bus = self.bus.lock().await;
            device.reinitialize().await
        };
        result.map_err(|source| DriverError::Reinitialize {
            sensor: kind,
            source,
        })
    }

    /// Send the conditioning command; the caller waits out the duration
    pub async fn condition(&mut self, compensation: Compensation) -> Result<()> {
        let kind = self.kind;
        let device = self
            .device
            .as_mut()
            .ok_or(DriverError::DeviceUnavailable { sensor: kind })?;
        let result = {
            let _bus = self.bus.lock().await;
            device.condition(compensation).await
        };
        result.map_err(|err| DriverError::conditioning(kind, err.to_string()))
    }
}

impl std::fmt::Debug for DeviceLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceLink")
            .field("kind", &self.kind)
            .field("open", &self.is_open())
            .field("bus", &self.bus.name())
            .field("policy", &self.policy)
            .finish()
    }
}

fn log_attempt(
    throttle: &mut LogThrottle,
    kind: SensorKind,
    attempt: u32,
    attempts: u32,
    err: &HardwareError,
) {
    let class = err.class();
    let severity = match class {
        ErrorClass::Absent => Severity::Error,
        ErrorClass::Transient | ErrorClass::Fault => Severity::Routine,
    };
    let Some(suppressed) = throttle.check(&err.to_string(), severity) else {
        return;
    };
    match class {
        ErrorClass::Absent => error!(
            sensor = %kind,
            attempt,
            attempts,
            suppressed,
            error = %err,
            "sensor not responding"
        ),
        ErrorClass::Transient | ErrorClass::Fault => warn!(
            sensor = %kind,
            attempt,
            attempts,
            suppressed,
            class = class.as_str(),
            error = %err,
            "read attempt failed"
        ),
    }
}
