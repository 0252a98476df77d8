//! Rate-limited logging of repeated driver errors.

use std::time::Duration;

use tokio::time::Instant;

const DEFAULT_MIN_INTERVAL: Duration = Duration::from_secs(60);
const DEFAULT_ERROR_INTERVAL: Duration = Duration::from_secs(300);

/// How long an identical message stays suppressed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Suppressed for `min_interval`
    Routine,
    /// Suppressed for `error_interval`
    Error,
}

/// Decides whether a repeated message should be logged again
///
/// A message differing from the previous one is always emitted. Suppressed
/// messages are counted and the count is handed back with the next emission.
#[derive(Debug)]
pub struct LogThrottle {
    min_interval: Duration,
    error_interval: Duration,
    last_message: Option<String>,
    last_emitted: Option<Instant>,
    suppressed: u64,
}

impl Default for LogThrottle {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_INTERVAL, DEFAULT_ERROR_INTERVAL)
    }
}

impl LogThrottle {
    pub fn new(min_interval: Duration, error_interval: Duration) -> Self {
        Self {
            min_interval,
            error_interval,
            last_message: None,
            last_emitted: None,
            suppressed: 0,
        }
    }

    /// Returns the number of messages suppressed since the last emission if
    /// `message` should be logged now, `None` if it should be dropped
    pub fn check(&mut self, message: &str, severity: Severity) -> Option<u64> {
        self.check_at(message, severity, Instant::now())
    }

    pub fn check_at(&mut self, message: &str, severity: Severity, now: Instant) -> Option<u64> {
        let interval = match severity {
            Severity::Routine => self.min_interval,
            Severity::Error => self.error_interval,
        };

        let is_new = self.last_message.as_deref() != Some(message);
        let expired = self
            .last_emitted
            .map_or(true, |at| now.saturating_duration_since(at) >= interval);

        if is_new || expired {
            let suppressed = std::mem::take(&mut self.suppressed);
            if is_new {
                self.last_message = Some(message.to_string());
            }
            self.last_emitted = Some(now);
            Some(suppressed)
        } else {
            self.suppressed += 1;
            None
        }
    }

    pub fn suppressed(&self) -> u64 {
        self.suppressed
    }
}
