//! Single-channel outlier filter.

use contracts::{ChannelFilterConfig, ChannelStats, FilterChannel};
use tracing::trace;

use crate::history::{self, History};

/// Minimum history length before the statistical check applies
const MIN_STATISTICAL_SAMPLES: usize = 3;

/// Multiplier applied to the (floored) standard deviation
const STD_DEV_MULTIPLIER: f64 = 3.0;

/// Why a candidate value was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    OutOfRange,
    RateOfChange,
    Statistical,
}

impl Rejection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Rejection::OutOfRange => "out_of_range",
            Rejection::RateOfChange => "rate_of_change",
            Rejection::Statistical => "statistical",
        }
    }
}

/// Result of filtering one value
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FilterOutcome {
    /// Value to use downstream (`None` if nothing trustworthy exists)
    pub value: Option<f64>,
    /// Set when the candidate was rejected
    pub rejection: Option<Rejection>,
}

/// Outlier filter state of one numeric stream
///
/// Counters only move forward until [`ChannelFilter::reset`].
#[derive(Debug)]
pub struct ChannelFilter {
    channel: FilterChannel,
    config: ChannelFilterConfig,
    history: History,
    last_accepted: Option<f64>,
    total: u64,
    rejected: u64,
}

impl ChannelFilter {
    pub fn new(channel: FilterChannel, config: ChannelFilterConfig, window_size: usize) -> Self {
        Self {
            channel,
            config,
            history: History::new(window_size),
            last_accepted: None,
            total: 0,
            rejected: 0,
        }
    }

    /// Filter one value, returning the value to use downstream
    pub fn filter(&mut self, value: f64) -> Option<f64> {
        self.evaluate(value).value
    }

    /// Filter one value, also reporting why it was rejected
    pub fn evaluate(&mut self, value: f64) -> FilterOutcome {
        if !self.config.enabled {
            return FilterOutcome {
                value: Some(value),
                rejection: None,
            };
        }

        self.total += 1;

        match self.check(value) {
            Ok(()) => {
                self.history.push(value);
                self.last_accepted = Some(value);
                FilterOutcome {
                    value: Some(value),
                    rejection: None,
                }
            }
            Err(rejection) => {
                let substitute = self.substitute();
                if substitute.is_some() {
                    self.rejected += 1;
                }
                trace!(
                    channel = %self.channel,
                    value,
                    reason = rejection.as_str(),
                    substitute = ?substitute,
                    "value rejected"
                );
                FilterOutcome {
                    value: substitute,
                    rejection: Some(rejection),
                }
            }
        }
    }

    /// Validity test without touching any state
    pub fn check(&self, value: f64) -> Result<(), Rejection> {
        if !(value >= self.config.min && value <= self.config.max) {
            return Err(Rejection::OutOfRange);
        }

        if let Some(last) = self.last_accepted {
            if (value - last).abs() > self.config.max_change {
                return Err(Rejection::RateOfChange);
            }
        }

        if self.history.len() >= MIN_STATISTICAL_SAMPLES {
            let values = self.history.to_vec();
            if let (Some(mean), Some(std)) = (
                history::mean(&values),
                history::population_std_dev(&values),
            ) {
                let threshold = STD_DEV_MULTIPLIER * std.max(self.config.std_floor);
                if (value - mean).abs() > threshold {
                    return Err(Rejection::Statistical);
                }
            }
        }

        Ok(())
    }

    /// Substitute for a rejected value: last accepted, else history median
    fn substitute(&self) -> Option<f64> {
        self.last_accepted
            .or_else(|| history::median(&self.history.to_vec()))
    }

    /// Clear history, last accepted value and counters
    pub fn reset(&mut self) {
        self.history.clear();
        self.last_accepted = None;
        self.total = 0;
        self.rejected = 0;
    }

    pub fn channel(&self) -> FilterChannel {
        self.channel
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn last_accepted(&self) -> Option<f64> {
        self.last_accepted
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn rejected(&self) -> u64 {
        self.rejected
    }

    /// `rejected / total`, 0 before the first call
    pub fn rejection_rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.rejected as f64 / self.total as f64
        }
    }

    pub fn stats(&self) -> ChannelStats {
        ChannelStats {
            channel: self.channel,
            enabled: self.config.enabled,
            total: self.total,
            rejected: self.rejected,
            history_size: self.history.len(),
            last_accepted: self.last_accepted,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temperature_filter() -> ChannelFilter {
        ChannelFilter::new(
            FilterChannel::Temperature,
            ChannelFilterConfig::new(-40.0, 80.0, 5.0, 2.5),
            5,
        )
    }

    #[test]
    fn test_spike_substituted_with_last_accepted() {
        let mut filter = temperature_filter();
        let output: Vec<Option<f64>> = [20.0, 21.0, 19.0, 20.0, 50.0]
            .into_iter()
            .map(|v| filter.filter(v))
            .collect();

        assert_eq!(
            output,
            vec![Some(20.0), Some(21.0), Some(19.0), Some(20.0), Some(20.0)]
        );
        assert_eq!(filter.total(), 5);
        assert_eq!(filter.rejected(), 1);
        assert_eq!(filter.history().to_vec(), vec![20.0, 21.0, 19.0, 20.0]);
    }

    #[test]
    fn test_accepted_value_only_counts_total() {
        let mut filter = temperature_filter();
        filter.filter(22.0);
        assert_eq!(filter.filter(24.5), Some(24.5));
        assert_eq!(filter.total(), 2);
        assert_eq!(filter.rejected(), 0);
        assert_eq!(filter.last_accepted(), Some(24.5));
    }

    #[test]
    fn test_rate_of_change_rejection_counts_both() {
        let mut filter = temperature_filter();
        filter.filter(22.0);
        let outcome = filter.evaluate(28.0);
        assert_eq!(outcome.value, Some(22.0));
        assert_eq!(outcome.rejection, Some(Rejection::RateOfChange));
        assert_eq!(filter.total(), 2);
        assert_eq!(filter.rejected(), 1);
    }

    #[test]
    fn test_out_of_range_with_empty_history_yields_none() {
        let mut filter = temperature_filter();
        let outcome = filter.evaluate(120.0);
        assert_eq!(outcome.value, None);
        assert_eq!(outcome.rejection, Some(Rejection::OutOfRange));
        assert_eq!(filter.total(), 1);
        assert_eq!(filter.rejected(), 0);
    }

    #[test]
    fn test_nan_is_out_of_range() {
        let mut filter = temperature_filter();
        assert_eq!(filter.evaluate(f64::NAN).rejection, Some(Rejection::OutOfRange));
    }

    #[test]
    fn test_statistical_check_uses_std_floor() {
        // Wide max_change so only the statistical check can reject
        let mut filter = ChannelFilter::new(
            FilterChannel::Humidity,
            ChannelFilterConfig::new(0.0, 100.0, 50.0, 1.0),
            5,
        );
        for v in [50.0, 50.0, 50.0] {
            filter.filter(v);
        }
        // std = 0, floor = 1 -> threshold 3
        assert_eq!(filter.evaluate(52.9).rejection, None);
        let outcome = filter.evaluate(57.0);
        assert_eq!(outcome.rejection, Some(Rejection::Statistical));
        assert_eq!(outcome.value, Some(52.9));
    }

    #[test]
    fn test_statistical_check_needs_three_samples() {
        let mut filter = ChannelFilter::new(
            FilterChannel::Humidity,
            ChannelFilterConfig::new(0.0, 100.0, 50.0, 0.5),
            5,
        );
        filter.filter(50.0);
        filter.filter(50.0);
        assert_eq!(filter.filter(60.0), Some(60.0));
    }

    #[test]
    fn test_disabled_channel_passes_through_untracked() {
        let mut filter = ChannelFilter::new(
            FilterChannel::VocIndex,
            ChannelFilterConfig::disabled(),
            5,
        );
        assert_eq!(filter.filter(1000.0), Some(1000.0));
        assert_eq!(filter.total(), 0);
        assert!(filter.history().is_empty());
    }

    #[test]
    fn test_reset_clears_everything() {
        let mut filter = temperature_filter();
        for v in [20.0, 21.0, 60.0, 20.5] {
            filter.filter(v);
        }
        assert!(filter.rejected() > 0);

        filter.reset();
        let stats = filter.stats();
        assert_eq!(stats.total, 0);
        assert_eq!(stats.rejected, 0);
        assert_eq!(stats.history_size, 0);
        assert_eq!(stats.last_accepted, None);
        assert_eq!(filter.rejection_rate(), 0.0);
    }

    #[test]
    fn test_rejection_rate_bounds() {
        let mut filter = temperature_filter();
        assert_eq!(filter.rejection_rate(), 0.0);
        for v in [20.0, 90.0, 90.0, 21.0] {
            filter.filter(v);
        }
        let rate = filter.rejection_rate();
        assert!((0.0..=1.0).contains(&rate));
        assert!((rate - 0.5).abs() < 1e-12);
    }
}
