//! Per-sensor filter holding one [`ChannelFilter`] per numeric channel.

use contracts::{ChannelFilterConfig, FilterChannel, FilterConfig, FilterStats, SensorKind};
use tracing::debug;

use crate::channel::{ChannelFilter, FilterOutcome};

/// Outlier filter of one sensor
///
/// Channels the sensor kind exposes but the configuration leaves out are
/// created disabled, so every value of those channels passes through.
#[derive(Debug)]
pub struct DataFilter {
    kind: SensorKind,
    window_size: usize,
    channels: Vec<ChannelFilter>,
}

impl DataFilter {
    pub fn new(kind: SensorKind, config: &FilterConfig) -> Self {
        let channels = kind
            .filter_channels()
            .iter()
            .map(|&channel| {
                let channel_config = config
                    .channel(channel)
                    .copied()
                    .unwrap_or_else(ChannelFilterConfig::disabled);
                ChannelFilter::new(channel, channel_config, config.window_size)
            })
            .collect();

        debug!(sensor = %kind, window_size = config.window_size, "data filter created");

        Self {
            kind,
            window_size: config.window_size,
            channels,
        }
    }

    /// Filter with the tuned defaults of `kind`
    pub fn with_defaults(kind: SensorKind) -> Self {
        Self::new(kind, &FilterConfig::for_kind(kind))
    }

    pub fn kind(&self) -> SensorKind {
        self.kind
    }

    pub fn channel(&self, channel: FilterChannel) -> Option<&ChannelFilter> {
        self.channels.iter().find(|c| c.channel() == channel)
    }

    fn channel_mut(&mut self, channel: FilterChannel) -> Option<&mut ChannelFilter> {
        self.channels.iter_mut().find(|c| c.channel() == channel)
    }

    /// Filter a value of `channel`
    ///
    /// A channel this sensor does not have passes the value through.
    pub fn filter(&mut self, channel: FilterChannel, value: f64) -> Option<f64> {
        self.evaluate(channel, value).value
    }

    pub fn evaluate(&mut self, channel: FilterChannel, value: f64) -> FilterOutcome {
        match self.channel_mut(channel) {
            Some(filter) => filter.evaluate(value),
            None => FilterOutcome {
                value: Some(value),
                rejection: None,
            },
        }
    }

    /// Filter a reading's two channels; absent inputs stay absent
    pub fn filter_pair(
        &mut self,
        first: Option<f64>,
        second: Option<f64>,
    ) -> (Option<f64>, Option<f64>) {
        let [a, b] = match self.kind.filter_channels() {
            [a, b] => [*a, *b],
            _ => return (first, second),
        };
        (
            first.and_then(|v| self.filter(a, v)),
            second.and_then(|v| self.filter(b, v)),
        )
    }

    /// Clear history and counters of every channel
    pub fn reset(&mut self) {
        for channel in &mut self.channels {
            channel.reset();
        }
        debug!(sensor = %self.kind, "data filter reset");
    }

    pub fn stats(&self) -> FilterStats {
        FilterStats::from_channels(
            self.window_size,
            self.channels.iter().map(ChannelFilter::stats).collect(),
        )
    }
}
