//! # Data Filter
//!
//! Stateful outlier rejection for noisy environmental readings.
//!
//! Each numeric stream gets its own [`ChannelFilter`]: a bounded history of
//! accepted values, the last accepted value and running counters. A candidate
//! value is accepted only if it passes, in order:
//!
//! 1. the range check (`min..=max`)
//! 2. the rate-of-change check against the last accepted value
//! 3. the statistical check (`|v - mean| <= 3 * max(std, std_floor)`) once
//!    the history holds at least three values
//!
//! A rejected value is substituted by the last accepted value, or the median
//! of the history, or nothing at all.
//!
//! [`DataFilter`] bundles the (up to two) channels of one sensor behind a
//! shared window size.
//!
//! ## Example
//!
//! ```
//! use contracts::{ChannelFilterConfig, FilterChannel};
//! use data_filter::ChannelFilter;
//!
//! let mut filter = ChannelFilter::new(
//!     FilterChannel::Temperature,
//!     ChannelFilterConfig::new(5.0, 40.0, 5.0, 2.5),
//!     5,
//! );
//! assert_eq!(filter.filter(21.0), Some(21.0));
//! assert_eq!(filter.filter(35.0), Some(21.0));
//! ```

mod channel;
mod filter;
mod history;

pub use channel::{ChannelFilter, FilterOutcome, Rejection};
pub use filter::DataFilter;
pub use history::{mean, median, population_std_dev, History};
