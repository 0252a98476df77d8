//! Bounded history of accepted values and the statistics computed over it.

use std::fmt;

use ringbuf::{traits::*, HeapRb};

/// Insertion-ordered window of the last `capacity` accepted values
///
/// When full, pushing evicts the oldest value.
pub struct History {
    values: HeapRb<f64>,
    capacity: usize,
}

impl fmt::Debug for History {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("History")
            .field("len", &self.values.occupied_len())
            .field("capacity", &self.capacity)
            .finish()
    }
}

impl History {
    /// Create an empty history; a zero capacity is treated as one
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            values: HeapRb::new(capacity),
            capacity,
        }
    }

    /// Append a value, evicting the oldest one if the window is full
    #[inline]
    pub fn push(&mut self, value: f64) {
        if self.values.is_full() {
            let _ = self.values.try_pop();
        }
        let _ = self.values.try_push(value);
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.values.occupied_len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Values oldest first
    pub fn to_vec(&self) -> Vec<f64> {
        self.values.iter().copied().collect()
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }
}

/// Arithmetic mean, `None` for an empty slice
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Population standard deviation (divides by `n`), `None` for an empty slice
pub fn population_std_dev(values: &[f64]) -> Option<f64> {
    let mean = mean(values)?;
    let variance =
        values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    Some(variance.sqrt())
}

/// Median; for an even count the mean of the two middle values
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}
