//! Sliding-window latency statistics.

use std::collections::VecDeque;
use std::num::NonZeroUsize;

use serde::Serialize;

/// Errors raised by statistics helpers when arguments leave their domain.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum StatsError {
    /// Percentile requests must lie strictly between 0 and 100
    #[error("Percentile {value} is outside (0, 100)")]
    PercentileOutOfRange {
        /// Requested percentile
        value: f64,
    },

    /// Smoothing factors must lie in (0, 1]
    #[error("Smoothing factor {value} is outside (0, 1]")]
    SmoothingOutOfRange {
        /// Requested smoothing factor
        value: f64,
    },

    /// A window must be able to hold at least one sample
    #[error("Window capacity must be greater than zero")]
    EmptyWindow,
}

/// Bounded window over the most recent samples; the oldest is evicted first.
#[derive(Debug, Clone)]
pub struct LatencyWindow {
    samples: VecDeque<f64>,
    capacity: usize,
}

impl LatencyWindow {
    /// Creates a window holding at most `capacity` samples.
    ///
    /// # Errors
    /// - `StatsError::EmptyWindow` - `capacity` is zero
    pub fn new(capacity: usize) -> Result<Self, StatsError> {
        NonZeroUsize::new(capacity)
            .map(Self::bounded)
            .ok_or(StatsError::EmptyWindow)
    }

    /// Creates a window whose capacity is known to be non-zero.
    pub fn bounded(capacity: NonZeroUsize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity.get()),
            capacity: capacity.get(),
        }
    }

    pub fn record(&mut self, value: f64) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(value);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn mean(&self) -> Option<f64> {
        if self.samples.is_empty() {
            return None;
        }
        Some(self.samples.iter().sum::<f64>() / self.samples.len() as f64)
    }

    pub fn max(&self) -> Option<f64> {
        self.samples.iter().copied().reduce(f64::max)
    }

    pub fn min(&self) -> Option<f64> {
        self.samples.iter().copied().reduce(f64::min)
    }

    /// Nearest-rank percentile over the current window.
    ///
    /// Returns `Ok(None)` when the window is empty.
    ///
    /// # Errors
    /// - `StatsError::PercentileOutOfRange` - `p` is not strictly between 0 and 100
    pub fn percentile(&self, p: f64) -> Result<Option<f64>, StatsError> {
        if !(p > 0.0 && p < 100.0) {
            return Err(StatsError::PercentileOutOfRange { value: p });
        }
        if self.samples.is_empty() {
            return Ok(None);
        }

        let mut sorted: Vec<f64> = self.samples.iter().copied().collect();
        sorted.sort_by(f64::total_cmp);

        let rank = (p / 100.0 * sorted.len() as f64).ceil() as usize;
        let index = rank.clamp(1, sorted.len()) - 1;
        Ok(Some(sorted[index]))
    }

    /// Summary of the window at the usual reporting percentiles.
    pub fn summary(&self) -> LatencySummary {
        let at = |p: f64| self.percentile(p).ok().flatten();
        LatencySummary {
            samples: self.samples.len(),
            mean: self.mean(),
            p50: at(50.0),
            p90: at(90.0),
            p99: at(99.0),
            max: self.max(),
        }
    }
}

/// Point-in-time view of a [`LatencyWindow`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LatencySummary {
    pub samples: usize,
    pub mean: Option<f64>,
    pub p50: Option<f64>,
    pub p90: Option<f64>,
    pub p99: Option<f64>,
    pub max: Option<f64>,
}
