//! Peak exponentially-weighted moving average.
//!
//! Tracks a decaying "peak" of observed latencies. A plain EWMA is kept as a
//! bounded history; whenever an observation exceeds the previous peak, weight
//! is shifted from older entries to the newest one so the tracked peak reacts
//! immediately to spikes and then decays like an ordinary EWMA.

use std::collections::VecDeque;

use crate::stats::StatsError;

/// Number of smoothed values retained.
pub const HISTORY_LEN: usize = 100;

/// Peak assumed before anything has been observed, in milliseconds.
pub const BOOTSTRAP_PEAK: f64 = 1000.0;

#[derive(Debug, Clone)]
pub struct PeakEstimator {
    history: VecDeque<f64>,
    alpha: f64,
    beta: f64,
}

impl PeakEstimator {
    /// Creates an estimator with smoothing factor `alpha`.
    ///
    /// # Errors
    /// - `StatsError::SmoothingOutOfRange` - `alpha` is not in `(0, 1]`
    pub fn new(alpha: f64) -> Result<Self, StatsError> {
        if !(alpha > 0.0 && alpha <= 1.0) {
            return Err(StatsError::SmoothingOutOfRange { value: alpha });
        }
        Ok(Self {
            history: VecDeque::with_capacity(HISTORY_LEN),
            alpha,
            beta: alpha / 4.0,
        })
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    /// Feeds one observation.
    pub fn update(&mut self, value: f64) {
        let previous = self.history.back().copied();
        let prev_peak = previous.unwrap_or(BOOTSTRAP_PEAK);
        let new_peak = self.alpha * value + (1.0 - self.alpha) * prev_peak;

        self.history.push_back(new_peak);
        if self.history.len() > HISTORY_LEN {
            self.history.pop_front();
        }

        // Spike redistribution needs a real previous peak to compare against.
        if previous.is_some() && value > prev_peak {
            let weight_delta = self.beta * (new_peak / prev_peak);
            let last = self.history.len() - 1;
            for (index, entry) in self.history.iter_mut().enumerate() {
                if index == last {
                    *entry *= 1.0 + weight_delta;
                } else {
                    *entry *= 1.0 - weight_delta;
                }
            }
        }
    }

    /// Current peak, or `None` before the first observation.
    pub fn peak(&self) -> Option<f64> {
        self.history.back().copied()
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }
}
