//! Metrics collected from item lifecycle notifications.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use surge_core::stats::LatencySummary;
use surge_core::{LatencyWindow, LifecycleObserver, StatsError, WorkItem, WorkerId};

/// Outcome counts for one worker.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct WorkerTally {
    pub served: u64,
    pub dropped: u64,
}

/// Metrics collected during simulation.
#[derive(Debug, Clone)]
pub struct SimulationMetrics {
    pub created: u64,
    pub completed: u64,
    pub dropped: u64,
    per_worker: BTreeMap<WorkerId, WorkerTally>,
    /// Age at completion of served items
    age: LatencyWindow,
    /// Time spent active for served items
    processing: LatencyWindow,
}

impl SimulationMetrics {
    /// Creates a collector whose latency windows keep `window` samples.
    ///
    /// # Errors
    /// - `StatsError::EmptyWindow` - `window` is zero
    pub fn new(window: usize) -> Result<Self, StatsError> {
        Ok(Self {
            created: 0,
            completed: 0,
            dropped: 0,
            per_worker: BTreeMap::new(),
            age: LatencyWindow::new(window)?,
            processing: LatencyWindow::new(window)?,
        })
    }

    pub fn record_created(&mut self) {
        self.created += 1;
    }

    /// Records one terminal item held by `worker`.
    pub fn record_terminal(&mut self, item: &WorkItem, worker: WorkerId) {
        let tally = self.per_worker.entry(worker).or_default();
        if item.is_dropped() {
            self.dropped += 1;
            tally.dropped += 1;
        } else {
            self.completed += 1;
            tally.served += 1;
            self.age.record(item.age_ms);
            self.processing.record(item.processing_time_ms);
        }
    }

    pub fn worker_tally(&self, worker: WorkerId) -> WorkerTally {
        self.per_worker.get(&worker).copied().unwrap_or_default()
    }

    pub fn age(&self) -> &LatencyWindow {
        &self.age
    }

    pub fn processing(&self) -> &LatencyWindow {
        &self.processing
    }

    /// Fraction of created items that were dropped, zero before any item.
    pub fn drop_rate(&self) -> f64 {
        if self.created == 0 {
            return 0.0;
        }
        self.dropped as f64 / self.created as f64
    }

    /// Condenses the metrics for a report covering `simulated` time.
    pub fn summarize(&self, in_flight: u64, simulated: Duration) -> MetricsSummary {
        let seconds = simulated.as_secs_f64();
        let throughput_per_sec = if seconds > 0.0 {
            self.completed as f64 / seconds
        } else {
            0.0
        };

        MetricsSummary {
            created: self.created,
            completed: self.completed,
            dropped: self.dropped,
            in_flight,
            drop_rate: self.drop_rate(),
            throughput_per_sec,
            age_ms: self.age.summary(),
            processing_ms: self.processing.summary(),
        }
    }
}

/// Serializable snapshot of [`SimulationMetrics`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSummary {
    pub created: u64,
    pub completed: u64,
    pub dropped: u64,
    pub in_flight: u64,
    pub drop_rate: f64,
    pub throughput_per_sec: f64,
    pub age_ms: LatencySummary,
    pub processing_ms: LatencySummary,
}

/// Observer feeding a shared [`SimulationMetrics`].
#[derive(Debug, Clone)]
pub struct MetricsRecorder {
    metrics: Arc<Mutex<SimulationMetrics>>,
}

impl MetricsRecorder {
    pub fn new(metrics: SimulationMetrics) -> Self {
        Self {
            metrics: Arc::new(Mutex::new(metrics)),
        }
    }

    /// Copy of the metrics collected so far.
    pub fn snapshot(&self) -> SimulationMetrics {
        self.metrics.lock().clone()
    }
}

impl LifecycleObserver for MetricsRecorder {
    fn on_created(&mut self, _item: &WorkItem) {
        self.metrics.lock().record_created();
    }

    fn on_completed(&mut self, item: &WorkItem, worker: WorkerId) {
        self.metrics.lock().record_terminal(item, worker);
    }
}
