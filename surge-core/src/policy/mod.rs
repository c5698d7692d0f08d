//! Scheduling policies: pluggable strategies that pick a worker per item.
//!
//! Every policy owns its per-worker state keyed by [`WorkerId`]; nothing is
//! shared between policy instances. Swapping policies at runtime goes through
//! [`SchedulingPolicy::on_activate`], which lets stateful policies rebuild
//! their counters from the items currently in flight.

mod dynamic_weighted;
mod least_connections;
mod peak_ewma;
mod round_robin;
mod uniform_random;
mod weighted_random;
mod weighted_round_robin;

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub use dynamic_weighted::DynamicWeightedRoundRobin;
pub use least_connections::LeastConnections;
pub use peak_ewma::PeakEwma;
pub use round_robin::RoundRobin;
pub use uniform_random::UniformRandom;
pub use weighted_random::WeightedRandom;
pub use weighted_round_robin::WeightedRoundRobin;

use crate::clock::RandomSource;
use crate::item::WorkItem;
use crate::stats::StatsError;
use crate::worker::{Worker, WorkerId};

/// Errors raised by scheduling policies.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum SchedulingError {
    /// `choose` was called with no workers to pick from
    #[error("Cannot choose a worker from an empty worker set")]
    NoWorkers,

    /// Policy name did not match any known policy
    #[error("Unknown scheduling policy: {name}")]
    UnknownPolicy {
        /// Name that failed to parse
        name: String,
    },

    /// A policy picked a worker that is not part of the current set
    #[error("Policy chose {worker}, which is not in the worker set")]
    UnknownWorker {
        /// Worker the policy returned
        worker: WorkerId,
    },

    /// Policy parameters were rejected
    #[error("Invalid policy parameter: {0}")]
    InvalidParameter(#[from] StatsError),
}

/// Strategy deciding which worker receives each new item.
pub trait SchedulingPolicy: Send {
    /// Which variant this is.
    fn kind(&self) -> PolicyKind;

    /// Picks the worker for `item` among the live `workers`.
    ///
    /// # Errors
    /// - `SchedulingError::NoWorkers` - `workers` is empty
    fn choose(
        &mut self,
        item: &WorkItem,
        workers: &[Worker],
        rng: &mut dyn RandomSource,
    ) -> Result<WorkerId, SchedulingError>;

    /// Called exactly once per item when it completes or is dropped.
    fn on_completion(&mut self, _item: &WorkItem) {}

    /// Called when this policy becomes the active one.
    fn on_activate(&mut self, _workers: &[Worker]) {}

    /// Called after `worker` leaves the set and its items have completed.
    /// Ids are never reused, so any state kept for it can go.
    fn on_worker_removed(&mut self, _worker: WorkerId) {}

    /// Connection count tracked for `worker`, for policies that track one.
    fn connections(&self, _worker: WorkerId) -> Option<u32> {
        None
    }
}

/// Registry of the available policies.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum PolicyKind {
    RoundRobin,
    WeightedRandom,
    WeightedRoundRobin,
    DynamicWeightedRoundRobin,
    LeastConnections,
    PeakEwma,
    Random,
}

impl PolicyKind {
    pub const ALL: [PolicyKind; 7] = [
        PolicyKind::RoundRobin,
        PolicyKind::WeightedRandom,
        PolicyKind::WeightedRoundRobin,
        PolicyKind::DynamicWeightedRoundRobin,
        PolicyKind::LeastConnections,
        PolicyKind::PeakEwma,
        PolicyKind::Random,
    ];

    /// Stable kebab-case name.
    pub fn as_str(self) -> &'static str {
        match self {
            PolicyKind::RoundRobin => "round-robin",
            PolicyKind::WeightedRandom => "weighted-random",
            PolicyKind::WeightedRoundRobin => "weighted-round-robin",
            PolicyKind::DynamicWeightedRoundRobin => "dynamic-weighted-round-robin",
            PolicyKind::LeastConnections => "least-connections",
            PolicyKind::PeakEwma => "peak-ewma",
            PolicyKind::Random => "random",
        }
    }

    /// Builds a fresh instance of this policy.
    ///
    /// `pewma_smoothing` is only used by [`PolicyKind::PeakEwma`].
    ///
    /// # Errors
    /// - `SchedulingError::InvalidParameter` - smoothing outside `(0, 1]`
    pub fn build(
        self,
        pewma_smoothing: f64,
    ) -> Result<Box<dyn SchedulingPolicy>, SchedulingError> {
        let policy: Box<dyn SchedulingPolicy> = match self {
            PolicyKind::RoundRobin => Box::new(RoundRobin::new()),
            PolicyKind::WeightedRandom => Box::new(WeightedRandom),
            PolicyKind::WeightedRoundRobin => Box::new(WeightedRoundRobin::new()),
            PolicyKind::DynamicWeightedRoundRobin => Box::new(DynamicWeightedRoundRobin::new()),
            PolicyKind::LeastConnections => Box::new(LeastConnections::new()),
            PolicyKind::PeakEwma => Box::new(PeakEwma::new(pewma_smoothing)?),
            PolicyKind::Random => Box::new(UniformRandom),
        };
        Ok(policy)
    }
}

impl fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PolicyKind {
    type Err = SchedulingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace(['_', ' '], "-");
        let kind = match normalized.as_str() {
            "round-robin" | "rr" => PolicyKind::RoundRobin,
            "weighted-random" => PolicyKind::WeightedRandom,
            "weighted-round-robin" | "wrr" => PolicyKind::WeightedRoundRobin,
            "dynamic-weighted-round-robin" | "dynamic-wrr" => {
                PolicyKind::DynamicWeightedRoundRobin
            }
            "least-connections" | "least-conn" => PolicyKind::LeastConnections,
            "peak-ewma" | "pewma" => PolicyKind::PeakEwma,
            "random" => PolicyKind::Random,
            _ => {
                return Err(SchedulingError::UnknownPolicy {
                    name: s.to_string(),
                });
            }
        };
        Ok(kind)
    }
}

/// Per-worker active connection counts.
#[derive(Debug, Clone, Default)]
pub(crate) struct ConnectionTable {
    counts: HashMap<WorkerId, u32>,
}

impl ConnectionTable {
    pub(crate) fn get(&self, worker: WorkerId) -> u32 {
        self.counts.get(&worker).copied().unwrap_or(0)
    }

    pub(crate) fn increment(&mut self, worker: WorkerId) {
        *self.counts.entry(worker).or_insert(0) += 1;
    }

    pub(crate) fn decrement(&mut self, worker: WorkerId) {
        if let Some(count) = self.counts.get_mut(&worker) {
            *count = count.saturating_sub(1);
        }
    }

    pub(crate) fn forget(&mut self, worker: WorkerId) {
        self.counts.remove(&worker);
    }

    /// Replaces all counts with a tally of in-flight items by destination.
    pub(crate) fn rebuild(&mut self, workers: &[Worker]) {
        self.counts.clear();
        for item in workers.iter().flat_map(|worker| worker.items()) {
            if let Some(destination) = item.destination() {
                self.increment(destination);
            }
        }
    }
}

pub(crate) fn ensure_workers(workers: &[Worker]) -> Result<(), SchedulingError> {
    if workers.is_empty() {
        return Err(SchedulingError::NoWorkers);
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::clock::RandomSource;
    use crate::item::{ItemId, WorkItem};
    use crate::worker::{Worker, WorkerId};

    /// Replays a fixed sequence of samples, cycling when exhausted.
    pub(crate) struct SequenceRng {
        values: Vec<f64>,
        next: usize,
    }

    impl SequenceRng {
        pub(crate) fn new(values: &[f64]) -> Self {
            Self {
                values: values.to_vec(),
                next: 0,
            }
        }
    }

    impl RandomSource for SequenceRng {
        fn next_f64(&mut self) -> f64 {
            let value = self.values[self.next % self.values.len()];
            self.next += 1;
            value
        }
    }

    pub(crate) fn workers_with_rates(rates: &[f64]) -> Vec<Worker> {
        rates
            .iter()
            .enumerate()
            .map(|(i, &rate)| Worker::new(WorkerId::new(i as u32), rate, 4))
            .collect()
    }

    pub(crate) fn item(id: u64) -> WorkItem {
        WorkItem::new(ItemId::new(id), 10.0, 0.0)
    }

    pub(crate) fn routed(id: u64, worker: WorkerId) -> WorkItem {
        let mut item = item(id);
        item.assign(worker);
        item
    }
}
