//! Latency-aware selection using a peak EWMA per worker.

use std::collections::HashMap;

use super::{ConnectionTable, PolicyKind, SchedulingError, SchedulingPolicy, ensure_workers};
use crate::clock::RandomSource;
use crate::item::WorkItem;
use crate::pewma::{BOOTSTRAP_PEAK, PeakEstimator};
use crate::stats::StatsError;
use crate::worker::{Worker, WorkerId};

/// Latency recorded for an item that was dropped, in milliseconds.
pub const DROP_PENALTY_MS: f64 = 5000.0;

/// Scores each worker as `(connections + 1) * peak latency` and picks the
/// strict minimum. On equal scores the earliest worker in list order wins.
#[derive(Debug)]
pub struct PeakEwma {
    template: PeakEstimator,
    connections: ConnectionTable,
    estimators: HashMap<WorkerId, PeakEstimator>,
}

impl PeakEwma {
    /// Creates the policy; estimators use `smoothing` as their alpha.
    ///
    /// # Errors
    /// - `StatsError::SmoothingOutOfRange` - `smoothing` is not in `(0, 1]`
    pub fn new(smoothing: f64) -> Result<Self, StatsError> {
        Ok(Self {
            template: PeakEstimator::new(smoothing)?,
            connections: ConnectionTable::default(),
            estimators: HashMap::new(),
        })
    }

    /// Current peak latency for `worker`, if it has any observations.
    pub fn peak(&self, worker: WorkerId) -> Option<f64> {
        self.estimators.get(&worker).and_then(PeakEstimator::peak)
    }

    fn score(&self, worker: WorkerId) -> f64 {
        let connections = f64::from(self.connections.get(worker));
        (connections + 1.0) * self.peak(worker).unwrap_or(BOOTSTRAP_PEAK)
    }

    /// Estimators are created lazily on first reference to a worker.
    fn estimator(&mut self, worker: WorkerId) -> &mut PeakEstimator {
        let template = &self.template;
        self.estimators
            .entry(worker)
            .or_insert_with(|| template.clone())
    }
}

impl SchedulingPolicy for PeakEwma {
    fn kind(&self) -> PolicyKind {
        PolicyKind::PeakEwma
    }

    fn choose(
        &mut self,
        _item: &WorkItem,
        workers: &[Worker],
        _rng: &mut dyn RandomSource,
    ) -> Result<WorkerId, SchedulingError> {
        ensure_workers(workers)?;

        let mut best = workers[0].id();
        let mut best_score = self.score(best);
        for worker in &workers[1..] {
            let score = self.score(worker.id());
            if score < best_score {
                best = worker.id();
                best_score = score;
            }
        }

        self.connections.increment(best);
        Ok(best)
    }

    fn on_completion(&mut self, item: &WorkItem) {
        let Some(destination) = item.destination() else {
            return;
        };
        self.connections.decrement(destination);

        let observed = if item.is_dropped() {
            DROP_PENALTY_MS
        } else {
            item.age_ms
        };
        self.estimator(destination).update(observed);
    }

    fn on_activate(&mut self, workers: &[Worker]) {
        self.connections.rebuild(workers);
    }

    fn on_worker_removed(&mut self, worker: WorkerId) {
        self.connections.forget(worker);
        self.estimators.remove(&worker);
    }

    fn connections(&self, worker: WorkerId) -> Option<u32> {
        Some(self.connections.get(worker))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::DeterministicRng;
    use crate::item::{ItemId, WorkItem};
    use crate::policy::test_support::{item, workers_with_rates};

    fn served(worker: u32, age_ms: f64) -> WorkItem {
        let mut item = WorkItem::new(ItemId::new(0), 1.0, 0.0);
        item.assign(WorkerId::new(worker));
        item.mark_completed(age_ms);
        item
    }

    #[test]
    fn test_ties_go_to_first_worker() {
        let workers = workers_with_rates(&[1.0, 1.0, 1.0]);
        let mut policy = PeakEwma::new(0.5).unwrap();
        let mut rng = DeterministicRng::from_seed(0);

        let first = policy.choose(&item(0), &workers, &mut rng).unwrap();
        assert_eq!(first, WorkerId::new(0));
        // Worker 0 now scores 2000, the others 1000; worker 1 is first of those.
        let second = policy.choose(&item(1), &workers, &mut rng).unwrap();
        assert_eq!(second, WorkerId::new(1));
    }

    #[test]
    fn test_low_latency_worker_attracts_load() {
        let workers = workers_with_rates(&[1.0, 1.0]);
        let mut policy = PeakEwma::new(0.5).unwrap();
        let mut rng = DeterministicRng::from_seed(0);

        policy.on_completion(&served(1, 20.0));
        assert_eq!(policy.peak(WorkerId::new(1)), Some(510.0));

        // Worker 1 scores (n + 1) * 510 against 1000 for idle worker 0.
        let picks: Vec<u32> = (0..2)
            .map(|i| policy.choose(&item(i), &workers, &mut rng).unwrap().as_u32())
            .collect();
        assert_eq!(picks, vec![1, 0]);
        assert_eq!(policy.connections(WorkerId::new(1)), Some(1));
    }

    #[test]
    fn test_drops_are_penalized() {
        let mut policy = PeakEwma::new(0.5).unwrap();
        let mut dropped = WorkItem::new(ItemId::new(0), 1.0, 0.0);
        dropped.assign(WorkerId::new(0));
        dropped.mark_dropped(1.0);

        policy.on_completion(&dropped);
        assert_eq!(policy.peak(WorkerId::new(0)), Some(0.5 * 5000.0 + 0.5 * 1000.0));
    }

    #[test]
    fn test_completion_releases_connection() {
        let workers = workers_with_rates(&[1.0]);
        let mut policy = PeakEwma::new(0.5).unwrap();
        let mut rng = DeterministicRng::from_seed(0);

        policy.choose(&item(0), &workers, &mut rng).unwrap();
        assert_eq!(policy.connections(WorkerId::new(0)), Some(1));
        policy.on_completion(&served(0, 30.0));
        assert_eq!(policy.connections(WorkerId::new(0)), Some(0));
    }

    #[test]
    fn test_removed_worker_estimator_is_released() {
        let mut policy = PeakEwma::new(0.5).unwrap();
        policy.on_completion(&served(0, 20.0));
        policy.on_completion(&served(1, 40.0));

        policy.on_worker_removed(WorkerId::new(1));
        assert_eq!(policy.estimators.len(), 1);
        assert_eq!(policy.peak(WorkerId::new(1)), None);
        assert_eq!(policy.peak(WorkerId::new(0)), Some(510.0));
    }
}
