//! Weighted round robin whose weights come from observed latency.

use std::collections::HashMap;
use std::num::NonZeroUsize;

use super::weighted_round_robin::QuotaCursor;
use super::{PolicyKind, SchedulingError, SchedulingPolicy, ensure_workers};
use crate::clock::RandomSource;
use crate::item::WorkItem;
use crate::stats::LatencyWindow;
use crate::worker::{Worker, WorkerId};

/// Completions remembered per worker.
const HISTORY_SLOTS: NonZeroUsize = match NonZeroUsize::new(3) {
    Some(slots) => slots,
    None => panic!("latency history needs at least one slot"),
};

/// Largest run of consecutive picks a worker can earn.
const MAX_QUOTA: f64 = 3.0;

/// Quota for workers that have not completed anything yet. Keeps them
/// sampled so they can build a history.
const UNMEASURED_QUOTA: u32 = 1;

/// Quotas derive from each worker's mean processing time over its last few
/// completions: `3 - ceil(((mean - min) / max) * 3)`, where `min` and `max`
/// range over the measured workers. Faster workers get longer runs.
#[derive(Debug, Default)]
pub struct DynamicWeightedRoundRobin {
    cursor: QuotaCursor,
    latencies: HashMap<WorkerId, LatencyWindow>,
}

impl DynamicWeightedRoundRobin {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mean of the recorded processing times for `worker`.
    pub fn mean_latency(&self, worker: WorkerId) -> Option<f64> {
        self.latencies.get(&worker).and_then(LatencyWindow::mean)
    }

    fn quotas(&self, workers: &[Worker]) -> HashMap<WorkerId, u32> {
        let means: Vec<(WorkerId, Option<f64>)> = workers
            .iter()
            .map(|worker| (worker.id(), self.mean_latency(worker.id())))
            .collect();

        let measured = means.iter().filter_map(|(_, mean)| *mean);
        let min = measured.clone().fold(f64::INFINITY, f64::min);
        let max = measured.fold(f64::NEG_INFINITY, f64::max);

        means
            .into_iter()
            .map(|(id, mean)| {
                let quota = match mean {
                    None => UNMEASURED_QUOTA,
                    Some(mean) => {
                        let spread = if max > 0.0 { (mean - min) / max } else { 0.0 };
                        (MAX_QUOTA - (spread * MAX_QUOTA).ceil()).clamp(0.0, MAX_QUOTA) as u32
                    }
                };
                (id, quota)
            })
            .collect()
    }
}

impl SchedulingPolicy for DynamicWeightedRoundRobin {
    fn kind(&self) -> PolicyKind {
        PolicyKind::DynamicWeightedRoundRobin
    }

    fn choose(
        &mut self,
        _item: &WorkItem,
        workers: &[Worker],
        _rng: &mut dyn RandomSource,
    ) -> Result<WorkerId, SchedulingError> {
        ensure_workers(workers)?;
        let quotas = self.quotas(workers);
        Ok(self.cursor.select(workers, |worker| {
            quotas.get(&worker.id()).copied().unwrap_or(UNMEASURED_QUOTA)
        }))
    }

    fn on_completion(&mut self, item: &WorkItem) {
        if item.is_dropped() {
            return;
        }
        if let Some(destination) = item.destination() {
            self.latencies
                .entry(destination)
                .or_insert_with(|| LatencyWindow::bounded(HISTORY_SLOTS))
                .record(item.processing_time_ms);
        }
    }

    fn on_worker_removed(&mut self, worker: WorkerId) {
        self.latencies.remove(&worker);
        self.cursor.forget(worker);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::DeterministicRng;
    use crate::item::{ItemId, WorkItem};
    use crate::policy::test_support::{item, workers_with_rates};

    fn finished(worker: u32, processing_ms: f64) -> WorkItem {
        let mut item = WorkItem::new(ItemId::new(0), 1.0, 0.0);
        item.assign(WorkerId::new(worker));
        item.processing_time_ms = processing_ms;
        item.mark_completed(processing_ms);
        item
    }

    #[test]
    fn test_unmeasured_workers_get_one_pick_each() {
        let workers = workers_with_rates(&[1.0, 5.0, 9.0]);
        let mut policy = DynamicWeightedRoundRobin::new();
        let mut rng = DeterministicRng::from_seed(0);

        let picks: Vec<u32> = (0..6)
            .map(|i| policy.choose(&item(i), &workers, &mut rng).unwrap().as_u32())
            .collect();
        assert_eq!(picks, vec![0, 1, 2, 0, 1, 2]);
    }

    #[test]
    fn test_history_keeps_last_three_completions() {
        let mut policy = DynamicWeightedRoundRobin::new();
        for ms in [100.0, 10.0, 20.0, 30.0] {
            policy.on_completion(&finished(0, ms));
        }
        assert_eq!(policy.mean_latency(WorkerId::new(0)), Some(20.0));
    }

    #[test]
    fn test_removed_worker_history_is_released() {
        let mut policy = DynamicWeightedRoundRobin::new();
        policy.on_completion(&finished(0, 10.0));
        policy.on_completion(&finished(1, 30.0));

        policy.on_worker_removed(WorkerId::new(1));
        assert_eq!(policy.latencies.len(), 1);
        assert_eq!(policy.mean_latency(WorkerId::new(1)), None);
        assert_eq!(policy.mean_latency(WorkerId::new(0)), Some(10.0));
    }

    #[test]
    fn test_dropped_items_do_not_feed_history() {
        let mut policy = DynamicWeightedRoundRobin::new();
        let mut dropped = WorkItem::new(ItemId::new(1), 1.0, 0.0);
        dropped.assign(WorkerId::new(0));
        dropped.mark_dropped(0.0);
        policy.on_completion(&dropped);
        assert_eq!(policy.mean_latency(WorkerId::new(0)), None);
    }

    #[test]
    fn test_quotas_favor_faster_workers() {
        let workers = workers_with_rates(&[1.0, 1.0, 1.0]);
        let mut policy = DynamicWeightedRoundRobin::new();
        policy.on_completion(&finished(0, 10.0));
        policy.on_completion(&finished(1, 40.0));

        let quotas = policy.quotas(&workers);
        // min 10, max 40: fastest gets 3, slowest 3 - ceil(0.75 * 3) = 0.
        assert_eq!(quotas[&WorkerId::new(0)], 3);
        assert_eq!(quotas[&WorkerId::new(1)], 0);
        assert_eq!(quotas[&WorkerId::new(2)], UNMEASURED_QUOTA);

        let mut rng = DeterministicRng::from_seed(0);
        let picks: Vec<u32> = (0..8)
            .map(|i| policy.choose(&item(i), &workers, &mut rng).unwrap().as_u32())
            .collect();
        assert_eq!(picks, vec![0, 0, 0, 2, 0, 0, 0, 2]);
    }

    #[test]
    fn test_identical_latencies_share_full_quota() {
        let workers = workers_with_rates(&[1.0, 1.0]);
        let mut policy = DynamicWeightedRoundRobin::new();
        policy.on_completion(&finished(0, 25.0));
        policy.on_completion(&finished(1, 25.0));

        let quotas = policy.quotas(&workers);
        assert_eq!(quotas[&WorkerId::new(0)], 3);
        assert_eq!(quotas[&WorkerId::new(1)], 3);
    }
}
