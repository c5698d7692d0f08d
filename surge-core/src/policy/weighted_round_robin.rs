//! Round robin where each worker gets a run of picks proportional to its
//! power.

use std::collections::HashMap;

use super::{PolicyKind, SchedulingError, SchedulingPolicy, ensure_workers};
use crate::clock::RandomSource;
use crate::item::WorkItem;
use crate::worker::{Worker, WorkerId};

/// Cursor that stays on a worker until its quota of picks is used up.
#[derive(Debug, Default, Clone)]
pub(crate) struct QuotaCursor {
    index: usize,
    sent: HashMap<WorkerId, u32>,
}

impl QuotaCursor {
    /// Returns the next worker under the given per-worker quotas.
    ///
    /// `workers` must be non-empty. Workers with a zero quota are skipped.
    pub(crate) fn select(
        &mut self,
        workers: &[Worker],
        mut quota: impl FnMut(&Worker) -> u32,
    ) -> WorkerId {
        // Two full passes always reach a worker with quota left unless every
        // quota is zero.
        for _ in 0..=2 * workers.len() {
            if self.index >= workers.len() {
                self.index = 0;
            }
            let worker = &workers[self.index];
            let sent = self.sent.entry(worker.id()).or_insert(0);
            if *sent < quota(worker) {
                *sent += 1;
                return worker.id();
            }
            *sent = 0;
            self.index += 1;
        }

        if self.index >= workers.len() {
            self.index = 0;
        }
        workers[self.index].id()
    }

    pub(crate) fn sent(&self, worker: WorkerId) -> u32 {
        self.sent.get(&worker).copied().unwrap_or(0)
    }

    pub(crate) fn forget(&mut self, worker: WorkerId) {
        self.sent.remove(&worker);
    }
}

/// Each worker receives `ceil(power / min_power)` consecutive picks before
/// the cursor advances.
#[derive(Debug, Default)]
pub struct WeightedRoundRobin {
    cursor: QuotaCursor,
}

impl WeightedRoundRobin {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SchedulingPolicy for WeightedRoundRobin {
    fn kind(&self) -> PolicyKind {
        PolicyKind::WeightedRoundRobin
    }

    fn choose(
        &mut self,
        _item: &WorkItem,
        workers: &[Worker],
        _rng: &mut dyn RandomSource,
    ) -> Result<WorkerId, SchedulingError> {
        ensure_workers(workers)?;

        let min_power = workers
            .iter()
            .map(Worker::service_rate)
            .fold(f64::INFINITY, f64::min);

        Ok(self.cursor.select(workers, |worker| {
            if min_power > 0.0 {
                (worker.service_rate() / min_power).ceil().max(1.0) as u32
            } else {
                1
            }
        }))
    }

    fn on_worker_removed(&mut self, worker: WorkerId) {
        self.cursor.forget(worker);
    }
}
