//! Random selection weighted by service rate.

use super::{PolicyKind, SchedulingError, SchedulingPolicy, ensure_workers};
use crate::clock::RandomSource;
use crate::item::WorkItem;
use crate::worker::{Worker, WorkerId};

/// Draws over `[0, total power)` and walks the cumulative power of each
/// worker until the remainder is used up.
#[derive(Debug, Default, Clone, Copy)]
pub struct WeightedRandom;

impl SchedulingPolicy for WeightedRandom {
    fn kind(&self) -> PolicyKind {
        PolicyKind::WeightedRandom
    }

    fn choose(
        &mut self,
        _item: &WorkItem,
        workers: &[Worker],
        rng: &mut dyn RandomSource,
    ) -> Result<WorkerId, SchedulingError> {
        ensure_workers(workers)?;

        let total: f64 = workers.iter().map(Worker::service_rate).sum();
        let mut remainder = rng.next_f64() * total;
        for worker in workers {
            remainder -= worker.service_rate();
            if remainder <= 0.0 {
                return Ok(worker.id());
            }
        }

        // Float rounding can leave a sliver of remainder after the last worker.
        Ok(workers[workers.len() - 1].id())
    }
}
