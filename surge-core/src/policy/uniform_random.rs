//! Uniform random selection.

use super::{PolicyKind, SchedulingError, SchedulingPolicy, ensure_workers};
use crate::clock::RandomSource;
use crate::item::WorkItem;
use crate::worker::{Worker, WorkerId};

/// Picks any worker with equal probability. Stateless.
#[derive(Debug, Default, Clone, Copy)]
pub struct UniformRandom;

impl SchedulingPolicy for UniformRandom {
    fn kind(&self) -> PolicyKind {
        PolicyKind::Random
    }

    fn choose(
        &mut self,
        _item: &WorkItem,
        workers: &[Worker],
        rng: &mut dyn RandomSource,
    ) -> Result<WorkerId, SchedulingError> {
        ensure_workers(workers)?;
        Ok(workers[rng.index(workers.len())].id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::test_support::{SequenceRng, item, workers_with_rates};

    #[test]
    fn test_maps_samples_onto_workers() {
        let workers = workers_with_rates(&[1.0, 1.0, 1.0, 1.0]);
        let mut rng = SequenceRng::new(&[0.0, 0.3, 0.6, 0.99]);
        let mut policy = UniformRandom;

        let picks: Vec<u32> = (0..4)
            .map(|i| policy.choose(&item(i), &workers, &mut rng).unwrap().as_u32())
            .collect();
        assert_eq!(picks, vec![0, 1, 2, 3]);
    }
}
