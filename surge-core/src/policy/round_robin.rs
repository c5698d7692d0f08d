//! Cyclic selection over the worker list.

use super::{PolicyKind, SchedulingError, SchedulingPolicy, ensure_workers};
use crate::clock::RandomSource;
use crate::item::WorkItem;
use crate::worker::{Worker, WorkerId};

/// Hands items to workers in list order, wrapping at the end.
///
/// The cursor is an index into the live list, so a shrinking worker set
/// simply wraps earlier.
#[derive(Debug, Default)]
pub struct RoundRobin {
    index: usize,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SchedulingPolicy for RoundRobin {
    fn kind(&self) -> PolicyKind {
        PolicyKind::RoundRobin
    }

    fn choose(
        &mut self,
        _item: &WorkItem,
        workers: &[Worker],
        _rng: &mut dyn RandomSource,
    ) -> Result<WorkerId, SchedulingError> {
        ensure_workers(workers)?;
        if self.index >= workers.len() {
            self.index = 0;
        }
        let chosen = workers[self.index].id();
        self.index += 1;
        Ok(chosen)
    }
}
