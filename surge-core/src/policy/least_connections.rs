//! Route to whichever worker has the fewest outstanding items.

use super::{ConnectionTable, PolicyKind, SchedulingError, SchedulingPolicy, ensure_workers};
use crate::clock::RandomSource;
use crate::item::WorkItem;
use crate::worker::{Worker, WorkerId};

/// Picks uniformly among the workers tied for the lowest connection count.
#[derive(Debug, Default)]
pub struct LeastConnections {
    connections: ConnectionTable,
}

impl LeastConnections {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SchedulingPolicy for LeastConnections {
    fn kind(&self) -> PolicyKind {
        PolicyKind::LeastConnections
    }

    fn choose(
        &mut self,
        _item: &WorkItem,
        workers: &[Worker],
        rng: &mut dyn RandomSource,
    ) -> Result<WorkerId, SchedulingError> {
        ensure_workers(workers)?;

        let fewest = workers
            .iter()
            .map(|worker| self.connections.get(worker.id()))
            .min()
            .unwrap_or(0);
        let tied: Vec<WorkerId> = workers
            .iter()
            .map(Worker::id)
            .filter(|&id| self.connections.get(id) == fewest)
            .collect();

        let chosen = tied[rng.index(tied.len())];
        self.connections.increment(chosen);
        Ok(chosen)
    }

    fn on_completion(&mut self, item: &WorkItem) {
        if let Some(destination) = item.destination() {
            self.connections.decrement(destination);
        }
    }

    fn on_activate(&mut self, workers: &[Worker]) {
        self.connections.rebuild(workers);
    }

    fn on_worker_removed(&mut self, worker: WorkerId) {
        self.connections.forget(worker);
    }

    fn connections(&self, worker: WorkerId) -> Option<u32> {
        Some(self.connections.get(worker))
    }
}
