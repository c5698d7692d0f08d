//! Processing units with a fixed service rate and a bounded queue.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::item::WorkItem;
use crate::queue::BoundedQueue;

/// Identifier of a worker. Never reused within one dispatcher.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct WorkerId(u32);

impl WorkerId {
    /// Creates a worker identifier.
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    /// Returns the raw identifier.
    pub fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "worker-{}", self.0)
    }
}

/// Outcome of routing an item to a worker.
#[derive(Debug)]
pub enum Arrival {
    /// The worker was idle and started on the item immediately.
    Active,
    /// The item waits in the worker's queue.
    Queued,
    /// The queue was full. The item is terminal and handed back so its
    /// completion can be reported.
    Dropped(WorkItem),
}

/// A processing unit: one active item plus a bounded queue.
///
/// The service rate is sampled once at creation and fixed for the worker's
/// lifetime.
#[derive(Debug, Clone)]
pub struct Worker {
    id: WorkerId,
    service_rate: f64,
    queue: BoundedQueue<WorkItem>,
    active: Option<WorkItem>,
}

impl Worker {
    /// Creates an idle worker.
    pub fn new(id: WorkerId, service_rate: f64, queue_capacity: usize) -> Self {
        Self {
            id,
            service_rate,
            queue: BoundedQueue::new(queue_capacity),
            active: None,
        }
    }

    pub fn id(&self) -> WorkerId {
        self.id
    }

    /// Work units consumed per unit of `delta`. Also the worker's "power"
    /// for weighted policies.
    pub fn service_rate(&self) -> f64 {
        self.service_rate
    }

    pub fn queue_capacity(&self) -> usize {
        self.queue.capacity()
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn active(&self) -> Option<&WorkItem> {
        self.active.as_ref()
    }

    /// Items held by this worker: `active? 1 : 0 + queue length`.
    pub fn in_flight(&self) -> usize {
        usize::from(self.active.is_some()) + self.queue.len()
    }

    pub fn is_idle(&self) -> bool {
        self.in_flight() == 0
    }

    /// Iterates the active item first, then queued items oldest first.
    pub fn items(&self) -> impl Iterator<Item = &WorkItem> {
        self.active.iter().chain(self.queue.iter())
    }

    pub(crate) fn set_queue_capacity(&mut self, capacity: usize) {
        self.queue.set_capacity(capacity);
    }

    /// Accepts a routed item.
    ///
    /// Idle workers start it immediately; busy workers queue it; a full queue
    /// drops it.
    pub fn accept(&mut self, mut item: WorkItem, now_ms: f64) -> Arrival {
        if self.active.is_none() {
            item.mark_active();
            self.active = Some(item);
            return Arrival::Active;
        }

        item.mark_queued(now_ms);
        match self.queue.enqueue(item) {
            Ok(()) => Arrival::Queued,
            Err(mut rejected) => {
                rejected.queued_at = None;
                rejected.mark_dropped(now_ms);
                Arrival::Dropped(rejected)
            }
        }
    }

    /// Runs one processing step and returns the items completed during it.
    ///
    /// The step has a budget of `service_rate * delta` work units, while
    /// `processing_time_ms` grows by the real `elapsed_ms`. When an item
    /// finishes early, the unused part of the budget goes to the next item
    /// pulled in the same step, so total work never exceeds the budget.
    pub fn process(&mut self, delta: f64, elapsed_ms: f64, now_ms: f64) -> Vec<WorkItem> {
        self.refresh_ages(now_ms);

        let mut finished = Vec::new();
        let mut budget = self.service_rate * delta;

        loop {
            if self.active.is_none() {
                match self.queue.dequeue() {
                    Some(mut next) => {
                        next.mark_active();
                        self.active = Some(next);
                    }
                    None => break,
                }
            }

            let Some(active) = self.active.as_mut() else {
                break;
            };
            active.remaining_cost -= budget;
            active.processing_time_ms += elapsed_ms;

            if active.remaining_cost > 0.0 {
                break;
            }

            budget = -active.remaining_cost;
            if let Some(mut done) = self.active.take() {
                done.mark_completed(now_ms);
                finished.push(done);
            }
        }

        finished
    }

    /// Drops everything this worker holds, active item first.
    pub(crate) fn evict_all(&mut self, now_ms: f64) -> Vec<WorkItem> {
        let mut evicted: Vec<WorkItem> = self.active.take().into_iter().collect();
        evicted.extend(self.queue.drain());
        for item in &mut evicted {
            item.mark_dropped(now_ms);
        }
        evicted
    }

    fn refresh_ages(&mut self, now_ms: f64) {
        if let Some(active) = self.active.as_mut() {
            active.touch(now_ms);
        }
        for queued in self.queue.iter_mut() {
            queued.touch(now_ms);
        }
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::item::{ItemId, ItemState};

    fn item(id: u64, cost: f64) -> WorkItem {
        WorkItem::new(ItemId::new(id), cost, 0.0)
    }

    #[test]
    fn test_idle_worker_activates_immediately() {
        let mut worker = Worker::new(WorkerId::new(0), 1.0, 2);
        assert!(matches!(worker.accept(item(1, 10.0), 0.0), Arrival::Active));
        assert_eq!(worker.active().map(|i| i.state()), Some(ItemState::Active));
        assert_eq!(worker.in_flight(), 1);
    }

    #[test]
    fn test_busy_worker_queues_then_drops() {
        let mut worker = Worker::new(WorkerId::new(0), 1.0, 1);
        worker.accept(item(1, 10.0), 0.0);
        assert!(matches!(worker.accept(item(2, 10.0), 1.0), Arrival::Queued));

        match worker.accept(item(3, 10.0), 2.0) {
            Arrival::Dropped(dropped) => {
                assert_eq!(dropped.id(), ItemId::new(3));
                assert!(dropped.is_dropped());
                assert_eq!(dropped.dropped_at, Some(2.0));
            }
            other => panic!("expected drop, got {other:?}"),
        }
        assert_eq!(worker.in_flight(), 2);
    }

    #[test]
    fn test_zero_capacity_drops_when_busy() {
        let mut worker = Worker::new(WorkerId::new(0), 2.0, 0);
        worker.accept(item(1, 50.0), 0.0);
        assert!(matches!(
            worker.accept(item(2, 50.0), 0.0),
            Arrival::Dropped(_)
        ));
    }

    #[test]
    fn test_process_decays_cost_by_rate_and_delta() {
        let mut worker = Worker::new(WorkerId::new(0), 2.0, 0);
        worker.accept(item(1, 10.0), 0.0);

        let done = worker.process(1.5, 16.0, 16.0);
        assert!(done.is_empty());
        let active = worker.active().unwrap();
        assert_eq!(active.remaining_cost, 7.0);
        assert_eq!(active.processing_time_ms, 16.0);
        assert_eq!(active.age_ms, 16.0);
    }

    #[test]
    fn test_carry_over_feeds_next_item_same_tick() {
        let mut worker = Worker::new(WorkerId::new(0), 5.0, 2);
        worker.accept(item(1, 2.0), 0.0);
        worker.accept(item(2, 10.0), 0.0);

        let done = worker.process(1.0, 1.0, 1.0);
        assert_eq!(done.len(), 1);
        assert_eq!(done[0].id(), ItemId::new(1));
        assert_eq!(done[0].state(), ItemState::Completed);
        assert_eq!(done[0].completed_at, Some(1.0));

        // 3 units left over from the first item are applied to the second.
        let active = worker.active().unwrap();
        assert_eq!(active.id(), ItemId::new(2));
        assert_eq!(active.remaining_cost, 7.0);
        assert_eq!(active.processing_time_ms, 1.0);
    }

    #[test]
    fn test_carry_over_is_bounded_by_tick_budget() {
        let mut worker = Worker::new(WorkerId::new(0), 1.0, 10);
        worker.accept(item(0, 4.0), 0.0);
        for id in 1..=10 {
            worker.accept(item(id, 20.0), 0.0);
        }

        // A 16ms tick at rate 1 is 16 units: 4 finish the first item and the
        // remaining 12 go to the second.
        let done = worker.process(16.0, 16.0, 16.0);
        assert_eq!(done.len(), 1);
        assert_eq!(done[0].id(), ItemId::new(0));

        let active = worker.active().unwrap();
        assert_eq!(active.id(), ItemId::new(1));
        assert_eq!(active.remaining_cost, 8.0);
        assert_eq!(worker.queue_len(), 9);
    }

    #[test]
    fn test_several_small_items_finish_in_one_tick() {
        let mut worker = Worker::new(WorkerId::new(0), 10.0, 3);
        worker.accept(item(1, 2.0), 0.0);
        worker.accept(item(2, 3.0), 0.0);
        worker.accept(item(3, 4.0), 0.0);

        let done = worker.process(1.0, 1.0, 1.0);
        assert_eq!(done.len(), 3);
        assert!(worker.is_idle());
    }

    #[test]
    fn test_idle_worker_process_is_noop() {
        let mut worker = Worker::new(WorkerId::new(0), 1.0, 3);
        assert!(worker.process(1.0, 1.0, 1.0).is_empty());
        assert!(worker.is_idle());
    }

    #[test]
    fn test_single_item_takes_cost_over_rate_ticks() {
        let mut worker = Worker::new(WorkerId::new(0), 2.0, 0);
        worker.accept(item(1, 50.0), 0.0);

        let mut completed = Vec::new();
        for tick in 1..=25 {
            completed.extend(worker.process(1.0, 1.0, tick as f64));
        }
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].processing_time_ms, 25.0);
        assert_eq!(completed[0].age_ms, 25.0);
    }

    #[test]
    fn test_evict_all_drops_everything() {
        let mut worker = Worker::new(WorkerId::new(0), 1.0, 2);
        worker.accept(item(1, 10.0), 0.0);
        worker.accept(item(2, 10.0), 0.0);

        let evicted = worker.evict_all(5.0);
        assert_eq!(evicted.len(), 2);
        assert!(evicted.iter().all(WorkItem::is_dropped));
        assert!(worker.is_idle());
    }

    proptest! {
        #[test]
        fn test_work_done_matches_tick_budget(
            rate in 0.1f64..10.0,
            delta in 0.1f64..40.0,
            costs in prop::collection::vec(0.5f64..60.0, 1..12),
        ) {
            let mut worker = Worker::new(WorkerId::new(0), rate, costs.len());
            for (id, &cost) in costs.iter().enumerate() {
                worker.accept(item(id as u64, cost), 0.0);
            }

            let total: f64 = costs.iter().sum();
            let done = worker.process(delta, delta, delta);
            let left: f64 = worker.items().map(|item| item.remaining_cost).sum();
            let work = total - left;
            let expected = total.min(rate * delta);

            prop_assert!((work - expected).abs() < 1e-6, "work {} expected {}", work, expected);
            prop_assert_eq!(done.len() + worker.in_flight(), costs.len());
        }
    }
}
