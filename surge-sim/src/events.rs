//! Bounded log of item lifecycle events for debugging and tests.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use surge_core::{ItemId, LifecycleObserver, WorkItem, WorkerId};

/// Maximum number of events to track in history.
pub const MAX_EVENT_HISTORY: usize = 10_000;

/// Lifecycle stage an event reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum EventKind {
    Created,
    Queued,
    Dropped,
    Completed,
}

/// One recorded lifecycle notification.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LifecycleEvent {
    pub kind: EventKind,
    pub item: ItemId,
    pub worker: Option<WorkerId>,
    /// Simulated time taken from the item's own timestamps
    pub at_ms: Option<f64>,
    /// Set on completion events for items that were dropped
    pub dropped: bool,
}

/// Shareable observer keeping the most recent lifecycle events.
///
/// Clones share the same history, so one handle can be registered with a
/// dispatcher while another is kept for inspection.
#[derive(Debug, Clone)]
pub struct EventLog {
    history: Arc<Mutex<VecDeque<LifecycleEvent>>>,
    capacity: usize,
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new(MAX_EVENT_HISTORY)
    }
}

impl EventLog {
    /// Creates a log keeping at most `capacity` events, oldest evicted first.
    pub fn new(capacity: usize) -> Self {
        Self {
            history: Arc::new(Mutex::new(VecDeque::new())),
            capacity,
        }
    }

    pub fn events(&self) -> Vec<LifecycleEvent> {
        self.history.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.history.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.lock().is_empty()
    }

    pub fn count(&self, kind: EventKind) -> usize {
        self.history
            .lock()
            .iter()
            .filter(|event| event.kind == kind)
            .count()
    }

    /// Events recorded for one item, in order.
    pub fn for_item(&self, item: ItemId) -> Vec<LifecycleEvent> {
        self.history
            .lock()
            .iter()
            .filter(|event| event.item == item)
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        self.history.lock().clear();
    }

    fn push(&self, event: LifecycleEvent) {
        if self.capacity == 0 {
            return;
        }
        let mut history = self.history.lock();
        if history.len() == self.capacity {
            history.pop_front();
        }
        history.push_back(event);
    }

    fn record(&self, kind: EventKind, item: &WorkItem, worker: Option<WorkerId>, at_ms: Option<f64>) {
        self.push(LifecycleEvent {
            kind,
            item: item.id(),
            worker,
            at_ms,
            dropped: item.is_dropped(),
        });
    }
}

impl LifecycleObserver for EventLog {
    fn on_created(&mut self, item: &WorkItem) {
        self.record(EventKind::Created, item, item.destination(), item.created_at);
    }

    fn on_queued(&mut self, item: &WorkItem, worker: WorkerId) {
        self.record(EventKind::Queued, item, Some(worker), item.queued_at);
    }

    fn on_dropped(&mut self, item: &WorkItem, worker: WorkerId) {
        self.record(EventKind::Dropped, item, Some(worker), item.dropped_at);
    }

    fn on_completed(&mut self, item: &WorkItem, worker: WorkerId) {
        let at_ms = item.completed_at.or(item.dropped_at);
        self.record(EventKind::Completed, item, Some(worker), at_ms);
    }
}
