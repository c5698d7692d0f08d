//! Work items routed by the dispatcher and consumed by workers.

use std::fmt;

use serde::Serialize;

use crate::worker::WorkerId;

/// Identifier assigned to each work item at creation, unique per dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ItemId(u64);

impl ItemId {
    /// Creates an item identifier.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw identifier.
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "item-{}", self.0)
    }
}

/// Lifecycle stage of a work item.
///
/// `Created -> (Active | Queued) -> (Completed | Dropped)`; the two terminal
/// states are reached exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ItemState {
    Created,
    Active,
    Queued,
    Completed,
    Dropped,
}

impl ItemState {
    /// Returns true for `Completed` and `Dropped`.
    pub fn is_terminal(self) -> bool {
        matches!(self, ItemState::Completed | ItemState::Dropped)
    }
}

/// Unit of simulated work with a consumable cost.
///
/// Exclusively owned by whichever worker or queue currently holds it.
#[derive(Debug, Clone, Serialize)]
pub struct WorkItem {
    id: ItemId,
    /// Work units left to process
    pub remaining_cost: f64,
    initial_cost: f64,
    pub created_at: Option<f64>,
    pub queued_at: Option<f64>,
    pub completed_at: Option<f64>,
    pub dropped_at: Option<f64>,
    /// Wall-clock milliseconds since creation, refreshed every tick
    pub age_ms: f64,
    /// Wall-clock milliseconds spent as a worker's active item
    pub processing_time_ms: f64,
    destination: Option<WorkerId>,
    state: ItemState,
}

impl WorkItem {
    /// Creates an item with the given cost at time `now_ms`.
    pub fn new(id: ItemId, cost: f64, now_ms: f64) -> Self {
        Self {
            id,
            remaining_cost: cost,
            initial_cost: cost,
            created_at: Some(now_ms),
            queued_at: None,
            completed_at: None,
            dropped_at: None,
            age_ms: 0.0,
            processing_time_ms: 0.0,
            destination: None,
            state: ItemState::Created,
        }
    }

    pub fn id(&self) -> ItemId {
        self.id
    }

    pub fn initial_cost(&self) -> f64 {
        self.initial_cost
    }

    pub fn state(&self) -> ItemState {
        self.state
    }

    pub fn destination(&self) -> Option<WorkerId> {
        self.destination
    }

    pub fn is_dropped(&self) -> bool {
        self.state == ItemState::Dropped
    }

    /// Fraction of the initial cost already processed, in `[0, 1]`.
    pub fn progress(&self) -> f64 {
        if self.initial_cost <= 0.0 {
            return 1.0;
        }
        (1.0 - self.remaining_cost / self.initial_cost).clamp(0.0, 1.0)
    }

    /// Assigns the destination worker. Only the first assignment sticks.
    pub fn assign(&mut self, worker: WorkerId) {
        if self.destination.is_none() {
            self.destination = Some(worker);
        }
    }

    /// Refreshes `age_ms` against the clock.
    pub fn touch(&mut self, now_ms: f64) {
        if let Some(created) = self.created_at {
            self.age_ms = (now_ms - created).max(0.0);
        }
    }

    pub(crate) fn mark_active(&mut self) {
        self.state = ItemState::Active;
    }

    pub(crate) fn mark_queued(&mut self, now_ms: f64) {
        self.state = ItemState::Queued;
        self.queued_at = Some(now_ms);
    }

    pub(crate) fn mark_completed(&mut self, now_ms: f64) {
        debug_assert!(!self.state.is_terminal(), "{} terminated twice", self.id);
        self.state = ItemState::Completed;
        self.completed_at = Some(now_ms);
        self.touch(now_ms);
    }

    pub(crate) fn mark_dropped(&mut self, now_ms: f64) {
        debug_assert!(!self.state.is_terminal(), "{} terminated twice", self.id);
        self.state = ItemState::Dropped;
        self.dropped_at = Some(now_ms);
        self.touch(now_ms);
    }
}
