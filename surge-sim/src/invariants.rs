//! Invariant checking framework for simulation validation.

use std::fmt;

use serde::Serialize;
use surge_core::{Dispatcher, ItemState};

/// Violation of a simulation invariant.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvariantViolation {
    /// Name of the violated invariant
    pub invariant: String,
    /// Detailed description of the violation
    pub description: String,
    /// Simulated time of the check, in milliseconds
    pub at_ms: f64,
}

impl fmt::Display for InvariantViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Invariant '{}' violated at {:.1}ms: {}",
            self.invariant, self.at_ms, self.description
        )
    }
}

/// Trait for checking simulation invariants after every tick.
pub trait Invariant: Send {
    /// Checks if the invariant holds for the dispatcher's current state.
    ///
    /// # Errors
    /// Returns `InvariantViolation` if the invariant condition is not met.
    fn check(&self, dispatcher: &Dispatcher, now_ms: f64) -> Result<(), InvariantViolation>;

    /// Returns name of this invariant.
    fn name(&self) -> &str;

    fn violation(&self, description: String, now_ms: f64) -> InvariantViolation {
        InvariantViolation {
            invariant: self.name().to_string(),
            description,
            at_ms: now_ms,
        }
    }
}

/// Ensures each worker holds live items in the right slots.
///
/// The active item must be `Active`, queued items must be `Queued` and sit
/// behind an active item, and every held item must be routed to its holder.
/// Queue length is not compared with capacity since shrinking a queue keeps
/// the items it already holds.
pub struct WorkerCapacityInvariant;

impl Invariant for WorkerCapacityInvariant {
    fn check(&self, dispatcher: &Dispatcher, now_ms: f64) -> Result<(), InvariantViolation> {
        for worker in dispatcher.workers() {
            if worker.active().is_none() && worker.queue_len() > 0 {
                return Err(self.violation(
                    format!(
                        "{} has {} queued items but no active item",
                        worker.id(),
                        worker.queue_len()
                    ),
                    now_ms,
                ));
            }

            if let Some(active) = worker.active() {
                if active.state() != ItemState::Active {
                    return Err(self.violation(
                        format!("{} holds {} as active in state {:?}", worker.id(), active.id(), active.state()),
                        now_ms,
                    ));
                }
            }

            for queued in worker.items().skip(1) {
                if queued.state() != ItemState::Queued {
                    return Err(self.violation(
                        format!("{} holds {} queued in state {:?}", worker.id(), queued.id(), queued.state()),
                        now_ms,
                    ));
                }
            }

            if let Some(stray) = worker
                .items()
                .find(|item| item.destination() != Some(worker.id()))
            {
                return Err(self.violation(
                    format!(
                        "{} holds {} routed to {:?}",
                        worker.id(),
                        stray.id(),
                        stray.destination()
                    ),
                    now_ms,
                ));
            }
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "WorkerCapacity"
    }
}

/// Ensures every created item is either in flight or terminated.
pub struct ConservationInvariant;

impl Invariant for ConservationInvariant {
    fn check(&self, dispatcher: &Dispatcher, now_ms: f64) -> Result<(), InvariantViolation> {
        let counters = dispatcher.counters();
        let in_flight = dispatcher.in_flight();
        if counters.created != counters.terminated() + in_flight {
            return Err(self.violation(
                format!(
                    "created {} != completed {} + dropped {} + in flight {}",
                    counters.created, counters.completed, counters.dropped, in_flight
                ),
                now_ms,
            ));
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "Conservation"
    }
}

#[cfg(test)]
mod tests {
    use surge_core::{DeterministicRng, SurgeConfig};

    use super::*;

    #[test]
    fn test_fresh_dispatcher_satisfies_builtin_invariants() {
        let mut rng = DeterministicRng::from_seed(1);
        let dispatcher = Dispatcher::new(&SurgeConfig::for_testing(), &mut rng).unwrap();

        assert!(WorkerCapacityInvariant.check(&dispatcher, 0.0).is_ok());
        assert!(ConservationInvariant.check(&dispatcher, 0.0).is_ok());
    }

    #[test]
    fn test_invariants_hold_while_loaded() {
        let mut rng = DeterministicRng::from_seed(4);
        let mut config = SurgeConfig::for_testing();
        config.dispatch.requests_per_second = 500.0;
        let mut dispatcher = Dispatcher::new(&config, &mut rng).unwrap();

        for tick in 1..=500 {
            let now = f64::from(tick);
            dispatcher.generate(1.0, now, &mut rng).unwrap();
            dispatcher.process_workers(1.0, 1.0, now);
            assert_eq!(WorkerCapacityInvariant.check(&dispatcher, now), Ok(()));
            assert_eq!(ConservationInvariant.check(&dispatcher, now), Ok(()));
        }
        assert!(dispatcher.counters().dropped > 0);
    }

    #[test]
    fn test_violation_display_names_invariant() {
        let violation = ConservationInvariant.violation("lost an item".to_string(), 12.0);
        assert_eq!(
            violation.to_string(),
            "Invariant 'Conservation' violated at 12.0ms: lost an item"
        );
    }
}
