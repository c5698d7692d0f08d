//! Surge Simulation - Deterministic harness for the load-balancing engine.
//!
//! Drives a [`surge_core::Dispatcher`] through fixed-order ticks on a manual
//! clock with a seeded rng, so the same seed always produces the same run.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::time::Duration;
//!
//! use surge_sim::{Scenario, Simulation};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut sim = Simulation::new(Scenario::Balanced.config())?;
//! let report = sim.run_for(Duration::from_secs(30))?;
//! println!("{}", report.summary());
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! - **Simulation**: tick loop, invariant checks and reports
//! - **Invariants**: runtime validation of worker state and item conservation
//! - **Metrics**: outcome counts and latency windows fed by lifecycle events
//! - **Event log**: bounded lifecycle history for debugging
//! - **Scenarios**: named configuration presets

pub mod events;
pub mod invariants;
pub mod metrics;
pub mod scenarios;
pub mod simulation;

pub use events::{EventKind, EventLog, LifecycleEvent};
pub use invariants::{
    ConservationInvariant, Invariant, InvariantViolation, WorkerCapacityInvariant,
};
pub use metrics::{MetricsRecorder, MetricsSummary, SimulationMetrics, WorkerTally};
pub use scenarios::Scenario;
pub use simulation::{
    Simulation, SimulationError, SimulationReport, TickOutcome, WorkerReport, compare_policies,
};
