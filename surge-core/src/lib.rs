//! Surge Core - Load-balancing simulation primitives
//!
//! This crate provides the decision logic and bookkeeping of the simulator:
//! work items, bounded worker queues, the interchangeable scheduling
//! policies, the peak latency estimator and the dispatcher that generates
//! and routes work. Nothing here renders or waits; every operation is a
//! synchronous state transition driven by explicit ticks.

pub mod clock;
pub mod config;
pub mod dispatcher;
pub mod item;
pub mod pewma;
pub mod policy;
pub mod queue;
pub mod stats;
pub mod tracing_setup;
pub mod worker;

// Re-export main types for convenient access
pub use clock::{Clock, DeterministicRng, ManualClock, RandomSource, WallClock};
pub use config::{ConfigError, SurgeConfig, UniformRange};
pub use dispatcher::{DispatchCounters, Dispatcher, LifecycleObserver};
pub use item::{ItemId, ItemState, WorkItem};
pub use pewma::PeakEstimator;
pub use policy::{PolicyKind, SchedulingError, SchedulingPolicy};
pub use queue::BoundedQueue;
pub use stats::{LatencyWindow, StatsError};
pub use worker::{Arrival, Worker, WorkerId};

/// Errors that can bubble up from any Surge subsystem.
#[derive(Debug, thiserror::Error)]
pub enum SurgeError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Scheduling error: {0}")]
    Scheduling(#[from] SchedulingError),

    #[error("Statistics error: {0}")]
    Stats(#[from] StatsError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SurgeError {
    /// Checks if this error was caused by caller-supplied input.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            SurgeError::Config(_)
                | SurgeError::Scheduling(SchedulingError::UnknownPolicy { .. })
                | SurgeError::Stats(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, SurgeError>;
