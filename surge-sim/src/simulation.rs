//! Tick-driven simulation engine.

use std::time::Duration;

use serde::Serialize;
use surge_core::{
    Clock, DeterministicRng, Dispatcher, ItemId, LifecycleObserver, ManualClock, PolicyKind,
    RandomSource, SchedulingError, SurgeConfig, SurgeError, WorkerId,
};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::invariants::{ConservationInvariant, Invariant, InvariantViolation, WorkerCapacityInvariant};
use crate::metrics::{MetricsRecorder, MetricsSummary, SimulationMetrics};

/// Maximum number of invariant violations before stopping simulation.
pub const MAX_INVARIANT_VIOLATIONS: usize = 10;

/// Errors that can occur during simulation.
#[derive(Debug, Error)]
pub enum SimulationError {
    /// Configuration or policy could not be turned into a dispatcher
    #[error("Failed to set up simulation: {0}")]
    Setup(#[from] SurgeError),

    /// Routing failed during a tick
    #[error("Scheduling failed: {0}")]
    Scheduling(#[from] SchedulingError),

    /// Too many invariant violations occurred
    #[error("Too many invariant violations: {count}")]
    TooManyInvariantViolations {
        /// Number of violations that occurred
        count: usize,
    },

    /// A tick must move time forward
    #[error("Tick length must be greater than zero")]
    ZeroLengthTick,
}

/// What happened during one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickOutcome {
    /// Item emitted by the generation step, if any
    pub emitted: Option<ItemId>,
    /// Items that completed during the processing step
    pub completed: usize,
}

/// Per-worker line of a report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkerReport {
    pub id: WorkerId,
    pub service_rate: f64,
    pub served: u64,
    pub dropped: u64,
    pub in_flight: usize,
}

/// Result of a simulation run.
#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    /// Seed used for reproduction, when the rng was seeded here
    pub seed: Option<u64>,
    /// Policy active at the end of the run
    pub policy: PolicyKind,
    /// Total simulated time
    pub duration: Duration,
    /// Ticks executed
    pub ticks: u64,
    pub metrics: MetricsSummary,
    pub workers: Vec<WorkerReport>,
    pub invariant_violations: Vec<InvariantViolation>,
    /// Whether simulation completed without invariant violations
    pub success: bool,
}

impl SimulationReport {
    /// Generates human-readable summary.
    pub fn summary(&self) -> String {
        let mut summary = String::new();
        match self.seed {
            Some(seed) => summary.push_str(&format!("Simulation Report (seed: {seed})\n")),
            None => summary.push_str("Simulation Report (external rng)\n"),
        }
        summary.push_str(&format!("Policy: {}\n", self.policy));
        summary.push_str(&format!("Duration: {:?} over {} ticks\n", self.duration, self.ticks));
        summary.push_str(&format!("Success: {}\n", self.success));

        let metrics = &self.metrics;
        summary.push_str(&format!(
            "\nItems: created {}, completed {}, dropped {} ({:.1}%), in flight {}\n",
            metrics.created,
            metrics.completed,
            metrics.dropped,
            metrics.drop_rate * 100.0,
            metrics.in_flight
        ));
        summary.push_str(&format!("Throughput: {:.2} items/s\n", metrics.throughput_per_sec));
        summary.push_str(&format!(
            "Age at completion (ms): mean {}, p50 {}, p90 {}, p99 {}, max {}\n",
            format_ms(metrics.age_ms.mean),
            format_ms(metrics.age_ms.p50),
            format_ms(metrics.age_ms.p90),
            format_ms(metrics.age_ms.p99),
            format_ms(metrics.age_ms.max)
        ));

        summary.push_str("\nWorkers:\n");
        for worker in &self.workers {
            summary.push_str(&format!(
                "  {}: rate {:.2}, served {}, dropped {}, in flight {}\n",
                worker.id, worker.service_rate, worker.served, worker.dropped, worker.in_flight
            ));
        }

        if !self.invariant_violations.is_empty() {
            summary.push_str("\nInvariant violations:\n");
            for violation in &self.invariant_violations {
                summary.push_str(&format!("  - {violation}\n"));
            }
        }

        summary
    }

    /// Pretty-printed JSON form of the report.
    ///
    /// # Errors
    /// - `serde_json::Error` - serialization failed
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

fn format_ms(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |ms| format!("{ms:.1}"))
}

/// Drives a dispatcher through fixed-order ticks.
///
/// Each tick advances the clock, runs the generation step, runs every
/// worker's processing step and then checks invariants.
pub struct Simulation {
    config: SurgeConfig,
    clock: Box<dyn Clock>,
    rng: Box<dyn RandomSource>,
    seed: Option<u64>,
    dispatcher: Dispatcher,
    metrics: MetricsRecorder,
    invariants: Vec<Box<dyn Invariant>>,
    violations: Vec<InvariantViolation>,
    ticks: u64,
    simulated: Duration,
}

impl Simulation {
    /// Creates a deterministic simulation on a manual clock.
    ///
    /// Uses the configured seed, or draws one and reports it.
    ///
    /// # Errors
    /// - `SimulationError::Setup` - configuration is invalid
    pub fn new(config: SurgeConfig) -> Result<Self, SimulationError> {
        let rng = match config.simulation.seed {
            Some(seed) => DeterministicRng::from_seed(seed),
            None => DeterministicRng::from_entropy(),
        };
        let seed = rng.seed();
        let mut simulation =
            Self::with_sources(config, Box::new(ManualClock::new()), Box::new(rng))?;
        simulation.seed = Some(seed);
        info!("Simulation seeded with {}", seed);
        Ok(simulation)
    }

    /// Creates a simulation with substitute time and randomness sources.
    ///
    /// # Errors
    /// - `SimulationError::Setup` - configuration is invalid
    pub fn with_sources(
        config: SurgeConfig,
        clock: Box<dyn Clock>,
        mut rng: Box<dyn RandomSource>,
    ) -> Result<Self, SimulationError> {
        let mut dispatcher = Dispatcher::new(&config, rng.as_mut())?;
        let metrics = SimulationMetrics::new(config.simulation.latency_window)
            .map_err(SurgeError::from)?;
        let recorder = MetricsRecorder::new(metrics);
        dispatcher.add_observer(Box::new(recorder.clone()));

        Ok(Self {
            config,
            clock,
            rng,
            seed: None,
            dispatcher,
            metrics: recorder,
            invariants: vec![
                Box::new(WorkerCapacityInvariant),
                Box::new(ConservationInvariant),
            ],
            violations: Vec::new(),
            ticks: 0,
            simulated: Duration::ZERO,
        })
    }

    pub fn seed(&self) -> Option<u64> {
        self.seed
    }

    pub fn config(&self) -> &SurgeConfig {
        &self.config
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Mutable access for runtime reconfiguration between ticks.
    pub fn dispatcher_mut(&mut self) -> &mut Dispatcher {
        &mut self.dispatcher
    }

    pub fn now_ms(&self) -> f64 {
        self.clock.now_ms()
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Simulated time covered by the executed ticks.
    pub fn simulated(&self) -> Duration {
        self.simulated
    }

    /// Copy of the metrics collected so far.
    pub fn metrics(&self) -> SimulationMetrics {
        self.metrics.snapshot()
    }

    pub fn violations(&self) -> &[InvariantViolation] {
        &self.violations
    }

    /// Registers a lifecycle observer on the dispatcher.
    pub fn add_observer(&mut self, observer: Box<dyn LifecycleObserver>) {
        self.dispatcher.add_observer(observer);
    }

    /// Adds an invariant to check after every tick.
    pub fn add_invariant(&mut self, invariant: Box<dyn Invariant>) {
        self.invariants.push(invariant);
    }

    /// Resizes the fleet using this simulation's rng and clock.
    ///
    /// # Errors
    /// - `SimulationError::Setup` - zero workers while generation is enabled
    pub fn set_worker_count(&mut self, count: usize) -> Result<(), SimulationError> {
        let now = self.clock.now_ms();
        self.dispatcher
            .set_worker_count(count, now, self.rng.as_mut())
            .map_err(SurgeError::from)?;
        Ok(())
    }

    /// Swaps the active policy.
    ///
    /// # Errors
    /// - `SimulationError::Scheduling` - policy cannot be built
    pub fn set_policy(&mut self, kind: PolicyKind) -> Result<(), SimulationError> {
        self.dispatcher.set_policy(kind)?;
        Ok(())
    }

    /// Runs one tick of length `elapsed`.
    ///
    /// # Errors
    /// - `SimulationError::ZeroLengthTick` - `elapsed` is zero
    /// - `SimulationError::Scheduling` - routing failed
    /// - `SimulationError::TooManyInvariantViolations` - violation limit reached
    ///
    /// # Panics
    ///
    /// Panics if a manual clock is asked to advance by more than 24 hours.
    pub fn step(&mut self, elapsed: Duration) -> Result<TickOutcome, SimulationError> {
        if elapsed.is_zero() {
            return Err(SimulationError::ZeroLengthTick);
        }

        self.clock.on_tick(elapsed);
        let now = self.clock.now_ms();
        let elapsed_ms = elapsed.as_secs_f64() * 1000.0;
        let delta = elapsed_ms * self.config.simulation.time_scale;

        let emitted = self
            .dispatcher
            .generate(elapsed_ms, now, self.rng.as_mut())?;
        let completed = self.dispatcher.process_workers(delta, elapsed_ms, now);

        self.ticks += 1;
        self.simulated += elapsed;
        self.check_invariants(now)?;

        Ok(TickOutcome { emitted, completed })
    }

    /// Runs whole ticks of the configured length covering `duration`.
    ///
    /// # Errors
    /// - `SimulationError::Scheduling` - routing failed
    /// - `SimulationError::TooManyInvariantViolations` - violation limit reached
    pub fn run_for(&mut self, duration: Duration) -> Result<SimulationReport, SimulationError> {
        let tick = self.config.simulation.tick();
        if tick.is_zero() {
            return Err(SimulationError::ZeroLengthTick);
        }

        let ticks = duration.as_nanos() / tick.as_nanos();
        debug!("Running {} ticks of {:?}", ticks, tick);
        for _ in 0..ticks {
            self.step(tick)?;
        }

        let report = self.report();
        info!(
            "Run finished: policy={}, created={}, completed={}, dropped={}",
            report.policy, report.metrics.created, report.metrics.completed, report.metrics.dropped
        );
        Ok(report)
    }

    /// Report covering everything simulated so far.
    pub fn report(&self) -> SimulationReport {
        let metrics = self.metrics.snapshot();
        let workers = self
            .dispatcher
            .workers()
            .iter()
            .map(|worker| {
                let tally = metrics.worker_tally(worker.id());
                WorkerReport {
                    id: worker.id(),
                    service_rate: worker.service_rate(),
                    served: tally.served,
                    dropped: tally.dropped,
                    in_flight: worker.in_flight(),
                }
            })
            .collect();

        SimulationReport {
            seed: self.seed,
            policy: self.dispatcher.policy_kind(),
            duration: self.simulated,
            ticks: self.ticks,
            metrics: metrics.summarize(self.dispatcher.in_flight(), self.simulated),
            workers,
            invariant_violations: self.violations.clone(),
            success: self.violations.is_empty(),
        }
    }

    /// Checks all invariants.
    fn check_invariants(&mut self, now_ms: f64) -> Result<(), SimulationError> {
        for invariant in &self.invariants {
            if let Err(violation) = invariant.check(&self.dispatcher, now_ms) {
                warn!("{}", violation);
                self.violations.push(violation);

                if self.violations.len() >= MAX_INVARIANT_VIOLATIONS {
                    return Err(SimulationError::TooManyInvariantViolations {
                        count: self.violations.len(),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Runs the same seeded scenario once per policy.
///
/// An unseeded configuration gets one drawn seed shared by every run so the
/// reports stay comparable.
///
/// # Errors
/// - `SimulationError::Setup` - configuration is invalid
/// - `SimulationError::Scheduling` - routing failed
/// - `SimulationError::TooManyInvariantViolations` - violation limit reached
pub fn compare_policies(
    config: &SurgeConfig,
    kinds: &[PolicyKind],
    duration: Duration,
) -> Result<Vec<SimulationReport>, SimulationError> {
    let seed = config
        .simulation
        .seed
        .unwrap_or_else(|| DeterministicRng::from_entropy().seed());

    kinds
        .iter()
        .map(|&kind| {
            let mut run_config = config.clone();
            run_config.simulation.seed = Some(seed);
            run_config.policy.kind = kind;
            Simulation::new(run_config)?.run_for(duration)
        })
        .collect()
}
