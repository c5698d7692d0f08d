//! Named configuration presets covering common load shapes.

use std::fmt;
use std::str::FromStr;

use surge_core::{PolicyKind, SurgeConfig, UniformRange};

/// Seed shared by every preset so runs reproduce out of the box.
pub const SCENARIO_SEED: u64 = 42;

/// Pre-built simulation scenarios.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Scenario {
    /// One fast worker, no queue, light fixed-cost traffic
    SingleWorker,
    /// Four similar workers at roughly a quarter of capacity
    Balanced,
    /// Workers whose service rates differ by almost an order of magnitude
    Uneven,
    /// More offered load than the fleet can serve
    Overload,
    /// Maximum arrival jitter over a mid-sized fleet
    Bursty,
}

impl Scenario {
    pub const ALL: [Scenario; 5] = [
        Scenario::SingleWorker,
        Scenario::Balanced,
        Scenario::Uneven,
        Scenario::Overload,
        Scenario::Bursty,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Scenario::SingleWorker => "single-worker",
            Scenario::Balanced => "balanced",
            Scenario::Uneven => "uneven",
            Scenario::Overload => "overload",
            Scenario::Bursty => "bursty",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Scenario::SingleWorker => "1 worker at rate 2, no queue, cost 50 once per second",
            Scenario::Balanced => "4 workers at rate 1-3, 20 rps, cost 50-150",
            Scenario::Uneven => "5 workers at rate 0.5-4, 50 rps, cost 50-150",
            Scenario::Overload => "3 workers at rate 1-1.5, 80 rps, queue of 3",
            Scenario::Bursty => "5 workers at rate 1-3, 50 rps with full jitter",
        }
    }

    /// Builds the configuration for this scenario.
    pub fn config(self) -> SurgeConfig {
        let mut config = SurgeConfig::default();
        config.simulation.seed = Some(SCENARIO_SEED);

        match self {
            Scenario::SingleWorker => {
                config.dispatch.requests_per_second = 1.0;
                config.dispatch.rate_variance = 0.0;
                config.dispatch.cost = UniformRange::fixed(50.0);
                config.fleet.worker_count = 1;
                config.fleet.service_rate = UniformRange::fixed(2.0);
                config.fleet.queue_capacity = 0;
                config.simulation.tick_ms = 1;
            }
            Scenario::Balanced => {
                config.dispatch.requests_per_second = 20.0;
                config.fleet.worker_count = 4;
            }
            Scenario::Uneven => {
                config.dispatch.requests_per_second = 50.0;
                config.fleet.worker_count = 5;
                config.fleet.service_rate = UniformRange::new(0.5, 4.0);
                config.policy.kind = PolicyKind::WeightedRoundRobin;
            }
            Scenario::Overload => {
                config.dispatch.requests_per_second = 80.0;
                config.fleet.worker_count = 3;
                config.fleet.service_rate = UniformRange::new(1.0, 1.5);
                config.fleet.queue_capacity = 3;
                config.policy.kind = PolicyKind::LeastConnections;
            }
            Scenario::Bursty => {
                config.dispatch.requests_per_second = 50.0;
                config.dispatch.rate_variance = 1.0;
                config.fleet.worker_count = 5;
                config.policy.kind = PolicyKind::PeakEwma;
            }
        }

        config
    }
}

impl fmt::Display for Scenario {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Scenario {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('_', "-");
        Scenario::ALL
            .into_iter()
            .find(|scenario| scenario.name() == normalized)
            .ok_or_else(|| format!("Unknown scenario: {s}"))
    }
}
