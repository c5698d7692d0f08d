//! Centralized configuration for Surge.
//!
//! All tunable parameters are defined here so simulations, the CLI and tests
//! share one source of defaults. Supports environment variable overrides and
//! JSON files.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::clock::RandomSource;
use crate::policy::PolicyKind;

/// Errors raised when a configuration value is outside its domain.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{field} must be a finite, non-negative number (got {value})")]
    InvalidRate { field: &'static str, value: f64 },

    #[error("Rate variance must be within [0, 1] (got {value})")]
    VarianceOutOfRange { value: f64 },

    #[error("{field} range [{min}, {max}] must be finite, positive and ordered")]
    InvalidRange {
        field: &'static str,
        min: f64,
        max: f64,
    },

    #[error("At least one worker is required while requests are being generated")]
    EmptyWorkerSet,

    #[error("PEWMA smoothing must be within (0, 1] (got {value})")]
    InvalidSmoothing { value: f64 },

    #[error("Invalid simulation setting: {reason}")]
    InvalidSimulation { reason: String },

    #[error("Failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Closed interval sampled uniformly.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UniformRange {
    pub min: f64,
    pub max: f64,
}

impl UniformRange {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Range that always yields `value`.
    pub fn fixed(value: f64) -> Self {
        Self::new(value, value)
    }

    pub fn sample(&self, rng: &mut dyn RandomSource) -> f64 {
        rng.uniform(self.min, self.max)
    }

    /// Checks the range is finite, strictly positive and ordered.
    ///
    /// # Errors
    /// - `ConfigError::InvalidRange` - any of the above does not hold
    pub fn validate_positive(&self, field: &'static str) -> Result<(), ConfigError> {
        let valid = self.min.is_finite()
            && self.max.is_finite()
            && self.min > 0.0
            && self.min <= self.max;
        if !valid {
            return Err(ConfigError::InvalidRange {
                field,
                min: self.min,
                max: self.max,
            });
        }
        Ok(())
    }
}

/// Central configuration grouping every component's settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SurgeConfig {
    pub dispatch: DispatchConfig,
    pub fleet: FleetConfig,
    pub policy: PolicyConfig,
    pub simulation: SimulationConfig,
}

/// Work generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Mean arrival rate; zero disables generation
    pub requests_per_second: f64,
    /// Jitter applied to each inter-arrival gap, as a fraction (0 disables)
    pub rate_variance: f64,
    /// Cost of each new item, in work units
    pub cost: UniformRange,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            requests_per_second: 20.0,
            rate_variance: 0.2,
            cost: UniformRange::new(50.0, 150.0),
        }
    }
}

/// Worker population settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FleetConfig {
    pub worker_count: usize,
    /// Work units per unit of delta, sampled once per worker
    pub service_rate: UniformRange,
    /// Queue slots per worker; zero means no queueing
    pub queue_capacity: usize,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            worker_count: 3,
            service_rate: UniformRange::new(1.0, 3.0),
            queue_capacity: 5,
        }
    }
}

/// Scheduling policy selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    pub kind: PolicyKind,
    /// Alpha of the peak estimator used by `peak-ewma`
    pub pewma_smoothing: f64,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            kind: PolicyKind::RoundRobin,
            pewma_smoothing: 0.5,
        }
    }
}

/// Harness settings for deterministic runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Deterministic seed; `None` draws one and reports it
    pub seed: Option<u64>,
    /// Length of one tick in milliseconds
    pub tick_ms: u64,
    /// Cost-decay delta per elapsed millisecond
    pub time_scale: f64,
    /// Default run length in seconds
    pub duration_secs: u64,
    /// Samples kept by the latency windows in reports
    pub latency_window: usize,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            seed: None,
            tick_ms: 16,
            time_scale: 1.0,
            duration_secs: 30,
            latency_window: 1000,
        }
    }
}

impl SimulationConfig {
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.duration_secs)
    }
}

/// Checks a requests-per-second value.
///
/// # Errors
/// - `ConfigError::InvalidRate` - negative, NaN or infinite
pub fn validate_rate(value: f64) -> Result<(), ConfigError> {
    if !value.is_finite() || value < 0.0 {
        return Err(ConfigError::InvalidRate {
            field: "requests_per_second",
            value,
        });
    }
    Ok(())
}

/// Checks a rate variance fraction.
///
/// # Errors
/// - `ConfigError::VarianceOutOfRange` - outside `[0, 1]`
pub fn validate_variance(value: f64) -> Result<(), ConfigError> {
    if !(0.0..=1.0).contains(&value) {
        return Err(ConfigError::VarianceOutOfRange { value });
    }
    Ok(())
}

impl SurgeConfig {
    /// Creates configuration with environment variable overrides.
    ///
    /// Unparseable values are ignored and the default is kept.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(rate) = std::env::var("SURGE_REQUESTS_PER_SECOND") {
            if let Ok(value) = rate.parse::<f64>() {
                config.dispatch.requests_per_second = value;
            }
        }

        if let Ok(variance) = std::env::var("SURGE_RATE_VARIANCE") {
            if let Ok(value) = variance.parse::<f64>() {
                config.dispatch.rate_variance = value;
            }
        }

        if let Ok(workers) = std::env::var("SURGE_WORKERS") {
            if let Ok(count) = workers.parse::<usize>() {
                config.fleet.worker_count = count;
            }
        }

        if let Ok(capacity) = std::env::var("SURGE_QUEUE_CAPACITY") {
            if let Ok(value) = capacity.parse::<usize>() {
                config.fleet.queue_capacity = value;
            }
        }

        if let Ok(policy) = std::env::var("SURGE_POLICY") {
            if let Ok(kind) = policy.parse::<PolicyKind>() {
                config.policy.kind = kind;
            }
        }

        if let Ok(seed) = std::env::var("SURGE_SEED") {
            if let Ok(value) = seed.parse::<u64>() {
                config.simulation.seed = Some(value);
            }
        }

        if let Ok(tick) = std::env::var("SURGE_TICK_MS") {
            if let Ok(value) = tick.parse::<u64>() {
                config.simulation.tick_ms = value;
            }
        }

        config
    }

    /// Loads a configuration from a JSON file. Missing fields keep defaults.
    ///
    /// # Errors
    /// - `ConfigError::Io` - file cannot be read
    /// - `ConfigError::Parse` - contents are not valid configuration JSON
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    /// Parses a configuration from JSON text. Missing fields keep defaults.
    ///
    /// # Errors
    /// - `ConfigError::Parse` - text is not valid configuration JSON
    pub fn from_json_str(contents: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(contents)?)
    }

    /// Creates a small, seeded configuration for tests.
    pub fn for_testing() -> Self {
        Self {
            dispatch: DispatchConfig {
                requests_per_second: 50.0,
                rate_variance: 0.0,
                cost: UniformRange::new(20.0, 60.0),
            },
            fleet: FleetConfig {
                worker_count: 3,
                service_rate: UniformRange::new(1.0, 2.0),
                queue_capacity: 3,
            },
            policy: PolicyConfig::default(),
            simulation: SimulationConfig {
                seed: Some(42),
                tick_ms: 1,
                duration_secs: 5,
                ..SimulationConfig::default()
            },
        }
    }

    /// Rejects configurations the simulator cannot run.
    ///
    /// # Errors
    /// - `ConfigError::InvalidRate` - bad requests per second
    /// - `ConfigError::VarianceOutOfRange` - variance outside `[0, 1]`
    /// - `ConfigError::InvalidRange` - bad cost or service-rate range
    /// - `ConfigError::EmptyWorkerSet` - no workers while generating
    /// - `ConfigError::InvalidSmoothing` - PEWMA smoothing outside `(0, 1]`
    /// - `ConfigError::InvalidSimulation` - zero tick, bad time scale or window
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_rate(self.dispatch.requests_per_second)?;
        validate_variance(self.dispatch.rate_variance)?;
        self.dispatch.cost.validate_positive("cost")?;
        self.fleet.service_rate.validate_positive("service_rate")?;

        if self.fleet.worker_count == 0 && self.dispatch.requests_per_second > 0.0 {
            return Err(ConfigError::EmptyWorkerSet);
        }

        let smoothing = self.policy.pewma_smoothing;
        if !(smoothing > 0.0 && smoothing <= 1.0) {
            return Err(ConfigError::InvalidSmoothing { value: smoothing });
        }

        if self.simulation.tick_ms == 0 {
            return Err(ConfigError::InvalidSimulation {
                reason: "tick length must be at least 1ms".to_string(),
            });
        }
        if !(self.simulation.time_scale.is_finite() && self.simulation.time_scale > 0.0) {
            return Err(ConfigError::InvalidSimulation {
                reason: format!(
                    "time scale must be positive (got {})",
                    self.simulation.time_scale
                ),
            });
        }
        if self.simulation.latency_window == 0 {
            return Err(ConfigError::InvalidSimulation {
                reason: "latency window must hold at least one sample".to_string(),
            });
        }

        Ok(())
    }
}
