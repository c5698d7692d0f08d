//! CLI command implementations

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::Subcommand;
use surge_core::{DeterministicRng, PolicyKind, SurgeConfig, WallClock};
use surge_sim::{Scenario, Simulation, SimulationReport, compare_policies};
use tokio::time::MissedTickBehavior;
use tracing::info;

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Run one simulation and print its report
    Run {
        /// Start from a named scenario
        #[arg(long, value_enum)]
        scenario: Option<Scenario>,
        /// Load configuration from a JSON file (overrides --scenario)
        #[arg(long)]
        config: Option<PathBuf>,
        /// Scheduling policy to use
        #[arg(long, value_enum)]
        policy: Option<PolicyKind>,
        /// Deterministic seed
        #[arg(long)]
        seed: Option<u64>,
        /// Simulated run length in seconds
        #[arg(long)]
        duration_secs: Option<u64>,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Run the same scenario under several policies side by side
    Compare {
        /// Start from a named scenario
        #[arg(long, value_enum)]
        scenario: Option<Scenario>,
        /// Load configuration from a JSON file (overrides --scenario)
        #[arg(long)]
        config: Option<PathBuf>,
        /// Policies to compare, all of them when omitted
        #[arg(long, value_enum, value_delimiter = ',')]
        policies: Vec<PolicyKind>,
        /// Deterministic seed shared by every run
        #[arg(long)]
        seed: Option<u64>,
        /// Simulated run length in seconds
        #[arg(long)]
        duration_secs: Option<u64>,
        /// Print the reports as JSON
        #[arg(long)]
        json: bool,
    },
    /// Drive a simulation in real time, printing stats every second
    Watch {
        /// Start from a named scenario
        #[arg(long, value_enum)]
        scenario: Option<Scenario>,
        /// Scheduling policy to use
        #[arg(long, value_enum)]
        policy: Option<PolicyKind>,
        /// Wall-clock run length in seconds
        #[arg(long, default_value = "10")]
        duration_secs: u64,
    },
    /// List the built-in scenarios
    Scenarios,
}

/// Handle the CLI command
///
/// # Errors
/// Returns the first configuration, I/O or simulation error encountered
pub async fn handle_command(command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Run {
            scenario,
            config,
            policy,
            seed,
            duration_secs,
            json,
        } => {
            let config = resolve_config(scenario, config, policy, seed)?;
            run_simulation(config, duration_secs, json)
        }
        Commands::Compare {
            scenario,
            config,
            policies,
            seed,
            duration_secs,
            json,
        } => {
            let config = resolve_config(scenario, config, None, seed)?;
            compare(config, &policies, duration_secs, json)
        }
        Commands::Watch {
            scenario,
            policy,
            duration_secs,
        } => {
            let config = resolve_config(scenario, None, policy, None)?;
            watch(config, Duration::from_secs(duration_secs)).await
        }
        Commands::Scenarios => {
            list_scenarios();
            Ok(())
        }
    }
}

/// Builds the configuration from a file, a scenario or the environment,
/// then applies command-line overrides.
///
/// # Errors
/// - Configuration file cannot be read or parsed
/// - Resulting configuration fails validation
fn resolve_config(
    scenario: Option<Scenario>,
    path: Option<PathBuf>,
    policy: Option<PolicyKind>,
    seed: Option<u64>,
) -> anyhow::Result<SurgeConfig> {
    let mut config = match (path, scenario) {
        (Some(path), _) => SurgeConfig::from_json_file(&path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        (None, Some(scenario)) => scenario.config(),
        (None, None) => SurgeConfig::from_env(),
    };

    if let Some(policy) = policy {
        config.policy.kind = policy;
    }
    if seed.is_some() {
        config.simulation.seed = seed;
    }

    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn run_duration(config: &SurgeConfig, duration_secs: Option<u64>) -> Duration {
    duration_secs.map_or_else(|| config.simulation.duration(), Duration::from_secs)
}

/// Run one simulation to completion
///
/// # Errors
/// - Simulation setup or execution failed
/// - Report could not be serialized
fn run_simulation(config: SurgeConfig, duration_secs: Option<u64>, json: bool) -> anyhow::Result<()> {
    let duration = run_duration(&config, duration_secs);
    let mut sim = Simulation::new(config)?;
    let report = sim.run_for(duration)?;

    if json {
        println!("{}", report.to_json()?);
    } else {
        print!("{}", report.summary());
    }
    Ok(())
}

/// Compare policies on one scenario
///
/// # Errors
/// - Any run failed
/// - Reports could not be serialized
fn compare(
    config: SurgeConfig,
    policies: &[PolicyKind],
    duration_secs: Option<u64>,
    json: bool,
) -> anyhow::Result<()> {
    let kinds = if policies.is_empty() {
        PolicyKind::ALL.to_vec()
    } else {
        policies.to_vec()
    };
    let duration = run_duration(&config, duration_secs);
    let reports = compare_policies(&config, &kinds, duration)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
        return Ok(());
    }

    if let Some(seed) = reports.first().and_then(|report| report.seed) {
        println!("Seed: {seed}, duration: {duration:?}");
    }
    println!(
        "{:<30} {:>8} {:>10} {:>8} {:>7} {:>9} {:>9}",
        "Policy", "Created", "Completed", "Dropped", "Drop%", "p50 ms", "p99 ms"
    );
    println!("{:-<87}", "");
    for report in &reports {
        print_comparison_row(report);
    }
    Ok(())
}

fn print_comparison_row(report: &SimulationReport) {
    let metrics = &report.metrics;
    let ms = |value: Option<f64>| value.map_or_else(|| "-".to_string(), |v| format!("{v:.1}"));
    println!(
        "{:<30} {:>8} {:>10} {:>8} {:>6.1}% {:>9} {:>9}",
        report.policy.as_str(),
        metrics.created,
        metrics.completed,
        metrics.dropped,
        metrics.drop_rate * 100.0,
        ms(metrics.age_ms.p50),
        ms(metrics.age_ms.p99),
    );
}

/// Drive a simulation against the wall clock
///
/// Stops after `duration` or on Ctrl-C, then prints the final report.
///
/// # Errors
/// - Simulation setup or a tick failed
async fn watch(config: SurgeConfig, duration: Duration) -> anyhow::Result<()> {
    let rng = match config.simulation.seed {
        Some(seed) => DeterministicRng::from_seed(seed),
        None => DeterministicRng::from_entropy(),
    };
    let tick = config.simulation.tick();
    let mut sim = Simulation::with_sources(config, Box::new(WallClock::new()), Box::new(rng))?;
    info!("Watching {} for {:?}", sim.dispatcher().policy_kind(), duration);

    let mut interval = tokio::time::interval(tick);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let started = Instant::now();
    let mut last_tick = started;
    let mut last_print = started;

    while started.elapsed() < duration {
        tokio::select! {
            _ = interval.tick() => {}
            _ = tokio::signal::ctrl_c() => {
                println!("Interrupted");
                break;
            }
        }

        let now = Instant::now();
        let elapsed = now.duration_since(last_tick);
        if elapsed.is_zero() {
            continue;
        }
        last_tick = now;
        sim.step(elapsed)?;

        if now.duration_since(last_print) >= Duration::from_secs(1) {
            last_print = now;
            print_live_line(&sim, started.elapsed());
        }
    }

    print!("{}", sim.report().summary());
    Ok(())
}

fn print_live_line(sim: &Simulation, elapsed: Duration) {
    let counters = sim.dispatcher().counters();
    let loads: Vec<String> = sim
        .dispatcher()
        .workers()
        .iter()
        .map(|worker| worker.in_flight().to_string())
        .collect();
    let p50 = sim
        .metrics()
        .age()
        .percentile(50.0)
        .ok()
        .flatten()
        .map_or_else(|| "-".to_string(), |v| format!("{v:.0}ms"));

    println!(
        "[{:>5.1}s] created {:>6} completed {:>6} dropped {:>5} p50 {:>7} load [{}]",
        elapsed.as_secs_f64(),
        counters.created,
        counters.completed,
        counters.dropped,
        p50,
        loads.join(" ")
    );
}

fn list_scenarios() {
    println!("Scenarios");
    println!("{:-<70}", "");
    for scenario in Scenario::ALL {
        let config = scenario.config();
        println!(
            "{:<15} {:<45} [{}]",
            scenario.name(),
            scenario.description(),
            config.policy.kind
        );
    }
}
