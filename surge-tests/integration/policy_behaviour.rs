//! Policies steering load the way their weighting says they should.

use std::time::Duration;

use surge_core::{PolicyKind, SurgeConfig, UniformRange, WorkerId};
use surge_sim::{Simulation, SimulationReport};

/// Worker 0 runs at `slow`, worker 1 at `fast`.
fn two_speed_simulation(policy: PolicyKind, slow: f64, fast: f64, capacity: usize) -> Simulation {
    let mut config = SurgeConfig::for_testing();
    config.fleet.worker_count = 1;
    config.fleet.service_rate = UniformRange::fixed(slow);
    config.fleet.queue_capacity = capacity;
    config.dispatch.rate_variance = 0.0;
    config.dispatch.cost = UniformRange::fixed(20.0);
    config.policy.kind = policy;

    let mut sim = Simulation::new(config).unwrap();
    sim.dispatcher_mut()
        .set_service_rate_range(UniformRange::fixed(fast))
        .unwrap();
    sim.set_worker_count(2).unwrap();
    sim
}

fn served(report: &SimulationReport, worker: u32) -> u64 {
    report
        .workers
        .iter()
        .find(|w| w.id == WorkerId::new(worker))
        .map_or(0, |w| w.served)
}

#[test]
fn test_weighted_random_prefers_powerful_worker() {
    let mut sim = two_speed_simulation(PolicyKind::WeightedRandom, 1.0, 9.0, 10_000);
    sim.dispatcher_mut()
        .set_cost_range(UniformRange::fixed(1_000_000.0))
        .unwrap();
    sim.dispatcher_mut().set_requests_per_second(1000.0).unwrap();

    for _ in 0..2000 {
        sim.step(Duration::from_millis(1)).unwrap();
    }

    let fast = sim.dispatcher().workers()[1].in_flight() as f64;
    let share = fast / sim.dispatcher().counters().created as f64;
    assert!((0.85..=0.95).contains(&share), "share {share}");
}

#[test]
fn test_dynamic_weighted_round_robin_favours_faster_worker() {
    let mut sim = two_speed_simulation(PolicyKind::DynamicWeightedRoundRobin, 1.0, 4.0, 10);
    sim.dispatcher_mut().set_requests_per_second(100.0).unwrap();
    let report = sim.run_for(Duration::from_secs(2)).unwrap();

    let slow = served(&report, 0);
    let fast = served(&report, 1);
    assert!(slow >= 1);
    assert!(fast > 10 * slow, "slow {slow}, fast {fast}");
}

#[test]
fn test_peak_ewma_favours_lower_latency_worker() {
    let mut sim = two_speed_simulation(PolicyKind::PeakEwma, 0.5, 4.0, 10);
    sim.dispatcher_mut().set_requests_per_second(100.0).unwrap();
    let report = sim.run_for(Duration::from_secs(2)).unwrap();

    assert!(served(&report, 1) > served(&report, 0));
    assert_eq!(report.metrics.dropped, 0);
}

#[test]
fn test_weighted_round_robin_beats_round_robin_on_uneven_fleet() {
    let run = |policy| {
        let mut sim = two_speed_simulation(policy, 0.25, 3.0, 2);
        sim.dispatcher_mut().set_requests_per_second(150.0).unwrap();
        sim.run_for(Duration::from_secs(3)).unwrap()
    };

    let round_robin = run(PolicyKind::RoundRobin);
    let weighted = run(PolicyKind::WeightedRoundRobin);
    assert!(
        weighted.metrics.dropped < round_robin.metrics.dropped,
        "weighted {} vs round robin {}",
        weighted.metrics.dropped,
        round_robin.metrics.dropped
    );
}
