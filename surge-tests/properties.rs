//! Property tests for scheduling, statistics and conservation.

use std::time::Duration;

use proptest::prelude::*;
use surge_core::policy::{RoundRobin, WeightedRoundRobin};
use surge_core::{
    DeterministicRng, Dispatcher, ItemId, LatencyWindow, PeakEstimator, PolicyKind,
    SchedulingPolicy, SurgeConfig, UniformRange, WorkItem, Worker, WorkerId,
};
use surge_sim::Simulation;

fn fleet(rates: &[f64]) -> Vec<Worker> {
    rates
        .iter()
        .enumerate()
        .map(|(i, &rate)| Worker::new(WorkerId::new(i as u32), rate, 8))
        .collect()
}

fn sample_item(id: u64) -> WorkItem {
    WorkItem::new(ItemId::new(id), 10.0, 0.0)
}

proptest! {
    #[test]
    fn test_round_robin_visits_each_worker_k_times(n in 1usize..8, k in 1usize..10) {
        let workers = fleet(&vec![1.0; n]);
        let mut policy = RoundRobin::new();
        let mut rng = DeterministicRng::from_seed(0);

        for i in 0..n * k {
            let chosen = policy.choose(&sample_item(i as u64), &workers, &mut rng).unwrap();
            prop_assert_eq!(chosen, WorkerId::new((i % n) as u32));
        }
    }

    #[test]
    fn test_weighted_round_robin_matches_power_ratio(
        base_step in 1u32..=6,
        multipliers in prop::collection::vec(1u32..=5, 1..4),
        rounds in 1u32..6,
    ) {
        let base = f64::from(base_step) * 0.5;
        let mut powers = vec![1u32];
        powers.extend(multipliers);
        let rates: Vec<f64> = powers.iter().map(|&m| base * f64::from(m)).collect();
        let workers = fleet(&rates);

        let mut policy = WeightedRoundRobin::new();
        let mut rng = DeterministicRng::from_seed(0);
        let picks_per_round: u32 = powers.iter().sum();
        let mut picks = vec![0u32; workers.len()];
        for i in 0..picks_per_round * rounds {
            let chosen = policy.choose(&sample_item(u64::from(i)), &workers, &mut rng).unwrap();
            picks[chosen.as_u32() as usize] += 1;
        }

        for (picked, power) in picks.iter().zip(&powers) {
            prop_assert_eq!(*picked, power * rounds);
        }
    }

    #[test]
    fn test_percentiles_are_monotone(
        samples in prop::collection::vec(0.0f64..10_000.0, 1..200),
        p1 in 0.5f64..99.5,
        p2 in 0.5f64..99.5,
    ) {
        let mut window = LatencyWindow::new(256).unwrap();
        for sample in &samples {
            window.record(*sample);
        }
        let (low, high) = if p1 <= p2 { (p1, p2) } else { (p2, p1) };

        let low_value = window.percentile(low).unwrap().unwrap();
        let high_value = window.percentile(high).unwrap().unwrap();
        prop_assert!(low_value <= high_value);
        prop_assert!(high_value <= window.max().unwrap());
    }

    #[test]
    fn test_peak_estimator_bootstraps_from_default(alpha in 0.01f64..=1.0, value in 0.0f64..100_000.0) {
        let mut estimator = PeakEstimator::new(alpha).unwrap();
        estimator.update(value);
        let expected = alpha * value + (1.0 - alpha) * 1000.0;
        prop_assert!((estimator.peak().unwrap() - expected).abs() < 1e-6 * expected.max(1.0));
    }

    #[test]
    fn test_carry_over_is_applied_to_next_item(
        rate in 1.0f64..20.0,
        delta in 0.5f64..32.0,
        first_fraction in 0.05f64..0.95,
        second_ticks in 1.5f64..10.0,
    ) {
        let budget = rate * delta;
        let first_cost = budget * first_fraction;
        let second_cost = budget * second_ticks;
        let mut worker = Worker::new(WorkerId::new(0), rate, 4);
        worker.accept(WorkItem::new(ItemId::new(0), first_cost, 0.0), 0.0);
        worker.accept(WorkItem::new(ItemId::new(1), second_cost, 0.0), 0.0);

        let finished = worker.process(delta, delta, delta);
        prop_assert_eq!(finished.len(), 1);

        // Exactly the unused part of this tick's budget reaches the second item.
        let carry = budget - first_cost;
        let second = worker.active().unwrap();
        prop_assert!((second.remaining_cost - (second_cost - carry)).abs() < 1e-6);
    }

    #[test]
    fn test_least_connections_stays_within_one_without_completions(
        n in 2usize..6,
        items in 1usize..60,
        seed in any::<u64>(),
    ) {
        let mut config = SurgeConfig::for_testing();
        config.fleet.worker_count = n;
        config.fleet.queue_capacity = 100;
        config.fleet.service_rate = UniformRange::fixed(1.0);
        config.dispatch.cost = UniformRange::fixed(1_000_000.0);
        config.dispatch.requests_per_second = 1000.0;
        config.policy.kind = PolicyKind::LeastConnections;
        let mut rng = DeterministicRng::from_seed(seed);
        let mut dispatcher = Dispatcher::new(&config, &mut rng).unwrap();

        for tick in 1..=items {
            dispatcher.generate(1.0, tick as f64, &mut rng).unwrap();
            let loads: Vec<usize> = dispatcher.workers().iter().map(Worker::in_flight).collect();
            let spread = loads.iter().max().unwrap() - loads.iter().min().unwrap();
            prop_assert!(spread <= 1, "loads {:?}", loads);
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn test_simulations_conserve_items(
        seed in any::<u64>(),
        policy_index in 0usize..7,
        workers in 1usize..6,
        capacity in 0usize..6,
        rps in 1.0f64..200.0,
        variance in 0.0f64..=1.0,
    ) {
        let mut config = SurgeConfig::default();
        config.simulation.seed = Some(seed);
        config.policy.kind = PolicyKind::ALL[policy_index];
        config.fleet.worker_count = workers;
        config.fleet.queue_capacity = capacity;
        config.dispatch.requests_per_second = rps;
        config.dispatch.rate_variance = variance;

        let report = Simulation::new(config)
            .unwrap()
            .run_for(Duration::from_secs(2))
            .unwrap();

        prop_assert!(report.success, "{:?}", report.invariant_violations);
        let metrics = &report.metrics;
        prop_assert_eq!(
            metrics.created,
            metrics.completed + metrics.dropped + metrics.in_flight
        );
    }
}
