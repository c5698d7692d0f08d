//! Every created item terminates exactly once, whatever the policy or load.

use std::collections::HashMap;
use std::time::Duration;

use surge_core::PolicyKind;
use surge_sim::{EventKind, EventLog, Scenario, Simulation};

#[test]
fn test_conservation_across_scenarios_and_policies() {
    for scenario in Scenario::ALL {
        for kind in PolicyKind::ALL {
            let mut config = scenario.config();
            config.policy.kind = kind;
            let mut sim = Simulation::new(config).unwrap();
            let log = EventLog::default();
            sim.add_observer(Box::new(log.clone()));

            let report = sim.run_for(Duration::from_secs(3)).unwrap();
            let label = format!("{scenario}/{kind}");

            assert!(report.success, "{label}: {:?}", report.invariant_violations);
            let metrics = &report.metrics;
            assert_eq!(
                metrics.created,
                metrics.completed + metrics.dropped + metrics.in_flight,
                "{label}"
            );

            let mut completions: HashMap<_, usize> = HashMap::new();
            for event in log.events() {
                if event.kind == EventKind::Completed {
                    *completions.entry(event.item).or_default() += 1;
                }
            }
            assert!(completions.values().all(|&count| count == 1), "{label}");
            assert_eq!(
                completions.len() as u64,
                metrics.completed + metrics.dropped,
                "{label}"
            );
        }
    }
}

#[test]
fn test_conservation_through_fleet_changes() {
    let mut sim = Simulation::new(Scenario::Overload.config()).unwrap();
    let log = EventLog::default();
    sim.add_observer(Box::new(log.clone()));

    sim.run_for(Duration::from_secs(1)).unwrap();
    sim.set_worker_count(1).unwrap();
    sim.set_policy(PolicyKind::PeakEwma).unwrap();
    sim.run_for(Duration::from_secs(1)).unwrap();
    sim.set_worker_count(5).unwrap();
    sim.dispatcher_mut().set_queue_capacity(1);
    let report = sim.run_for(Duration::from_secs(1)).unwrap();

    assert!(report.success, "{:?}", report.invariant_violations);
    let metrics = &report.metrics;
    assert_eq!(
        log.count(EventKind::Completed) as u64,
        metrics.completed + metrics.dropped
    );
    assert_eq!(log.count(EventKind::Created) as u64, metrics.created);
}
