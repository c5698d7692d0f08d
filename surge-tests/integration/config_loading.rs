//! Configuration files feeding full simulation runs.

use std::io::Write;
use std::time::Duration;

use surge_core::{ConfigError, PolicyKind, SurgeConfig};
use surge_sim::{Scenario, Simulation, SimulationError};

#[test]
fn test_saved_scenario_reproduces_run() {
    let config = Scenario::Uneven.config();
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(serde_json::to_string_pretty(&config).unwrap().as_bytes())
        .unwrap();

    let loaded = SurgeConfig::from_json_file(file.path()).unwrap();
    assert_eq!(loaded.policy.kind, PolicyKind::WeightedRoundRobin);
    assert_eq!(loaded.fleet.worker_count, config.fleet.worker_count);

    let original = Simulation::new(config)
        .unwrap()
        .run_for(Duration::from_secs(2))
        .unwrap();
    let reloaded = Simulation::new(loaded)
        .unwrap()
        .run_for(Duration::from_secs(2))
        .unwrap();
    assert_eq!(original.metrics, reloaded.metrics);
}

#[test]
fn test_partial_file_runs_with_defaults() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"{{ "policy": {{ "kind": "least-connections" }}, "simulation": {{ "seed": 7 }} }}"#
    )
    .unwrap();

    let config = SurgeConfig::from_json_file(file.path()).unwrap();
    let report = Simulation::new(config)
        .unwrap()
        .run_for(Duration::from_secs(1))
        .unwrap();

    assert_eq!(report.policy, PolicyKind::LeastConnections);
    assert_eq!(report.seed, Some(7));
    assert_eq!(report.workers.len(), 3);
}

#[test]
fn test_invalid_file_values_fail_fast() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, r#"{{ "dispatch": {{ "rate_variance": 2.0 }} }}"#).unwrap();

    let config = SurgeConfig::from_json_file(file.path()).unwrap();
    assert!(matches!(
        config.validate(),
        Err(ConfigError::VarianceOutOfRange { .. })
    ));
    assert!(matches!(
        Simulation::new(config),
        Err(SimulationError::Setup(_))
    ));
}

#[test]
fn test_missing_file_is_an_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let result = SurgeConfig::from_json_file(&dir.path().join("absent.json"));
    assert!(matches!(result, Err(ConfigError::Io(_))));
}
