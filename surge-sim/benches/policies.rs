use std::hint::black_box;
use std::time::Duration;

use criterion::{Criterion, criterion_group, criterion_main};
use surge_core::{DeterministicRng, Dispatcher, PolicyKind, SurgeConfig};
use surge_sim::{Scenario, Simulation};

fn bench_policy_decisions(c: &mut Criterion) {
    let mut group = c.benchmark_group("policy_generate");
    for kind in PolicyKind::ALL {
        group.bench_function(kind.as_str(), |b| {
            let mut rng = DeterministicRng::from_seed(7);
            let mut config = SurgeConfig::for_testing();
            config.fleet.worker_count = 32;
            config.fleet.queue_capacity = 64;
            config.dispatch.requests_per_second = 1000.0;
            config.policy.kind = kind;
            let mut dispatcher = Dispatcher::new(&config, &mut rng).unwrap();
            let mut now = 0.0;

            b.iter(|| {
                now += 1.0;
                black_box(dispatcher.generate(1.0, now, &mut rng).unwrap());
                dispatcher.process_workers(1.0, 1.0, now);
            });
        });
    }
    group.finish();
}

fn bench_simulated_second(c: &mut Criterion) {
    c.bench_function("overload_one_simulated_second", |b| {
        b.iter(|| {
            let mut sim = Simulation::new(Scenario::Overload.config()).unwrap();
            black_box(sim.run_for(Duration::from_secs(1)).unwrap());
        });
    });
}

criterion_group!(benches, bench_policy_decisions, bench_simulated_second);
criterion_main!(benches);
