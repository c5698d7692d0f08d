//! Work generation and routing.
//!
//! The dispatcher owns the worker set and the active scheduling policy. Each
//! tick it may emit one new item on a jittered schedule, routes it through
//! the policy, and reports every terminal item to the policy and then to the
//! registered lifecycle observers.

use serde::Serialize;
use tracing::{debug, info, trace};

use crate::SurgeError;
use crate::clock::RandomSource;
use crate::config::{ConfigError, SurgeConfig, UniformRange, validate_rate, validate_variance};
use crate::item::{ItemId, WorkItem};
use crate::policy::{PolicyKind, SchedulingError, SchedulingPolicy};
use crate::worker::{Arrival, Worker, WorkerId};

/// Receives item lifecycle notifications. All methods default to no-ops.
///
/// `on_completed` fires exactly once per item, for served and dropped items
/// alike; dropped items also get `on_dropped` just before it.
pub trait LifecycleObserver: Send {
    fn on_created(&mut self, _item: &WorkItem) {}

    fn on_queued(&mut self, _item: &WorkItem, _worker: WorkerId) {}

    fn on_dropped(&mut self, _item: &WorkItem, _worker: WorkerId) {}

    fn on_completed(&mut self, _item: &WorkItem, _worker: WorkerId) {}
}

/// Running totals of item outcomes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchCounters {
    pub created: u64,
    pub completed: u64,
    pub dropped: u64,
}

impl DispatchCounters {
    /// Items that reached a terminal state.
    pub fn terminated(&self) -> u64 {
        self.completed + self.dropped
    }
}

/// Generates work items and routes them to workers.
pub struct Dispatcher {
    requests_per_second: f64,
    rate_variance: f64,
    cost: UniformRange,
    service_rate: UniformRange,
    queue_capacity: usize,
    pewma_smoothing: f64,
    workers: Vec<Worker>,
    policy: Box<dyn SchedulingPolicy>,
    ms_until_next: f64,
    next_item_id: u64,
    next_worker_id: u32,
    observers: Vec<Box<dyn LifecycleObserver>>,
    counters: DispatchCounters,
}

impl Dispatcher {
    /// Builds the worker set and policy described by `config`.
    ///
    /// Service rates are sampled from `rng` once per worker.
    ///
    /// # Errors
    /// - `SurgeError::Config` - configuration fails validation
    /// - `SurgeError::Scheduling` - policy cannot be built
    pub fn new(config: &SurgeConfig, rng: &mut dyn RandomSource) -> Result<Self, SurgeError> {
        config.validate()?;
        let policy = config.policy.kind.build(config.policy.pewma_smoothing)?;

        let mut dispatcher = Self {
            requests_per_second: config.dispatch.requests_per_second,
            rate_variance: config.dispatch.rate_variance,
            cost: config.dispatch.cost,
            service_rate: config.fleet.service_rate,
            queue_capacity: config.fleet.queue_capacity,
            pewma_smoothing: config.policy.pewma_smoothing,
            workers: Vec::with_capacity(config.fleet.worker_count),
            policy,
            ms_until_next: 0.0,
            next_item_id: 0,
            next_worker_id: 0,
            observers: Vec::new(),
            counters: DispatchCounters::default(),
        };
        for _ in 0..config.fleet.worker_count {
            dispatcher.spawn_worker(rng);
        }
        dispatcher.policy.on_activate(&dispatcher.workers);

        info!(
            "Dispatcher ready: {} workers, policy={}, rps={}",
            dispatcher.workers.len(),
            dispatcher.policy.kind(),
            dispatcher.requests_per_second
        );
        Ok(dispatcher)
    }

    /// Registers an observer; observers are notified in registration order.
    pub fn add_observer(&mut self, observer: Box<dyn LifecycleObserver>) {
        self.observers.push(observer);
    }

    pub fn workers(&self) -> &[Worker] {
        &self.workers
    }

    pub fn worker(&self, id: WorkerId) -> Option<&Worker> {
        self.workers.iter().find(|worker| worker.id() == id)
    }

    pub fn policy(&self) -> &dyn SchedulingPolicy {
        self.policy.as_ref()
    }

    pub fn policy_kind(&self) -> PolicyKind {
        self.policy.kind()
    }

    pub fn counters(&self) -> DispatchCounters {
        self.counters
    }

    /// Items currently held by any worker.
    pub fn in_flight(&self) -> u64 {
        self.workers
            .iter()
            .map(|worker| worker.in_flight() as u64)
            .sum()
    }

    pub fn requests_per_second(&self) -> f64 {
        self.requests_per_second
    }

    pub fn rate_variance(&self) -> f64 {
        self.rate_variance
    }

    pub fn cost_range(&self) -> UniformRange {
        self.cost
    }

    pub fn service_rate_range(&self) -> UniformRange {
        self.service_rate
    }

    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity
    }

    /// Milliseconds left before the next item is emitted.
    pub fn ms_until_next(&self) -> f64 {
        self.ms_until_next
    }

    /// Generation step for one tick. Emits at most one item.
    ///
    /// # Errors
    /// - `SchedulingError::NoWorkers` - generation is due but no workers exist
    /// - `SchedulingError::UnknownWorker` - the policy picked a worker outside the set
    pub fn generate(
        &mut self,
        elapsed_ms: f64,
        now_ms: f64,
        rng: &mut dyn RandomSource,
    ) -> Result<Option<ItemId>, SchedulingError> {
        if self.requests_per_second == 0.0 {
            return Ok(None);
        }

        self.ms_until_next -= elapsed_ms;
        if self.ms_until_next > 0.0 {
            return Ok(None);
        }

        let jitter = if self.rate_variance == 0.0 {
            1.0
        } else {
            rng.uniform(1.0 - self.rate_variance, 1.0 + self.rate_variance)
        };
        self.ms_until_next = 1000.0 / self.requests_per_second * jitter;

        let id = ItemId::new(self.next_item_id);
        let mut item = WorkItem::new(id, self.cost.sample(rng), now_ms);

        let destination = self.policy.choose(&item, &self.workers, rng)?;
        let index = self
            .workers
            .iter()
            .position(|worker| worker.id() == destination)
            .ok_or(SchedulingError::UnknownWorker {
                worker: destination,
            })?;

        self.next_item_id += 1;
        self.counters.created += 1;
        item.assign(destination);
        trace!(
            "Routing {} (cost {:.1}) to {}",
            id,
            item.initial_cost(),
            destination
        );
        for observer in &mut self.observers {
            observer.on_created(&item);
        }

        match self.workers[index].accept(item, now_ms) {
            Arrival::Active => {}
            Arrival::Queued => {
                if let Some(queued) = self.workers[index].items().last() {
                    for observer in &mut self.observers {
                        observer.on_queued(queued, destination);
                    }
                }
            }
            Arrival::Dropped(dropped) => {
                debug!("Queue full on {}, dropping {}", destination, id);
                self.finish(dropped, destination);
            }
        }

        Ok(Some(id))
    }

    /// Processing step for one tick across every worker.
    ///
    /// All workers advance before any completion hook fires. Returns the
    /// number of items completed during the step.
    pub fn process_workers(&mut self, delta: f64, elapsed_ms: f64, now_ms: f64) -> usize {
        let mut finished = Vec::new();
        for worker in &mut self.workers {
            let id = worker.id();
            finished.extend(
                worker
                    .process(delta, elapsed_ms, now_ms)
                    .into_iter()
                    .map(|item| (item, id)),
            );
        }

        let count = finished.len();
        for (item, worker) in finished {
            self.finish(item, worker);
        }
        count
    }

    /// # Errors
    /// - `ConfigError::InvalidRate` - negative or non-finite rate
    /// - `ConfigError::EmptyWorkerSet` - enabling generation with no workers
    pub fn set_requests_per_second(&mut self, requests_per_second: f64) -> Result<(), ConfigError> {
        validate_rate(requests_per_second)?;
        if requests_per_second > 0.0 && self.workers.is_empty() {
            return Err(ConfigError::EmptyWorkerSet);
        }
        self.requests_per_second = requests_per_second;
        info!("Requests per second set to {}", requests_per_second);
        Ok(())
    }

    /// # Errors
    /// - `ConfigError::VarianceOutOfRange` - outside `[0, 1]`
    pub fn set_rate_variance(&mut self, variance: f64) -> Result<(), ConfigError> {
        validate_variance(variance)?;
        self.rate_variance = variance;
        info!("Rate variance set to {}", variance);
        Ok(())
    }

    /// # Errors
    /// - `ConfigError::InvalidRange` - range is inverted, non-positive or non-finite
    pub fn set_cost_range(&mut self, cost: UniformRange) -> Result<(), ConfigError> {
        cost.validate_positive("cost")?;
        self.cost = cost;
        info!("Cost range set to [{}, {}]", cost.min, cost.max);
        Ok(())
    }

    /// Applies to workers created from now on. Existing rates are fixed.
    ///
    /// # Errors
    /// - `ConfigError::InvalidRange` - range is inverted, non-positive or non-finite
    pub fn set_service_rate_range(&mut self, range: UniformRange) -> Result<(), ConfigError> {
        range.validate_positive("service_rate")?;
        self.service_rate = range;
        info!("Service rate range set to [{}, {}]", range.min, range.max);
        Ok(())
    }

    /// Resizes every queue. Shrinking never evicts queued items.
    pub fn set_queue_capacity(&mut self, capacity: usize) {
        self.queue_capacity = capacity;
        for worker in &mut self.workers {
            worker.set_queue_capacity(capacity);
        }
        info!("Queue capacity set to {}", capacity);
    }

    /// Adds workers with fresh ids or removes them from the end.
    ///
    /// Items held by a removed worker are dropped and reported once.
    ///
    /// # Errors
    /// - `ConfigError::EmptyWorkerSet` - zero workers while generation is enabled
    pub fn set_worker_count(
        &mut self,
        count: usize,
        now_ms: f64,
        rng: &mut dyn RandomSource,
    ) -> Result<(), ConfigError> {
        if count == 0 && self.requests_per_second > 0.0 {
            return Err(ConfigError::EmptyWorkerSet);
        }

        while self.workers.len() < count {
            self.spawn_worker(rng);
        }

        while self.workers.len() > count {
            let Some(mut removed) = self.workers.pop() else {
                break;
            };
            let evicted = removed.evict_all(now_ms);
            debug!("Removed {} with {} items in flight", removed.id(), evicted.len());
            for item in evicted {
                self.finish(item, removed.id());
            }
            self.policy.on_worker_removed(removed.id());
        }

        info!("Worker count set to {}", count);
        Ok(())
    }

    /// Swaps in a fresh instance of `kind` and lets it rebuild its counters
    /// from the items currently in flight.
    ///
    /// # Errors
    /// - `SchedulingError::InvalidParameter` - PEWMA smoothing rejected
    pub fn set_policy(&mut self, kind: PolicyKind) -> Result<(), SchedulingError> {
        let mut policy = kind.build(self.pewma_smoothing)?;
        policy.on_activate(&self.workers);
        info!("Scheduling policy switched from {} to {}", self.policy.kind(), kind);
        self.policy = policy;
        Ok(())
    }

    fn spawn_worker(&mut self, rng: &mut dyn RandomSource) {
        let id = WorkerId::new(self.next_worker_id);
        self.next_worker_id += 1;
        let rate = self.service_rate.sample(rng);
        self.workers
            .push(Worker::new(id, rate, self.queue_capacity));
        debug!("Spawned {} with service rate {:.3}", id, rate);
    }

    /// Reports a terminal item: policy hook first, then observers.
    fn finish(&mut self, item: WorkItem, worker: WorkerId) {
        if item.is_dropped() {
            self.counters.dropped += 1;
        } else {
            self.counters.completed += 1;
        }

        self.policy.on_completion(&item);
        for observer in &mut self.observers {
            if item.is_dropped() {
                observer.on_dropped(&item, worker);
            }
            observer.on_completed(&item, worker);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::clock::DeterministicRng;
    use crate::item::ItemState;
    use crate::policy::RoundRobin;

    #[derive(Debug, Clone, Copy, PartialEq)]
    enum Event {
        Created(ItemId, Option<WorkerId>),
        Queued(ItemId, WorkerId),
        Dropped(ItemId, WorkerId),
        Completed(ItemId, WorkerId, ItemState),
    }

    #[derive(Clone, Default)]
    struct Recorder {
        events: Arc<Mutex<Vec<Event>>>,
    }

    impl Recorder {
        fn events(&self) -> Vec<Event> {
            self.events.lock().unwrap().clone()
        }

        fn push(&self, event: Event) {
            self.events.lock().unwrap().push(event);
        }
    }

    impl LifecycleObserver for Recorder {
        fn on_created(&mut self, item: &WorkItem) {
            self.push(Event::Created(item.id(), item.destination()));
        }

        fn on_queued(&mut self, item: &WorkItem, worker: WorkerId) {
            self.push(Event::Queued(item.id(), worker));
        }

        fn on_dropped(&mut self, item: &WorkItem, worker: WorkerId) {
            self.push(Event::Dropped(item.id(), worker));
        }

        fn on_completed(&mut self, item: &WorkItem, worker: WorkerId) {
            self.push(Event::Completed(item.id(), worker, item.state()));
        }
    }

    fn fixed_config(workers: usize, rate: f64, capacity: usize, cost: f64, rps: f64) -> SurgeConfig {
        let mut config = SurgeConfig::for_testing();
        config.fleet.worker_count = workers;
        config.fleet.service_rate = UniformRange::fixed(rate);
        config.fleet.queue_capacity = capacity;
        config.dispatch.cost = UniformRange::fixed(cost);
        config.dispatch.requests_per_second = rps;
        config.dispatch.rate_variance = 0.0;
        config
    }

    fn with_recorder(config: &SurgeConfig, rng: &mut DeterministicRng) -> (Dispatcher, Recorder) {
        let mut dispatcher = Dispatcher::new(config, rng).unwrap();
        let recorder = Recorder::default();
        dispatcher.add_observer(Box::new(recorder.clone()));
        (dispatcher, recorder)
    }

    fn created_destinations(recorder: &Recorder) -> Vec<u32> {
        recorder
            .events()
            .into_iter()
            .filter_map(|event| match event {
                Event::Created(_, Some(worker)) => Some(worker.as_u32()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_first_tick_emits_an_item() {
        let mut rng = DeterministicRng::from_seed(1);
        let mut dispatcher = Dispatcher::new(&fixed_config(1, 1.0, 2, 10.0, 1.0), &mut rng).unwrap();

        let emitted = dispatcher.generate(1.0, 1.0, &mut rng).unwrap();
        assert_eq!(emitted, Some(ItemId::new(0)));
        assert_eq!(dispatcher.ms_until_next(), 1000.0);
        assert_eq!(dispatcher.counters().created, 1);
    }

    #[test]
    fn test_zero_rate_generates_nothing() {
        let mut rng = DeterministicRng::from_seed(1);
        let mut dispatcher = Dispatcher::new(&fixed_config(0, 1.0, 2, 10.0, 0.0), &mut rng).unwrap();

        for tick in 0..100 {
            assert_eq!(dispatcher.generate(10.0, f64::from(tick), &mut rng), Ok(None));
        }
        assert_eq!(dispatcher.counters().created, 0);
    }

    #[test]
    fn test_fixed_interval_without_variance() {
        let mut rng = DeterministicRng::from_seed(1);
        let mut dispatcher = Dispatcher::new(&fixed_config(2, 1.0, 100, 10.0, 10.0), &mut rng).unwrap();

        let mut emitted_at = Vec::new();
        for tick in 1..=250 {
            if dispatcher.generate(1.0, f64::from(tick), &mut rng).unwrap().is_some() {
                emitted_at.push(tick);
            }
        }
        assert_eq!(emitted_at, vec![1, 101, 201]);
    }

    #[test]
    fn test_jittered_interval_stays_in_bounds() {
        let mut rng = DeterministicRng::from_seed(9);
        let mut config = fixed_config(2, 1.0, 100, 10.0, 10.0);
        config.dispatch.rate_variance = 0.5;
        let mut dispatcher = Dispatcher::new(&config, &mut rng).unwrap();

        for tick in 1..=5000 {
            if dispatcher.generate(1.0, f64::from(tick), &mut rng).unwrap().is_some() {
                let gap = dispatcher.ms_until_next();
                assert!((50.0..=150.0).contains(&gap), "gap {gap}");
            }
        }
    }

    #[test]
    fn test_single_worker_completes_without_drops() {
        let mut rng = DeterministicRng::from_seed(3);
        let config = fixed_config(1, 2.0, 0, 50.0, 1.0);
        let (mut dispatcher, recorder) = with_recorder(&config, &mut rng);

        let mut completion = None;
        for tick in 1..=40 {
            let now = f64::from(tick);
            dispatcher.generate(1.0, now, &mut rng).unwrap();
            dispatcher.process_workers(1.0, 1.0, now);
            if completion.is_none() && dispatcher.counters().completed == 1 {
                completion = Some(tick);
            }
        }

        assert_eq!(completion, Some(25));
        assert_eq!(dispatcher.counters().dropped, 0);
        assert!(recorder.events().contains(&Event::Completed(
            ItemId::new(0),
            WorkerId::new(0),
            ItemState::Completed
        )));
    }

    #[test]
    fn test_full_queue_drops_and_reports_once() {
        let mut rng = DeterministicRng::from_seed(3);
        let config = fixed_config(1, 1.0, 0, 500.0, 1000.0);
        let (mut dispatcher, recorder) = with_recorder(&config, &mut rng);

        dispatcher.generate(1.0, 1.0, &mut rng).unwrap();
        dispatcher.generate(1.0, 2.0, &mut rng).unwrap();

        let dropped = ItemId::new(1);
        let worker = WorkerId::new(0);
        assert_eq!(dispatcher.counters().dropped, 1);
        assert_eq!(
            recorder.events(),
            vec![
                Event::Created(ItemId::new(0), Some(worker)),
                Event::Created(dropped, Some(worker)),
                Event::Dropped(dropped, worker),
                Event::Completed(dropped, worker, ItemState::Dropped),
            ]
        );
    }

    #[test]
    fn test_queued_items_are_reported() {
        let mut rng = DeterministicRng::from_seed(3);
        let config = fixed_config(1, 1.0, 4, 500.0, 1000.0);
        let (mut dispatcher, recorder) = with_recorder(&config, &mut rng);

        dispatcher.generate(1.0, 1.0, &mut rng).unwrap();
        dispatcher.generate(1.0, 2.0, &mut rng).unwrap();

        assert!(
            recorder
                .events()
                .contains(&Event::Queued(ItemId::new(1), WorkerId::new(0)))
        );
        assert_eq!(dispatcher.in_flight(), 2);
    }

    #[test]
    fn test_weighted_round_robin_follows_power() {
        let mut rng = DeterministicRng::from_seed(5);
        let mut config = fixed_config(1, 1.0, 10, 500.0, 1000.0);
        config.policy.kind = PolicyKind::WeightedRoundRobin;
        let (mut dispatcher, recorder) = with_recorder(&config, &mut rng);

        dispatcher
            .set_service_rate_range(UniformRange::fixed(3.0))
            .unwrap();
        dispatcher.set_worker_count(2, 0.0, &mut rng).unwrap();

        for tick in 1..=4 {
            dispatcher.generate(1.0, f64::from(tick), &mut rng).unwrap();
        }
        assert_eq!(created_destinations(&recorder), vec![0, 1, 1, 1]);
    }

    #[test]
    fn test_least_connections_stays_balanced_without_completions() {
        let mut rng = DeterministicRng::from_seed(11);
        let mut config = fixed_config(3, 1.0, 10, 500.0, 1000.0);
        config.policy.kind = PolicyKind::LeastConnections;
        let mut dispatcher = Dispatcher::new(&config, &mut rng).unwrap();

        for tick in 1..=9 {
            dispatcher.generate(1.0, f64::from(tick), &mut rng).unwrap();
            let loads: Vec<usize> = dispatcher.workers().iter().map(Worker::in_flight).collect();
            let spread = loads.iter().max().unwrap() - loads.iter().min().unwrap();
            assert!(spread <= 1, "loads {loads:?}");
        }
        for worker in dispatcher.workers() {
            assert_eq!(dispatcher.policy().connections(worker.id()), Some(3));
        }
    }

    #[test]
    fn test_policy_swap_rebuilds_connection_counts() {
        let mut rng = DeterministicRng::from_seed(2);
        let config = fixed_config(3, 1.0, 10, 500.0, 1000.0);
        let mut dispatcher = Dispatcher::new(&config, &mut rng).unwrap();

        for tick in 1..=4 {
            dispatcher.generate(1.0, f64::from(tick), &mut rng).unwrap();
        }
        dispatcher.set_policy(PolicyKind::LeastConnections).unwrap();

        assert_eq!(dispatcher.policy_kind(), PolicyKind::LeastConnections);
        assert_eq!(dispatcher.policy().connections(WorkerId::new(0)), Some(2));
        assert_eq!(dispatcher.policy().connections(WorkerId::new(1)), Some(1));
        assert_eq!(dispatcher.policy().connections(WorkerId::new(2)), Some(1));
    }

    #[test]
    fn test_removing_workers_drops_their_items() {
        let mut rng = DeterministicRng::from_seed(2);
        let config = fixed_config(3, 1.0, 10, 500.0, 1000.0);
        let (mut dispatcher, recorder) = with_recorder(&config, &mut rng);

        for tick in 1..=6 {
            dispatcher.generate(1.0, f64::from(tick), &mut rng).unwrap();
        }
        dispatcher.set_worker_count(1, 10.0, &mut rng).unwrap();

        assert_eq!(dispatcher.counters().dropped, 4);
        assert_eq!(dispatcher.in_flight(), 2);
        let completions = recorder
            .events()
            .iter()
            .filter(|event| matches!(event, Event::Completed(..)))
            .count();
        assert_eq!(completions, 4);

        dispatcher.set_worker_count(2, 11.0, &mut rng).unwrap();
        let ids: Vec<u32> = dispatcher.workers().iter().map(|w| w.id().as_u32()).collect();
        assert_eq!(ids, vec![0, 3]);
    }

    #[derive(Debug, Clone, Copy, PartialEq)]
    enum PolicyCall {
        Completed(ItemId),
        Removed(WorkerId),
    }

    /// Round robin that logs the hooks the dispatcher invokes.
    struct HookLog {
        inner: RoundRobin,
        calls: Arc<Mutex<Vec<PolicyCall>>>,
    }

    impl SchedulingPolicy for HookLog {
        fn kind(&self) -> PolicyKind {
            PolicyKind::RoundRobin
        }

        fn choose(
            &mut self,
            item: &WorkItem,
            workers: &[Worker],
            rng: &mut dyn RandomSource,
        ) -> Result<WorkerId, SchedulingError> {
            self.inner.choose(item, workers, rng)
        }

        fn on_completion(&mut self, item: &WorkItem) {
            self.calls.lock().unwrap().push(PolicyCall::Completed(item.id()));
        }

        fn on_worker_removed(&mut self, worker: WorkerId) {
            self.calls.lock().unwrap().push(PolicyCall::Removed(worker));
        }
    }

    #[test]
    fn test_policy_hears_removal_after_evicted_items() {
        let mut rng = DeterministicRng::from_seed(2);
        let mut dispatcher =
            Dispatcher::new(&fixed_config(3, 1.0, 10, 500.0, 1000.0), &mut rng).unwrap();
        let calls = Arc::new(Mutex::new(Vec::new()));
        dispatcher.policy = Box::new(HookLog {
            inner: RoundRobin::new(),
            calls: Arc::clone(&calls),
        });

        for tick in 1..=3 {
            dispatcher.generate(1.0, f64::from(tick), &mut rng).unwrap();
        }
        dispatcher.set_worker_count(1, 10.0, &mut rng).unwrap();

        // Workers are removed from the end, each after its own items finish.
        assert_eq!(
            *calls.lock().unwrap(),
            vec![
                PolicyCall::Completed(ItemId::new(2)),
                PolicyCall::Removed(WorkerId::new(2)),
                PolicyCall::Completed(ItemId::new(1)),
                PolicyCall::Removed(WorkerId::new(1)),
            ]
        );
    }

    #[test]
    fn test_setters_validate_input() {
        let mut rng = DeterministicRng::from_seed(2);
        let mut dispatcher = Dispatcher::new(&fixed_config(2, 1.0, 2, 10.0, 5.0), &mut rng).unwrap();

        assert!(matches!(
            dispatcher.set_worker_count(0, 0.0, &mut rng),
            Err(ConfigError::EmptyWorkerSet)
        ));
        assert!(dispatcher.set_rate_variance(1.5).is_err());
        assert!(dispatcher.set_requests_per_second(f64::NAN).is_err());
        assert!(dispatcher.set_cost_range(UniformRange::new(5.0, 1.0)).is_err());
        assert!(dispatcher.set_service_rate_range(UniformRange::fixed(-1.0)).is_err());

        dispatcher.set_requests_per_second(0.0).unwrap();
        dispatcher.set_worker_count(0, 0.0, &mut rng).unwrap();
        assert!(matches!(
            dispatcher.set_requests_per_second(1.0),
            Err(ConfigError::EmptyWorkerSet)
        ));
    }

    #[test]
    fn test_queue_capacity_change_applies_to_all_workers() {
        let mut rng = DeterministicRng::from_seed(2);
        let mut dispatcher = Dispatcher::new(&fixed_config(2, 1.0, 2, 10.0, 5.0), &mut rng).unwrap();

        dispatcher.set_queue_capacity(7);
        assert!(dispatcher.workers().iter().all(|w| w.queue_capacity() == 7));
    }

    #[test]
    fn test_every_item_terminates_exactly_once() {
        for kind in PolicyKind::ALL {
            let mut rng = DeterministicRng::from_seed(17);
            let mut config = SurgeConfig::for_testing();
            config.policy.kind = kind;
            config.dispatch.requests_per_second = 400.0;
            config.dispatch.rate_variance = 0.3;
            let (mut dispatcher, recorder) = with_recorder(&config, &mut rng);

            for tick in 1..=3000 {
                let now = f64::from(tick);
                dispatcher.generate(1.0, now, &mut rng).unwrap();
                dispatcher.process_workers(1.0, 1.0, now);
            }

            let counters = dispatcher.counters();
            assert_eq!(
                counters.created,
                counters.terminated() + dispatcher.in_flight(),
                "{kind}"
            );

            let mut completed: Vec<ItemId> = recorder
                .events()
                .into_iter()
                .filter_map(|event| match event {
                    Event::Completed(id, ..) => Some(id),
                    _ => None,
                })
                .collect();
            let total = completed.len();
            completed.sort();
            completed.dedup();
            assert_eq!(completed.len(), total, "{kind}");
            assert_eq!(total as u64, counters.terminated(), "{kind}");
        }
    }
}
