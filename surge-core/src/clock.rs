//! Time and randomness sources for simulations.
//!
//! Both are traits so tests can substitute deterministic implementations
//! for the wall clock and the OS-seeded generator.

use std::time::{Duration, Instant};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Maximum time that can be advanced in a single tick (24 hours).
const MAX_TICK: Duration = Duration::from_secs(86400);

/// Monotonic time source used for item timestamps and ages.
pub trait Clock: Send {
    /// Milliseconds elapsed since the clock's origin.
    fn now_ms(&self) -> f64;

    /// Notifies the clock that a tick of `elapsed` is being simulated.
    ///
    /// Real clocks ignore this; manual clocks advance by it.
    fn on_tick(&mut self, _elapsed: Duration) {}
}

/// Clock that only moves when the simulation advances it.
///
/// Time can only move forward and is independent of wall-clock time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    elapsed: Duration,
}

impl ManualClock {
    /// Creates a clock at time zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Advances the clock by `duration`.
    ///
    /// # Panics
    ///
    /// Panics if duration exceeds 24 hours (MAX_TICK).
    pub fn advance(&mut self, duration: Duration) {
        assert!(
            duration <= MAX_TICK,
            "Cannot advance time by more than 24 hours"
        );
        self.elapsed += duration;
    }

    /// Returns elapsed time since the clock's origin.
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Resets the clock to time zero.
    pub fn reset(&mut self) {
        self.elapsed = Duration::ZERO;
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> f64 {
        self.elapsed.as_secs_f64() * 1000.0
    }

    fn on_tick(&mut self, elapsed: Duration) {
        self.advance(elapsed);
    }
}

/// Clock backed by the monotonic system clock.
#[derive(Debug, Clone)]
pub struct WallClock {
    origin: Instant,
}

impl Default for WallClock {
    fn default() -> Self {
        Self::new()
    }
}

impl WallClock {
    /// Creates a clock whose origin is now.
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Clock for WallClock {
    fn now_ms(&self) -> f64 {
        self.origin.elapsed().as_secs_f64() * 1000.0
    }
}

/// Uniform `[0, 1)` generator used for jitter, weighted selection and
/// tie-breaking.
pub trait RandomSource: Send {
    /// Returns the next sample in `[0, 1)`.
    fn next_f64(&mut self) -> f64;

    /// Returns a uniform sample in `[min, max]`.
    fn uniform(&mut self, min: f64, max: f64) -> f64 {
        min + (max - min) * self.next_f64()
    }

    /// Returns a uniform index in `0..len`. `len` must be non-zero.
    fn index(&mut self, len: usize) -> usize {
        let index = (self.next_f64() * len as f64) as usize;
        index.min(len.saturating_sub(1))
    }
}

/// Deterministic random number generator for reproducible simulations.
///
/// Uses ChaCha8 for fast, high-quality pseudorandom numbers with
/// deterministic seed-based generation.
#[derive(Debug, Clone)]
pub struct DeterministicRng {
    rng: ChaCha8Rng,
    seed: u64,
}

impl DeterministicRng {
    /// Creates deterministic RNG from seed value.
    pub fn from_seed(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            seed,
        }
    }

    /// Creates an RNG from a freshly drawn seed.
    ///
    /// The seed is kept so the run can be reproduced later.
    pub fn from_entropy() -> Self {
        Self::from_seed(rand::random())
    }

    /// Returns the seed used for this RNG.
    pub fn seed(&self) -> u64 {
        self.seed
    }
}

impl RandomSource for DeterministicRng {
    fn next_f64(&mut self) -> f64 {
        self.rng.random::<f64>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_advancement() {
        let mut clock = ManualClock::new();
        assert_eq!(clock.now_ms(), 0.0);

        clock.advance(Duration::from_millis(10));
        assert_eq!(clock.now_ms(), 10.0);

        clock.on_tick(Duration::from_millis(5));
        assert_eq!(clock.elapsed(), Duration::from_millis(15));

        clock.reset();
        assert_eq!(clock.now_ms(), 0.0);
    }

    #[test]
    #[should_panic(expected = "Cannot advance time by more than 24 hours")]
    fn test_clock_max_advance_limit() {
        let mut clock = ManualClock::new();
        clock.advance(Duration::from_secs(86401));
    }

    #[test]
    fn test_wall_clock_is_monotonic() {
        let clock = WallClock::new();
        let first = clock.now_ms();
        let second = clock.now_ms();
        assert!(second >= first);
    }

    #[test]
    fn test_deterministic_rng_reproducibility() {
        let mut rng1 = DeterministicRng::from_seed(12345);
        let mut rng2 = DeterministicRng::from_seed(12345);

        let values1: Vec<f64> = (0..10).map(|_| rng1.next_f64()).collect();
        let values2: Vec<f64> = (0..10).map(|_| rng2.next_f64()).collect();

        assert_eq!(values1, values2);
        assert!(values1.iter().all(|v| (0.0..1.0).contains(v)));
    }

    #[test]
    fn test_rng_index_and_uniform_bounds() {
        let mut rng = DeterministicRng::from_seed(7);
        for _ in 0..1000 {
            assert!(rng.index(3) < 3);
            let sample = rng.uniform(50.0, 150.0);
            assert!((50.0..=150.0).contains(&sample));
        }
        assert_eq!(rng.uniform(50.0, 50.0), 50.0);
    }

    #[test]
    fn test_entropy_seed_is_recorded() {
        let rng = DeterministicRng::from_entropy();
        let mut replay = DeterministicRng::from_seed(rng.seed());
        let mut original = rng.clone();
        assert_eq!(original.next_f64(), replay.next_f64());
    }
}
