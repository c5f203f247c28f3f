//! Injectable randomness.
//!
//! # Responsibilities
//! - Provide the dice rolls behind jitter, latency and fault injection
//! - Allow tests to replace the dice with a fixed script
//!
//! # Design Decisions
//! - No global seed: every component receives its source at construction
//! - Sources are `Send + Sync` so concurrent handlers can share one

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// A uniform source of small integers.
pub trait RandomSource: Send + Sync {
    /// Roll a value in `0..n`. Returns 0 when `n` is 0.
    fn below(&self, n: u32) -> u32;
}

/// `StdRng` behind a mutex.
pub struct SeededRandom {
    rng: Mutex<StdRng>,
}

impl SeededRandom {
    /// Deterministic source for reproducible runs.
    pub fn from_seed(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// Source seeded from the OS.
    pub fn from_entropy() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }
}

impl RandomSource for SeededRandom {
    fn below(&self, n: u32) -> u32 {
        if n == 0 {
            return 0;
        }
        // A poisoned lock still holds a usable generator.
        let mut rng = match self.rng.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        rng.gen_range(0..n)
    }
}

/// Replays a fixed sequence of rolls, wrapping around at the end.
///
/// Each roll is clamped to `n - 1`, so a script of `[0]` always takes the
/// lowest branch and `[u32::MAX]` always the highest.
pub struct ScriptedRandom {
    rolls: Vec<u32>,
    cursor: AtomicUsize,
}

impl ScriptedRandom {
    pub fn new(rolls: impl Into<Vec<u32>>) -> Self {
        Self {
            rolls: rolls.into(),
            cursor: AtomicUsize::new(0),
        }
    }

    /// Number of rolls taken so far.
    pub fn taken(&self) -> usize {
        self.cursor.load(Ordering::SeqCst)
    }
}

impl RandomSource for ScriptedRandom {
    fn below(&self, n: u32) -> u32 {
        if n == 0 || self.rolls.is_empty() {
            return 0;
        }
        let i = self.cursor.fetch_add(1, Ordering::SeqCst) % self.rolls.len();
        self.rolls[i].min(n - 1)
    }
}

/// A randomized duration: `step * below(steps)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Jitter {
    pub step: Duration,
    pub steps: u32,
}

impl Jitter {
    pub const fn new(step: Duration, steps: u32) -> Self {
        Self { step, steps }
    }

    /// A jitter that never waits.
    pub const fn none() -> Self {
        Self {
            step: Duration::ZERO,
            steps: 0,
        }
    }

    pub fn sample(&self, random: &dyn RandomSource) -> Duration {
        self.step * random.below(self.steps)
    }
}
