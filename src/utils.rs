use std::time::{Duration, Instant};

use burn::prelude::Backend;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::info;

/// Seed the backend's generator and return a host RNG from the same seed.
pub fn set_seed<B: Backend>(seed: u64) -> StdRng {
    B::seed(seed);
    StdRng::seed_from_u64(seed)
}

/// Wall-clock tracking across a fixed number of epochs.
#[derive(Debug, Clone)]
pub struct Timer {
    total: usize,
    done: usize,
    start: Instant,
    last: Instant,
}

impl Timer {
    pub fn new(total: usize) -> Self {
        let now = Instant::now();
        Timer {
            total,
            done: 0,
            start: now,
            last: now,
        }
    }

    /// Restart the clock.
    pub fn init(&mut self) {
        self.done = 0;
        self.start = Instant::now();
        self.last = self.start;
    }

    /// Mark one epoch complete and log its duration, the elapsed time and
    /// the estimated remaining time. Returns the remaining estimate.
    pub fn step(&mut self) -> Duration {
        let now = Instant::now();
        let epoch_time = now - self.last;
        self.last = now;
        self.done += 1;

        let elapsed = now - self.start;
        let eta = self.eta(elapsed);
        info!(
            "Epoch time: {:.2}s, elapsed: {:.2}s, remaining: {:.2}s ({}/{})",
            epoch_time.as_secs_f64(),
            elapsed.as_secs_f64(),
            eta.as_secs_f64(),
            self.done,
            self.total
        );
        eta
    }

    fn eta(&self, elapsed: Duration) -> Duration {
        let remaining = self.total.saturating_sub(self.done);
        if self.done == 0 || remaining == 0 {
            return Duration::ZERO;
        }
        elapsed / self.done as u32 * remaining as u32
    }

    pub fn completed(&self) -> usize {
        self.done
    }
}
