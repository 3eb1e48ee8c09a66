//! Capped exponential backoff with jitter for the outbound connector:
//! `backoff()` returns a duration and advances an internal attempt counter;
//! `reset()` zeroes it once a dial succeeds. Same shape as
//! `trustmesh-gossip::payload_scheduler::Backoff`, kept as a separate type
//! since the two crates don't share a dependency edge.

use std::time::Duration;

use rand::Rng;

const BASE_DELAY_MS: u64 = 1_000;
const MAX_DELAY_MS: u64 = 120_000;
const MAX_SHIFT: u32 = 16;

pub struct Backoff {
    attempt: u32,
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new()
    }
}

impl Backoff {
    pub fn new() -> Self {
        Self { attempt: 0 }
    }

    pub fn backoff(&mut self) -> Duration {
        let shift = self.attempt.min(MAX_SHIFT);
        let exp = BASE_DELAY_MS.saturating_mul(1u64 << shift);
        let capped = exp.min(MAX_DELAY_MS);
        self.attempt = self.attempt.saturating_add(1);
        let jitter: f64 = rand::thread_rng().gen_range(0.5..1.5);
        Duration::from_millis(((capped as f64) * jitter) as u64)
    }

    pub fn reset(&mut self) {
        self.attempt = 0;
    }

    pub fn attempts(&self) -> u32 {
        self.attempt
    }
}
