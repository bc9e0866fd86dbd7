use std::time::Duration;

use rand::Rng;

/// Exponential backoff with optional full jitter, used between attempts of
/// one item transfer.
#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    initial: Duration,
    cap: Duration,
    jitter: bool,
}

impl Backoff {
    pub fn new(initial: Duration, cap: Duration, jitter: bool) -> Self {
        Self {
            initial,
            cap,
            jitter,
        }
    }

    pub fn delay(&self, attempt: u32) -> Duration {
        self.delay_with_rng(attempt, &mut rand::thread_rng())
    }

    pub fn delay_with_rng<R: Rng + ?Sized>(&self, attempt: u32, rng: &mut R) -> Duration {
        let initial_ms = self.initial.as_millis().min(u128::from(u64::MAX)) as u64;
        let cap_ms = self.cap.as_millis().min(u128::from(u64::MAX)) as u64;
        let exp_ms = initial_ms
            .saturating_mul(1u64 << attempt.min(16))
            .min(cap_ms);
        let delay_ms = if self.jitter {
            rng.gen_range(0..=exp_ms)
        } else {
            exp_ms
        };
        Duration::from_millis(delay_ms)
    }
}
