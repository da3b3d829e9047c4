/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Pluggable timing policy that keeps proposers live.
//!
//! A proposer that fails to gather a quorum, either because its phase deadline expired or because it
//! saw a higher ballot, waits for a [`backoff`](RetryPolicy::backoff) delay and then starts a new
//! attempt with a fresh ballot. Randomizing the delay keeps two proposers from preempting each other
//! forever.

use std::{cmp::min, convert::identity, time::Duration};

use rand::{rngs::StdRng, Rng, SeedableRng};

/// # Safety
///
/// Durations returned by [`RetryPolicy::phase_timeout`] and [`RetryPolicy::backoff`] must be "well
/// below" [u64::MAX] seconds. A good limit is to cap them at [u32::MAX].
///
/// In the most popular target platforms, Durations can only go up to [u64::MAX] seconds, so keeping
/// returned durations lower than [u64::MAX] avoids overflows in calling code, which adds the returned
/// duration to an `Instant`.
pub trait RetryPolicy: Send {
    /// How long an attempt may wait for a quorum in one phase. `attempt` counts the failed attempts
    /// so far for the instance, starting at 0.
    fn phase_timeout(&mut self, attempt: u32) -> Duration;

    /// How long to wait before starting the next attempt after failed attempt number `attempt`.
    fn backoff(&mut self, attempt: u32) -> Duration;
}

/// Exponential phase timeouts and exponential backoff with full jitter.
///
/// - `phase_timeout(a) = min(max_phase_timeout, phase_timeout · 2^a)`.
/// - `backoff(a)` is uniformly random in `[0, min(max_phase_timeout, retry_backoff · 2^a)]`.
pub struct DefaultRetryPolicy {
    phase_timeout: Duration,
    max_phase_timeout: Duration,
    retry_backoff: Duration,
    rng: StdRng,
}

impl DefaultRetryPolicy {
    /// # Safety
    ///
    /// All arguments must not be larger than [u32::MAX] seconds for reasons explained in
    /// [RetryPolicy].
    pub fn new(
        phase_timeout: Duration,
        max_phase_timeout: Duration,
        retry_backoff: Duration,
    ) -> DefaultRetryPolicy {
        Self {
            phase_timeout,
            max_phase_timeout,
            retry_backoff,
            rng: StdRng::from_entropy(),
        }
    }

    /// Like [`new`](Self::new), but with a deterministic source of jitter.
    pub fn with_seed(
        phase_timeout: Duration,
        max_phase_timeout: Duration,
        retry_backoff: Duration,
        seed: u64,
    ) -> DefaultRetryPolicy {
        Self {
            phase_timeout,
            max_phase_timeout,
            retry_backoff,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    fn exponential(&self, base: Duration, attempt: u32) -> Duration {
        let factor = u32::checked_pow(2, attempt).map_or(u32::MAX, identity);
        min(
            self.max_phase_timeout,
            base.checked_mul(factor).unwrap_or(self.max_phase_timeout),
        )
    }
}

impl RetryPolicy for DefaultRetryPolicy {
    fn phase_timeout(&mut self, attempt: u32) -> Duration {
        self.exponential(self.phase_timeout, attempt)
    }

    fn backoff(&mut self, attempt: u32) -> Duration {
        let ceiling = min(
            u64::from(u32::MAX),
            self.exponential(self.retry_backoff, attempt).as_millis() as u64,
        );
        Duration::from_millis(self.rng.gen_range(0, ceiling + 1))
    }
}

#[test]
fn default_retry_policy_is_exponential_and_capped() {
    let mut policy = DefaultRetryPolicy::with_seed(
        Duration::from_millis(500),
        Duration::from_secs(8),
        Duration::from_millis(200),
        7,
    );

    assert_eq!(policy.phase_timeout(0), Duration::from_millis(500));
    assert_eq!(policy.phase_timeout(1), Duration::from_millis(1000));
    assert_eq!(policy.phase_timeout(4), Duration::from_secs(8));
    assert_eq!(policy.phase_timeout(40), Duration::from_secs(8));

    for attempt in 0..40 {
        let ceiling = min(
            Duration::from_secs(8),
            Duration::from_millis(200).saturating_mul(u32::checked_pow(2, attempt).unwrap_or(u32::MAX)),
        );
        assert!(policy.backoff(attempt) <= ceiling);
    }
}
