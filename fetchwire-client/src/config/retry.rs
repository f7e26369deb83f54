//! Retry timing.
//!
//! [`RetryPolicy`] decides how many times a failed request may be sent again
//! and how long to wait in between. The delays grow exponentially from
//! `base_delay` by `multiplier` up to `max_delay`, each randomized by
//! `jitter` so that clients failing together do not retry together.
//!
//! Which failures are worth retrying is decided by the
//! [`RetryRequests`](crate::interceptors::RetryRequests) interceptor, not
//! here.

use std::time::Duration;

/// Default retry timing.
pub mod defaults {
    use std::time::Duration;

    pub const BASE_DELAY: Duration = Duration::from_millis(100);

    pub const MULTIPLIER: f64 = 2.0;

    /// 0.2 means each delay is randomized within +/- 20%.
    pub const JITTER: f64 = 0.2;

    pub const MAX_DELAY: Duration = Duration::from_secs(10);

    pub const MAX_RETRIES: u32 = 2;
}

/// How often and how patiently to retry.
///
/// # Example
///
/// ```
/// use fetchwire_client::RetryPolicy;
/// use std::time::Duration;
///
/// let policy = RetryPolicy::new()
///     .max_retries(3)
///     .base_delay(Duration::from_millis(50));
/// assert!(policy.validate().is_ok());
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct RetryPolicy {
    /// Delay before the first retry.
    pub base_delay: Duration,

    /// Growth factor applied after every retry. Must be at least 1.0.
    pub multiplier: f64,

    /// Randomization factor between 0.0 and 1.0.
    pub jitter: f64,

    /// Upper bound for a single delay.
    pub max_delay: Duration,

    /// Retries allowed after the first attempt.
    pub max_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: defaults::BASE_DELAY,
            multiplier: defaults::MULTIPLIER,
            jitter: defaults::JITTER,
            max_delay: defaults::MAX_DELAY,
            max_retries: defaults::MAX_RETRIES,
        }
    }
}

impl RetryPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// A policy that never retries.
    pub fn no_retry() -> Self {
        Self {
            max_retries: 0,
            ..Default::default()
        }
    }

    /// Short delays for latency-sensitive calls: 5 retries starting at 20ms,
    /// capped at 500ms.
    pub fn aggressive() -> Self {
        Self {
            base_delay: Duration::from_millis(20),
            max_delay: Duration::from_millis(500),
            max_retries: 5,
            ..Default::default()
        }
    }

    /// Long delays for background work: 8 retries starting at 1s, capped at
    /// one minute.
    pub fn patient() -> Self {
        Self {
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            max_retries: 8,
            ..Default::default()
        }
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    pub fn jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter;
        self
    }

    /// Check that the timing parameters are consistent.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.base_delay > self.max_delay {
            return Err("base_delay must not exceed max_delay");
        }
        if !(self.multiplier >= 1.0) {
            return Err("multiplier must be >= 1.0");
        }
        if !(0.0..=1.0).contains(&self.jitter) {
            return Err("jitter must be between 0.0 and 1.0");
        }
        Ok(())
    }

    /// Start a fresh backoff sequence.
    pub fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff::new(self.clone())
    }
}

/// The delay sequence of one logical request.
#[derive(Clone, Debug)]
pub struct ExponentialBackoff {
    policy: RetryPolicy,
    next_secs: f64,
    attempts: u32,
}

impl ExponentialBackoff {
    pub fn new(policy: RetryPolicy) -> Self {
        let next_secs = policy.base_delay.as_secs_f64();
        Self {
            policy,
            next_secs,
            attempts: 0,
        }
    }

    /// Retries handed out so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn can_retry(&self) -> bool {
        self.attempts < self.policy.max_retries
    }

    /// The delay before the next retry. Advances the sequence.
    pub fn next_delay(&mut self) -> Duration {
        let max = self.policy.max_delay.as_secs_f64();
        let mut delay = self.next_secs;
        if self.policy.jitter > 0.0 {
            let spread = rand::random::<f64>() * 2.0 - 1.0;
            delay *= 1.0 + self.policy.jitter * spread;
        }

        self.next_secs = (self.next_secs * self.policy.multiplier).min(max);
        self.attempts += 1;

        Duration::from_secs_f64(delay.clamp(0.0, max))
    }
}
