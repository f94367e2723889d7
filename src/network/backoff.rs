// src/network/backoff.rs
//! Exponential backoff for connection attempts

use rand::Rng;
use std::time::Duration;
use tokio::time::Instant;

/// Retry parameters for the connect loop
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// First delay
    pub initial_interval: Duration,
    /// Growth factor between attempts
    pub multiplier: f64,
    /// Upper bound of the nominal delay
    pub max_interval: Duration,
    /// Each delay is drawn from `nominal * [1 - f, 1 + f]`
    pub randomization_factor: f64,
    /// Give up after this much time, `None` retries forever
    pub max_elapsed: Option<Duration>,
    /// How long a redirected endpoint may fail before reverting to the default
    pub redirect_window: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            initial_interval: Duration::from_millis(500),
            multiplier: 2.0,
            max_interval: Duration::from_secs(60),
            randomization_factor: 0.5,
            max_elapsed: None,
            redirect_window: Duration::from_secs(5 * 60),
        }
    }
}

/// Backoff state for one connect cycle
#[derive(Debug)]
pub struct Backoff {
    policy: RetryPolicy,
    current: Duration,
    started: Instant,
}

impl Backoff {
    /// Starts a fresh backoff clock
    pub fn new(policy: RetryPolicy) -> Self {
        let current = policy.initial_interval;
        Backoff {
            policy,
            current,
            started: Instant::now(),
        }
    }

    /// Retry parameters
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Time since the clock was started or last reset
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Restarts from the initial delay with a zero elapsed time
    pub fn reset(&mut self) {
        self.current = self.policy.initial_interval;
        self.started = Instant::now();
    }

    /// Next jittered delay, `None` once the retry budget is spent
    pub fn next_delay(&mut self) -> Option<Duration> {
        if let Some(max) = self.policy.max_elapsed {
            if self.elapsed() > max {
                return None;
            }
        }

        let nominal = self.current;
        self.current = nominal
            .mul_f64(self.policy.multiplier)
            .min(self.policy.max_interval);

        let factor = self.policy.randomization_factor.clamp(0.0, 1.0);
        if factor == 0.0 {
            return Some(nominal);
        }
        let jitter = rand::thread_rng().gen_range(1.0 - factor..=1.0 + factor);
        Some(nominal.mul_f64(jitter))
    }
}
