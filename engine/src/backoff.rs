//! Exponential backoff with jitter for transient dependency failures

use crate::cancel::CancelToken;
use rand::Rng;
use std::time::Duration;

/// Backoff schedule: base * factor^attempt with +-jitter, capped
#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    pub base: Duration,
    pub factor: f64,
    /// Fraction of the delay randomized in both directions
    pub jitter: f64,
    pub cap: Duration,
    pub max_attempts: u32,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(500),
            factor: 2.0,
            jitter: 0.2,
            cap: Duration::from_secs(30),
            max_attempts: 6,
        }
    }
}

impl Backoff {
    /// Delay before retry number `attempt` (0-based)
    pub fn delay(&self, attempt: u32) -> Duration {
        let raw = self.base.as_secs_f64() * self.factor.powi(attempt as i32);
        let capped = raw.min(self.cap.as_secs_f64());
        let spread = capped * self.jitter;
        let jittered = capped + rand::thread_rng().gen_range(-spread..=spread);
        Duration::from_secs_f64(jittered.max(0.0))
    }

    /// Run `op` until it succeeds, the error is permanent, attempts run
    /// out, or the token fires.
    pub fn retry<T, E, F>(&self, cancel: &CancelToken, mut op: F) -> Result<T, E>
    where
        F: FnMut() -> Result<T, E>,
        E: Transient,
    {
        let mut attempt = 0u32;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(err) => {
                    attempt += 1;
                    if !err.is_transient() || attempt >= self.max_attempts || cancel.is_cancelled() {
                        return Err(err);
                    }
                    log::warn!("transient failure (attempt {attempt}): retrying");
                    std::thread::sleep(self.delay(attempt - 1));
                }
            }
        }
    }
}

/// Classifies errors for retry purposes
pub trait Transient {
    fn is_transient(&self) -> bool;
}
