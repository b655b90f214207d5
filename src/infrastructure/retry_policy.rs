//! Reusable retry strategy
//!
//! A [`RetryPolicy`] pairs an attempt budget with a [`Backoff`] function so
//! call sites describe *what* to retry and never hand-roll sleep loops.

use std::fmt;
use std::time::Duration;

use futures::future::BoxFuture;
use thiserror::Error;
use tracing::{info, warn};

/// Delay to wait before a retry
#[derive(Debug, Clone, PartialEq)]
pub enum Backoff {
    Fixed(Duration),
    /// `base * 2^(retry-1)`, capped at `max`, optionally with 50%-150% jitter
    Exponential {
        base: Duration,
        max: Duration,
        jitter: bool,
    },
}

impl Backoff {
    /// Delay before retry number `retry` (1-based)
    pub fn delay_for(&self, retry: u32) -> Duration {
        match self {
            Self::Fixed(delay) => *delay,
            Self::Exponential { base, max, jitter } => {
                let factor = 2_u32.saturating_pow(retry.saturating_sub(1));
                let capped = base.saturating_mul(factor).min(*max);
                if *jitter {
                    capped.mul_f64(0.5 + fastrand::f64())
                } else {
                    capped
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    pub backoff: Backoff,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{label} failed after {attempts} attempts: {last_error}")]
pub struct RetryExhausted {
    pub label: String,
    pub attempts: u32,
    pub last_error: String,
}

impl RetryPolicy {
    pub const fn new(max_attempts: u32, backoff: Backoff) -> Self {
        Self {
            max_attempts,
            backoff,
        }
    }

    /// Single attempt, no waiting
    pub const fn none() -> Self {
        Self::new(1, Backoff::Fixed(Duration::ZERO))
    }

    /// Delay before the next attempt, or `None` once `attempt` used up the budget
    pub fn delay_after_failure(&self, attempt: u32) -> Option<Duration> {
        (attempt < self.max_attempts.max(1)).then(|| self.backoff.delay_for(attempt))
    }

    /// Run `operation` against `target` until it succeeds or the budget runs out.
    ///
    /// The operation borrows `target` mutably on each attempt, which is what
    /// stateful sources (a browser session, a cookie jar) need.
    pub async fn run_with<S, T, E, F>(
        &self,
        label: &str,
        target: &mut S,
        mut operation: F,
    ) -> Result<T, RetryExhausted>
    where
        S: ?Sized + Send,
        E: fmt::Display,
        F: for<'a> FnMut(&'a mut S) -> BoxFuture<'a, Result<T, E>>,
    {
        let mut attempt = 1;
        loop {
            match operation(&mut *target).await {
                Ok(value) => {
                    if attempt > 1 {
                        info!("{} succeeded on attempt {}", label, attempt);
                    }
                    return Ok(value);
                }
                Err(error) => match self.delay_after_failure(attempt) {
                    Some(delay) => {
                        warn!(
                            "{} attempt {} failed, retrying in {:?}: {}",
                            label, attempt, delay, error
                        );
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                    }
                    None => {
                        warn!("{} attempt {} failed, giving up: {}", label, attempt, error);
                        return Err(RetryExhausted {
                            label: label.to_string(),
                            attempts: attempt,
                            last_error: error.to_string(),
                        });
                    }
                },
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Backoff::Fixed(Duration::from_secs(3)))
    }
}
