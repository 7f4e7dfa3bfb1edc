//! Retry execution with limiter admission and exponential backoff.
//!
//! This module provides [`run_with_retry`], which wraps an arbitrary
//! asynchronous operation - typically an HTTP fetch supplied by a layer
//! outside this crate - with the full resilience loop: rate-limiter
//! admission before every attempt, success/failure reporting back to the
//! limiter, and exponentially growing backoff with additive jitter between
//! failed attempts.
//!
//! # Example
//!
//! ```no_run
//! use fetchstore::fetch::{AdaptiveLimiter, LimiterConfig, RetryPolicy, run_with_retry};
//!
//! # async fn fetch_page(url: &str) -> Result<Vec<u8>, String> { Ok(Vec::new()) }
//! # async fn example() -> Result<(), String> {
//! let limiter = AdaptiveLimiter::new(LimiterConfig::default());
//! let url = "https://example.com/gallery/1";
//!
//! let payload = run_with_retry(&limiter, RetryPolicy::default(), || fetch_page(url)).await?;
//! # Ok(())
//! # }
//! ```

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, error, warn};

use super::AdaptiveLimiter;

/// Default maximum retry count (up to 4 total attempts).
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default backoff multiplier between retries.
pub const DEFAULT_BACKOFF_FACTOR: f64 = 1.5;

/// Configuration for retry behavior.
///
/// # Delay Calculation
///
/// ```text
/// delay = backoff_factor ^ retries + uniform_random(0, 1) seconds
/// ```
///
/// With defaults, backoffs are approximately 1.5s, 2.25s, 3.4s plus jitter.
/// The jitter prevents thundering-herd retries across many
/// concurrently-failing callers.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Maximum number of retries after the initial attempt.
    pub max_retries: u32,
    /// Multiplier for exponential backoff growth.
    pub backoff_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            backoff_factor: DEFAULT_BACKOFF_FACTOR,
        }
    }
}

impl RetryPolicy {
    /// Creates a policy with custom settings.
    #[must_use]
    pub fn new(max_retries: u32, backoff_factor: f64) -> Self {
        Self {
            max_retries,
            backoff_factor,
        }
    }

    /// Backoff before retry number `retries` (1-indexed).
    fn backoff_delay(&self, retries: u32) -> Duration {
        let exponent = i32::try_from(retries).unwrap_or(i32::MAX);
        let backoff = self.backoff_factor.powi(exponent);
        let jitter: f64 = rand::thread_rng().gen_range(0.0..1.0);
        Duration::from_secs_f64(backoff + jitter)
    }
}

/// Runs `operation` through the resilience loop until it succeeds or
/// retries are exhausted.
///
/// Before **every** attempt (including the first) the caller passes through
/// the limiter's admission gate. Each outcome is reported back to the
/// limiter so it can adapt its rate. On success the result is returned
/// immediately; on failure the executor backs off and retries until
/// `policy.max_retries` retries have been spent, then returns the last
/// error as the terminal failure.
///
/// # Errors
///
/// Returns the operation's final error after `max_retries + 1` total
/// attempts have failed.
pub async fn run_with_retry<T, E, F, Fut>(
    limiter: &AdaptiveLimiter,
    policy: RetryPolicy,
    mut operation: F,
) -> Result<T, E>
where
    E: Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut retries: u32 = 0;

    loop {
        limiter.wait().await;

        match operation().await {
            Ok(value) => {
                limiter.record_success().await;
                if retries > 0 {
                    debug!(retries, "operation succeeded after retries");
                }
                return Ok(value);
            }
            Err(err) => {
                limiter.record_failure().await;
                retries += 1;

                if retries > policy.max_retries {
                    error!(
                        max_retries = policy.max_retries,
                        error = %err,
                        "giving up after exhausting retries"
                    );
                    return Err(err);
                }

                let delay = policy.backoff_delay(retries);
                warn!(
                    retry = retries,
                    max_retries = policy.max_retries,
                    delay_ms = delay.as_millis(),
                    error = %err,
                    "attempt failed, backing off"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}
