//! Adaptive request pacing against a remote service of unknown capacity.
//!
//! This module provides the [`AdaptiveLimiter`] struct which paces request
//! admission at a target rate and adjusts that rate continuously based on
//! the observed success/failure ratio.
//!
//! # Overview
//!
//! The limiter is a multiplicative increase / multiplicative decrease
//! controller over a single `current_rate` (requests per second). The
//! controller is intentionally asymmetric - a gentle 10% increase when
//! nearly everything succeeds, a sharp 20% cut when failures mount - to
//! bias toward caution when the remote's tolerance is unknown.
//!
//! # Example
//!
//! ```no_run
//! use fetchstore::fetch::{AdaptiveLimiter, LimiterConfig};
//!
//! # async fn example() {
//! let limiter = AdaptiveLimiter::new(LimiterConfig::default());
//!
//! // Every attempt passes through the admission gate first.
//! limiter.wait().await;
//! // ... perform the request ...
//! limiter.record_success().await;
//! # }
//! ```

use std::time::Duration;

use rand::Rng;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, instrument};

/// Upper bound on the random jitter added to each admission wait (ms).
///
/// Jitter desynchronizes callers that are all paced by the same limiter,
/// preventing synchronized bursts.
const WAIT_JITTER_MAX_MS: u64 = 100;

/// Minimum interval between rate adjustments.
const ADJUSTMENT_INTERVAL: Duration = Duration::from_secs(5);

/// Minimum observations accumulated before an adjustment is considered.
const MIN_OBSERVATIONS: u64 = 5;

/// Success ratio above which the rate is eased upward.
const INCREASE_THRESHOLD: f64 = 0.95;

/// Success ratio below which the rate is cut back.
const DECREASE_THRESHOLD: f64 = 0.80;

/// Multiplier applied when easing the rate upward.
const INCREASE_FACTOR: f64 = 1.1;

/// Multiplier applied when backing off.
const DECREASE_FACTOR: f64 = 0.8;

/// Smallest accepted rate bound. Rates at or below zero would make the
/// admission pace non-finite, so configured bounds are raised to this floor.
const MIN_RATE_FLOOR: f64 = 0.001;

/// Configuration for [`AdaptiveLimiter`], in requests per second.
#[derive(Debug, Clone, Copy)]
pub struct LimiterConfig {
    /// Starting rate, clamped into `[min_rate, max_rate]` at construction.
    pub initial_rate: f64,
    /// Lower rate bound. Values at or below zero are raised to a small
    /// positive floor at construction so pacing stays finite.
    pub min_rate: f64,
    /// Upper rate bound.
    pub max_rate: f64,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            initial_rate: 5.0,
            min_rate: 1.0,
            max_rate: 10.0,
        }
    }
}

/// Shared counters and the current rate, guarded by one lock.
///
/// The lock is intentionally coarse-grained: the adjustment rule reads and
/// writes several fields together and must see a consistent snapshot.
#[derive(Debug)]
struct LimiterState {
    current_rate: f64,
    success_count: u64,
    fail_count: u64,
    last_adjustment: Instant,
}

/// Adaptive rate limiter shared by all fetch tasks of one logical client.
///
/// Wrap in `Arc` to share across spawned Tokio tasks; all state mutation
/// goes through one `tokio::sync::Mutex`, and [`wait`] holds that lock
/// across its sleep so request admission is serialized.
///
/// Invariant: `min_rate <= current_rate <= max_rate` at all times.
///
/// [`wait`]: AdaptiveLimiter::wait
#[derive(Debug)]
pub struct AdaptiveLimiter {
    min_rate: f64,
    max_rate: f64,
    state: Mutex<LimiterState>,
}

impl AdaptiveLimiter {
    /// Creates a limiter from `config`, clamping the initial rate into
    /// bounds so the rate invariant holds from birth.
    #[must_use]
    #[instrument(skip_all, fields(
        initial = config.initial_rate,
        min = config.min_rate,
        max = config.max_rate,
    ))]
    pub fn new(config: LimiterConfig) -> Self {
        let min_rate = config.min_rate.max(MIN_RATE_FLOOR);
        let max_rate = config.max_rate.max(min_rate);
        let current_rate = config.initial_rate.max(min_rate).min(max_rate);
        debug!(rate = current_rate, "creating adaptive limiter");
        Self {
            min_rate,
            max_rate,
            state: Mutex::new(LimiterState {
                current_rate,
                success_count: 0,
                fail_count: 0,
                last_adjustment: Instant::now(),
            }),
        }
    }

    /// Admission gate: suspends the caller for `1 / current_rate` seconds
    /// plus up to 100ms of random jitter.
    ///
    /// Callers must pass through this gate before every attempt. The state
    /// lock is held across the sleep, which is what serializes admission
    /// when many tasks share the limiter.
    #[instrument(skip(self))]
    pub async fn wait(&self) {
        let state = self.state.lock().await;
        let pace = Duration::from_secs_f64(1.0 / state.current_rate);
        let jitter = Duration::from_millis(rand::thread_rng().gen_range(0..=WAIT_JITTER_MAX_MS));
        debug!(
            rate = state.current_rate,
            pace_ms = pace.as_millis(),
            jitter_ms = jitter.as_millis(),
            "pacing request admission"
        );
        tokio::time::sleep(pace + jitter).await;
    }

    /// Records a successful request and re-evaluates the adjustment rule.
    pub async fn record_success(&self) {
        let mut state = self.state.lock().await;
        state.success_count += 1;
        self.maybe_adjust(&mut state);
    }

    /// Records a failed request and re-evaluates the adjustment rule.
    pub async fn record_failure(&self) {
        let mut state = self.state.lock().await;
        state.fail_count += 1;
        self.maybe_adjust(&mut state);
    }

    /// Returns the current target rate in requests per second.
    pub async fn current_rate(&self) -> f64 {
        self.state.lock().await.current_rate
    }

    /// Returns the configured lower rate bound.
    #[must_use]
    pub fn min_rate(&self) -> f64 {
        self.min_rate
    }

    /// Returns the configured upper rate bound.
    #[must_use]
    pub fn max_rate(&self) -> f64 {
        self.max_rate
    }

    /// Adjustment rule: acts only when at least [`ADJUSTMENT_INTERVAL`] has
    /// elapsed since the last adjustment AND at least [`MIN_OBSERVATIONS`]
    /// reports have accumulated - both gates keep small samples from causing
    /// noisy over-reaction. Counters reset whenever the rule acts, whether
    /// or not the rate changed.
    #[allow(clippy::cast_precision_loss)]
    fn maybe_adjust(&self, state: &mut LimiterState) {
        if state.last_adjustment.elapsed() < ADJUSTMENT_INTERVAL {
            return;
        }
        let total = state.success_count + state.fail_count;
        if total < MIN_OBSERVATIONS {
            return;
        }

        let success_ratio = state.success_count as f64 / total as f64;

        if success_ratio > INCREASE_THRESHOLD {
            state.current_rate = (state.current_rate * INCREASE_FACTOR).min(self.max_rate);
            info!(
                rate = state.current_rate,
                success_ratio, "increased request rate"
            );
        } else if success_ratio < DECREASE_THRESHOLD {
            state.current_rate = (state.current_rate * DECREASE_FACTOR).max(self.min_rate);
            info!(
                rate = state.current_rate,
                success_ratio, "decreased request rate"
            );
        } else {
            debug!(success_ratio, "request rate unchanged");
        }

        state.success_count = 0;
        state.fail_count = 0;
        state.last_adjustment = Instant::now();
    }

    /// Current (success, failure) counts since the last adjustment.
    #[cfg(test)]
    pub(crate) async fn report_counts(&self) -> (u64, u64) {
        let state = self.state.lock().await;
        (state.success_count, state.fail_count)
    }
}
