//! Adaptive pacing and retry execution for outbound requests.
//!
//! The remote service's tolerance for request volume is unknown and
//! variable, so this module paces admission through an adaptive controller
//! and wraps each fetch in a retry loop:
//!
//! - [`AdaptiveLimiter`] - the admission gate; tracks a target request rate
//!   and adjusts it from the observed success/failure ratio
//! - [`run_with_retry`] - wraps an opaque asynchronous operation with
//!   admission control, outcome reporting, and backoff retries
//!
//! The HTTP request itself is supplied by the caller as a closure; this
//! module never touches the network.

mod rate_limiter;
mod retry;

pub use rate_limiter::{AdaptiveLimiter, LimiterConfig};
pub use retry::{DEFAULT_BACKOFF_FACTOR, DEFAULT_MAX_RETRIES, RetryPolicy, run_with_retry};
