//! Fetchstore Core Library
//!
//! This library provides the resilient fetch-and-persist core for a content
//! downloading tool: it paces and retries outbound requests against a remote
//! service of unknown tolerance, and stores the resulting payloads durably
//! and verifiably on disk.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`fetch`] - Adaptive rate limiting and retry execution
//! - [`cache`] - Durable key/value content cache with lazy TTL expiry
//! - [`storage`] - Atomic file publication and integrity verification
//!
//! The HTTP client itself lives outside this crate: the retry executor wraps
//! an opaque asynchronous operation supplied by the caller. A typical fetch
//! checks the cache first, runs the operation through [`fetch::run_with_retry`]
//! on a miss, and writes the payload back via the cache (which publishes
//! through [`storage::AtomicFile`]).

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cache;
pub mod fetch;
pub mod storage;

// Re-export commonly used types
pub use cache::{Cache, DEFAULT_MAX_AGE, default_cache_dir};
pub use fetch::{
    AdaptiveLimiter, DEFAULT_BACKOFF_FACTOR, DEFAULT_MAX_RETRIES, LimiterConfig, RetryPolicy,
    run_with_retry,
};
pub use storage::{
    AtomicFile, HashAlgorithm, StoreError, atomic_write, calculate_file_hash, safe_filename,
    verify_file_integrity,
};
