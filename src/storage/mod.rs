//! Crash-safe persistence primitives.
//!
//! This module provides the building blocks the rest of the crate stores
//! payloads with:
//!
//! - [`AtomicFile`] / [`atomic_write`] - all-or-nothing file publication
//! - [`calculate_file_hash`] / [`verify_file_integrity`] - content digests
//!   and non-fatal integrity checks
//! - [`safe_filename`] - filesystem-safe name sanitization
//!
//! # Example
//!
//! ```no_run
//! use fetchstore::storage::{atomic_write, verify_file_integrity, HashAlgorithm};
//! use std::path::Path;
//!
//! # async fn example() -> Result<(), fetchstore::storage::StoreError> {
//! let path = Path::new("./downloads/cover.jpg");
//! atomic_write(path, b"image bytes").await?;
//! assert!(verify_file_integrity(path, None, HashAlgorithm::Sha256).await);
//! # Ok(())
//! # }
//! ```

mod atomic;
mod error;
mod integrity;

pub use atomic::{AtomicFile, atomic_write};
pub use error::StoreError;
pub use integrity::{HashAlgorithm, calculate_file_hash, verify_file_integrity};

pub(crate) use integrity::hex_encode;

/// Characters replaced by [`safe_filename`].
const UNSAFE_FILENAME_CHARS: [char; 9] = ['\\', '/', ':', '*', '?', '"', '<', '>', '|'];

/// Replaces characters that are problematic in filenames with underscores.
#[must_use]
pub fn safe_filename(name: &str) -> String {
    name.chars()
        .map(|c| {
            if UNSAFE_FILENAME_CHARS.contains(&c) {
                '_'
            } else {
                c
            }
        })
        .collect()
}
