//! Error types for the storage module.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while persisting or hashing files.
#[derive(Debug, Error)]
pub enum StoreError {
    /// File system error during create, write, sync, or publish.
    #[error("IO error at {path}: {source}")]
    Io {
        /// The file path where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// A value could not be serialized for storage.
    #[error("serialization error for {path}: {source}")]
    Serialize {
        /// The target path of the failed serialization.
        path: PathBuf,
        /// The underlying serde error.
        #[source]
        source: serde_json::Error,
    },
}

impl StoreError {
    /// Creates an IO error with path context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates a serialization error with path context.
    pub fn serialize(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Self::Serialize {
            path: path.into(),
            source,
        }
    }
}

// Note on From trait implementations:
// We intentionally do NOT implement `From<std::io::Error>` because our error
// variants require path context that the source error does not provide. The
// helper constructors are the correct pattern here.
