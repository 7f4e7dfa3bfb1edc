//! Atomic file publication via same-directory staging files.
//!
//! This module provides the [`AtomicFile`] handle which guarantees that a
//! target path is either fully written with its final content or left
//! untouched, even if the process is interrupted mid-write.
//!
//! # Overview
//!
//! Output is staged in a uniquely named temporary file created in the *same
//! directory* as the target. A rename is only atomic within one filesystem,
//! so staging next to the target is what makes the publish step safe -
//! readers of the target path observe either the fully-old or the fully-new
//! file, never a mix.
//!
//! # Example
//!
//! ```no_run
//! use fetchstore::storage::AtomicFile;
//!
//! # async fn example() -> Result<(), fetchstore::storage::StoreError> {
//! let mut file = AtomicFile::create("./downloads/page-001.jpg").await?;
//! file.write_all(b"payload bytes").await?;
//! file.commit().await?;
//! # Ok(())
//! # }
//! ```
//!
//! Dropping the handle without calling [`AtomicFile::commit`] discards the
//! staged content and removes the temporary file.

use std::path::{Path, PathBuf};

use rand::Rng;
use tokio::fs::{self, File};
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, instrument, warn};

use super::StoreError;

/// A scoped writable handle that publishes atomically on commit.
///
/// The target path is never observably modified until [`commit`] succeeds.
/// On drop without commit, the staged temporary file is removed; removal
/// failures are logged rather than raised so they never mask the error that
/// caused the abort.
///
/// [`commit`]: AtomicFile::commit
#[derive(Debug)]
pub struct AtomicFile {
    target: PathBuf,
    temp_path: PathBuf,
    writer: Option<BufWriter<File>>,
    finalized: bool,
}

impl AtomicFile {
    /// Creates the staging file for `target`, creating parent directories
    /// as needed (idempotent if they already exist).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] if the parent directory or the staging
    /// file cannot be created.
    #[instrument(skip_all, fields(target = %target.as_ref().display()))]
    pub async fn create(target: impl AsRef<Path>) -> Result<Self, StoreError> {
        let target = target.as_ref().to_path_buf();

        if let Some(parent) = target.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .await
                    .map_err(|e| StoreError::io(parent, e))?;
            }
        }

        // Staging file must live in the target's directory: cross-volume
        // renames are not atomic.
        let temp_path = temp_sibling(&target);
        let file = File::create(&temp_path)
            .await
            .map_err(|e| StoreError::io(&temp_path, e))?;

        debug!(temp = %temp_path.display(), "staged temporary file");

        Ok(Self {
            target,
            temp_path,
            writer: Some(BufWriter::new(file)),
            finalized: false,
        })
    }

    /// Writes a chunk of output to the staging file.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] if the write fails; the staged file is
    /// cleaned up when the handle is dropped.
    pub async fn write_all(&mut self, buf: &[u8]) -> Result<(), StoreError> {
        let Some(writer) = self.writer.as_mut() else {
            return Err(StoreError::io(
                &self.temp_path,
                std::io::Error::other("atomic file already finalized"),
            ));
        };
        writer
            .write_all(buf)
            .await
            .map_err(|e| StoreError::io(&self.temp_path, e))
    }

    /// Flushes, syncs, and atomically publishes the staged content at the
    /// target path.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] if flush, sync, or rename fails. The
    /// target path is unchanged on error and the staging file is removed.
    #[instrument(skip_all, fields(target = %self.target.display()))]
    pub async fn commit(mut self) -> Result<(), StoreError> {
        let Some(mut writer) = self.writer.take() else {
            return Err(StoreError::io(
                &self.temp_path,
                std::io::Error::other("atomic file already finalized"),
            ));
        };

        writer
            .flush()
            .await
            .map_err(|e| StoreError::io(&self.temp_path, e))?;

        let file = writer.into_inner();
        file.sync_all()
            .await
            .map_err(|e| StoreError::io(&self.temp_path, e))?;
        drop(file);

        fs::rename(&self.temp_path, &self.target)
            .await
            .map_err(|e| StoreError::io(&self.target, e))?;

        self.finalized = true;
        debug!("published atomically");
        Ok(())
    }

    /// Discards the staged content without touching the target path.
    pub async fn cancel(mut self) {
        self.writer = None;
        if let Err(error) = fs::remove_file(&self.temp_path).await {
            warn!(
                temp = %self.temp_path.display(),
                %error,
                "failed to remove cancelled temporary file"
            );
        }
        self.finalized = true;
    }

    /// Returns the target path this handle will publish to.
    #[must_use]
    pub fn target(&self) -> &Path {
        &self.target
    }
}

impl Drop for AtomicFile {
    fn drop(&mut self) {
        if self.finalized {
            return;
        }
        // Close the staging file handle before unlinking.
        self.writer = None;
        if let Err(error) = std::fs::remove_file(&self.temp_path) {
            if error.kind() != std::io::ErrorKind::NotFound {
                warn!(
                    temp = %self.temp_path.display(),
                    %error,
                    "failed to remove stale temporary file"
                );
            }
        }
    }
}

/// Writes `bytes` to `path` atomically in one shot.
///
/// # Errors
///
/// Returns [`StoreError::Io`] if staging, writing, or publishing fails;
/// the target path is unchanged on error.
pub async fn atomic_write(path: impl AsRef<Path>, bytes: &[u8]) -> Result<(), StoreError> {
    let mut file = AtomicFile::create(path).await?;
    file.write_all(bytes).await?;
    file.commit().await
}

/// Derives a uniquely named staging path in the same directory as `target`.
fn temp_sibling(target: &Path) -> PathBuf {
    let nonce: u64 = rand::thread_rng().gen_range(0..u64::MAX);
    let name = target
        .file_name()
        .map_or_else(|| "file".to_string(), |n| n.to_string_lossy().into_owned());
    target.with_file_name(format!(".{name}.{nonce:016x}.tmp"))
}
