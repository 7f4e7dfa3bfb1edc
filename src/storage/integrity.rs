//! Integrity verification for stored files.
//!
//! Two independent, composable checks: the file can be opened and read at
//! all, and (when an expected digest is supplied) its full content hashes to
//! the expected value. Verification is a non-fatal convenience - any I/O
//! problem is reported as a failed check, never propagated - so callers can
//! use it for optional validation without an error path.

use std::path::Path;

use sha2::{Digest, Sha256, Sha512};
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tracing::{instrument, warn};

use super::StoreError;

/// Chunk size for streaming files through a digest.
///
/// Chunked reads keep memory bounded regardless of file size.
const HASH_CHUNK_SIZE: usize = 8192;

/// Digest algorithm used for file hashing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum HashAlgorithm {
    /// SHA-256, the default general-purpose digest.
    #[default]
    Sha256,
    /// SHA-512, for callers that require the longer digest.
    Sha512,
}

/// Computes the hex digest of a file's content.
///
/// The file is streamed through the digest in fixed-size chunks so
/// arbitrarily large files never require full in-memory buffering.
///
/// # Errors
///
/// Returns [`StoreError::Io`] if the file cannot be opened or read.
#[instrument(skip_all, fields(path = %path.display(), ?algorithm))]
pub async fn calculate_file_hash(
    path: &Path,
    algorithm: HashAlgorithm,
) -> Result<String, StoreError> {
    match algorithm {
        HashAlgorithm::Sha256 => hash_file::<Sha256>(path).await,
        HashAlgorithm::Sha512 => hash_file::<Sha512>(path).await,
    }
}

/// Verifies that a stored file is readable and, when `expected_hash` is
/// supplied, that its content digest matches.
///
/// Returns `false` for a missing or unreadable path and for a digest
/// mismatch. I/O errors are logged and reported as a failed check rather
/// than propagated.
#[instrument(skip_all, fields(path = %path.display(), ?algorithm))]
pub async fn verify_file_integrity(
    path: &Path,
    expected_hash: Option<&str>,
    algorithm: HashAlgorithm,
) -> bool {
    // Readability check: open and read at least one byte.
    let mut file = match File::open(path).await {
        Ok(file) => file,
        Err(error) => {
            warn!(%error, "stored file is not readable");
            return false;
        }
    };
    let mut probe = [0_u8; 1];
    if let Err(error) = file.read(&mut probe).await {
        warn!(%error, "failed to read stored file");
        return false;
    }

    let Some(expected) = expected_hash else {
        return true;
    };

    match calculate_file_hash(path, algorithm).await {
        Ok(actual) if actual.eq_ignore_ascii_case(expected) => true,
        Ok(actual) => {
            warn!(expected, actual, "hash mismatch for stored file");
            false
        }
        Err(error) => {
            warn!(%error, "failed to hash stored file");
            false
        }
    }
}

async fn hash_file<D: Digest>(path: &Path) -> Result<String, StoreError> {
    let mut file = File::open(path).await.map_err(|e| StoreError::io(path, e))?;
    let mut hasher = D::new();
    let mut chunk = vec![0_u8; HASH_CHUNK_SIZE];

    loop {
        let read = file
            .read(&mut chunk)
            .await
            .map_err(|e| StoreError::io(path, e))?;
        if read == 0 {
            break;
        }
        hasher.update(&chunk[..read]);
    }

    Ok(hex_encode(hasher.finalize().as_slice()))
}

pub(crate) fn hex_encode(bytes: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push(char::from(HEX[usize::from(byte >> 4)]));
        out.push(char::from(HEX[usize::from(byte & 0x0f)]));
    }
    out
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    /// SHA-256 of the ASCII string "hello".
    const HELLO_SHA256: &str = "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824";

    fn write_fixture(dir: &tempfile::TempDir, name: &str, content: &[u8]) -> std::path::PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    #[tokio::test]
    async fn test_calculate_file_hash_known_digest() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_fixture(&dir, "hello.txt", b"hello");

        let digest = calculate_file_hash(&path, HashAlgorithm::Sha256)
            .await
            .unwrap();
        assert_eq!(digest, HELLO_SHA256);
    }

    #[tokio::test]
    async fn test_calculate_file_hash_is_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_fixture(&dir, "data.bin", &[0xAB; 100_000]);

        let first = calculate_file_hash(&path, HashAlgorithm::Sha256)
            .await
            .unwrap();
        let second = calculate_file_hash(&path, HashAlgorithm::Sha256)
            .await
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 64);
    }

    #[tokio::test]
    async fn test_calculate_file_hash_sha512_length() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_fixture(&dir, "data.bin", b"content");

        let digest = calculate_file_hash(&path, HashAlgorithm::Sha512)
            .await
            .unwrap();
        assert_eq!(digest.len(), 128);
    }

    #[tokio::test]
    async fn test_calculate_file_hash_missing_file_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.bin");

        let result = calculate_file_hash(&path, HashAlgorithm::Sha256).await;
        assert!(matches!(result, Err(StoreError::Io { .. })));
    }

    #[tokio::test]
    async fn test_verify_missing_path_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.bin");

        assert!(!verify_file_integrity(&path, None, HashAlgorithm::Sha256).await);
    }

    #[tokio::test]
    async fn test_verify_readable_file_without_hash_passes() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_fixture(&dir, "file.bin", b"content");

        assert!(verify_file_integrity(&path, None, HashAlgorithm::Sha256).await);
    }

    #[tokio::test]
    async fn test_verify_empty_file_passes_readability() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_fixture(&dir, "empty.bin", b"");

        assert!(verify_file_integrity(&path, None, HashAlgorithm::Sha256).await);
    }

    #[tokio::test]
    async fn test_verify_matching_hash_passes() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_fixture(&dir, "hello.txt", b"hello");

        assert!(verify_file_integrity(&path, Some(HELLO_SHA256), HashAlgorithm::Sha256).await);
    }

    #[tokio::test]
    async fn test_verify_matching_hash_case_insensitive() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_fixture(&dir, "hello.txt", b"hello");

        let upper = HELLO_SHA256.to_uppercase();
        assert!(verify_file_integrity(&path, Some(&upper), HashAlgorithm::Sha256).await);
    }

    #[tokio::test]
    async fn test_verify_mismatched_hash_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_fixture(&dir, "hello.txt", b"hello, but not quite");

        assert!(!verify_file_integrity(&path, Some(HELLO_SHA256), HashAlgorithm::Sha256).await);
    }

    #[test]
    fn test_hex_encode_known_bytes() {
        assert_eq!(hex_encode(&[0x00, 0xFF, 0x0A]), "00ff0a");
        assert_eq!(hex_encode(&[]), "");
    }
}
