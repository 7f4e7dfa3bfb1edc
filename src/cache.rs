//! Durable content cache with lazy TTL expiry.
//!
//! This module provides the [`Cache`] struct, a key/value store backed by
//! one JSON file per entry. Keys are hashed into fixed-length,
//! filesystem-safe filenames, entries carry their storage timestamp, and
//! expiry is checked lazily at read time - there is no background sweeper,
//! and expired entries stay on disk until overwritten or bulk-cleared.
//! Writes publish through [`AtomicFile`], so a crash mid-write never leaves
//! a partial entry visible.
//!
//! # Overview
//!
//! The cache is strictly an optimization: reads that hit a missing, expired,
//! or corrupt entry report a miss, and failed writes report `false`. Neither
//! path ever aborts a larger download pipeline.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use fetchstore::cache::Cache;
//!
//! # async fn example() -> Result<(), fetchstore::storage::StoreError> {
//! let cache = Cache::open("./cache", Duration::from_secs(3600))?;
//!
//! cache.set("https://example.com/gallery/1", &"<html>...</html>").await;
//! let page: Option<String> = cache.get("https://example.com/gallery/1").await;
//! # Ok(())
//! # }
//! ```

use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, instrument, warn};

use crate::storage::{AtomicFile, StoreError, hex_encode};

/// Default entry lifetime (1 hour).
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(3600);

/// On-disk record for a single cache entry.
#[derive(Debug, Serialize, Deserialize)]
struct CacheEntry<T> {
    /// Unix timestamp (seconds) at which the entry was stored.
    stored_at: u64,
    /// The cached payload.
    content: T,
}

/// Durable key/value cache with time-based lazy expiry.
///
/// Construct one instance per application context and pass it by reference
/// to whatever needs it. The cache holds no in-memory lock; consistency
/// within a process comes from the atomic publish of each entry file.
/// Concurrent independent processes sharing one directory get best-effort
/// last-writer-wins behavior only.
#[derive(Debug)]
pub struct Cache {
    cache_dir: PathBuf,
    max_age: Duration,
}

impl Cache {
    /// Opens a cache rooted at `dir`, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Io`] if the directory cannot be created.
    #[instrument(skip_all, fields(dir = %dir.as_ref().display(), max_age_secs = max_age.as_secs()))]
    pub fn open(dir: impl AsRef<Path>, max_age: Duration) -> Result<Self, StoreError> {
        let cache_dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&cache_dir).map_err(|e| StoreError::io(&cache_dir, e))?;
        debug!("opened cache");
        Ok(Self { cache_dir, max_age })
    }

    /// Returns the default entry lifetime.
    #[must_use]
    pub fn max_age(&self) -> Duration {
        self.max_age
    }

    /// Returns the cache's storage directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Fetches a cached value if it exists and has not expired.
    ///
    /// Missing entries, entries older than the cache's `max_age`, and
    /// entries that fail to deserialize (corruption self-heals as a miss)
    /// all return `None`. Expired entries are not deleted as a side effect.
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.get_with_max_age(key, self.max_age).await
    }

    /// Like [`get`], with a per-call expiry override.
    ///
    /// [`get`]: Cache::get
    #[instrument(skip_all, fields(key))]
    pub async fn get_with_max_age<T: DeserializeOwned>(
        &self,
        key: &str,
        max_age: Duration,
    ) -> Option<T> {
        let path = self.entry_path(key);

        let raw = match tokio::fs::read(&path).await {
            Ok(raw) => raw,
            Err(error) => {
                if error.kind() == std::io::ErrorKind::NotFound {
                    debug!(key, "cache miss");
                } else {
                    warn!(key, %error, "failed to read cache entry, treating as miss");
                }
                return None;
            }
        };

        let entry: CacheEntry<T> = match serde_json::from_slice(&raw) {
            Ok(entry) => entry,
            Err(error) => {
                warn!(key, %error, "corrupt cache entry, treating as miss");
                return None;
            }
        };

        let age_secs = unix_now().saturating_sub(entry.stored_at);
        if Duration::from_secs(age_secs) >= max_age {
            debug!(key, age_secs, "cache entry expired");
            return None;
        }

        debug!(key, age_secs, "cache hit");
        Some(entry.content)
    }

    /// Stores a value under `key`, unconditionally overwriting any existing
    /// entry regardless of its expiry state.
    ///
    /// Returns `false` if serialization or the underlying write fails;
    /// caching is an optimization, so persistence failures are logged and
    /// reported rather than raised.
    #[instrument(skip_all, fields(key))]
    pub async fn set<T: Serialize>(&self, key: &str, content: &T) -> bool {
        match self.write_entry(key, content).await {
            Ok(()) => {
                debug!(key, "cache entry stored");
                true
            }
            Err(error) => {
                warn!(key, %error, "failed to write cache entry");
                false
            }
        }
    }

    /// Removes every entry in the cache directory, best-effort.
    ///
    /// Per-entry removal failures are logged and do not abort the remaining
    /// removals. Idempotent: clearing an empty or missing directory is fine.
    #[instrument(skip(self))]
    pub async fn clear(&self) {
        let mut dir = match tokio::fs::read_dir(&self.cache_dir).await {
            Ok(dir) => dir,
            Err(error) => {
                if error.kind() != std::io::ErrorKind::NotFound {
                    warn!(%error, "failed to list cache directory");
                }
                return;
            }
        };

        loop {
            match dir.next_entry().await {
                Ok(Some(entry)) => {
                    if let Err(error) = tokio::fs::remove_file(entry.path()).await {
                        warn!(
                            path = %entry.path().display(),
                            %error,
                            "failed to remove cache entry"
                        );
                    }
                }
                Ok(None) => break,
                Err(error) => {
                    warn!(%error, "failed to walk cache directory");
                    break;
                }
            }
        }
        debug!("cache cleared");
    }

    /// Cache-aside wrapper around an arbitrary asynchronous operation.
    ///
    /// With `key: Some(..)`, a fresh cached value is returned without
    /// invoking `operation`; on a miss the operation runs and its success
    /// value is stored before being returned. With `key: None` the
    /// operation is invoked directly and nothing is cached - caching is
    /// strictly an optimization, never required for correctness.
    /// `max_age` overrides the cache default for this call only.
    pub async fn get_or_fetch<T, E, F, Fut>(
        &self,
        key: Option<&str>,
        max_age: Option<Duration>,
        operation: F,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let Some(key) = key else {
            return operation().await;
        };
        let max_age = max_age.unwrap_or(self.max_age);

        if let Some(hit) = self.get_with_max_age::<T>(key, max_age).await {
            return Ok(hit);
        }

        let value = operation().await?;
        self.set(key, &value).await;
        Ok(value)
    }

    /// Maps a key to its storage location.
    ///
    /// The one-way hash guarantees a fixed-length, filesystem-safe filename
    /// for any key, and identical keys always resolve to the same path.
    fn entry_path(&self, key: &str) -> PathBuf {
        let digest = Sha256::digest(key.as_bytes());
        self.cache_dir.join(hex_encode(digest.as_slice()))
    }

    async fn write_entry<T: Serialize>(&self, key: &str, content: &T) -> Result<(), StoreError> {
        let path = self.entry_path(key);
        let entry = CacheEntry {
            stored_at: unix_now(),
            content,
        };
        let bytes = serde_json::to_vec(&entry).map_err(|e| StoreError::serialize(&path, e))?;

        let mut file = AtomicFile::create(&path).await?;
        file.write_all(&bytes).await?;
        file.commit().await
    }
}

/// Derives the conventional per-user cache directory `~/.{app_name}/cache`.
///
/// Returns `None` when no home directory can be determined from the
/// environment.
#[must_use]
pub fn default_cache_dir(app_name: &str) -> Option<PathBuf> {
    let home = std::env::var_os("HOME").or_else(|| std::env::var_os("USERPROFILE"))?;
    Some(
        PathBuf::from(home)
            .join(format!(".{app_name}"))
            .join("cache"),
    )
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_secs()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    /// Collects formatted log output for assertions.
    #[derive(Clone)]
    struct CaptureWriter(Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for CaptureWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn open_cache(dir: &tempfile::TempDir) -> Cache {
        Cache::open(dir.path(), Duration::from_secs(3600)).unwrap()
    }

    /// Rewrites an entry file in place with an old `stored_at`, simulating
    /// the passage of wall-clock time.
    fn age_entry(cache: &Cache, key: &str, age: Duration) {
        let path = cache.entry_path(key);
        let raw = std::fs::read(&path).unwrap();
        let mut value: serde_json::Value = serde_json::from_slice(&raw).unwrap();
        let stored_at = unix_now() - age.as_secs();
        value["stored_at"] = serde_json::json!(stored_at);
        std::fs::write(&path, serde_json::to_vec(&value).unwrap()).unwrap();
    }

    #[tokio::test]
    async fn test_set_then_get_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let cache = open_cache(&dir);

        assert!(cache.set("https://example.com/g/1", &"payload").await);
        let hit: Option<String> = cache.get("https://example.com/g/1").await;
        assert_eq!(hit.as_deref(), Some("payload"));
    }

    #[tokio::test]
    async fn test_get_missing_key_is_absent() {
        let dir = tempfile::tempdir().unwrap();
        let cache = open_cache(&dir);

        let hit: Option<String> = cache.get("never stored").await;
        assert!(hit.is_none());
    }

    #[tokio::test]
    async fn test_expired_entry_is_absent_but_stays_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let cache = open_cache(&dir);

        cache.set("key", &42_u32).await;
        age_entry(&cache, "key", Duration::from_secs(7200));

        let hit: Option<u32> = cache.get("key").await;
        assert!(hit.is_none());
        // Lazy expiry: the file is not deleted by the failed read.
        assert!(cache.entry_path("key").exists());
    }

    #[tokio::test]
    async fn test_set_overwrites_expired_entry() {
        let dir = tempfile::tempdir().unwrap();
        let cache = open_cache(&dir);

        cache.set("key", &"old").await;
        age_entry(&cache, "key", Duration::from_secs(7200));
        cache.set("key", &"new").await;

        let hit: Option<String> = cache.get("key").await;
        assert_eq!(hit.as_deref(), Some("new"));
    }

    #[tokio::test]
    async fn test_per_call_max_age_override() {
        let dir = tempfile::tempdir().unwrap();
        let cache = open_cache(&dir);

        cache.set("key", &1_u32).await;
        age_entry(&cache, "key", Duration::from_secs(10));

        let strict: Option<u32> = cache.get_with_max_age("key", Duration::from_secs(5)).await;
        assert!(strict.is_none());

        let lenient: Option<u32> = cache.get_with_max_age("key", Duration::from_secs(60)).await;
        assert_eq!(lenient, Some(1));
    }

    #[tokio::test]
    async fn test_corrupt_entry_reads_as_miss() {
        let dir = tempfile::tempdir().unwrap();
        let cache = open_cache(&dir);

        cache.set("key", &"fine").await;
        std::fs::write(cache.entry_path("key"), b"{ not json").unwrap();

        let hit: Option<String> = cache.get("key").await;
        assert!(hit.is_none());
    }

    #[tokio::test]
    async fn test_corrupt_entry_emits_warning() {
        let dir = tempfile::tempdir().unwrap();
        let cache = open_cache(&dir);

        cache.set("key", &"fine").await;
        std::fs::write(cache.entry_path("key"), b"{ not json").unwrap();

        let buffer = Arc::new(Mutex::new(Vec::new()));
        let writer_buffer = Arc::clone(&buffer);
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::WARN)
            .with_writer(move || CaptureWriter(Arc::clone(&writer_buffer)))
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let hit: Option<String> = cache.get("key").await;
        assert!(hit.is_none());

        let output = String::from_utf8_lossy(&buffer.lock().unwrap()).into_owned();
        assert!(
            output.contains("corrupt cache entry"),
            "Expected corruption warning in: {output}"
        );
    }

    #[tokio::test]
    async fn test_clear_removes_all_entries_and_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let cache = open_cache(&dir);

        cache.set("a", &1_u32).await;
        cache.set("b", &2_u32).await;
        cache.clear().await;

        assert!(cache.get::<u32>("a").await.is_none());
        assert!(cache.get::<u32>("b").await.is_none());

        // Second clear on an empty directory must not error.
        cache.clear().await;
    }

    #[tokio::test]
    async fn test_identical_keys_resolve_to_same_path() {
        let dir = tempfile::tempdir().unwrap();
        let cache = open_cache(&dir);

        assert_eq!(cache.entry_path("key"), cache.entry_path("key"));
        assert_ne!(cache.entry_path("key"), cache.entry_path("other"));
    }

    #[tokio::test]
    async fn test_entry_filenames_are_fixed_length_and_safe() {
        let dir = tempfile::tempdir().unwrap();
        let cache = open_cache(&dir);

        let awkward_key = "https://example.com/search?q=a/b\\c:*?\"<>|&page=2";
        let path = cache.entry_path(awkward_key);
        let name = path.file_name().unwrap().to_str().unwrap();
        assert_eq!(name.len(), 64);
        assert!(name.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[tokio::test]
    async fn test_get_or_fetch_miss_invokes_and_stores() {
        let dir = tempfile::tempdir().unwrap();
        let cache = open_cache(&dir);

        let result: Result<String, ()> = cache
            .get_or_fetch(Some("key"), None, || async { Ok("fetched".to_string()) })
            .await;
        assert_eq!(result.unwrap(), "fetched");

        let hit: Option<String> = cache.get("key").await;
        assert_eq!(hit.as_deref(), Some("fetched"));
    }

    #[tokio::test]
    async fn test_get_or_fetch_hit_skips_operation() {
        let dir = tempfile::tempdir().unwrap();
        let cache = open_cache(&dir);
        cache.set("key", &"cached").await;

        let result: Result<String, ()> = cache
            .get_or_fetch(Some("key"), None, || async {
                panic!("operation must not run on a cache hit")
            })
            .await;
        assert_eq!(result.unwrap(), "cached");
    }

    #[tokio::test]
    async fn test_get_or_fetch_without_key_is_uncached() {
        let dir = tempfile::tempdir().unwrap();
        let cache = open_cache(&dir);

        let result: Result<String, ()> = cache
            .get_or_fetch(None, None, || async { Ok("direct".to_string()) })
            .await;
        assert_eq!(result.unwrap(), "direct");

        // Nothing was written.
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_get_or_fetch_propagates_operation_error() {
        let dir = tempfile::tempdir().unwrap();
        let cache = open_cache(&dir);

        let result: Result<String, &str> = cache
            .get_or_fetch(Some("key"), None, || async { Err("remote said no") })
            .await;
        assert_eq!(result.unwrap_err(), "remote said no");
        assert!(cache.get::<String>("key").await.is_none());
    }

    #[test]
    fn test_default_cache_dir_uses_home() {
        if std::env::var_os("HOME").is_some() || std::env::var_os("USERPROFILE").is_some() {
            let dir = default_cache_dir("fetchstore").unwrap();
            assert!(dir.ends_with(".fetchstore/cache"));
        }
    }
}
