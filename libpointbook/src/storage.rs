//! Durable key-value storage for snapshots
//!
//! The store controller only needs `get`/`set` by string key. Two backends
//! ship with the crate:
//!
//! - [`FileStore`]: one file per key in a data directory, written atomically
//!   (temporary file + rename).
//! - [`MemoryStore`]: in-process map with call counters and failure
//!   injection. It is compiled for all builds, not only tests, so
//!   integration tests and embedders can drive the store without a disk.
//!
//! # Example
//!
//! ```no_run
//! use libpointbook::storage::{FileStore, KeyValueStore};
//!
//! # async fn example() -> libpointbook::Result<()> {
//! let store = FileStore::new("/tmp/pointbook");
//! store.set("appState", r#"{"userPoints":1000}"#).await?;
//! assert!(store.get("appState").await?.is_some());
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::{Result, StorageError};

/// Asynchronous string key-value storage
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read the value stored under `key`, `None` if nothing is stored
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Store `value` under `key`, replacing any previous value
    async fn set(&self, key: &str, value: &str) -> Result<()>;

    /// Delete the value under `key`; deleting a missing key succeeds
    async fn remove(&self, key: &str) -> Result<()>;
}

/// File-per-key storage rooted at a directory
///
/// The directory is created on first write.
#[derive(Debug)]
pub struct FileStore {
    dir: PathBuf,
    tmp_counter: AtomicU64,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            tmp_counter: AtomicU64::new(0),
        }
    }

    /// Directory holding the snapshot files
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File backing `key`
    ///
    /// Characters outside `[A-Za-z0-9._-]` are replaced with `_` so a key can
    /// never escape the data directory.
    pub fn path_for(&self, key: &str) -> PathBuf {
        let safe: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        let safe = safe.trim_start_matches('.');
        let name = if safe.is_empty() { "_" } else { safe };
        self.dir.join(format!("{}.json", name))
    }
}

#[async_trait]
impl KeyValueStore for FileStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        match tokio::fs::read_to_string(self.path_for(key)).await {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::Io(e).into()),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(StorageError::Io)?;

        let target = self.path_for(key);
        let seq = self.tmp_counter.fetch_add(1, Ordering::Relaxed);
        let tmp = target.with_extension(format!("json.{}.tmp", seq));

        tokio::fs::write(&tmp, value.as_bytes())
            .await
            .map_err(StorageError::Io)?;

        if let Err(e) = tokio::fs::rename(&tmp, &target).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(StorageError::Io(e).into());
        }
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        match tokio::fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::Io(e).into()),
        }
    }
}

#[derive(Debug, Default)]
struct MemoryInner {
    entries: HashMap<String, String>,
    fail_reads: bool,
    fail_writes: bool,
    get_calls: usize,
    set_calls: usize,
    /// Every successful write, oldest first
    writes: Vec<(String, String)>,
}

/// In-memory storage with instrumentation
///
/// Clones share the same map and counters.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<MemoryInner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Storage pre-seeded with one entry
    pub fn with_entry(key: &str, value: &str) -> Self {
        let store = Self::new();
        store.lock().entries.insert(key.to_string(), value.to_string());
        store
    }

    /// Storage whose reads always fail
    pub fn failing_reads() -> Self {
        let store = Self::new();
        store.lock().fail_reads = true;
        store
    }

    /// Toggle write failures
    pub fn set_fail_writes(&self, fail: bool) {
        self.lock().fail_writes = fail;
    }

    /// Number of `get` calls so far, failed ones included
    pub fn get_count(&self) -> usize {
        self.lock().get_calls
    }

    /// Number of `set` calls so far, failed ones included
    pub fn set_count(&self) -> usize {
        self.lock().set_calls
    }

    /// Values written successfully under `key`, oldest first
    pub fn writes_for(&self, key: &str) -> Vec<String> {
        self.lock()
            .writes
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
            .collect()
    }

    /// Current value under `key` without counting as a read
    pub fn peek(&self, key: &str) -> Option<String> {
        self.lock().entries.get(key).cloned()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut inner = self.lock();
        inner.get_calls += 1;
        if inner.fail_reads {
            return Err(StorageError::Unavailable(format!("read of '{}' refused", key)).into());
        }
        Ok(inner.entries.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut inner = self.lock();
        inner.set_calls += 1;
        if inner.fail_writes {
            return Err(StorageError::Unavailable(format!("write of '{}' refused", key)).into());
        }
        inner.entries.insert(key.to_string(), value.to_string());
        inner.writes.push((key.to_string(), value.to_string()));
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.lock().entries.remove(key);
        Ok(())
    }
}
