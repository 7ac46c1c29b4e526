//! Response-file cache: maps an absolute, normalised path to its decoded
//! string body. Bounded LRU, capacity from `DOPPEL_RESPONSE_FILE_CACHE_ENTRIES`
//! (default 20). Concurrent misses for the same key coalesce into a single
//! disk read, grounded on the bounded-cache shape of
//! `mockforge-core/src/cache.rs` but rebuilt around `tokio::sync::Mutex` +
//! in-flight-read de-duplication rather than that file's generic
//! TTL/LRU `Cache<K, V>` (this cache has no TTL — only mtime-free content
//! permanence and capacity-based eviction, per spec.md §4.5).

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use lru::LruCache;
use tokio::sync::{Mutex, Notify};

use crate::error::{Error, Result};

enum Slot {
    /// A read is in flight; waiters subscribe to this notify and re-check
    /// the cache once woken.
    InFlight(Arc<Notify>),
    /// The file's decoded content is ready.
    Ready(Arc<String>),
}

/// Thread-safe, single-instance response-file content cache.
pub struct ResponseFileCache {
    capacity: usize,
    entries: Mutex<LruCache<PathBuf, Slot>>,
}

impl ResponseFileCache {
    /// Build a cache with the given capacity (entries), per
    /// `DOPPEL_RESPONSE_FILE_CACHE_ENTRIES`.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: Mutex::new(LruCache::new(NonZeroUsize::new(capacity).expect("capacity is at least 1"))),
        }
    }

    /// Build a cache sized from the environment, per spec.md §6.
    pub fn from_env() -> Self {
        Self::new(crate::config::response_file_cache_capacity())
    }

    /// Current number of entries, surfaced via the
    /// `response.file.cache.entries` gauge when the metrics feature is on.
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    /// Configured capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Fetch the decoded body for `path`, reading it from disk at most
    /// once across concurrently-racing callers.
    pub async fn get_or_read(&self, path: &Path) -> Result<Arc<String>> {
        let canonical = canonicalize(path)?;

        loop {
            let wait_for = {
                let mut entries = self.entries.lock().await;
                match entries.get(&canonical) {
                    Some(Slot::Ready(content)) => return Ok(Arc::clone(content)),
                    Some(Slot::InFlight(notify)) => Some(Arc::clone(notify)),
                    None => {
                        let notify = Arc::new(Notify::new());
                        entries.put(canonical.clone(), Slot::InFlight(Arc::clone(&notify)));
                        None
                    }
                }
            };

            if let Some(notify) = wait_for {
                notify.notified().await;
                continue;
            }

            // We're the one that inserted the InFlight slot; do the read.
            let result = tokio::fs::read_to_string(&canonical).await.map_err(Error::from);

            let mut entries = self.entries.lock().await;
            let notify = match entries.pop(&canonical) {
                Some(Slot::InFlight(notify)) => notify,
                _ => Arc::new(Notify::new()),
            };
            match &result {
                Ok(content) => {
                    entries.put(canonical.clone(), Slot::Ready(Arc::new(content.clone())));
                }
                Err(_) => {
                    // leave the slot absent so a retry can re-attempt the read
                }
            }
            drop(entries);
            notify.notify_waiters();

            return result.map(Arc::new);
        }
    }
}

fn canonicalize(path: &Path) -> Result<PathBuf> {
    path.canonicalize().map_err(Error::from)
}

/// Resolve `relative` against `base_dir`, rejecting any path that would
/// escape it (`..` traversal), per spec.md §4.5. Grounded on the
/// path-traversal guard in `mockforge-http/src/file_server.rs`.
pub fn resolve_response_file(base_dir: &Path, relative: &str) -> Result<PathBuf> {
    if relative.contains("..") {
        return Err(Error::render(format!("response file path escapes plugin directory: {relative}")));
    }
    Ok(base_dir.join(relative))
}
