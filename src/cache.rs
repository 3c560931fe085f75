//! CacheStore — durable directory layout plus an in-memory FIFO registry
//! mapping a cache key to an on-disk work directory (§4.1).

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::model::playlist_path;
use crate::playlist;

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub key: String,
    pub work_dir: PathBuf,
    pub created_at: Instant,
    pub last_accessed_at: Instant,
    pub complete: bool,
}

struct CacheRecord {
    work_dir: PathBuf,
    created_at: Instant,
    last_accessed_at: Instant,
}

struct Inner {
    order: VecDeque<String>,
    entries: HashMap<String, CacheRecord>,
}

#[derive(Clone)]
pub struct CacheStore {
    inner: Arc<Mutex<Inner>>,
    max_entries: usize,
    max_age: Duration,
    enabled: bool,
}

impl CacheStore {
    pub fn new(max_entries: usize, max_age: Duration, enabled: bool) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                order: VecDeque::new(),
                entries: HashMap::new(),
            })),
            max_entries: max_entries.max(1),
            max_age,
            enabled,
        }
    }

    /// Returns a present, complete entry, or `None` on any miss.
    ///
    /// A playlist that exists but fails the completeness check (still being
    /// written by a live transcoder) is reported as a miss *without* deleting
    /// its directory — on-disk segments are only ever removed by a
    /// replacement eviction (`put` for a key whose work dir changed) or by
    /// TTL expiry, never by a transient completeness-check failure. This
    /// keeps a still-running job's output safe from a concurrent reader; see
    /// DESIGN.md for the full rationale.
    pub async fn get(&self, key: &str) -> Option<CacheEntry> {
        if !self.enabled {
            return None;
        }

        let record_dir = {
            let inner = self.inner.lock().await;
            inner.entries.get(key).map(|r| (r.work_dir.clone(), r.created_at))
        };
        let (work_dir, created_at) = record_dir?;

        if created_at.elapsed() > self.max_age {
            debug!(key, "cache entry expired");
            self.remove(key).await;
            return None;
        }

        if tokio::fs::metadata(&work_dir).await.is_err() {
            // Directory vanished out-of-band (manual cleanup, crash). The
            // in-memory record is stale bookkeeping with nothing left to
            // delete; drop it so a fresh `put` can recreate it.
            let mut inner = self.inner.lock().await;
            inner.entries.remove(key);
            inner.order.retain(|k| k != key);
            return None;
        }

        if !self.is_complete(&work_dir).await {
            return None;
        }

        let mut inner = self.inner.lock().await;
        if let Some(record) = inner.entries.get_mut(key) {
            record.last_accessed_at = Instant::now();
            return Some(CacheEntry {
                key: key.to_string(),
                work_dir,
                created_at: record.created_at,
                last_accessed_at: record.last_accessed_at,
                complete: true,
            });
        }
        None
    }

    async fn is_complete(&self, work_dir: &std::path::Path) -> bool {
        let path = playlist_path(work_dir);
        let text = match tokio::fs::read_to_string(&path).await {
            Ok(t) => t,
            Err(_) => return false,
        };
        if !playlist::has_header_magic(&text) || !playlist::has_end_marker(&text) {
            return false;
        }
        for segment in playlist::referenced_segments(&text) {
            match tokio::fs::metadata(work_dir.join(&segment)).await {
                Ok(meta) if meta.len() > 0 => {}
                _ => return false,
            }
        }
        true
    }

    /// Records `key -> work_dir`. A prior entry for the same key whose work
    /// dir differs is evicted (directory deleted) before the new one is
    /// recorded; a prior entry with the *same* work dir (the "mark complete
    /// by re-putting" trick from §4.5 step 7) is refreshed in place without
    /// touching disk, since the directory is deterministic per key and
    /// re-deleting it would destroy the job whose completion this call is
    /// reporting. Either way the key moves to the back of the FIFO queue.
    pub async fn put(&self, key: &str, work_dir: PathBuf) {
        if !self.enabled {
            return;
        }

        let mut inner = self.inner.lock().await;

        if let Some(prior) = inner.entries.remove(key) {
            inner.order.retain(|k| k != key);
            if prior.work_dir != work_dir {
                spawn_delete(prior.work_dir);
            }
        }

        inner.entries.insert(
            key.to_string(),
            CacheRecord {
                work_dir,
                created_at: Instant::now(),
                last_accessed_at: Instant::now(),
            },
        );
        inner.order.push_back(key.to_string());

        if inner.entries.len() > self.max_entries {
            if let Some(oldest_key) = inner.order.pop_front() {
                if let Some(record) = inner.entries.remove(&oldest_key) {
                    info!(key = oldest_key, "cache capacity reached, evicting oldest entry");
                    crate::metrics::CACHE_EVICTIONS_TOTAL.inc();
                    spawn_delete(record.work_dir);
                }
            }
        }

        crate::metrics::CACHE_ENTRIES.set(inner.entries.len() as i64);
    }

    /// Explicit eviction. Unlike the FIFO-capacity eviction in `put` (which
    /// deletes an unrelated key's directory best-effort, in the background),
    /// this awaits the directory removal before returning: callers use
    /// `remove` specifically when they are about to recreate the same
    /// deterministic work dir for this key (e.g. `get`'s TTL-expiry path),
    /// and invariant 3 (§3) requires the old directory gone before any new
    /// job for the same key writes into it.
    pub async fn remove(&self, key: &str) {
        let removed = {
            let mut inner = self.inner.lock().await;
            inner.order.retain(|k| k != key);
            let removed = inner.entries.remove(key);
            crate::metrics::CACHE_ENTRIES.set(inner.entries.len() as i64);
            removed
        };

        if let Some(record) = removed {
            crate::metrics::CACHE_EVICTIONS_TOTAL.inc();
            delete_work_dir(record.work_dir).await;
        }
    }

    /// Evicts entries older than `max_age` or whose work dir has vanished.
    pub async fn sweep_expired(&self) {
        let stale: Vec<String> = {
            let inner = self.inner.lock().await;
            let mut stale = Vec::new();
            for key in &inner.order {
                if let Some(record) = inner.entries.get(key) {
                    if record.created_at.elapsed() > self.max_age {
                        stale.push(key.clone());
                    }
                }
            }
            stale
        };

        for key in stale {
            info!(key, "janitor sweep evicting expired entry");
            self.remove(&key).await;
        }

        let vanished: Vec<String> = {
            let inner = self.inner.lock().await;
            let mut vanished = Vec::new();
            for (key, record) in inner.entries.iter() {
                if tokio::fs::metadata(&record.work_dir).await.is_err() {
                    vanished.push(key.clone());
                }
            }
            vanished
        };
        for key in vanished {
            let mut inner = self.inner.lock().await;
            inner.order.retain(|k| k != &key);
            inner.entries.remove(&key);
        }
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.entries.len()
    }
}

/// Removes `work_dir` and awaits completion. Failures are logged and
/// swallowed (§4.1 "directory deletion is best-effort") — the in-memory
/// entry is already gone regardless of whether this succeeds.
async fn delete_work_dir(work_dir: PathBuf) {
    if let Err(e) = tokio::fs::remove_dir_all(&work_dir).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(dir = %work_dir.display(), error = %e, "failed to remove cache work dir");
        }
    }
}

/// Fire-and-forget variant of `delete_work_dir`, for evictions of a key
/// other than the one the caller is about to recreate (FIFO-capacity
/// eviction, replacement of a differing work dir) where there is nothing
/// downstream waiting on the directory actually being gone.
fn spawn_delete(work_dir: PathBuf) {
    tokio::spawn(delete_work_dir(work_dir));
}
