//! In-memory cache store.
//!
//! A map-backed store for tests and single-process deployments. Capacity
//! is bounded: when full, the oldest entry by insertion order is evicted.
//! An optional TTL retires entries lazily on read. Orphaned entries (keys
//! no longer computed after a version bump) are reclaimed by the same two
//! policies, since nothing else will ever touch them.
//!
//! Reads take the write half of the lock to record statistics; the LMDB
//! backend is the choice when read concurrency matters.

use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tidemark_core::{CacheKey, StoreError, TidemarkResult};
use tokio::sync::RwLock;

use crate::traits::{CacheRow, CacheStats, CacheStore, CachedEntry};

/// Default capacity when none is configured.
pub const DEFAULT_MAX_ENTRIES: usize = 4096;

#[derive(Debug)]
struct StoredEntry {
    payload: Vec<u8>,
    cached_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct Inner {
    entries: HashMap<CacheKey, StoredEntry>,
    /// Insertion order, oldest first. Kept in sync with `entries`.
    order: VecDeque<CacheKey>,
    stats: CacheStats,
}

/// Map-backed cache store with insertion-order eviction.
#[derive(Debug)]
pub struct InMemoryCacheStore {
    inner: RwLock<Inner>,
    max_entries: usize,
    entry_ttl: Option<Duration>,
}

impl InMemoryCacheStore {
    /// Create a store with the default capacity and no TTL.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            max_entries: DEFAULT_MAX_ENTRIES,
            entry_ttl: None,
        }
    }

    /// Set the maximum number of entries held at once.
    pub fn with_max_entries(mut self, max_entries: usize) -> Self {
        self.max_entries = max_entries;
        self
    }

    /// Retire entries older than `ttl` on read.
    pub fn with_entry_ttl(mut self, ttl: Duration) -> Self {
        self.entry_ttl = Some(ttl);
        self
    }
}

impl Default for InMemoryCacheStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheStore for InMemoryCacheStore {
    async fn get<R: CacheRow>(&self, key: &CacheKey) -> TidemarkResult<Option<CachedEntry<R>>> {
        let mut inner = self.inner.write().await;
        let now = Utc::now();

        let mut expired = false;
        let mut decoded: Option<CachedEntry<R>> = None;
        if let Some(entry) = inner.entries.get(key) {
            let too_old = self
                .entry_ttl
                .map(|ttl| now - entry.cached_at > ttl)
                .unwrap_or(false);
            if too_old {
                expired = true;
            } else {
                let rows = serde_json::from_slice(&entry.payload).map_err(|e| {
                    StoreError::Serialization {
                        reason: e.to_string(),
                    }
                })?;
                decoded = Some(CachedEntry::new(rows, entry.cached_at));
            }
        }

        if expired {
            if let Some(entry) = inner.entries.remove(key) {
                inner.stats.memory_bytes = inner
                    .stats
                    .memory_bytes
                    .saturating_sub(entry.payload.len() as u64);
            }
            inner.order.retain(|k| k != key);
            inner.stats.entry_count = inner.stats.entry_count.saturating_sub(1);
            inner.stats.evictions += 1;
            inner.stats.misses += 1;
            return Ok(None);
        }

        match decoded {
            Some(entry) => {
                inner.stats.hits += 1;
                Ok(Some(entry))
            }
            None => {
                inner.stats.misses += 1;
                Ok(None)
            }
        }
    }

    async fn put<R: CacheRow>(
        &self,
        key: &CacheKey,
        rows: &[R],
        cached_at: DateTime<Utc>,
    ) -> TidemarkResult<()> {
        let payload = serde_json::to_vec(rows).map_err(|e| StoreError::Serialization {
            reason: e.to_string(),
        })?;
        let size = payload.len() as u64;

        let mut inner = self.inner.write().await;
        if let Some(previous) = inner.entries.insert(*key, StoredEntry { payload, cached_at }) {
            inner.stats.memory_bytes = inner
                .stats
                .memory_bytes
                .saturating_sub(previous.payload.len() as u64);
        } else {
            inner.order.push_back(*key);
            inner.stats.entry_count += 1;
        }
        inner.stats.memory_bytes += size;

        while inner.entries.len() > self.max_entries {
            let Some(oldest) = inner.order.pop_front() else {
                break;
            };
            if let Some(evicted) = inner.entries.remove(&oldest) {
                inner.stats.memory_bytes = inner
                    .stats
                    .memory_bytes
                    .saturating_sub(evicted.payload.len() as u64);
                inner.stats.entry_count = inner.stats.entry_count.saturating_sub(1);
                inner.stats.evictions += 1;
            }
        }

        Ok(())
    }

    async fn stats(&self) -> TidemarkResult<CacheStats> {
        let inner = self.inner.read().await;
        Ok(inner.stats.clone())
    }
}

// ============================================================================
// TESTS
// ============================================================================
