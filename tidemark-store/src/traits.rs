//! Cache store and data source traits.
//!
//! This module defines the boundary traits the query layer is written
//! against: the result cache, and the underlying relational source the
//! cache shields.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use tidemark_core::{CacheKey, QuerySpec, TableId, TidemarkResult, UpdatePatch};

/// Marker trait for row types that can pass through the cache.
///
/// Rows are serialized on `put` and deserialized on `get`, so any type
/// meeting the serde and threading bounds qualifies. The blanket impl
/// means application row structs need no extra wiring.
pub trait CacheRow: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {}

impl<T> CacheRow for T where T: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {}

/// A materialized result set as held by a cache backend.
///
/// Created on a miss, read back on a hit, never mutated in place. The
/// `cached_at` timestamp travels with the rows so callers can reason
/// about entry age.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedEntry<R> {
    /// The rows in result order.
    pub rows: Vec<R>,
    /// When the entry was written.
    pub cached_at: DateTime<Utc>,
}

impl<R> CachedEntry<R> {
    pub fn new(rows: Vec<R>, cached_at: DateTime<Utc>) -> Self {
        Self { rows, cached_at }
    }

    /// Number of rows in the entry.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the entry holds zero rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Cache backend trait for pluggable result-set stores.
///
/// Implementations should be thread-safe and support concurrent access.
///
/// # No Deletion
///
/// There is deliberately no `delete` operation. Invalidation works by
/// version-bumping: a stale entry's key is simply never computed again,
/// and the orphaned entry ages out under the backend's own capacity or
/// TTL policy.
///
/// # Serialization
///
/// Implementations are responsible for serializing/deserializing rows.
/// The entry timestamp must be stored alongside the rows.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Get an entry from the cache.
    ///
    /// Returns the cached rows and when they were cached, or `None` if the
    /// key is absent.
    async fn get<R: CacheRow>(&self, key: &CacheKey) -> TidemarkResult<Option<CachedEntry<R>>>;

    /// Put an entry into the cache, overwriting any previous value at the
    /// same key.
    async fn put<R: CacheRow>(
        &self,
        key: &CacheKey,
        rows: &[R],
        cached_at: DateTime<Utc>,
    ) -> TidemarkResult<()>;

    /// Get cache statistics.
    async fn stats(&self) -> TidemarkResult<CacheStats>;
}

/// The relational source of truth the cache sits in front of.
///
/// `execute` serves reads; the bulk operations are the write paths that
/// bypass per-row hooks and therefore must be routed through the caching
/// wrapper so invalidation still fires.
#[async_trait]
pub trait DataSource<R: CacheRow>: Send + Sync {
    /// Run a read query and return its rows in result order.
    async fn execute(&self, spec: &QuerySpec) -> TidemarkResult<Vec<R>>;

    /// Insert a batch of rows, returning them as stored.
    async fn bulk_create(&self, table: &TableId, rows: Vec<R>) -> TidemarkResult<Vec<R>>;

    /// Apply a patch to all rows matching its filter, returning the number
    /// of rows touched.
    async fn bulk_update(&self, table: &TableId, patch: &UpdatePatch) -> TidemarkResult<u64>;
}

/// Statistics about cache usage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses.
    pub misses: u64,
    /// Number of entries currently in cache.
    pub entry_count: u64,
    /// Approximate memory usage in bytes.
    pub memory_bytes: u64,
    /// Number of evictions due to capacity or entry age.
    pub evictions: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_stats_hit_rate() {
        let stats = CacheStats {
            hits: 80,
            misses: 20,
            ..Default::default()
        };
        assert!((stats.hit_rate() - 0.8).abs() < 0.001);

        let empty_stats = CacheStats::default();
        assert!((empty_stats.hit_rate() - 0.0).abs() < 0.001);
    }

    #[test]
    fn test_cached_entry_accessors() {
        let entry = CachedEntry::new(vec![1u32, 2, 3], Utc::now());
        assert_eq!(entry.len(), 3);
        assert!(!entry.is_empty());

        let empty: CachedEntry<u32> = CachedEntry::new(Vec::new(), Utc::now());
        assert!(empty.is_empty());
    }
}
