//! LMDB-backed cache store.
//!
//! Uses the heed crate (Rust bindings for LMDB) to provide a
//! memory-mapped key-value store for cached result sets.
//!
//! # Keys and Orphans
//!
//! Keys are the raw 32-byte cache key digests. There is no delete path:
//! entries whose keys are no longer computed after a version bump stay in
//! the map as orphans until the environment is recreated. Size the map
//! with that in mind; a full map surfaces as a backend error, which the
//! query layer degrades around.
//!
//! # Thread Safety
//!
//! LMDB provides ACID transactions. The store uses:
//! - Read transactions for `get` operations
//! - Write transactions for `put` operations
//! - A lock around the statistics counters

use std::path::Path;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions};
use tidemark_core::{CacheKey, StoreError, TidemarkError, TidemarkResult};

use crate::traits::{CacheRow, CacheStats, CacheStore, CachedEntry};

/// Error type for LMDB store operations.
#[derive(Debug, thiserror::Error)]
pub enum LmdbStoreError {
    /// Failed to open or create the LMDB environment.
    #[error("Failed to open LMDB environment: {0}")]
    EnvOpen(String),

    /// Failed to open the database within the environment.
    #[error("Failed to open database: {0}")]
    DbOpen(String),

    /// Transaction error.
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Deserialization error.
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<LmdbStoreError> for TidemarkError {
    fn from(e: LmdbStoreError) -> Self {
        match e {
            LmdbStoreError::Serialization(reason) | LmdbStoreError::Deserialization(reason) => {
                TidemarkError::Store(StoreError::Serialization { reason })
            }
            other => TidemarkError::Store(StoreError::BackendUnavailable {
                reason: other.to_string(),
            }),
        }
    }
}

/// LMDB-backed cache store.
pub struct LmdbCacheStore {
    /// The LMDB environment.
    env: Env,
    /// The main database (single unnamed database).
    db: Database<Bytes, Bytes>,
    /// Hit/miss/entry statistics. Reset on reopen.
    stats: RwLock<CacheStats>,
}

impl LmdbCacheStore {
    /// Create a new LMDB cache store.
    ///
    /// # Arguments
    ///
    /// * `path` - Directory where LMDB files will be stored
    /// * `max_size_mb` - Maximum size of the database in megabytes
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The directory cannot be created
    /// - LMDB environment cannot be opened
    /// - Database cannot be created
    pub fn new<P: AsRef<Path>>(path: P, max_size_mb: usize) -> Result<Self, LmdbStoreError> {
        std::fs::create_dir_all(&path)?;

        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(max_size_mb * 1024 * 1024)
                .max_dbs(1)
                .open(path.as_ref())
        }
        .map_err(|e| LmdbStoreError::EnvOpen(e.to_string()))?;

        let mut wtxn = env
            .write_txn()
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;

        let db: Database<Bytes, Bytes> = env
            .create_database(&mut wtxn, None)
            .map_err(|e| LmdbStoreError::DbOpen(e.to_string()))?;

        wtxn.commit()
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;

        Ok(Self {
            env,
            db,
            stats: RwLock::new(CacheStats::default()),
        })
    }

    fn record_hit(&self) {
        if let Ok(mut stats) = self.stats.write() {
            stats.hits += 1;
        }
    }

    fn record_miss(&self) {
        if let Ok(mut stats) = self.stats.write() {
            stats.misses += 1;
        }
    }

    /// Update entry statistics after a successful put.
    fn update_entry_stats(&self, size_bytes: usize, is_new: bool) {
        if let Ok(mut stats) = self.stats.write() {
            if is_new {
                stats.entry_count += 1;
            }
            stats.memory_bytes += size_bytes as u64;
        }
    }
}

#[async_trait]
impl CacheStore for LmdbCacheStore {
    async fn get<R: CacheRow>(&self, key: &CacheKey) -> TidemarkResult<Option<CachedEntry<R>>> {
        let rtxn = self
            .env
            .read_txn()
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;

        match self.db.get(&rtxn, key.as_bytes().as_slice()) {
            Ok(Some(bytes)) => {
                self.record_hit();

                // Format: [timestamp: 8 bytes][json rows]
                if bytes.len() < 8 {
                    return Ok(None);
                }

                let timestamp_bytes: [u8; 8] = bytes[0..8]
                    .try_into()
                    .map_err(|_| LmdbStoreError::Deserialization("Invalid timestamp".into()))?;
                let timestamp_millis = i64::from_le_bytes(timestamp_bytes);
                let cached_at =
                    DateTime::from_timestamp_millis(timestamp_millis).unwrap_or_else(Utc::now);

                let rows: Vec<R> = serde_json::from_slice(&bytes[8..])
                    .map_err(|e| LmdbStoreError::Deserialization(e.to_string()))?;

                Ok(Some(CachedEntry::new(rows, cached_at)))
            }
            Ok(None) => {
                self.record_miss();
                Ok(None)
            }
            Err(e) => {
                self.record_miss();
                Err(LmdbStoreError::Transaction(e.to_string()).into())
            }
        }
    }

    async fn put<R: CacheRow>(
        &self,
        key: &CacheKey,
        rows: &[R],
        cached_at: DateTime<Utc>,
    ) -> TidemarkResult<()> {
        let timestamp_bytes = cached_at.timestamp_millis().to_le_bytes();
        let value_bytes =
            serde_json::to_vec(rows).map_err(|e| LmdbStoreError::Serialization(e.to_string()))?;

        let mut full_bytes = Vec::with_capacity(8 + value_bytes.len());
        full_bytes.extend_from_slice(&timestamp_bytes);
        full_bytes.extend_from_slice(&value_bytes);

        // Check if the key already exists (for statistics)
        let is_new = {
            let rtxn = self
                .env
                .read_txn()
                .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;
            self.db
                .get(&rtxn, key.as_bytes().as_slice())
                .ok()
                .flatten()
                .is_none()
        };

        let mut wtxn = self
            .env
            .write_txn()
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;

        self.db
            .put(&mut wtxn, key.as_bytes().as_slice(), &full_bytes)
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;

        wtxn.commit()
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;

        self.update_entry_stats(full_bytes.len(), is_new);

        Ok(())
    }

    async fn stats(&self) -> TidemarkResult<CacheStats> {
        Ok(self
            .stats
            .read()
            .map(|s| s.clone())
            .unwrap_or_default())
    }
}

// ============================================================================
// TESTS
// ============================================================================
