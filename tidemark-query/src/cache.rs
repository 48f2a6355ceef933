//! The cached query wrapper.
//!
//! [`QueryCache`] sits between callers and the real data source. Reads go
//! through key generation and the cache backend; writes routed through the
//! wrapper bump versions before they are delegated. The two paths never
//! coordinate directly - they meet only at the version store, whose tokens
//! both key computation and invalidation read and write.
//!
//! # Degradation
//!
//! Cache-layer failures never reach callers. An unreachable cache backend
//! turns reads into misses; an unreachable version store disables caching
//! for the affected queries; invalidation failures are logged and the
//! write proceeds. Only real data source errors propagate.
//!
//! # Known Race
//!
//! A reader that computed its key, then lost the CPU while a writer bumped
//! a contributing table, may store fresh rows under the pre-bump key. That
//! entry is permanently stale but only reachable by readers still holding
//! the old token set, and the next bump of any contributing table orphans
//! it. Detecting this would require transactional coupling between the
//! data write and the version bump, which is out of scope by design.

use std::marker::PhantomData;
use std::sync::Arc;

use chrono::Utc;
use tidemark_core::{
    CacheKey, ChangeKind, ConfigError, QueryError, QuerySpec, TableId, TidemarkError,
    TidemarkResult, UpdatePatch, WriteEvent,
};
use tidemark_schema::DependencyResolver;
use tidemark_store::{CacheRow, CacheStats, CacheStore, DataSource, VersionStore};
use tracing::{debug, warn};

use crate::invalidation::InvalidationCoordinator;
use crate::keygen::KeyGenerator;
use crate::result_set::ResultSet;

/// Default cap on the number of rows a single entry may hold.
const DEFAULT_MAX_CACHEABLE_ROWS: usize = 10_000;

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Tuning knobs for [`QueryCache`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryCacheConfig {
    /// Whether reads consult the cache at all. Disabled, every read goes
    /// straight to the data source; writes still bump versions so other
    /// caches sharing the version store stay correct.
    pub enabled: bool,
    /// Whether empty result sets are written to the backend. Stored empty
    /// sequences never serve hits, so storing them only saves re-storing
    /// after repeated empty misses; deployments with many empty-result
    /// queries may prefer to skip the writes.
    pub store_empty_results: bool,
    /// Results with more rows than this are served but not stored.
    pub max_cacheable_rows: usize,
}

impl Default for QueryCacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            store_empty_results: true,
            max_cacheable_rows: DEFAULT_MAX_CACHEABLE_ROWS,
        }
    }
}

impl QueryCacheConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable cache consultation on reads.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Control whether empty result sets are written to the backend.
    pub fn with_store_empty_results(mut self, store: bool) -> Self {
        self.store_empty_results = store;
        self
    }

    /// Set the row cap above which results are served uncached.
    pub fn with_max_cacheable_rows(mut self, rows: usize) -> Self {
        self.max_cacheable_rows = rows;
        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_cacheable_rows == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_cacheable_rows".to_string(),
                value: "0".to_string(),
                reason: "a zero row cap stores nothing; set enabled = false to disable caching"
                    .to_string(),
            });
        }
        Ok(())
    }
}

// ============================================================================
// QUERY CACHE
// ============================================================================

/// Caching wrapper around a data source.
///
/// Generic over the row type `R`, the wrapped source `S`, the cache
/// backend `C`, and the version store `V`. The backend and version store
/// are shared through `Arc` so several caches - one per logical data
/// source, or one per process - can key against the same version universe.
pub struct QueryCache<R, S, C, V> {
    source: S,
    store: Arc<C>,
    keys: KeyGenerator<V>,
    invalidation: InvalidationCoordinator<V>,
    config: QueryCacheConfig,
    _rows: PhantomData<fn() -> R>,
}

impl<R, S, C, V> QueryCache<R, S, C, V>
where
    R: CacheRow,
    S: DataSource<R>,
    C: CacheStore,
    V: VersionStore,
{
    /// Build a cache over `source`, keying against `versions` and
    /// resolving write impact through `resolver`.
    pub fn new(
        source: S,
        store: Arc<C>,
        versions: Arc<V>,
        resolver: DependencyResolver,
        config: QueryCacheConfig,
    ) -> TidemarkResult<Self> {
        config.validate()?;
        Ok(Self {
            source,
            store,
            keys: KeyGenerator::new(Arc::clone(&versions)),
            invalidation: InvalidationCoordinator::new(resolver, versions),
            config,
            _rows: PhantomData,
        })
    }

    /// The active configuration.
    pub fn config(&self) -> &QueryCacheConfig {
        &self.config
    }

    /// The wrapped data source.
    pub fn source(&self) -> &S {
        &self.source
    }

    /// Statistics from the cache backend.
    pub async fn stats(&self) -> TidemarkResult<CacheStats> {
        self.store.stats().await
    }

    /// Materialize a read query, serving from cache when possible.
    ///
    /// Provably empty queries return an empty [`ResultSet`] without
    /// touching the cache backend or the data source. A stored entry only
    /// serves as a hit when it holds at least one row; an empty stored
    /// sequence is indistinguishable from an absent one and re-executes.
    pub async fn fetch(&self, spec: &QuerySpec) -> TidemarkResult<ResultSet<R>> {
        if !self.config.enabled {
            let rows = self.source.execute(spec).await?;
            return Ok(ResultSet::bypass(rows));
        }

        let key = match self.keys.key_for(spec).await {
            Ok(key) => key,
            Err(TidemarkError::Query(QueryError::EmptyResult)) => {
                debug!(table = %spec.table, "Query is empty by construction; short-circuiting");
                return Ok(ResultSet::empty_query());
            }
            Err(e) if e.is_cache_layer() => {
                warn!(
                    table = %spec.table,
                    error = %e,
                    "Key computation degraded; querying the source uncached"
                );
                let rows = self.source.execute(spec).await?;
                return Ok(ResultSet::bypass(rows));
            }
            Err(e) => return Err(e),
        };

        match self.store.get::<R>(&key).await {
            Ok(Some(entry)) if !entry.is_empty() => {
                debug!(key = %key, rows = entry.len(), "Cache hit");
                return Ok(ResultSet::from_cache(entry.rows, entry.cached_at));
            }
            Ok(_) => {
                debug!(key = %key, "Cache miss");
            }
            Err(e) if e.is_cache_layer() => {
                warn!(key = %key, error = %e, "Cache read failed; treating as a miss");
            }
            Err(e) => return Err(e),
        }

        // Collapse the source's laziness: the stored entry must be a
        // complete, reusable sequence.
        let rows = self.source.execute(spec).await?;
        self.store_result(&key, &rows).await;
        Ok(ResultSet::from_source(rows))
    }

    /// Insert a batch of rows through the wrapper.
    ///
    /// The version bumps complete before the write is delegated, so reads
    /// that follow this call from the same task can never hit entries
    /// keyed by pre-write tokens.
    pub async fn bulk_create(&self, table: &TableId, rows: Vec<R>) -> TidemarkResult<Vec<R>> {
        self.invalidation
            .on_write(table, ChangeKind::BulkCreate)
            .await;
        self.source.bulk_create(table, rows).await
    }

    /// Apply a bulk update through the wrapper. Bumps first, then
    /// delegates; returns the number of rows the source touched.
    pub async fn bulk_update(&self, table: &TableId, patch: &UpdatePatch) -> TidemarkResult<u64> {
        self.invalidation
            .on_write(table, ChangeKind::BulkUpdate)
            .await;
        self.source.bulk_update(table, patch).await
    }

    /// Apply a write event delivered by the surrounding application's
    /// write paths - saves and deletes that did not go through this
    /// wrapper, and many-to-many link changes.
    pub async fn notify(&self, event: &WriteEvent) {
        self.invalidation.observe(event).await;
    }

    async fn store_result(&self, key: &CacheKey, rows: &[R]) {
        if rows.is_empty() && !self.config.store_empty_results {
            return;
        }
        if rows.len() > self.config.max_cacheable_rows {
            debug!(
                key = %key,
                rows = rows.len(),
                cap = self.config.max_cacheable_rows,
                "Result exceeds the row cap; served uncached"
            );
            return;
        }
        if let Err(e) = self.store.put(key, rows, Utc::now()).await {
            warn!(key = %key, error = %e, "Cache write failed; result served uncached");
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
