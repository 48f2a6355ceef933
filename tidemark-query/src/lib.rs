//! Tidemark query layer.
//!
//! The caller-facing half of the cache: key generation, write-driven
//! invalidation, and the [`QueryCache`] wrapper that ties them to a cache
//! backend and a real data source.
//!
//! # Read Path
//!
//! `fetch` computes a key from the query's fingerprint plus the current
//! version token of every table the query reads, then consults the cache
//! backend. A hit yields the stored rows; a miss executes the source
//! eagerly and stores the complete sequence.
//!
//! # Write Path
//!
//! Bulk writes through the wrapper, and [`notify`](QueryCache::notify)
//! events from external write paths, resolve the affected tables and bump
//! each one's version token. Nothing is deleted: entries keyed under old
//! tokens become unreachable and age out under the backend's own policy.
//!
//! # Consistency
//!
//! Invalidation completes before a wrapped write delegates, so a task
//! never misses its own writes. Across concurrent tasks one narrow race
//! remains, where a reader stores fresh rows under a key computed before
//! a bump; the entry is stale but self-heals on the next bump of any
//! contributing table. See the [`cache`] module docs for the full
//! account.

pub mod cache;
pub mod invalidation;
pub mod keygen;
pub mod result_set;

pub use cache::{QueryCache, QueryCacheConfig};
pub use invalidation::InvalidationCoordinator;
pub use keygen::KeyGenerator;
pub use result_set::{ResultOrigin, ResultSet};
