//! Tidemark Store - Version & Cache Backends
//!
//! The stateful surfaces under the query layer:
//!
//! - [`VersionStore`]: one token per table, replaced wholesale on
//!   invalidation. Comes in a single-process flavor and a broadcasting
//!   flavor for multi-process deployments.
//! - [`CacheStore`]: keyed result-set storage, with an in-memory backend
//!   and an LMDB backend. Neither exposes deletion: invalidation works by
//!   key unreachability alone, never by removing entries.
//! - [`DataSource`]: the relational source of truth the cache fronts,
//!   including the bulk write paths that must route through the caching
//!   wrapper for invalidation to fire.

pub mod broadcast;
pub mod lmdb_backend;
pub mod memory;
pub mod traits;
pub mod version;

pub use broadcast::{BroadcastVersionStore, VersionUpdate};
pub use lmdb_backend::{LmdbCacheStore, LmdbStoreError};
pub use memory::InMemoryCacheStore;
pub use traits::{CacheRow, CacheStats, CacheStore, CachedEntry, DataSource};
pub use version::{InMemoryVersionStore, VersionStore};
