//! Tidemark Core - Data Types
//!
//! Pure data structures shared by every other crate: table identifiers,
//! version tokens, query shapes and their fingerprints, cache keys,
//! relationship descriptions, and the error taxonomy. This crate contains
//! ONLY data types - no I/O, no async, no business logic.

pub mod error;
pub mod key;
pub mod query;
pub mod relation;
pub mod table;
pub mod version;

pub use error::{
    ConfigError, QueryError, SchemaError, SourceError, StoreError, TidemarkError, TidemarkResult,
};
pub use key::CacheKey;
pub use query::{
    CompareOp, PageRange, Predicate, QueryFingerprint, QuerySpec, SortDirection, SortKey,
    UpdatePatch,
};
pub use relation::{ChangeKind, RelationKind, RelationshipEdge, WriteEvent};
pub use table::TableId;
pub use version::VersionToken;
