//! Error types for tidemark operations.

use thiserror::Error;

use crate::table::TableId;

/// Query construction errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum QueryError {
    /// The query provably selects no rows; callers short-circuit to an
    /// empty result without touching the cache or the data source.
    #[error("Query is empty by construction")]
    EmptyResult,
}

/// Cache backend and version store errors.
///
/// None of these may reach a caller of a read or write: the cache layer
/// degrades to "as if the cache were empty" and logs instead.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("Cache backend unavailable: {reason}")]
    BackendUnavailable { reason: String },

    #[error("Version store unavailable: {reason}")]
    VersionUnavailable { reason: String },

    #[error("Cache payload serialization failed: {reason}")]
    Serialization { reason: String },
}

/// Relationship catalog errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SchemaError {
    #[error("Unknown table: {table}")]
    UnknownTable { table: TableId },

    #[error("Table declared twice: {table}")]
    DuplicateTable { table: TableId },

    #[error("Edge from {table} references undeclared table {related}")]
    UnknownRelated { table: TableId, related: TableId },
}

/// Errors surfaced by the real data source. These propagate to callers
/// untouched; the cache layer never swallows them.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SourceError {
    #[error("Query execution failed on {table}: {reason}")]
    ExecutionFailed { table: TableId, reason: String },

    #[error("Write failed on {table}: {reason}")]
    WriteFailed { table: TableId, reason: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Master error type for all tidemark errors.
#[derive(Debug, Clone, Error)]
pub enum TidemarkError {
    #[error("Query error: {0}")]
    Query(#[from] QueryError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

impl TidemarkError {
    /// Whether this error belongs to the cache layer itself (backend,
    /// version store, or catalog resolution) and must therefore degrade
    /// rather than surface to callers.
    pub fn is_cache_layer(&self) -> bool {
        matches!(self, TidemarkError::Store(_) | TidemarkError::Schema(_))
    }
}

/// Result type alias for tidemark operations.
pub type TidemarkResult<T> = Result<T, TidemarkError>;

// =============================================================================
// TESTS
// =============================================================================
