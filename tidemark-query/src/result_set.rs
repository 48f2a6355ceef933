//! Materialized query results and their provenance.
//!
//! Every read through the cached wrapper produces a [`ResultSet`]: the rows
//! plus where they came from. Provenance is observational - callers that
//! only want rows ignore it, tests and metrics read it.

use chrono::{DateTime, Utc};

/// Where a result set's rows came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResultOrigin {
    /// Served from the cache backend.
    Hit,
    /// Fetched from the data source after a cache miss.
    Miss,
    /// The query was provably empty; neither the cache backend nor the
    /// data source was consulted.
    EmptyQuery,
    /// Caching was disabled or degraded; the data source was queried
    /// directly and nothing was cached.
    Bypass,
}

impl ResultOrigin {
    /// Whether the rows were served from cache.
    pub fn is_hit(&self) -> bool {
        matches!(self, ResultOrigin::Hit)
    }
}

/// The rows a query materialized, tagged with provenance.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultSet<R> {
    rows: Vec<R>,
    origin: ResultOrigin,
    materialized_at: DateTime<Utc>,
}

impl<R> ResultSet<R> {
    /// A result served from the cache backend. `cached_at` is when the
    /// entry was originally written, not when it was read back.
    pub fn from_cache(rows: Vec<R>, cached_at: DateTime<Utc>) -> Self {
        Self {
            rows,
            origin: ResultOrigin::Hit,
            materialized_at: cached_at,
        }
    }

    /// A result fetched from the data source on a miss.
    pub fn from_source(rows: Vec<R>) -> Self {
        Self {
            rows,
            origin: ResultOrigin::Miss,
            materialized_at: Utc::now(),
        }
    }

    /// The empty result of a query that provably selects nothing.
    pub fn empty_query() -> Self {
        Self {
            rows: Vec::new(),
            origin: ResultOrigin::EmptyQuery,
            materialized_at: Utc::now(),
        }
    }

    /// A result fetched directly from the data source with caching
    /// disabled or degraded.
    pub fn bypass(rows: Vec<R>) -> Self {
        Self {
            rows,
            origin: ResultOrigin::Bypass,
            materialized_at: Utc::now(),
        }
    }

    /// The rows, in result order.
    pub fn rows(&self) -> &[R] {
        &self.rows
    }

    /// Consume the set, yielding its rows.
    pub fn into_rows(self) -> Vec<R> {
        self.rows
    }

    /// Where the rows came from.
    pub fn origin(&self) -> ResultOrigin {
        self.origin
    }

    /// When the rows were materialized. For cache hits this is the entry's
    /// original write time.
    pub fn materialized_at(&self) -> DateTime<Utc> {
        self.materialized_at
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the set holds zero rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Whether the rows were served from cache.
    pub fn was_cache_hit(&self) -> bool {
        self.origin.is_hit()
    }
}

impl<R> IntoIterator for ResultSet<R> {
    type Item = R;
    type IntoIter = std::vec::IntoIter<R>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.into_iter()
    }
}

impl<'a, R> IntoIterator for &'a ResultSet<R> {
    type Item = &'a R;
    type IntoIter = std::slice::Iter<'a, R>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}

// ============================================================================
// TESTS
// ============================================================================
