//! Tidemark Test Utilities
//!
//! Shared test infrastructure for the Tidemark workspace:
//!
//! - **Mocks**: an in-memory [`MockDataSource`] with call counters, a
//!   [`RecordingCacheStore`] that counts backend traffic, and failure
//!   injectors for every seam ([`FailingCacheStore`], [`FailingVersionStore`],
//!   [`FailingDataSource`])
//! - **Generators**: proptest strategies for tables, predicates, query
//!   specs, and version tokens
//! - **Fixtures**: a small shop schema covering every relationship kind the
//!   resolver distinguishes, plus canned rows and query shapes
//! - **Assertions**: `#[track_caller]` helpers for error-path checks
//!
//! The mocks fix the row type to `serde_json::Value`, which keeps fixtures
//! declarative and lets one mock serve every row shape a test needs.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use tidemark_core::{
    CacheKey, CompareOp, Predicate, QuerySpec, SourceError, StoreError, TableId, TidemarkResult,
    UpdatePatch,
};
use tidemark_store::{
    CacheRow, CacheStats, CacheStore, CachedEntry, DataSource, InMemoryCacheStore, VersionStore,
};

// Re-export the types tests reach for constantly, so most test files need
// only this crate plus the crate under test.
pub use tidemark_core::{ChangeKind, SortDirection, VersionToken, WriteEvent};
pub use tidemark_schema::{DependencyResolver, SchemaCatalog};
pub use tidemark_store::InMemoryVersionStore;

// ============================================================================
// MOCK DATA SOURCE
// ============================================================================

/// In-memory relational source over JSON rows.
///
/// Evaluates filter predicates, ordering, and pagination well enough for
/// cache tests to use realistic query shapes, and counts every call so
/// tests can assert whether the cache layer actually reached the source.
#[derive(Debug, Default)]
pub struct MockDataSource {
    tables: RwLock<HashMap<TableId, Vec<Value>>>,
    execute_calls: AtomicU64,
    bulk_create_calls: AtomicU64,
    bulk_update_calls: AtomicU64,
}

impl MockDataSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a table with rows.
    pub fn with_table(self, table: impl Into<TableId>, rows: Vec<Value>) -> Self {
        self.tables
            .write()
            .expect("lock poisoned")
            .insert(table.into(), rows);
        self
    }

    /// Append rows to a table without going through `bulk_create`.
    pub fn insert_rows(&self, table: &TableId, rows: Vec<Value>) {
        self.tables
            .write()
            .expect("lock poisoned")
            .entry(table.clone())
            .or_default()
            .extend(rows);
    }

    /// Snapshot of a table's rows, in insertion order.
    pub fn rows_in(&self, table: &TableId) -> Vec<Value> {
        self.tables
            .read()
            .expect("lock poisoned")
            .get(table)
            .cloned()
            .unwrap_or_default()
    }

    /// Number of `execute` calls so far.
    pub fn execute_count(&self) -> u64 {
        self.execute_calls.load(AtomicOrdering::Relaxed)
    }

    /// Number of `bulk_create` calls so far.
    pub fn bulk_create_count(&self) -> u64 {
        self.bulk_create_calls.load(AtomicOrdering::Relaxed)
    }

    /// Number of `bulk_update` calls so far.
    pub fn bulk_update_count(&self) -> u64 {
        self.bulk_update_calls.load(AtomicOrdering::Relaxed)
    }
}

#[async_trait]
impl DataSource<Value> for MockDataSource {
    async fn execute(&self, spec: &QuerySpec) -> TidemarkResult<Vec<Value>> {
        self.execute_calls.fetch_add(1, AtomicOrdering::Relaxed);

        if spec.is_provably_empty() {
            return Ok(Vec::new());
        }

        let mut rows = self.rows_in(&spec.table);
        if let Some(filter) = &spec.filter {
            rows.retain(|row| row_matches(filter, row));
        }

        if !spec.order_by.is_empty() {
            rows.sort_by(|a, b| {
                for key in &spec.order_by {
                    let ord = compare_values(
                        a.get(&key.field).unwrap_or(&Value::Null),
                        b.get(&key.field).unwrap_or(&Value::Null),
                    )
                    .unwrap_or(Ordering::Equal);
                    let ord = match key.direction {
                        SortDirection::Ascending => ord,
                        SortDirection::Descending => ord.reverse(),
                    };
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                Ordering::Equal
            });
        }

        if let Some(range) = spec.range {
            rows = rows
                .into_iter()
                .skip(range.offset as usize)
                .take(range.limit as usize)
                .collect();
        }

        Ok(rows)
    }

    async fn bulk_create(&self, table: &TableId, rows: Vec<Value>) -> TidemarkResult<Vec<Value>> {
        self.bulk_create_calls.fetch_add(1, AtomicOrdering::Relaxed);
        self.insert_rows(table, rows.clone());
        Ok(rows)
    }

    async fn bulk_update(&self, table: &TableId, patch: &UpdatePatch) -> TidemarkResult<u64> {
        self.bulk_update_calls.fetch_add(1, AtomicOrdering::Relaxed);

        let mut tables = self.tables.write().expect("lock poisoned");
        let rows = tables.entry(table.clone()).or_default();

        let mut touched = 0u64;
        for row in rows.iter_mut() {
            let matches = patch
                .filter
                .as_ref()
                .map(|filter| row_matches(filter, row))
                .unwrap_or(true);
            if !matches {
                continue;
            }
            if let Value::Object(fields) = row {
                for (field, value) in &patch.assignments {
                    fields.insert(field.clone(), value.clone());
                }
            }
            touched += 1;
        }
        Ok(touched)
    }
}

/// Evaluate a predicate against a JSON object row.
///
/// Rows missing the referenced field never match, whatever the operator.
fn row_matches(pred: &Predicate, row: &Value) -> bool {
    match pred {
        Predicate::Compare { field, op, value } => {
            let Some(actual) = row.get(field) else {
                return false;
            };
            match op {
                CompareOp::Eq => actual == value,
                CompareOp::Ne => actual != value,
                CompareOp::Gt => compare_values(actual, value) == Some(Ordering::Greater),
                CompareOp::Lt => compare_values(actual, value) == Some(Ordering::Less),
                CompareOp::Gte => matches!(
                    compare_values(actual, value),
                    Some(Ordering::Greater | Ordering::Equal)
                ),
                CompareOp::Lte => matches!(
                    compare_values(actual, value),
                    Some(Ordering::Less | Ordering::Equal)
                ),
                CompareOp::Contains => match (actual.as_str(), value.as_str()) {
                    (Some(haystack), Some(needle)) => haystack.contains(needle),
                    _ => false,
                },
            }
        }
        Predicate::In { field, values } => row
            .get(field)
            .map(|actual| values.contains(actual))
            .unwrap_or(false),
        Predicate::And(children) => children.iter().all(|child| row_matches(child, row)),
        // An empty disjunction is a no-op, matching the fingerprint
        // semantics of `Predicate::Or`.
        Predicate::Or(children) => {
            children.is_empty() || children.iter().any(|child| row_matches(child, row))
        }
        Predicate::Not(inner) => !row_matches(inner, row),
    }
}

/// Order two JSON scalars, or `None` when they are not comparable.
fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(a), Value::Number(b)) => a.as_f64().partial_cmp(&b.as_f64()),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

// ============================================================================
// MOCK CACHE STORES
// ============================================================================

/// Cache store that counts backend traffic.
///
/// Wraps an [`InMemoryCacheStore`] and records how many `get` and `put`
/// calls reached it, so tests can assert that a code path did - or, for
/// provably empty queries, did not - touch the cache backend at all.
#[derive(Debug, Default)]
pub struct RecordingCacheStore {
    inner: InMemoryCacheStore,
    get_calls: AtomicU64,
    put_calls: AtomicU64,
}

impl RecordingCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `get` calls so far.
    pub fn get_count(&self) -> u64 {
        self.get_calls.load(AtomicOrdering::Relaxed)
    }

    /// Number of `put` calls so far.
    pub fn put_count(&self) -> u64 {
        self.put_calls.load(AtomicOrdering::Relaxed)
    }
}

#[async_trait]
impl CacheStore for RecordingCacheStore {
    async fn get<R: CacheRow>(&self, key: &CacheKey) -> TidemarkResult<Option<CachedEntry<R>>> {
        self.get_calls.fetch_add(1, AtomicOrdering::Relaxed);
        self.inner.get::<R>(key).await
    }

    async fn put<R: CacheRow>(
        &self,
        key: &CacheKey,
        rows: &[R],
        cached_at: DateTime<Utc>,
    ) -> TidemarkResult<()> {
        self.put_calls.fetch_add(1, AtomicOrdering::Relaxed);
        self.inner.put(key, rows, cached_at).await
    }

    async fn stats(&self) -> TidemarkResult<CacheStats> {
        self.inner.stats().await
    }
}

/// Cache store whose every operation fails with `BackendUnavailable`.
///
/// Stands in for a crashed or unreachable backend when testing that reads
/// degrade to the data source instead of surfacing cache errors.
#[derive(Debug, Default)]
pub struct FailingCacheStore;

impl FailingCacheStore {
    pub fn new() -> Self {
        Self
    }

    fn outage() -> StoreError {
        StoreError::BackendUnavailable {
            reason: "injected backend outage".to_string(),
        }
    }
}

#[async_trait]
impl CacheStore for FailingCacheStore {
    async fn get<R: CacheRow>(&self, _key: &CacheKey) -> TidemarkResult<Option<CachedEntry<R>>> {
        Err(Self::outage().into())
    }

    async fn put<R: CacheRow>(
        &self,
        _key: &CacheKey,
        _rows: &[R],
        _cached_at: DateTime<Utc>,
    ) -> TidemarkResult<()> {
        Err(Self::outage().into())
    }

    async fn stats(&self) -> TidemarkResult<CacheStats> {
        Err(Self::outage().into())
    }
}

// ============================================================================
// MOCK VERSION STORES
// ============================================================================

/// Version store whose every operation fails with `VersionUnavailable`.
#[derive(Debug, Default)]
pub struct FailingVersionStore;

impl FailingVersionStore {
    pub fn new() -> Self {
        Self
    }

    fn outage() -> StoreError {
        StoreError::VersionUnavailable {
            reason: "injected version store outage".to_string(),
        }
    }
}

#[async_trait]
impl VersionStore for FailingVersionStore {
    async fn get(&self, _table: &TableId) -> TidemarkResult<VersionToken> {
        Err(Self::outage().into())
    }

    async fn bump(&self, _table: &TableId) -> TidemarkResult<VersionToken> {
        Err(Self::outage().into())
    }

    async fn publish(&self, _table: &TableId, _token: VersionToken) -> TidemarkResult<()> {
        Err(Self::outage().into())
    }
}

// ============================================================================
// FAILING DATA SOURCE
// ============================================================================

/// Data source whose every operation fails.
///
/// Source errors must propagate to callers untouched, unlike cache-layer
/// errors; this mock exercises that path.
#[derive(Debug, Default)]
pub struct FailingDataSource;

impl FailingDataSource {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DataSource<Value> for FailingDataSource {
    async fn execute(&self, spec: &QuerySpec) -> TidemarkResult<Vec<Value>> {
        Err(SourceError::ExecutionFailed {
            table: spec.table.clone(),
            reason: "injected execution failure".to_string(),
        }
        .into())
    }

    async fn bulk_create(&self, table: &TableId, _rows: Vec<Value>) -> TidemarkResult<Vec<Value>> {
        Err(SourceError::WriteFailed {
            table: table.clone(),
            reason: "injected write failure".to_string(),
        }
        .into())
    }

    async fn bulk_update(&self, table: &TableId, _patch: &UpdatePatch) -> TidemarkResult<u64> {
        Err(SourceError::WriteFailed {
            table: table.clone(),
            reason: "injected write failure".to_string(),
        }
        .into())
    }
}

// ============================================================================
// GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for tidemark types.

    use proptest::prelude::*;
    use serde_json::json;
    use tidemark_core::{
        ChangeKind, CompareOp, Predicate, QuerySpec, SortDirection, TableId, VersionToken,
    };

    /// Generate a table identifier.
    pub fn arb_table_id() -> impl Strategy<Value = TableId> {
        "[a-z][a-z_]{0,11}".prop_map(TableId::new)
    }

    /// Generate a field name.
    pub fn arb_field() -> impl Strategy<Value = String> {
        "[a-z][a-z_]{0,11}"
    }

    /// Generate a JSON scalar suitable as a predicate constant or row field.
    pub fn arb_scalar() -> impl Strategy<Value = serde_json::Value> {
        prop_oneof![
            any::<i64>().prop_map(|n| json!(n)),
            "[a-z0-9]{0,12}".prop_map(|s| json!(s)),
            any::<bool>().prop_map(|b| json!(b)),
        ]
    }

    /// Generate a comparison operator.
    pub fn arb_compare_op() -> impl Strategy<Value = CompareOp> {
        prop_oneof![
            Just(CompareOp::Eq),
            Just(CompareOp::Ne),
            Just(CompareOp::Gt),
            Just(CompareOp::Lt),
            Just(CompareOp::Gte),
            Just(CompareOp::Lte),
            Just(CompareOp::Contains),
        ]
    }

    /// Generate a predicate tree up to three levels deep.
    pub fn arb_predicate() -> impl Strategy<Value = Predicate> {
        let leaf = prop_oneof![
            (arb_field(), arb_compare_op(), arb_scalar())
                .prop_map(|(field, op, value)| Predicate::compare(field, op, value)),
            (arb_field(), prop::collection::vec(arb_scalar(), 0..4))
                .prop_map(|(field, values)| Predicate::one_of(field, values)),
        ];
        leaf.prop_recursive(3, 16, 4, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..4).prop_map(Predicate::And),
                prop::collection::vec(inner.clone(), 0..4).prop_map(Predicate::Or),
                inner.prop_map(|p| Predicate::Not(Box::new(p))),
            ]
        })
    }

    /// Generate a sort direction.
    pub fn arb_sort_direction() -> impl Strategy<Value = SortDirection> {
        prop_oneof![
            Just(SortDirection::Ascending),
            Just(SortDirection::Descending),
        ]
    }

    /// Generate a full query spec: table, optional filter, ordering,
    /// optional pagination, and joined tables. Never forced-empty.
    pub fn arb_query_spec() -> impl Strategy<Value = QuerySpec> {
        (
            arb_table_id(),
            prop::option::of(arb_predicate()),
            prop::collection::vec((arb_field(), arb_sort_direction()), 0..3),
            prop::option::of((0u64..1000, 1u64..200)),
            prop::collection::vec(arb_table_id(), 0..3),
        )
            .prop_map(|(table, filter, order, range, joins)| {
                let mut spec = QuerySpec::all(table);
                spec.filter = filter;
                for (field, direction) in order {
                    spec = spec.with_order(field, direction);
                }
                if let Some((offset, limit)) = range {
                    spec = spec.with_range(offset, limit);
                }
                for join in joins {
                    spec = spec.with_join(join);
                }
                spec
            })
    }

    /// Generate a change kind.
    pub fn arb_change_kind() -> impl Strategy<Value = ChangeKind> {
        prop_oneof![
            Just(ChangeKind::Insert),
            Just(ChangeKind::Update),
            Just(ChangeKind::Delete),
            Just(ChangeKind::BulkCreate),
            Just(ChangeKind::BulkUpdate),
        ]
    }

    /// Generate a freshly minted version token.
    pub fn arb_version_token() -> impl Strategy<Value = VersionToken> {
        Just(()).prop_map(|_| VersionToken::fresh())
    }

    /// Generate an order-shaped JSON row.
    pub fn arb_order_row() -> impl Strategy<Value = serde_json::Value> {
        (0u64..10_000, "[a-z]{3,8}", 0u64..500).prop_map(|(id, status, customer_id)| {
            json!({ "id": id, "status": status, "customer_id": customer_id })
        })
    }
}

// ============================================================================
// FIXTURES
// ============================================================================

pub mod fixtures {
    //! Canned schemas, rows, and query shapes.

    use std::sync::Arc;

    use serde_json::{json, Value};
    use tidemark_core::{Predicate, QuerySpec};
    use tidemark_schema::{DependencyResolver, SchemaCatalog};

    use crate::MockDataSource;

    /// A shop schema exercising every relationship kind:
    ///
    /// - `orders` many-to-one `customers`
    /// - `profiles` one-to-one `users` (link column on profiles)
    /// - `posts` many-to-many `tags` (implicit join table)
    /// - `students` many-to-many `courses` through `enrollments`, with
    ///   `enrollments` holding a foreign key to each side
    /// - `audit_log` standalone
    pub fn shop_catalog() -> SchemaCatalog {
        SchemaCatalog::builder()
            .table("customers")
            .table("orders")
            .table("profiles")
            .table("users")
            .table("posts")
            .table("tags")
            .table("students")
            .table("courses")
            .table("enrollments")
            .table("audit_log")
            .many_to_one("orders", "customers")
            .one_to_one("profiles", "users")
            .many_to_many("posts", "tags")
            .many_to_many_through("students", "courses", "enrollments")
            .many_to_one("enrollments", "students")
            .many_to_one("enrollments", "courses")
            .build()
            .expect("shop catalog should build")
    }

    /// A resolver over [`shop_catalog`].
    pub fn shop_resolver() -> DependencyResolver {
        DependencyResolver::new(Arc::new(shop_catalog()))
    }

    /// An order row.
    pub fn order_row(id: u64, status: &str, customer_id: u64) -> Value {
        json!({ "id": id, "status": status, "customer_id": customer_id })
    }

    /// A customer row.
    pub fn customer_row(id: u64, name: &str) -> Value {
        json!({ "id": id, "name": name })
    }

    /// A data source preloaded with three orders and two customers.
    ///
    /// Orders 1 and 3 are `open` (customers 10 and 11), order 2 is `closed`
    /// (customer 10).
    pub fn seeded_source() -> MockDataSource {
        MockDataSource::new()
            .with_table(
                "orders",
                vec![
                    order_row(1, "open", 10),
                    order_row(2, "closed", 10),
                    order_row(3, "open", 11),
                ],
            )
            .with_table(
                "customers",
                vec![customer_row(10, "Ada"), customer_row(11, "Grace")],
            )
    }

    /// The canonical "orders with this status" query.
    pub fn orders_by_status(status: &str) -> QuerySpec {
        QuerySpec::all("orders").with_filter(Predicate::eq("status", json!(status)))
    }
}

// ============================================================================
// ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertion helpers for error-path tests.

    use std::fmt::Debug;

    use tidemark_core::{QueryError, SchemaError, SourceError, StoreError, TidemarkError};

    /// Assert a result is `Ok` and unwrap it.
    #[track_caller]
    pub fn assert_ok<T, E: Debug>(result: Result<T, E>) -> T {
        match result {
            Ok(value) => value,
            Err(e) => panic!("expected Ok, got Err: {:?}", e),
        }
    }

    /// Assert a result is `Err` and unwrap the error.
    #[track_caller]
    pub fn assert_err<T: Debug, E>(result: Result<T, E>) -> E {
        match result {
            Ok(value) => panic!("expected Err, got Ok: {:?}", value),
            Err(e) => e,
        }
    }

    /// Assert a result failed because the query is empty by construction.
    #[track_caller]
    pub fn assert_empty_result<T: Debug>(result: Result<T, TidemarkError>) {
        let err = assert_err(result);
        assert!(
            matches!(err, TidemarkError::Query(QueryError::EmptyResult)),
            "expected EmptyResult, got: {:?}",
            err
        );
    }

    /// Assert a result failed with `UnknownTable` for the named table.
    #[track_caller]
    pub fn assert_unknown_table<T: Debug>(result: Result<T, TidemarkError>, table: &str) {
        let err = assert_err(result);
        match err {
            TidemarkError::Schema(SchemaError::UnknownTable { table: t }) => {
                assert_eq!(t.as_str(), table, "unexpected table in UnknownTable");
            }
            other => panic!("expected UnknownTable({}), got: {:?}", table, other),
        }
    }

    /// Assert a result failed with a data source error and unwrap it.
    #[track_caller]
    pub fn assert_source_error<T: Debug>(result: Result<T, TidemarkError>) -> SourceError {
        match assert_err(result) {
            TidemarkError::Source(e) => e,
            other => panic!("expected Source error, got: {:?}", other),
        }
    }

    /// Assert a result failed with a store error and unwrap it.
    #[track_caller]
    pub fn assert_store_error<T: Debug>(result: Result<T, TidemarkError>) -> StoreError {
        match assert_err(result) {
            TidemarkError::Store(e) => e,
            other => panic!("expected Store error, got: {:?}", other),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
