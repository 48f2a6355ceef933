//! Cache key generation.
//!
//! A key binds a query's structural fingerprint to the current version
//! token of every table the query reads, its own table and joins alike.
//! Bumping any contributing token changes every key computed afterwards,
//! so invalidation never has to find or delete the entries written under
//! the old tokens - they are simply never addressed again.

use std::sync::Arc;

use tidemark_core::{CacheKey, QueryError, QuerySpec, TidemarkResult, VersionToken};
use tidemark_store::VersionStore;
use tracing::debug;

/// Computes versioned cache keys for query specs.
///
/// Cheap to clone; clones share the underlying version store, so they
/// compute identical keys for identical specs until a token is bumped.
#[derive(Debug)]
pub struct KeyGenerator<V> {
    versions: Arc<V>,
}

impl<V> Clone for KeyGenerator<V> {
    fn clone(&self) -> Self {
        Self {
            versions: Arc::clone(&self.versions),
        }
    }
}

impl<V: VersionStore> KeyGenerator<V> {
    pub fn new(versions: Arc<V>) -> Self {
        Self { versions }
    }

    /// Compute the cache key for `spec`.
    ///
    /// Fails with [`QueryError::EmptyResult`] when the query provably
    /// selects no rows. The check runs before any version store access:
    /// provably empty queries must not mint tokens or touch the cache, the
    /// caller short-circuits them to an empty result instead.
    pub async fn key_for(&self, spec: &QuerySpec) -> TidemarkResult<CacheKey> {
        if spec.is_provably_empty() {
            return Err(QueryError::EmptyResult.into());
        }

        let fingerprint = spec.fingerprint();
        let tables: Vec<_> = spec.tables_read().into_iter().collect();
        let mut tokens: Vec<VersionToken> = Vec::with_capacity(tables.len());
        for table in &tables {
            tokens.push(self.versions.get(table).await?);
        }

        let key = CacheKey::assemble(&fingerprint, tables.iter().zip(tokens.iter()));
        debug!(
            fingerprint = %fingerprint,
            key = %key,
            tables = tables.len(),
            "Computed cache key"
        );
        Ok(key)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tidemark_core::{Predicate, TableId, TidemarkError};
    use tidemark_store::InMemoryVersionStore;

    fn generator() -> KeyGenerator<InMemoryVersionStore> {
        KeyGenerator::new(Arc::new(InMemoryVersionStore::new()))
    }

    fn open_orders() -> QuerySpec {
        QuerySpec::all("orders").with_filter(Predicate::eq("status", json!("open")))
    }

    #[tokio::test]
    async fn test_same_spec_computes_same_key() {
        let keys = generator();
        let first = keys.key_for(&open_orders()).await.expect("key should compute");
        let second = keys.key_for(&open_orders()).await.expect("key should compute");
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_filter_value_changes_key() {
        let keys = generator();
        let open = keys.key_for(&open_orders()).await.expect("key should compute");
        let held = keys
            .key_for(
                &QuerySpec::all("orders").with_filter(Predicate::eq("status", json!("held"))),
            )
            .await
            .expect("key should compute");
        assert_ne!(open, held);
    }

    #[tokio::test]
    async fn test_bump_changes_key() {
        let versions = Arc::new(InMemoryVersionStore::new());
        let keys = KeyGenerator::new(Arc::clone(&versions));

        let before = keys.key_for(&open_orders()).await.expect("key should compute");
        versions
            .bump(&TableId::new("orders"))
            .await
            .expect("bump should succeed");
        let after = keys.key_for(&open_orders()).await.expect("key should compute");

        assert_ne!(before, after);
    }

    #[tokio::test]
    async fn test_joined_table_bump_changes_key() {
        let versions = Arc::new(InMemoryVersionStore::new());
        let keys = KeyGenerator::new(Arc::clone(&versions));
        let spec = QuerySpec::all("orders").with_join("customers");

        let before = keys.key_for(&spec).await.expect("key should compute");
        versions
            .bump(&TableId::new("customers"))
            .await
            .expect("bump should succeed");
        let after = keys.key_for(&spec).await.expect("key should compute");

        assert_ne!(before, after);
    }

    #[tokio::test]
    async fn test_unrelated_bump_leaves_key_alone() {
        let versions = Arc::new(InMemoryVersionStore::new());
        let keys = KeyGenerator::new(Arc::clone(&versions));

        let before = keys.key_for(&open_orders()).await.expect("key should compute");
        versions
            .bump(&TableId::new("audit_log"))
            .await
            .expect("bump should succeed");
        let after = keys.key_for(&open_orders()).await.expect("key should compute");

        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn test_join_declaration_order_irrelevant() {
        let keys = generator();
        let ab = QuerySpec::all("orders").with_join("customers").with_join("regions");
        let ba = QuerySpec::all("orders").with_join("regions").with_join("customers");

        let key_ab = keys.key_for(&ab).await.expect("key should compute");
        let key_ba = keys.key_for(&ba).await.expect("key should compute");
        assert_eq!(key_ab, key_ba);
    }

    #[tokio::test]
    async fn test_provably_empty_fails_before_version_access() {
        let versions = Arc::new(InMemoryVersionStore::new());
        let keys = KeyGenerator::new(Arc::clone(&versions));

        let forced = keys.key_for(&QuerySpec::none("orders")).await;
        assert!(matches!(
            forced,
            Err(TidemarkError::Query(QueryError::EmptyResult))
        ));

        let contradiction = keys
            .key_for(&QuerySpec::all("orders").with_filter(Predicate::one_of("id", vec![])))
            .await;
        assert!(matches!(
            contradiction,
            Err(TidemarkError::Query(QueryError::EmptyResult))
        ));

        // No token was minted for either query.
        assert_eq!(versions.table_count().await, 0);
    }

    #[tokio::test]
    async fn test_clones_share_the_version_universe() {
        let keys = generator();
        let other = keys.clone();

        let a = keys.key_for(&open_orders()).await.expect("key should compute");
        let b = other.key_for(&open_orders()).await.expect("key should compute");
        assert_eq!(a, b);
    }
}
