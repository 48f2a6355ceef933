//! The version store.
//!
//! One token per table. Cache keys hash the tokens of every table a query
//! reads, so replacing a token is what invalidation *is*: every key built
//! from the old token stops being computed, and the entries behind those
//! keys are never seen again.
//!
//! The store is injected wherever it is needed rather than reached through
//! a global, so tests and multi-cache setups can run isolated version
//! universes side by side.

use std::collections::HashMap;

use async_trait::async_trait;
use tidemark_core::{TableId, TidemarkResult, VersionToken};
use tokio::sync::RwLock;

/// Source of per-table version tokens.
///
/// # First Access
///
/// `get` on a table with no recorded token mints a fresh one and persists
/// it before returning. Persistence is required: if every call minted its
/// own token, no two key computations would ever agree and the cache
/// could never hit.
#[async_trait]
pub trait VersionStore: Send + Sync {
    /// Current token for `table`, minting and persisting a fresh one on
    /// first access.
    async fn get(&self, table: &TableId) -> TidemarkResult<VersionToken>;

    /// Replace the token for `table` with a fresh one and return it.
    ///
    /// The replacement must be atomic per table: concurrent bumps may
    /// interleave in any order, but readers always observe some complete
    /// token, never a torn one.
    async fn bump(&self, table: &TableId) -> TidemarkResult<VersionToken>;

    /// Install an externally minted token for `table`.
    ///
    /// Used to adopt tokens announced by a sibling process so both sides
    /// compute the same keys.
    async fn publish(&self, table: &TableId, token: VersionToken) -> TidemarkResult<()>;
}

/// Single-process version store backed by a map.
///
/// The default store for one-process deployments and tests. Tokens live
/// only as long as the process; on restart every table re-mints, which
/// orphans all previous cache entries. That is safe - orphans are simply
/// never read - just cold.
#[derive(Debug, Default)]
pub struct InMemoryVersionStore {
    versions: RwLock<HashMap<TableId, VersionToken>>,
}

impl InMemoryVersionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tables with a recorded token.
    pub async fn table_count(&self) -> usize {
        self.versions.read().await.len()
    }
}

#[async_trait]
impl VersionStore for InMemoryVersionStore {
    async fn get(&self, table: &TableId) -> TidemarkResult<VersionToken> {
        {
            let versions = self.versions.read().await;
            if let Some(token) = versions.get(table) {
                return Ok(*token);
            }
        }

        let mut versions = self.versions.write().await;
        // Another task may have minted between the read and write locks;
        // the entry call keeps exactly one winner.
        Ok(*versions
            .entry(table.clone())
            .or_insert_with(VersionToken::fresh))
    }

    async fn bump(&self, table: &TableId) -> TidemarkResult<VersionToken> {
        let fresh = VersionToken::fresh();
        let mut versions = self.versions.write().await;
        versions.insert(table.clone(), fresh);
        Ok(fresh)
    }

    async fn publish(&self, table: &TableId, token: VersionToken) -> TidemarkResult<()> {
        let mut versions = self.versions.write().await;
        versions.insert(table.clone(), token);
        Ok(())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_get_mints_once_and_sticks() {
        let store = InMemoryVersionStore::new();
        let table = TableId::new("orders");

        let first = store.get(&table).await.expect("get should succeed");
        let second = store.get(&table).await.expect("get should succeed");
        assert_eq!(first, second);
        assert_eq!(store.table_count().await, 1);
    }

    #[tokio::test]
    async fn test_tables_get_independent_tokens() {
        let store = InMemoryVersionStore::new();

        let orders = store
            .get(&TableId::new("orders"))
            .await
            .expect("get should succeed");
        let customers = store
            .get(&TableId::new("customers"))
            .await
            .expect("get should succeed");
        assert_ne!(orders, customers);
    }

    #[tokio::test]
    async fn test_bump_replaces_token() {
        let store = InMemoryVersionStore::new();
        let table = TableId::new("orders");

        let before = store.get(&table).await.expect("get should succeed");
        let bumped = store.bump(&table).await.expect("bump should succeed");
        let after = store.get(&table).await.expect("get should succeed");

        assert_ne!(before, bumped);
        assert_eq!(bumped, after);
    }

    #[tokio::test]
    async fn test_bump_leaves_other_tables_alone() {
        let store = InMemoryVersionStore::new();
        let orders = TableId::new("orders");
        let customers = TableId::new("customers");

        let customers_before = store.get(&customers).await.expect("get should succeed");
        store.bump(&orders).await.expect("bump should succeed");
        let customers_after = store.get(&customers).await.expect("get should succeed");

        assert_eq!(customers_before, customers_after);
    }

    #[tokio::test]
    async fn test_publish_installs_exact_token() {
        let store = InMemoryVersionStore::new();
        let table = TableId::new("orders");
        let remote = VersionToken::fresh();

        store
            .publish(&table, remote)
            .await
            .expect("publish should succeed");
        let current = store.get(&table).await.expect("get should succeed");
        assert_eq!(current, remote);
    }

    #[tokio::test]
    async fn test_concurrent_first_access_converges() {
        let store = InMemoryVersionStore::new();
        let table = TableId::new("orders");

        let (a, b, c) = tokio::join!(store.get(&table), store.get(&table), store.get(&table));
        let a = a.expect("get should succeed");
        let b = b.expect("get should succeed");
        let c = c.expect("get should succeed");

        assert_eq!(a, b);
        assert_eq!(b, c);
        assert_eq!(store.table_count().await, 1);
    }
}
