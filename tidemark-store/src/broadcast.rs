//! Version fan-out for multi-process deployments.
//!
//! Each process keeps its own version store; correctness across processes
//! needs their tokens to agree, or every process computes different keys
//! and the shared cache never hits. [`BroadcastVersionStore`] is a version
//! store that announces every locally minted token on a broadcast channel.
//! A bridge (transport is up to the deployment - a pg NOTIFY relay, a
//! message bus consumer) forwards announcements from one process into the
//! other processes' `publish`, which installs the token silently.
//!
//! No tasks are spawned here. Announcements happen inline on the write
//! path and subscribers pull at their own pace.

use std::collections::HashMap;

use async_trait::async_trait;
use tidemark_core::{TableId, TidemarkResult, VersionToken};
use tokio::sync::{broadcast, RwLock};
use tokio_stream::wrappers::BroadcastStream;
use tracing::debug;

use crate::version::VersionStore;

/// A token change announced to subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionUpdate {
    /// The table whose token changed.
    pub table: TableId,
    /// The newly installed token.
    pub token: VersionToken,
}

/// Version store that announces locally minted tokens.
///
/// Behaves like the in-memory store, plus a broadcast channel carrying
/// every token this process mints - both first-access mints and bumps.
/// Tokens arriving via `publish` are installed without being re-announced;
/// two processes bridged in both directions would otherwise echo tokens
/// back and forth forever.
pub struct BroadcastVersionStore {
    versions: RwLock<HashMap<TableId, VersionToken>>,
    tx: broadcast::Sender<VersionUpdate>,
}

impl BroadcastVersionStore {
    /// Create a store with the specified announcement buffer capacity.
    ///
    /// The capacity determines how many undelivered announcements can be
    /// buffered before slow subscribers start missing them.
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self {
            versions: RwLock::new(HashMap::new()),
            tx,
        }
    }

    /// Subscribe to token announcements.
    ///
    /// Returns a receiver that will receive all future announcements.
    /// The receiver must be polled to avoid lagging.
    pub fn subscribe(&self) -> broadcast::Receiver<VersionUpdate> {
        self.tx.subscribe()
    }

    /// Subscribe as a [`Stream`](tokio_stream::Stream) of announcements.
    pub fn update_stream(&self) -> BroadcastStream<VersionUpdate> {
        BroadcastStream::new(self.tx.subscribe())
    }

    /// Announce a locally minted token.
    ///
    /// Non-blocking. If no subscribers are connected the announcement is
    /// simply dropped.
    fn announce(&self, table: &TableId, token: VersionToken) {
        let update = VersionUpdate {
            table: table.clone(),
            token,
        };
        match self.tx.send(update) {
            Ok(receiver_count) => {
                debug!(
                    table = %table,
                    receivers = receiver_count,
                    "Announced version update"
                );
            }
            Err(_) => {
                // No subscribers connected - this is fine
                debug!(table = %table, "No subscribers for version update");
            }
        }
    }
}

#[async_trait]
impl VersionStore for BroadcastVersionStore {
    async fn get(&self, table: &TableId) -> TidemarkResult<VersionToken> {
        {
            let versions = self.versions.read().await;
            if let Some(token) = versions.get(table) {
                return Ok(*token);
            }
        }

        let mut versions = self.versions.write().await;
        if let Some(token) = versions.get(table) {
            return Ok(*token);
        }
        let fresh = VersionToken::fresh();
        versions.insert(table.clone(), fresh);
        // Announced while the write guard is held so announcement order
        // matches install order.
        self.announce(table, fresh);
        Ok(fresh)
    }

    async fn bump(&self, table: &TableId) -> TidemarkResult<VersionToken> {
        let fresh = VersionToken::fresh();
        let mut versions = self.versions.write().await;
        versions.insert(table.clone(), fresh);
        self.announce(table, fresh);
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
    use tokio::sync::broadcast::error::TryRecvError;

    #[tokio::test]
    async fn test_bump_announces_to_subscribers() {
        let store = BroadcastVersionStore::new(16);
        let table = TableId::new("orders");
        let mut rx = store.subscribe();

        let token = store.bump(&table).await.expect("bump should succeed");

        let update = rx.try_recv().expect("announcement should be buffered");
        assert_eq!(update.table, table);
        assert_eq!(update.token, token);
    }

    #[tokio::test]
    async fn test_first_access_mint_is_announced() {
        let store = BroadcastVersionStore::new(16);
        let table = TableId::new("orders");
        let mut rx = store.subscribe();

        let token = store.get(&table).await.expect("get should succeed");

        let update = rx.try_recv().expect("announcement should be buffered");
        assert_eq!(update.token, token);
    }

    #[tokio::test]
    async fn test_repeat_get_does_not_reannounce() {
        let store = BroadcastVersionStore::new(16);
        let table = TableId::new("orders");
        let mut rx = store.subscribe();

        store.get(&table).await.expect("get should succeed");
        rx.try_recv().expect("first access should announce");

        store.get(&table).await.expect("get should succeed");
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn test_publish_installs_silently() {
        let store = BroadcastVersionStore::new(16);
        let table = TableId::new("orders");
        let mut rx = store.subscribe();

        let remote = VersionToken::fresh();
        store
            .publish(&table, remote)
            .await
            .expect("publish should succeed");
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));

        // The published token is now current, so the get does not mint.
        let current = store.get(&table).await.expect("get should succeed");
        assert_eq!(current, remote);
        assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    }

    #[tokio::test]
    async fn test_bridged_stores_converge() {
        let local = BroadcastVersionStore::new(16);
        let remote = BroadcastVersionStore::new(16);
        let table = TableId::new("orders");
        let mut rx = local.subscribe();

        let token = local.bump(&table).await.expect("bump should succeed");

        // What a deployment bridge does: forward the announcement into the
        // sibling store.
        let update = rx.try_recv().expect("announcement should be buffered");
        remote
            .publish(&update.table, update.token)
            .await
            .expect("publish should succeed");

        let adopted = remote.get(&table).await.expect("get should succeed");
        assert_eq!(adopted, token);
    }

    #[tokio::test]
    async fn test_update_stream_yields_announcements() {
        use tokio_stream::StreamExt;

        let store = BroadcastVersionStore::new(16);
        let table = TableId::new("orders");
        let mut stream = store.update_stream();

        let token = store.bump(&table).await.expect("bump should succeed");

        let update = stream
            .next()
            .await
            .expect("stream should be open")
            .expect("announcement should not lag");
        assert_eq!(update.table, table);
        assert_eq!(update.token, token);
    }
}
