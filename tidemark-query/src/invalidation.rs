//! Write-driven invalidation.
//!
//! The coordinator turns write notifications into version bumps: resolve
//! the affected tables, bump each one's token, done. Nothing is deleted
//! anywhere - entries keyed under the old tokens are unreachable from the
//! moment the bump lands.
//!
//! Every path through here is infallible from the caller's point of view.
//! A write that already happened cannot be rolled back by the cache layer,
//! so resolution and bump failures are logged and swallowed; the cost is
//! possible stale reads until the next successful bump, never a failed
//! write.

use std::collections::BTreeSet;
use std::sync::Arc;

use tidemark_core::{ChangeKind, TableId, WriteEvent};
use tidemark_schema::DependencyResolver;
use tidemark_store::VersionStore;
use tracing::{debug, warn};

/// Turns completed writes into version bumps on the affected tables.
#[derive(Debug)]
pub struct InvalidationCoordinator<V> {
    resolver: DependencyResolver,
    versions: Arc<V>,
}

impl<V> Clone for InvalidationCoordinator<V> {
    fn clone(&self) -> Self {
        Self {
            resolver: self.resolver.clone(),
            versions: Arc::clone(&self.versions),
        }
    }
}

impl<V: VersionStore> InvalidationCoordinator<V> {
    pub fn new(resolver: DependencyResolver, versions: Arc<V>) -> Self {
        Self { resolver, versions }
    }

    /// React to a row-level write on `table`.
    ///
    /// Resolves the affected set and bumps every table in it. When `table`
    /// is not in the catalog, resolution fails; the coordinator then bumps
    /// the written table alone, which keeps that table's own cached
    /// queries honest even under a stale catalog.
    pub async fn on_write(&self, table: &TableId, kind: ChangeKind) {
        let affected = match self.resolver.affected_tables(table, kind) {
            Ok(affected) => affected,
            Err(e) => {
                warn!(
                    table = %table,
                    error = %e,
                    "Affected-table resolution failed; bumping the written table only"
                );
                BTreeSet::from([table.clone()])
            }
        };
        self.bump_all(&affected).await;
    }

    /// React to a many-to-many link change between rows of `owner` and
    /// `related`.
    ///
    /// Bumps exactly the two endpoint tables. The linked rows themselves
    /// did not change, so no edge walk happens.
    pub async fn on_link_change(&self, owner: &TableId, related: &TableId) {
        let affected = self.resolver.link_affected(owner, related);
        self.bump_all(&affected).await;
    }

    /// Dispatch a write event delivered by the surrounding application.
    pub async fn observe(&self, event: &WriteEvent) {
        match event {
            WriteEvent::Row { table, kind } => self.on_write(table, *kind).await,
            WriteEvent::Link { owner, related } => self.on_link_change(owner, related).await,
        }
    }

    async fn bump_all(&self, tables: &BTreeSet<TableId>) {
        for table in tables {
            match self.versions.bump(table).await {
                Ok(_) => debug!(table = %table, "Invalidating cache for table"),
                Err(e) => warn!(
                    table = %table,
                    error = %e,
                    "Version bump failed; stale reads possible until the next successful write"
                ),
            }
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
