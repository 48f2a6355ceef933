//! Relationship descriptions and write events.

use serde::{Deserialize, Serialize};

use crate::table::TableId;

/// The kind of write that occurred against a table.
///
/// Carried through the invalidation path for logging; the affected-table
/// computation deliberately ignores it, because narrowing invalidation by
/// write kind risks serving stale hits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
    BulkCreate,
    BulkUpdate,
}

/// How one table relates to another in the declared schema.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RelationKind {
    /// This table holds a foreign key to the related table.
    ManyToOne,
    /// The related table holds foreign keys back to this one.
    /// `owned_by_related` is true for the synthesized reverse side of a
    /// declared many-to-one.
    OneToMany { owned_by_related: bool },
    /// One row here pairs with at most one row there. `owned_by_related`
    /// is true when the link column lives on the related table.
    OneToOne { owned_by_related: bool },
    /// Join-table relation. `through` names a developer-defined
    /// intermediate table when one exists; such edges are never walked by
    /// invalidation, the intermediate table invalidates itself when
    /// written.
    ManyToMany { through: Option<TableId> },
}

/// A declared edge from one table to a related table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipEdge {
    pub related: TableId,
    pub kind: RelationKind,
}

impl RelationshipEdge {
    /// Create an edge to `related` with the given relation kind.
    pub fn new(related: impl Into<TableId>, kind: RelationKind) -> Self {
        Self {
            related: related.into(),
            kind,
        }
    }
}

/// Notification of a completed write, delivered by the surrounding
/// application's write paths at least once per logical write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WriteEvent {
    /// Rows of `table` were inserted, updated, or deleted.
    Row { table: TableId, kind: ChangeKind },
    /// A many-to-many link between rows of `owner` and `related` was added,
    /// removed, or cleared.
    Link { owner: TableId, related: TableId },
}

impl WriteEvent {
    /// Convenience constructor for a row-level event.
    pub fn row(table: impl Into<TableId>, kind: ChangeKind) -> Self {
        Self::Row {
            table: table.into(),
            kind,
        }
    }

    /// Convenience constructor for a link-level event.
    pub fn link(owner: impl Into<TableId>, related: impl Into<TableId>) -> Self {
        Self::Link {
            owner: owner.into(),
            related: related.into(),
        }
    }
}
