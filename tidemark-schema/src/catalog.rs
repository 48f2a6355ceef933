//! Static relationship catalog.
//!
//! The catalog is the closed world of tables and edges the cache knows
//! about. It is declared once at startup through the builder and read-only
//! afterwards: no runtime metadata introspection, no registration after
//! `build()`. Declaring one side of a relationship is enough - `build()`
//! synthesizes the reverse edges, the same way a declared foreign key
//! implies the reverse relation on the referenced table.

use std::collections::BTreeMap;

use tidemark_core::{RelationKind, RelationshipEdge, SchemaError, TableId, TidemarkResult};

/// The declared tables and relationship edges, resolved and validated.
///
/// Every table's edge list contains both its declared edges and the
/// synthesized reverse edges pointing back at it from other declarations.
#[derive(Debug, Clone)]
pub struct SchemaCatalog {
    tables: BTreeMap<TableId, Vec<RelationshipEdge>>,
}

impl SchemaCatalog {
    /// Start declaring a catalog.
    pub fn builder() -> SchemaCatalogBuilder {
        SchemaCatalogBuilder::default()
    }

    /// Whether `table` was declared.
    pub fn contains(&self, table: &TableId) -> bool {
        self.tables.contains_key(table)
    }

    /// All declared tables, in identifier order.
    pub fn tables(&self) -> impl Iterator<Item = &TableId> {
        self.tables.keys()
    }

    /// The edges of `table`, declared plus synthesized, or `None` for an
    /// undeclared table.
    pub fn relationships_of(&self, table: &TableId) -> Option<&[RelationshipEdge]> {
        self.tables.get(table).map(Vec::as_slice)
    }

    /// Number of declared tables.
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    /// Whether no tables were declared.
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

/// One declared (not yet mirrored) relationship.
#[derive(Debug, Clone)]
struct DeclaredEdge {
    from: TableId,
    to: TableId,
    kind: DeclaredKind,
}

#[derive(Debug, Clone)]
enum DeclaredKind {
    ManyToOne,
    OneToOne,
    ManyToMany { through: Option<TableId> },
}

/// Builder for [`SchemaCatalog`].
///
/// Tables must be declared before `build()`; edges may reference them in
/// any order. Validation happens in `build()`, so a misdeclared schema
/// fails at startup rather than at first use.
#[derive(Debug, Default)]
pub struct SchemaCatalogBuilder {
    tables: Vec<TableId>,
    edges: Vec<DeclaredEdge>,
}

impl SchemaCatalogBuilder {
    /// Declare a table.
    pub fn table(mut self, name: impl Into<TableId>) -> Self {
        self.tables.push(name.into());
        self
    }

    /// Declare that `from` holds a foreign key to `to`.
    ///
    /// Synthesizes the reverse one-to-many edge on `to`.
    pub fn many_to_one(mut self, from: impl Into<TableId>, to: impl Into<TableId>) -> Self {
        self.edges.push(DeclaredEdge {
            from: from.into(),
            to: to.into(),
            kind: DeclaredKind::ManyToOne,
        });
        self
    }

    /// Declare a one-to-one relationship whose link column lives on `from`.
    ///
    /// Synthesizes the reverse (related-owned) edge on `to`.
    pub fn one_to_one(mut self, from: impl Into<TableId>, to: impl Into<TableId>) -> Self {
        self.edges.push(DeclaredEdge {
            from: from.into(),
            to: to.into(),
            kind: DeclaredKind::OneToOne,
        });
        self
    }

    /// Declare a many-to-many relationship between `a` and `b` backed by an
    /// implicit join table.
    pub fn many_to_many(mut self, a: impl Into<TableId>, b: impl Into<TableId>) -> Self {
        self.edges.push(DeclaredEdge {
            from: a.into(),
            to: b.into(),
            kind: DeclaredKind::ManyToMany { through: None },
        });
        self
    }

    /// Declare a many-to-many relationship routed through a developer-defined
    /// intermediate table.
    ///
    /// Such edges are recorded but never walked by invalidation; `through`
    /// must be declared as a table and carries its own edges (typically
    /// many-to-one to each side).
    pub fn many_to_many_through(
        mut self,
        a: impl Into<TableId>,
        b: impl Into<TableId>,
        through: impl Into<TableId>,
    ) -> Self {
        self.edges.push(DeclaredEdge {
            from: a.into(),
            to: b.into(),
            kind: DeclaredKind::ManyToMany {
                through: Some(through.into()),
            },
        });
        self
    }

    /// Validate the declarations and synthesize reverse edges.
    pub fn build(self) -> TidemarkResult<SchemaCatalog> {
        let mut tables: BTreeMap<TableId, Vec<RelationshipEdge>> = BTreeMap::new();
        for table in self.tables {
            if tables.insert(table.clone(), Vec::new()).is_some() {
                return Err(SchemaError::DuplicateTable { table }.into());
            }
        }

        for edge in self.edges {
            let DeclaredEdge { from, to, kind } = edge;
            if !tables.contains_key(&from) {
                return Err(SchemaError::UnknownTable { table: from }.into());
            }
            if !tables.contains_key(&to) {
                return Err(SchemaError::UnknownRelated {
                    table: from,
                    related: to,
                }
                .into());
            }
            if let DeclaredKind::ManyToMany { through: Some(through) } = &kind {
                if !tables.contains_key(through) {
                    return Err(SchemaError::UnknownRelated {
                        table: from,
                        related: through.clone(),
                    }
                    .into());
                }
            }

            let (forward, reverse) = match kind {
                DeclaredKind::ManyToOne => (
                    RelationKind::ManyToOne,
                    RelationKind::OneToMany {
                        owned_by_related: true,
                    },
                ),
                DeclaredKind::OneToOne => (
                    RelationKind::OneToOne {
                        owned_by_related: false,
                    },
                    RelationKind::OneToOne {
                        owned_by_related: true,
                    },
                ),
                DeclaredKind::ManyToMany { through } => (
                    RelationKind::ManyToMany {
                        through: through.clone(),
                    },
                    RelationKind::ManyToMany { through },
                ),
            };

            // Both endpoints were checked above.
            if let Some(edges) = tables.get_mut(&from) {
                edges.push(RelationshipEdge::new(to.clone(), forward));
            }
            if let Some(edges) = tables.get_mut(&to) {
                edges.push(RelationshipEdge::new(from, reverse));
            }
        }

        Ok(SchemaCatalog { tables })
    }
}

// ============================================================================
// TESTS
// ============================================================================


#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    fn distinct_pair() -> impl Strategy<Value = (String, String)> {
        ("[a-z]{1,8}", "[a-z]{1,8}").prop_filter("tables must differ", |(a, b)| a != b)
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(128))]

        /// Every declared many-to-one has exactly one related-owned reverse
        /// edge on the target table.
        #[test]
        fn prop_many_to_one_reverse_synthesis((from, to) in distinct_pair()) {
            let catalog = SchemaCatalog::builder()
                .table(from.as_str())
                .table(to.as_str())
                .many_to_one(from.as_str(), to.as_str())
                .build()
                .expect("build should succeed");

            let reverse = catalog
                .relationships_of(&TableId::new(to.as_str()))
                .expect("target declared");
            prop_assert_eq!(reverse.len(), 1);
            prop_assert_eq!(&reverse[0].related, &TableId::new(from.as_str()));
            prop_assert_eq!(
                &reverse[0].kind,
                &RelationKind::OneToMany { owned_by_related: true }
            );
        }

        /// Many-to-many synthesis is mirror-consistent: each side sees the
        /// other with an identical kind.
        #[test]
        fn prop_many_to_many_mirror_consistent((a, b) in distinct_pair()) {
            let catalog = SchemaCatalog::builder()
                .table(a.as_str())
                .table(b.as_str())
                .many_to_many(a.as_str(), b.as_str())
                .build()
                .expect("build should succeed");

            let forward = catalog
                .relationships_of(&TableId::new(a.as_str()))
                .expect("declared");
            let mirror = catalog
                .relationships_of(&TableId::new(b.as_str()))
                .expect("declared");

            prop_assert_eq!(forward.len(), 1);
            prop_assert_eq!(mirror.len(), 1);
            prop_assert_eq!(&forward[0].kind, &mirror[0].kind);
            prop_assert_eq!(&forward[0].related, &TableId::new(b.as_str()));
            prop_assert_eq!(&mirror[0].related, &TableId::new(a.as_str()));
        }
    }
}
