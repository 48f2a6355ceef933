//! Dependency resolution.
//!
//! Maps "table X changed" to the set of tables whose cached queries can no
//! longer be trusted. Resolution is a single pass over the changed table's
//! edge list - no transitive walk. The set is deliberately coarse: every
//! included table gets its version bumped whether or not any cached query
//! actually touched the changed rows.

use std::collections::BTreeSet;
use std::sync::Arc;

use tidemark_core::{ChangeKind, RelationKind, SchemaError, TableId, TidemarkResult};
use tracing::debug;

use crate::catalog::SchemaCatalog;

/// Resolves a table change into the set of tables to invalidate.
#[derive(Debug, Clone)]
pub struct DependencyResolver {
    catalog: Arc<SchemaCatalog>,
}

impl DependencyResolver {
    pub fn new(catalog: Arc<SchemaCatalog>) -> Self {
        Self { catalog }
    }

    /// The catalog this resolver reads from.
    pub fn catalog(&self) -> &SchemaCatalog {
        &self.catalog
    }

    /// The tables affected by a row change on `table`.
    ///
    /// Always includes `table` itself. A related table is included when the
    /// edge toward it is many-to-one, a related-owned reverse edge, or an
    /// implicit many-to-many. Many-to-many edges routed through a declared
    /// intermediate table are skipped: those propagate only via row changes
    /// on the intermediate table itself.
    ///
    /// `kind` does not alter the result; it is carried for the log line.
    pub fn affected_tables(
        &self,
        table: &TableId,
        kind: ChangeKind,
    ) -> TidemarkResult<BTreeSet<TableId>> {
        let edges = self
            .catalog
            .relationships_of(table)
            .ok_or_else(|| SchemaError::UnknownTable {
                table: table.clone(),
            })?;

        let mut affected = BTreeSet::new();
        affected.insert(table.clone());
        for edge in edges {
            let include = match &edge.kind {
                RelationKind::ManyToOne => true,
                RelationKind::OneToMany { owned_by_related } => *owned_by_related,
                RelationKind::OneToOne { owned_by_related } => *owned_by_related,
                RelationKind::ManyToMany { through } => through.is_none(),
            };
            if include {
                affected.insert(edge.related.clone());
            }
        }

        debug!(
            table = %table,
            change = ?kind,
            affected = affected.len(),
            "Resolved affected tables"
        );
        Ok(affected)
    }

    /// The tables affected by a link-table change between `owner` and
    /// `related`.
    ///
    /// Exactly the two endpoints, with no graph walk - the rows themselves
    /// did not change, only their association.
    pub fn link_affected(&self, owner: &TableId, related: &TableId) -> BTreeSet<TableId> {
        let mut affected = BTreeSet::new();
        affected.insert(owner.clone());
        affected.insert(related.clone());
        affected
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tidemark_core::TidemarkError;

    fn shop_resolver() -> DependencyResolver {
        let catalog = SchemaCatalog::builder()
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
            .expect("catalog should build");
        DependencyResolver::new(Arc::new(catalog))
    }

    fn names(set: &BTreeSet<TableId>) -> Vec<&str> {
        set.iter().map(TableId::as_str).collect()
    }

    #[test]
    fn test_unknown_table_is_an_error() {
        let resolver = shop_resolver();
        let result = resolver.affected_tables(&TableId::new("ghosts"), ChangeKind::Insert);
        assert!(matches!(
            result,
            Err(TidemarkError::Schema(SchemaError::UnknownTable { table })) if table.as_str() == "ghosts"
        ));
    }

    #[test]
    fn test_standalone_table_affects_only_itself() {
        let resolver = shop_resolver();
        let affected = resolver
            .affected_tables(&TableId::new("audit_log"), ChangeKind::Update)
            .expect("resolution should succeed");
        assert_eq!(names(&affected), vec!["audit_log"]);
    }

    #[test]
    fn test_many_to_one_propagates_both_directions() {
        let resolver = shop_resolver();

        let from_child = resolver
            .affected_tables(&TableId::new("orders"), ChangeKind::Insert)
            .expect("resolution should succeed");
        assert_eq!(names(&from_child), vec!["customers", "orders"]);

        let from_parent = resolver
            .affected_tables(&TableId::new("customers"), ChangeKind::Delete)
            .expect("resolution should succeed");
        assert_eq!(names(&from_parent), vec!["customers", "orders"]);
    }

    #[test]
    fn test_one_to_one_declared_side_stays_local() {
        let resolver = shop_resolver();

        // profiles holds the link column: changing a profile does not
        // disturb cached user queries.
        let declared = resolver
            .affected_tables(&TableId::new("profiles"), ChangeKind::Update)
            .expect("resolution should succeed");
        assert_eq!(names(&declared), vec!["profiles"]);

        // The related-owned side does propagate back.
        let reverse = resolver
            .affected_tables(&TableId::new("users"), ChangeKind::Update)
            .expect("resolution should succeed");
        assert_eq!(names(&reverse), vec!["profiles", "users"]);
    }

    #[test]
    fn test_implicit_many_to_many_propagates_both_directions() {
        let resolver = shop_resolver();

        let from_posts = resolver
            .affected_tables(&TableId::new("posts"), ChangeKind::Insert)
            .expect("resolution should succeed");
        assert_eq!(names(&from_posts), vec!["posts", "tags"]);

        let from_tags = resolver
            .affected_tables(&TableId::new("tags"), ChangeKind::Insert)
            .expect("resolution should succeed");
        assert_eq!(names(&from_tags), vec!["posts", "tags"]);
    }

    #[test]
    fn test_explicit_through_edge_is_not_walked() {
        let resolver = shop_resolver();

        let from_students = resolver
            .affected_tables(&TableId::new("students"), ChangeKind::Update)
            .expect("resolution should succeed");
        assert_eq!(names(&from_students), vec!["enrollments", "students"]);

        let from_courses = resolver
            .affected_tables(&TableId::new("courses"), ChangeKind::Update)
            .expect("resolution should succeed");
        assert_eq!(names(&from_courses), vec!["courses", "enrollments"]);
    }

    #[test]
    fn test_intermediate_table_reaches_both_sides() {
        let resolver = shop_resolver();
        let affected = resolver
            .affected_tables(&TableId::new("enrollments"), ChangeKind::Insert)
            .expect("resolution should succeed");
        assert_eq!(names(&affected), vec!["courses", "enrollments", "students"]);
    }

    #[test]
    fn test_change_kind_does_not_alter_result() {
        let resolver = shop_resolver();
        let table = TableId::new("orders");
        let kinds = [
            ChangeKind::Insert,
            ChangeKind::Update,
            ChangeKind::Delete,
            ChangeKind::BulkCreate,
            ChangeKind::BulkUpdate,
        ];
        let baseline = resolver
            .affected_tables(&table, ChangeKind::Insert)
            .expect("resolution should succeed");
        for kind in kinds {
            let affected = resolver
                .affected_tables(&table, kind)
                .expect("resolution should succeed");
            assert_eq!(affected, baseline);
        }
    }

    #[test]
    fn test_link_affected_is_the_two_endpoints() {
        let resolver = shop_resolver();
        let affected = resolver.link_affected(&TableId::new("posts"), &TableId::new("tags"));
        assert_eq!(names(&affected), vec!["posts", "tags"]);
    }

    #[test]
    fn test_link_affected_self_link() {
        let resolver = shop_resolver();
        let posts = TableId::new("posts");
        let affected = resolver.link_affected(&posts, &posts);
        assert_eq!(names(&affected), vec!["posts"]);
    }
}

#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    fn table_names() -> impl Strategy<Value = Vec<String>> {
        prop::collection::hash_set("[a-z]{1,8}", 2..6)
            .prop_map(|set| set.into_iter().collect::<Vec<_>>())
    }

    /// A catalog over `names` with a many-to-one chain: each table points at
    /// the next one declared.
    fn chain_catalog(names: &[String]) -> SchemaCatalog {
        let mut builder = SchemaCatalog::builder();
        for name in names {
            builder = builder.table(name.as_str());
        }
        for pair in names.windows(2) {
            builder = builder.many_to_one(pair[0].as_str(), pair[1].as_str());
        }
        builder.build().expect("catalog should build")
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        /// The changed table is always in its own affected set.
        #[test]
        fn prop_affected_contains_self(names in table_names()) {
            let resolver = DependencyResolver::new(Arc::new(chain_catalog(&names)));
            for name in &names {
                let table = TableId::new(name.as_str());
                let affected = resolver
                    .affected_tables(&table, ChangeKind::Update)
                    .expect("resolution should succeed");
                prop_assert!(affected.contains(&table));
            }
        }

        /// Resolution never reaches outside the declared catalog, and a
        /// single-pass resolution over a chain never includes more than the
        /// immediate neighbors.
        #[test]
        fn prop_affected_stays_within_neighbors(names in table_names()) {
            let resolver = DependencyResolver::new(Arc::new(chain_catalog(&names)));
            for (i, name) in names.iter().enumerate() {
                let table = TableId::new(name.as_str());
                let affected = resolver
                    .affected_tables(&table, ChangeKind::Update)
                    .expect("resolution should succeed");
                for other in &affected {
                    let j = names
                        .iter()
                        .position(|n| n == other.as_str())
                        .expect("affected table is declared");
                    prop_assert!(j.abs_diff(i) <= 1);
                }
            }
        }
    }
}
