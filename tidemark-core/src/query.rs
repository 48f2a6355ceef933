//! Query shapes and their canonical fingerprints.
//!
//! A [`QuerySpec`] describes the structure of a read query: the table it
//! targets, an optional filter predicate tree, ordering, pagination, and any
//! joined tables. Its [`fingerprint`](QuerySpec::fingerprint) is a canonical
//! string rendering of that structure - two specs with equal fingerprints
//! select, absent concurrent writes, identical result sets.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::fmt::Write as _;

use crate::table::TableId;

// ============================================================================
// PREDICATES
// ============================================================================

/// Comparison operator for field predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompareOp {
    /// Equal to
    Eq,
    /// Not equal to
    Ne,
    /// Greater than
    Gt,
    /// Less than
    Lt,
    /// Greater than or equal
    Gte,
    /// Less than or equal
    Lte,
    /// Contains substring (for strings)
    Contains,
}

impl CompareOp {
    /// Stable lowercase name, used in fingerprints.
    pub fn as_str(&self) -> &'static str {
        match self {
            CompareOp::Eq => "eq",
            CompareOp::Ne => "ne",
            CompareOp::Gt => "gt",
            CompareOp::Lt => "lt",
            CompareOp::Gte => "gte",
            CompareOp::Lte => "lte",
            CompareOp::Contains => "contains",
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Filter predicate tree over record fields.
///
/// Comparison values are JSON for flexibility; object values render with
/// sorted keys, so equal predicates always fingerprint identically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Predicate {
    /// Compare a field against a constant.
    Compare {
        field: String,
        op: CompareOp,
        value: serde_json::Value,
    },
    /// Field value must be one of the listed constants. An empty list can
    /// match nothing and makes the enclosing query provably empty.
    In {
        field: String,
        values: Vec<serde_json::Value>,
    },
    /// All children must match. An empty conjunction matches everything.
    And(Vec<Predicate>),
    /// At least one child must match. An empty disjunction is treated as a
    /// no-op (matches everything), not as a contradiction.
    Or(Vec<Predicate>),
    /// The child must not match.
    Not(Box<Predicate>),
}

impl Predicate {
    /// Create an equality predicate.
    pub fn eq(field: impl Into<String>, value: serde_json::Value) -> Self {
        Self::compare(field, CompareOp::Eq, value)
    }

    /// Create an inequality predicate.
    pub fn ne(field: impl Into<String>, value: serde_json::Value) -> Self {
        Self::compare(field, CompareOp::Ne, value)
    }

    /// Create a greater-than predicate.
    pub fn gt(field: impl Into<String>, value: serde_json::Value) -> Self {
        Self::compare(field, CompareOp::Gt, value)
    }

    /// Create a less-than predicate.
    pub fn lt(field: impl Into<String>, value: serde_json::Value) -> Self {
        Self::compare(field, CompareOp::Lt, value)
    }

    /// Create a substring-containment predicate.
    pub fn contains(field: impl Into<String>, value: serde_json::Value) -> Self {
        Self::compare(field, CompareOp::Contains, value)
    }

    /// Create a membership predicate.
    pub fn one_of(field: impl Into<String>, values: Vec<serde_json::Value>) -> Self {
        Self::In {
            field: field.into(),
            values,
        }
    }

    /// Create a comparison predicate with an explicit operator.
    pub fn compare(field: impl Into<String>, op: CompareOp, value: serde_json::Value) -> Self {
        Self::Compare {
            field: field.into(),
            op,
            value,
        }
    }

    /// Whether this predicate provably matches no rows, without consulting
    /// any data.
    ///
    /// The check is conservative: a membership test over an empty list is a
    /// contradiction, a conjunction containing one is too, and a disjunction
    /// is only empty if every branch is. Negations and plain comparisons are
    /// never assumed empty.
    pub fn is_provably_empty(&self) -> bool {
        match self {
            Predicate::In { values, .. } => values.is_empty(),
            Predicate::And(children) => children.iter().any(Predicate::is_provably_empty),
            Predicate::Or(children) => {
                !children.is_empty() && children.iter().all(Predicate::is_provably_empty)
            }
            Predicate::Not(_) | Predicate::Compare { .. } => false,
        }
    }

    fn render(&self, out: &mut String) {
        match self {
            Predicate::Compare { field, op, value } => {
                out.push_str("cmp(");
                out.push_str(field);
                out.push(',');
                out.push_str(op.as_str());
                out.push(',');
                out.push_str(&value.to_string());
                out.push(')');
            }
            Predicate::In { field, values } => {
                out.push_str("in(");
                out.push_str(field);
                out.push_str(",[");
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    out.push_str(&value.to_string());
                }
                out.push_str("])");
            }
            Predicate::And(children) => Self::render_group("and", children, out),
            Predicate::Or(children) => Self::render_group("or", children, out),
            Predicate::Not(inner) => {
                out.push_str("not(");
                inner.render(out);
                out.push(')');
            }
        }
    }

    fn render_group(name: &str, children: &[Predicate], out: &mut String) {
        out.push_str(name);
        out.push('(');
        for (i, child) in children.iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            child.render(out);
        }
        out.push(')');
    }
}

// ============================================================================
// ORDERING AND PAGINATION
// ============================================================================

/// Sort direction for an ordering key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Ascending,
    Descending,
}

impl SortDirection {
    fn as_str(&self) -> &'static str {
        match self {
            SortDirection::Ascending => "asc",
            SortDirection::Descending => "desc",
        }
    }
}

/// A single ordering key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SortKey {
    pub field: String,
    pub direction: SortDirection,
}

/// Row range for pagination, expressed as offset plus limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PageRange {
    pub offset: u64,
    pub limit: u64,
}

// ============================================================================
// QUERY SPEC
// ============================================================================

/// Canonical rendering of a query's structure.
///
/// Equal fingerprints mean structurally identical queries. The rendering is
/// stable across processes and releases; it feeds cache key assembly and is
/// never parsed back.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueryFingerprint(String);

impl QueryFingerprint {
    /// The fingerprint as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for QueryFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The structure of a read query.
///
/// A spec describes WHAT a query selects, not how the data source executes
/// it. Joined tables are tracked only as dependencies: they widen the set of
/// version tokens folded into the cache key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuerySpec {
    /// The table this query targets.
    pub table: TableId,
    /// Row filter; `None` selects every row.
    pub filter: Option<Predicate>,
    /// Ordering keys, applied in sequence.
    pub order_by: Vec<SortKey>,
    /// Pagination window; `None` means unbounded.
    pub range: Option<PageRange>,
    /// Other tables this query reads (joins, prefetches). Declaration order
    /// and duplicates are irrelevant.
    pub joins: Vec<TableId>,
    /// Marks a query that selects nothing by construction.
    pub forced_empty: bool,
}

impl QuerySpec {
    /// A query selecting every row of `table`.
    pub fn all(table: impl Into<TableId>) -> Self {
        Self {
            table: table.into(),
            filter: None,
            order_by: Vec::new(),
            range: None,
            joins: Vec::new(),
            forced_empty: false,
        }
    }

    /// A query over `table` that selects nothing, by construction.
    pub fn none(table: impl Into<TableId>) -> Self {
        Self {
            forced_empty: true,
            ..Self::all(table)
        }
    }

    /// Set the row filter.
    pub fn with_filter(mut self, filter: Predicate) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Append an ordering key.
    pub fn with_order(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        self.order_by.push(SortKey {
            field: field.into(),
            direction,
        });
        self
    }

    /// Set the pagination window.
    pub fn with_range(mut self, offset: u64, limit: u64) -> Self {
        self.range = Some(PageRange { offset, limit });
        self
    }

    /// Declare another table this query reads.
    pub fn with_join(mut self, table: impl Into<TableId>) -> Self {
        self.joins.push(table.into());
        self
    }

    /// Whether this query provably selects no rows.
    pub fn is_provably_empty(&self) -> bool {
        self.forced_empty
            || self
                .filter
                .as_ref()
                .map(Predicate::is_provably_empty)
                .unwrap_or(false)
    }

    /// Every table this query reads: its own plus joined tables,
    /// deduplicated, in identifier order.
    pub fn tables_read(&self) -> BTreeSet<TableId> {
        let mut tables: BTreeSet<TableId> = self.joins.iter().cloned().collect();
        tables.insert(self.table.clone());
        tables
    }

    /// Render the canonical fingerprint of this query's structure.
    ///
    /// Sections appear in a fixed order and empty sections are omitted.
    /// Joined tables render sorted and deduplicated, so declaration order
    /// never changes the fingerprint.
    pub fn fingerprint(&self) -> QueryFingerprint {
        let mut out = String::with_capacity(64);
        out.push_str("t=");
        out.push_str(self.table.as_str());

        if self.forced_empty {
            out.push_str(";none");
        }

        if let Some(filter) = &self.filter {
            out.push_str(";f=");
            filter.render(&mut out);
        }

        if !self.order_by.is_empty() {
            out.push_str(";o=");
            for (i, key) in self.order_by.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&key.field);
                out.push(':');
                out.push_str(key.direction.as_str());
            }
        }

        if let Some(range) = &self.range {
            let _ = write!(out, ";r={}+{}", range.offset, range.limit);
        }

        let mut joined: BTreeSet<&TableId> = self.joins.iter().collect();
        joined.remove(&self.table);
        if !joined.is_empty() {
            out.push_str(";j=");
            for (i, table) in joined.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(table.as_str());
            }
        }

        QueryFingerprint(out)
    }
}

// ============================================================================
// UPDATE PATCH
// ============================================================================

/// Field assignments applied by a bulk update, with an optional row filter.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct UpdatePatch {
    /// Rows to touch; `None` means every row in the table.
    pub filter: Option<Predicate>,
    /// Field assignments, applied in order.
    pub assignments: Vec<(String, serde_json::Value)>,
}

impl UpdatePatch {
    /// Create an empty patch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Restrict the patch to rows matching `filter`.
    pub fn with_filter(mut self, filter: Predicate) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Append a field assignment.
    pub fn assign(mut self, field: impl Into<String>, value: serde_json::Value) -> Self {
        self.assignments.push((field.into(), value));
        self
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_fingerprint_is_deterministic() {
        let spec = QuerySpec::all("orders")
            .with_filter(Predicate::eq("status", json!("open")))
            .with_order("total", SortDirection::Descending)
            .with_range(0, 50)
            .with_join("customers");

        assert_eq!(spec.fingerprint(), spec.clone().fingerprint());
        assert_eq!(
            spec.fingerprint().as_str(),
            "t=orders;f=cmp(status,eq,\"open\");o=total:desc;r=0+50;j=customers"
        );
    }

    #[test]
    fn test_fingerprint_sensitive_to_filter_value() {
        let open = QuerySpec::all("orders").with_filter(Predicate::eq("status", json!("open")));
        let held = QuerySpec::all("orders").with_filter(Predicate::eq("status", json!("held")));
        assert_ne!(open.fingerprint(), held.fingerprint());
    }

    #[test]
    fn test_fingerprint_ignores_join_declaration_order() {
        let ab = QuerySpec::all("orders").with_join("customers").with_join("regions");
        let ba = QuerySpec::all("orders").with_join("regions").with_join("customers");
        let dup = QuerySpec::all("orders")
            .with_join("regions")
            .with_join("customers")
            .with_join("regions");

        assert_eq!(ab.fingerprint(), ba.fingerprint());
        assert_eq!(ab.fingerprint(), dup.fingerprint());
    }

    #[test]
    fn test_fingerprint_distinguishes_none_from_all() {
        assert_ne!(
            QuerySpec::all("orders").fingerprint(),
            QuerySpec::none("orders").fingerprint()
        );
    }

    #[test]
    fn test_nested_predicate_renders_canonically() {
        let filter = Predicate::And(vec![
            Predicate::one_of("status", vec![json!("open"), json!("held")]),
            Predicate::Not(Box::new(Predicate::gt("total", json!(100)))),
        ]);
        let spec = QuerySpec::all("orders").with_filter(filter);

        assert_eq!(
            spec.fingerprint().as_str(),
            "t=orders;f=and(in(status,[\"open\",\"held\"]),not(cmp(total,gt,100)))"
        );
    }

    #[test]
    fn test_provably_empty_none_query() {
        assert!(QuerySpec::none("orders").is_provably_empty());
        assert!(!QuerySpec::all("orders").is_provably_empty());
    }

    #[test]
    fn test_provably_empty_membership_over_empty_list() {
        let spec = QuerySpec::all("orders").with_filter(Predicate::one_of("id", vec![]));
        assert!(spec.is_provably_empty());
    }

    #[test]
    fn test_provably_empty_propagates_through_conjunction() {
        let filter = Predicate::And(vec![
            Predicate::eq("status", json!("open")),
            Predicate::one_of("id", vec![]),
        ]);
        assert!(filter.is_provably_empty());
    }

    #[test]
    fn test_disjunction_empty_only_when_all_branches_empty() {
        let all_empty = Predicate::Or(vec![
            Predicate::one_of("id", vec![]),
            Predicate::one_of("status", vec![]),
        ]);
        assert!(all_empty.is_provably_empty());

        let one_live = Predicate::Or(vec![
            Predicate::one_of("id", vec![]),
            Predicate::eq("status", json!("open")),
        ]);
        assert!(!one_live.is_provably_empty());

        // An empty disjunction is a no-op, not a contradiction.
        assert!(!Predicate::Or(vec![]).is_provably_empty());
    }

    #[test]
    fn test_negation_is_never_assumed_empty() {
        let filter = Predicate::Not(Box::new(Predicate::one_of("id", vec![])));
        assert!(!filter.is_provably_empty());
    }

    #[test]
    fn test_tables_read_includes_own_and_joins() {
        let spec = QuerySpec::all("orders")
            .with_join("customers")
            .with_join("customers")
            .with_join("orders");

        let tables_read = spec.tables_read();
        let tables: Vec<&str> = tables_read.iter().map(TableId::as_str).collect();
        assert_eq!(tables, vec!["customers", "orders"]);
    }

    #[test]
    fn test_update_patch_builder() {
        let patch = UpdatePatch::new()
            .with_filter(Predicate::eq("status", json!("open")))
            .assign("status", json!("closed"))
            .assign("closed_by", json!("system"));

        assert!(patch.filter.is_some());
        assert_eq!(patch.assignments.len(), 2);
        assert_eq!(patch.assignments[0].0, "status");
    }
}
