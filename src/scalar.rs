//! Read-only introspection of the opaque filter-expression tree.
//!
//! The SQL parser, resolver, and full expression tree are external
//! collaborators (spec.md §1); the optimizer core only ever compares
//! scalar sub-trees by structure and inspects them for the handful of
//! tags it reasons about (`Equal`, `ColumnRef`, `Literal`, `IsNull`,
//! `And`/`Or`/`Not`). Everything else is opaque.

use crate::common::{ColumnId, TableId, Value};
use crate::vertex_set::VertexSet;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A read-only view into the shape of a scalar expression node. Only
/// the tags the optimizer core reasons about are broken out; anything
/// else a host's real expression type supports is opaque (`Other`).
pub enum ScalarTag<'a> {
    Equal(&'a dyn ScalarExpression, &'a dyn ScalarExpression),
    ColumnRef(ColumnId, TableId),
    Literal(&'a Value),
    And(&'a dyn ScalarExpression, &'a dyn ScalarExpression),
    Or(&'a dyn ScalarExpression, &'a dyn ScalarExpression),
    Not(&'a dyn ScalarExpression),
    IsNull(&'a dyn ScalarExpression),
    Other,
}

/// A node in the opaque scalar expression tree handed in by the host.
///
/// Implementors own their own child storage; the core never builds or
/// mutates these, only inspects them via `tag()`.
pub trait ScalarExpression: fmt::Debug + Send + Sync + std::any::Any {
    /// Inspect this node's shape.
    fn tag(&self) -> ScalarTag<'_>;

    /// Tables this (sub-)expression references, directly or through
    /// children. Used to compute a join edge's syntactic eligibility
    /// set (spec.md §4.4 Phase A.2).
    fn referenced_tables(&self) -> VertexSet;

    /// Structural equality with another node (spec.md §6: scalar nodes
    /// support `equals(other) -> bool`).
    fn equals(&self, other: &dyn ScalarExpression) -> bool;

    /// A structural hash consistent with `equals`: it must include the
    /// operator tag and the (recursively interned) children, per
    /// spec.md §9's interning design note.
    fn structural_hash(&self) -> u64;

    /// Narrows back to a concrete type. Implementors that just want the
    /// default `Any` behavior can rely on the blanket impl below rather
    /// than writing this by hand.
    fn as_any(&self) -> &dyn std::any::Any;

    /// For an `Equal` node, the two operand sub-trees as shared
    /// references — used to build physical join key tuples (spec.md
    /// §4.4 Phase D's `HashJoin`/`MergeJoin`/`RangeHeapJoin` construction
    /// needs owned handles to the key expressions, not just the borrowed
    /// view `tag()` gives). Hosts whose tree can't cheaply hand out
    /// shared ownership of children may leave this `None`; the physical
    /// expansion then simply skips the key-bearing variants for that
    /// edge.
    fn equality_operands(&self) -> Option<(ScalarRef, ScalarRef)> {
        None
    }

    /// For a conjunction of the shape `min ≤ v ≤ max` (each bound
    /// optionally strict), the value/min/max operand sub-trees and
    /// which bounds are closed — used to build `RangeHeapJoin`
    /// candidates (spec.md §4.4 Phase D). The opaque tag set (spec.md
    /// §6) has no dedicated comparison-operator tag, only `Equal` and
    /// the boolean connectives, so recognizing a range predicate is
    /// delegated to the host rather than derived structurally; hosts
    /// that don't support it simply never offer `RangeHeapJoin`
    /// candidates.
    fn as_range_predicate(&self) -> Option<RangeShape> {
        None
    }

    /// The static type of this expression, if the host's tree can
    /// report one cheaply — used by the exec builder to check a
    /// `MergeJoin` range bound against its index's declared column
    /// type (spec.md §4.8, `IndexTypeMismatch`). Hosts that don't
    /// track per-node types leave this `None`; the check then has
    /// nothing to compare against and passes.
    fn value_type(&self) -> Option<crate::common::DataType> {
        None
    }
}

/// The decomposed operands of a `min ≤ v ≤ max`-shaped predicate, as
/// returned by [`ScalarExpression::as_range_predicate`].
#[derive(Debug, Clone)]
pub struct RangeShape {
    pub value: ScalarRef,
    pub min: ScalarRef,
    pub max: ScalarRef,
    pub min_closed: bool,
    pub max_closed: bool,
}

impl dyn ScalarExpression {
    pub fn downcast_ref<T: ScalarExpression>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }
}

pub type ScalarRef = Arc<dyn ScalarExpression>;

/// True if `expr` is an equality predicate between two column
/// references (the shape the join-order builder and physical
/// expansion both key off of).
pub fn as_column_equality(expr: &dyn ScalarExpression) -> Option<((ColumnId, TableId), (ColumnId, TableId))> {
    if let ScalarTag::Equal(l, r) = expr.tag() {
        if let (ScalarTag::ColumnRef(lc, lt), ScalarTag::ColumnRef(rc, rt)) = (l.tag(), r.tag()) {
            return Some(((lc, lt), (rc, rt)));
        }
    }
    None
}

/// True if `expr` is a bare column reference.
pub fn as_column_ref(expr: &dyn ScalarExpression) -> Option<(ColumnId, TableId)> {
    match expr.tag() {
        ScalarTag::ColumnRef(c, t) => Some((c, t)),
        _ => None,
    }
}

/// Splits every top-level equi-predicate in `filters` into `(left_key,
/// right_key)` operand pairs, via [`ScalarExpression::equality_operands`].
/// Predicates the host can't decompose (or that aren't equalities) are
/// skipped.
pub fn extract_equi_keys(filters: &[ScalarRef]) -> Vec<(ScalarRef, ScalarRef)> {
    filters
        .iter()
        .filter_map(|f| f.equality_operands())
        .collect()
}

/// True if `expr` is `col = literal` (in either operand order), returning
/// the column ordinal (spec.md §4.2's Filter rule (a): constant columns).
pub fn as_column_literal_equality(expr: &dyn ScalarExpression) -> Option<ColumnId> {
    if let ScalarTag::Equal(l, r) = expr.tag() {
        match (l.tag(), r.tag()) {
            (ScalarTag::ColumnRef(c, _), ScalarTag::Literal(_)) => Some(c),
            (ScalarTag::Literal(_), ScalarTag::ColumnRef(c, _)) => Some(c),
            _ => None,
        }
    } else {
        None
    }
}

/// True if `expr` is `NOT IS NULL(col)`, returning the column ordinal
/// (spec.md §4.2's Filter rule (b): not-null columns).
pub fn as_not_is_null(expr: &dyn ScalarExpression) -> Option<ColumnId> {
    if let ScalarTag::Not(inner) = expr.tag() {
        if let ScalarTag::IsNull(col) = inner.tag() {
            if let ScalarTag::ColumnRef(c, _) = col.tag() {
                return Some(c);
            }
        }
    }
    None
}

/// Split a conjunction into its top-level conjuncts (`a AND b AND c` ->
/// `[a, b, c]`); a non-`And` node is returned as a single conjunct.
pub fn flatten_conjuncts(expr: &dyn ScalarExpression, out: &mut Vec<VertexSet>) {
    match expr.tag() {
        ScalarTag::And(l, r) => {
            flatten_conjuncts(l, out);
            flatten_conjuncts(r, out);
        }
        _ => out.push(expr.referenced_tables()),
    }
}

/// Whether `predicate` rejects NULLs on `table` — i.e. it evaluates to
/// false/unknown whenever any column of `table` is NULL. This is a
/// conservative syntactic approximation (spec.md §4.2 "nullRejecting"):
/// an `IsNull`/`Not`/`Or` wrapping a reference to `table` is treated as
/// *not* rejecting, a bare comparison or `And` of rejecting operands is.
pub fn rejects_nulls(predicate: &dyn ScalarExpression, table: TableId) -> bool {
    match predicate.tag() {
        ScalarTag::IsNull(_) => false,
        ScalarTag::Or(l, r) => rejects_nulls(l, table) && rejects_nulls(r, table),
        ScalarTag::And(l, r) => rejects_nulls(l, table) || rejects_nulls(r, table),
        ScalarTag::Not(_) => false,
        ScalarTag::Equal(l, r) => {
            let refs = l.referenced_tables().union(r.referenced_tables());
            refs.contains(table)
        }
        _ => predicate.referenced_tables().contains(table),
    }
}

/// Structural interner for scalar sub-trees, keyed by (hash, linear
/// equality scan among collisions) per spec.md §9's design note: "the
/// hash function must include the operator tag and recursively
/// interned child IDs." Scalar nodes are opaque to us, so we intern by
/// `structural_hash()`/`equals()` directly on the host's node rather
/// than rebuilding an owned copy.
#[derive(Debug, Default)]
pub struct ScalarInterner {
    buckets: HashMap<u64, Vec<ScalarRef>>,
}

/// Interned identity for a scalar sub-tree: the `(hash, slot)` pair
/// uniquely identifying it within one interner.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InternedScalarId(u64, u32);

impl ScalarInterner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern(&mut self, expr: ScalarRef) -> InternedScalarId {
        let hash = expr.structural_hash();
        let bucket = self.buckets.entry(hash).or_default();
        for (slot, existing) in bucket.iter().enumerate() {
            if existing.equals(expr.as_ref()) {
                return InternedScalarId(hash, slot as u32);
            }
        }
        let slot = bucket.len() as u32;
        bucket.push(expr);
        InternedScalarId(hash, slot)
    }

    pub fn len(&self) -> usize {
        self.buckets.values().map(|b| b.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(any(test, feature = "test-support"))]
pub mod testutil {
    //! A minimal concrete `ScalarExpression` for tests and for hosts
    //! bootstrapping against this crate before wiring their own
    //! expression tree. Mirrors the shape of `parser::expression::Expression`
    //! in the teacher crate, narrowed to the tags the core inspects.
    use super::*;

    #[derive(Debug, Clone)]
    pub enum Scalar {
        Column(ColumnId, TableId),
        Literal(Value),
        Equal(ScalarRef, ScalarRef),
        And(ScalarRef, ScalarRef),
        Or(ScalarRef, ScalarRef),
        Not(ScalarRef),
        IsNull(ScalarRef),
        /// `min ≤ value ≤ max`, exposed to physical expansion via
        /// `as_range_predicate` — not one of the opaque tags (spec.md
        /// §6), since range-heap recognition is host-assisted.
        Range {
            value: ScalarRef,
            min: ScalarRef,
            max: ScalarRef,
            min_closed: bool,
            max_closed: bool,
        },
    }

    impl Scalar {
        pub fn col(column: ColumnId, table: TableId) -> ScalarRef {
            Arc::new(Scalar::Column(column, table))
        }

        pub fn eq(l: ScalarRef, r: ScalarRef) -> ScalarRef {
            Arc::new(Scalar::Equal(l, r))
        }

        pub fn and(l: ScalarRef, r: ScalarRef) -> ScalarRef {
            Arc::new(Scalar::And(l, r))
        }

        pub fn or(l: ScalarRef, r: ScalarRef) -> ScalarRef {
            Arc::new(Scalar::Or(l, r))
        }

        pub fn not(e: ScalarRef) -> ScalarRef {
            Arc::new(Scalar::Not(e))
        }

        pub fn is_null(e: ScalarRef) -> ScalarRef {
            Arc::new(Scalar::IsNull(e))
        }

        pub fn range(value: ScalarRef, min: ScalarRef, max: ScalarRef, min_closed: bool, max_closed: bool) -> ScalarRef {
            Arc::new(Scalar::Range { value, min, max, min_closed, max_closed })
        }
    }

    impl PartialEq for Scalar {
        fn eq(&self, other: &Self) -> bool {
            self.equals(other)
        }
    }

    impl ScalarExpression for Scalar {
        fn tag(&self) -> ScalarTag<'_> {
            match self {
                Scalar::Column(c, t) => ScalarTag::ColumnRef(*c, *t),
                Scalar::Literal(v) => ScalarTag::Literal(v),
                Scalar::Equal(l, r) => ScalarTag::Equal(l.as_ref(), r.as_ref()),
                Scalar::And(l, r) => ScalarTag::And(l.as_ref(), r.as_ref()),
                Scalar::Or(l, r) => ScalarTag::Or(l.as_ref(), r.as_ref()),
                Scalar::Not(e) => ScalarTag::Not(e.as_ref()),
                Scalar::IsNull(e) => ScalarTag::IsNull(e.as_ref()),
                Scalar::Range { .. } => ScalarTag::Other,
            }
        }

        fn referenced_tables(&self) -> VertexSet {
            match self {
                Scalar::Column(_, t) => VertexSet::singleton(*t),
                Scalar::Literal(_) => VertexSet::empty(),
                Scalar::Equal(l, r) | Scalar::And(l, r) | Scalar::Or(l, r) => {
                    l.referenced_tables().union(r.referenced_tables())
                }
                Scalar::Not(e) | Scalar::IsNull(e) => e.referenced_tables(),
                Scalar::Range { value, min, max, .. } => {
                    value.referenced_tables().union(min.referenced_tables()).union(max.referenced_tables())
                }
            }
        }

        fn equals(&self, other: &dyn ScalarExpression) -> bool {
            let Some(other) = other.downcast_ref::<Scalar>() else { return false };
            match (self, other) {
                (Scalar::Column(c1, t1), Scalar::Column(c2, t2)) => c1 == c2 && t1 == t2,
                (Scalar::Literal(a), Scalar::Literal(b)) => a == b,
                (Scalar::Equal(l1, r1), Scalar::Equal(l2, r2))
                | (Scalar::And(l1, r1), Scalar::And(l2, r2))
                | (Scalar::Or(l1, r1), Scalar::Or(l2, r2)) => l1.equals(l2.as_ref()) && r1.equals(r2.as_ref()),
                (Scalar::Not(a), Scalar::Not(b)) | (Scalar::IsNull(a), Scalar::IsNull(b)) => a.equals(b.as_ref()),
                (
                    Scalar::Range { value: v1, min: mn1, max: mx1, min_closed: mc1, max_closed: xc1 },
                    Scalar::Range { value: v2, min: mn2, max: mx2, min_closed: mc2, max_closed: xc2 },
                ) => mc1 == mc2 && xc1 == xc2 && v1.equals(v2.as_ref()) && mn1.equals(mn2.as_ref()) && mx1.equals(mx2.as_ref()),
                _ => false,
            }
        }

        fn structural_hash(&self) -> u64 {
            use std::collections::hash_map::DefaultHasher;
            use std::hash::{Hash, Hasher};
            let mut hasher = DefaultHasher::new();
            std::mem::discriminant(self).hash(&mut hasher);
            match self {
                Scalar::Column(c, t) => {
                    c.hash(&mut hasher);
                    t.hash(&mut hasher);
                }
                Scalar::Literal(v) => v.to_display_string().hash(&mut hasher),
                Scalar::Equal(l, r) | Scalar::And(l, r) | Scalar::Or(l, r) => {
                    l.structural_hash().hash(&mut hasher);
                    r.structural_hash().hash(&mut hasher);
                }
                Scalar::Not(e) | Scalar::IsNull(e) => e.structural_hash().hash(&mut hasher),
                Scalar::Range { value, min, max, min_closed, max_closed } => {
                    value.structural_hash().hash(&mut hasher);
                    min.structural_hash().hash(&mut hasher);
                    max.structural_hash().hash(&mut hasher);
                    min_closed.hash(&mut hasher);
                    max_closed.hash(&mut hasher);
                }
            }
            hasher.finish()
        }

        fn as_any(&self) -> &dyn std::any::Any {
            self
        }

        fn equality_operands(&self) -> Option<(ScalarRef, ScalarRef)> {
            match self {
                Scalar::Equal(l, r) => Some((l.clone(), r.clone())),
                _ => None,
            }
        }

        fn as_range_predicate(&self) -> Option<RangeShape> {
            match self {
                Scalar::Range { value, min, max, min_closed, max_closed } => Some(RangeShape {
                    value: value.clone(),
                    min: min.clone(),
                    max: max.clone(),
                    min_closed: *min_closed,
                    max_closed: *max_closed,
                }),
                _ => None,
            }
        }
    }
}
