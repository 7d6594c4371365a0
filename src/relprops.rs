//! Relational properties: per-group output schema, table bitmaps,
//! functional dependencies, cardinality and limit (spec.md §4.2).
//!
//! Properties are computed once, at the point a group's first member is
//! created, from the already-known properties of its children — rather
//! than lazily re-derived on every access, matching the invariant that
//! `RelProps` is identical across a group's members.

use crate::common::Schema;
use crate::scalar::ScalarRef;
use crate::vertex_set::VertexSet;

/// A bitmap over column ordinals within one group's output schema.
/// Shares `VertexSet`'s representation; the index space is local to a
/// single `RelationalProperties`, not the global table index space.
pub type ColumnSet = VertexSet;

/// Union-find over column ordinals, used to track `col = col` equivalence
/// classes implied by equi-predicates (spec.md §4.2).
#[derive(Debug, Clone, Default)]
pub struct EquivClasses {
    parent: Vec<u32>,
}

impl EquivClasses {
    pub fn new(num_cols: usize) -> Self {
        Self {
            parent: (0..num_cols as u32).collect(),
        }
    }

    fn find(&mut self, mut x: u32) -> u32 {
        while self.parent[x as usize] != x {
            self.parent[x as usize] = self.parent[self.parent[x as usize] as usize];
            x = self.parent[x as usize];
        }
        x
    }

    pub fn union(&mut self, a: u32, b: u32) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            self.parent[ra as usize] = rb;
        }
    }

    pub fn same_class(&mut self, a: u32, b: u32) -> bool {
        self.find(a) == self.find(b)
    }

    /// Merge in another set's classes, remapping `other`'s ordinals
    /// through `remap` (child ordinal -> this set's ordinal).
    pub fn merge_from(&mut self, other: &EquivClasses, remap: &[u32]) {
        let mut other = other.clone();
        for i in 0..other.parent.len() {
            let root = other.find(i as u32);
            if i as u32 != root {
                let (a, b) = (remap[i], remap[root as usize]);
                self.union(a, b);
            }
        }
    }
}

/// Functional dependency set composed bottom-up per operator, per
/// spec.md §4.2's rule table.
#[derive(Debug, Clone, Default)]
pub struct FuncDepSet {
    /// Sets of columns that strictly determine the entire row (no two
    /// rows agree on a strict key without being identical).
    pub strict_keys: Vec<ColumnSet>,
    /// Like `strict_keys`, but may hold across NULL-containing rows
    /// only "loosely" (a unique index with a nullable column).
    pub lax_keys: Vec<ColumnSet>,
    /// Columns known to be constant (`col = literal`) within the group.
    pub constants: ColumnSet,
    /// Columns known to never be NULL.
    pub not_null: ColumnSet,
    pub equivalences: EquivClasses,
}

impl FuncDepSet {
    pub fn base(num_cols: usize, strict_keys: Vec<ColumnSet>, lax_keys: Vec<ColumnSet>, not_null: ColumnSet) -> Self {
        Self {
            strict_keys,
            lax_keys,
            constants: ColumnSet::empty(),
            not_null,
            equivalences: EquivClasses::new(num_cols),
        }
    }

    /// True if the group is provably at most one row (the empty column
    /// set is itself a strict key). Drives `lookupSelectivity`'s
    /// `sel = 0` special case.
    pub fn has_max1_row(&self) -> bool {
        self.strict_keys.iter().any(|k| k.is_empty())
    }

    pub fn max1_row(num_cols: usize) -> Self {
        Self {
            strict_keys: vec![ColumnSet::empty()],
            lax_keys: vec![],
            constants: ColumnSet::full(num_cols as u32),
            not_null: ColumnSet::full(num_cols as u32),
            equivalences: EquivClasses::new(num_cols),
        }
    }

    /// Union of child FDs for an inner/cross join, with equivalencies
    /// induced by equi-predicates (the caller passes the joined column
    /// pairs after remapping into the combined column-ordinal space).
    pub fn union_inner(left: &FuncDepSet, right: &FuncDepSet, left_cols: usize, equi_pairs: &[(u32, u32)]) -> Self {
        let num_cols = left_cols + right_col_count(right);
        let mut merged = Self {
            strict_keys: left
                .strict_keys
                .iter()
                .cloned()
                .chain(right.strict_keys.iter().map(|k| shift(*k, left_cols)))
                .collect(),
            lax_keys: left
                .lax_keys
                .iter()
                .cloned()
                .chain(right.lax_keys.iter().map(|k| shift(*k, left_cols)))
                .collect(),
            constants: left.constants.union(shift(right.constants, left_cols)),
            not_null: left.not_null.union(shift(right.not_null, left_cols)),
            equivalences: EquivClasses::new(num_cols),
        };
        let left_remap: Vec<u32> = (0..num_cols as u32).collect();
        merged.equivalences.merge_from(&left.equivalences, &left_remap);
        let right_remap: Vec<u32> = (0..num_cols as u32).map(|i| i + left_cols as u32).collect();
        merged.equivalences.merge_from(&right.equivalences, &right_remap);
        for &(l, r) in equi_pairs {
            merged.equivalences.union(l, r);
        }
        merged
    }

    /// Left outer join: left FDs preserved as-is; right strict keys
    /// become lax (a right row may be entirely NULL-extended).
    pub fn left_outer(left: &FuncDepSet, right: &FuncDepSet, left_cols: usize, equi_pairs: &[(u32, u32)]) -> Self {
        let num_cols = left_cols + right_col_count(right);
        let mut merged = Self {
            strict_keys: left.strict_keys.clone(),
            lax_keys: left
                .lax_keys
                .iter()
                .cloned()
                .chain(right.strict_keys.iter().map(|k| shift(*k, left_cols)))
                .chain(right.lax_keys.iter().map(|k| shift(*k, left_cols)))
                .collect(),
            constants: left.constants,
            not_null: left.not_null,
            equivalences: EquivClasses::new(num_cols),
        };
        let left_remap: Vec<u32> = (0..num_cols as u32).collect();
        merged.equivalences.merge_from(&left.equivalences, &left_remap);
        for &(l, r) in equi_pairs {
            merged.equivalences.union(l, r);
        }
        merged
    }

    /// Filter: child FDs plus constants/not-null/equivalences implied
    /// by the predicate list (already classified by the caller).
    pub fn with_filter(
        child: &FuncDepSet,
        new_constants: ColumnSet,
        new_not_null: ColumnSet,
        equi_pairs: &[(u32, u32)],
    ) -> Self {
        let mut merged = child.clone();
        merged.constants = merged.constants.union(new_constants);
        merged.not_null = merged.not_null.union(new_not_null);
        for &(l, r) in equi_pairs {
            merged.equivalences.union(l, r);
        }
        merged
    }

    /// Project: restrict keys to the projected column set, dropping any
    /// key that isn't fully covered.
    pub fn project(child: &FuncDepSet, projected: ColumnSet) -> Self {
        Self {
            strict_keys: child
                .strict_keys
                .iter()
                .filter(|k| k.is_subset_of(projected))
                .cloned()
                .collect(),
            lax_keys: child
                .lax_keys
                .iter()
                .filter(|k| k.is_subset_of(projected))
                .cloned()
                .collect(),
            constants: child.constants.intersect(projected),
            not_null: child.not_null.intersect(projected),
            equivalences: child.equivalences.clone(),
        }
    }

    /// Distinct: every output column, together, becomes a strict key.
    pub fn distinct(child: &FuncDepSet, all_cols: ColumnSet) -> Self {
        let mut fd = child.clone();
        fd.strict_keys.push(all_cols);
        fd
    }
}

fn right_col_count(fd: &FuncDepSet) -> usize {
    fd.strict_keys
        .iter()
        .chain(fd.lax_keys.iter())
        .map(|k| 64 - k.bits().leading_zeros() as usize)
        .max()
        .unwrap_or(0)
}

fn shift(set: ColumnSet, by: usize) -> ColumnSet {
    ColumnSet::from_bits(set.bits() << by)
}

/// Per-group relational properties (spec.md §4.2).
#[derive(Debug, Clone)]
pub struct RelationalProperties {
    /// Source tables whose columns are visible in the group's output.
    /// Differs from `input_tables` only across semi/anti joins.
    pub output_tables: VertexSet,
    /// All tables participating, including a semi/anti join's
    /// not-output-visible right side. Used to honor join-order hints.
    pub input_tables: VertexSet,
    pub fd: FuncDepSet,
    pub schema: Schema,
    pub card: f64,
    pub limit: Option<ScalarRef>,
}

impl RelationalProperties {
    pub fn for_source(schema: Schema, table: crate::common::TableId, fd: FuncDepSet, card: f64) -> Self {
        let tables = VertexSet::singleton(table);
        Self {
            output_tables: tables,
            input_tables: tables,
            fd,
            schema,
            card,
            limit: None,
        }
    }

    pub fn for_inner_join(left: &RelationalProperties, right: &RelationalProperties, fd: FuncDepSet, schema: Schema, card: f64) -> Self {
        let tables = left.output_tables.union(right.output_tables);
        Self {
            output_tables: tables,
            input_tables: left.input_tables.union(right.input_tables),
            fd,
            schema,
            card,
            limit: None,
        }
    }

    /// Semi/anti joins: only the left side's tables are output-visible.
    pub fn for_partial_join(left: &RelationalProperties, right: &RelationalProperties, fd: FuncDepSet, card: f64) -> Self {
        Self {
            output_tables: left.output_tables,
            input_tables: left.input_tables.union(right.input_tables),
            fd,
            schema: left.schema.clone(),
            card,
            limit: None,
        }
    }

    pub fn for_unary(child: &RelationalProperties, fd: FuncDepSet, schema: Schema, card: f64) -> Self {
        Self {
            output_tables: child.output_tables,
            input_tables: child.input_tables,
            fd,
            schema,
            card,
            limit: child.limit.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{ColumnDef, DataType};

    fn schema(n: usize) -> Schema {
        Schema::new(
            "t".into(),
            (0..n).map(|i| ColumnDef::new(format!("c{i}"), DataType::Integer)).collect(),
        )
    }

    #[test]
    fn max1_row_is_detected() {
        let fd = FuncDepSet::max1_row(2);
        assert!(fd.has_max1_row());
    }

    #[test]
    fn project_drops_uncovered_keys() {
        let mut fd = FuncDepSet::base(3, vec![ColumnSet::singleton(0).add(1)], vec![], ColumnSet::empty());
        fd.constants = ColumnSet::singleton(2);
        let projected = ColumnSet::singleton(0);
        let restricted = FuncDepSet::project(&fd, projected);
        assert!(restricted.strict_keys.is_empty());
        assert!(restricted.constants.is_empty());
    }

    #[test]
    fn distinct_adds_all_columns_as_strict_key() {
        let fd = FuncDepSet::base(2, vec![], vec![], ColumnSet::empty());
        let all = ColumnSet::full(2);
        let distinct = FuncDepSet::distinct(&fd, all);
        assert!(distinct.strict_keys.contains(&all));
    }

    #[test]
    fn source_props_have_equal_input_and_output_tables() {
        let fd = FuncDepSet::base(1, vec![], vec![], ColumnSet::empty());
        let props = RelationalProperties::for_source(schema(1), 3, fd, 100.0);
        assert_eq!(props.output_tables, props.input_tables);
        assert!(props.output_tables.contains(3));
    }
}
