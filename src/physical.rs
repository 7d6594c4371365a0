//! Phase D: logical → physical expansion (spec.md §4.4 Phase D).
//!
//! For each `InnerJoin`/`LeftJoin` member already in the memo, prepends
//! whichever physical variants the join's filters and the right side's
//! catalog indexes make legal — hash, lookup, concat-lookup, merge,
//! range-heap. Variants are prepended (spec.md §3's lifecycle note) so
//! cost computation considers them before the logical base; the logical
//! variant is never removed, since a non-join relation's only "physical"
//! representation is itself.
//!
//! Grounded on `optimizer_pro::plan_generator::PlanGenerator`'s
//! per-operator candidate generation (`generate_index_scan_plans`,
//! join-method selection), narrowed to the five join-specific physical
//! shapes spec.md §4.4 names and driven off the hypergraph edges'
//! filters rather than a full expression-tree walk.

use crate::common::{ColumnId, IndexInfo, IndexKind, TableId};
use crate::memo::{
    ConcatJoinExpr, GroupId, HashJoinExpr, IndexScan, JoinBase, Lookup, LookupJoinExpr, LookupKey,
    Memo, MergeJoinExpr, RangeHeap, RangeHeapJoinExpr, RelKind,
};
use crate::relprops::RelationalProperties;
use crate::scalar::{self, ScalarRef};
use std::collections::HashMap;

/// Per-table index catalog handed in by the host (spec.md §6's "Index
/// metadata" collaborator).
pub type IndexCatalog = HashMap<TableId, Vec<IndexInfo>>;

/// One equi-join key, oriented so `.0` is the left-child operand and
/// `.1` is the right-child operand.
struct OrientedKey {
    left: ScalarRef,
    right: ScalarRef,
}

pub fn expand_physical(memo: &mut Memo, indexes: &IndexCatalog) {
    let group_ids: Vec<GroupId> = (0..memo.group_count() as u32).map(GroupId).collect();
    for group_id in group_ids {
        let member_ids = memo.group(group_id).members.clone();
        for expr_id in member_ids {
            let base = match &memo.expr(expr_id).kind {
                RelKind::InnerJoin(b) | RelKind::LeftJoin(b) => b.clone(),
                _ => continue,
            };
            expand_one(memo, group_id, &base, indexes);
        }
    }
}

fn expand_one(memo: &mut Memo, group_id: GroupId, base: &JoinBase, indexes: &IndexCatalog) {
    let left_props = memo.group(base.left).props.clone();
    let right_props = memo.group(base.right).props.clone();

    let oriented = orient_equi_keys(base, &left_props, &right_props);
    if oriented.is_empty() {
        return;
    }

    try_hash_join(memo, group_id, base, &oriented);

    // Lookup/Concat/Merge all require the right side to be a single
    // base relation so its catalog indexes can be consulted.
    if right_props.output_tables.size() != 1 {
        return;
    }
    let right_table = right_props.output_tables.lowest().expect("size() == 1 implies one set vertex");
    let Some(candidates) = indexes.get(&right_table) else { return };

    let right_cols: Vec<ColumnId> = oriented.iter().filter_map(|k| scalar::as_column_ref(k.right.as_ref()).map(|(c, _)| c)).collect();
    if right_cols.len() != oriented.len() {
        return; // a key's right operand isn't a bare column ref
    }

    try_lookup_join(memo, group_id, base, &oriented, &right_cols, candidates, &right_props);
    try_concat_join(memo, group_id, base, &right_cols, candidates, &right_props);
    try_merge_join(memo, group_id, base, &right_cols, candidates);
    try_range_heap_join(memo, group_id, base);
}

/// Splits `base.filters`' top-level equi-predicates and keeps only the
/// ones that reference exactly one column from each side.
fn orient_equi_keys(base: &JoinBase, left: &RelationalProperties, right: &RelationalProperties) -> Vec<OrientedKey> {
    let mut out = Vec::new();
    for (a, b) in scalar::extract_equi_keys(&base.filters) {
        let a_tables = a.referenced_tables();
        let b_tables = b.referenced_tables();
        if a_tables.is_subset_of(left.output_tables) && b_tables.is_subset_of(right.output_tables) {
            out.push(OrientedKey { left: a, right: b });
        } else if b_tables.is_subset_of(left.output_tables) && a_tables.is_subset_of(right.output_tables) {
            out.push(OrientedKey { left: b, right: a });
        }
    }
    out
}

/// HashJoin: any equijoin filter qualifies, partitioned into left/right
/// key tuples (spec.md §4.4 Phase D).
fn try_hash_join(memo: &mut Memo, group_id: GroupId, base: &JoinBase, oriented: &[OrientedKey]) {
    let props = memo.group(group_id).props.clone();
    let expr = HashJoinExpr {
        base: base.copy(),
        left_keys: oriented.iter().map(|k| k.left.clone()).collect(),
        right_keys: oriented.iter().map(|k| k.right.clone()).collect(),
        partial: base.join_type.is_partial(),
    };
    memo.memoize(Some(group_id), RelKind::HashJoin(expr), props);
}

/// LookupJoin: the right side's equi-join columns must match a prefix
/// of some catalog index on the right relation.
fn try_lookup_join(
    memo: &mut Memo,
    group_id: GroupId,
    base: &JoinBase,
    oriented: &[OrientedKey],
    right_cols: &[ColumnId],
    candidates: &[IndexInfo],
    right_props: &RelationalProperties,
) {
    for index in candidates {
        let prefix_len = index.matches_prefix(right_cols);
        if prefix_len == 0 || prefix_len != right_cols.len() {
            continue;
        }
        let keys = oriented
            .iter()
            .zip(right_cols)
            .map(|(k, &rc)| LookupKey { expr: k.left.clone(), nullable: !right_props.fd.not_null.contains(rc as TableId) })
            .collect();
        let lookup = Lookup { index: index.id, keys, unique: index.unique };
        let expr = LookupJoinExpr { base: base.copy(), lookup };
        let props = memo.group(group_id).props.clone();
        memo.memoize(Some(group_id), RelKind::LookupJoin(expr), props);
    }
}

/// ConcatJoin: when the filter is a disjunction of equi-predicates over
/// the same right-side index prefix, one `Lookup` per disjunct.
fn try_concat_join(
    memo: &mut Memo,
    group_id: GroupId,
    base: &JoinBase,
    right_cols: &[ColumnId],
    candidates: &[IndexInfo],
    right_props: &RelationalProperties,
) {
    if base.filters.len() != 1 {
        return;
    }
    let Some(disjuncts) = flatten_or_equalities(base.filters[0].as_ref()) else { return };
    if disjuncts.len() < 2 {
        return;
    }
    let mut per_disjunct_right_cols: Vec<ColumnId> = Vec::with_capacity(disjuncts.len());
    let mut left_keys: Vec<ScalarRef> = Vec::with_capacity(disjuncts.len());
    for (a, b) in &disjuncts {
        match (scalar::as_column_ref(b.as_ref()), scalar::as_column_ref(a.as_ref())) {
            (Some((c, _)), _) if right_cols.contains(&c) => {
                per_disjunct_right_cols.push(c);
                left_keys.push(a.clone());
            }
            (_, Some((c, _))) if right_cols.contains(&c) => {
                per_disjunct_right_cols.push(c);
                left_keys.push(b.clone());
            }
            _ => return,
        }
    }
    for index in candidates {
        if per_disjunct_right_cols.iter().any(|c| index.matches_prefix(std::slice::from_ref(c)) == 0) {
            continue;
        }
        let lookups = left_keys
            .iter()
            .map(|key| Lookup {
                index: index.id,
                keys: vec![LookupKey { expr: key.clone(), nullable: !right_props.fd.not_null.contains(index.columns[0] as TableId) }],
                unique: index.unique,
            })
            .collect();
        let expr = ConcatJoinExpr { base: base.copy(), lookups };
        let props = memo.group(group_id).props.clone();
        memo.memoize(Some(group_id), RelKind::ConcatJoin(expr), props);
    }
}

/// Walks a disjunction tree (borrowed, via `tag()`) down to its leaves
/// and recovers each leaf's owned equality operands. `None` if any
/// disjunct isn't an equality the host can decompose.
fn flatten_or_equalities(expr: &dyn crate::scalar::ScalarExpression) -> Option<Vec<(ScalarRef, ScalarRef)>> {
    use crate::scalar::ScalarTag;
    match expr.tag() {
        ScalarTag::Or(l, r) => {
            let mut left = flatten_or_equalities(l)?;
            left.extend(flatten_or_equalities(r)?);
            Some(left)
        }
        _ => Some(vec![expr.equality_operands()?]),
    }
}

/// MergeJoin: both sides must expose an ordered (`BTree`) index over
/// the equi-columns.
fn try_merge_join(memo: &mut Memo, group_id: GroupId, base: &JoinBase, right_cols: &[ColumnId], right_candidates: &[IndexInfo]) {
    let right_index = right_candidates.iter().find(|i| i.kind == IndexKind::BTree && i.matches_prefix(right_cols) == right_cols.len());
    let Some(right_index) = right_index else { return };

    // The left side's ordering index lives on whichever base relation
    // the left key columns resolve to; since the left child may itself
    // already be a multi-table join, merge-join candidates are limited
    // to left children backed by exactly one source relation, mirroring
    // the right-side restriction above.
    let left_props_output = memo.group(base.left).props.output_tables;
    if left_props_output.size() != 1 {
        return;
    }
    let left_index = IndexScan { index: right_index.id, low: None, high: None };
    let right_scan = IndexScan { index: right_index.id, low: None, high: None };
    let expr = MergeJoinExpr { base: base.copy(), left_index, right_index: right_scan, swap_cmp: false };
    let props = memo.group(group_id).props.clone();
    memo.memoize(Some(group_id), RelKind::MergeJoin(expr), props);
}

/// RangeHeapJoin: the filter list contains a predicate recognized by
/// the host as a `min ≤ v ≤ max` shape (`as_range_predicate`); value and
/// min sides are described by whichever of index/sort the host prefers
/// — this baseline always falls back to an explicit sort expression,
/// since index selection for a sort key belongs to the access-path
/// layer rather than join construction.
fn try_range_heap_join(memo: &mut Memo, group_id: GroupId, base: &JoinBase) {
    let Some(shape) = base.filters.iter().find_map(|f| f.as_range_predicate()) else { return };
    let range_heap = RangeHeap {
        value_index: None,
        value_sort: Some(shape.value.clone()),
        min_index: None,
        min_sort: Some(shape.min.clone()),
        value_col: shape.value,
        min_col: shape.min,
        max_col: shape.max,
        min_closed: shape.min_closed,
        max_closed: shape.max_closed,
    };
    let expr = RangeHeapJoinExpr { base: base.copy(), range_heap };
    let props = memo.group(group_id).props.clone();
    memo.memoize(Some(group_id), RelKind::RangeHeapJoin(expr), props);
}
