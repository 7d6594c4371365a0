//! Exec builder: a postorder walk from the root group's `Best` member
//! down to a physical plan tree in the executor's node dialect (spec.md
//! §4.8).
//!
//! Grounded on `optimizer_pro::plan_generator::PlanGenerator::build_plan`'s
//! postorder tree materialization, narrowed to spec.md §4.8's exact
//! node set and descent rules: `LookupJoin`/`ConcatJoin` reattach the
//! right child's indexed access beneath whatever wrapper operators
//! (alias, filter, project, distinct) sit above the scan, `MergeJoin`
//! builds an indexed scan on each side and validates the scan's range
//! type against the index's declared column type, and `RangeHeapJoin`
//! does the same descent for whichever side has an index rather than a
//! plain sort.

use crate::common::{DataType, IndexId, TableId};
use crate::error::{OptimizerError, Result};
use crate::memo::{GroupId, IndexScan, JoinType, Memo, RelExprId, RelKind};
use crate::physical::IndexCatalog;
use crate::scalar::ScalarRef;

/// The executor's node dialect: the same shape as [`RelKind`] for
/// everything that isn't a join, plus one node per physical join
/// variant (spec.md §4.8's "Outputs: a physical plan tree").
#[derive(Debug, Clone)]
pub enum PhysicalPlan {
    TableScan { table: TableId },
    /// A scan through a specific catalog index, produced wherever a
    /// `LookupJoin`/`ConcatJoin`/`MergeJoin`/`RangeHeapJoin` candidate
    /// reattaches an indexed access beneath the right (or min-) side's
    /// wrapper operators.
    IndexedAccess { table: TableId, index: IndexId },
    Values { row_count: usize },
    EmptyTable,
    TableFunc { name: String },
    RecursiveCte { anchor: Box<PhysicalPlan>, recursive: Box<PhysicalPlan> },
    TableAlias { child: Box<PhysicalPlan>, alias: String },
    SubqueryAlias { child: Box<PhysicalPlan>, alias: String },
    Max1Row { child: Box<PhysicalPlan> },
    Project { child: Box<PhysicalPlan>, exprs: Vec<ScalarRef> },
    Distinct { child: Box<PhysicalPlan> },
    Filter { child: Box<PhysicalPlan>, predicates: Vec<ScalarRef> },
    /// The physical embodiment of a bare logical join (`InnerJoin`,
    /// `CrossJoin`, `LeftJoin`, `FullOuterJoin`, `SemiJoin`, `AntiJoin`,
    /// and the lateral variants) when no indexed/hash variant beat it
    /// on cost.
    NestedLoopJoin { left: Box<PhysicalPlan>, right: Box<PhysicalPlan>, join_type: JoinType, filters: Vec<ScalarRef> },
    HashJoin { left: Box<PhysicalPlan>, right: Box<PhysicalPlan>, left_keys: Vec<ScalarRef>, right_keys: Vec<ScalarRef>, join_type: JoinType, partial: bool },
    MergeJoin { left: Box<PhysicalPlan>, right: Box<PhysicalPlan>, join_type: JoinType, swap_cmp: bool },
    LookupJoin { left: Box<PhysicalPlan>, right: Box<PhysicalPlan>, join_type: JoinType },
    ConcatJoin { left: Box<PhysicalPlan>, branches: Vec<PhysicalPlan>, join_type: JoinType },
    RangeHeapJoin { left: Box<PhysicalPlan>, right: Box<PhysicalPlan>, join_type: JoinType },
}

/// Builds the physical plan for the chosen plan of `root`'s group
/// (spec.md §4.8's top-level entry point). `search::optimize_root` must
/// have already run so every reachable group has a `Best` member.
pub fn build_best_plan(memo: &Memo, root: GroupId, indexes: &IndexCatalog) -> Result<PhysicalPlan> {
    build_group(memo, root, indexes)
}

fn build_group(memo: &Memo, group_id: GroupId, indexes: &IndexCatalog) -> Result<PhysicalPlan> {
    let best = memo.group(group_id).best.ok_or_else(|| {
        OptimizerError::Internal(format!("group {group_id} has no best member; optimize_root must run before build_best_plan"))
    })?;
    build_expr(memo, best, indexes)
}

fn build_expr(memo: &Memo, expr_id: RelExprId, indexes: &IndexCatalog) -> Result<PhysicalPlan> {
    match &memo.expr(expr_id).kind {
        RelKind::TableScan(t) | RelKind::RecursiveTable(t) => Ok(PhysicalPlan::TableScan { table: t.table }),
        RelKind::Values(v) => Ok(PhysicalPlan::Values { row_count: v.row_count }),
        RelKind::EmptyTable => Ok(PhysicalPlan::EmptyTable),
        RelKind::TableFunc(t) => Ok(PhysicalPlan::TableFunc { name: t.name.clone() }),
        RelKind::RecursiveCte(r) => Ok(PhysicalPlan::RecursiveCte {
            anchor: Box::new(build_group(memo, r.anchor, indexes)?),
            recursive: Box::new(build_group(memo, r.recursive, indexes)?),
        }),
        RelKind::TableAlias(a) => Ok(PhysicalPlan::TableAlias { child: Box::new(build_group(memo, a.child, indexes)?), alias: a.alias.clone() }),
        RelKind::SubqueryAlias(a) => Ok(PhysicalPlan::SubqueryAlias { child: Box::new(build_group(memo, a.child, indexes)?), alias: a.alias.clone() }),
        RelKind::Max1Row(m) => Ok(PhysicalPlan::Max1Row { child: Box::new(build_group(memo, m.child, indexes)?) }),
        RelKind::Project(p) => Ok(PhysicalPlan::Project { child: Box::new(build_group(memo, p.child, indexes)?), exprs: p.exprs.clone() }),
        RelKind::Distinct(d) => Ok(PhysicalPlan::Distinct { child: Box::new(build_group(memo, d.child, indexes)?) }),
        RelKind::Filter(f) => Ok(PhysicalPlan::Filter { child: Box::new(build_group(memo, f.child, indexes)?), predicates: f.predicates.clone() }),

        RelKind::InnerJoin(b)
        | RelKind::CrossJoin(b)
        | RelKind::LeftJoin(b)
        | RelKind::FullOuterJoin(b)
        | RelKind::SemiJoin(b)
        | RelKind::AntiJoin(b)
        | RelKind::LateralCrossJoin(b)
        | RelKind::LateralInnerJoin(b)
        | RelKind::LateralLeftJoin(b) => Ok(PhysicalPlan::NestedLoopJoin {
            left: Box::new(build_group(memo, b.left, indexes)?),
            right: Box::new(build_group(memo, b.right, indexes)?),
            join_type: b.join_type,
            filters: b.filters.clone(),
        }),

        RelKind::HashJoin(h) => Ok(PhysicalPlan::HashJoin {
            left: Box::new(build_group(memo, h.base.left, indexes)?),
            right: Box::new(build_group(memo, h.base.right, indexes)?),
            left_keys: h.left_keys.clone(),
            right_keys: h.right_keys.clone(),
            join_type: h.base.join_type,
            partial: h.partial,
        }),

        RelKind::LookupJoin(lj) => {
            let left = build_group(memo, lj.base.left, indexes)?;
            let right = build_group(memo, lj.base.right, indexes)?;
            let right_table = single_table(memo, lj.base.right)?;
            let right = attach_index(right, right_table, lj.lookup.index);
            Ok(PhysicalPlan::LookupJoin { left: Box::new(left), right: Box::new(right), join_type: lj.base.join_type })
        }

        RelKind::ConcatJoin(cj) => {
            let left = build_group(memo, cj.base.left, indexes)?;
            let right_base = build_group(memo, cj.base.right, indexes)?;
            let right_table = single_table(memo, cj.base.right)?;
            let branches = cj.lookups.iter().map(|lk| attach_index(right_base.clone(), right_table, lk.index)).collect();
            Ok(PhysicalPlan::ConcatJoin { left: Box::new(left), branches, join_type: cj.base.join_type })
        }

        RelKind::MergeJoin(mj) => {
            let left_table = single_table(memo, mj.base.left)?;
            let right_table = single_table(memo, mj.base.right)?;
            validate_range_types(indexes, left_table, &mj.left_index)?;
            validate_range_types(indexes, right_table, &mj.right_index)?;
            let left = attach_index(build_group(memo, mj.base.left, indexes)?, left_table, mj.left_index.index);
            let right = attach_index(build_group(memo, mj.base.right, indexes)?, right_table, mj.right_index.index);
            Ok(PhysicalPlan::MergeJoin { left: Box::new(left), right: Box::new(right), join_type: mj.base.join_type, swap_cmp: mj.swap_cmp })
        }

        RelKind::RangeHeapJoin(rh) => {
            let left = build_group(memo, rh.base.left, indexes)?;
            let right = build_group(memo, rh.base.right, indexes)?;
            let right = match rh.range_heap.min_index {
                Some(index) => attach_index(right, single_table(memo, rh.base.right)?, index),
                None => right,
            };
            Ok(PhysicalPlan::RangeHeapJoin { left: Box::new(left), right: Box::new(right), join_type: rh.base.join_type })
        }
    }
}

/// The sole table a single-relation group scans, for attaching an
/// index to the physical plan built under it. Every right side a
/// physical join variant is built over spans exactly one table (spec.md
/// §4.4 Phase D only ever builds these variants over a single-table
/// right child).
fn single_table(memo: &Memo, group_id: GroupId) -> Result<TableId> {
    memo.group(group_id).props.output_tables.lowest().ok_or_else(|| OptimizerError::Internal(format!("group {group_id} has no source table to index")))
}

/// Descends through wrapper operators (alias, filter, project,
/// distinct) above a table scan, replacing the scan at the bottom with
/// an indexed access and reattaching the wrappers around it (spec.md
/// §4.8: "descend through intermediate wrappers, reattaching them
/// around the constructed indexed-access node"). A plan with no scan
/// for `table` underneath (already replaced, or a shape physical
/// expansion never actually produces this over) is returned unchanged.
fn attach_index(plan: PhysicalPlan, table: TableId, index: IndexId) -> PhysicalPlan {
    match plan {
        PhysicalPlan::TableScan { table: t } if t == table => PhysicalPlan::IndexedAccess { table: t, index },
        PhysicalPlan::TableAlias { child, alias } => PhysicalPlan::TableAlias { child: Box::new(attach_index(*child, table, index)), alias },
        PhysicalPlan::SubqueryAlias { child, alias } => PhysicalPlan::SubqueryAlias { child: Box::new(attach_index(*child, table, index)), alias },
        PhysicalPlan::Filter { child, predicates } => PhysicalPlan::Filter { child: Box::new(attach_index(*child, table, index)), predicates },
        PhysicalPlan::Project { child, exprs } => PhysicalPlan::Project { child: Box::new(attach_index(*child, table, index)), exprs },
        PhysicalPlan::Distinct { child } => PhysicalPlan::Distinct { child: Box::new(attach_index(*child, table, index)) },
        other => other,
    }
}

/// Rejects a `MergeJoin` whose range bound type doesn't match its
/// index's declared column type (spec.md §4.8, `IndexTypeMismatch`).
/// A host whose scalar tree or catalog can't report a type for either
/// side of the comparison has nothing to compare, so the check passes.
fn validate_range_types(indexes: &IndexCatalog, table: TableId, scan: &IndexScan) -> Result<()> {
    let Some(info) = indexes.get(&table).and_then(|infos| infos.iter().find(|i| i.id == scan.index)) else {
        return Ok(());
    };
    let Some(expected) = info.column_types.first() else { return Ok(()) };
    for bound in [scan.low.as_ref(), scan.high.as_ref()].into_iter().flatten() {
        if let Some(found) = bound.expr.value_type() {
            if found != *expected {
                return Err(OptimizerError::IndexTypeMismatch {
                    index: scan.index.to_string(),
                    expected: format!("{expected:?}"),
                    found: format!("{found:?}"),
                });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{ColumnId, IndexInfo, IndexKind, Schema};
    use crate::config::OptimizerConfig;
    use crate::memo::{HashJoinExpr, JoinBase, LookupJoinExpr, LookupKey, MergeJoinExpr, RangeBound, TableScanExpr};
    use crate::relprops::{FuncDepSet, RelationalProperties};
    use crate::scalar::testutil::Scalar;
    use crate::scalar::ScalarExpression;
    use crate::scalar::ScalarTag;
    use crate::search::optimize_root;
    use crate::vertex_set::VertexSet;
    use std::sync::Arc;

    fn source_group(memo: &mut Memo, table: TableId, card: f64, name: &str) -> GroupId {
        memo.new_expr_group(
            RelKind::TableScan(TableScanExpr { table, table_name: name.to_string(), schema: Schema::empty() }),
            RelationalProperties::for_source(Schema::empty(), table, FuncDepSet::default(), card),
            Some(name),
        )
    }

    #[test]
    fn builds_hash_join_tree_for_chosen_plan() {
        let mut memo = Memo::new();
        let config = OptimizerConfig::default();
        let left = source_group(&mut memo, 0, 1000.0, "a");
        let right = source_group(&mut memo, 1, 10.0, "b");
        let base = JoinBase { join_type: JoinType::Inner, filters: vec![], left, right };
        let props = RelationalProperties::for_inner_join(&memo.group(left).props.clone(), &memo.group(right).props.clone(), FuncDepSet::default(), Schema::empty(), 1.0);
        let join_group = memo.memoize(
            None,
            RelKind::HashJoin(HashJoinExpr { base, left_keys: vec![Scalar::col(0, 0)], right_keys: vec![Scalar::col(0, 1)], partial: false }),
            props,
        );

        optimize_root(&mut memo, join_group, &config, None, None);
        let indexes = IndexCatalog::new();
        let plan = build_best_plan(&memo, join_group, &indexes).unwrap();

        match plan {
            PhysicalPlan::HashJoin { left, right, .. } => {
                assert!(matches!(*left, PhysicalPlan::TableScan { table: 0 }));
                assert!(matches!(*right, PhysicalPlan::TableScan { table: 1 }));
            }
            other => panic!("expected HashJoin, got {other:?}"),
        }
    }

    #[test]
    fn lookup_join_reattaches_alias_around_indexed_access() {
        let mut memo = Memo::new();
        let config = OptimizerConfig::default();
        let left = source_group(&mut memo, 0, 1000.0, "a");
        let right_scan = source_group(&mut memo, 1, 10.0, "b");
        let right_alias = memo.memoize(
            None,
            RelKind::TableAlias(crate::memo::TableAliasExpr { child: right_scan, alias: "b2".to_string() }),
            memo.group(right_scan).props.clone(),
        );
        let base = JoinBase { join_type: JoinType::Inner, filters: vec![], left, right: right_alias };
        let props = RelationalProperties::for_inner_join(&memo.group(left).props.clone(), &memo.group(right_alias).props.clone(), FuncDepSet::default(), Schema::empty(), 1.0);
        let join_group = memo.memoize(
            None,
            RelKind::LookupJoin(LookupJoinExpr {
                base,
                lookup: crate::memo::Lookup { index: 7, keys: vec![LookupKey { expr: Scalar::col(0, 1), nullable: false }], unique: true },
            }),
            props,
        );

        optimize_root(&mut memo, join_group, &config, None, None);
        let indexes = IndexCatalog::new();
        let plan = build_best_plan(&memo, join_group, &indexes).unwrap();

        match plan {
            PhysicalPlan::LookupJoin { right, .. } => match *right {
                PhysicalPlan::TableAlias { child, alias } => {
                    assert_eq!(alias, "b2");
                    assert!(matches!(*child, PhysicalPlan::IndexedAccess { table: 1, index: 7 }));
                }
                other => panic!("expected alias wrapping indexed access, got {other:?}"),
            },
            other => panic!("expected LookupJoin, got {other:?}"),
        }
    }

    /// A scalar node that reports a fixed static type, for exercising
    /// the `IndexTypeMismatch` path (the `testutil::Scalar` shape has
    /// no type information of its own).
    #[derive(Debug)]
    struct TypedColumn(ColumnId, TableId, DataType);

    impl ScalarExpression for TypedColumn {
        fn tag(&self) -> ScalarTag<'_> {
            ScalarTag::ColumnRef(self.0, self.1)
        }
        fn referenced_tables(&self) -> VertexSet {
            VertexSet::singleton(self.1)
        }
        fn equals(&self, _other: &dyn ScalarExpression) -> bool {
            false
        }
        fn structural_hash(&self) -> u64 {
            0
        }
        fn as_any(&self) -> &dyn std::any::Any {
            self
        }
        fn value_type(&self) -> Option<DataType> {
            Some(self.2.clone())
        }
    }

    #[test]
    fn merge_join_range_type_mismatch_is_rejected() {
        let mut memo = Memo::new();
        let config = OptimizerConfig::default();
        let left = source_group(&mut memo, 0, 1000.0, "a");
        let right = source_group(&mut memo, 1, 10.0, "b");
        let base = JoinBase { join_type: JoinType::Inner, filters: vec![], left, right };
        let props = RelationalProperties::for_inner_join(&memo.group(left).props.clone(), &memo.group(right).props.clone(), FuncDepSet::default(), Schema::empty(), 1.0);
        let right_index = IndexScan {
            index: 3,
            low: Some(RangeBound { expr: Arc::new(TypedColumn(0, 1, DataType::Text)), closed: true }),
            high: None,
        };
        let left_index = IndexScan { index: 3, low: None, high: None };
        let join_group = memo.memoize(None, RelKind::MergeJoin(MergeJoinExpr { base, left_index, right_index, swap_cmp: false }), props);

        optimize_root(&mut memo, join_group, &config, None, None);

        let mut indexes = IndexCatalog::new();
        indexes.insert(1, vec![IndexInfo { id: 3, table: 1, columns: vec![0], unique: true, kind: IndexKind::BTree, column_types: vec![DataType::Integer] }]);

        let err = build_best_plan(&memo, join_group, &indexes).unwrap_err();
        assert!(matches!(err, OptimizerError::IndexTypeMismatch { .. }), "expected IndexTypeMismatch, got {err:?}");
    }

    #[test]
    fn merge_join_without_catalog_entry_for_index_passes() {
        let mut memo = Memo::new();
        let config = OptimizerConfig::default();
        let left = source_group(&mut memo, 0, 1000.0, "a");
        let right = source_group(&mut memo, 1, 10.0, "b");
        let base = JoinBase { join_type: JoinType::Inner, filters: vec![], left, right };
        let props = RelationalProperties::for_inner_join(&memo.group(left).props.clone(), &memo.group(right).props.clone(), FuncDepSet::default(), Schema::empty(), 1.0);
        let idx = IndexScan { index: 0, low: None, high: None };
        let join_group = memo.memoize(None, RelKind::MergeJoin(MergeJoinExpr { base, left_index: idx.clone(), right_index: idx, swap_cmp: false }), props);

        optimize_root(&mut memo, join_group, &config, None, None);
        let indexes = IndexCatalog::new();
        let plan = build_best_plan(&memo, join_group, &indexes).unwrap();
        assert!(matches!(plan, PhysicalPlan::MergeJoin { .. }));
    }
}
