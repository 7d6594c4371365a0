//! Search: the bottom-up group-at-a-time costing pass that turns a
//! fully populated, fully expanded memo into a single best plan per
//! group (spec.md §4.7).
//!
//! Grounded on `execution/optimizer/mod.rs`'s `optimize()` driver shape
//! (recurse into children before costing a parent, memoize a
//! `done`/visited flag per node) and `execution/optimizer/rules.rs`'s
//! rule-application loop, narrowed to spec.md §4.7's exact recursion
//! and the hint-aware tie-break spec.md §4.3/§8 describe.

use crate::cost::{self, BiasTarget};
use crate::config::OptimizerConfig;
use crate::hints::{self, AppliedHints};
use crate::memo::{ExprGroup, GroupId, Memo, RelExprId};

/// Costs every member of `group_id`'s group, recursing into children
/// first so a parent's children are always `done` before the parent
/// needs their `ExprGroup::cost` (spec.md §4.7). Idempotent: a group
/// already marked `done` returns immediately, so a DAG-shaped memo
/// (groups shared by more than one parent) is only ever costed once.
pub fn optimize_group(memo: &mut Memo, group_id: GroupId, config: &OptimizerConfig, hints: Option<&AppliedHints>, bias: Option<BiasTarget>) {
    if memo.group(group_id).done {
        return;
    }
    let members = memo.group(group_id).members.clone();
    for expr_id in members {
        let children = memo.expr(expr_id).kind.children();
        for &child in &children {
            optimize_group(memo, child, config, hints, bias);
        }
        let expr = memo.expr(expr_id).clone();
        let rel_cost = cost::cost_of_biased(memo, &expr, config, bias);
        let children_cost: f64 = children.iter().map(|&c| memo.group(c).cost.unwrap_or(0.0)).sum();
        let total = rel_cost + children_cost;
        memo.expr_mut(expr_id).cost = Some(total);
        update_best(memo, group_id, expr_id, total, hints);
    }
    memo.group_mut(group_id).done = true;
    tracing::trace!(group = %group_id, cost = memo.group(group_id).cost, "optimize_group: done");
}

/// Considers one costed member as the new best for its group (spec.md
/// §4.7's `updateBest`). Hint satisfaction is lexicographically prior
/// to cost: a hint-satisfying member always displaces a non-satisfying
/// incumbent regardless of cost, and only once both candidates agree
/// on satisfaction does the cheaper one win (spec.md §8's "Hint
/// monotonicity").
fn update_best(memo: &mut Memo, group_id: GroupId, expr_id: RelExprId, cost: f64, hints: Option<&AppliedHints>) {
    let satisfies = match hints {
        Some(h) => {
            let expr = memo.expr(expr_id).clone();
            hints::expr_satisfies(memo, group_id, &expr, h)
        }
        None => true,
    };

    let group: &ExprGroup = memo.group(group_id);
    let replace = match group.best {
        None => true,
        Some(_) if satisfies && !group.hint_ok => true,
        Some(_) if !satisfies && group.hint_ok => false,
        Some(_) => cost < group.cost.unwrap_or(f64::INFINITY),
    };

    if replace {
        let group = memo.group_mut(group_id);
        group.best = Some(expr_id);
        group.cost = Some(cost);
        group.hint_ok = satisfies;
        tracing::debug!(group = %group_id, expr = expr_id.0, cost, satisfies, "update_best: new best");
    }
}

/// Costs the whole memo rooted at `root` and returns the chosen
/// top-level member (spec.md §4.7's top-level entry point). Panics
/// only if `root`'s group was somehow left with no members, which
/// `Memo::new_expr_group` never allows.
pub fn optimize_root(memo: &mut Memo, root: GroupId, config: &OptimizerConfig, hints: Option<&AppliedHints>, bias: Option<BiasTarget>) -> RelExprId {
    optimize_group(memo, root, config, hints, bias);
    memo.group(root).best.expect("a populated group always has at least one costed member")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::Schema;
    use crate::memo::{HashJoinExpr, JoinBase, JoinType, MergeJoinExpr, RelKind, TableScanExpr};
    use crate::relprops::{FuncDepSet, RelationalProperties};
    use crate::vertex_set::VertexSet;

    fn source_group(memo: &mut Memo, table: u32, card: f64, name: &str) -> GroupId {
        memo.new_expr_group(
            RelKind::TableScan(TableScanExpr { table, table_name: name.to_string(), schema: Schema::empty() }),
            RelationalProperties::for_source(Schema::empty(), table, FuncDepSet::default(), card),
            Some(name),
        )
    }

    #[test]
    fn cheaper_variant_wins_without_hints() {
        let mut memo = Memo::new();
        let config = OptimizerConfig::default();
        let left = source_group(&mut memo, 0, 1000.0, "a");
        let right = source_group(&mut memo, 1, 5.0, "b");
        let base = JoinBase { join_type: JoinType::Inner, filters: vec![], left, right };
        let props = RelationalProperties::for_inner_join(
            &memo.group(left).props.clone(),
            &memo.group(right).props.clone(),
            FuncDepSet::default(),
            Schema::empty(),
            1.0,
        );
        let join_group = memo.memoize(None, RelKind::HashJoin(HashJoinExpr { base: base.clone(), left_keys: vec![], right_keys: vec![], partial: false }), props.clone());
        memo.memoize(Some(join_group), RelKind::MergeJoin(MergeJoinExpr {
            base: base.clone(),
            left_index: crate::memo::IndexScan { index: 0, low: None, high: None },
            right_index: crate::memo::IndexScan { index: 0, low: None, high: None },
            swap_cmp: false,
        }), props);

        optimize_root(&mut memo, join_group, &config, None, None);

        let best_id = memo.group(join_group).best.unwrap();
        assert!(matches!(memo.expr(best_id).kind, RelKind::MergeJoin(_)), "merge join costs card(left)*cpu, far cheaper than hash join here");
    }

    #[test]
    fn hint_forces_more_expensive_variant() {
        let mut memo = Memo::new();
        let config = OptimizerConfig::default();
        let left = source_group(&mut memo, 0, 1000.0, "a");
        let right = source_group(&mut memo, 1, 5.0, "b");
        let base = JoinBase { join_type: JoinType::Inner, filters: vec![], left, right };
        let props = RelationalProperties::for_inner_join(
            &memo.group(left).props.clone(),
            &memo.group(right).props.clone(),
            FuncDepSet::default(),
            Schema::empty(),
            1.0,
        );
        let join_group = memo.memoize(None, RelKind::HashJoin(HashJoinExpr { base: base.clone(), left_keys: vec![], right_keys: vec![], partial: false }), props.clone());
        memo.memoize(Some(join_group), RelKind::MergeJoin(MergeJoinExpr {
            base: base.clone(),
            left_index: crate::memo::IndexScan { index: 0, low: None, high: None },
            right_index: crate::memo::IndexScan { index: 0, low: None, high: None },
            swap_cmp: false,
        }), props);

        let span = VertexSet::singleton(0).add(1);
        let mut pair_hints = std::collections::HashMap::new();
        pair_hints.insert(span, crate::hints::JoinMethodHint::Hash);
        let hints = AppliedHints { join_order: None, fixed_order: false, pair_hints, no_icp: false, no_merge_join: false, dropped: vec![] };

        optimize_root(&mut memo, join_group, &config, Some(&hints), None);

        let best_id = memo.group(join_group).best.unwrap();
        assert!(matches!(memo.expr(best_id).kind, RelKind::HashJoin(_)), "HASH_JOIN hint must win even though it costs more");
    }
}
