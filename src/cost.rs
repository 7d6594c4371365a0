//! The Coster: pure functions mapping a physical operator plus its
//! children's cardinalities (and, for `Distinct`, its child's already-
//! computed cost) to a scalar cost (spec.md §4.5).
//!
//! Grounded on `optimizer_pro::mod::CostParameters`'s field shape and
//! `execution/optimizer/rules.rs::estimate_cost`/`estimate_join_cost`'s
//! per-operator dispatch, narrowed to exactly the formulas spec.md §4.5
//! tabulates. Table/index statistics stay an external collaborator
//! (§1): every function here takes already-resolved child
//! cardinalities rather than consulting a stats provider itself.

use crate::card;
use crate::config::OptimizerConfig;
use crate::memo::{GroupId, Memo, RelExpr, RelKind};

/// `costPartial(L,R) = L · (R/2) · (seqIO + cpu)` (spec.md §4.5),
/// shared by `SemiJoin`/`AntiJoin` and the partial `HashJoin` variant.
pub fn cost_partial(left_card: f64, right_card: f64, config: &OptimizerConfig) -> f64 {
    left_card * (right_card / 2.0) * (config.seq_io + config.cpu)
}

fn inner_join_shape_cost(left_card: f64, right_card: f64, config: &OptimizerConfig) -> f64 {
    (left_card * right_card - 1.0) * config.seq_io + (left_card * right_card) * config.cpu
}

/// `lookupSelectivity` feeds both the coster and the carder; computed
/// here from the `Lookup` payload and the right side's functional
/// dependencies rather than re-deriving it independently, so the two
/// components can never disagree on which branch of the cost/
/// cardinality formula applies.
fn lookup_sel(lookup: &crate::memo::Lookup, right_fd: &crate::relprops::FuncDepSet, config: &OptimizerConfig) -> f64 {
    let right_rejects_nulls = !lookup.keys.iter().any(|k| k.nullable);
    card::lookup_selectivity(lookup.keys.len(), lookup.unique, right_fd.has_max1_row(), right_rejects_nulls, config)
}

/// The relational-expression-local cost `relCost` of one `RelExpr`:
/// spec.md §4.5's per-operator table, given its children's already-
/// costed groups. Does not add children's own costs — that
/// accumulation is `search::optimize_group`'s job (spec.md §4.7).
pub fn cost_of(memo: &Memo, expr: &RelExpr, config: &OptimizerConfig) -> f64 {
    let card = |g: GroupId| memo.group(g).props.card;
    let group_cost = |g: GroupId| memo.group(g).cost.unwrap_or(0.0);

    match &expr.kind {
        RelKind::TableScan(_) => card(expr.group) * config.seq_io,
        RelKind::RecursiveTable(_) => 100.0 * config.seq_io,
        RelKind::RecursiveCte(_) => 1000.0 * config.seq_io,
        RelKind::SubqueryAlias(_) => 1000.0 * config.seq_io,
        RelKind::TableFunc(_) => 10.0 * config.seq_io,
        RelKind::EmptyTable => 0.0,
        RelKind::Max1Row(_) => 1.0 * config.seq_io,
        RelKind::Values(v) => v.row_count as f64 * config.cpu,
        // Not in spec.md §4.5's table: a bare renaming wrapper adds no
        // cost of its own, same as the teacher's `PlanNode` aliasing.
        RelKind::TableAlias(_) => 0.0,

        RelKind::Project(p) => card(p.child) * config.cpu,
        RelKind::Distinct(d) => {
            if expr.sorted_distinct {
                // Inputs already sorted on the output columns: distinct
                // collapses to a sorted-stream dedup, no hash overhead
                // (spec.md §4.7's `SortedDistinctOp` note).
                card(d.child) * config.cpu
            } else {
                group_cost(d.child) * (config.cpu + 0.75 * config.mem)
            }
        }
        RelKind::Filter(f) => card(f.child) * config.cpu * f.predicates.len() as f64,

        RelKind::InnerJoin(b) | RelKind::LeftJoin(b) | RelKind::LateralInnerJoin(b) | RelKind::LateralLeftJoin(b) => {
            inner_join_shape_cost(card(b.left), card(b.right), config)
        }
        RelKind::CrossJoin(b) | RelKind::FullOuterJoin(b) | RelKind::LateralCrossJoin(b) => {
            inner_join_shape_cost(card(b.left), card(b.right), config) * config.degenerate_penalty
        }
        RelKind::SemiJoin(b) | RelKind::AntiJoin(b) => cost_partial(card(b.left), card(b.right), config),

        RelKind::HashJoin(h) => {
            let (l, r) = (card(h.base.left), card(h.base.right));
            if h.partial {
                0.5 * cost_partial(l, r, config)
            } else {
                l * config.cpu + r * (config.seq_io + config.mem)
            }
        }
        RelKind::MergeJoin(m) => card(m.base.left) * config.cpu,
        RelKind::LookupJoin(lj) => {
            let right_fd = &memo.group(lj.base.right).props.fd;
            let sel = lookup_sel(&lj.lookup, right_fd, config);
            let (l, r) = (card(lj.base.left), card(lj.base.right));
            if sel == 0.0 {
                l * (config.cpu + config.rand_io) - r * config.seq_io
            } else {
                l * r * sel * (config.cpu + config.rand_io) - r * config.seq_io
            }
        }
        RelKind::ConcatJoin(cj) => {
            let right_fd = &memo.group(cj.base.right).props.fd;
            let sum_sel: f64 = cj.lookups.iter().map(|lk| lookup_sel(lk, right_fd, config)).sum();
            let (l, r) = (card(cj.base.left), card(cj.base.right));
            // §9 open question: this subtraction is unconditional and can
            // go negative when `l * sum_sel * concat_factor` is small;
            // preserved verbatim per spec.md rather than clamped.
            l * sum_sel * config.concat_factor * (config.cpu + config.rand_io) - r * config.seq_io
        }
        RelKind::RangeHeapJoin(rh) => {
            // §9 open question: "We can probably get a better estimate
            // somehow" — the formula is kept exactly as stated rather
            // than reworked.
            card(rh.base.left) * card(rh.base.right) * config.per_key_reduction * config.seq_io
        }
    }
}

/// The closed set of physical join shapes a bias coster can pin
/// (spec.md §4.5's "Bias costers" paragraph). `Inner` biases toward
/// the *logical* `InnerJoin`/`LeftJoin` shape (i.e. away from any
/// physical variant) rather than a specific algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BiasTarget {
    Inner,
    Hash,
    Lookup,
    Merge,
    Partial,
    RangeHeap,
}

impl BiasTarget {
    fn matches(self, kind: &RelKind) -> bool {
        match self {
            BiasTarget::Inner => matches!(kind, RelKind::InnerJoin(_) | RelKind::LeftJoin(_)),
            BiasTarget::Hash => matches!(kind, RelKind::HashJoin(h) if !h.partial),
            BiasTarget::Lookup => matches!(kind, RelKind::LookupJoin(_)),
            BiasTarget::Merge => matches!(kind, RelKind::MergeJoin(_)),
            BiasTarget::Partial => matches!(kind, RelKind::HashJoin(h) if h.partial) || matches!(kind, RelKind::SemiJoin(_) | RelKind::AntiJoin(_)),
            BiasTarget::RangeHeap => matches!(kind, RelKind::RangeHeapJoin(_)),
        }
    }
}

/// Decorates [`cost_of`] with a bias: if `target` is set and `expr`'s
/// operator matches it, the cost collapses to `-biasFactor`, making it
/// the unique minimum for its group without touching any other
/// group's choice (spec.md §4.5, tested by §8's "Bias monotonicity").
pub fn cost_of_biased(memo: &Memo, expr: &RelExpr, config: &OptimizerConfig, target: Option<BiasTarget>) -> f64 {
    if let Some(target) = target {
        if target.matches(&expr.kind) {
            return -config.bias_factor;
        }
    }
    cost_of(memo, expr, config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::Schema;
    use crate::memo::{JoinBase, JoinType, RelExprId, TableScanExpr};
    use crate::relprops::{FuncDepSet, RelationalProperties};

    fn source_group(memo: &mut Memo, table: u32, card: f64, name: &str) -> GroupId {
        memo.new_expr_group(
            RelKind::TableScan(TableScanExpr { table, table_name: name.to_string(), schema: Schema::empty() }),
            RelationalProperties::for_source(Schema::empty(), table, FuncDepSet::default(), card),
            Some(name),
        )
    }

    fn costed_expr(memo: &mut Memo, id: RelExprId) -> RelExpr {
        // mirrors optimize_group's bookkeeping: children must already
        // be "done" with a cost before a parent's cost is computed.
        memo.expr(id).clone()
    }

    #[test]
    fn table_scan_cost_is_card_times_seq_io() {
        let mut memo = Memo::new();
        let config = OptimizerConfig::default();
        let g = source_group(&mut memo, 0, 500.0, "a");
        let id = memo.group(g).members[0];
        let expr = costed_expr(&mut memo, id);
        assert_eq!(cost_of(&memo, &expr, &config), 500.0 * config.seq_io);
    }

    #[test]
    fn hash_join_partial_variant_halves_cost_partial() {
        let mut memo = Memo::new();
        let config = OptimizerConfig::default();
        let left = source_group(&mut memo, 0, 100.0, "a");
        let right = source_group(&mut memo, 1, 10.0, "b");
        let base = JoinBase { join_type: JoinType::Semi, filters: vec![], left, right };
        let props = memo.group(left).props.clone();
        let g = memo.memoize(
            None,
            RelKind::HashJoin(crate::memo::HashJoinExpr { base, left_keys: vec![], right_keys: vec![], partial: true }),
            props,
        );
        let id = memo.group(g).members[0];
        let expr = costed_expr(&mut memo, id);
        let got = cost_of(&memo, &expr, &config);
        let expected = 0.5 * cost_partial(100.0, 10.0, &config);
        assert_eq!(got, expected);
    }

    #[test]
    fn lookup_join_uses_zero_amplification_branch_when_sel_zero() {
        let mut memo = Memo::new();
        let config = OptimizerConfig::default();
        let left = source_group(&mut memo, 0, 1000.0, "a");
        let right = source_group(&mut memo, 1, 10.0, "b");
        memo.group_mut(right).props.fd = FuncDepSet::max1_row(1);
        let base = JoinBase { join_type: JoinType::Inner, filters: vec![], left, right };
        let lookup = crate::memo::Lookup { index: 0, keys: vec![], unique: true };
        let props = memo.group(left).props.clone();
        let g = memo.memoize(None, RelKind::LookupJoin(crate::memo::LookupJoinExpr { base, lookup }), props);
        let id = memo.group(g).members[0];
        let expr = costed_expr(&mut memo, id);
        let got = cost_of(&memo, &expr, &config);
        let expected = 1000.0 * (config.cpu + config.rand_io) - 10.0 * config.seq_io;
        assert_eq!(got, expected);
    }

    #[test]
    fn bias_coster_pins_target_variant_as_minimum() {
        let mut memo = Memo::new();
        let config = OptimizerConfig::default();
        let left = source_group(&mut memo, 0, 100.0, "a");
        let right = source_group(&mut memo, 1, 100.0, "b");
        let base = JoinBase { join_type: JoinType::Inner, filters: vec![], left, right };
        let props = memo.group(left).props.clone();
        let g = memo.memoize(
            None,
            RelKind::HashJoin(crate::memo::HashJoinExpr { base, left_keys: vec![], right_keys: vec![], partial: false }),
            props,
        );
        let id = memo.group(g).members[0];
        let expr = costed_expr(&mut memo, id);
        let biased = cost_of_biased(&memo, &expr, &config, Some(BiasTarget::Hash));
        assert_eq!(biased, -config.bias_factor);
        let unbiased = cost_of_biased(&memo, &expr, &config, Some(BiasTarget::Merge));
        assert_eq!(unbiased, cost_of(&memo, &expr, &config));
    }
}
