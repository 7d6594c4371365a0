//! The Carder: pure functions mapping a physical operator and its
//! children's cardinalities to an estimated row count (spec.md §4.6).
//!
//! Grounded on `optimizer_pro::cost_model::CardinalityEstimator`, narrowed
//! to the closed set of formulas spec.md §4.6 names; table statistics stay
//! an external collaborator (§1), so every function here takes already-
//! resolved child cardinalities rather than looking anything up itself.

use crate::config::OptimizerConfig;
use crate::memo::JoinType;

/// `TableScan` cardinality: the stats provider's row count, or the
/// configured fallback when stats are unavailable (spec.md §4.5/§4.6).
pub fn table_scan_cardinality(stats_row_count: Option<f64>, config: &OptimizerConfig) -> f64 {
    stats_row_count.unwrap_or(config.default_table_card)
}

/// Join cardinality for the logical/base join variants (spec.md §4.6's
/// "Other joins" row, with `LeftOuter`/`RightOuter` amplification-floor
/// special cases; physical variants with their own selectivity reasoning
/// — `LookupJoin`, `ConcatJoin`, semi/anti — go through the dedicated
/// helpers below instead).
pub fn estimate_join_cardinality(join_type: JoinType, left_card: f64, right_card: f64, config: &OptimizerConfig) -> f64 {
    match join_type {
        JoinType::LeftOuter | JoinType::LateralLeft => left_card.max(config.optimistic_join_sel * left_card * right_card),
        JoinType::Semi | JoinType::Anti => partial_cardinality(left_card, config),
        _ => config.optimistic_join_sel * left_card * right_card,
    }
}

/// `RightOuter` cardinality (spec.md §4.6): kept distinct from
/// `estimate_join_cardinality` since this memo's `JoinType` has no
/// `RightOuter` variant — a right outer join is built as a left outer
/// join with its children swapped before it ever reaches the carder.
pub fn right_outer_cardinality(left_card: f64, right_card: f64, config: &OptimizerConfig) -> f64 {
    right_card.max(config.optimistic_join_sel * left_card * right_card)
}

/// Semi/anti (`Partial`) cardinality: `optimisticJoinSel · L`.
pub fn partial_cardinality(left_card: f64, config: &OptimizerConfig) -> f64 {
    config.optimistic_join_sel * left_card
}

/// `LookupJoin` cardinality: `L·R·sel·optimisticJoinSel`, or `L` when
/// `sel=0` (the lookup is functionally one-to-one with the left side).
pub fn lookup_join_cardinality(left_card: f64, right_card: f64, sel: f64, config: &OptimizerConfig) -> f64 {
    if sel == 0.0 {
        left_card
    } else {
        left_card * right_card * sel * config.optimistic_join_sel
    }
}

/// `ConcatJoin` cardinality: `L · optimisticJoinSel · Σsel` across the
/// disjuncts' individual lookup selectivities.
pub fn concat_join_cardinality(left_card: f64, sels: &[f64], config: &OptimizerConfig) -> f64 {
    let sum_sel: f64 = sels.iter().sum();
    left_card * config.optimistic_join_sel * sum_sel
}

/// Lookup selectivity: `perKeyReduction ^ |keyExprs|`, or exactly `0`
/// when the index is unique and the right side's FDs prove at most one
/// matching row per lookup (spec.md §4.5's `lookupSelectivity`). Per the
/// Open Question in spec.md §9, the `nullRejecting` cross-check the
/// source carries alongside `max1_row` is preserved literally rather
/// than simplified away, even though it may be redundant with it.
pub fn lookup_selectivity(num_keys: usize, unique_index: bool, right_has_max1_row: bool, right_rejects_nulls: bool, config: &OptimizerConfig) -> f64 {
    if unique_index && right_has_max1_row && right_rejects_nulls {
        0.0
    } else {
        config.per_key_reduction.powi(num_keys as i32)
    }
}

/// `Filter` cardinality: `0.75 · child`.
pub fn filter_cardinality(child_card: f64) -> f64 {
    0.75 * child_card
}

/// `Project`/`Distinct` cardinality: both pass the child's cardinality
/// through unchanged (spec.md §4.6).
pub fn project_cardinality(child_card: f64) -> f64 {
    child_card
}

pub fn distinct_cardinality(child_card: f64) -> f64 {
    child_card
}
