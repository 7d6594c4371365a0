//! joinopt-core: a cost-based join order optimization core for a SQL
//! query engine (spec.md §1-2).
//!
//! The crate owns exactly one concern: given a logical join tree plus
//! the catalog/statistics collaborators a host database already has,
//! choose a join order and physical join strategy and hand back a
//! physical plan. Parsing, binding, and execution are the host's job.
//!
//! [`optimize`] runs the whole pipeline in one call:
//!
//! 1. [`join_order::populate_subgraph`] builds a join hypergraph over
//!    the logical tree, seeding the memo with one group per source
//!    relation (spec.md §4.4 Phase A).
//! 2. [`join_order::ensure_closure`] closes the hypergraph's edges
//!    under transitive equi-join equalities (spec.md §4.4 Phase B).
//! 3. [`join_order::dphyp::dp_sube`] enumerates connected subgraph
//!    pairs bottom-up (DPhyp/DPSube), falling back to a greedy DFS
//!    order above `config.fast_dfs_threshold` vertices or when
//!    `JOIN_FIXED_ORDER` is hinted (spec.md §4.4 Phase C).
//! 4. [`physical::expand_physical`] prepends hash/merge/lookup/concat/
//!    range-heap physical variants onto every eligible logical join
//!    (spec.md §4.4 Phase D).
//! 5. [`hints::apply_hints`] resolves any `/*+ ... */` comment hints
//!    against the now-populated memo (spec.md §4.3).
//! 6. [`search::optimize_root`] costs every group bottom-up, picking a
//!    single best member per group under the hint-aware tie-break
//!    (spec.md §4.7).
//! 7. [`exec::build_best_plan`] materializes the winning plan in the
//!    executor's node dialect (spec.md §4.8).

pub mod card;
pub mod common;
pub mod config;
pub mod cost;
pub mod error;
pub mod exec;
pub mod hints;
pub mod join_order;
pub mod memo;
pub mod physical;
pub mod relprops;
pub mod scalar;
pub mod search;
pub mod vertex_set;

pub use error::{OptimizerError, Result};

use config::OptimizerConfig;
use exec::PhysicalPlan;
use join_order::LogicalNode;
use memo::{GroupId, Memo, RelKind};
use physical::IndexCatalog;

/// Runs the full pipeline and materializes the winning physical plan
/// (spec.md §2's top-level contract). `hint_comment`, if present, is
/// the raw SQL comment text that may contain a `/*+ ... */` block.
pub fn optimize(tree: &LogicalNode, indexes: &IndexCatalog, config: &OptimizerConfig, hint_comment: Option<&str>) -> Result<PhysicalPlan> {
    let (memo, root) = optimize_to_memo(tree, indexes, config, hint_comment)?;
    exec::build_best_plan(&memo, root, indexes)
}

/// Runs every pipeline stage through search, stopping short of
/// materializing a physical plan. Exposed separately because the memo
/// itself — its `Display` dump (spec.md §6) and per-group costs — is
/// what tests and debugging tools want to inspect, independent of
/// whether exec-building later succeeds.
pub fn optimize_to_memo(tree: &LogicalNode, indexes: &IndexCatalog, config: &OptimizerConfig, hint_comment: Option<&str>) -> Result<(Memo, GroupId)> {
    let mut memo = Memo::new();
    let (mut graph, _) = join_order::populate_subgraph(tree, &mut memo, config);
    join_order::ensure_closure(&mut graph);

    let hint_set = hint_comment.map(hints::parse_hints).unwrap_or_default();
    let (root, _used_fast_dfs) = join_order::dphyp::dp_sube(&graph, &mut memo, config, hint_set.fixed_order);

    physical::expand_physical(&mut memo, indexes);

    let applied = hint_comment.map(|_| hints::apply_hints(&hint_set, &memo));
    // NO_ICP has no effect: this crate generates no index-condition-
    // pushdown candidates to gate in the first place, so the hint is
    // recognized (parsing never treats it as invalid) and otherwise inert.
    if applied.as_ref().is_some_and(|h| h.no_merge_join) {
        memo.retain_members(|kind| !matches!(kind, RelKind::MergeJoin(_)));
    }

    search::optimize_root(&mut memo, root, config, applied.as_ref(), None);
    Ok((memo, root))
}
