//! Optimizer-wide tunables: cost-model constants and the DPhyp/fast-DFS
//! vertex threshold.
//!
//! Grounded on `optimizer_pro::{OptimizerConfig, CostParameters}` — the
//! teacher threads one `CostParameters` through `CostModel`/
//! `PlanGenerator`; this crate does the same, narrowed to exactly the
//! constants spec.md §4.5 names (the teacher's richer `CostParameters`
//! also carries network/parallel-execution costs this optimizer core
//! has no use for, since it never touches distributed execution).

use crate::join_order::dphyp::DEFAULT_FAST_DFS_THRESHOLD;

/// The cost-model constants from spec.md §4.5, plus the selectivity
/// constant shared with the carder (§4.6) and the DP-vs-fast-DFS
/// vertex threshold (§4.4 Phase C).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OptimizerConfig {
    pub cpu: f64,
    pub seq_io: f64,
    pub rand_io: f64,
    pub mem: f64,
    pub concat_factor: f64,
    pub degenerate_penalty: f64,
    pub optimistic_join_sel: f64,
    pub bias_factor: f64,
    pub per_key_reduction: f64,
    /// Row count assumed for a table scan when the stats provider has
    /// no data for that table (spec.md §4.5's TableScan fallback, also
    /// reused as the `Carder`'s `TableScan` fallback, §4.6).
    pub default_table_card: f64,
    /// Vertex count above which `dp_sube` falls back to fast-DFS
    /// reordering (spec.md §4.4 Phase C "Fast path").
    pub fast_dfs_threshold: u32,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            cpu: 0.01,
            seq_io: 1.0,
            rand_io: 2.0,
            mem: 2.0,
            concat_factor: 0.75,
            degenerate_penalty: 2.0,
            optimistic_join_sel: 0.10,
            bias_factor: 1e5,
            per_key_reduction: 0.5,
            default_table_card: 1000.0,
            fast_dfs_threshold: DEFAULT_FAST_DFS_THRESHOLD,
        }
    }
}
