//! Phase C: DPhyp/DPSube enumeration over connected subsets of the join
//! hypergraph, plus the fast-DFS fallback (spec.md §4.4 Phase C).
//!
//! Grounded in the real DPhyp implementation's `emit_csg` /
//! `enumerate_csg_rec` / `emit_csg_cmp` / `enumerate_cmp_rec` four-function
//! recursive structure (Databend's `hyper_dp::dphyp`), generalized here
//! with conflict-rule evaluation and the non-inner join algebra the
//! Databend source doesn't need (it only ever reorders inner/cross
//! joins). Subset membership is driven off `VertexSet` rather than a
//! sorted `Vec<IndexType>`, since the whole point of the bitmap is O(1)
//! union/subset/neighbor tests.

use crate::config::OptimizerConfig;
use crate::join_order::{ConflictRule, Edge, JoinGraph};
use crate::memo::{GroupId, JoinBase, JoinType, Memo, RelKind};
use crate::vertex_set::VertexSet;
use std::collections::HashMap;

/// Vertex-count threshold above which `dp_sube` hands off to the
/// DFS-based greedy fallback (spec.md §4.4 Phase C "Fast path").
pub const DEFAULT_FAST_DFS_THRESHOLD: u32 = 18;

/// One DP-table entry: the group representing a connected vertex
/// subset, plus the edge(s) that produced it (for re-deriving the
/// join base when the same subset is reached from multiple splits).
struct DpEntry {
    group: GroupId,
}

pub struct DpSube<'a> {
    memo: &'a mut Memo,
    graph: &'a JoinGraph,
    config: &'a OptimizerConfig,
    /// subset -> best-known group for that connected subset.
    table: HashMap<VertexSet, DpEntry>,
    used_fast_dfs: bool,
}

/// Runs Phase C over `graph`, seeded with `graph.vertex_groups` as the
/// singleton subsets, returning the group for the full vertex set (the
/// root join order) plus whether the fast-DFS fallback engaged.
/// `force_fast_dfs` lets a caller (or a `JOIN_FIXED_ORDER` hint sitting
/// upstream) skip straight to the linear fallback regardless of size.
pub fn dp_sube(graph: &JoinGraph, memo: &mut Memo, config: &OptimizerConfig, force_fast_dfs: bool) -> (GroupId, bool) {
    let mut dp = DpSube {
        memo,
        graph,
        config,
        table: HashMap::new(),
        used_fast_dfs: false,
    };
    dp.seed_singletons();

    let full = VertexSet::full(graph.num_vertices());
    let use_fast = force_fast_dfs || graph.num_vertices() > config.fast_dfs_threshold;
    if use_fast {
        dp.used_fast_dfs = true;
        tracing::warn!(vertices = graph.num_vertices(), "dp_sube: falling back to fast-DFS reordering");
        dp.fast_dfs(full);
    } else {
        dp.solve();
    }

    let root = dp
        .table
        .get(&full)
        .map(|e| e.group)
        .unwrap_or_else(|| graph.vertex_groups[0]);
    (root, dp.used_fast_dfs)
}

impl<'a> DpSube<'a> {
    fn seed_singletons(&mut self) {
        for (idx, &group) in self.graph.vertex_groups.iter().enumerate() {
            let vs = VertexSet::singleton(idx as u32);
            self.table.insert(vs, DpEntry { group });
        }
    }

    /// Standard DPhyp traversal: pick every vertex as an enumeration
    /// start (descending order, matching the grounding source), emit
    /// it as a subgraph, then recursively enlarge.
    fn solve(&mut self) {
        let n = self.graph.num_vertices();
        for start in (0..n).rev() {
            let nodes = VertexSet::singleton(start);
            self.emit_csg(nodes);
            let forbidden = VertexSet::full(start);
            self.enumerate_csg_rec(nodes, forbidden);
        }
    }

    /// Neighbors of `nodes` not in `forbidden`: vertices reachable by
    /// some edge whose `tes` is covered by `nodes ∪ {candidate}` once
    /// the edge also has its other side fully inside `nodes`. This
    /// mirrors the source's `QueryGraph::neighbors`, generalized to
    /// check every edge (not just equi-join edges) and to respect each
    /// edge's conflict rules via `tes` rather than a plain adjacency
    /// list.
    fn neighbors(&self, nodes: VertexSet, forbidden: VertexSet) -> Vec<u32> {
        let mut out = VertexSet::empty();
        for edge in &self.graph.edges {
            let span = edge.left_vertices.union(edge.right_vertices);
            if !edge.tes.is_subset_of(nodes.union(span)) {
                continue;
            }
            // at least one side must already be covered, and the edge's
            // far side is the candidate neighborhood to pull in.
            if edge.left_vertices.is_subset_of(nodes) && !edge.right_vertices.is_subset_of(nodes) {
                out = out.union(edge.right_vertices.difference(nodes));
            } else if edge.right_vertices.is_subset_of(nodes) && !edge.left_vertices.is_subset_of(nodes) {
                out = out.union(edge.left_vertices.difference(nodes));
            }
        }
        out.difference(forbidden).iter().collect()
    }

    /// Whether `left`/`right` (both connected subsets) are joinable by
    /// some edge, returning the edges eligible for the combined
    /// subplan (conflict rules checked against `left ∪ right`).
    fn connecting_edges(&self, left: VertexSet, right: VertexSet) -> Vec<&'a Edge> {
        let span = left.union(right);
        self.graph
            .edges
            .iter()
            .filter(|e| {
                let e_span = e.left_vertices.union(e.right_vertices);
                if !e.tes.is_subset_of(span) {
                    return false;
                }
                let direct = e.left_vertices.is_subset_of(left) && e.right_vertices.is_subset_of(right);
                let swapped = e.is_commutative() && e.left_vertices.is_subset_of(right) && e.right_vertices.is_subset_of(left);
                if !direct && !swapped {
                    return false;
                }
                let _ = e_span;
                e.rules.iter().all(|r: &ConflictRule| r.holds(span))
            })
            .collect()
    }

    fn emit_csg(&mut self, nodes: VertexSet) {
        if nodes == VertexSet::full(self.graph.num_vertices()) {
            return;
        }
        let forbidden = VertexSet::full(nodes.lowest().unwrap_or(0)).union(nodes);
        let neighbors = self.neighbors(nodes, forbidden);
        for &neighbor in neighbors.iter().rev() {
            let neighbor_set = VertexSet::singleton(neighbor);
            if !self.connecting_edges(nodes, neighbor_set).is_empty() {
                self.emit_csg_cmp(nodes, neighbor_set);
            }
            self.enumerate_cmp_rec(nodes, neighbor_set, forbidden);
        }
    }

    fn enumerate_csg_rec(&mut self, nodes: VertexSet, forbidden: VertexSet) {
        let neighbors = self.neighbors(nodes, forbidden);
        if neighbors.is_empty() {
            return;
        }
        let mut merged_sets = Vec::with_capacity(neighbors.len());
        for &neighbor in &neighbors {
            let merged = nodes.union(VertexSet::singleton(neighbor));
            if self.table.contains_key(&merged) && merged.size() > nodes.size() {
                self.emit_csg(merged);
            }
            merged_sets.push(merged);
        }
        let mut new_forbidden = forbidden;
        for (idx, &neighbor) in neighbors.iter().enumerate() {
            new_forbidden = new_forbidden.add(neighbor);
            self.enumerate_csg_rec(merged_sets[idx], new_forbidden);
        }
    }

    fn emit_csg_cmp(&mut self, left: VertexSet, right: VertexSet) {
        let edges = self.connecting_edges(left, right);
        if edges.is_empty() {
            return;
        }
        let left_group = match self.table.get(&left) {
            Some(e) => e.group,
            None => return,
        };
        let right_group = match self.table.get(&right) {
            Some(e) => e.group,
            None => return,
        };
        let parent = left.union(right);

        // Each distinct join_type among the connecting edges produces
        // its own candidate variant in the same group, so a pair of
        // subsets legitimately joinable by both a left-outer edge and
        // (via closure) an inner edge sees both as alternatives.
        let mut target: Option<GroupId> = self.table.get(&parent).map(|e| e.group);
        for edge in edges {
            let filters = edge.filters.clone();
            let op = edge.op;
            // honor the edge's natural orientation: if the edge was
            // recorded left->right but our DP split put it in the
            // opposite slot, swap which DP subset plays which role.
            let (dp_left_group, dp_right_group) = if edge.left_vertices.is_subset_of(left) {
                (left_group, right_group)
            } else {
                (right_group, left_group)
            };
            let base = JoinBase {
                join_type: op,
                filters,
                left: dp_left_group,
                right: dp_right_group,
            };
            let kind = match op {
                JoinType::Inner => RelKind::InnerJoin(base),
                JoinType::Cross => RelKind::CrossJoin(base),
                JoinType::LeftOuter => RelKind::LeftJoin(base),
                JoinType::FullOuter => RelKind::FullOuterJoin(base),
                JoinType::Semi => RelKind::SemiJoin(base),
                JoinType::Anti => RelKind::AntiJoin(base),
                JoinType::LateralInner => RelKind::LateralInnerJoin(base),
                JoinType::LateralLeft => RelKind::LateralLeftJoin(base),
                JoinType::LateralCross => RelKind::LateralCrossJoin(base),
            };
            let left_props = self.memo.group(dp_left_group).props.clone();
            let right_props = self.memo.group(dp_right_group).props.clone();
            let props = crate::join_order::join_props(op, &left_props, &right_props, &edge.filters, self.config);
            target = Some(self.memo.memoize(target, kind, props));
        }
        if let Some(group) = target {
            self.table.insert(parent, DpEntry { group });
        }
    }

    fn enumerate_cmp_rec(&mut self, left: VertexSet, right: VertexSet, forbidden: VertexSet) {
        let neighbors = self.neighbors(right, forbidden);
        if neighbors.is_empty() {
            return;
        }
        let mut merged_sets = Vec::with_capacity(neighbors.len());
        for &neighbor in &neighbors {
            let merged = right.union(VertexSet::singleton(neighbor));
            if merged.size() > right.size() && self.table.contains_key(&merged) && !self.connecting_edges(left, merged).is_empty() {
                self.emit_csg_cmp(left, merged);
            }
            merged_sets.push(merged);
        }
        let mut new_forbidden = forbidden;
        for (idx, &neighbor) in neighbors.iter().enumerate() {
            new_forbidden = new_forbidden.add(neighbor);
            self.enumerate_cmp_rec(left, merged_sets[idx], new_forbidden);
        }
    }

    /// Linear-in-tree-size greedy fallback for wide join trees: walks
    /// vertices in ascending order, left-deep-joining each new vertex
    /// onto the running subplan via whatever edge connects it, never
    /// considering bushy plans across the boundary (spec.md §4.4 "Fast
    /// path").
    fn fast_dfs(&mut self, full: VertexSet) {
        let mut current = VertexSet::singleton(0);
        for v in full.iter().skip(1) {
            let next = VertexSet::singleton(v);
            if !self.table.contains_key(&next) {
                continue;
            }
            if !self.connecting_edges(current, next).is_empty() {
                self.emit_csg_cmp(current, next);
            } else {
                // no direct edge: synthesize a cross join so the fallback
                // always produces *some* left-deep plan for the full tree.
                let left_group = self.table.get(&current).unwrap().group;
                let right_group = self.table.get(&next).unwrap().group;
                let left_props = self.memo.group(left_group).props.clone();
                let right_props = self.memo.group(right_group).props.clone();
                let base = JoinBase { join_type: JoinType::Cross, filters: vec![], left: left_group, right: right_group };
                let props = crate::join_order::join_props(JoinType::Cross, &left_props, &right_props, &[], self.config);
                let group = self.memo.memoize(None, RelKind::CrossJoin(base), props);
                self.table.insert(current.union(next), DpEntry { group });
            }
            current = current.union(next);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::join_order::{populate_subgraph, ensure_closure, LogicalNode};
    use crate::scalar::testutil::Scalar;
    use crate::common::{ColumnDef, DataType, Schema};
    use crate::relprops::ColumnSet;
    use crate::config::OptimizerConfig;

    fn source(name: &str) -> LogicalNode {
        LogicalNode::Source {
            table_name: name.to_string(),
            schema: Schema::new(name.to_string(), vec![ColumnDef::new("c0".into(), DataType::Integer)]),
            row_count: Some(100.0),
            strict_keys: vec![],
            lax_keys: vec![],
            not_null: ColumnSet::empty(),
        }
    }

    fn chain(names: &[&str]) -> LogicalNode {
        let mut iter = names.iter();
        let first = *iter.next().unwrap();
        let mut tree = source(first);
        let mut prev_table = 0u32;
        for (i, &name) in iter.enumerate() {
            let next_table = (i + 1) as u32;
            tree = LogicalNode::Join {
                join_type: JoinType::Inner,
                filters: vec![Scalar::eq(Scalar::col(0, prev_table), Scalar::col(0, next_table))],
                left: Box::new(tree),
                right: Box::new(source(name)),
            };
            prev_table = next_table;
        }
        tree
    }

    #[test]
    fn four_way_chain_enumerates_every_connected_split() {
        let tree = chain(&["a", "b", "c", "d"]);
        let mut memo = Memo::new();
        let config = OptimizerConfig::default();
        let (mut graph, _root) = populate_subgraph(&tree, &mut memo, &config);
        ensure_closure(&mut graph);
        let (root, used_fallback) = dp_sube(&graph, &mut memo, &config, false);
        assert!(!used_fallback);
        assert_eq!(memo.group(root).props.output_tables, VertexSet::full(4));
        // every reachable 2..4-vertex connected subset should have a group
        assert!(memo.group_count() >= 4 + 3 /* base joins */);
    }

    #[test]
    fn fast_dfs_engages_above_threshold() {
        let names: Vec<String> = (0..5).map(|i| format!("t{i}")).collect();
        let refs: Vec<&str> = names.iter().map(|s| s.as_str()).collect();
        let tree = chain(&refs);
        let mut memo = Memo::new();
        let config = OptimizerConfig { fast_dfs_threshold: 2, ..OptimizerConfig::default() };
        let (mut graph, _root) = populate_subgraph(&tree, &mut memo, &config);
        ensure_closure(&mut graph);
        let (_root, used_fallback) = dp_sube(&graph, &mut memo, &config, false);
        assert!(used_fallback);
    }
}
