//! Join hypergraph construction: edges, conflict rules, subgraph
//! population and equivalence closure (spec.md §4.4 Phases A-B).
//!
//! The enumeration itself (Phase C, DPhyp/DPSube + the fast-DFS
//! fallback) lives in [`dphyp`].

pub mod dphyp;

use crate::common::{ColumnId, Schema, TableId};
use crate::config::OptimizerConfig;
use crate::memo::{
    FilterExpr, JoinBase, JoinType, Memo, ProjectExpr, RelKind, TableScanExpr,
};
use crate::relprops::{ColumnSet, FuncDepSet, RelationalProperties};
use crate::scalar::{self, ScalarRef};
use crate::vertex_set::VertexSet;
use std::collections::HashMap;

/// The opaque logical plan tree handed to the optimizer (spec.md §6).
/// A real host has a much richer tree; the core only needs to walk
/// join/filter/project/source shapes to build the join hypergraph.
pub enum LogicalNode {
    Source {
        table_name: String,
        schema: Schema,
        row_count: Option<f64>,
        strict_keys: Vec<ColumnSet>,
        lax_keys: Vec<ColumnSet>,
        not_null: ColumnSet,
    },
    Join {
        join_type: JoinType,
        filters: Vec<ScalarRef>,
        left: Box<LogicalNode>,
        right: Box<LogicalNode>,
    },
    Filter {
        predicates: Vec<ScalarRef>,
        child: Box<LogicalNode>,
    },
    Project {
        exprs: Vec<ScalarRef>,
        child: Box<LogicalNode>,
    },
}

/// A conflict rule `(from -> to)`: "if the subplan contains any vertex
/// in `from`, it must contain all of `to`" (spec.md §3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictRule {
    pub from: VertexSet,
    pub to: VertexSet,
}

impl ConflictRule {
    pub fn holds(&self, subplan: VertexSet) -> bool {
        !subplan.intersects(self.from) || self.to.is_subset_of(subplan)
    }
}

/// One hyperedge of the join graph (spec.md §3).
#[derive(Debug, Clone)]
pub struct Edge {
    pub op: JoinType,
    pub left_vertices: VertexSet,
    pub right_vertices: VertexSet,
    pub filters: Vec<ScalarRef>,
    pub ses: VertexSet,
    pub tes: VertexSet,
    pub rules: Vec<ConflictRule>,
    pub null_rejected_rels: VertexSet,
}

impl Edge {
    /// Whether this operator may be evaluated with its sides swapped
    /// (spec.md §4.4 Phase C): inner/cross always, outer/semi/anti
    /// never, full outer only when both sides reject nulls
    /// symmetrically (approximated here via `null_rejected_rels`
    /// covering both sides).
    pub fn is_commutative(&self) -> bool {
        match self.op {
            JoinType::Inner | JoinType::Cross => true,
            JoinType::FullOuter => {
                self.left_vertices.is_subset_of(self.null_rejected_rels)
                    && self.right_vertices.is_subset_of(self.null_rejected_rels)
            }
            _ => false,
        }
    }
}

/// The join hypergraph built by `populate_subgraph`/`ensure_closure`.
#[derive(Debug, Default)]
pub struct JoinGraph {
    pub edges: Vec<Edge>,
    /// vertex index (== `TableId`) -> its source group.
    pub vertex_groups: Vec<crate::memo::GroupId>,
}

impl JoinGraph {
    pub fn num_vertices(&self) -> u32 {
        self.vertex_groups.len() as u32
    }

    /// Edges fully contained within `span`.
    pub fn edges_within(&self, span: VertexSet) -> impl Iterator<Item = &Edge> {
        self.edges
            .iter()
            .filter(move |e| e.left_vertices.union(e.right_vertices).is_subset_of(span))
    }
}

struct Builder<'a> {
    memo: &'a mut Memo,
    graph: JoinGraph,
    table_vertex: HashMap<String, TableId>,
    config: &'a OptimizerConfig,
}

/// Phase A: walk the input join tree bottom-up, memoizing source
/// groups and join edges (spec.md §4.4 Phase A).
pub fn populate_subgraph(tree: &LogicalNode, memo: &mut Memo, config: &OptimizerConfig) -> (JoinGraph, crate::memo::GroupId) {
    let mut builder = Builder {
        memo,
        graph: JoinGraph::default(),
        table_vertex: HashMap::new(),
        config,
    };
    let (root, _tables) = builder.build(tree);
    (builder.graph, root)
}

impl<'a> Builder<'a> {
    fn build(&mut self, node: &LogicalNode) -> (crate::memo::GroupId, VertexSet) {
        match node {
            LogicalNode::Source {
                table_name,
                schema,
                row_count,
                strict_keys,
                lax_keys,
                not_null,
            } => {
                if let Some(&vertex) = self.table_vertex.get(table_name) {
                    return (self.graph.vertex_groups[vertex as usize], VertexSet::singleton(vertex));
                }
                let vertex = self.graph.vertex_groups.len() as TableId;
                let fd = FuncDepSet::base(schema.columns.len(), strict_keys.clone(), lax_keys.clone(), *not_null);
                let card = row_count.unwrap_or(self.config.default_table_card);
                let props = RelationalProperties::for_source(schema.clone(), vertex, fd, card);
                let group = self.memo.new_expr_group(
                    RelKind::TableScan(TableScanExpr { table: vertex, table_name: table_name.clone(), schema: schema.clone() }),
                    props,
                    Some(table_name),
                );
                self.table_vertex.insert(table_name.clone(), vertex);
                self.graph.vertex_groups.push(group);
                tracing::debug!(table = %table_name, vertex, "populate_subgraph: source group");
                (group, VertexSet::singleton(vertex))
            }
            LogicalNode::Join { join_type, filters, left, right } => {
                let (left_group, left_vertices) = self.build(left);
                let (right_group, right_vertices) = self.build(right);

                let ses = filters
                    .iter()
                    .fold(VertexSet::empty(), |acc, f| acc.union(f.referenced_tables()));

                let null_rejected_rels = left_vertices
                    .union(right_vertices)
                    .iter()
                    .filter(|&t| filters.iter().any(|f| scalar::rejects_nulls(f.as_ref(), t)))
                    .fold(VertexSet::empty(), |acc, t| acc.add(t));

                let mut rules = Vec::new();
                let mut tes = ses;
                self.compute_conflict_rules(*join_type, left_vertices, right_vertices, null_rejected_rels, &mut rules, &mut tes);

                self.graph.edges.push(Edge {
                    op: *join_type,
                    left_vertices,
                    right_vertices,
                    filters: filters.clone(),
                    ses,
                    tes,
                    rules,
                    null_rejected_rels,
                });

                let left_props = self.memo.group(left_group).props.clone();
                let right_props = self.memo.group(right_group).props.clone();
                let base = JoinBase {
                    join_type: *join_type,
                    filters: filters.clone(),
                    left: left_group,
                    right: right_group,
                };
                let kind = match join_type {
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
                let props = join_props(*join_type, &left_props, &right_props, filters, self.config);
                let out_tables = if join_type.is_partial() { left_vertices } else { left_vertices.union(right_vertices) };
                let group = self.memo.new_expr_group(kind, props, None);
                tracing::debug!(left = %left_group, right = %right_group, op = join_type.name(), "populate_subgraph: join edge");
                (group, out_tables)
            }
            LogicalNode::Filter { predicates, child } => {
                let (child_group, vertices) = self.build(child);
                let child_props = self.memo.group(child_group).props.clone();
                let mut constants = ColumnSet::empty();
                let mut not_null = ColumnSet::empty();
                let mut equi_pairs = Vec::new();
                for p in predicates {
                    if let Some(((lc, _lt), (rc, _rt))) = scalar::as_column_equality(p.as_ref()) {
                        equi_pairs.push((lc as u32, rc as u32));
                    }
                    if let Some(col) = scalar::as_column_literal_equality(p.as_ref()) {
                        constants = constants.add(col as TableId);
                        not_null = not_null.add(col as TableId);
                    }
                    if let Some(col) = scalar::as_not_is_null(p.as_ref()) {
                        not_null = not_null.add(col as TableId);
                    }
                }
                let fd = FuncDepSet::with_filter(&child_props.fd, constants, not_null, &equi_pairs);
                let props = RelationalProperties::for_unary(&child_props, fd, child_props.schema.clone(), crate::card::filter_cardinality(child_props.card));
                let group = self.memo.new_expr_group(
                    RelKind::Filter(FilterExpr { child: child_group, predicates: predicates.clone() }),
                    props,
                    None,
                );
                (group, vertices)
            }
            LogicalNode::Project { exprs, child } => {
                let (child_group, vertices) = self.build(child);
                let child_props = self.memo.group(child_group).props.clone();
                let projected = exprs
                    .iter()
                    .enumerate()
                    .fold(ColumnSet::empty(), |acc, (i, _)| acc.add(i as TableId));
                let fd = FuncDepSet::project(&child_props.fd, projected);
                let group = self.memo.new_expr_group(
                    RelKind::Project(ProjectExpr { child: child_group, exprs: exprs.clone() }),
                    RelationalProperties::for_unary(&child_props, fd, child_props.schema.clone(), child_props.card),
                    None,
                );
                (group, vertices)
            }
        }
    }

    /// Conflict-rule computation for the edge currently being added
    /// (spec.md §4.4 Phase A.3), checked against every edge already
    /// nested inside its span. This implements the paraphrased static
    /// table: inner/cross compose freely; left-outer forbids pulling
    /// its right side out from under an ancestor unless the new join's
    /// filter rejects nulls on that ancestor's far side; full outer
    /// additionally pins its left side; semi/anti behave like
    /// left-outer for this purpose.
    fn compute_conflict_rules(
        &self,
        join_type: JoinType,
        left_vertices: VertexSet,
        right_vertices: VertexSet,
        null_rejected_rels: VertexSet,
        rules: &mut Vec<ConflictRule>,
        tes: &mut VertexSet,
    ) {
        if matches!(join_type, JoinType::Inner | JoinType::Cross) {
            return;
        }
        for anc in self.graph.edges_within(left_vertices) {
            if !null_rejected_rels.is_subset_of(anc.left_vertices.union(anc.right_vertices)) {
                let rule = ConflictRule { from: anc.right_vertices, to: anc.right_vertices.union(right_vertices) };
                *tes = tes.union(rule.to);
                rules.push(rule);
            }
        }
        if matches!(join_type, JoinType::FullOuter) {
            for anc in self.graph.edges_within(right_vertices) {
                let rule = ConflictRule { from: anc.left_vertices, to: anc.left_vertices.union(left_vertices) };
                *tes = tes.union(rule.to);
                rules.push(rule);
            }
        }
    }
}

/// Computes a join's relational properties from its children plus the
/// edge's filter list. `pub(crate)` so [`dphyp`] can derive properties
/// for the variants it memoizes directly from the hypergraph edge it
/// is instantiating, without re-walking the original logical tree.
pub(crate) fn join_props(
    join_type: JoinType,
    left: &RelationalProperties,
    right: &RelationalProperties,
    filters: &[ScalarRef],
    config: &OptimizerConfig,
) -> RelationalProperties {
    let mut equi_pairs = Vec::new();
    for f in filters {
        if let Some(((lc, _), (rc, _))) = scalar::as_column_equality(f.as_ref()) {
            equi_pairs.push((lc as u32, rc as u32));
        }
    }
    let left_cols = left.schema.columns.len();
    let card = crate::card::estimate_join_cardinality(join_type, left.card, right.card, config);
    match join_type {
        JoinType::Inner | JoinType::Cross | JoinType::LateralInner | JoinType::LateralCross => {
            let fd = FuncDepSet::union_inner(&left.fd, &right.fd, left_cols, &equi_pairs);
            let mut schema_cols = left.schema.columns.clone();
            schema_cols.extend(right.schema.columns.clone());
            RelationalProperties::for_inner_join(left, right, fd, Schema::new(String::new(), schema_cols), card)
        }
        JoinType::LeftOuter | JoinType::FullOuter | JoinType::LateralLeft => {
            let fd = FuncDepSet::left_outer(&left.fd, &right.fd, left_cols, &equi_pairs);
            let mut schema_cols = left.schema.columns.clone();
            schema_cols.extend(right.schema.columns.clone());
            RelationalProperties::for_inner_join(left, right, fd, Schema::new(String::new(), schema_cols), card)
        }
        JoinType::Semi | JoinType::Anti => {
            let fd = left.fd.clone();
            RelationalProperties::for_partial_join(left, right, fd, card)
        }
    }
}

/// Phase B: compute the transitive equivalence closure of `col = col`
/// predicates across all base edges, synthesizing a new inner-join
/// edge for every implied equality that connects previously-disjoint
/// vertex groups (spec.md §4.4 Phase B).
pub fn ensure_closure(graph: &mut JoinGraph) {
    let mut uf = ColumnUnionFind::new();
    for edge in &graph.edges {
        for f in &edge.filters {
            if let Some(((lc, lt), (rc, rt))) = scalar::as_column_equality(f.as_ref()) {
                uf.union((lt, lc), (rt, rc));
            }
        }
    }

    let mut connected: HashMap<(TableId, TableId), bool> = HashMap::new();
    for edge in &graph.edges {
        for l in edge.left_vertices.iter() {
            for r in edge.right_vertices.iter() {
                connected.insert((l.min(r), l.max(r)), true);
            }
        }
    }

    let keys: Vec<(TableId, ColumnId)> = uf.keys();
    let mut new_edges = Vec::new();
    for i in 0..keys.len() {
        for j in (i + 1)..keys.len() {
            let (ta, ca) = keys[i];
            let (tb, cb) = keys[j];
            if ta == tb || !uf.same_class((ta, ca), (tb, cb)) {
                continue;
            }
            let pair = (ta.min(tb), ta.max(tb));
            if connected.contains_key(&pair) {
                continue;
            }
            connected.insert(pair, true);
            let left_vertices = VertexSet::singleton(pair.0);
            let right_vertices = VertexSet::singleton(pair.1);
            new_edges.push(Edge {
                op: JoinType::Inner,
                left_vertices,
                right_vertices,
                filters: vec![],
                ses: left_vertices.union(right_vertices),
                tes: left_vertices.union(right_vertices),
                rules: vec![],
                null_rejected_rels: VertexSet::empty(),
            });
            tracing::trace!(a = ta, ca, b = tb, cb, "ensure_closure: synthesized edge");
        }
    }
    graph.edges.extend(new_edges);
}

/// Union-find over `(TableId, ColumnId)` pairs, used only by
/// `ensure_closure` (distinct from `relprops::EquivClasses`, which
/// operates on local per-group column ordinals).
#[derive(Default)]
struct ColumnUnionFind {
    index: HashMap<(TableId, ColumnId), usize>,
    parent: Vec<usize>,
}

impl ColumnUnionFind {
    fn new() -> Self {
        Self::default()
    }

    fn keys(&self) -> Vec<(TableId, ColumnId)> {
        let mut out = vec![(0, 0); self.index.len()];
        for (&k, &i) in &self.index {
            out[i] = k;
        }
        out
    }

    fn id(&mut self, key: (TableId, ColumnId)) -> usize {
        if let Some(&i) = self.index.get(&key) {
            return i;
        }
        let i = self.parent.len();
        self.parent.push(i);
        self.index.insert(key, i);
        i
    }

    fn find(&mut self, key: (TableId, ColumnId)) -> usize {
        let mut x = self.id(key);
        while self.parent[x] != x {
            self.parent[x] = self.parent[self.parent[x]];
            x = self.parent[x];
        }
        x
    }

    fn union(&mut self, a: (TableId, ColumnId), b: (TableId, ColumnId)) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            self.parent[ra] = rb;
        }
    }

    fn same_class(&mut self, a: (TableId, ColumnId), b: (TableId, ColumnId)) -> bool {
        self.find(a) == self.find(b)
    }
}
