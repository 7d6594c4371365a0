//! The memo: a forest of equivalence groups holding every logically
//! equivalent plan discovered by exploration (spec.md §3, §4.3).
//!
//! Groups and expressions are arena-indexed (`GroupId`/`RelExprId`)
//! rather than linked by pointer — per spec.md §9's design note, cross-
//! group references become `Vec` indices owned by the `Memo`, and a
//! group's "linked list of variants" becomes a `Vec<RelExprId>` where
//! prepend is `insert(0, ...)`.

use crate::common::{ColumnId, IndexId, Schema, TableId};
use crate::relprops::RelationalProperties;
use crate::scalar::ScalarRef;
use std::collections::HashMap;
use std::fmt;

/// Monotonic identifier for an equivalence group, assigned at creation.
/// For source (table-scan) groups, `TableId = GroupId - 1` (spec.md §3);
/// the memo assigns these in the same order `populate_subgraph` visits
/// leaves, so the two indexings agree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupId(pub u32);

impl fmt::Display for GroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "G{}", self.0 + 1)
    }
}

/// Arena index for one `RelExpr` payload, global across the memo (not
/// scoped to a single group).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RelExprId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    Inner,
    Cross,
    LeftOuter,
    FullOuter,
    Semi,
    Anti,
    LateralInner,
    LateralLeft,
    LateralCross,
}

impl JoinType {
    /// Whether the join's result is visible-output restricted to the
    /// left side only (semi/anti joins never expose the right side's
    /// columns, per spec.md §4.2).
    pub fn is_partial(self) -> bool {
        matches!(self, JoinType::Semi | JoinType::Anti)
    }

    pub fn name(self) -> &'static str {
        match self {
            JoinType::Inner => "innerjoin",
            JoinType::Cross => "crossjoin",
            JoinType::LeftOuter => "leftjoin",
            JoinType::FullOuter => "fullouterjoin",
            JoinType::Semi => "semijoin",
            JoinType::Anti => "antijoin",
            JoinType::LateralInner => "lateralinnerjoin",
            JoinType::LateralLeft => "lateralleftjoin",
            JoinType::LateralCross => "lateralcrossjoin",
        }
    }
}

/// Common join payload, embedded by value in every join variant so that
/// prepending a new physical sibling never aliases another expression's
/// slot in the group (spec.md §3's `Copy()` note).
#[derive(Debug, Clone)]
pub struct JoinBase {
    pub join_type: JoinType,
    pub filters: Vec<ScalarRef>,
    pub left: GroupId,
    pub right: GroupId,
}

impl JoinBase {
    pub fn copy(&self) -> JoinBase {
        self.clone()
    }
}

/// One key position of a `Lookup`: the probe expression and whether
/// that index prefix column admits NULLs.
#[derive(Debug, Clone)]
pub struct LookupKey {
    pub expr: ScalarRef,
    pub nullable: bool,
}

/// Physical-access payload for a lookup join: an index handle plus one
/// key expression per index prefix column.
#[derive(Debug, Clone)]
pub struct Lookup {
    pub index: IndexId,
    pub keys: Vec<LookupKey>,
    /// Whether `index` is declared unique in the catalog — feeds
    /// `Carder::lookup_selectivity`'s `sel=0` special case (spec.md §4.5).
    pub unique: bool,
}

/// A half-open or closed range over a single index, used by merge-join
/// index scans.
#[derive(Debug, Clone)]
pub struct RangeBound {
    pub expr: ScalarRef,
    pub closed: bool,
}

#[derive(Debug, Clone)]
pub struct IndexScan {
    pub index: IndexId,
    pub low: Option<RangeBound>,
    pub high: Option<RangeBound>,
}

/// Physical-access payload for a range-heap join: either an index or an
/// explicit sort expression on each side, plus the value/min/max column
/// references and boundary-closure flags.
#[derive(Debug, Clone)]
pub struct RangeHeap {
    pub value_index: Option<IndexId>,
    pub value_sort: Option<ScalarRef>,
    pub min_index: Option<IndexId>,
    pub min_sort: Option<ScalarRef>,
    pub value_col: ScalarRef,
    pub min_col: ScalarRef,
    pub max_col: ScalarRef,
    pub min_closed: bool,
    pub max_closed: bool,
}

#[derive(Debug, Clone)]
pub struct TableScanExpr {
    pub table: TableId,
    pub table_name: String,
    pub schema: Schema,
}

#[derive(Debug, Clone)]
pub struct TableAliasExpr {
    pub child: GroupId,
    pub alias: String,
}

#[derive(Debug, Clone)]
pub struct ValuesExpr {
    pub row_count: usize,
    pub schema: Schema,
}

#[derive(Debug, Clone)]
pub struct SubqueryAliasExpr {
    pub child: GroupId,
    pub alias: String,
}

#[derive(Debug, Clone)]
pub struct Max1RowExpr {
    pub child: GroupId,
}

#[derive(Debug, Clone)]
pub struct TableFuncExpr {
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct RecursiveCteExpr {
    pub anchor: GroupId,
    pub recursive: GroupId,
}

#[derive(Debug, Clone)]
pub struct ProjectExpr {
    pub child: GroupId,
    pub exprs: Vec<ScalarRef>,
}

#[derive(Debug, Clone)]
pub struct DistinctExpr {
    pub child: GroupId,
}

#[derive(Debug, Clone)]
pub struct FilterExpr {
    pub child: GroupId,
    pub predicates: Vec<ScalarRef>,
}

#[derive(Debug, Clone)]
pub struct HashJoinExpr {
    pub base: JoinBase,
    pub left_keys: Vec<ScalarRef>,
    pub right_keys: Vec<ScalarRef>,
    /// Set for semi/anti partial variants costed by `costPartial`.
    pub partial: bool,
}

#[derive(Debug, Clone)]
pub struct MergeJoinExpr {
    pub base: JoinBase,
    pub left_index: IndexScan,
    pub right_index: IndexScan,
    /// Top-level comparator operands are swapped (`=`,`<`,`≤` become
    /// `=`,`>`,`≥`) when the filter was written in the opposite order.
    pub swap_cmp: bool,
}

#[derive(Debug, Clone)]
pub struct LookupJoinExpr {
    pub base: JoinBase,
    pub lookup: Lookup,
}

#[derive(Debug, Clone)]
pub struct ConcatJoinExpr {
    pub base: JoinBase,
    pub lookups: Vec<Lookup>,
}

#[derive(Debug, Clone)]
pub struct RangeHeapJoinExpr {
    pub base: JoinBase,
    pub range_heap: RangeHeap,
}

/// The closed set of relational expression shapes (spec.md §3). A
/// tagged union rather than a trait object per spec.md §9's design
/// note: coster/carder/exec-builder dispatch is a single `match`.
#[derive(Debug, Clone)]
pub enum RelKind {
    TableScan(TableScanExpr),
    TableAlias(TableAliasExpr),
    Values(ValuesExpr),
    RecursiveTable(TableScanExpr),
    SubqueryAlias(SubqueryAliasExpr),
    Max1Row(Max1RowExpr),
    TableFunc(TableFuncExpr),
    RecursiveCte(RecursiveCteExpr),
    EmptyTable,
    Project(ProjectExpr),
    Distinct(DistinctExpr),
    Filter(FilterExpr),
    InnerJoin(JoinBase),
    CrossJoin(JoinBase),
    LeftJoin(JoinBase),
    FullOuterJoin(JoinBase),
    SemiJoin(JoinBase),
    AntiJoin(JoinBase),
    HashJoin(HashJoinExpr),
    MergeJoin(MergeJoinExpr),
    LookupJoin(LookupJoinExpr),
    ConcatJoin(ConcatJoinExpr),
    RangeHeapJoin(RangeHeapJoinExpr),
    LateralCrossJoin(JoinBase),
    LateralInnerJoin(JoinBase),
    LateralLeftJoin(JoinBase),
}

impl RelKind {
    /// Child groups this expression directly references, in display
    /// order (used by the memo dump and the exec builder).
    pub fn children(&self) -> Vec<GroupId> {
        match self {
            RelKind::TableScan(_)
            | RelKind::RecursiveTable(_)
            | RelKind::Values(_)
            | RelKind::TableFunc(_)
            | RelKind::EmptyTable => vec![],
            RelKind::TableAlias(e) => vec![e.child],
            RelKind::SubqueryAlias(e) => vec![e.child],
            RelKind::Max1Row(e) => vec![e.child],
            RelKind::RecursiveCte(e) => vec![e.anchor, e.recursive],
            RelKind::Project(e) => vec![e.child],
            RelKind::Distinct(e) => vec![e.child],
            RelKind::Filter(e) => vec![e.child],
            RelKind::InnerJoin(b)
            | RelKind::CrossJoin(b)
            | RelKind::LeftJoin(b)
            | RelKind::FullOuterJoin(b)
            | RelKind::SemiJoin(b)
            | RelKind::AntiJoin(b)
            | RelKind::LateralCrossJoin(b)
            | RelKind::LateralInnerJoin(b)
            | RelKind::LateralLeftJoin(b) => vec![b.left, b.right],
            RelKind::HashJoin(e) => vec![e.base.left, e.base.right],
            RelKind::MergeJoin(e) => vec![e.base.left, e.base.right],
            RelKind::LookupJoin(e) => vec![e.base.left, e.base.right],
            RelKind::ConcatJoin(e) => vec![e.base.left, e.base.right],
            RelKind::RangeHeapJoin(e) => vec![e.base.left, e.base.right],
        }
    }

    pub fn join_base(&self) -> Option<&JoinBase> {
        match self {
            RelKind::InnerJoin(b)
            | RelKind::CrossJoin(b)
            | RelKind::LeftJoin(b)
            | RelKind::FullOuterJoin(b)
            | RelKind::SemiJoin(b)
            | RelKind::AntiJoin(b)
            | RelKind::LateralCrossJoin(b)
            | RelKind::LateralInnerJoin(b)
            | RelKind::LateralLeftJoin(b) => Some(b),
            RelKind::HashJoin(e) => Some(&e.base),
            RelKind::MergeJoin(e) => Some(&e.base),
            RelKind::LookupJoin(e) => Some(&e.base),
            RelKind::ConcatJoin(e) => Some(&e.base),
            RelKind::RangeHeapJoin(e) => Some(&e.base),
            _ => None,
        }
    }

    /// Short operator tag used by the memo dump (spec.md §6).
    pub fn tag(&self) -> &'static str {
        match self {
            RelKind::TableScan(_) => "tablescan",
            RelKind::TableAlias(_) => "tablealias",
            RelKind::Values(_) => "values",
            RelKind::RecursiveTable(_) => "recursivetable",
            RelKind::SubqueryAlias(_) => "subqueryalias",
            RelKind::Max1Row(_) => "max1row",
            RelKind::TableFunc(_) => "tablefunc",
            RelKind::RecursiveCte(_) => "recursivecte",
            RelKind::EmptyTable => "emptytable",
            RelKind::Project(_) => "project",
            RelKind::Distinct(_) => "distinct",
            RelKind::Filter(_) => "filter",
            RelKind::InnerJoin(_) => "innerjoin",
            RelKind::CrossJoin(_) => "crossjoin",
            RelKind::LeftJoin(_) => "leftjoin",
            RelKind::FullOuterJoin(_) => "fullouterjoin",
            RelKind::SemiJoin(_) => "semijoin",
            RelKind::AntiJoin(_) => "antijoin",
            RelKind::HashJoin(_) => "hashjoin",
            RelKind::MergeJoin(_) => "mergejoin",
            RelKind::LookupJoin(_) => "lookupjoin",
            RelKind::ConcatJoin(_) => "concatjoin",
            RelKind::RangeHeapJoin(_) => "rangeheapjoin",
            RelKind::LateralCrossJoin(_) => "lateralcrossjoin",
            RelKind::LateralInnerJoin(_) => "lateralinnerjoin",
            RelKind::LateralLeftJoin(_) => "lateralleftjoin",
        }
    }
}

/// One member of a relational equivalence group.
#[derive(Debug, Clone)]
pub struct RelExpr {
    pub group: GroupId,
    pub kind: RelKind,
    /// Set once `optimize_group` costs this specific member.
    pub cost: Option<f64>,
    /// True for a variant that already produces distinct output from
    /// sorted children, letting search skip the extra hash-distinct
    /// sub-cost (spec.md §4.7).
    pub sorted_distinct: bool,
}

/// One equivalence group (spec.md §3).
#[derive(Debug, Clone)]
pub struct ExprGroup {
    pub id: GroupId,
    /// Variants, most-recently-prepended first.
    pub members: Vec<RelExprId>,
    pub props: RelationalProperties,
    pub best: Option<RelExprId>,
    pub cost: Option<f64>,
    pub done: bool,
    pub hint_ok: bool,
}

/// The memo: owns every group and every expression payload for exactly
/// one optimization run (spec.md §5 — never shared across threads).
#[derive(Debug, Default)]
pub struct Memo {
    groups: Vec<ExprGroup>,
    exprs: Vec<RelExpr>,
    table_groups: HashMap<String, GroupId>,
    /// `requiresDistinct`/scalar-subtree members are out of scope for
    /// this baseline (spec.md §9's thinner Memo ABI); only relational
    /// groups are represented.
    next_column_id: ColumnId,
}

impl Memo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn group(&self, id: GroupId) -> &ExprGroup {
        &self.groups[id.0 as usize]
    }

    pub fn group_mut(&mut self, id: GroupId) -> &mut ExprGroup {
        &mut self.groups[id.0 as usize]
    }

    pub fn expr(&self, id: RelExprId) -> &RelExpr {
        &self.exprs[id.0 as usize]
    }

    pub fn expr_mut(&mut self, id: RelExprId) -> &mut RelExpr {
        &mut self.exprs[id.0 as usize]
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    pub fn groups(&self) -> impl Iterator<Item = &ExprGroup> {
        self.groups.iter()
    }

    pub fn lookup_table(&self, name: &str) -> Option<GroupId> {
        self.table_groups.get(name).copied()
    }

    /// Allocates a fresh group and seeds it with `kind`. If `kind` is a
    /// source relation, records `table_name -> GroupId` for dedup
    /// (spec.md §2's "Deduplicates source relations by table name").
    pub fn new_expr_group(&mut self, kind: RelKind, props: RelationalProperties, table_name: Option<&str>) -> GroupId {
        let group_id = GroupId(self.groups.len() as u32);
        let expr_id = RelExprId(self.exprs.len() as u32);
        self.exprs.push(RelExpr {
            group: group_id,
            kind,
            cost: None,
            sorted_distinct: false,
        });
        self.groups.push(ExprGroup {
            id: group_id,
            members: vec![expr_id],
            props,
            best: None,
            cost: None,
            done: false,
            hint_ok: false,
        });
        if let Some(name) = table_name {
            self.table_groups.entry(name.to_string()).or_insert(group_id);
        }
        tracing::trace!(group = %group_id, "new_expr_group");
        group_id
    }

    /// If `target` is `Some`, prepends `kind` into that group's member
    /// list so it is explored before the group's existing variants
    /// (spec.md §3's lifecycle note); otherwise allocates a new group.
    /// `JoinBase::copy()` is the caller's responsibility before
    /// constructing `kind`, so two variants sharing a base never alias
    /// each other's member slot.
    pub fn memoize(&mut self, target: Option<GroupId>, kind: RelKind, props: RelationalProperties) -> GroupId {
        match target {
            Some(group_id) => {
                let expr_id = RelExprId(self.exprs.len() as u32);
                self.exprs.push(RelExpr {
                    group: group_id,
                    kind,
                    cost: None,
                    sorted_distinct: false,
                });
                let group = self.group_mut(group_id);
                group.members.insert(0, expr_id);
                tracing::trace!(group = %group_id, "memoize: prepended variant");
                group_id
            }
            None => self.new_expr_group(kind, props, None),
        }
    }

    pub fn alloc_column_id(&mut self) -> ColumnId {
        let id = self.next_column_id;
        self.next_column_id += 1;
        id
    }

    /// Drops every member across the whole memo for which `keep`
    /// returns false, unless doing so would empty a group (a group
    /// left with no members can never be costed, so a hint that would
    /// veto every variant of a group is treated as inapplicable to
    /// that group rather than breaking it). Used to implement the
    /// `NO_MERGE_JOIN` hint (spec.md §6) ahead of search.
    pub fn retain_members<F: Fn(&RelKind) -> bool>(&mut self, keep: F) {
        let exprs = &self.exprs;
        for group in &mut self.groups {
            let filtered: Vec<RelExprId> = group.members.iter().copied().filter(|&id| keep(&exprs[id.0 as usize].kind)).collect();
            if !filtered.is_empty() {
                group.members = filtered;
            }
        }
    }
}

impl fmt::Display for Memo {
    /// Canonical debug dump (spec.md §6):
    /// ```text
    /// memo:
    /// ├── G1: (tablescan: a)
    /// ├── G2: (tablescan: b)
    /// ├── G3: (innerjoin 2 1) (innerjoin 1 2)
    /// ```
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "memo:")?;
        let last = self.groups.len().saturating_sub(1);
        for (idx, group) in self.groups.iter().enumerate() {
            let branch = if idx == last { "└──" } else { "├──" };
            write!(f, "{branch} {}: ", group.id)?;
            let parts: Vec<String> = group
                .members
                .iter()
                .map(|&eid| {
                    let expr = self.expr(eid);
                    let children: Vec<String> = expr.kind.children().iter().map(|g| format!("{}", g.0 + 1)).collect();
                    let marker = if Some(eid) == group.best { "*" } else { "" };
                    if children.is_empty() {
                        format!("({}{}){}", expr.kind.tag(), table_suffix(&expr.kind), marker)
                    } else {
                        format!("({} {}){}", expr.kind.tag(), children.join(" "), marker)
                    }
                })
                .collect();
            writeln!(f, "{}", parts.join(" "))?;
        }
        Ok(())
    }
}

fn table_suffix(kind: &RelKind) -> String {
    match kind {
        RelKind::TableScan(t) | RelKind::RecursiveTable(t) => format!(": {}", t.table_name),
        _ => String::new(),
    }
}
