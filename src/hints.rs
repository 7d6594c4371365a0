//! Hint parsing (`/*+ ... */`) and application (spec.md §3 `ApplyHint`,
//! §6's hint table).
//!
//! Grounded on `optimizer_pro::hints::HintParser` (the teacher's own
//! Oracle-style `/*+ ... */` scanner: `extract_hint_block`, whitespace
//! tokenizing, unknown-hint tolerance), narrowed to exactly the hint
//! forms spec.md §6 lists. Parsing (`HintSet`, table/column *names*) is
//! kept separate from application (`AppliedHints`, resolved `GroupId`s)
//! per spec.md §4.3: "Hints are applied after the memo is fully
//! populated so they can reference table names resolved to GroupIds."

use crate::common::TableId;
use crate::memo::{GroupId, Memo, RelExpr, RelKind};
use crate::vertex_set::VertexSet;
use std::collections::HashMap;

/// A forced physical/logical join shape for one table pair (spec.md
/// §6's `INNER_JOIN`/`HASH_JOIN`/`MERGE_JOIN`/`LOOKUP_JOIN`/
/// `SEMI_JOIN`/`ANTI_JOIN`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinMethodHint {
    Inner,
    Hash,
    Merge,
    Lookup,
    Semi,
    Anti,
}

/// Parsed hints, still keyed by the table *names* as they appeared in
/// the hint comment — table-name resolution to `GroupId` happens in
/// [`apply_hints`], once the memo exists.
#[derive(Debug, Clone, Default)]
pub struct HintSet {
    /// `JOIN_ORDER(t1, t2, ...)`: the full left-deep order.
    pub join_order: Option<Vec<String>>,
    /// `JOIN_FIXED_ORDER`: disable reordering entirely.
    pub fixed_order: bool,
    /// `INNER_JOIN`/`HASH_JOIN`/.../`ANTI_JOIN(a, b)`, in encounter order.
    pub pair_hints: Vec<(String, String, JoinMethodHint)>,
    /// `NO_ICP`.
    pub no_icp: bool,
    /// `NO_MERGE_JOIN`: disable merge-join variants globally.
    pub no_merge_join: bool,
}

/// Hints resolved against a populated memo: table names become
/// `GroupId`/vertex indices, and hints naming an unknown table are
/// dropped (spec.md §7's `InvalidHint`: recoverable, optimization
/// continues without that hint).
#[derive(Debug, Clone, Default)]
pub struct AppliedHints {
    pub join_order: Option<Vec<TableId>>,
    pub fixed_order: bool,
    /// Keyed by the exact two-vertex span `{a, b}` the hint targets.
    pub pair_hints: HashMap<VertexSet, JoinMethodHint>,
    pub no_icp: bool,
    pub no_merge_join: bool,
    /// Human-readable record of hints dropped as invalid, for
    /// diagnostics and tests (spec.md §7's `InvalidHint`).
    pub dropped: Vec<String>,
}

/// Extracts the `/*+ ... */` block from arbitrary SQL comment text,
/// tokenizes respecting parens (so `JOIN_ORDER(a, b, c)`'s internal
/// commas/spaces don't get split as separate hints), and classifies
/// each token into the spec.md §6 hint table. Unrecognized tokens are
/// skipped silently, as the spec requires.
pub fn parse_hints(comment: &str) -> HintSet {
    let mut out = HintSet::default();
    let Some(body) = extract_hint_block(comment) else { return out };
    for token in tokenize(&body) {
        let (name, args) = split_name_args(&token);
        match name.to_ascii_uppercase().as_str() {
            "JOIN_ORDER" if !args.is_empty() => out.join_order = Some(args),
            "JOIN_FIXED_ORDER" => out.fixed_order = true,
            "INNER_JOIN" => push_pair(&mut out.pair_hints, args, JoinMethodHint::Inner),
            "HASH_JOIN" => push_pair(&mut out.pair_hints, args, JoinMethodHint::Hash),
            "MERGE_JOIN" => push_pair(&mut out.pair_hints, args, JoinMethodHint::Merge),
            "LOOKUP_JOIN" => push_pair(&mut out.pair_hints, args, JoinMethodHint::Lookup),
            "SEMI_JOIN" => push_pair(&mut out.pair_hints, args, JoinMethodHint::Semi),
            "ANTI_JOIN" => push_pair(&mut out.pair_hints, args, JoinMethodHint::Anti),
            "NO_ICP" => out.no_icp = true,
            "NO_MERGE_JOIN" => out.no_merge_join = true,
            _ => {} // unrecognized token inside /*+ ... */: skipped silently (spec.md §6)
        }
    }
    out
}

fn push_pair(pairs: &mut Vec<(String, String, JoinMethodHint)>, args: Vec<String>, hint: JoinMethodHint) {
    // Wrong arity is an InvalidHint (spec.md §7): dropped rather than
    // guessed at.
    if let [a, b] = args.as_slice() {
        pairs.push((a.clone(), b.clone(), hint));
    }
}

fn extract_hint_block(text: &str) -> Option<String> {
    let start = text.find("/*+")?;
    let rest = &text[start + 3..];
    let end = rest.find("*/")?;
    Some(rest[..end].trim().to_string())
}

/// Whitespace-tokenizes `body`, except inside `(...)` so a single hint
/// like `JOIN_ORDER(a, b, c)` survives as one token.
fn tokenize(body: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut depth = 0i32;
    for c in body.chars() {
        match c {
            '(' => {
                depth += 1;
                current.push(c);
            }
            ')' => {
                depth -= 1;
                current.push(c);
            }
            c if c.is_whitespace() && depth == 0 => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

fn split_name_args(token: &str) -> (String, Vec<String>) {
    match token.find('(') {
        Some(open) => {
            let name = token[..open].to_string();
            let close = token.rfind(')').unwrap_or(token.len());
            let inner = &token[open + 1..close];
            let args = inner.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect();
            (name, args)
        }
        None => (token.to_string(), Vec::new()),
    }
}

/// Resolves a parsed [`HintSet`] against a populated memo (spec.md
/// §4.3's `ApplyHint`). A hint referencing a table name absent from
/// the memo is dropped with a `tracing::warn!` (spec.md §7's
/// `InvalidHint`) rather than failing optimization.
pub fn apply_hints(hints: &HintSet, memo: &Memo) -> AppliedHints {
    let mut dropped = Vec::new();

    let join_order = hints.join_order.as_ref().and_then(|names| {
        let mut ids = Vec::with_capacity(names.len());
        for name in names {
            match memo.lookup_table(name) {
                Some(g) => ids.push(g.0),
                None => {
                    dropped.push(format!("JOIN_ORDER: unknown table '{name}'"));
                    return None;
                }
            }
        }
        Some(ids)
    });

    let mut pair_hints = HashMap::new();
    for (a, b, method) in &hints.pair_hints {
        match (memo.lookup_table(a), memo.lookup_table(b)) {
            (Some(ga), Some(gb)) => {
                let span = VertexSet::singleton(ga.0).add(gb.0);
                pair_hints.insert(span, *method);
            }
            _ => dropped.push(format!("{method:?}({a}, {b}): unknown table")),
        }
    }

    for d in &dropped {
        tracing::warn!(hint = %d, "apply_hints: dropping invalid hint");
    }

    AppliedHints {
        join_order,
        fixed_order: hints.fixed_order,
        pair_hints,
        no_icp: hints.no_icp,
        no_merge_join: hints.no_merge_join,
        dropped,
    }
}

fn matches_method(kind: &RelKind, method: JoinMethodHint) -> bool {
    match method {
        JoinMethodHint::Inner => matches!(kind, RelKind::InnerJoin(_)),
        JoinMethodHint::Hash => matches!(kind, RelKind::HashJoin(h) if !h.partial),
        JoinMethodHint::Merge => matches!(kind, RelKind::MergeJoin(_)),
        JoinMethodHint::Lookup => matches!(kind, RelKind::LookupJoin(_)),
        JoinMethodHint::Semi => matches!(kind, RelKind::SemiJoin(_)),
        JoinMethodHint::Anti => matches!(kind, RelKind::AntiJoin(_)),
    }
}

/// The prefix length `k` such that `hinted[..k]`'s tables exactly span
/// `vertex_set`, if any — i.e. whether `vertex_set` is one of the
/// hinted left-deep order's prefixes.
fn join_order_prefix_len(hinted: &[TableId], vertex_set: VertexSet) -> Option<usize> {
    let mut prefix = VertexSet::empty();
    for (k, &t) in hinted.iter().enumerate() {
        prefix = prefix.add(t);
        if prefix == vertex_set {
            return Some(k + 1);
        }
    }
    None
}

/// Whether `expr` continues the hinted left-deep chain at prefix
/// length `k`: for `k == 1`, `expr` must be exactly the source scan of
/// `hinted[0]`; otherwise `expr` must be some join whose right child
/// is exactly `hinted[k-1]` and whose left child spans `hinted[..k-1]`
/// (spec.md §8's "Hint monotonicity": "a `JOIN_ORDER` hint that
/// matches a plan present in the memo produces that plan").
fn satisfies_join_order(memo: &Memo, expr: &RelExpr, hinted: &[TableId], k: usize) -> bool {
    if k == 1 {
        return matches!(&expr.kind, RelKind::TableScan(t) if t.table == hinted[0]);
    }
    let Some(base) = expr.kind.join_base() else { return false };
    let right_span = memo.group(base.right).props.input_tables;
    let left_span = memo.group(base.left).props.input_tables;
    let want_right = VertexSet::singleton(hinted[k - 1]);
    let want_left = hinted[..k - 1].iter().fold(VertexSet::empty(), |acc, &t| acc.add(t));
    right_span == want_right && left_span == want_left
}

/// Whether `expr` (a member of `group_id`) satisfies every hint
/// constraint that applies to `group_id`. Groups no hint constrains
/// trivially satisfy (spec.md §4.7's `updateBest` then degenerates to
/// plain least-cost selection).
pub fn expr_satisfies(memo: &Memo, group_id: GroupId, expr: &RelExpr, hints: &AppliedHints) -> bool {
    let span = memo.group(group_id).props.input_tables;

    if let Some(method) = hints.pair_hints.get(&span) {
        if !matches_method(&expr.kind, *method) {
            return false;
        }
    }
    if let Some(order) = &hints.join_order {
        if let Some(k) = join_order_prefix_len(order, span) {
            if !satisfies_join_order(memo, expr, order, k) {
                return false;
            }
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_join_order_with_internal_commas() {
        let hints = parse_hints("/*+ JOIN_ORDER(a, b, c) */ select 1");
        assert_eq!(hints.join_order, Some(vec!["a".to_string(), "b".to_string(), "c".to_string()]));
    }

    #[test]
    fn parses_multiple_hints_and_skips_unknown_tokens() {
        let hints = parse_hints("/*+ HASH_JOIN(a,b) BOGUS_HINT NO_MERGE_JOIN */");
        assert_eq!(hints.pair_hints, vec![("a".to_string(), "b".to_string(), JoinMethodHint::Hash)]);
        assert!(hints.no_merge_join);
    }

    #[test]
    fn wrong_arity_pair_hint_is_dropped() {
        let hints = parse_hints("/*+ HASH_JOIN(a) */");
        assert!(hints.pair_hints.is_empty());
    }

    #[test]
    fn no_hint_block_yields_default() {
        let hints = parse_hints("select 1");
        assert!(hints.join_order.is_none());
        assert!(!hints.fixed_order);
    }
}
