// DPhyp/DPSube enumeration performance across growing join-chain widths.
// Times the whole populate_subgraph -> ensure_closure -> dp_sube pipeline
// (spec.md §4.4 Phases A-C), since enumeration cost is the optimizer's
// worst-case-exponential piece the fast-DFS threshold exists to bound.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use joinopt_core::common::{ColumnDef, DataType, Schema};
use joinopt_core::config::OptimizerConfig;
use joinopt_core::join_order::dphyp::dp_sube;
use joinopt_core::join_order::{self, LogicalNode};
use joinopt_core::memo::{JoinType, Memo};
use joinopt_core::relprops::ColumnSet;
use joinopt_core::scalar::testutil::Scalar;

fn chain(width: usize) -> LogicalNode {
    fn source(name: String) -> LogicalNode {
        LogicalNode::Source {
            table_name: name.clone(),
            schema: Schema::new(name, vec![ColumnDef::new("c0".to_string(), DataType::Integer)]),
            row_count: Some(1000.0),
            strict_keys: vec![],
            lax_keys: vec![],
            not_null: ColumnSet::empty(),
        }
    }

    let mut tree = source("t0".to_string());
    for i in 1..width {
        tree = LogicalNode::Join {
            join_type: JoinType::Inner,
            filters: vec![Scalar::eq(Scalar::col(0, (i - 1) as u32), Scalar::col(0, i as u32))],
            left: Box::new(tree),
            right: Box::new(source(format!("t{i}"))),
        };
    }
    tree
}

fn bench_dp_sube_over_chain_width(c: &mut Criterion) {
    let mut group = c.benchmark_group("dp_sube_chain");

    for width in [4usize, 8, 12, 16] {
        group.bench_with_input(BenchmarkId::from_parameter(width), &width, |b, &width| {
            let tree = chain(width);
            let config = OptimizerConfig::default();
            b.iter(|| {
                let mut memo = Memo::new();
                let (mut graph, _root) = join_order::populate_subgraph(&tree, &mut memo, &config);
                join_order::ensure_closure(&mut graph);
                let (root, _used_fallback) = dp_sube(&graph, &mut memo, &config, false);
                black_box(root);
            });
        });
    }

    group.finish();
}

fn bench_fast_dfs_fallback(c: &mut Criterion) {
    c.bench_function("fast_dfs_wide_chain", |b| {
        let tree = chain(24);
        let config = OptimizerConfig { fast_dfs_threshold: 18, ..OptimizerConfig::default() };
        b.iter(|| {
            let mut memo = Memo::new();
            let (mut graph, _root) = join_order::populate_subgraph(&tree, &mut memo, &config);
            join_order::ensure_closure(&mut graph);
            let (root, used_fallback) = dp_sube(&graph, &mut memo, &config, false);
            black_box((root, used_fallback));
        });
    });
}

criterion_group!(benches, bench_dp_sube_over_chain_width, bench_fast_dfs_fallback);
criterion_main!(benches);
