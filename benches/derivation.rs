use criterion::{criterion_group, criterion_main, Criterion};
use locus_core::config::PlannerConfig;
use locus_core::dag::{AggFunc, AggregateCall, BuildSide, JoinAlgorithm, JoinType, LogicalPlan, SinkTarget};
use locus_core::schema::{DataType, Field, Schema};
use locus_planner::{derive_plan, Catalog, Location, StaticLocationRegistry, TableLayout, TableMeta};

fn make_registry() -> StaticLocationRegistry {
    let mut locations = vec![Location::new("coord", 1).in_group("default").as_single()];
    for (i, n) in [4usize, 8, 16, 32].iter().enumerate() {
        locations.push(Location::new(format!("group-{i}"), *n).in_group("default"));
    }
    StaticLocationRegistry::new(locations).unwrap()
}

fn make_catalog(tables: usize) -> Catalog {
    (0..tables).fold(Catalog::new(), |c, i| {
        c.with_table(TableMeta {
            name: format!("t{i}"),
            location: format!("group-{}", i % 4),
            layout: TableLayout::Hash,
            hash_columns: vec!["id".into()],
            hash_function: None,
            hash_params: vec![],
            part_fix_keys: Default::default(),
        })
    })
}

fn scan(i: usize) -> LogicalPlan {
    LogicalPlan::Scan {
        table: format!("t{i}"),
        schema: Schema::new(vec![
            Field::new("id", DataType::Int64, false),
            Field::new(format!("v{i}"), DataType::Int64, true),
        ]),
        predicate: None,
        partitions: None,
    }
}

/// Left-deep join chain over `tables` scans, aggregated and sent to the client.
fn make_join_chain(tables: usize) -> LogicalPlan {
    let joined = (1..tables).fold(scan(0), |acc, i| LogicalPlan::Join {
        left: Box::new(acc),
        right: Box::new(scan(i)),
        algorithm: JoinAlgorithm::Hash,
        join_type: JoinType::Inner,
        left_keys: vec!["id".into()],
        right_keys: vec!["id".into()],
        build_side: BuildSide::Right,
        broadcast_build: false,
        condition: None,
    });
    LogicalPlan::Sink {
        input: Box::new(LogicalPlan::Aggregate {
            input: Box::new(joined),
            group_by: vec!["v0".into()],
            aggs: vec![AggregateCall::new(AggFunc::Count, None, "n")],
            assume_input_grouped: false,
        }),
        target: SinkTarget::Client,
    }
}

fn make_union(branches: usize) -> LogicalPlan {
    let inputs = (0..branches)
        .map(|i| LogicalPlan::Project {
            input: Box::new(scan(i)),
            exprs: vec![
                (locus_core::types::Expr::col("id"), "id".into()),
                (locus_core::types::Expr::col(format!("v{i}")), "v".into()),
            ],
        })
        .collect();
    LogicalPlan::Sink {
        input: Box::new(LogicalPlan::Union { inputs, all: true }),
        target: SinkTarget::Table("t0".into()),
    }
}

fn bench_join_chain(c: &mut Criterion) {
    let registry = make_registry();
    let catalog = make_catalog(16);
    let config = PlannerConfig::default();
    let plan = make_join_chain(16);
    c.bench_function("derive_join_chain_16", |b| {
        b.iter(|| {
            let _ = derive_plan(&plan, &registry, &catalog, &config).unwrap();
        })
    });
}

fn bench_pending_union(c: &mut Criterion) {
    let registry = make_registry();
    let catalog = make_catalog(32);
    let config = PlannerConfig::default();
    let plan = make_union(32);
    c.bench_function("derive_union_32", |b| {
        b.iter(|| {
            let _ = derive_plan(&plan, &registry, &catalog, &config).unwrap();
        })
    });
}

criterion_group!(benches, bench_join_chain, bench_pending_union);
criterion_main!(benches);
