//! Single-stage versus PARTIAL → exchange → FINAL aggregation.

mod common;

use common::*;
use locus_core::dag::{AggFunc, AggregateCall, LogicalPlan};
use locus_core::types::Expr;
use locus_planner::physical::{AggPhase, ExchangeKind, PhysicalOp};
use locus_planner::{Catalog, DistributionKind, HashField, TableLayout};

fn aggregate(input: LogicalPlan, group_by: &[&str], aggs: Vec<AggregateCall>) -> LogicalPlan {
    LogicalPlan::Aggregate {
        input: Box::new(input),
        group_by: group_by.iter().map(|k| k.to_string()).collect(),
        aggs,
        assume_input_grouped: false,
    }
}

fn sum(arg: &str, alias: &str) -> AggregateCall {
    AggregateCall::new(AggFunc::Sum, Some(arg), alias)
}

fn catalog() -> Catalog {
    let mut regions = table("regions", "big", TableLayout::Random);
    regions.part_fix_keys.insert("region".into(), "geo".into());
    Catalog::new()
        .with_table(hash_table("orders", "big", &["id"]))
        .with_table(table("clicks", "big", TableLayout::Random))
        .with_table(regions)
}

fn orders() -> LogicalPlan {
    scan("orders", &["id", "region", "amount"])
}

#[test]
fn keys_covering_hash_fields_aggregate_in_place() {
    let plan = aggregate(orders(), &["id", "region"], vec![sum("amount", "total")]);
    let root = derive(&plan, &catalog()).unwrap();
    assert!(root.exchanges().is_empty());
    assert_eq!(aggregates(&root, AggPhase::Single), 1);
    assert_eq!(aggregates(&root, AggPhase::Partial), 0);
    assert_eq!(root.distribution.hash_fields(), &[HashField::new(0, "id")]);
}

#[test]
fn disjoint_keys_split_around_one_hash_exchange() {
    let plan = aggregate(orders(), &["region"], vec![sum("amount", "total")]);
    let root = derive(&plan, &catalog()).unwrap();
    assert_eq!(aggregates(&root, AggPhase::Partial), 1);
    assert_eq!(aggregates(&root, AggPhase::Final), 1);
    assert_eq!(aggregates(&root, AggPhase::Single), 0);

    let exchanges = root.exchanges();
    assert_eq!(exchanges.len(), 1);
    match &exchanges[0].op {
        PhysicalOp::Exchange { kind, keys, .. } => {
            assert_eq!(*kind, ExchangeKind::Hash);
            assert_eq!(keys, &vec!["region".to_string()]);
        }
        other => panic!("expected exchange, got {}", other.label()),
    }
    assert_eq!(root.distribution.kind(), DistributionKind::HashDistributed);
    assert_eq!(root.distribution.hash_fields(), &[HashField::new(0, "region")]);
    assert_eq!(root.location.name, "big");
}

#[test]
fn global_aggregate_gathers_to_single_location() {
    let plan = aggregate(
        orders(),
        &[],
        vec![AggregateCall::new(AggFunc::Count, None, "n")],
    );
    let root = derive(&plan, &catalog()).unwrap();
    assert_eq!(aggregates(&root, AggPhase::Partial), 1);
    assert_eq!(aggregates(&root, AggPhase::Final), 1);
    assert_eq!(root.location.name, "coord");
    assert!(root.distribution.is_single_partition());
}

#[test]
fn avg_splits_into_sum_and_count() {
    let plan = aggregate(
        orders(),
        &["region"],
        vec![AggregateCall::new(AggFunc::Avg, Some("amount"), "mean")],
    );
    let root = derive(&plan, &catalog()).unwrap();
    let partial = root.find_all(|n| {
        matches!(
            n.op,
            PhysicalOp::Aggregate {
                phase: AggPhase::Partial,
                ..
            }
        )
    });
    let PhysicalOp::Aggregate { aggs, .. } = &partial[0].op else {
        panic!("expected aggregate");
    };
    let aliases: Vec<_> = aggs.iter().map(|a| a.alias.as_str()).collect();
    assert_eq!(aliases, vec!["mean$sum", "mean$count"]);
    assert_eq!(root.schema.names(), vec!["region", "mean"]);
}

#[test]
fn distinct_call_skips_partial_stage() {
    let mut call = AggregateCall::new(AggFunc::Count, Some("amount"), "n");
    call.distinct = true;
    let plan = aggregate(orders(), &["region"], vec![call]);
    let root = derive(&plan, &catalog()).unwrap();
    assert_eq!(aggregates(&root, AggPhase::Partial), 0);
    assert_eq!(aggregates(&root, AggPhase::Single), 1);
    assert_eq!(root.exchanges().len(), 1);
}

#[test]
fn filter_alias_counts_as_group_key() {
    let filtered = LogicalPlan::Filter {
        input: Box::new(orders()),
        predicate: Expr::eq(Expr::col("id"), Expr::col("region")),
    };
    let plan = aggregate(filtered, &["region"], vec![sum("amount", "total")]);
    let root = derive(&plan, &catalog()).unwrap();
    assert!(root.exchanges().is_empty());
    assert_eq!(aggregates(&root, AggPhase::Single), 1);
}

#[test]
fn part_fix_scheme_on_group_key_avoids_shuffle() {
    let plan = aggregate(
        scan("regions", &["region", "amount"]),
        &["region"],
        vec![sum("amount", "total")],
    );
    let root = derive(&plan, &catalog()).unwrap();
    assert!(root.exchanges().is_empty());
}

#[test]
fn assumed_grouping_needs_keyed_input() {
    let keyed = LogicalPlan::Aggregate {
        input: Box::new(orders()),
        group_by: vec!["region".into()],
        aggs: vec![sum("amount", "total")],
        assume_input_grouped: true,
    };
    let root = derive(&keyed, &catalog()).unwrap();
    assert!(root.exchanges().is_empty());

    let random = LogicalPlan::Aggregate {
        input: Box::new(scan("clicks", &["region", "amount"])),
        group_by: vec!["region".into()],
        aggs: vec![sum("amount", "total")],
        assume_input_grouped: true,
    };
    let root = derive(&random, &catalog()).unwrap();
    assert_eq!(root.exchanges().len(), 1);
}

#[test]
fn pass_through_call_keeps_key_identity() {
    let mut same = AggregateCall::new(AggFunc::AnyValue, Some("id"), "same");
    same.pass_through_constant = true;
    let agg = aggregate(orders(), &["id"], vec![same]);
    let plan = LogicalPlan::Project {
        input: Box::new(agg),
        exprs: vec![(Expr::col("same"), "same".into())],
    };
    let root = derive(&plan, &catalog()).unwrap();
    assert_eq!(root.distribution.hash_fields(), &[HashField::new(0, "same")]);
}

#[test]
fn unknown_group_key_is_rejected() {
    let plan = aggregate(orders(), &["nope"], vec![]);
    assert!(derive(&plan, &catalog()).is_err());
}
