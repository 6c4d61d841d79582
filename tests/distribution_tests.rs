//! Scans, projections and filters: how hash keys and part-fix keys follow
//! columns through the plan.

mod common;

use common::*;
use locus_core::config::PlannerConfig;
use locus_core::dag::LogicalPlan;
use locus_core::error::Error;
use locus_core::types::{Expr, Scalar};
use locus_planner::physical::PhysicalOp;
use locus_planner::{Catalog, DistributionKind, HashField, PartFixTag, TableLayout};

fn orders() -> Catalog {
    Catalog::new().with_table(hash_table("orders", "big", &["a"]))
}

fn project(input: LogicalPlan, exprs: Vec<(Expr, &str)>) -> LogicalPlan {
    LogicalPlan::Project {
        input: Box::new(input),
        exprs: exprs.into_iter().map(|(e, n)| (e, n.to_string())).collect(),
    }
}

#[test]
fn scan_takes_table_layout_and_location() {
    let root = derive(&scan("orders", &["a", "b"]), &orders()).unwrap();
    assert_eq!(root.location.name, "big");
    assert_eq!(root.distribution.kind(), DistributionKind::HashDistributed);
    assert_eq!(root.distribution.partition_count(), 8);
    assert_eq!(root.distribution.hash_fields(), &[HashField::new(0, "a")]);
    assert!(root.exchanges().is_empty());
}

#[test]
fn rename_keeps_hash_key_under_new_name() {
    let plan = project(scan("orders", &["a", "c"]), vec![(Expr::col("a"), "b")]);
    let root = derive(&plan, &orders()).unwrap();
    assert_eq!(root.distribution.kind(), DistributionKind::HashDistributed);
    assert_eq!(root.distribution.hash_fields(), &[HashField::new(0, "b")]);
}

#[test]
fn reordering_projection_moves_key_position() {
    let plan = project(
        scan("orders", &["a", "c"]),
        vec![(Expr::col("c"), "c"), (Expr::col("a"), "a")],
    );
    let root = derive(&plan, &orders()).unwrap();
    assert_eq!(root.distribution.hash_fields(), &[HashField::new(1, "a")]);
}

#[test]
fn dropping_hash_key_degrades_to_random() {
    let plan = project(scan("orders", &["a", "c"]), vec![(Expr::col("c"), "c")]);
    let root = derive(&plan, &orders()).unwrap();
    assert_eq!(root.distribution.kind(), DistributionKind::RandomDistributed);
    assert_eq!(root.distribution.partition_count(), 8);
}

#[test]
fn filter_equality_aliases_key() {
    let plan = LogicalPlan::Filter {
        input: Box::new(scan("orders", &["a", "b"])),
        predicate: Expr::eq(Expr::col("a"), Expr::col("b")),
    };
    let root = derive(&plan, &orders()).unwrap();
    assert!(root.distribution.key_matches(0, "b"));

    // The alias lets a projection keep only `b` without losing the key.
    let plan = project(plan, vec![(Expr::col("b"), "b")]);
    let root = derive(&plan, &orders()).unwrap();
    assert_eq!(root.distribution.hash_fields(), &[HashField::new(0, "b")]);
}

#[test]
fn filter_on_literal_pins_column() {
    let plan = LogicalPlan::Filter {
        input: Box::new(scan("orders", &["a", "region"])),
        predicate: Expr::eq(Expr::col("region"), Expr::lit(Scalar::I64(7))),
    };
    let root = derive(&plan, &orders()).unwrap();
    assert_eq!(
        root.distribution.part_fix_keys().get("region"),
        Some(&PartFixTag::Constant("7".into()))
    );
}

#[test]
fn scheme_tag_survives_literal_filter() {
    let mut meta = table("events", "big", TableLayout::Random);
    meta.part_fix_keys.insert("region".into(), "geo".into());
    let catalog = Catalog::new().with_table(meta);
    let plan = LogicalPlan::Filter {
        input: Box::new(scan("events", &["id", "region"])),
        predicate: Expr::eq(Expr::col("region"), Expr::lit(Scalar::I64(3))),
    };
    let root = derive(&plan, &catalog).unwrap();
    assert_eq!(root.distribution.scheme_of("region"), Some("geo"));
}

#[test]
fn scan_records_scanned_partitions() {
    let plan = LogicalPlan::Scan {
        table: "orders".into(),
        schema: schema(&["a"]),
        predicate: None,
        partitions: Some(vec![1, 5]),
    };
    let root = derive(&plan, &orders()).unwrap();
    let scanned = root.distribution.table_partitions().get("orders").unwrap();
    assert_eq!(scanned.as_ref().map(|s| s.len()), Some(2));
}

#[test]
fn partition_id_out_of_range_is_plan_error() {
    let plan = LogicalPlan::Scan {
        table: "orders".into(),
        schema: schema(&["a"]),
        predicate: None,
        partitions: Some(vec![8]),
    };
    assert!(matches!(derive(&plan, &orders()), Err(Error::Plan(_))));
}

#[test]
fn unknown_table_is_catalog_error() {
    let err = derive(&scan("nope", &["a"]), &orders()).unwrap_err();
    assert!(matches!(err, Error::Catalog(_)));
}

#[test]
fn unknown_predicate_column_is_rejected() {
    let plan = LogicalPlan::Filter {
        input: Box::new(scan("orders", &["a"])),
        predicate: Expr::eq(Expr::col("zzz"), Expr::lit(Scalar::I64(1))),
    };
    assert!(derive(&plan, &orders()).is_err());
}

#[test]
fn empty_table_group_is_config_error() {
    let config = PlannerConfig {
        table_group: " ".into(),
        ..PlannerConfig::default()
    };
    let err = derive_with(&scan("orders", &["a"]), &orders(), &config).unwrap_err();
    assert!(matches!(err, Error::Config(_)));
}

#[test]
fn every_node_matches_its_location() {
    let plan = to_client(project(
        scan("orders", &["a", "c"]),
        vec![(Expr::col("c"), "c")],
    ));
    let root = derive(&plan, &orders()).unwrap();
    root.walk(&mut |n| {
        assert_eq!(n.distribution.partition_count(), n.location.partition_count);
    });
    assert!(matches!(root.op, PhysicalOp::Sink { .. }));
}

#[test]
fn derivation_is_deterministic() {
    let plan = to_client(project(scan("orders", &["a", "c"]), vec![(Expr::col("a"), "b")]));
    let a = derive(&plan, &orders()).unwrap();
    let b = derive(&plan, &orders()).unwrap();
    assert_eq!(a.fingerprint().unwrap(), b.fingerprint().unwrap());
}
