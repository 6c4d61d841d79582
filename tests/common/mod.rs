//! Shared fixtures: one table group with a coordinator, an 8-way and a
//! 4-way node group.
#![allow(dead_code)]

use std::collections::BTreeMap;

use locus_core::prelude::{DataType, Field, LogicalPlan, PlannerConfig, Result, Schema, SinkTarget};
use locus_planner::physical::{AggPhase, PhysicalNode, PhysicalOp, SortPhase};
use locus_planner::{derive_plan, Catalog, Location, StaticLocationRegistry, TableLayout, TableMeta};

pub fn registry() -> StaticLocationRegistry {
    StaticLocationRegistry::new(vec![
        Location::new("coord", 1).in_group("default").as_single(),
        Location::new("big", 8).in_group("default"),
        Location::new("mid", 4).in_group("default"),
    ])
    .expect("valid registry")
}

pub fn table(name: &str, location: &str, layout: TableLayout) -> TableMeta {
    TableMeta {
        name: name.into(),
        location: location.into(),
        layout,
        hash_columns: Vec::new(),
        hash_function: None,
        hash_params: Vec::new(),
        part_fix_keys: BTreeMap::new(),
    }
}

pub fn hash_table(name: &str, location: &str, cols: &[&str]) -> TableMeta {
    TableMeta {
        hash_columns: cols.iter().map(|c| c.to_string()).collect(),
        ..table(name, location, TableLayout::Hash)
    }
}

pub fn schema(cols: &[&str]) -> Schema {
    Schema::new(
        cols.iter()
            .map(|c| Field::new(*c, DataType::Int64, false))
            .collect(),
    )
}

pub fn scan(table: &str, cols: &[&str]) -> LogicalPlan {
    LogicalPlan::Scan {
        table: table.into(),
        schema: schema(cols),
        predicate: None,
        partitions: None,
    }
}

pub fn to_client(input: LogicalPlan) -> LogicalPlan {
    LogicalPlan::Sink {
        input: Box::new(input),
        target: SinkTarget::Client,
    }
}

pub fn derive(plan: &LogicalPlan, catalog: &Catalog) -> Result<PhysicalNode> {
    derive_with(plan, catalog, &PlannerConfig::default())
}

pub fn derive_with(
    plan: &LogicalPlan,
    catalog: &Catalog,
    config: &PlannerConfig,
) -> Result<PhysicalNode> {
    derive_plan(plan, &registry(), catalog, config)
}

pub fn aggregates(root: &PhysicalNode, phase: AggPhase) -> usize {
    root.find_all(|n| matches!(n.op, PhysicalOp::Aggregate { phase: p, .. } if p == phase))
        .len()
}

pub fn sorts(root: &PhysicalNode, phase: SortPhase) -> usize {
    root.find_all(|n| matches!(n.op, PhysicalOp::Sort { phase: p, .. } if p == phase))
        .len()
}
