//! YAML plan/catalog parsing and end-to-end explain tests

use locus_core::config::PlannerConfig;
use locus_core::error::Error;
use locus_planner::{derive_plan, explain, parse_yaml_catalog, parse_yaml_plan};

const CATALOG: &str = r#"
locations:
  - name: "coord"
    partitions: 1
    single: true
    table_groups: ["default"]
  - name: "big"
    partitions: 8
    table_groups: ["default"]
tables:
  - name: "orders"
    location: "big"
    layout: hash
    hash_columns: ["id"]
  - name: "regions"
    location: "big"
    layout: broadcast
"#;

#[test]
fn test_parse_simple_plan() {
    let yaml = r#"
plan:
  op: sink
  input:
    op: filter
    predicate: "id > 10"
    input:
      op: scan
      table: "orders"
      schema:
        - name: "id"
          type: "Int64"
          nullable: false
        - name: "name"
          type: "Utf8"
          nullable: false
"#;

    let result = parse_yaml_plan(yaml);
    assert!(result.is_ok());
}

#[test]
fn test_parse_plan_with_aggregate() {
    let yaml = r#"
plan:
  op: aggregate
  group_by: ["product"]
  aggs:
    - { func: sum, arg: "quantity", as: "total" }
    - { func: count, as: "n" }
  input:
    op: scan
    table: "sales"
    schema:
      - { name: "product",  type: "Utf8" }
      - { name: "quantity", type: "Int64" }
"#;

    let result = parse_yaml_plan(yaml);
    assert!(result.is_ok());
}

#[test]
fn test_parse_invalid_yaml() {
    let yaml = "invalid: yaml: [";
    let result = parse_yaml_plan(yaml);
    assert!(matches!(result, Err(Error::Parse(_))));
}

#[test]
fn test_parse_missing_op_field() {
    let yaml = r#"
plan:
  table: "orders"
  schema: []
"#;

    let result = parse_yaml_plan(yaml);
    assert!(result.is_err());
}

#[test]
fn test_parse_unknown_aggregate() {
    let yaml = r#"
plan:
  op: aggregate
  aggs: [ { func: median, arg: "x", as: "m" } ]
  input: { op: values, schema: [ { name: "x", type: "Int64" } ] }
"#;

    assert!(parse_yaml_plan(yaml).is_err());
}

#[test]
fn test_parse_bad_predicate() {
    let yaml = r#"
plan:
  op: filter
  predicate: "id >"
  input: { op: values, schema: [ { name: "id", type: "Int64" } ] }
"#;

    assert!(matches!(parse_yaml_plan(yaml), Err(Error::Parse(_))));
}

#[test]
fn test_parse_catalog_rejects_duplicate_locations() {
    let yaml = r#"
locations:
  - { name: "a", partitions: 2 }
  - { name: "a", partitions: 4 }
"#;

    assert!(matches!(parse_yaml_catalog(yaml), Err(Error::Catalog(_))));
}

#[test]
fn test_explain_join_with_broadcast_table() {
    let yaml = r#"
plan:
  op: sink
  input:
    op: join
    left_keys: ["region"]
    right_keys: ["rid"]
    left:
      op: scan
      table: "orders"
      schema:
        - { name: "id",     type: "Int64" }
        - { name: "region", type: "Int64" }
    right:
      op: scan
      table: "regions"
      schema:
        - { name: "rid",  type: "Int64" }
        - { name: "name", type: "Utf8" }
"#;

    let parsed = parse_yaml_plan(yaml).unwrap();
    let (registry, catalog) = parse_yaml_catalog(CATALOG).unwrap();
    let root = derive_plan(&parsed.plan, &registry, &catalog, &PlannerConfig::default()).unwrap();

    let text = explain(&root);
    let lines: Vec<&str> = text.lines().collect();
    assert!(lines[0].starts_with("Sink client"));
    assert!(lines[1].trim_start().starts_with("Exchange singleton"));
    assert!(lines[2].trim_start().starts_with("HashJoin Inner [region] = [rid]"));
    assert_eq!(root.exchanges().len(), 1);
}

#[test]
fn test_explain_limit_pushdown() {
    let yaml = r#"
plan:
  op: sort
  offset: 3
  fetch: 5
  input:
    op: project
    columns: ["id AS key"]
    input:
      op: scan
      table: "orders"
      schema: [ { name: "id", type: "Int64" } ]
"#;

    let parsed = parse_yaml_plan(yaml).unwrap();
    let (registry, catalog) = parse_yaml_catalog(CATALOG).unwrap();
    let root = derive_plan(&parsed.plan, &registry, &catalog, &PlannerConfig::default()).unwrap();
    let text = explain(&root);
    assert!(text.contains("cap=8 offset=3"));
    assert!(!text.contains("Sort"));
    assert!(text.contains("Hash[key@0](8, murmur3)"));
}

#[test]
fn test_document_config_forces_single_location() {
    let yaml = r#"
config:
  force_single_location: true
plan:
  op: aggregate
  group_by: ["name"]
  input:
    op: scan
    table: "orders"
    schema:
      - { name: "id",   type: "Int64" }
      - { name: "name", type: "Utf8" }
"#;

    let parsed = parse_yaml_plan(yaml).unwrap();
    let (registry, catalog) = parse_yaml_catalog(CATALOG).unwrap();
    let mut config = PlannerConfig::default();
    parsed.config.apply(&mut config);
    let root = derive_plan(&parsed.plan, &registry, &catalog, &config).unwrap();
    assert_eq!(root.location.name, "coord");
}
