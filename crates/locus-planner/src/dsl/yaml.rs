//! YAML → LogicalPlan parser. Plans are trees: every operator names its
//! inputs inline.
//!
//! Example:
//! ```yaml
//! config:
//!   table_group: "default"
//! plan:
//!   op: sink
//!   target: client
//!   input:
//!     op: aggregate
//!     group_by: ["region"]
//!     aggs:
//!       - { func: sum, arg: "amount", as: "total" }
//!     input:
//!       op: scan
//!       table: "orders"
//!       predicate: "status = 'open'"
//!       schema:
//!         - { name: "id",     type: "Int64" }
//!         - { name: "region", type: "Utf8" }
//!         - { name: "amount", type: "Float64", nullable: true }
//!         - { name: "status", type: "Utf8" }
//! ```
//!
//! The catalog document lists Locations and table placement:
//! ```yaml
//! locations:
//!   - { name: "coord", partitions: 1, single: true, table_groups: ["default"] }
//!   - { name: "big",   partitions: 8, table_groups: ["default"] }
//! tables:
//!   - { name: "orders", location: "big", layout: hash, hash_columns: ["id"] }
//! ```

use serde::{Deserialize, Serialize};

use locus_core::config::PlannerConfig;
use locus_core::dag::{
    AggFunc, AggregateCall, BuildSide, JoinAlgorithm, JoinType, LogicalPlan, SinkTarget,
    TableFunctionMode,
};
use locus_core::error::{Error, Result};
use locus_core::schema::{DataType, Field, Schema};

use super::expr::{parse_expr, parse_projection, parse_sort_key};
use crate::catalog::{Catalog, TableMeta};
use crate::location::{Location, StaticLocationRegistry};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanDocument {
    #[serde(default)]
    pub config: Option<ConfigOverrides>,
    pub plan: Node,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "op")]
pub enum Node {
    Scan {
        table: String,
        schema: Vec<FieldDef>,
        #[serde(default)]
        predicate: Option<String>,
        #[serde(default)]
        partitions: Option<Vec<u32>>,
    },

    Values {
        schema: Vec<FieldDef>,
        #[serde(default)]
        rows: usize,
    },

    Filter {
        predicate: String,
        input: Box<Node>,
    },

    Project {
        /// `expr [AS name]`
        columns: Vec<String>,
        input: Box<Node>,
    },

    Join {
        #[serde(default = "default_algorithm")]
        algorithm: String,
        #[serde(rename = "type", default = "default_join_type")]
        join_type: String,
        #[serde(default)]
        left_keys: Vec<String>,
        #[serde(default)]
        right_keys: Vec<String>,
        #[serde(default = "default_build")]
        build: String,
        #[serde(default)]
        broadcast: bool,
        #[serde(default)]
        condition: Option<String>,
        left: Box<Node>,
        right: Box<Node>,
    },

    Aggregate {
        #[serde(default)]
        group_by: Vec<String>,
        #[serde(default)]
        aggs: Vec<AggDef>,
        #[serde(default)]
        assume_grouped: bool,
        input: Box<Node>,
    },

    Sort {
        #[serde(default)]
        order: Vec<String>,
        #[serde(default)]
        offset: Option<u64>,
        #[serde(default)]
        fetch: Option<u64>,
        input: Box<Node>,
    },

    Union {
        #[serde(default = "default_true")]
        all: bool,
        inputs: Vec<Node>,
    },

    TableFunction {
        name: String,
        #[serde(default)]
        args: Vec<String>,
        schema: Vec<FieldDef>,
        #[serde(default = "default_mode")]
        mode: String,
        #[serde(default)]
        pass_through: Vec<String>,
        #[serde(default)]
        input: Option<Box<Node>>,
    },

    Sink {
        /// `client`, or a table name via `table:`.
        #[serde(default)]
        table: Option<String>,
        input: Box<Node>,
    },
}

fn default_algorithm() -> String {
    "hash".into()
}

fn default_join_type() -> String {
    "inner".into()
}

fn default_build() -> String {
    "right".into()
}

fn default_mode() -> String {
    "per_partition".into()
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDef {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
    #[serde(default)]
    pub nullable: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggDef {
    pub func: String,
    #[serde(default)]
    pub arg: Option<String>,
    #[serde(rename = "as")]
    pub alias: String,
    #[serde(default)]
    pub distinct: bool,
    /// Output is the group-constant value of `arg`.
    #[serde(default)]
    pub pass_through: bool,
}

/// Optional `config:` block; unset fields leave the base config alone.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConfigOverrides {
    pub table_group: Option<String>,
    pub enable_part_fix_key_colocation: Option<bool>,
    pub force_single_location: Option<bool>,
    pub default_hash_function: Option<String>,
}

impl ConfigOverrides {
    pub fn apply(&self, cfg: &mut PlannerConfig) {
        if let Some(g) = &self.table_group {
            cfg.table_group = g.clone();
        }
        if let Some(v) = self.enable_part_fix_key_colocation {
            cfg.enable_part_fix_key_colocation = v;
        }
        if let Some(v) = self.force_single_location {
            cfg.force_single_location = v;
        }
        if let Some(f) = &self.default_hash_function {
            cfg.default_hash_function = f.clone();
        }
    }
}

#[derive(Debug, Clone)]
pub struct ParsedPlan {
    pub plan: LogicalPlan,
    pub config: ConfigOverrides,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogDocument {
    pub locations: Vec<Location>,
    #[serde(default)]
    pub tables: Vec<TableMeta>,
}

fn parse_dtype(s: &str) -> Result<DataType> {
    Ok(match s {
        "Boolean" | "bool" => DataType::Boolean,
        "Int32" | "i32" => DataType::Int32,
        "Int64" | "i64" => DataType::Int64,
        "Float32" | "f32" => DataType::Float32,
        "Float64" | "f64" => DataType::Float64,
        "Utf8" | "string" => DataType::Utf8,
        "Binary" | "bytes" => DataType::Binary,
        "Date64" | "date" => DataType::Date64,
        "Decimal128" | "decimal" => DataType::Decimal128,
        other => return Err(Error::Parse(format!("unknown type '{other}'"))),
    })
}

fn to_schema(fields: &[FieldDef]) -> Result<Schema> {
    let fields = fields
        .iter()
        .map(|f| Ok(Field::new(f.name.clone(), parse_dtype(&f.data_type)?, f.nullable)))
        .collect::<Result<Vec<_>>>()?;
    Ok(Schema::new(fields))
}

fn parse_join_type(s: &str) -> Result<JoinType> {
    Ok(match s {
        "inner" => JoinType::Inner,
        "left" => JoinType::Left,
        "right" => JoinType::Right,
        "full" => JoinType::Full,
        "semi" => JoinType::Semi,
        "anti" => JoinType::Anti,
        other => return Err(Error::Parse(format!("unknown join type '{other}'"))),
    })
}

fn parse_algorithm(s: &str) -> Result<JoinAlgorithm> {
    Ok(match s {
        "hash" => JoinAlgorithm::Hash,
        "nested_loop" => JoinAlgorithm::NestedLoop,
        "lookup" => JoinAlgorithm::Lookup,
        other => return Err(Error::Parse(format!("unknown join algorithm '{other}'"))),
    })
}

fn parse_build(s: &str) -> Result<BuildSide> {
    match s {
        "left" => Ok(BuildSide::Left),
        "right" => Ok(BuildSide::Right),
        other => Err(Error::Parse(format!("unknown build side '{other}'"))),
    }
}

fn parse_mode(s: &str) -> Result<TableFunctionMode> {
    match s {
        "per_partition" => Ok(TableFunctionMode::PerPartition),
        "singleton" => Ok(TableFunctionMode::Singleton),
        other => Err(Error::Parse(format!("unknown table function mode '{other}'"))),
    }
}

fn to_agg(def: &AggDef) -> Result<AggregateCall> {
    let func = match def.func.to_ascii_lowercase().as_str() {
        "count" => AggFunc::Count,
        "sum" => AggFunc::Sum,
        "min" => AggFunc::Min,
        "max" => AggFunc::Max,
        "avg" => AggFunc::Avg,
        "any_value" => AggFunc::AnyValue,
        other => return Err(Error::Parse(format!("unknown aggregate '{other}'"))),
    };
    let mut call = AggregateCall::new(func, def.arg.as_deref(), def.alias.clone());
    call.distinct = def.distinct;
    call.pass_through_constant = def.pass_through;
    Ok(call)
}

fn to_plan(node: Node) -> Result<LogicalPlan> {
    Ok(match node {
        Node::Scan {
            table,
            schema,
            predicate,
            partitions,
        } => LogicalPlan::Scan {
            table,
            schema: to_schema(&schema)?,
            predicate: predicate.as_deref().map(parse_expr).transpose()?,
            partitions,
        },
        Node::Values { schema, rows } => LogicalPlan::Values {
            schema: to_schema(&schema)?,
            rows,
        },
        Node::Filter { predicate, input } => LogicalPlan::Filter {
            input: Box::new(to_plan(*input)?),
            predicate: parse_expr(&predicate)?,
        },
        Node::Project { columns, input } => LogicalPlan::Project {
            input: Box::new(to_plan(*input)?),
            exprs: columns
                .iter()
                .map(|c| parse_projection(c))
                .collect::<Result<Vec<_>>>()?,
        },
        Node::Join {
            algorithm,
            join_type,
            left_keys,
            right_keys,
            build,
            broadcast,
            condition,
            left,
            right,
        } => LogicalPlan::Join {
            left: Box::new(to_plan(*left)?),
            right: Box::new(to_plan(*right)?),
            algorithm: parse_algorithm(&algorithm)?,
            join_type: parse_join_type(&join_type)?,
            left_keys,
            right_keys,
            build_side: parse_build(&build)?,
            broadcast_build: broadcast,
            condition: condition.as_deref().map(parse_expr).transpose()?,
        },
        Node::Aggregate {
            group_by,
            aggs,
            assume_grouped,
            input,
        } => LogicalPlan::Aggregate {
            input: Box::new(to_plan(*input)?),
            group_by,
            aggs: aggs.iter().map(to_agg).collect::<Result<Vec<_>>>()?,
            assume_input_grouped: assume_grouped,
        },
        Node::Sort {
            order,
            offset,
            fetch,
            input,
        } => LogicalPlan::Sort {
            input: Box::new(to_plan(*input)?),
            order: order
                .iter()
                .map(|k| parse_sort_key(k))
                .collect::<Result<Vec<_>>>()?,
            offset,
            fetch,
        },
        Node::Union { all, inputs } => {
            if inputs.is_empty() {
                return Err(Error::Parse("union needs at least one input".into()));
            }
            LogicalPlan::Union {
                inputs: inputs.into_iter().map(to_plan).collect::<Result<Vec<_>>>()?,
                all,
            }
        }
        Node::TableFunction {
            name,
            args,
            schema,
            mode,
            pass_through,
            input,
        } => LogicalPlan::TableFunction {
            args: args
                .iter()
                .map(|a| parse_expr(a))
                .collect::<Result<Vec<_>>>()?,
            input: input.map(|i| to_plan(*i).map(Box::new)).transpose()?,
            schema: to_schema(&schema)?,
            mode: parse_mode(&mode)?,
            pass_through,
            name,
        },
        Node::Sink { table, input } => LogicalPlan::Sink {
            input: Box::new(to_plan(*input)?),
            target: table.map_or(SinkTarget::Client, SinkTarget::Table),
        },
    })
}

fn yaml_error(e: serde_yaml::Error) -> Error {
    Error::Parse(e.to_string())
}

/// Parse a plan document into a `LogicalPlan` plus its config overrides.
pub fn parse_yaml_plan(yaml_src: &str) -> Result<ParsedPlan> {
    let doc: PlanDocument = serde_yaml::from_str(yaml_src).map_err(yaml_error)?;
    Ok(ParsedPlan {
        plan: to_plan(doc.plan)?,
        config: doc.config.unwrap_or_default(),
    })
}

/// Parse a catalog document into a Location registry and table metadata.
pub fn parse_yaml_catalog(yaml_src: &str) -> Result<(StaticLocationRegistry, Catalog)> {
    let doc: CatalogDocument = serde_yaml::from_str(yaml_src).map_err(yaml_error)?;
    let registry = StaticLocationRegistry::new(doc.locations)?;
    let catalog = doc
        .tables
        .into_iter()
        .fold(Catalog::new(), |c, t| c.with_table(t));
    Ok((registry, catalog))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::LocationRegistry;

    #[test]
    fn nested_join_parses() {
        let yaml = r#"
plan:
  op: sink
  input:
    op: join
    type: left
    left_keys: ["a"]
    right_keys: ["b"]
    left:  { op: scan, table: "l", schema: [ {name: "a", type: "Int64"} ] }
    right: { op: scan, table: "r", schema: [ {name: "b", type: "i64"} ] }
"#;
        let parsed = parse_yaml_plan(yaml).unwrap();
        let LogicalPlan::Sink { input, target } = parsed.plan else {
            panic!("expected sink");
        };
        assert_eq!(target, SinkTarget::Client);
        match *input {
            LogicalPlan::Join {
                join_type,
                algorithm,
                build_side,
                ..
            } => {
                assert_eq!(join_type, JoinType::Left);
                assert_eq!(algorithm, JoinAlgorithm::Hash);
                assert_eq!(build_side, BuildSide::Right);
            }
            other => panic!("expected join, got {}", other.kind_name()),
        }
    }

    #[test]
    fn config_overrides_apply() {
        let yaml = r#"
config:
  force_single_location: true
plan: { op: values, schema: [ {name: "x", type: "Int32"} ], rows: 1 }
"#;
        let parsed = parse_yaml_plan(yaml).unwrap();
        let mut cfg = PlannerConfig::default();
        parsed.config.apply(&mut cfg);
        assert!(cfg.force_single_location);
        assert_eq!(cfg.table_group, "default");
    }

    #[test]
    fn unknown_type_is_parse_error() {
        let yaml = r#"
plan: { op: values, schema: [ {name: "x", type: "Complex"} ] }
"#;
        assert!(matches!(parse_yaml_plan(yaml), Err(Error::Parse(_))));
    }

    #[test]
    fn catalog_document() {
        let yaml = r#"
locations:
  - { name: "coord", partitions: 1, single: true, table_groups: ["default"] }
  - { name: "big", partitions: 8, table_groups: ["default"] }
tables:
  - { name: "orders", location: "big", layout: hash, hash_columns: ["id"] }
"#;
        let (registry, catalog) = parse_yaml_catalog(yaml).unwrap();
        assert_eq!(registry.location("big").unwrap().partition_count, 8);
        assert_eq!(catalog.table("orders").unwrap().hash_columns, vec!["id"]);
    }
}
