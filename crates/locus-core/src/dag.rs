//! The logical operator tree handed to the distribution planner.
//!
//! Physical strategy is already chosen here (join algorithm, build side,
//! broadcast hint, aggregate override); the planner only decides where each
//! operator runs and inserts exchanges.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::schema::{DataType, Field, Schema};
use crate::types::Expr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JoinType {
    Inner,
    Left,
    Right,
    Full,
    /// Left semi join: left rows with at least one match.
    Semi,
    /// Left anti join: left rows without a match.
    Anti,
}

impl JoinType {
    /// Unmatched left rows appear in the output.
    pub fn preserves_left(self) -> bool {
        matches!(self, JoinType::Left | JoinType::Full | JoinType::Anti)
    }

    /// Unmatched right rows appear in the output.
    pub fn preserves_right(self) -> bool {
        matches!(self, JoinType::Right | JoinType::Full)
    }

    /// Semi/anti joins only emit left columns.
    pub fn emits_right(self) -> bool {
        !matches!(self, JoinType::Semi | JoinType::Anti)
    }

    /// Join types whose exchanged side may be statically pruned against the
    /// build side's hash ranges.
    pub fn allows_exchange_pruning(self) -> bool {
        matches!(self, JoinType::Inner | JoinType::Semi | JoinType::Anti)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JoinAlgorithm {
    Hash,
    NestedLoop,
    /// Build side is an index/table fetched per probe row.
    Lookup,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BuildSide {
    Left,
    Right,
}

impl BuildSide {
    pub fn other(self) -> BuildSide {
        match self {
            BuildSide::Left => BuildSide::Right,
            BuildSide::Right => BuildSide::Left,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AggFunc {
    Count,
    Sum,
    Min,
    Max,
    Avg,
    /// Any value of the group; used for columns functionally dependent on
    /// the group keys.
    AnyValue,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateCall {
    pub func: AggFunc,
    /// Input column; `None` means `COUNT(*)`.
    pub arg: Option<String>,
    pub alias: String,
    #[serde(default)]
    pub distinct: bool,
    /// The output is the (group-constant) value of `arg` itself, so any
    /// partition identity `arg` carries survives aggregation.
    #[serde(default)]
    pub pass_through_constant: bool,
}

impl AggregateCall {
    pub fn new(func: AggFunc, arg: Option<&str>, alias: impl Into<String>) -> Self {
        Self {
            func,
            arg: arg.map(str::to_string),
            alias: alias.into(),
            distinct: false,
            pass_through_constant: false,
        }
    }

    pub fn output_type(&self, input: &Schema) -> Result<DataType> {
        match (self.func, &self.arg) {
            (AggFunc::Count, _) => Ok(DataType::Int64),
            (AggFunc::Avg, _) => Ok(DataType::Float64),
            (_, Some(arg)) => {
                let idx = input.require(arg)?;
                Ok(input.fields[idx].data_type.clone())
            }
            (func, None) => Err(Error::Plan(format!(
                "aggregate {:?} '{}' needs an argument",
                func, self.alias
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortKey {
    pub column: String,
    #[serde(default)]
    pub descending: bool,
    #[serde(default)]
    pub nulls_first: bool,
}

impl SortKey {
    pub fn asc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            descending: false,
            nulls_first: false,
        }
    }

    pub fn desc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            descending: true,
            nulls_first: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TableFunctionMode {
    /// Runs independently on every partition of its input.
    PerPartition,
    /// Needs all input rows in one place.
    Singleton,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SinkTarget {
    /// Results stream back to the client through one partition.
    Client,
    /// Insert into a catalog table; rows must land on its partitions.
    Table(String),
}

/// Logical nodes (sources → transforms → sink).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LogicalPlan {
    Scan {
        table: String,
        schema: Schema,
        /// Pushed-down predicate evaluated by the scan.
        predicate: Option<Expr>,
        /// Partition ids the scan is restricted to (`None` = all).
        partitions: Option<Vec<u32>>,
    },
    Values {
        schema: Schema,
        rows: usize,
    },
    Filter {
        input: Box<LogicalPlan>,
        predicate: Expr,
    },
    Project {
        input: Box<LogicalPlan>,
        /// (source expression, output name)
        exprs: Vec<(Expr, String)>,
    },
    Join {
        left: Box<LogicalPlan>,
        right: Box<LogicalPlan>,
        algorithm: JoinAlgorithm,
        join_type: JoinType,
        left_keys: Vec<String>,
        right_keys: Vec<String>,
        build_side: BuildSide,
        /// Planner chose to replicate the build side.
        broadcast_build: bool,
        /// Residual non-equi condition.
        condition: Option<Expr>,
    },
    Aggregate {
        input: Box<LogicalPlan>,
        group_by: Vec<String>,
        aggs: Vec<AggregateCall>,
        /// Front end asserts rows of one group never span partitions.
        assume_input_grouped: bool,
    },
    /// ORDER BY and/or LIMIT/OFFSET. An empty `order` is a plain limit.
    Sort {
        input: Box<LogicalPlan>,
        order: Vec<SortKey>,
        offset: Option<u64>,
        fetch: Option<u64>,
    },
    Union {
        inputs: Vec<LogicalPlan>,
        all: bool,
    },
    TableFunction {
        name: String,
        args: Vec<Expr>,
        input: Option<Box<LogicalPlan>>,
        schema: Schema,
        mode: TableFunctionMode,
        /// Input columns copied unchanged into the output (same names).
        pass_through: Vec<String>,
    },
    Sink {
        input: Box<LogicalPlan>,
        target: SinkTarget,
    },
}

impl LogicalPlan {
    /// Returns the number of inputs for this node.
    pub fn inputs(&self) -> usize {
        use LogicalPlan::*;
        match self {
            Scan { .. } | Values { .. } => 0,
            Filter { .. } | Project { .. } | Aggregate { .. } | Sort { .. } | Sink { .. } => 1,
            Join { .. } => 2,
            Union { inputs, .. } => inputs.len(),
            TableFunction { input, .. } => usize::from(input.is_some()),
        }
    }

    pub fn kind_name(&self) -> &'static str {
        use LogicalPlan::*;
        match self {
            Scan { .. } => "Scan",
            Values { .. } => "Values",
            Filter { .. } => "Filter",
            Project { .. } => "Project",
            Join { .. } => "Join",
            Aggregate { .. } => "Aggregate",
            Sort { .. } => "Sort",
            Union { .. } => "Union",
            TableFunction { .. } => "TableFunction",
            Sink { .. } => "Sink",
        }
    }

    /// Output row schema of this node.
    pub fn schema(&self) -> Result<Schema> {
        use LogicalPlan::*;
        match self {
            Scan { schema, .. } | Values { schema, .. } | TableFunction { schema, .. } => {
                Ok(schema.clone())
            }
            Filter { input, .. } | Sort { input, .. } | Sink { input, .. } => input.schema(),
            Project { input, exprs } => {
                let in_schema = input.schema()?;
                project_schema(&in_schema, exprs)
            }
            Join {
                left,
                right,
                join_type,
                ..
            } => {
                let l = left.schema()?;
                let r = right.schema()?;
                Ok(join_schema(&l, &r, *join_type))
            }
            Aggregate {
                input,
                group_by,
                aggs,
                ..
            } => {
                let in_schema = input.schema()?;
                aggregate_schema(&in_schema, group_by, aggs)
            }
            Union { inputs, .. } => {
                let first = inputs
                    .first()
                    .ok_or_else(|| Error::Plan("union without inputs".into()))?
                    .schema()?;
                for other in &inputs[1..] {
                    first.check_union_compatible(&other.schema()?)?;
                }
                Ok(first)
            }
        }
    }
}

/// Output schema of a projection list evaluated against `input`.
pub fn project_schema(input: &Schema, exprs: &[(Expr, String)]) -> Result<Schema> {
    let fields = exprs
        .iter()
        .map(|(e, name)| Ok(Field::new(name.clone(), e.data_type(input)?, true)))
        .collect::<Result<Vec<_>>>()?;
    Ok(Schema::new(fields))
}

/// Output schema of a join; the non-preserved side of an outer join becomes
/// nullable.
pub fn join_schema(left: &Schema, right: &Schema, join_type: JoinType) -> Schema {
    if !join_type.emits_right() {
        return left.clone();
    }
    let l = if join_type.preserves_right() {
        left.nullable()
    } else {
        left.clone()
    };
    let r = if join_type.preserves_left() {
        right.nullable()
    } else {
        right.clone()
    };
    l.join(&r)
}

/// Output schema of an aggregate: group keys, then one column per call.
pub fn aggregate_schema(
    input: &Schema,
    group_by: &[String],
    aggs: &[AggregateCall],
) -> Result<Schema> {
    let mut fields = Vec::with_capacity(group_by.len() + aggs.len());
    for key in group_by {
        let idx = input.require(key)?;
        fields.push(input.fields[idx].clone());
    }
    for call in aggs {
        fields.push(Field::new(call.alias.clone(), call.output_type(input)?, true));
    }
    Ok(Schema::new(fields))
}
