//! Logical plan surface re-exported from core.
//!
//! The planner consumes the core AST as-is; derivation never rewrites it.

pub use locus_core::dag::{
    aggregate_schema, join_schema, project_schema, AggFunc, AggregateCall, BuildSide,
    JoinAlgorithm, JoinType, LogicalPlan, SinkTarget, SortKey, TableFunctionMode,
};
pub use locus_core::schema::{DataType, Field, Schema};
pub use locus_core::types::{BinaryOp, Expr, Scalar};
