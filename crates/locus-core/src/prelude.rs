//! Convenient re-exports for downstream crates.

pub use crate::config::PlannerConfig;
pub use crate::dag::{
    AggFunc, AggregateCall, BuildSide, JoinAlgorithm, JoinType, LogicalPlan, SinkTarget, SortKey,
    TableFunctionMode,
};
pub use crate::error::{Error, Result};
pub use crate::hash::Hash256;
pub use crate::id::{NodeId, NodeIdGen};
pub use crate::schema::{DataType, Field, Schema};
pub use crate::types::{BinaryOp, Expr, Scalar};
