#![forbid(unsafe_code)]
//! locus-planner: logical plan + Location registry + catalog → physical plan
//! with a Distribution on every node and Exchanges wherever rows must move.
//!
//! Design:
//! - The logical AST lives in `locus-core::dag`; this crate never forks it.
//! - `distribution` describes how a node's rows are spread; values are
//!   immutable and every change builds a new one.
//! - `derive` walks the plan bottom-up, one rule per operator, inserting
//!   exchanges (`exchange`) and splitting aggregates/sorts (`stages`).
//! - Union branches that live in different places stay unresolved
//!   (`pending`) until a consumer decides where they should meet.
//! - `explain` renders the result; `dsl` parses YAML plans and catalogs.

pub mod catalog;
pub mod derive;
pub mod distribution;
pub mod dsl;
pub mod exchange;
pub mod explain;
pub mod fields;
pub mod location;
pub mod logical;
pub mod pending;
pub mod physical;
pub mod stages;

pub use catalog::{Catalog, TableLayout, TableMeta};
pub use derive::{derive_plan, Derived, Deriver};
pub use distribution::{Distribution, DistributionKind, HashField, PartFixTag};
pub use dsl::yaml::{parse_yaml_catalog, parse_yaml_plan};
pub use explain::{explain, explain_json, explain_with, ExplainOptions};
pub use location::{Location, LocationRegistry, StaticLocationRegistry};
pub use pending::PendingUnion;
pub use physical::{ExchangeKind, PhysicalNode, PhysicalOp};
