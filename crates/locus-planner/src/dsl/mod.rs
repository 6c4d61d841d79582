//! Text front ends for plans and catalogs.

pub mod expr;
pub mod yaml;

pub use expr::{parse_expr, parse_projection, parse_sort_key};
pub use yaml::{parse_yaml_catalog, parse_yaml_plan, ConfigOverrides, ParsedPlan};
