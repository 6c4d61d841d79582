#![forbid(unsafe_code)]
//! locus-core: shared vocabulary for the locus distribution planner.
//!
//! - strongly-typed ids (`id`)
//! - row schemas (`schema`) and scalar literals / expressions (`types`)
//! - the logical operator tree handed to the planner (`dag`)
//! - planner configuration (`config`) and the canonical error (`error`)
//! - stable plan hashing (`hash`)
//!
//! No planning logic lives here; see `locus-planner`.

pub mod config;
pub mod dag;
pub mod error;
pub mod hash;
pub mod id;
pub mod prelude;
pub mod schema;
pub mod types;

/// Crate version, stamped into explain output.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
