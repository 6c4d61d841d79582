//! Bottom-up distribution derivation.
//!
//! `Deriver::derive` walks the logical tree post-order. Each node kind has
//! its own rule (one submodule per family); a rule receives its children
//! already derived and returns a new node, inserting exchanges or splitting
//! into local and global stages as needed. Unions may stay pending until a
//! consumer decides where their rows have to go.

mod aggregate;
mod join;
mod project;
mod scan;
mod sink;
mod sort;
mod table_function;
mod union;

use std::sync::Arc;

use locus_core::config::PlannerConfig;
use locus_core::dag::{aggregate_schema, LogicalPlan};
use locus_core::error::{Error, Result};
use locus_core::id::NodeIdGen;
use locus_core::schema::Schema;
use tracing::{debug, trace};

use crate::catalog::Catalog;
use crate::distribution::Distribution;
use crate::location::{Location, LocationRegistry};
use crate::pending::PendingUnion;
use crate::physical::{PhysicalNode, PhysicalOp};

/// Result of deriving one logical node.
#[derive(Debug, Clone)]
pub enum Derived {
    Node(PhysicalNode),
    /// A union whose branch groups still sit at different Locations or
    /// layouts.
    Pending(PendingUnion),
}

impl Derived {
    pub fn schema(&self) -> &Schema {
        match self {
            Derived::Node(n) => &n.schema,
            Derived::Pending(p) => &p.schema,
        }
    }

    pub fn as_node(&self) -> Option<&PhysicalNode> {
        match self {
            Derived::Node(n) => Some(n),
            Derived::Pending(_) => None,
        }
    }

    pub fn as_pending(&self) -> Option<&PendingUnion> {
        match self {
            Derived::Pending(p) => Some(p),
            Derived::Node(_) => None,
        }
    }
}

/// One plan compilation. Borrows the registry, catalog and config
/// read-only; owns the id counter.
pub struct Deriver<'a> {
    registry: &'a dyn LocationRegistry,
    catalog: &'a Catalog,
    config: &'a PlannerConfig,
    ids: NodeIdGen,
}

impl<'a> Deriver<'a> {
    pub fn new(
        registry: &'a dyn LocationRegistry,
        catalog: &'a Catalog,
        config: &'a PlannerConfig,
    ) -> Self {
        Self {
            registry,
            catalog,
            config,
            ids: NodeIdGen::new(),
        }
    }

    /// Derive the whole tree; a union left pending at the root is resolved
    /// onto its largest group.
    pub fn derive(mut self, plan: &LogicalPlan) -> Result<PhysicalNode> {
        self.config.validate()?;
        let derived = self.derive_node(plan)?;
        let root = self.resolve(derived)?;
        check_partition_counts(&root)?;
        debug!(
            nodes = root.node_count(),
            exchanges = root.exchanges().len(),
            location = %root.location,
            "derived physical plan"
        );
        Ok(root)
    }

    /// Derive one subtree, leaving a top-level union pending if its groups
    /// cannot be merged.
    pub fn derive_node(&mut self, plan: &LogicalPlan) -> Result<Derived> {
        let derived = match plan {
            LogicalPlan::Scan {
                table,
                schema,
                predicate,
                partitions,
            } => Derived::Node(self.derive_scan(
                table,
                schema,
                predicate.as_ref(),
                partitions.as_deref(),
            )?),
            LogicalPlan::Values { schema, rows } => {
                Derived::Node(self.derive_values(schema, *rows)?)
            }
            LogicalPlan::Filter { input, predicate } => {
                let input = self.derive_node(input)?;
                self.derive_filter(input, predicate)?
            }
            LogicalPlan::Project { input, exprs } => {
                let input = self.derive_node(input)?;
                self.derive_project(input, exprs)?
            }
            LogicalPlan::Join {
                left,
                right,
                algorithm,
                join_type,
                left_keys,
                right_keys,
                build_side,
                broadcast_build,
                condition,
            } => {
                let left = self.derive_node(left)?;
                let right = self.derive_node(right)?;
                Derived::Node(self.derive_join(join::JoinSpec {
                    left,
                    right,
                    algorithm: *algorithm,
                    join_type: *join_type,
                    left_keys,
                    right_keys,
                    build_side: *build_side,
                    broadcast_build: *broadcast_build,
                    condition: condition.as_ref(),
                })?)
            }
            LogicalPlan::Aggregate {
                input,
                group_by,
                aggs,
                assume_input_grouped,
            } => {
                let input = self.derive_node(input)?;
                let schema = aggregate_schema(input.schema(), group_by, aggs)?;
                Derived::Node(self.derive_aggregate(
                    input,
                    group_by,
                    aggs,
                    *assume_input_grouped,
                    schema,
                )?)
            }
            LogicalPlan::Sort {
                input,
                order,
                offset,
                fetch,
            } => {
                let input = self.derive_node(input)?;
                self.derive_sort(input, order, *offset, *fetch)?
            }
            LogicalPlan::Union { inputs, all } => {
                let mut branches = Vec::with_capacity(inputs.len());
                for input in inputs {
                    branches.push(self.derive_node(input)?);
                }
                self.derive_union(branches, *all)?
            }
            LogicalPlan::TableFunction {
                name,
                args,
                input,
                schema,
                mode,
                pass_through,
            } => {
                let input = match input {
                    Some(i) => Some(self.derive_node(i)?),
                    None => None,
                };
                self.derive_table_function(name, args, input, schema, *mode, pass_through)?
            }
            LogicalPlan::Sink { input, target } => {
                let input = self.derive_node(input)?;
                Derived::Node(self.derive_sink(input, target)?)
            }
        };

        match &derived {
            Derived::Node(n) => trace!(
                id = %n.id,
                op = %n.op.label(),
                distribution = %n.distribution,
                location = %n.location,
                "derived"
            ),
            Derived::Pending(p) => trace!(
                kind = plan.kind_name(),
                groups = p.group_count(),
                "derived pending union"
            ),
        }
        Ok(derived)
    }

    /// Turn a derived subtree into one node, resolving a pending union onto
    /// its largest group.
    pub fn resolve(&mut self, derived: Derived) -> Result<PhysicalNode> {
        match derived {
            Derived::Node(n) => Ok(n),
            Derived::Pending(p) => self.resolve_default(p),
        }
    }

    /// Collapse a pending union that ended up with a single group.
    fn settle(&mut self, mut pending: PendingUnion) -> Derived {
        if pending.groups.len() == 1 {
            let group = pending.groups.remove(0);
            return Derived::Node(group.into_node(&mut self.ids, &pending.schema));
        }
        Derived::Pending(pending)
    }

    /// Fresh compute Location for `min_partitions`, or the single Location
    /// when the deployment is forced onto one node.
    fn compute_location(&self, min_partitions: usize) -> Result<Arc<Location>> {
        if self.config.force_single_location {
            return self.single_location();
        }
        self.registry
            .best_compute_location(min_partitions, &self.config.table_group)
    }

    fn single_location(&self) -> Result<Arc<Location>> {
        self.registry.single_location(&self.config.table_group)
    }

    fn hash_function(&self) -> &str {
        &self.config.default_hash_function
    }

    fn node(
        &mut self,
        op: PhysicalOp,
        inputs: Vec<PhysicalNode>,
        schema: Schema,
        distribution: Distribution,
        location: Arc<Location>,
    ) -> PhysicalNode {
        PhysicalNode {
            id: self.ids.next_id(),
            op,
            inputs,
            schema,
            distribution,
            location,
        }
    }
}

/// Derive `plan` in one call.
pub fn derive_plan(
    plan: &LogicalPlan,
    registry: &dyn LocationRegistry,
    catalog: &Catalog,
    config: &PlannerConfig,
) -> Result<PhysicalNode> {
    Deriver::new(registry, catalog, config).derive(plan)
}

fn check_partition_counts(root: &PhysicalNode) -> Result<()> {
    let mut bad = None;
    root.walk(&mut |n| {
        if bad.is_none() && n.distribution.partition_count() != n.location.partition_count {
            bad = Some(format!(
                "{} has {} at {}",
                n.op.label(),
                n.distribution,
                n.location
            ));
        }
    });
    match bad {
        Some(msg) => Err(Error::Invariant(msg)),
        None => Ok(()),
    }
}
