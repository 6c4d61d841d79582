//! Union grouping and pending-union resolution.

use std::sync::Arc;

use locus_core::error::{Error, Result};
use locus_core::schema::Schema;
use tracing::debug;

use super::{Derived, Deriver};
use crate::distribution::{Distribution, DistributionKind};
use crate::exchange;
use crate::location::Location;
use crate::pending::{union_in_place, PendingUnion};
use crate::physical::PhysicalNode;

/// `dist` hash-partitions `schema`'s rows on exactly `keys`, in key order,
/// under `scheme`'s function, params and partition count.
pub(super) fn hashed_exactly_on(
    dist: &Distribution,
    schema: &Schema,
    keys: &[String],
    scheme: &Distribution,
) -> bool {
    dist.kind() == DistributionKind::HashDistributed
        && dist.hash_fields().len() == keys.len()
        && dist.same_scheme(scheme)
        && dist
            .hash_fields()
            .iter()
            .zip(keys)
            .all(|(f, k)| schema.index_of(k) == Some(f.position))
}

impl Deriver<'_> {
    pub(super) fn derive_union(&mut self, inputs: Vec<Derived>, all: bool) -> Result<Derived> {
        let schema = inputs
            .first()
            .ok_or_else(|| Error::Plan("union without inputs".into()))?
            .schema()
            .clone();

        let mut branches = Vec::new();
        for input in inputs {
            match input {
                Derived::Node(n) => branches.push(n),
                // Nested unions flatten into this one.
                Derived::Pending(p) => branches.extend(p.into_branches()),
            }
        }
        let pending = PendingUnion::from_branches(schema.clone(), branches)?;
        if pending.group_count() > 1 {
            debug!(
                groups = pending.group_count(),
                branches = pending.branch_count(),
                "union branches stay pending"
            );
        }
        let derived = self.settle(pending);
        if all {
            return Ok(derived);
        }

        // UNION without ALL: union the rows, then group on every column.
        let group_by = schema.names();
        let node = self.derive_aggregate(derived, &group_by, &[], false, schema)?;
        Ok(Derived::Node(node))
    }

    /// Exchange every group onto the largest one's Location and layout,
    /// then union in place.
    pub(super) fn resolve_default(&mut self, pending: PendingUnion) -> Result<PhysicalNode> {
        let target = pending
            .largest_group()
            .ok_or_else(|| Error::Plan("union without inputs".into()))?;
        let schema = pending.schema.clone();
        let target_dist = pending.groups[target].distribution.clone();
        let target_loc = Arc::clone(&pending.groups[target].location);
        debug!(
            groups = pending.group_count(),
            target = %target_loc,
            layout = %target_dist,
            "resolving pending union onto its largest group"
        );

        let mut nodes = Vec::with_capacity(pending.groups.len());
        for (i, group) in pending.groups.into_iter().enumerate() {
            let node = group.into_node(&mut self.ids, &schema);
            if i == target {
                nodes.push(node);
                continue;
            }
            let func = self.config.default_hash_function.clone();
            nodes.push(exchange::like(
                &mut self.ids,
                node,
                &target_dist,
                &func,
                Arc::clone(&target_loc),
            )?);
        }
        union_in_place(&mut self.ids, &schema, nodes)
    }

    /// Hash every group on `keys` with `scheme` at `location`, keeping
    /// groups that already are, and union in place.
    pub(super) fn resolve_hashed(
        &mut self,
        pending: PendingUnion,
        keys: &[String],
        scheme: &Distribution,
        location: &Arc<Location>,
    ) -> Result<PhysicalNode> {
        let schema = pending.schema.clone();
        let mut nodes = Vec::with_capacity(pending.groups.len());
        for group in pending.groups {
            let node = group.into_node(&mut self.ids, &schema);
            if node.location.name == location.name
                && hashed_exactly_on(&node.distribution, &node.schema, keys, scheme)
            {
                nodes.push(node);
                continue;
            }
            let func = self.config.default_hash_function.clone();
            nodes.push(exchange::hash(
                &mut self.ids,
                node,
                keys,
                Some(scheme),
                &func,
                Arc::clone(location),
                false,
            )?);
        }
        union_in_place(&mut self.ids, &schema, nodes)
    }

    /// Gather every group into the single Location and union there.
    pub(super) fn resolve_gathered(
        &mut self,
        pending: PendingUnion,
        location: &Arc<Location>,
    ) -> Result<PhysicalNode> {
        let schema = pending.schema.clone();
        let mut nodes = Vec::with_capacity(pending.groups.len());
        for group in pending.groups {
            let node = group.into_node(&mut self.ids, &schema);
            nodes.push(self.gather(node, location));
        }
        union_in_place(&mut self.ids, &schema, nodes)
    }

    /// `node` moved to the single partition of `location`, unless it is
    /// already there.
    pub(super) fn gather(&mut self, node: PhysicalNode, location: &Arc<Location>) -> PhysicalNode {
        if node.distribution.is_single_partition() && node.location.name == location.name {
            return node;
        }
        exchange::singleton(&mut self.ids, node, Arc::clone(location))
    }
}
