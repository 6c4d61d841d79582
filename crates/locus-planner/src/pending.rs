//! Unions whose branches have not been reconciled yet.
//!
//! Branches are grouped by identical Location and mergeable Distribution.
//! A group can be turned into a plain node at any time; the whole union is
//! only resolved once a consumer decides where the rows must end up.

use std::sync::Arc;

use locus_core::error::{Error, Result};
use locus_core::id::NodeIdGen;
use locus_core::schema::Schema;
use tracing::trace;

use crate::distribution::Distribution;
use crate::fields::rename_to_schema;
use crate::location::Location;
use crate::physical::{PhysicalNode, PhysicalOp};

/// Branches that can be unioned in place, with no exchange.
#[derive(Debug, Clone)]
pub struct BranchGroup {
    pub location: Arc<Location>,
    /// Layout of the group's rows in terms of the union's column names.
    pub distribution: Distribution,
    pub branches: Vec<PhysicalNode>,
}

impl BranchGroup {
    pub fn partition_count(&self) -> usize {
        self.location.partition_count
    }

    /// One node producing the group's rows under the union's column names.
    pub fn into_node(mut self, ids: &mut NodeIdGen, schema: &Schema) -> PhysicalNode {
        if self.branches.len() == 1 && self.branches[0].schema.names() == schema.names() {
            if let Some(only) = self.branches.pop() {
                return only;
            }
        }
        PhysicalNode {
            id: ids.next_id(),
            op: PhysicalOp::Union,
            inputs: self.branches,
            schema: schema.clone(),
            distribution: self.distribution,
            location: self.location,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PendingUnion {
    /// Output schema: the first branch's column names.
    pub schema: Schema,
    pub groups: Vec<BranchGroup>,
}

impl PendingUnion {
    /// Group `branches` (each already derived) under `schema`.
    pub fn from_branches(schema: Schema, branches: Vec<PhysicalNode>) -> Result<Self> {
        if branches.is_empty() {
            return Err(Error::Plan("union without inputs".into()));
        }
        let mut pending = PendingUnion {
            schema,
            groups: Vec::new(),
        };
        for branch in branches {
            pending.add(branch)?;
        }
        trace!(
            branches = pending.branch_count(),
            groups = pending.groups.len(),
            "grouped union branches"
        );
        Ok(pending)
    }

    fn add(&mut self, branch: PhysicalNode) -> Result<()> {
        self.schema.check_union_compatible(&branch.schema)?;
        let dist = rename_to_schema(&branch.distribution, &branch.schema, &self.schema);

        let best = self
            .groups
            .iter()
            .enumerate()
            .filter(|(_, g)| g.location.name == branch.location.name)
            .filter_map(|(i, g)| {
                g.distribution
                    .merge_for_union(&dist)
                    .map(|(merged, rank)| (i, merged, rank))
            })
            .min_by_key(|(_, _, rank)| *rank);

        match best {
            Some((i, merged, _)) => {
                let group = &mut self.groups[i];
                group.distribution = merged;
                group.branches.push(branch);
            }
            None => self.groups.push(BranchGroup {
                location: Arc::clone(&branch.location),
                distribution: dist,
                branches: vec![branch],
            }),
        }
        Ok(())
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    pub fn branch_count(&self) -> usize {
        self.groups.iter().map(|g| g.branches.len()).sum()
    }

    /// Every branch, group by group.
    pub fn into_branches(self) -> Vec<PhysicalNode> {
        self.groups.into_iter().flat_map(|g| g.branches).collect()
    }

    /// Apply `f` to each group's combined node and regroup the results.
    /// Used for operators that run per branch (projection, filter, per-
    /// partition table functions) and keep the union pending.
    pub fn map_groups(
        self,
        ids: &mut NodeIdGen,
        schema: Schema,
        mut f: impl FnMut(&mut NodeIdGen, PhysicalNode) -> Result<PhysicalNode>,
    ) -> Result<PendingUnion> {
        let in_schema = self.schema;
        let mut mapped = Vec::with_capacity(self.groups.len());
        for group in self.groups {
            let node = group.into_node(ids, &in_schema);
            mapped.push(f(ids, node)?);
        }
        PendingUnion::from_branches(schema, mapped)
    }

    /// Index of the group with the most partitions (first on ties).
    pub fn largest_group(&self) -> Option<usize> {
        self.groups
            .iter()
            .enumerate()
            .max_by(|(ia, a), (ib, b)| {
                a.partition_count()
                    .cmp(&b.partition_count())
                    .then_with(|| ib.cmp(ia))
            })
            .map(|(i, _)| i)
    }
}

/// Union nodes that already share one Location into a single node.
pub fn union_in_place(
    ids: &mut NodeIdGen,
    schema: &Schema,
    inputs: Vec<PhysicalNode>,
) -> Result<PhysicalNode> {
    let mut pending = PendingUnion::from_branches(schema.clone(), inputs)?;
    if pending.groups.len() != 1 {
        return Err(Error::Invariant(format!(
            "re-union still spans {} incompatible groups",
            pending.groups.len()
        )));
    }
    let group = pending.groups.remove(0);
    Ok(group.into_node(ids, schema))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distribution::HashField;
    use locus_core::id::NodeId;
    use locus_core::schema::{DataType, Field};

    fn branch(id: u64, col: &str, loc: &Arc<Location>, dist: Distribution) -> PhysicalNode {
        PhysicalNode {
            id: NodeId::new(id),
            op: PhysicalOp::Values { rows: 1 },
            inputs: vec![],
            schema: Schema::new(vec![Field::new(col, DataType::Int64, false)]),
            distribution: dist,
            location: Arc::clone(loc),
        }
    }

    fn schema() -> Schema {
        Schema::new(vec![Field::new("a", DataType::Int64, false)])
    }

    #[test]
    fn groups_by_location_and_layout() {
        let l1 = Arc::new(Location::new("l1", 4));
        let l2 = Arc::new(Location::new("l2", 4));
        let h = |n: &str| Distribution::hash(4, vec![HashField::new(0, n)], "murmur3");
        let p = PendingUnion::from_branches(
            schema(),
            vec![
                branch(0, "a", &l1, h("a")),
                branch(1, "x", &l1, h("x")),
                branch(2, "a", &l2, h("a")),
            ],
        )
        .unwrap();
        assert_eq!(p.group_count(), 2);
        assert_eq!(p.groups[0].branches.len(), 2);
        assert_eq!(p.groups[0].distribution.hash_fields(), &[HashField::new(0, "a")]);
    }

    #[test]
    fn single_group_becomes_union_node() {
        let l1 = Arc::new(Location::new("l1", 4));
        let mut ids = NodeIdGen::new();
        let node = union_in_place(
            &mut ids,
            &schema(),
            vec![
                branch(0, "a", &l1, Distribution::random(4)),
                branch(1, "b", &l1, Distribution::random(4)),
            ],
        )
        .unwrap();
        assert_eq!(node.op, PhysicalOp::Union);
        assert_eq!(node.inputs.len(), 2);
        assert_eq!(node.location.name, "l1");
    }

    #[test]
    fn renamed_single_branch_gets_wrapped() {
        let l1 = Arc::new(Location::new("l1", 4));
        let mut ids = NodeIdGen::new();
        let group = BranchGroup {
            location: Arc::clone(&l1),
            distribution: Distribution::random(4),
            branches: vec![branch(0, "x", &l1, Distribution::random(4))],
        };
        let node = group.into_node(&mut ids, &schema());
        assert_eq!(node.schema.names(), vec!["a"]);
    }

    #[test]
    fn largest_group_prefers_partitions() {
        let small = Arc::new(Location::new("s", 2));
        let big = Arc::new(Location::new("b", 8));
        let p = PendingUnion::from_branches(
            schema(),
            vec![
                branch(0, "a", &small, Distribution::random(2)),
                branch(1, "a", &big, Distribution::random(8)),
            ],
        )
        .unwrap();
        assert_eq!(p.largest_group(), Some(1));
    }
}
