//! Hash, nested-loop and lookup joins.
//!
//! Placement precedence: colocated inputs stay put; a broadcast side moves
//! to the other side; a side already hashed on its join keys keeps its
//! layout and the other side is shuffled onto it; otherwise both sides are
//! shuffled on the join keys. Nested-loop joins that cannot be proven safe
//! on several partitions degenerate to the single Location.

use std::sync::Arc;

use locus_core::dag::{join_schema, BuildSide, JoinAlgorithm, JoinType};
use locus_core::error::{Error, Result};
use locus_core::types::Expr;
use tracing::{debug, info};

use super::{Derived, Deriver};
use crate::distribution::{Distribution, DistributionKind, EqualTo};
use crate::exchange;
use crate::fields::{merge_part_fix, shift_positions};
use crate::location::Location;
use crate::pending::PendingUnion;
use crate::physical::{PhysicalNode, PhysicalOp};

pub(crate) struct JoinSpec<'p> {
    pub left: Derived,
    pub right: Derived,
    pub algorithm: JoinAlgorithm,
    pub join_type: JoinType,
    pub left_keys: &'p [String],
    pub right_keys: &'p [String],
    pub build_side: BuildSide,
    pub broadcast_build: bool,
    pub condition: Option<&'p Expr>,
}

/// The join facts placement decisions need, without the inputs.
#[derive(Clone, Copy)]
struct Shape<'p> {
    algorithm: JoinAlgorithm,
    join_type: JoinType,
    left_keys: &'p [String],
    right_keys: &'p [String],
    build_side: BuildSide,
    broadcast_build: bool,
}

impl Shape<'_> {
    fn probe_side(&self) -> BuildSide {
        self.build_side.other()
    }

    /// Replicating `side` keeps every output row exactly once.
    fn may_broadcast(&self, side: BuildSide) -> bool {
        match side {
            BuildSide::Left => matches!(self.join_type, JoinType::Inner | JoinType::Right),
            BuildSide::Right => !self.join_type.preserves_right(),
        }
    }
}

/// Key ordinals of a hash layout covered by `keys`; only hash layouts over
/// several partitions qualify.
fn hash_cover(dist: &Distribution, keys: &[String]) -> Option<Vec<usize>> {
    if dist.kind() != DistributionKind::HashDistributed || dist.is_single_partition() {
        return None;
    }
    dist.covered_by(keys)
}

/// A lookup join only reads the build side through the probe rows, so every
/// output row has to come from a probe row.
fn probe_drives_output(join_type: JoinType, build_side: BuildSide) -> bool {
    match build_side {
        BuildSide::Left => matches!(join_type, JoinType::Inner | JoinType::Right),
        BuildSide::Right => matches!(
            join_type,
            JoinType::Inner | JoinType::Left | JoinType::Semi | JoinType::Anti
        ),
    }
}

impl Deriver<'_> {
    pub(super) fn derive_join(&mut self, spec: JoinSpec<'_>) -> Result<PhysicalNode> {
        let JoinSpec {
            left,
            right,
            algorithm,
            join_type,
            left_keys,
            right_keys,
            build_side,
            broadcast_build,
            condition,
        } = spec;

        if left_keys.len() != right_keys.len() {
            return Err(Error::Plan(format!(
                "join has {} left keys but {} right keys",
                left_keys.len(),
                right_keys.len()
            )));
        }
        if algorithm != JoinAlgorithm::NestedLoop && left_keys.is_empty() {
            return Err(Error::Plan(format!(
                "{algorithm:?} join without equality keys"
            )));
        }
        for k in left_keys {
            left.schema().require(k)?;
        }
        for k in right_keys {
            right.schema().require(k)?;
        }
        if algorithm == JoinAlgorithm::Lookup && !probe_drives_output(join_type, build_side) {
            return Err(Error::Plan(format!(
                "lookup join {join_type:?} with build={build_side:?} emits build-side rows"
            )));
        }
        if let Some(c) = condition {
            let both = left.schema().join(right.schema());
            for col in c.columns() {
                both.require(col)?;
            }
        }

        let shape = Shape {
            algorithm,
            join_type,
            left_keys,
            right_keys,
            build_side,
            broadcast_build,
        };
        let (l, r) = self.resolve_join_inputs(left, right, &shape)?;
        let (l, r) = match algorithm {
            // The build side is fetched per probe row; nothing moves.
            JoinAlgorithm::Lookup => (l, r),
            JoinAlgorithm::Hash => self.place_hash_join(l, r, &shape)?,
            JoinAlgorithm::NestedLoop => self.place_nested_loop(l, r, &shape)?,
        };

        let location = match (algorithm, shape.probe_side()) {
            (JoinAlgorithm::Lookup, BuildSide::Left) => Arc::clone(&l.location),
            (JoinAlgorithm::Lookup, BuildSide::Right) => Arc::clone(&r.location),
            _ if l.location.name != r.location.name => {
                return Err(Error::Invariant(format!(
                    "join inputs left at {} and {}",
                    l.location, r.location
                )))
            }
            _ => Arc::clone(&l.location),
        };
        let schema = join_schema(&l.schema, &r.schema, join_type);
        let dist = self.join_output(&l, &r, &shape);

        Ok(self.node(
            PhysicalOp::Join {
                algorithm,
                join_type,
                left_keys: left_keys.to_vec(),
                right_keys: right_keys.to_vec(),
                build_side,
                condition: condition.cloned(),
            },
            vec![l, r],
            schema,
            dist,
            location,
        ))
    }

    /// Resolve pending unions on either side, steering them onto the other
    /// side's hash layout when that layout covers the join keys.
    fn resolve_join_inputs(
        &mut self,
        left: Derived,
        right: Derived,
        shape: &Shape<'_>,
    ) -> Result<(PhysicalNode, PhysicalNode)> {
        match (left, right) {
            (Derived::Node(l), Derived::Node(r)) => Ok((l, r)),
            (Derived::Pending(p), Derived::Node(r)) => {
                let l = self.resolve_toward(p, &r, shape.right_keys, shape.left_keys)?;
                Ok((l, r))
            }
            (Derived::Node(l), Derived::Pending(p)) => {
                let r = self.resolve_toward(p, &l, shape.left_keys, shape.right_keys)?;
                Ok((l, r))
            }
            (Derived::Pending(a), Derived::Pending(b)) => {
                let l = self.resolve_default(a)?;
                let r = self.resolve_toward(b, &l, shape.left_keys, shape.right_keys)?;
                Ok((l, r))
            }
        }
    }

    fn resolve_toward(
        &mut self,
        pending: PendingUnion,
        other: &PhysicalNode,
        other_keys: &[String],
        pending_keys: &[String],
    ) -> Result<PhysicalNode> {
        match hash_cover(&other.distribution, other_keys) {
            Some(mapping) => {
                let keys: Vec<String> = mapping.iter().map(|&i| pending_keys[i].clone()).collect();
                debug!(
                    target = %other.location,
                    keys = ?keys,
                    "resolving pending union onto join partner's layout"
                );
                self.resolve_hashed(pending, &keys, &other.distribution, &other.location)
            }
            None => self.resolve_default(pending),
        }
    }

    /// Both inputs already produce matching rows in matching partitions.
    fn colocated(&self, l: &PhysicalNode, r: &PhysicalNode, shape: &Shape<'_>) -> bool {
        if l.location.name != r.location.name {
            return false;
        }
        if l.location.partition_count == 1 {
            return true;
        }
        let (ld, rd) = (&l.distribution, &r.distribution);
        if ld.is_broadcast() && rd.is_broadcast() {
            return true;
        }
        if let (Some(lm), Some(rm)) = (
            ld.covered_by(shape.left_keys),
            rd.covered_by(shape.right_keys),
        ) {
            if lm == rm && ld.kind() == rd.kind() && ld.same_scheme(rd) {
                return true;
            }
        }
        self.config.enable_part_fix_key_colocation
            && ld.partition_count() == rd.partition_count()
            && shape
                .left_keys
                .iter()
                .zip(shape.right_keys)
                .any(|(a, b)| match (ld.scheme_of(a), rd.scheme_of(b)) {
                    (Some(x), Some(y)) => x == y,
                    _ => false,
                })
    }

    /// Side to replicate onto the other side's Location, if any.
    fn broadcast_side(
        &self,
        l: &PhysicalNode,
        r: &PhysicalNode,
        shape: &Shape<'_>,
    ) -> Option<BuildSide> {
        let (lb, rb) = (l.distribution.is_broadcast(), r.distribution.is_broadcast());
        if lb && !rb && shape.may_broadcast(BuildSide::Left) {
            return Some(BuildSide::Left);
        }
        if rb && !lb && shape.may_broadcast(BuildSide::Right) {
            return Some(BuildSide::Right);
        }
        if shape.broadcast_build && shape.may_broadcast(shape.build_side) {
            return Some(shape.build_side);
        }
        None
    }

    fn broadcast_to(&mut self, node: PhysicalNode, location: &Arc<Location>) -> PhysicalNode {
        if node.distribution.is_broadcast() && node.location.name == location.name {
            return node;
        }
        exchange::broadcast(&mut self.ids, node, Arc::clone(location))
    }

    /// Replicate `side`, leaving the other input where it is.
    fn apply_broadcast(
        &mut self,
        l: PhysicalNode,
        r: PhysicalNode,
        side: BuildSide,
    ) -> (PhysicalNode, PhysicalNode) {
        debug!(side = ?side, "broadcasting join input");
        match side {
            BuildSide::Left => {
                let loc = Arc::clone(&r.location);
                (self.broadcast_to(l, &loc), r)
            }
            BuildSide::Right => {
                let loc = Arc::clone(&l.location);
                let r = self.broadcast_to(r, &loc);
                (l, r)
            }
        }
    }

    /// A single-partition input facing a partitioned one can be replicated
    /// instead of shuffling both.
    fn lone_side(
        &self,
        l: &PhysicalNode,
        r: &PhysicalNode,
        shape: &Shape<'_>,
    ) -> Option<BuildSide> {
        let (ls, rs) = (
            l.distribution.is_single_partition(),
            r.distribution.is_single_partition(),
        );
        if ls && !rs && shape.may_broadcast(BuildSide::Left) {
            return Some(BuildSide::Left);
        }
        if rs && !ls && shape.may_broadcast(BuildSide::Right) {
            return Some(BuildSide::Right);
        }
        None
    }

    fn place_hash_join(
        &mut self,
        l: PhysicalNode,
        r: PhysicalNode,
        shape: &Shape<'_>,
    ) -> Result<(PhysicalNode, PhysicalNode)> {
        if self.colocated(&l, &r, shape) {
            return Ok((l, r));
        }
        if let Some(side) = self.broadcast_side(&l, &r, shape) {
            return Ok(self.apply_broadcast(l, r, side));
        }

        let lcov = hash_cover(&l.distribution, shape.left_keys);
        let rcov = hash_cover(&r.distribution, shape.right_keys);
        let keep = match (lcov, rcov) {
            (Some(lm), Some(rm)) => {
                let (lp, rp) = (l.location.partition_count, r.location.partition_count);
                if lp > rp || (lp == rp && shape.build_side == BuildSide::Left) {
                    Some((BuildSide::Left, lm))
                } else {
                    Some((BuildSide::Right, rm))
                }
            }
            (Some(lm), None) => Some((BuildSide::Left, lm)),
            (None, Some(rm)) => Some((BuildSide::Right, rm)),
            (None, None) => None,
        };

        if let Some((side, mapping)) = keep {
            let prunable = shape.join_type.allows_exchange_pruning() && side == shape.build_side;
            let func = self.config.default_hash_function.clone();
            return match side {
                BuildSide::Left => {
                    let keys: Vec<String> =
                        mapping.iter().map(|&i| shape.right_keys[i].clone()).collect();
                    debug!(onto = %l.location, keys = ?keys, "shuffling right input onto left layout");
                    let r = exchange::hash(
                        &mut self.ids,
                        r,
                        &keys,
                        Some(&l.distribution),
                        &func,
                        Arc::clone(&l.location),
                        prunable,
                    )?;
                    Ok((l, r))
                }
                BuildSide::Right => {
                    let keys: Vec<String> =
                        mapping.iter().map(|&i| shape.left_keys[i].clone()).collect();
                    debug!(onto = %r.location, keys = ?keys, "shuffling left input onto right layout");
                    let l = exchange::hash(
                        &mut self.ids,
                        l,
                        &keys,
                        Some(&r.distribution),
                        &func,
                        Arc::clone(&r.location),
                        prunable,
                    )?;
                    Ok((l, r))
                }
            };
        }

        if let Some(side) = self.lone_side(&l, &r, shape) {
            return Ok(self.apply_broadcast(l, r, side));
        }

        let target = if l.location.partition_count >= r.location.partition_count {
            Arc::clone(&l.location)
        } else {
            Arc::clone(&r.location)
        };
        debug!(
            target = %target,
            left = %l.distribution,
            right = %r.distribution,
            "no input aligned with the join keys; shuffling both"
        );
        if target.partition_count == 1 {
            return Ok((self.gather(l, &target), self.gather(r, &target)));
        }
        let func = self.config.default_hash_function.clone();
        let l = exchange::hash(
            &mut self.ids,
            l,
            shape.left_keys,
            None,
            &func,
            Arc::clone(&target),
            false,
        )?;
        let r = exchange::hash(
            &mut self.ids,
            r,
            shape.right_keys,
            None,
            &func,
            target,
            false,
        )?;
        Ok((l, r))
    }

    fn place_nested_loop(
        &mut self,
        l: PhysicalNode,
        r: PhysicalNode,
        shape: &Shape<'_>,
    ) -> Result<(PhysicalNode, PhysicalNode)> {
        if self.colocated(&l, &r, shape) {
            return Ok((l, r));
        }
        if let Some(side) = self
            .broadcast_side(&l, &r, shape)
            .or_else(|| self.lone_side(&l, &r, shape))
        {
            return Ok(self.apply_broadcast(l, r, side));
        }
        let single = self.single_location()?;
        info!(
            left = %l.location,
            right = %r.location,
            single = %single,
            "nested-loop join degenerates to the single location"
        );
        Ok((self.gather(l, &single), self.gather(r, &single)))
    }

    /// Output layout after placement, in terms of the join's own columns.
    fn join_output(&self, l: &PhysicalNode, r: &PhysicalNode, shape: &Shape<'_>) -> Distribution {
        let left = l.distribution.clone();
        let right = shift_positions(&r.distribution, l.schema.len());
        let (probe, build) = match shape.probe_side() {
            BuildSide::Left => (&left, &right),
            BuildSide::Right => (&right, &left),
        };

        let pick_inner = || -> Distribution {
            if shape.algorithm == JoinAlgorithm::Lookup {
                return probe.clone();
            }
            [probe, build]
                .into_iter()
                .find(|d| d.is_keyed())
                .or_else(|| [probe, build].into_iter().find(|d| !d.is_broadcast()))
                .unwrap_or(probe)
                .clone()
        };

        match shape.join_type {
            // For lookups these are the probe side; other pairings were
            // rejected before placement.
            JoinType::Left | JoinType::Semi | JoinType::Anti => left.clone(),
            JoinType::Right => right.clone(),
            JoinType::Full => {
                let base = pick_inner();
                if base.is_broadcast() {
                    base.with_part_fix_keys(Default::default())
                } else {
                    base.degrade_to_random()
                        .with_part_fix_keys(Default::default())
                }
            }
            JoinType::Inner => {
                // Build rows of a lookup are fetched to the probe's partitions,
                // so only the probe's tags still hold.
                let part_fix = if shape.algorithm == JoinAlgorithm::Lookup {
                    probe.part_fix_keys().clone()
                } else {
                    merge_part_fix(left.part_fix_keys(), right.part_fix_keys())
                };
                let mut out = pick_inner().with_part_fix_keys(part_fix);
                for (lk, rk) in shape.left_keys.iter().zip(shape.right_keys) {
                    for k in 0..out.hash_fields().len() {
                        if out.key_matches(k, lk) {
                            out = out.with_equal(k, EqualTo::Column(rk.clone()));
                        }
                        if out.key_matches(k, rk) {
                            out = out.with_equal(k, EqualTo::Column(lk.clone()));
                        }
                    }
                }
                out
            }
        }
    }
}
