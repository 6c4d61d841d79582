//! Aggregation: single step when the input is already grouped, PARTIAL →
//! exchange → FINAL otherwise.

use std::sync::Arc;

use locus_core::dag::{aggregate_schema, AggregateCall};
use locus_core::error::Result;
use locus_core::schema::Schema;
use tracing::debug;

use super::{Derived, Deriver};
use crate::distribution::{Distribution, DistributionKind};
use crate::exchange;
use crate::location::Location;
use crate::pending::{union_in_place, PendingUnion};
use crate::physical::PhysicalNode;
use crate::stages;

impl Deriver<'_> {
    /// Rows of one group never span two partitions of `dist`.
    fn grouped_by(&self, dist: &Distribution, group_by: &[String], assume_grouped: bool) -> bool {
        if dist.is_single_partition() || dist.is_broadcast() {
            return true;
        }
        if group_by.is_empty() {
            return false;
        }
        if dist.covered_by(group_by).is_some() {
            return true;
        }
        if self.config.enable_part_fix_key_colocation
            && group_by.iter().any(|k| dist.scheme_of(k).is_some())
        {
            return true;
        }
        assume_grouped && dist.is_keyed()
    }

    pub(super) fn derive_aggregate(
        &mut self,
        input: Derived,
        group_by: &[String],
        aggs: &[AggregateCall],
        assume_input_grouped: bool,
        schema: Schema,
    ) -> Result<PhysicalNode> {
        for key in group_by {
            input.schema().require(key)?;
        }
        let node = match input {
            Derived::Pending(pending) => {
                return self.aggregate_pending(pending, group_by, aggs, schema)
            }
            Derived::Node(node) => node,
        };

        if self.grouped_by(&node.distribution, group_by, assume_input_grouped) {
            return Ok(stages::single_aggregate(
                &mut self.ids,
                node,
                group_by,
                aggs,
                schema,
            ));
        }

        debug!(
            group_by = ?group_by,
            input = %node.distribution,
            "input not grouped; splitting aggregate"
        );
        let partial = stages::partial_calls(aggs);
        let pre = match &partial {
            Some(calls) => stages::partial_aggregate(&mut self.ids, node, group_by, calls)?,
            None => {
                debug!("aggregate has non-splittable calls; exchanging raw rows");
                node
            }
        };
        let moved = self.exchange_on_group_keys(pre, group_by)?;
        Ok(self.finish(moved, group_by, aggs, partial.is_some(), schema))
    }

    fn exchange_on_group_keys(
        &mut self,
        input: PhysicalNode,
        group_by: &[String],
    ) -> Result<PhysicalNode> {
        if group_by.is_empty() {
            let single = self.single_location()?;
            return Ok(self.gather(input, &single));
        }
        let target = self.compute_location(input.distribution.partition_count())?;
        let func = self.config.default_hash_function.clone();
        exchange::hash(&mut self.ids, input, group_by, None, &func, target, false)
    }

    fn finish(
        &mut self,
        input: PhysicalNode,
        group_by: &[String],
        aggs: &[AggregateCall],
        split: bool,
        schema: Schema,
    ) -> PhysicalNode {
        if split {
            stages::final_aggregate(&mut self.ids, input, group_by, aggs, schema)
        } else {
            stages::single_aggregate(&mut self.ids, input, group_by, aggs, schema)
        }
    }

    /// PARTIAL per branch group; the group already hashed on the group keys
    /// with the most partitions keeps its rows, the others move to it.
    fn aggregate_pending(
        &mut self,
        pending: PendingUnion,
        group_by: &[String],
        aggs: &[AggregateCall],
        schema: Schema,
    ) -> Result<PhysicalNode> {
        let partial = stages::partial_calls(aggs);
        let target = pending
            .groups
            .iter()
            .enumerate()
            .filter(|(_, g)| {
                !group_by.is_empty()
                    && g.distribution.kind() == DistributionKind::HashDistributed
                    && g.distribution.covered_by(group_by).is_some()
            })
            .max_by(|(ia, a), (ib, b)| {
                a.partition_count()
                    .cmp(&b.partition_count())
                    .then_with(|| ib.cmp(ia))
            })
            .map(|(i, _)| i);

        let in_schema = pending.schema.clone();
        let pre_schema = match &partial {
            Some(calls) => aggregate_schema(&in_schema, group_by, calls)?,
            None => in_schema.clone(),
        };
        let mut pre = Vec::with_capacity(pending.groups.len());
        for group in pending.groups {
            let node = group.into_node(&mut self.ids, &in_schema);
            pre.push(match &partial {
                Some(calls) => stages::partial_aggregate(&mut self.ids, node, group_by, calls)?,
                None => node,
            });
        }

        let moved = match target {
            Some(t) => {
                let layout = pre[t].distribution.clone();
                let location = Arc::clone(&pre[t].location);
                debug!(target = %location, layout = %layout, "aggregating pending union onto hashed group");
                self.move_all_like(pre, t, &layout, &location)?
            }
            None if group_by.is_empty() => {
                let single = self.single_location()?;
                pre.into_iter().map(|n| self.gather(n, &single)).collect()
            }
            None => {
                let widest = pre
                    .iter()
                    .map(|n| n.distribution.partition_count())
                    .max()
                    .unwrap_or(1);
                let location = self.compute_location(widest)?;
                let func = self.config.default_hash_function.clone();
                pre.into_iter()
                    .map(|n| {
                        exchange::hash(
                            &mut self.ids,
                            n,
                            group_by,
                            None,
                            &func,
                            Arc::clone(&location),
                            false,
                        )
                    })
                    .collect::<Result<Vec<_>>>()?
            }
        };

        let unioned = union_in_place(&mut self.ids, &pre_schema, moved)?;
        Ok(self.finish(unioned, group_by, aggs, partial.is_some(), schema))
    }

    fn move_all_like(
        &mut self,
        nodes: Vec<PhysicalNode>,
        keep: usize,
        layout: &Distribution,
        location: &Arc<Location>,
    ) -> Result<Vec<PhysicalNode>> {
        let func = self.config.default_hash_function.clone();
        nodes
            .into_iter()
            .enumerate()
            .map(|(i, n)| {
                if i == keep {
                    Ok(n)
                } else {
                    exchange::like(&mut self.ids, n, layout, &func, Arc::clone(location))
                }
            })
            .collect()
    }
}
