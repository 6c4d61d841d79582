//! ORDER BY / LIMIT / OFFSET.

use locus_core::dag::SortKey;
use locus_core::error::Result;
use tracing::debug;

use super::{Derived, Deriver};
use crate::pending::union_in_place;
use crate::physical::{PhysicalNode, PhysicalOp};
use crate::stages;

/// Push a bare LIMIT into the scan under `node` (through projections).
/// Fails when there is no such scan or it already carries a limit.
fn push_limit(node: &mut PhysicalNode, offset: Option<u64>, fetch: u64) -> bool {
    let Some(scan) = node.scan_below_projections_mut() else {
        return false;
    };
    match &mut scan.op {
        PhysicalOp::Scan {
            row_cap: row_cap @ None,
            offset: scan_offset @ None,
            ..
        } => {
            *row_cap = stages::local_bound(offset, Some(fetch));
            *scan_offset = offset;
            true
        }
        _ => false,
    }
}

impl Deriver<'_> {
    pub(super) fn derive_sort(
        &mut self,
        input: Derived,
        order: &[SortKey],
        offset: Option<u64>,
        fetch: Option<u64>,
    ) -> Result<Derived> {
        for key in order {
            input.schema().require(&key.column)?;
        }
        if order.is_empty() && offset.is_none() && fetch.is_none() {
            return Ok(input);
        }

        let mut node = match input {
            Derived::Pending(pending) => {
                let bound = stages::local_bound(offset, fetch);
                let single = self.single_location()?;
                let schema = pending.schema.clone();
                let mut gathered = Vec::with_capacity(pending.groups.len());
                for group in pending.groups {
                    let node = group.into_node(&mut self.ids, &schema);
                    let local = stages::local_sort(&mut self.ids, node, order, bound);
                    gathered.push(self.gather(local, &single));
                }
                let merged = union_in_place(&mut self.ids, &schema, gathered)?;
                return Ok(Derived::Node(stages::global_sort(
                    &mut self.ids,
                    merged,
                    order,
                    offset,
                    fetch,
                )));
            }
            Derived::Node(node) => node,
        };

        if let (true, Some(n)) = (order.is_empty(), fetch) {
            if push_limit(&mut node, offset, n) {
                debug!(cap = ?stages::local_bound(offset, fetch), "limit pushed into scan");
                return Ok(Derived::Node(node));
            }
        }

        let dist = &node.distribution;
        if dist.is_single_partition() || dist.is_broadcast() {
            return Ok(Derived::Node(stages::single_sort(
                &mut self.ids,
                node,
                order,
                offset,
                fetch,
            )));
        }

        let bound = stages::local_bound(offset, fetch);
        let local = stages::local_sort(&mut self.ids, node, order, bound);
        let single = self.single_location()?;
        let gathered = self.gather(local, &single);
        Ok(Derived::Node(stages::global_sort(
            &mut self.ids,
            gathered,
            order,
            offset,
            fetch,
        )))
    }
}
