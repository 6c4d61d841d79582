use std::sync::Arc;

use locus_core::dag::SinkTarget;
use locus_core::error::Result;

use super::{Derived, Deriver};
use crate::distribution::{Distribution, DistributionKind};
use crate::exchange;
use crate::location::Location;
use crate::physical::{PhysicalNode, PhysicalOp};

impl Deriver<'_> {
    pub(super) fn derive_sink(&mut self, input: Derived, target: &SinkTarget) -> Result<PhysicalNode> {
        let op = PhysicalOp::Sink {
            target: target.clone(),
        };
        match target {
            SinkTarget::Client => {
                let single = self.single_location()?;
                let node = match input {
                    Derived::Node(n) if n.distribution.is_single_partition() => n,
                    Derived::Node(n) => self.gather(n, &single),
                    Derived::Pending(p) => self.resolve_gathered(p, &single)?,
                };
                let schema = node.schema.clone();
                let location = node.location.clone();
                Ok(self.node(op, vec![node], schema, Distribution::singleton(), location))
            }
            SinkTarget::Table(table) => {
                let meta = self.catalog.table(table)?;
                let location = self.registry.location(&meta.location)?;
                let wanted = meta.distribution(input.schema(), &location, self.hash_function())?;

                let node = match input {
                    Derived::Pending(p) if wanted.kind() == DistributionKind::HashDistributed => {
                        let keys: Vec<String> =
                            wanted.hash_fields().iter().map(|f| f.name.clone()).collect();
                        self.resolve_hashed(p, &keys, &wanted, &location)?
                    }
                    other => {
                        let node = self.resolve(other)?;
                        self.place_for_table(node, &wanted, &location)?
                    }
                };
                let schema = node.schema.clone();
                Ok(self.node(op, vec![node], schema, wanted, location))
            }
        }
    }

    /// Move `node` so its rows land on the partitions that own them.
    fn place_for_table(
        &mut self,
        node: PhysicalNode,
        wanted: &Distribution,
        location: &Arc<Location>,
    ) -> Result<PhysicalNode> {
        let here = node.location.name == location.name;
        let fits = match wanted.kind() {
            DistributionKind::HashDistributed | DistributionKind::Range => {
                node.distribution.shuffle_compatible(wanted)
            }
            DistributionKind::RandomDistributed | DistributionKind::Any => {
                node.distribution.partition_count() == wanted.partition_count()
                    && !node.distribution.is_broadcast()
            }
            DistributionKind::BroadcastDistributed => node.distribution.is_broadcast(),
            DistributionKind::Singleton => node.distribution.is_single_partition(),
        };
        if here && fits {
            return Ok(node);
        }
        let func = self.config.default_hash_function.clone();
        exchange::like(&mut self.ids, node, wanted, &func, Arc::clone(location))
    }
}
