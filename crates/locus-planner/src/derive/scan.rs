//! Leaves: base-table scans and literal rows.

use std::collections::BTreeSet;

use locus_core::error::{Error, Result};
use locus_core::schema::Schema;
use locus_core::types::Expr;

use super::Deriver;
use crate::distribution::{Distribution, TablePartitions};
use crate::fields::filter_distribution;
use crate::physical::{PhysicalNode, PhysicalOp};

impl Deriver<'_> {
    /// A scan lives wherever the catalog puts its table.
    pub(super) fn derive_scan(
        &mut self,
        table: &str,
        schema: &Schema,
        predicate: Option<&Expr>,
        partitions: Option<&[u32]>,
    ) -> Result<PhysicalNode> {
        let meta = self.catalog.table(table)?;
        let location = self.registry.location(&meta.location)?;
        let mut dist = meta.distribution(schema, &location, self.hash_function())?;

        let scanned = match partitions {
            Some(ids) => {
                if let Some(bad) = ids
                    .iter()
                    .find(|&&p| p as usize >= location.partition_count)
                {
                    return Err(Error::Plan(format!(
                        "scan of '{table}' names partition {bad}, but {location} has {} partitions",
                        location.partition_count
                    )));
                }
                Some(ids.iter().copied().collect::<BTreeSet<u32>>())
            }
            None => None,
        };
        let mut provenance = TablePartitions::new();
        provenance.insert(table.to_string(), scanned);
        dist = dist.with_table_partitions(provenance);

        if let Some(p) = predicate {
            for col in p.columns() {
                schema.require(col)?;
            }
            dist = filter_distribution(&dist, p);
        }

        Ok(self.node(
            PhysicalOp::Scan {
                table: table.to_string(),
                predicate: predicate.cloned(),
                partitions: partitions.map(<[u32]>::to_vec),
                row_cap: None,
                offset: None,
            },
            Vec::new(),
            schema.clone(),
            dist,
            location,
        ))
    }

    /// Literal rows are produced once, at the single Location.
    pub(super) fn derive_values(&mut self, schema: &Schema, rows: usize) -> Result<PhysicalNode> {
        let location = self.single_location()?;
        Ok(self.node(
            PhysicalOp::Values { rows },
            Vec::new(),
            schema.clone(),
            Distribution::singleton(),
            location,
        ))
    }
}
