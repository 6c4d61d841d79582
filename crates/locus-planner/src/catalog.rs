//! Base-table placement metadata.
//!
//! Storage of this metadata is someone else's job; the planner only reads a
//! snapshot: which Location holds each table and how its rows are spread.

use std::collections::BTreeMap;

use locus_core::error::{Error, Result};
use locus_core::schema::Schema;
use serde::{Deserialize, Serialize};

use crate::distribution::{Distribution, HashField, PartFixTag};
use crate::location::Location;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TableLayout {
    Hash,
    Range,
    /// Replicated: every partition holds every row.
    Broadcast,
    Random,
    Singleton,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableMeta {
    pub name: String,
    /// Name of the Location holding the table.
    pub location: String,
    pub layout: TableLayout,
    #[serde(default)]
    pub hash_columns: Vec<String>,
    #[serde(default)]
    pub hash_function: Option<String>,
    #[serde(default)]
    pub hash_params: Vec<String>,
    /// Column → partitioning scheme that pins it per partition.
    #[serde(default)]
    pub part_fix_keys: BTreeMap<String, String>,
}

impl TableMeta {
    /// The table's Distribution as seen through `schema`, the column list a
    /// scan of it produces.
    pub fn distribution(
        &self,
        schema: &Schema,
        location: &Location,
        default_hash_function: &str,
    ) -> Result<Distribution> {
        let n = location.partition_count;
        let keyed = |d: Distribution| -> Result<Distribution> {
            let fields = self
                .hash_columns
                .iter()
                .map(|c| {
                    schema.index_of(c).map(|pos| HashField::new(pos, c.clone())).ok_or_else(
                        || {
                            Error::Catalog(format!(
                                "table '{}' hashes on '{c}', which the scan does not produce",
                                self.name
                            ))
                        },
                    )
                })
                .collect::<Result<Vec<_>>>()?;
            if fields.is_empty() {
                return Err(Error::Catalog(format!(
                    "table '{}' is {:?}-partitioned without key columns",
                    self.name, self.layout
                )));
            }
            Ok(d.with_hash_fields(fields)
                .with_hash_params(self.hash_params.clone()))
        };

        let dist = match self.layout {
            TableLayout::Singleton => {
                if n != 1 {
                    return Err(Error::Catalog(format!(
                        "singleton table '{}' sits at {} with {n} partitions",
                        self.name, location.name
                    )));
                }
                Distribution::singleton()
            }
            TableLayout::Broadcast => Distribution::broadcast(n),
            TableLayout::Random => Distribution::random(n),
            TableLayout::Hash => {
                let func = self
                    .hash_function
                    .clone()
                    .unwrap_or_else(|| default_hash_function.to_string());
                keyed(Distribution::hash(n, Vec::new(), func))?
            }
            TableLayout::Range => keyed(Distribution::range(n, Vec::new()))?,
        };

        Ok(self
            .part_fix_keys
            .iter()
            .filter(|(col, _)| schema.index_of(col).is_some())
            .fold(dist, |d, (col, scheme)| {
                d.with_part_fix_key(col.clone(), PartFixTag::Scheme(scheme.clone()))
            }))
    }
}

/// Read-only snapshot of base-table metadata.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Catalog {
    tables: BTreeMap<String, TableMeta>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table(mut self, meta: TableMeta) -> Self {
        self.tables.insert(meta.name.clone(), meta);
        self
    }

    pub fn insert(&mut self, meta: TableMeta) {
        self.tables.insert(meta.name.clone(), meta);
    }

    pub fn table(&self, name: &str) -> Result<&TableMeta> {
        self.tables
            .get(name)
            .ok_or_else(|| Error::Catalog(format!("unknown table '{name}'")))
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}
