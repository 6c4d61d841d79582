//! How a node's output rows are spread across the partitions of its Location.
//!
//! `Distribution` is an immutable value: every change goes through a
//! consuming `with_*` builder, so a parent always works on its own copy and
//! a child's frozen distribution can never be edited through a shared
//! reference.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use locus_core::types::Scalar;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DistributionKind {
    Singleton,
    HashDistributed,
    BroadcastDistributed,
    RandomDistributed,
    Range,
    Any,
}

/// One hash key: `position` is the column index in the node's output
/// schema, `name` the column name at that index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HashField {
    pub position: usize,
    pub name: String,
}

impl HashField {
    pub fn new(position: usize, name: impl Into<String>) -> Self {
        Self {
            position,
            name: name.into(),
        }
    }
}

/// Something known equal to a hash key in every output row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EqualTo {
    Column(String),
    Literal(Scalar),
}

/// Why a field is constant within each partition.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PartFixTag {
    /// The partition index and the field value determine each other under
    /// the named partitioning scheme. Equal schemes on two inputs at the
    /// same Location prove colocation on the tagged fields.
    Scheme(String),
    /// An upstream filter pinned the field to this literal (rendered).
    Constant(String),
}

impl PartFixTag {
    pub fn scheme(&self) -> Option<&str> {
        match self {
            PartFixTag::Scheme(s) => Some(s),
            PartFixTag::Constant(_) => None,
        }
    }
}

/// Scanned partitions per base table; `None` means every partition.
pub type TablePartitions = BTreeMap<String, Option<BTreeSet<u32>>>;

/// How two branches touching base tables were reconciled when grouped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TableMergeRank {
    /// Both branches scan explicit partition ids of a shared table.
    AssignedPartitions,
    /// A shared table, scanned whole by at least one branch.
    SharedTableHash,
    /// No table in common.
    NewTable,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Distribution {
    kind: DistributionKind,
    partition_count: usize,
    hash_fields: Vec<HashField>,
    hash_function: String,
    hash_params: Vec<String>,
    equal_hash_fields: Vec<Vec<EqualTo>>,
    part_fix_keys: BTreeMap<String, PartFixTag>,
    table_partitions: TablePartitions,
}

impl Distribution {
    fn bare(kind: DistributionKind, partition_count: usize) -> Self {
        Self {
            kind,
            partition_count,
            hash_fields: Vec::new(),
            hash_function: String::new(),
            hash_params: Vec::new(),
            equal_hash_fields: Vec::new(),
            part_fix_keys: BTreeMap::new(),
            table_partitions: BTreeMap::new(),
        }
    }

    pub fn singleton() -> Self {
        Self::bare(DistributionKind::Singleton, 1)
    }

    pub fn broadcast(partition_count: usize) -> Self {
        Self::bare(DistributionKind::BroadcastDistributed, partition_count)
    }

    pub fn random(partition_count: usize) -> Self {
        Self::bare(DistributionKind::RandomDistributed, partition_count)
    }

    pub fn any(partition_count: usize) -> Self {
        Self::bare(DistributionKind::Any, partition_count)
    }

    pub fn hash(
        partition_count: usize,
        hash_fields: Vec<HashField>,
        hash_function: impl Into<String>,
    ) -> Self {
        let keys = hash_fields.len();
        Self {
            hash_fields,
            hash_function: hash_function.into(),
            equal_hash_fields: vec![Vec::new(); keys],
            ..Self::bare(DistributionKind::HashDistributed, partition_count)
        }
    }

    pub fn range(partition_count: usize, hash_fields: Vec<HashField>) -> Self {
        let keys = hash_fields.len();
        Self {
            hash_fields,
            equal_hash_fields: vec![Vec::new(); keys],
            ..Self::bare(DistributionKind::Range, partition_count)
        }
    }

    pub fn kind(&self) -> DistributionKind {
        self.kind
    }

    pub fn partition_count(&self) -> usize {
        self.partition_count
    }

    pub fn hash_fields(&self) -> &[HashField] {
        &self.hash_fields
    }

    pub fn hash_function(&self) -> &str {
        &self.hash_function
    }

    pub fn hash_params(&self) -> &[String] {
        &self.hash_params
    }

    pub fn equal_hash_fields(&self) -> &[Vec<EqualTo>] {
        &self.equal_hash_fields
    }

    pub fn part_fix_keys(&self) -> &BTreeMap<String, PartFixTag> {
        &self.part_fix_keys
    }

    pub fn table_partitions(&self) -> &TablePartitions {
        &self.table_partitions
    }

    pub fn is_keyed(&self) -> bool {
        matches!(
            self.kind,
            DistributionKind::HashDistributed | DistributionKind::Range
        ) && !self.hash_fields.is_empty()
    }

    pub fn is_broadcast(&self) -> bool {
        self.kind == DistributionKind::BroadcastDistributed
    }

    /// All rows live in one partition, whatever the kind says.
    pub fn is_single_partition(&self) -> bool {
        self.kind == DistributionKind::Singleton || self.partition_count == 1
    }

    pub fn with_hash_params(mut self, params: Vec<String>) -> Self {
        self.hash_params = params;
        self
    }

    /// Replace the hash keys; the alias lists are reset to match.
    pub fn with_hash_fields(mut self, hash_fields: Vec<HashField>) -> Self {
        self.equal_hash_fields = vec![Vec::new(); hash_fields.len()];
        self.hash_fields = hash_fields;
        self
    }

    /// Replace the hash keys together with their alias lists.
    pub fn with_keys(mut self, keys: Vec<(HashField, Vec<EqualTo>)>) -> Self {
        let (fields, equal): (Vec<_>, Vec<_>) = keys.into_iter().unzip();
        self.hash_fields = fields;
        self.equal_hash_fields = equal;
        self
    }

    /// Record that key ordinal `key` equals `eq` in every row.
    pub fn with_equal(mut self, key: usize, eq: EqualTo) -> Self {
        if let Some(list) = self.equal_hash_fields.get_mut(key) {
            let is_self = matches!(&eq, EqualTo::Column(c) if *c == self.hash_fields[key].name);
            if !is_self && !list.contains(&eq) {
                list.push(eq);
            }
        }
        self
    }

    pub fn with_part_fix_key(mut self, name: impl Into<String>, tag: PartFixTag) -> Self {
        self.part_fix_keys.insert(name.into(), tag);
        self
    }

    pub fn with_part_fix_keys(mut self, keys: BTreeMap<String, PartFixTag>) -> Self {
        self.part_fix_keys = keys;
        self
    }

    pub fn with_table_partitions(mut self, table_partitions: TablePartitions) -> Self {
        self.table_partitions = table_partitions;
        self
    }

    /// Keep the partition count and provenance metadata, drop the keys.
    pub fn degrade_to_random(self) -> Self {
        let kind = if self.is_single_partition() {
            DistributionKind::Singleton
        } else {
            DistributionKind::RandomDistributed
        };
        Self {
            part_fix_keys: self.part_fix_keys,
            table_partitions: self.table_partitions,
            ..Self::bare(kind, self.partition_count)
        }
    }

    /// Key ordinal `key` is (or is known equal to) column `name`.
    pub fn key_matches(&self, key: usize, name: &str) -> bool {
        match self.hash_fields.get(key) {
            Some(f) if f.name == name => true,
            Some(_) => self.equal_hash_fields[key]
                .iter()
                .any(|e| matches!(e, EqualTo::Column(c) if c == name)),
            None => false,
        }
    }

    /// For each hash key, the index into `keys` naming that key (directly or
    /// through an alias). `None` unless every hash key is covered.
    pub fn covered_by(&self, keys: &[String]) -> Option<Vec<usize>> {
        if !self.is_keyed() {
            return None;
        }
        (0..self.hash_fields.len())
            .map(|k| keys.iter().position(|name| self.key_matches(k, name)))
            .collect()
    }

    /// Same partition count and hashing scheme (function and params).
    pub fn same_scheme(&self, other: &Distribution) -> bool {
        self.partition_count == other.partition_count
            && self.hash_function == other.hash_function
            && self.hash_params == other.hash_params
    }

    /// No shuffle is needed to move from one layout to the other.
    pub fn shuffle_compatible(&self, other: &Distribution) -> bool {
        self.kind == other.kind
            && self.same_scheme(other)
            && self.hash_fields.len() == other.hash_fields.len()
            && self
                .hash_fields
                .iter()
                .zip(&other.hash_fields)
                .all(|(a, b)| a.position == b.position)
    }

    /// Scheme tag on `name`, if any.
    pub fn scheme_of(&self, name: &str) -> Option<&str> {
        self.part_fix_keys.get(name).and_then(PartFixTag::scheme)
    }

    /// Union of two branches living at the same Location, or `None` when the
    /// branches cannot share one output layout.
    pub fn merge_for_union(&self, other: &Distribution) -> Option<(Distribution, TableMergeRank)> {
        if self.partition_count != other.partition_count {
            return None;
        }
        if self.is_broadcast() != other.is_broadcast() && !self.is_single_partition() {
            return None;
        }
        let (tables, rank) = merge_table_partitions(&self.table_partitions, &other.table_partitions);

        let merged = if self.kind == DistributionKind::Singleton
            && other.kind == DistributionKind::Singleton
        {
            Distribution::singleton()
        } else if self.is_broadcast() && other.is_broadcast() {
            Distribution::broadcast(self.partition_count)
        } else if self.is_keyed() && self.kind == other.kind && self.shuffle_compatible(other) {
            // Aliases only survive if both branches agree on them.
            let keys = self
                .hash_fields
                .iter()
                .enumerate()
                .map(|(k, f)| {
                    let common = self.equal_hash_fields[k]
                        .iter()
                        .filter(|e| other.equal_hash_fields[k].contains(e))
                        .cloned()
                        .collect();
                    (f.clone(), common)
                })
                .collect();
            Distribution {
                kind: self.kind,
                hash_function: self.hash_function.clone(),
                hash_params: self.hash_params.clone(),
                ..Distribution::bare(self.kind, self.partition_count)
            }
            .with_keys(keys)
        } else {
            Distribution::random(self.partition_count).degrade_to_random()
        };

        let part_fix = self
            .part_fix_keys
            .iter()
            .filter(|(name, tag)| other.part_fix_keys.get(*name) == Some(*tag))
            .map(|(n, t)| (n.clone(), t.clone()))
            .collect();

        Some((
            merged.with_part_fix_keys(part_fix).with_table_partitions(tables),
            rank,
        ))
    }
}

/// Merge per-table scanned partitions of two union branches.
///
/// Ranking, highest first: explicit partition ids on a shared table are
/// unioned; a shared table scanned whole by either side stays whole; tables
/// seen by only one side are carried over.
pub fn merge_table_partitions(
    a: &TablePartitions,
    b: &TablePartitions,
) -> (TablePartitions, TableMergeRank) {
    let mut out = a.clone();
    let mut rank = TableMergeRank::NewTable;
    for (table, parts) in b {
        match out.get_mut(table) {
            Some(existing) => match (existing.as_mut(), parts) {
                (Some(mine), Some(theirs)) => {
                    mine.extend(theirs.iter().copied());
                    rank = rank.min(TableMergeRank::AssignedPartitions);
                }
                _ => {
                    *existing = None;
                    rank = rank.min(TableMergeRank::SharedTableHash);
                }
            },
            None => {
                out.insert(table.clone(), parts.clone());
            }
        }
    }
    (out, rank)
}

impl fmt::Display for Distribution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            DistributionKind::Singleton => write!(f, "Singleton"),
            DistributionKind::BroadcastDistributed => {
                write!(f, "Broadcast({})", self.partition_count)
            }
            DistributionKind::RandomDistributed => write!(f, "Random({})", self.partition_count),
            DistributionKind::Any => write!(f, "Any({})", self.partition_count),
            DistributionKind::HashDistributed | DistributionKind::Range => {
                let label = if self.kind == DistributionKind::Range {
                    "Range"
                } else {
                    "Hash"
                };
                write!(f, "{label}[")?;
                for (i, h) in self.hash_fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}@{}", h.name, h.position)?;
                }
                write!(f, "]({}", self.partition_count)?;
                if !self.hash_function.is_empty() {
                    write!(f, ", {}", self.hash_function)?;
                }
                write!(f, ")")
            }
        }
    }
}
