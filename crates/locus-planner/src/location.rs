//! Execution-node groups and the registry that hands them out.
//!
//! A `Location` has a fixed partition count; every Distribution derived at
//! that Location must agree with it. The registry is read-only for the
//! duration of a compilation and may be shared by concurrent compilations.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use locus_core::error::{Error, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub name: String,
    #[serde(alias = "partitions")]
    pub partition_count: usize,
    /// Table groups this node group serves.
    #[serde(default)]
    pub table_groups: BTreeSet<String>,
    /// The group's designated single-partition Location (gathers, final
    /// sorts, client sinks).
    #[serde(default)]
    pub single: bool,
}

impl Location {
    pub fn new(name: impl Into<String>, partition_count: usize) -> Self {
        Self {
            name: name.into(),
            partition_count,
            table_groups: BTreeSet::new(),
            single: false,
        }
    }

    pub fn in_group(mut self, group: impl Into<String>) -> Self {
        self.table_groups.insert(group.into());
        self
    }

    pub fn as_single(mut self) -> Self {
        self.single = true;
        self
    }

    /// An empty group set means the Location serves every table group.
    pub fn serves(&self, group: &str) -> bool {
        self.table_groups.is_empty() || self.table_groups.contains(group)
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name, self.partition_count)
    }
}

/// Source of target Locations for freshly placed operators.
pub trait LocationRegistry: Send + Sync {
    /// Compute group of `table_group` whose partition count is closest to
    /// `min_partitions`, preferring groups at least that large.
    fn best_compute_location(&self, min_partitions: usize, table_group: &str)
        -> Result<Arc<Location>>;

    /// The single-partition Location of `table_group`.
    fn single_location(&self, table_group: &str) -> Result<Arc<Location>>;

    /// Look a Location up by name (base tables name theirs in the catalog).
    fn location(&self, name: &str) -> Result<Arc<Location>>;
}

/// Registry over a fixed list of Locations.
#[derive(Debug, Clone, Default)]
pub struct StaticLocationRegistry {
    locations: Vec<Arc<Location>>,
}

impl StaticLocationRegistry {
    pub fn new(locations: Vec<Location>) -> Result<Self> {
        let mut seen = BTreeSet::new();
        for loc in &locations {
            if loc.partition_count == 0 {
                return Err(Error::Catalog(format!(
                    "location '{}' has zero partitions",
                    loc.name
                )));
            }
            if loc.single && loc.partition_count != 1 {
                return Err(Error::Catalog(format!(
                    "single location '{}' must have one partition, has {}",
                    loc.name, loc.partition_count
                )));
            }
            if !seen.insert(loc.name.clone()) {
                return Err(Error::Catalog(format!("duplicate location '{}'", loc.name)));
            }
        }
        Ok(Self {
            locations: locations.into_iter().map(Arc::new).collect(),
        })
    }

    pub fn locations(&self) -> &[Arc<Location>] {
        &self.locations
    }
}

impl LocationRegistry for StaticLocationRegistry {
    fn best_compute_location(
        &self,
        min_partitions: usize,
        table_group: &str,
    ) -> Result<Arc<Location>> {
        let candidates = self
            .locations
            .iter()
            .filter(|l| !l.single && l.serves(table_group));

        // Smallest group that is large enough, else the largest one there is.
        let mut at_least: Option<&Arc<Location>> = None;
        let mut largest: Option<&Arc<Location>> = None;
        for loc in candidates {
            if loc.partition_count >= min_partitions
                && at_least.map_or(true, |b| loc.partition_count < b.partition_count)
            {
                at_least = Some(loc);
            }
            if largest.map_or(true, |b| loc.partition_count > b.partition_count) {
                largest = Some(loc);
            }
        }
        at_least
            .or(largest)
            .cloned()
            .ok_or_else(|| {
                Error::Catalog(format!(
                    "no compute location for table group '{table_group}' \
                     (wanted {min_partitions} partitions)"
                ))
            })
    }

    fn single_location(&self, table_group: &str) -> Result<Arc<Location>> {
        self.locations
            .iter()
            .find(|l| l.single && l.serves(table_group))
            .cloned()
            .ok_or_else(|| {
                Error::Catalog(format!(
                    "no single location for table group '{table_group}'"
                ))
            })
    }

    fn location(&self, name: &str) -> Result<Arc<Location>> {
        self.locations
            .iter()
            .find(|l| l.name == name)
            .cloned()
            .ok_or_else(|| Error::Catalog(format!("unknown location '{name}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> StaticLocationRegistry {
        StaticLocationRegistry::new(vec![
            Location::new("coord", 1).as_single(),
            Location::new("small", 4),
            Location::new("big", 16),
            Location::new("other", 32).in_group("analytics"),
        ])
        .unwrap()
    }

    #[test]
    fn best_prefers_smallest_sufficient() {
        let r = registry();
        assert_eq!(r.best_compute_location(3, "default").unwrap().name, "small");
        assert_eq!(r.best_compute_location(5, "default").unwrap().name, "big");
    }

    #[test]
    fn best_falls_back_to_largest() {
        let r = registry();
        assert_eq!(r.best_compute_location(64, "default").unwrap().name, "big");
        assert_eq!(r.best_compute_location(64, "analytics").unwrap().name, "other");
    }

    #[test]
    fn single_and_lookup() {
        let r = registry();
        assert_eq!(r.single_location("default").unwrap().name, "coord");
        assert!(r.location("nope").is_err());
    }

    #[test]
    fn empty_group_is_unschedulable() {
        let r = StaticLocationRegistry::new(vec![Location::new("x", 4).in_group("a")]).unwrap();
        assert!(matches!(
            r.best_compute_location(1, "b"),
            Err(Error::Catalog(_))
        ));
        assert!(r.single_location("a").is_err());
    }

    #[test]
    fn rejects_bad_single_location() {
        assert!(StaticLocationRegistry::new(vec![Location::new("s", 2).as_single()]).is_err());
    }
}
