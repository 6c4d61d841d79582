//! Builds redistribution nodes.
//!
//! An exchange has no Location of its own choosing: it takes the target
//! Location of the consumer that asked for it. Re-partitioning invalidates
//! scheme-based part-fix tags and scanned-partition provenance; literal
//! pins survive because the rows themselves do not change.

use std::sync::Arc;

use locus_core::error::{Error, Result};
use locus_core::id::NodeIdGen;

use crate::distribution::{Distribution, DistributionKind, HashField, PartFixTag};
use crate::location::Location;
use crate::physical::{ExchangeKind, PhysicalNode, PhysicalOp};

fn surviving_tags(input: &Distribution) -> std::collections::BTreeMap<String, PartFixTag> {
    input
        .part_fix_keys()
        .iter()
        .filter(|(_, tag)| matches!(tag, PartFixTag::Constant(_)))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

fn build(
    ids: &mut NodeIdGen,
    input: PhysicalNode,
    kind: ExchangeKind,
    keys: Vec<String>,
    prunable: bool,
    distribution: Distribution,
    location: Arc<Location>,
) -> PhysicalNode {
    let distribution = distribution.with_part_fix_keys(surviving_tags(&input.distribution));
    PhysicalNode {
        id: ids.next_id(),
        op: PhysicalOp::Exchange {
            kind,
            keys,
            prunable,
        },
        schema: input.schema.clone(),
        inputs: vec![input],
        distribution,
        location,
    }
}

/// Gather every row into the single partition of `location`.
pub fn singleton(ids: &mut NodeIdGen, input: PhysicalNode, location: Arc<Location>) -> PhysicalNode {
    build(
        ids,
        input,
        ExchangeKind::Singleton,
        Vec::new(),
        false,
        Distribution::singleton(),
        location,
    )
}

/// Replicate every row to every partition of `location`.
pub fn broadcast(ids: &mut NodeIdGen, input: PhysicalNode, location: Arc<Location>) -> PhysicalNode {
    if location.partition_count == 1 {
        return singleton(ids, input, location);
    }
    let n = location.partition_count;
    build(
        ids,
        input,
        ExchangeKind::Broadcast,
        Vec::new(),
        false,
        Distribution::broadcast(n),
        location,
    )
}

/// Spread rows round-robin over `location`.
pub fn random(ids: &mut NodeIdGen, input: PhysicalNode, location: Arc<Location>) -> PhysicalNode {
    if location.partition_count == 1 {
        return singleton(ids, input, location);
    }
    let n = location.partition_count;
    build(
        ids,
        input,
        ExchangeKind::Random,
        Vec::new(),
        false,
        Distribution::random(n),
        location,
    )
}

fn key_fields(input: &PhysicalNode, keys: &[String]) -> Result<Vec<HashField>> {
    if keys.is_empty() {
        return Err(Error::Plan("keyed exchange without keys".into()));
    }
    keys.iter()
        .map(|k| Ok(HashField::new(input.schema.require(k)?, k.clone())))
        .collect()
}

/// Hash-partition on `keys` (input column names, in key order) over
/// `location`. The hashing scheme is copied from `scheme` when given so the
/// result lines up with an existing layout; otherwise `default_function`.
pub fn hash(
    ids: &mut NodeIdGen,
    input: PhysicalNode,
    keys: &[String],
    scheme: Option<&Distribution>,
    default_function: &str,
    location: Arc<Location>,
    prunable: bool,
) -> Result<PhysicalNode> {
    if location.partition_count == 1 {
        return Ok(singleton(ids, input, location));
    }
    let fields = key_fields(&input, keys)?;
    let (function, params) = match scheme {
        Some(s) if !s.hash_function().is_empty() => {
            (s.hash_function().to_string(), s.hash_params().to_vec())
        }
        _ => (default_function.to_string(), Vec::new()),
    };
    let dist = Distribution::hash(location.partition_count, fields, function).with_hash_params(params);
    Ok(build(
        ids,
        input,
        ExchangeKind::Hash,
        keys.to_vec(),
        prunable,
        dist,
        location,
    ))
}

/// Range-partition on `keys` over `location`.
pub fn range(
    ids: &mut NodeIdGen,
    input: PhysicalNode,
    keys: &[String],
    location: Arc<Location>,
) -> Result<PhysicalNode> {
    if location.partition_count == 1 {
        return Ok(singleton(ids, input, location));
    }
    let fields = key_fields(&input, keys)?;
    let dist = Distribution::range(location.partition_count, fields);
    Ok(build(
        ids,
        input,
        ExchangeKind::Range,
        keys.to_vec(),
        false,
        dist,
        location,
    ))
}

/// Reproduce `target`'s layout (taken from a node with a positionally
/// identical schema) on `input`'s rows at `location`.
pub fn like(
    ids: &mut NodeIdGen,
    input: PhysicalNode,
    target: &Distribution,
    default_function: &str,
    location: Arc<Location>,
) -> Result<PhysicalNode> {
    let positional_keys = |input: &PhysicalNode| -> Result<Vec<String>> {
        target
            .hash_fields()
            .iter()
            .map(|f| {
                input
                    .schema
                    .field(f.position)
                    .map(|field| field.name.clone())
                    .ok_or_else(|| {
                        Error::Invariant(format!(
                            "hash position {} outside a {}-column row",
                            f.position,
                            input.schema.len()
                        ))
                    })
            })
            .collect()
    };
    match target.kind() {
        _ if target.is_single_partition() => Ok(singleton(ids, input, location)),
        DistributionKind::BroadcastDistributed => Ok(broadcast(ids, input, location)),
        DistributionKind::HashDistributed if target.is_keyed() => {
            let keys = positional_keys(&input)?;
            hash(ids, input, &keys, Some(target), default_function, location, false)
        }
        DistributionKind::Range if target.is_keyed() => {
            let keys = positional_keys(&input)?;
            range(ids, input, &keys, location)
        }
        _ => Ok(random(ids, input, location)),
    }
}
