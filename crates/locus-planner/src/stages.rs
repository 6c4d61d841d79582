//! Local + global operator pairs for aggregation and sorting.

use locus_core::dag::{aggregate_schema, AggFunc, AggregateCall, SortKey};
use locus_core::error::Result;
use locus_core::id::NodeIdGen;
use locus_core::schema::Schema;

use crate::distribution::Distribution;
use crate::fields::aggregate_distribution;
use crate::physical::{AggPhase, PhysicalNode, PhysicalOp, SortPhase};

/// Accumulator columns the PARTIAL stage emits for `aggs`, or `None` when
/// some call cannot be pre-aggregated (DISTINCT).
pub fn partial_calls(aggs: &[AggregateCall]) -> Option<Vec<AggregateCall>> {
    if aggs.iter().any(|a| a.distinct) {
        return None;
    }
    let mut out = Vec::with_capacity(aggs.len());
    for call in aggs {
        match call.func {
            AggFunc::Avg => {
                let arg = call.arg.as_deref();
                out.push(AggregateCall::new(
                    AggFunc::Sum,
                    arg,
                    format!("{}$sum", call.alias),
                ));
                out.push(AggregateCall::new(
                    AggFunc::Count,
                    arg,
                    format!("{}$count", call.alias),
                ));
            }
            _ => out.push(call.clone()),
        }
    }
    Some(out)
}

fn aggregate_node(
    ids: &mut NodeIdGen,
    input: PhysicalNode,
    phase: AggPhase,
    group_by: &[String],
    aggs: Vec<AggregateCall>,
    schema: Schema,
    distribution: Distribution,
) -> PhysicalNode {
    let location = input.location.clone();
    PhysicalNode {
        id: ids.next_id(),
        op: PhysicalOp::Aggregate {
            phase,
            group_by: group_by.to_vec(),
            aggs,
        },
        inputs: vec![input],
        schema,
        distribution,
        location,
    }
}

/// Whole aggregation where the input already lives.
pub fn single_aggregate(
    ids: &mut NodeIdGen,
    input: PhysicalNode,
    group_by: &[String],
    aggs: &[AggregateCall],
    schema: Schema,
) -> PhysicalNode {
    let dist = aggregate_distribution(&input.distribution, group_by, aggs);
    aggregate_node(ids, input, AggPhase::Single, group_by, aggs.to_vec(), schema, dist)
}

/// Per-partition pre-aggregation emitting `partial` accumulator columns.
pub fn partial_aggregate(
    ids: &mut NodeIdGen,
    input: PhysicalNode,
    group_by: &[String],
    partial: &[AggregateCall],
) -> Result<PhysicalNode> {
    let schema = aggregate_schema(&input.schema, group_by, partial)?;
    let dist = aggregate_distribution(&input.distribution, group_by, partial);
    Ok(aggregate_node(
        ids,
        input,
        AggPhase::Partial,
        group_by,
        partial.to_vec(),
        schema,
        dist,
    ))
}

/// Merge step after the exchange. `aggs` are the original calls; their
/// accumulators arrive as the partial stage's columns.
pub fn final_aggregate(
    ids: &mut NodeIdGen,
    input: PhysicalNode,
    group_by: &[String],
    aggs: &[AggregateCall],
    schema: Schema,
) -> PhysicalNode {
    // Pass-through values reach this stage under the call's own alias.
    let merged: Vec<AggregateCall> = aggs
        .iter()
        .map(|c| match c.pass_through_constant {
            true => AggregateCall {
                arg: Some(c.alias.clone()),
                ..c.clone()
            },
            false => c.clone(),
        })
        .collect();
    let dist = aggregate_distribution(&input.distribution, group_by, &merged);
    aggregate_node(ids, input, AggPhase::Final, group_by, aggs.to_vec(), schema, dist)
}

/// Rows a per-partition sort must keep so the global stage can still apply
/// `offset` and `fetch`.
pub fn local_bound(offset: Option<u64>, fetch: Option<u64>) -> Option<u64> {
    fetch.map(|f| f.saturating_add(offset.unwrap_or(0)))
}

fn sort_node(
    ids: &mut NodeIdGen,
    input: PhysicalNode,
    phase: SortPhase,
    order: &[SortKey],
    offset: Option<u64>,
    fetch: Option<u64>,
) -> PhysicalNode {
    let location = input.location.clone();
    let distribution = input.distribution.clone();
    PhysicalNode {
        id: ids.next_id(),
        op: PhysicalOp::Sort {
            phase,
            order: order.to_vec(),
            offset,
            fetch,
        },
        schema: input.schema.clone(),
        inputs: vec![input],
        distribution,
        location,
    }
}

pub fn single_sort(
    ids: &mut NodeIdGen,
    input: PhysicalNode,
    order: &[SortKey],
    offset: Option<u64>,
    fetch: Option<u64>,
) -> PhysicalNode {
    sort_node(ids, input, SortPhase::Single, order, offset, fetch)
}

/// Per-partition sort keeping at most `bound` rows. An existing local sort
/// with the same order is tightened instead of stacked.
pub fn local_sort(
    ids: &mut NodeIdGen,
    input: PhysicalNode,
    order: &[SortKey],
    bound: Option<u64>,
) -> PhysicalNode {
    if let PhysicalOp::Sort {
        phase: SortPhase::Local,
        order: existing,
        fetch,
        ..
    } = &input.op
    {
        if existing.as_slice() == order {
            let tightened = match (*fetch, bound) {
                (Some(a), Some(b)) => Some(a.min(b)),
                (a, b) => a.or(b),
            };
            return PhysicalNode {
                op: PhysicalOp::Sort {
                    phase: SortPhase::Local,
                    order: order.to_vec(),
                    offset: None,
                    fetch: tightened,
                },
                ..input
            };
        }
    }
    sort_node(ids, input, SortPhase::Local, order, None, bound)
}

/// Merge of locally sorted rows, applying the query's offset and fetch.
pub fn global_sort(
    ids: &mut NodeIdGen,
    input: PhysicalNode,
    order: &[SortKey],
    offset: Option<u64>,
    fetch: Option<u64>,
) -> PhysicalNode {
    sort_node(ids, input, SortPhase::Global, order, offset, fetch)
}
