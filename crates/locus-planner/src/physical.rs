//! Physical plan nodes: the logical operator plus where its output lives.
//!
//! Every node is built once, bottom-up, with its final Distribution and
//! Location; rewrites create new nodes instead of editing old ones.

use std::fmt;
use std::sync::Arc;

use locus_core::dag::{
    AggregateCall, BuildSide, JoinAlgorithm, JoinType, SinkTarget, SortKey, TableFunctionMode,
};
use locus_core::hash::{hash_serde, Hash256};
use locus_core::id::NodeId;
use locus_core::schema::Schema;
use locus_core::types::Expr;
use serde::Serialize;

use crate::distribution::Distribution;
use crate::location::Location;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AggPhase {
    /// Whole aggregation in one step; input already grouped.
    Single,
    /// Per-partition pre-aggregation emitting accumulator columns.
    Partial,
    /// Merges accumulators after the exchange.
    Final,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SortPhase {
    Single,
    /// Per-partition sort bounded by `offset + fetch`.
    Local,
    /// Merge of locally sorted partitions at one place.
    Global,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExchangeKind {
    Hash,
    Broadcast,
    Range,
    Singleton,
    /// Round-robin; used to line up branches that share no key.
    Random,
}

impl fmt::Display for ExchangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExchangeKind::Hash => "hash",
            ExchangeKind::Broadcast => "broadcast",
            ExchangeKind::Range => "range",
            ExchangeKind::Singleton => "singleton",
            ExchangeKind::Random => "random",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum PhysicalOp {
    Scan {
        table: String,
        predicate: Option<Expr>,
        partitions: Option<Vec<u32>>,
        /// Pushed-down LIMIT: at most this many rows, counted before `offset`.
        row_cap: Option<u64>,
        offset: Option<u64>,
    },
    Values {
        rows: usize,
    },
    Filter {
        predicate: Expr,
    },
    Project {
        exprs: Vec<(Expr, String)>,
    },
    Join {
        algorithm: JoinAlgorithm,
        join_type: JoinType,
        left_keys: Vec<String>,
        right_keys: Vec<String>,
        build_side: BuildSide,
        condition: Option<Expr>,
    },
    Aggregate {
        phase: AggPhase,
        group_by: Vec<String>,
        aggs: Vec<AggregateCall>,
    },
    /// An empty `order` is a bare limit.
    Sort {
        phase: SortPhase,
        order: Vec<SortKey>,
        offset: Option<u64>,
        fetch: Option<u64>,
    },
    Union,
    TableFunction {
        name: String,
        args: Vec<Expr>,
        mode: TableFunctionMode,
    },
    Sink {
        target: SinkTarget,
    },
    Exchange {
        kind: ExchangeKind,
        /// Columns hashed or ranged on; empty for singleton/broadcast/random.
        keys: Vec<String>,
        /// Source partitions may be pruned against the target hash ranges.
        prunable: bool,
    },
}

impl PhysicalOp {
    /// One-line label used by explain output.
    pub fn label(&self) -> String {
        match self {
            PhysicalOp::Scan {
                table,
                row_cap,
                offset,
                partitions,
                ..
            } => {
                let mut s = format!("Scan {table}");
                if let Some(p) = partitions {
                    s.push_str(&format!(" partitions={p:?}"));
                }
                if let Some(cap) = row_cap {
                    s.push_str(&format!(" cap={cap}"));
                }
                if let Some(off) = offset {
                    s.push_str(&format!(" offset={off}"));
                }
                s
            }
            PhysicalOp::Values { rows } => format!("Values rows={rows}"),
            PhysicalOp::Filter { predicate } => format!("Filter {predicate}"),
            PhysicalOp::Project { exprs } => {
                let cols: Vec<String> = exprs
                    .iter()
                    .map(|(e, name)| match e.as_column() {
                        Some(c) if c == name => name.clone(),
                        _ => format!("{name}:={e}"),
                    })
                    .collect();
                format!("Project [{}]", cols.join(", "))
            }
            PhysicalOp::Join {
                algorithm,
                join_type,
                left_keys,
                right_keys,
                build_side,
                ..
            } => format!(
                "{algorithm:?}Join {join_type:?} [{}] = [{}] build={build_side:?}",
                left_keys.join(", "),
                right_keys.join(", ")
            ),
            PhysicalOp::Aggregate {
                phase,
                group_by,
                aggs,
            } => {
                let calls: Vec<&str> = aggs.iter().map(|a| a.alias.as_str()).collect();
                format!(
                    "Aggregate({phase:?}) by [{}] [{}]",
                    group_by.join(", "),
                    calls.join(", ")
                )
            }
            PhysicalOp::Sort {
                phase,
                order,
                offset,
                fetch,
            } => {
                let keys: Vec<String> = order
                    .iter()
                    .map(|k| {
                        if k.descending {
                            format!("{} desc", k.column)
                        } else {
                            k.column.clone()
                        }
                    })
                    .collect();
                let mut s = format!("Sort({phase:?}) [{}]", keys.join(", "));
                if let Some(off) = offset {
                    s.push_str(&format!(" offset={off}"));
                }
                if let Some(n) = fetch {
                    s.push_str(&format!(" fetch={n}"));
                }
                s
            }
            PhysicalOp::Union => "UnionAll".to_string(),
            PhysicalOp::TableFunction { name, mode, .. } => {
                format!("TableFunction {name} ({mode:?})")
            }
            PhysicalOp::Sink { target } => match target {
                SinkTarget::Client => "Sink client".to_string(),
                SinkTarget::Table(t) => format!("Sink table {t}"),
            },
            PhysicalOp::Exchange {
                kind,
                keys,
                prunable,
            } => {
                let mut s = format!("Exchange {kind}");
                if !keys.is_empty() {
                    s.push_str(&format!(" [{}]", keys.join(", ")));
                }
                if *prunable {
                    s.push_str(" prunable");
                }
                s
            }
        }
    }
}

/// A derived operator. `distribution.partition_count()` always equals
/// `location.partition_count`.
#[derive(Debug, Clone, Serialize)]
pub struct PhysicalNode {
    pub id: NodeId,
    pub op: PhysicalOp,
    pub inputs: Vec<PhysicalNode>,
    pub schema: Schema,
    pub distribution: Distribution,
    pub location: Arc<Location>,
}

impl PhysicalNode {
    pub fn is_exchange(&self) -> bool {
        matches!(self.op, PhysicalOp::Exchange { .. })
    }

    /// Pre-order visit of the whole subtree.
    pub fn walk<'a>(&'a self, f: &mut impl FnMut(&'a PhysicalNode)) {
        f(self);
        for input in &self.inputs {
            input.walk(f);
        }
    }

    /// Every node of the subtree matching `pred`, in pre-order.
    pub fn find_all(&self, pred: impl Fn(&PhysicalNode) -> bool) -> Vec<&PhysicalNode> {
        let mut out = Vec::new();
        self.walk(&mut |n| {
            if pred(n) {
                out.push(n);
            }
        });
        out
    }

    pub fn exchanges(&self) -> Vec<&PhysicalNode> {
        self.find_all(PhysicalNode::is_exchange)
    }

    pub fn node_count(&self) -> usize {
        let mut n = 0;
        self.walk(&mut |_| n += 1);
        n
    }

    /// Stable content hash of the derived plan (ids included).
    pub fn fingerprint(&self) -> locus_core::error::Result<Hash256> {
        hash_serde(self)
    }

    /// The scan reached from here through single-input row-preserving
    /// operators (projections), if any.
    pub fn scan_below_projections_mut(&mut self) -> Option<&mut PhysicalNode> {
        match self.op {
            PhysicalOp::Scan { .. } => Some(self),
            PhysicalOp::Project { .. } => self.inputs.first_mut()?.scan_below_projections_mut(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use locus_core::dag::SortKey;

    fn leaf(id: u64, op: PhysicalOp) -> PhysicalNode {
        PhysicalNode {
            id: NodeId::new(id),
            op,
            inputs: vec![],
            schema: Schema::default(),
            distribution: Distribution::singleton(),
            location: Arc::new(Location::new("coord", 1).as_single()),
        }
    }

    #[test]
    fn walk_and_count_exchanges() {
        let scan = leaf(
            0,
            PhysicalOp::Scan {
                table: "t".into(),
                predicate: None,
                partitions: None,
                row_cap: None,
                offset: None,
            },
        );
        let mut ex = leaf(
            1,
            PhysicalOp::Exchange {
                kind: ExchangeKind::Singleton,
                keys: vec![],
                prunable: false,
            },
        );
        ex.inputs.push(scan);
        assert_eq!(ex.node_count(), 2);
        assert_eq!(ex.exchanges().len(), 1);
    }

    #[test]
    fn labels() {
        let sort = PhysicalOp::Sort {
            phase: SortPhase::Local,
            order: vec![SortKey::desc("a")],
            offset: None,
            fetch: Some(8),
        };
        assert_eq!(sort.label(), "Sort(Local) [a desc] fetch=8");
        let ex = PhysicalOp::Exchange {
            kind: ExchangeKind::Hash,
            keys: vec!["a".into()],
            prunable: true,
        };
        assert_eq!(ex.label(), "Exchange hash [a] prunable");
    }

    #[test]
    fn fingerprint_is_stable() {
        let a = leaf(0, PhysicalOp::Values { rows: 3 });
        let b = leaf(0, PhysicalOp::Values { rows: 3 });
        assert_eq!(a.fingerprint().unwrap(), b.fingerprint().unwrap());
        let c = leaf(0, PhysicalOp::Values { rows: 4 });
        assert_ne!(a.fingerprint().unwrap(), c.fingerprint().unwrap());
    }
}
