//! Follows hash-key and part-fix-key identity through operators that rename,
//! drop or equate columns.
//!
//! Every function takes the child's frozen distribution by reference and
//! returns a fresh one for the parent.

use std::collections::BTreeMap;

use locus_core::dag::AggregateCall;
use locus_core::schema::{DataType, Schema};
use locus_core::types::{EqualityOperand, Expr};
use tracing::debug;

use crate::distribution::{Distribution, EqualTo, HashField, PartFixTag};

/// Distribution of `SELECT exprs FROM input`.
///
/// A hash key survives when some output column is exactly the key column
/// (a rename), exactly one of its column aliases, or exactly a literal the
/// key was pinned to. Losing any key degrades the output to random.
pub fn project_distribution(input: &Distribution, exprs: &[(Expr, String)]) -> Distribution {
    let part_fix = project_part_fix(input, exprs);

    if !input.is_keyed() {
        return input
            .clone()
            .with_part_fix_keys(part_fix);
    }

    let mut keys = Vec::with_capacity(input.hash_fields().len());
    for k in 0..input.hash_fields().len() {
        let outputs: Vec<usize> = exprs
            .iter()
            .enumerate()
            .filter(|(_, (e, _))| expr_is_key(input, k, e))
            .map(|(j, _)| j)
            .collect();
        let Some((&first, rest)) = outputs.split_first() else {
            debug!(
                key = %input.hash_fields()[k].name,
                "projection drops hash key; output degrades to random"
            );
            return input.clone().degrade_to_random().with_part_fix_keys(part_fix);
        };
        let mut equal: Vec<EqualTo> = rest
            .iter()
            .map(|&j| EqualTo::Column(exprs[j].1.clone()))
            .collect();
        equal.extend(
            input.equal_hash_fields()[k]
                .iter()
                .filter(|e| matches!(e, EqualTo::Literal(_)))
                .cloned(),
        );
        keys.push((HashField::new(first, exprs[first].1.clone()), equal));
    }

    input.clone().with_keys(keys).with_part_fix_keys(part_fix)
}

/// Does output expression `e` reproduce hash key `k` of `input`?
fn expr_is_key(input: &Distribution, k: usize, e: &Expr) -> bool {
    match e {
        Expr::Column(name) => input.key_matches(k, name),
        Expr::Literal(v) => input.equal_hash_fields()[k]
            .iter()
            .any(|eq| matches!(eq, EqualTo::Literal(l) if l == v)),
        _ => false,
    }
}

/// Names known equal to `name` in every row of `input` (including itself).
fn equivalents<'a>(input: &'a Distribution, name: &'a str) -> Vec<&'a str> {
    let mut out = vec![name];
    for (k, field) in input.hash_fields().iter().enumerate() {
        if input.key_matches(k, name) {
            out.push(&field.name);
            for eq in &input.equal_hash_fields()[k] {
                if let EqualTo::Column(c) = eq {
                    out.push(c);
                }
            }
        }
    }
    out.sort_unstable();
    out.dedup();
    out
}

fn project_part_fix(input: &Distribution, exprs: &[(Expr, String)]) -> BTreeMap<String, PartFixTag> {
    let mut out = BTreeMap::new();
    for (name, tag) in input.part_fix_keys() {
        let names = equivalents(input, name);
        for (e, out_name) in exprs {
            if let Expr::Column(c) = e {
                if names.contains(&c.as_str()) {
                    out.insert(out_name.clone(), tag.clone());
                }
            }
        }
    }
    for (e, out_name) in exprs {
        if let Some(v) = e.as_literal() {
            if !v.is_null() {
                out.entry(out_name.clone())
                    .or_insert_with(|| PartFixTag::Constant(v.to_string()));
            }
        }
    }
    out
}

/// Distribution after a filter. Columns do not move; equalities in the
/// predicate add key aliases and part-fix tags.
pub fn filter_distribution(input: &Distribution, predicate: &Expr) -> Distribution {
    let equalities = predicate.equalities();
    let mut dist = input.clone();
    // Each round can only add facts; chains like a = b AND b = c settle in
    // at most one round per equality.
    for _ in 0..=equalities.len() {
        let before = dist.clone();
        for (l, r) in &equalities {
            dist = match (l, r) {
                (EqualityOperand::Column(a), EqualityOperand::Column(b)) => {
                    apply_column_equality(apply_column_equality(dist, a, b), b, a)
                }
                (EqualityOperand::Column(a), EqualityOperand::Literal(v))
                | (EqualityOperand::Literal(v), EqualityOperand::Column(a)) => {
                    apply_literal_equality(dist, a, v)
                }
                _ => dist,
            };
        }
        if dist == before {
            break;
        }
    }
    dist
}

fn apply_column_equality(mut dist: Distribution, a: &str, b: &str) -> Distribution {
    for k in 0..dist.hash_fields().len() {
        if dist.key_matches(k, a) {
            dist = dist.with_equal(k, EqualTo::Column(b.to_string()));
        }
    }
    if let Some(tag) = dist.part_fix_keys().get(a).cloned() {
        if !dist.part_fix_keys().contains_key(b) {
            dist = dist.with_part_fix_key(b, tag);
        }
    }
    dist
}

fn apply_literal_equality(
    mut dist: Distribution,
    col: &str,
    value: &locus_core::types::Scalar,
) -> Distribution {
    for k in 0..dist.hash_fields().len() {
        if dist.key_matches(k, col) {
            dist = dist.with_equal(k, EqualTo::Literal(value.clone()));
        }
    }
    // A scheme tag is the stronger fact; keep it.
    if dist.scheme_of(col).is_none() {
        dist = dist.with_part_fix_key(col, PartFixTag::Constant(value.to_string()));
    }
    dist
}

/// Move every hash position by `offset` (right side of a join output).
pub fn shift_positions(input: &Distribution, offset: usize) -> Distribution {
    if !input.is_keyed() {
        return input.clone();
    }
    let keys = input
        .hash_fields()
        .iter()
        .zip(input.equal_hash_fields())
        .map(|(f, eq)| (HashField::new(f.position + offset, f.name.clone()), eq.clone()))
        .collect();
    input.clone().with_keys(keys)
}

/// Re-express a distribution computed against `from` in terms of the
/// column names of `to`, matching columns by position (union branches,
/// insert targets). Column aliases do not carry over; literal pins do.
pub fn rename_to_schema(input: &Distribution, from: &Schema, to: &Schema) -> Distribution {
    let part_fix: BTreeMap<String, PartFixTag> = input
        .part_fix_keys()
        .iter()
        .filter_map(|(name, tag)| {
            let pos = from.index_of(name)?;
            Some((to.field(pos)?.name.clone(), tag.clone()))
        })
        .collect();

    if !input.is_keyed() {
        return input.clone().with_part_fix_keys(part_fix);
    }

    let mut keys = Vec::with_capacity(input.hash_fields().len());
    for (f, eq) in input.hash_fields().iter().zip(input.equal_hash_fields()) {
        let Some(target) = to.field(f.position) else {
            return input.clone().degrade_to_random().with_part_fix_keys(part_fix);
        };
        let literals = eq
            .iter()
            .filter(|e| matches!(e, EqualTo::Literal(_)))
            .cloned()
            .collect();
        keys.push((HashField::new(f.position, target.name.clone()), literals));
    }
    input.clone().with_keys(keys).with_part_fix_keys(part_fix)
}

/// Distribution of an aggregate's output (group keys first, then one
/// column per call) computed where the input lives.
///
/// Group keys keep their identity. A pass-through-constant call is the
/// group-constant value of its argument, so it is treated as a rename of
/// that argument; every other call is opaque.
pub fn aggregate_distribution(
    input: &Distribution,
    group_by: &[String],
    aggs: &[AggregateCall],
) -> Distribution {
    let mut exprs: Vec<(Expr, String)> = group_by
        .iter()
        .map(|k| (Expr::col(k.clone()), k.clone()))
        .collect();
    for call in aggs {
        let source = match (&call.arg, call.pass_through_constant) {
            (Some(arg), true) => Expr::col(arg.clone()),
            _ => Expr::Call {
                func: format!("{:?}", call.func).to_lowercase(),
                args: call.arg.iter().map(|a| Expr::col(a.clone())).collect(),
                return_type: DataType::Int64,
            },
        };
        exprs.push((source, call.alias.clone()));
    }
    project_distribution(input, &exprs)
}

/// Part-fix tags of both join inputs; on a name clash the left one wins.
pub fn merge_part_fix(
    left: &BTreeMap<String, PartFixTag>,
    right: &BTreeMap<String, PartFixTag>,
) -> BTreeMap<String, PartFixTag> {
    let mut out = right.clone();
    out.extend(left.iter().map(|(k, v)| (k.clone(), v.clone())));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distribution::DistributionKind;
    use locus_core::dag::AggFunc;
    use locus_core::schema::Field;
    use locus_core::types::Scalar;

    fn hash_a() -> Distribution {
        Distribution::hash(4, vec![HashField::new(0, "a")], "murmur3")
    }

    #[test]
    fn rename_keeps_hash() {
        let out = project_distribution(&hash_a(), &[(Expr::col("a"), "b".into())]);
        assert_eq!(out.kind(), DistributionKind::HashDistributed);
        assert_eq!(out.hash_fields(), &[HashField::new(0, "b")]);
    }

    #[test]
    fn reordered_projection_moves_position() {
        let out = project_distribution(
            &hash_a(),
            &[(Expr::col("z"), "z".into()), (Expr::col("a"), "a".into())],
        );
        assert_eq!(out.hash_fields(), &[HashField::new(1, "a")]);
    }

    #[test]
    fn dropped_key_degrades() {
        let out = project_distribution(&hash_a(), &[(Expr::col("z"), "z".into())]);
        assert_eq!(out.kind(), DistributionKind::RandomDistributed);
        assert_eq!(out.partition_count(), 4);
    }

    #[test]
    fn alias_from_filter_rescues_key() {
        let filtered = filter_distribution(&hash_a(), &Expr::eq(Expr::col("a"), Expr::col("c")));
        let out = project_distribution(&filtered, &[(Expr::col("c"), "c".into())]);
        assert_eq!(out.hash_fields(), &[HashField::new(0, "c")]);
    }

    #[test]
    fn literal_pin_rescues_key() {
        let filtered = filter_distribution(
            &hash_a(),
            &Expr::eq(Expr::col("a"), Expr::lit(Scalar::I64(5))),
        );
        assert_eq!(
            filtered.part_fix_keys().get("a"),
            Some(&PartFixTag::Constant("5".into()))
        );
        let out = project_distribution(&filtered, &[(Expr::lit(Scalar::I64(5)), "k".into())]);
        assert_eq!(out.hash_fields(), &[HashField::new(0, "k")]);
    }

    #[test]
    fn equality_chain_settles() {
        let p = Expr::and(
            Expr::eq(Expr::col("c"), Expr::col("d")),
            Expr::eq(Expr::col("a"), Expr::col("c")),
        );
        let out = filter_distribution(&hash_a(), &p);
        assert!(out.key_matches(0, "d"));
    }

    #[test]
    fn part_fix_follows_alias_chain() {
        let d = hash_a().with_part_fix_key("r", PartFixTag::Scheme("geo".into()));
        let d = filter_distribution(&d, &Expr::eq(Expr::col("r"), Expr::col("r2")));
        let out = project_distribution(
            &d,
            &[(Expr::col("a"), "a".into()), (Expr::col("r2"), "region".into())],
        );
        assert_eq!(out.scheme_of("region"), Some("geo"));
    }

    #[test]
    fn duplicated_key_becomes_alias() {
        let out = project_distribution(
            &hash_a(),
            &[(Expr::col("a"), "x".into()), (Expr::col("a"), "y".into())],
        );
        assert!(out.key_matches(0, "y"));
    }

    #[test]
    fn rename_to_schema_uses_positions() {
        let from = Schema::new(vec![Field::new("a", DataType::Int64, false)]);
        let to = Schema::new(vec![Field::new("u", DataType::Int64, false)]);
        let out = rename_to_schema(&hash_a(), &from, &to);
        assert_eq!(out.hash_fields(), &[HashField::new(0, "u")]);
    }

    #[test]
    fn pass_through_constant_keeps_identity() {
        let mut call = AggregateCall::new(AggFunc::AnyValue, Some("a"), "a_any");
        call.pass_through_constant = true;
        let out = aggregate_distribution(&hash_a(), &["g".into()], &[call]);
        assert_eq!(out.hash_fields(), &[HashField::new(1, "a_any")]);

        let plain = AggregateCall::new(AggFunc::Max, Some("a"), "a_max");
        let out = aggregate_distribution(&hash_a(), &["g".into()], &[plain]);
        assert_eq!(out.kind(), DistributionKind::RandomDistributed);
    }

    #[test]
    fn shift_moves_positions() {
        let out = shift_positions(&hash_a(), 3);
        assert_eq!(out.hash_fields()[0].position, 3);
    }
}
