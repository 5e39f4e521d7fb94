// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Canonical structural plan digest.
//!
//! Determinism contract
//! - Every operator starts from a label covering its body (logical family and
//!   configuration, or execution name, platform and description) and its slot
//!   types.
//! - Labels are refined in rounds: the new label hashes the old one, each
//!   input slot as `0` (unconnected) or `1 || producer label || output
//!   index`, and each output slot as the sorted multiset of
//!   `consumer label || input index`. Refinement stops once a round no
//!   longer splits any class of equal labels, after at most one round per
//!   operator. Looking both upstream and downstream separates plans that
//!   differ only in fan-out.
//! - Operator ids, epochs, and labels are not hashed, so plans that differ
//!   only in arena numbering or rewrite history share a digest.
//! - The plan digest hashes the sorted multiset of final labels, prefixed by
//!   its length.
//! - Strings are length-prefixed; integers are little-endian `u64`.
use std::fmt;

use blake3::Hasher;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::ident::{Hash, OperatorId};
use crate::operator::{DataSetType, LogicalOperator, Operator, OperatorBody};
use crate::plan::Plan;

/// Canonical digest of a plan's structure.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct PlanDigest(pub Hash);

impl PlanDigest {
    /// Computes the digest of `plan`.
    #[must_use]
    pub fn of(plan: &Plan) -> Self {
        let ids: Vec<OperatorId> = plan.operator_ids().collect();
        let slot_of: FxHashMap<OperatorId, usize> =
            ids.iter().enumerate().map(|(slot, id)| (*id, slot)).collect();
        let mut labels: Vec<Hash> = ids
            .iter()
            .map(|&id| {
                let mut hasher = Hasher::new();
                hasher.update(b"op:");
                if let Some(operator) = plan.operator(id) {
                    encode_operator(&mut hasher, operator);
                }
                hasher.finalize().into()
            })
            .collect();

        let mut classes = class_count(&labels);
        for _ in 0..ids.len() {
            labels = ids
                .iter()
                .enumerate()
                .map(|(slot, &id)| refine(plan, &slot_of, &labels, slot, id))
                .collect();
            let refined = class_count(&labels);
            if refined == classes {
                break;
            }
            classes = refined;
        }

        labels.sort_unstable();
        let mut hasher = Hasher::new();
        hasher.update(b"plan:v2");
        put_u64(&mut hasher, labels.len() as u64);
        for label in &labels {
            hasher.update(label);
        }
        Self(hasher.finalize().into())
    }

    /// Returns the raw bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &Hash {
        &self.0
    }
}

impl fmt::Display for PlanDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0[..8] {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

fn class_count(labels: &[Hash]) -> usize {
    labels.iter().collect::<FxHashSet<_>>().len()
}

/// One refinement round for the operator at `slot` of `labels`.
fn refine(
    plan: &Plan,
    slot_of: &FxHashMap<OperatorId, usize>,
    labels: &[Hash],
    slot: usize,
    id: OperatorId,
) -> Hash {
    let Some(node) = plan.node(id) else {
        return labels[slot];
    };
    let label_of = |other: OperatorId| slot_of.get(&other).map(|&s| &labels[s]);
    let mut hasher = Hasher::new();
    hasher.update(b"refine:");
    hasher.update(&labels[slot]);
    for input in 0..node.operator().input_count() {
        match node
            .producer(input)
            .and_then(|p| label_of(p.operator).map(|label| (label, p.index)))
        {
            Some((upstream, index)) => {
                hasher.update(&[1]);
                hasher.update(upstream);
                put_u64(&mut hasher, index as u64);
            }
            None => {
                hasher.update(&[0]);
            }
        }
    }
    for output in 0..node.operator().output_count() {
        let mut fed: Vec<(Hash, u64)> = node
            .consumers(output)
            .iter()
            .filter_map(|c| label_of(c.operator).map(|label| (*label, c.index as u64)))
            .collect();
        fed.sort_unstable();
        put_u64(&mut hasher, fed.len() as u64);
        for (downstream, index) in &fed {
            hasher.update(downstream);
            put_u64(&mut hasher, *index);
        }
    }
    hasher.finalize().into()
}

fn put_u64(hasher: &mut Hasher, value: u64) {
    hasher.update(&value.to_le_bytes());
}

fn put_str(hasher: &mut Hasher, value: &str) {
    put_u64(hasher, value.len() as u64);
    hasher.update(value.as_bytes());
}

fn put_types(hasher: &mut Hasher, types: &[DataSetType]) {
    put_u64(hasher, types.len() as u64);
    for ty in types {
        put_str(hasher, ty.unit());
    }
}

fn encode_operator(hasher: &mut Hasher, operator: &Operator) {
    match operator.body() {
        OperatorBody::Logical(op) => {
            hasher.update(&[0]);
            encode_logical(hasher, op);
        }
        OperatorBody::Execution(op) => {
            hasher.update(&[1]);
            put_str(hasher, op.name());
            hasher.update(op.platform().as_bytes());
            put_str(hasher, &op.describe());
        }
    }
    put_types(hasher, operator.inputs());
    put_types(hasher, operator.outputs());
}

fn encode_logical(hasher: &mut Hasher, op: &LogicalOperator) {
    put_str(hasher, op.kind().label());
    match op {
        LogicalOperator::Source { name } | LogicalOperator::Sink { name } => put_str(hasher, name),
        LogicalOperator::Map { udf } | LogicalOperator::FlatMap { udf } => put_str(hasher, udf),
        LogicalOperator::Filter { predicate } => put_str(hasher, predicate),
        LogicalOperator::Sample { method, size, seed } => {
            put_str(hasher, method.label());
            put_u64(hasher, *size);
            match seed {
                Some(seed) => {
                    hasher.update(&[1]);
                    put_u64(hasher, *seed);
                }
                None => {
                    hasher.update(&[0]);
                }
            }
        }
        LogicalOperator::Sort { key } | LogicalOperator::GroupBy { key } => put_str(hasher, key),
        LogicalOperator::ReduceBy { key, udf } => {
            put_str(hasher, key);
            put_str(hasher, udf);
        }
        LogicalOperator::Join {
            left_key,
            right_key,
        } => {
            put_str(hasher, left_key);
            put_str(hasher, right_key);
        }
        LogicalOperator::Distinct | LogicalOperator::Count | LogicalOperator::Union => {}
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    fn row() -> DataSetType {
        DataSetType::new("row")
    }

    #[test]
    fn insertion_order_does_not_matter() {
        let mut a = Plan::new();
        let src = a.add_operator(Operator::source("in", row()));
        let map = a.add_operator(Operator::map("f", row(), row()));
        a.connect(src, 0, map, 0).unwrap();

        let mut b = Plan::new();
        let map = b.add_operator(Operator::map("f", row(), row()));
        let src = b.add_operator(Operator::source("in", row()));
        b.connect(src, 0, map, 0).unwrap();

        assert_eq!(PlanDigest::of(&a), PlanDigest::of(&b));
    }

    #[test]
    fn configuration_and_wiring_change_the_digest() {
        let build = |udf: &str, wired: bool| {
            let mut plan = Plan::new();
            let src = plan.add_operator(Operator::source("in", row()));
            let map = plan.add_operator(Operator::map(udf, row(), row()));
            if wired {
                plan.connect(src, 0, map, 0).unwrap();
            }
            PlanDigest::of(&plan)
        };
        assert_ne!(build("f", true), build("g", true));
        assert_ne!(build("f", true), build("f", false));
    }

    #[test]
    fn duplicate_operators_are_counted() {
        let mut one = Plan::new();
        one.add_operator(Operator::source("in", row()));
        let mut two = one.clone();
        two.add_operator(Operator::source("in", row()));
        assert_ne!(PlanDigest::of(&one), PlanDigest::of(&two));
    }

    #[test]
    fn fan_out_differs_from_parallel_producers() {
        // a: one source feeds both maps, the other source is idle.
        let mut shared = Plan::new();
        let s1 = shared.add_operator(Operator::source("in", row()));
        shared.add_operator(Operator::source("in", row()));
        let a = shared.add_operator(Operator::map("f", row(), row()));
        let b = shared.add_operator(Operator::map("f", row(), row()));
        shared.connect(s1, 0, a, 0).unwrap();
        shared.connect(s1, 0, b, 0).unwrap();

        // b: each source feeds one map.
        let mut split = Plan::new();
        let s1 = split.add_operator(Operator::source("in", row()));
        let s2 = split.add_operator(Operator::source("in", row()));
        let a = split.add_operator(Operator::map("f", row(), row()));
        let b = split.add_operator(Operator::map("f", row(), row()));
        split.connect(s1, 0, a, 0).unwrap();
        split.connect(s2, 0, b, 0).unwrap();

        assert_ne!(PlanDigest::of(&shared), PlanDigest::of(&split));
    }

    #[test]
    fn swapped_join_inputs_change_the_digest() {
        let build = |swap: bool| {
            let mut plan = Plan::new();
            let users = plan.add_operator(Operator::source("users", row()));
            let orders = plan.add_operator(Operator::source("orders", row()));
            let join = plan.add_operator(Operator::join("id", "id", row(), row(), row()));
            let (left, right) = if swap { (orders, users) } else { (users, orders) };
            plan.connect(left, 0, join, 0).unwrap();
            plan.connect(right, 0, join, 1).unwrap();
            PlanDigest::of(&plan)
        };
        assert_ne!(build(false), build(true));
    }
}
