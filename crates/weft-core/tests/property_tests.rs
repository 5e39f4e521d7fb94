// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
#![allow(missing_docs)]
mod common;

use proptest::prelude::*;
use proptest::test_runner::{Config as PropConfig, RngAlgorithm, TestRng, TestRunner};

use common::{fusion_rule, lowering_rule, row, XorShift64};
use weft_core::{Epoch, LogicalKind, Operator, OperatorId, Plan, PlanDigest};

/// Builds a random DAG of `len` single-input operators hanging off one source.
///
/// Each non-source operator picks an earlier operator as its producer, so the
/// result is acyclic by construction. Returns the plan plus the build recipe
/// `(kind, producer index)` so it can be rebuilt in a different order.
fn random_plan(seed: u64, len: usize) -> (Plan, Vec<(u8, usize)>) {
    let mut rng = XorShift64::new(seed);
    let mut recipe = Vec::with_capacity(len);
    for idx in 0..len {
        let kind = (rng.next_u64() % 3) as u8;
        let producer = rng.gen_range_usize(idx + 1);
        recipe.push((kind, producer));
    }
    (build(&recipe, false), recipe)
}

fn operator_for(kind: u8) -> Operator {
    match kind {
        0 => Operator::map("f", row(), row()),
        1 => Operator::filter("p", row()),
        _ => Operator::distinct(row()),
    }
}

/// Slot 0 is the source; recipe entry `i` becomes slot `i + 1`.
fn build(recipe: &[(u8, usize)], reversed: bool) -> Plan {
    let mut plan = Plan::new();
    let mut ids: Vec<Option<OperatorId>> = vec![None; recipe.len() + 1];
    let mut order: Vec<usize> = (0..=recipe.len()).collect();
    if reversed {
        order.reverse();
    }
    for slot in order {
        let op = if slot == 0 {
            Operator::source("in", row())
        } else {
            operator_for(recipe[slot - 1].0)
        };
        ids[slot] = Some(plan.add_operator(op));
    }
    for (idx, (_, producer)) in recipe.iter().enumerate() {
        let from = ids[*producer].unwrap();
        let to = ids[idx + 1].unwrap();
        plan.connect(from, 0, to, 0).unwrap();
    }
    plan
}

fn pinned_runner() -> TestRunner {
    const SEED_BYTES: [u8; 32] = [
        0x77, 0x65, 0x66, 0x74, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
        0, 0, 0, 0, 0, 0,
    ];
    let rng = TestRng::from_seed(RngAlgorithm::ChaCha, &SEED_BYTES);
    TestRunner::new_with_rng(
        PropConfig {
            cases: 64,
            ..PropConfig::default()
        },
        rng,
    )
}

#[test]
fn matcher_output_is_deterministic() {
    let mut runner = pinned_runner();
    runner
        .run(&(any::<u64>(), 1usize..24), |(seed, len)| {
            let (plan, _) = random_plan(seed, len);
            let rule = fusion_rule();
            let first = rule.find_matches(&plan, Epoch::new(1));
            let second = rule.find_matches(&plan.clone(), Epoch::new(1));
            prop_assert_eq!(first, second);
            Ok(())
        })
        .unwrap();
}

#[test]
fn rules_never_rematch_their_own_output() {
    let mut runner = pinned_runner();
    runner
        .run(&(any::<u64>(), 1usize..24), |(seed, len)| {
            let (mut plan, _) = random_plan(seed, len);
            let epoch = Epoch::new(1);
            for rule in [
                lowering_rule("test.map", LogicalKind::Map, "test.map"),
                fusion_rule(),
            ] {
                let receipt = rule.apply(&mut plan, epoch).unwrap();
                let inserted: Vec<OperatorId> = receipt
                    .entries()
                    .iter()
                    .filter_map(|e| match &e.disposition {
                        weft_core::Disposition::Applied { inserted } => Some(inserted.clone()),
                        weft_core::Disposition::Skipped(_) => None,
                    })
                    .flatten()
                    .collect();
                for id in &inserted {
                    prop_assert_eq!(plan.epoch(*id), Some(epoch));
                }
                for m in rule.find_matches(&plan, epoch) {
                    for id in m.operators() {
                        prop_assert!(!inserted.contains(&id));
                        prop_assert!(plan.epoch(id).unwrap() < epoch);
                    }
                }
            }
            Ok(())
        })
        .unwrap();
}

#[test]
fn boundary_edges_survive_fusion() {
    let mut runner = pinned_runner();
    runner
        .run(&(any::<u64>(), 1usize..24), |(seed, len)| {
            let (mut plan, _) = random_plan(seed, len);
            let edges_before = plan.edges().count();
            let receipt = fusion_rule().apply(&mut plan, Epoch::new(1)).unwrap();
            // Each fusion removes two operators and the edge between them.
            let fused = receipt.applied_count();
            prop_assert_eq!(plan.edges().count(), edges_before - fused);
            prop_assert_eq!(plan.len(), len + 1 - fused);
            Ok(())
        })
        .unwrap();
}

#[test]
fn digest_ignores_operator_numbering() {
    let mut runner = pinned_runner();
    runner
        .run(&(any::<u64>(), 1usize..24), |(seed, len)| {
            let (forward, recipe) = random_plan(seed, len);
            let backward = build(&recipe, true);
            prop_assert_eq!(PlanDigest::of(&forward), PlanDigest::of(&backward));
            Ok(())
        })
        .unwrap();
}
