// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Subplan matching.
//!
//! Ordering invariant: matches are emitted by ascending id of the operator
//! bound to the start node, then by the compiled step order, then by
//! ascending candidate id within each step. Two runs over the same plan and
//! pattern therefore yield identical sequences.
//!
//! The search is an explicit frame stack (one frame per compiled step), so
//! its depth is bounded by the pattern size, never by the plan size.
use std::sync::Arc;

use rustc_hash::FxHashSet;
use tracing::trace;

use crate::ident::{Epoch, OperatorId};
use crate::pattern::{MatchStep, SubplanPattern};
use crate::plan::{InputSlot, OutputSlot};
use crate::view::PlanView;

/// Concrete binding of pattern nodes to plan operators.
///
/// Bindings are listed in pattern declaration order; two matches are equal
/// iff they bind the same names to the same operators.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct Match {
    bindings: Vec<(Arc<str>, OperatorId)>,
}

impl Match {
    /// Operator bound to the pattern node `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<OperatorId> {
        self.bindings
            .iter()
            .find(|(bound, _)| &**bound == name)
            .map(|(_, id)| *id)
    }

    /// `(pattern node, operator)` pairs in pattern declaration order.
    #[must_use]
    pub fn bindings(&self) -> &[(Arc<str>, OperatorId)] {
        &self.bindings
    }

    /// Bound operators in pattern declaration order.
    pub fn operators(&self) -> impl Iterator<Item = OperatorId> + '_ {
        self.bindings.iter().map(|(_, id)| *id)
    }

    /// Operator bound to the pattern node at declaration index `node`.
    #[must_use]
    pub fn operator_at(&self, node: usize) -> Option<OperatorId> {
        self.bindings.get(node).map(|(_, id)| *id)
    }

    /// Number of bound pattern nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// Whether the match binds nothing (never true for matcher output).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

/// Slots through which a matched subplan talks to the rest of the plan.
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct MatchBoundary {
    /// Input slots not fed by a declared connection, in pattern node order
    /// then slot order.
    pub inputs: Vec<InputSlot>,
    /// Output slots of the designated output node, in slot order.
    pub outputs: Vec<OutputSlot>,
}

/// Finds [`Match`]es of a [`SubplanPattern`] in a plan.
#[derive(Debug, Clone, Copy)]
pub struct Matcher<'p> {
    pattern: &'p SubplanPattern,
}

struct Frame {
    step: usize,
    candidates: Vec<OperatorId>,
    cursor: usize,
}

impl<'p> Matcher<'p> {
    /// Creates a matcher for `pattern`.
    #[must_use]
    pub fn new(pattern: &'p SubplanPattern) -> Self {
        Self { pattern }
    }

    /// Returns every match in `view` for a rule producing `producing`.
    ///
    /// Operators with epoch `>= producing` are never bound. Matches whose
    /// operators cannot be spliced out cleanly are dropped: a non-output node
    /// feeding an operator outside the match, two matched operators joined
    /// by an edge the pattern does not declare, or a path from the output
    /// node back into the match, which the replacement would turn into a
    /// cycle.
    #[must_use]
    pub fn find(&self, view: PlanView<'_>, producing: Epoch) -> Vec<Match> {
        let mut found = Vec::new();
        for root in view.operator_ids() {
            if self.admits(view, 0, root, producing) {
                self.extend_from(view, root, producing, &mut found);
            }
        }
        trace!(matches = found.len(), "matcher finished");
        found
    }

    fn admits(&self, view: PlanView<'_>, node: usize, id: OperatorId, producing: Epoch) -> bool {
        view.node(id).is_some_and(|placed| {
            placed.epoch().is_matchable_by(producing)
                && self.pattern.nodes()[node].matches(placed.operator())
        })
    }

    fn extend_from(
        &self,
        view: PlanView<'_>,
        root: OperatorId,
        producing: Epoch,
        found: &mut Vec<Match>,
    ) {
        let steps = self.pattern.steps();
        let mut binding: Vec<Option<OperatorId>> = vec![None; self.pattern.nodes().len()];
        binding[0] = Some(root);
        if steps.is_empty() {
            self.emit(view, &binding, found);
            return;
        }

        let mut stack = vec![Frame {
            step: 0,
            candidates: self.candidates(view, steps[0], &binding, producing),
            cursor: 0,
        }];
        while let Some(frame) = stack.last_mut() {
            let step = frame.step;
            let target = steps[step].target();
            let next = frame.candidates.get(frame.cursor).copied();
            frame.cursor += 1;
            if let Some(node) = target {
                binding[node] = next;
            }
            if next.is_none() {
                stack.pop();
                continue;
            }
            if step + 1 == steps.len() {
                self.emit(view, &binding, found);
                continue;
            }
            let candidates = self.candidates(view, steps[step + 1], &binding, producing);
            stack.push(Frame {
                step: step + 1,
                candidates,
                cursor: 0,
            });
        }
    }

    fn candidates(
        &self,
        view: PlanView<'_>,
        step: MatchStep,
        binding: &[Option<OperatorId>],
        producing: Epoch,
    ) -> Vec<OperatorId> {
        let free = |id: OperatorId| !binding.contains(&Some(id));
        match step {
            MatchStep::Downstream(c) => {
                let Some(producer) = binding[c.producer] else {
                    return Vec::new();
                };
                view.consumers(OutputSlot {
                    operator: producer,
                    index: c.output,
                })
                .iter()
                .filter(|slot| slot.index == c.input)
                .map(|slot| slot.operator)
                .filter(|&id| free(id) && self.admits(view, c.consumer, id, producing))
                .collect()
            }
            MatchStep::Upstream(c) => {
                let Some(consumer) = binding[c.consumer] else {
                    return Vec::new();
                };
                view.producer(InputSlot {
                    operator: consumer,
                    index: c.input,
                })
                .filter(|slot| slot.index == c.output)
                .map(|slot| slot.operator)
                .filter(|&id| free(id) && self.admits(view, c.producer, id, producing))
                .into_iter()
                .collect()
            }
            MatchStep::Verify(c) => {
                let (Some(producer), Some(consumer)) = (binding[c.producer], binding[c.consumer])
                else {
                    return Vec::new();
                };
                let expected = OutputSlot {
                    operator: producer,
                    index: c.output,
                };
                let actual = view.producer(InputSlot {
                    operator: consumer,
                    index: c.input,
                });
                if actual == Some(expected) {
                    vec![producer]
                } else {
                    Vec::new()
                }
            }
        }
    }

    fn emit(&self, view: PlanView<'_>, binding: &[Option<OperatorId>], found: &mut Vec<Match>) {
        let bound: Option<Vec<OperatorId>> = binding.iter().copied().collect();
        let Some(bound) = bound else {
            return;
        };
        if !self.is_sealed(view, &bound) {
            trace!(?bound, "discarding match with leaking connections");
            return;
        }
        found.push(Match {
            bindings: self
                .pattern
                .nodes()
                .iter()
                .zip(bound)
                .map(|(node, id)| (node.shared_name().clone(), id))
                .collect(),
        });
    }

    /// Whether removing `bound` and rewiring only the pattern boundary
    /// preserves every other edge of the plan.
    fn is_sealed(&self, view: PlanView<'_>, bound: &[OperatorId]) -> bool {
        let node_of = |id: OperatorId| bound.iter().position(|b| *b == id);
        for (node, &id) in bound.iter().enumerate() {
            let Some(placed) = view.node(id) else {
                return false;
            };
            let operator = placed.operator();
            for slot in 0..operator.input_count() {
                if self.pattern.is_connected_input(node, slot) {
                    continue;
                }
                if placed
                    .producer(slot)
                    .is_some_and(|p| node_of(p.operator).is_some())
                {
                    return false;
                }
            }
            let is_output = node == self.pattern.output_node();
            for slot in 0..operator.output_count() {
                for consumer in placed.consumers(slot) {
                    let inside = node_of(consumer.operator);
                    let sealed = if is_output {
                        inside.is_none()
                    } else {
                        inside.is_some_and(|m| self.pattern.is_connected_input(m, consumer.index))
                    };
                    if !sealed {
                        return false;
                    }
                }
            }
        }
        !self.reenters(view, bound)
    }

    /// Whether a path leaving the output node leads back into `bound`.
    ///
    /// Only the output node feeds operators outside a sealed match, so every
    /// external path starts there.
    fn reenters(&self, view: PlanView<'_>, bound: &[OperatorId]) -> bool {
        let Some(&output) = bound.get(self.pattern.output_node()) else {
            return false;
        };
        let mut seen: FxHashSet<OperatorId> = FxHashSet::default();
        let mut pending = vec![output];
        while let Some(id) = pending.pop() {
            let Some(placed) = view.node(id) else {
                continue;
            };
            for slot in 0..placed.operator().output_count() {
                for consumer in placed.consumers(slot) {
                    if bound.contains(&consumer.operator) {
                        return true;
                    }
                    if seen.insert(consumer.operator) {
                        pending.push(consumer.operator);
                    }
                }
            }
        }
        false
    }

    /// Computes the boundary slots of `m` in `view`.
    ///
    /// Returns `None` when an operator of the match is no longer in the plan,
    /// or when earlier rewrites left the match unable to splice cleanly.
    #[must_use]
    pub fn boundary(&self, view: PlanView<'_>, m: &Match) -> Option<MatchBoundary> {
        let bound: Vec<OperatorId> = m.operators().collect();
        if !self.is_sealed(view, &bound) {
            return None;
        }
        let mut boundary = MatchBoundary::default();
        for (node, id) in m.operators().enumerate() {
            let operator = view.operator(id)?;
            for index in 0..operator.input_count() {
                if !self.pattern.is_connected_input(node, index) {
                    boundary.inputs.push(InputSlot {
                        operator: id,
                        index,
                    });
                }
            }
            if node == self.pattern.output_node() {
                boundary.outputs.extend(
                    (0..operator.output_count()).map(|index| OutputSlot {
                        operator: id,
                        index,
                    }),
                );
            }
        }
        Some(boundary)
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::operator::{DataSetType, LogicalKind, LogicalOperator, Operator};
    use crate::pattern::OperatorPattern;
    use crate::plan::Plan;

    fn row() -> DataSetType {
        DataSetType::new("row")
    }

    /// source -> map(f) -> filter(p) -> sink
    fn linear() -> (Plan, [OperatorId; 4]) {
        let mut plan = Plan::new();
        let src = plan.add_operator(Operator::source("in", row()));
        let map = plan.add_operator(Operator::map("f", row(), row()));
        let filter = plan.add_operator(Operator::filter("p", row()));
        let sink = plan.add_operator(Operator::sink("out", row()));
        plan.connect(src, 0, map, 0).unwrap();
        plan.connect(map, 0, filter, 0).unwrap();
        plan.connect(filter, 0, sink, 0).unwrap();
        (plan, [src, map, filter, sink])
    }

    fn map_filter() -> SubplanPattern {
        SubplanPattern::chain(vec![
            OperatorPattern::logical("map", LogicalKind::Map, false),
            OperatorPattern::logical("filter", LogicalKind::Filter, true),
        ])
        .unwrap()
    }

    #[test]
    fn chain_match_binds_in_declaration_order() {
        let (plan, [_, map, filter, _]) = linear();
        let pattern = map_filter();
        let matches = pattern.find_matches(&plan, Epoch::new(1));
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].get("map"), Some(map));
        assert_eq!(matches[0].get("filter"), Some(filter));
        let boundary = Matcher::new(&pattern)
            .boundary(plan.view(), &matches[0])
            .unwrap();
        assert_eq!(
            boundary.inputs,
            vec![InputSlot {
                operator: map,
                index: 0
            }]
        );
        assert_eq!(
            boundary.outputs,
            vec![OutputSlot {
                operator: filter,
                index: 0
            }]
        );
    }

    #[test]
    fn leaking_intermediate_output_is_not_matched() {
        let (mut plan, [_, map, _, _]) = linear();
        let tap = plan.add_operator(Operator::sink("tap", row()));
        plan.connect(map, 0, tap, 0).unwrap();
        assert!(map_filter().find_matches(&plan, Epoch::new(1)).is_empty());
    }

    #[test]
    fn start_candidates_without_pattern_neighbours_are_dropped() {
        let (mut plan, [src, _, _, _]) = linear();
        let second = plan.add_operator(Operator::filter("q", row()));
        let pattern = SubplanPattern::chain(vec![
            OperatorPattern::logical("src", LogicalKind::Source, false),
            OperatorPattern::logical("consumer", LogicalKind::Filter, true),
        ])
        .unwrap();
        let lone_src = plan.add_operator(Operator::source("lone", row()));
        plan.connect(lone_src, 0, second, 0).unwrap();
        let matches = pattern.find_matches(&plan, Epoch::new(1));
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].get("src"), Some(lone_src));
        assert_ne!(matches[0].get("src"), Some(src));
    }

    #[test]
    fn epoch_disqualified_operators_are_skipped() {
        let (plan, _) = linear();
        let pattern = SubplanPattern::singleton(
            OperatorPattern::logical("filter", LogicalKind::Filter, false)
                .with_logical_test(|op| matches!(op, LogicalOperator::Filter { .. })),
        );
        assert_eq!(pattern.find_matches(&plan, Epoch::new(1)).len(), 1);
        assert!(pattern.find_matches(&plan, Epoch::ORIGIN).is_empty());
    }
}
