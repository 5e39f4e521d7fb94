// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Arena-backed operator graph.
//!
//! Operators live in an indexed arena owned by the plan and are addressed by
//! [`OperatorId`]. Connectivity is stored twice (producer per input slot,
//! sorted consumer list per output slot) so both directions of the matcher
//! walk are O(1) lookups. Epochs are written only by [`Plan::add_operator`]
//! (always [`Epoch::ORIGIN`]) and by the crate-internal splice.
use std::collections::BTreeSet;
use std::fmt;

use thiserror::Error;

use crate::factory::ReplacementSubplan;
use crate::ident::{Epoch, OperatorId, PlatformId};
use crate::operator::{DataSetType, LogicalKind, Operator};
use crate::view::PlanView;

/// Direction of an operator slot.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum SlotDirection {
    /// Input slot.
    Input,
    /// Output slot.
    Output,
}

impl fmt::Display for SlotDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Input => "input",
            Self::Output => "output",
        })
    }
}

/// Output slot `index` of `operator`.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct OutputSlot {
    /// Owning operator.
    pub operator: OperatorId,
    /// Slot index.
    pub index: usize,
}

/// Input slot `index` of `operator`.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct InputSlot {
    /// Owning operator.
    pub operator: OperatorId,
    /// Slot index.
    pub index: usize,
}

/// Errors raised while building a plan.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanError {
    /// The operator is not (or no longer) part of the plan.
    #[error("operator not found: {0}")]
    UnknownOperator(OperatorId),
    /// The slot index exceeds the operator's arity.
    #[error("{direction} slot {slot} out of range for {operator} (arity {arity})")]
    SlotOutOfRange {
        /// Operator addressed.
        operator: OperatorId,
        /// Slot direction.
        direction: SlotDirection,
        /// Requested slot.
        slot: usize,
        /// Declared arity in that direction.
        arity: usize,
    },
    /// Inputs accept a single producer.
    #[error("input slot {slot} of {operator} is already connected")]
    InputAlreadyConnected {
        /// Consumer operator.
        operator: OperatorId,
        /// Input slot.
        slot: usize,
    },
    /// Producer and consumer slot types differ.
    #[error("type mismatch: output carries `{produced}` but input expects `{expected}`")]
    TypeMismatch {
        /// Type of the producing output slot.
        produced: DataSetType,
        /// Type of the consuming input slot.
        expected: DataSetType,
    },
    /// The connection would close a cycle.
    #[error("connecting {from} to {to} would create a cycle")]
    Cycle {
        /// Producer operator.
        from: OperatorId,
        /// Consumer operator.
        to: OperatorId,
    },
    /// Slot counts disagree with the logical family's fixed arity.
    #[error(
        "{kind} expects {expected_inputs} in / {expected_outputs} out, got {inputs} / {outputs}"
    )]
    ArityMismatch {
        /// Logical family.
        kind: LogicalKind,
        /// Family input arity.
        expected_inputs: usize,
        /// Family output arity.
        expected_outputs: usize,
        /// Supplied input slots.
        inputs: usize,
        /// Supplied output slots.
        outputs: usize,
    },
}

/// Raw id for the next arena slot, or `None` once the id space is used up.
fn arena_slot(len: usize) -> Option<u32> {
    u32::try_from(len).ok().filter(|&raw| raw < OperatorId::LIMIT)
}

// Only called with indices of existing slots, which `arena_slot` bounded.
#[allow(clippy::cast_possible_truncation)]
fn id_at(index: usize) -> OperatorId {
    OperatorId(index as u32)
}

/// An operator placed in a plan: record, epoch, and slot connectivity.
#[derive(Clone, Debug)]
pub struct PlanNode {
    operator: Operator,
    epoch: Epoch,
    producers: Vec<Option<OutputSlot>>,
    consumers: Vec<Vec<InputSlot>>,
}

impl PlanNode {
    fn new(operator: Operator, epoch: Epoch) -> Self {
        Self {
            producers: vec![None; operator.input_count()],
            consumers: vec![Vec::new(); operator.output_count()],
            operator,
            epoch,
        }
    }

    /// The operator record.
    #[must_use]
    pub fn operator(&self) -> &Operator {
        &self.operator
    }

    /// Rewrite pass that created this operator.
    #[must_use]
    pub fn epoch(&self) -> Epoch {
        self.epoch
    }

    /// Producer feeding input `index`, if connected.
    #[must_use]
    pub fn producer(&self, index: usize) -> Option<OutputSlot> {
        self.producers.get(index).copied().flatten()
    }

    /// Consumers fed by output `index`, in ascending order.
    #[must_use]
    pub fn consumers(&self, index: usize) -> &[InputSlot] {
        self.consumers.get(index).map_or(&[], Vec::as_slice)
    }
}

/// A plan: operators plus their connections.
///
/// Cloning is the supported way to explore alternatives; clones share nothing
/// mutable and keep operator ids stable.
#[derive(Clone, Debug, Default)]
pub struct Plan {
    nodes: Vec<Option<PlanNode>>,
    live: usize,
}

impl Plan {
    /// Creates an empty plan.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an operator of the original plan (epoch 0).
    ///
    /// # Panics
    /// When the plan has already handed out [`OperatorId::LIMIT`] ids.
    pub fn add_operator(&mut self, operator: Operator) -> OperatorId {
        self.insert(operator, Epoch::ORIGIN)
    }

    fn insert(&mut self, operator: Operator, epoch: Epoch) -> OperatorId {
        let slot = arena_slot(self.nodes.len());
        assert!(
            slot.is_some(),
            "operator arena exhausted: a plan hands out at most {} ids",
            OperatorId::LIMIT
        );
        let id = OperatorId(slot.unwrap_or(OperatorId::LIMIT));
        self.nodes.push(Some(PlanNode::new(operator, epoch)));
        self.live += 1;
        id
    }

    /// Connects output `output` of `producer` to input `input` of `consumer`.
    ///
    /// # Errors
    /// Fails when either operator is unknown, a slot is out of range, the
    /// input is already fed, the slot types differ, or the edge would close a
    /// cycle.
    pub fn connect(
        &mut self,
        producer: OperatorId,
        output: usize,
        consumer: OperatorId,
        input: usize,
    ) -> Result<(), PlanError> {
        let from = self.node(producer).ok_or(PlanError::UnknownOperator(producer))?;
        let to = self.node(consumer).ok_or(PlanError::UnknownOperator(consumer))?;
        let Some(produced) = from.operator.outputs().get(output) else {
            return Err(PlanError::SlotOutOfRange {
                operator: producer,
                direction: SlotDirection::Output,
                slot: output,
                arity: from.operator.output_count(),
            });
        };
        let Some(expected) = to.operator.inputs().get(input) else {
            return Err(PlanError::SlotOutOfRange {
                operator: consumer,
                direction: SlotDirection::Input,
                slot: input,
                arity: to.operator.input_count(),
            });
        };
        if to.producer(input).is_some() {
            return Err(PlanError::InputAlreadyConnected {
                operator: consumer,
                slot: input,
            });
        }
        if produced != expected {
            return Err(PlanError::TypeMismatch {
                produced: produced.clone(),
                expected: expected.clone(),
            });
        }
        if producer == consumer || self.reaches(consumer, producer) {
            return Err(PlanError::Cycle {
                from: producer,
                to: consumer,
            });
        }
        self.link(
            OutputSlot {
                operator: producer,
                index: output,
            },
            InputSlot {
                operator: consumer,
                index: input,
            },
        );
        Ok(())
    }

    /// Whether `to` is reachable from `from` along producer→consumer edges.
    fn reaches(&self, from: OperatorId, to: OperatorId) -> bool {
        let mut seen = vec![false; self.nodes.len()];
        let mut stack = vec![from];
        while let Some(id) = stack.pop() {
            if id == to {
                return true;
            }
            if std::mem::replace(&mut seen[id.index()], true) {
                continue;
            }
            if let Some(node) = self.node(id) {
                stack.extend(node.consumers.iter().flatten().map(|c| c.operator));
            }
        }
        false
    }

    fn link(&mut self, from: OutputSlot, to: InputSlot) {
        debug_assert!(self.contains(from.operator) && self.contains(to.operator));
        if let Some(Some(node)) = self.nodes.get_mut(to.operator.index()) {
            node.producers[to.index] = Some(from);
        }
        if let Some(Some(node)) = self.nodes.get_mut(from.operator.index()) {
            let consumers = &mut node.consumers[from.index];
            if let Err(pos) = consumers.binary_search(&to) {
                consumers.insert(pos, to);
            }
        }
    }

    fn remove(&mut self, id: OperatorId) -> Option<PlanNode> {
        let node = self.nodes.get_mut(id.index())?.take()?;
        self.live -= 1;
        for producer in node.producers.iter().flatten() {
            if let Some(Some(upstream)) = self.nodes.get_mut(producer.operator.index()) {
                upstream.consumers[producer.index].retain(|c| c.operator != id);
            }
        }
        for consumer in node.consumers.iter().flatten() {
            if let Some(Some(downstream)) = self.nodes.get_mut(consumer.operator.index()) {
                downstream.producers[consumer.index] = None;
            }
        }
        Some(node)
    }

    /// Replaces `matched` with `replacement`, rewiring the boundary.
    ///
    /// The caller guarantees that `replacement` was validated against the
    /// boundary (same counts and types) and that the matched set is sealed:
    /// no boundary producer or consumer belongs to `matched`. Every inserted
    /// operator is stamped with `epoch`; ids are returned in insertion order.
    pub(crate) fn splice(
        &mut self,
        matched: &[OperatorId],
        boundary_inputs: &[InputSlot],
        boundary_outputs: &[OutputSlot],
        replacement: ReplacementSubplan,
        epoch: Epoch,
    ) -> Vec<OperatorId> {
        let upstream: Vec<Option<OutputSlot>> = boundary_inputs
            .iter()
            .map(|slot| self.producer(*slot))
            .collect();
        let downstream: Vec<Vec<InputSlot>> = boundary_outputs
            .iter()
            .map(|slot| self.consumers(*slot).to_vec())
            .collect();
        for id in matched {
            self.remove(*id);
        }

        let (operators, connections, inputs, outputs) = replacement.into_parts();
        let inserted: Vec<OperatorId> = operators
            .into_iter()
            .map(|op| self.insert(op, epoch))
            .collect();
        for (from, to) in connections {
            self.link(
                OutputSlot {
                    operator: inserted[from.0],
                    index: from.1,
                },
                InputSlot {
                    operator: inserted[to.0],
                    index: to.1,
                },
            );
        }
        for (producer, (node, slot)) in upstream.into_iter().zip(inputs) {
            if let Some(producer) = producer {
                self.link(
                    producer,
                    InputSlot {
                        operator: inserted[node],
                        index: slot,
                    },
                );
            }
        }
        for (consumers, (node, slot)) in downstream.into_iter().zip(outputs) {
            let from = OutputSlot {
                operator: inserted[node],
                index: slot,
            };
            for consumer in consumers {
                self.link(from, consumer);
            }
        }
        inserted
    }

    /// Returns a read-only view over this plan.
    #[must_use]
    pub fn view(&self) -> PlanView<'_> {
        PlanView::new(self)
    }

    /// Returns the placed operator with `id`, if present.
    #[must_use]
    pub fn node(&self, id: OperatorId) -> Option<&PlanNode> {
        self.nodes.get(id.index()).and_then(Option::as_ref)
    }

    /// Returns the operator record with `id`, if present.
    #[must_use]
    pub fn operator(&self, id: OperatorId) -> Option<&Operator> {
        self.node(id).map(PlanNode::operator)
    }

    /// Whether `id` is part of the plan.
    #[must_use]
    pub fn contains(&self, id: OperatorId) -> bool {
        self.node(id).is_some()
    }

    /// Number of operators in the plan.
    #[must_use]
    pub fn len(&self) -> usize {
        self.live
    }

    /// Whether the plan has no operators.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Iterates operators in ascending id order.
    pub fn operators(&self) -> impl Iterator<Item = (OperatorId, &PlanNode)> {
        self.nodes
            .iter()
            .enumerate()
            .filter_map(|(idx, node)| node.as_ref().map(|n| (id_at(idx), n)))
    }

    /// Iterates operator ids in ascending order.
    pub fn operator_ids(&self) -> impl Iterator<Item = OperatorId> + '_ {
        self.operators().map(|(id, _)| id)
    }

    /// Iterates all connections, ordered by producer slot then consumer slot.
    pub fn edges(&self) -> impl Iterator<Item = (OutputSlot, InputSlot)> + '_ {
        self.operators().flat_map(|(id, node)| {
            node.consumers
                .iter()
                .enumerate()
                .flat_map(move |(index, consumers)| {
                    consumers
                        .iter()
                        .map(move |c| (OutputSlot { operator: id, index }, *c))
                })
        })
    }

    /// Producer feeding `slot`, if any.
    #[must_use]
    pub fn producer(&self, slot: InputSlot) -> Option<OutputSlot> {
        self.node(slot.operator)?.producer(slot.index)
    }

    /// Consumers fed by `slot`, in ascending order.
    #[must_use]
    pub fn consumers(&self, slot: OutputSlot) -> &[InputSlot] {
        self.node(slot.operator)
            .map_or(&[], |node| node.consumers(slot.index))
    }

    /// Epoch of `id`, if present.
    #[must_use]
    pub fn epoch(&self, id: OperatorId) -> Option<Epoch> {
        self.node(id).map(PlanNode::epoch)
    }

    /// Highest epoch stamped on any operator.
    #[must_use]
    pub fn max_epoch(&self) -> Epoch {
        self.operators()
            .map(|(_, node)| node.epoch)
            .max()
            .unwrap_or(Epoch::ORIGIN)
    }

    /// Platforms targeted by the plan's execution operators.
    #[must_use]
    pub fn platforms(&self) -> BTreeSet<PlatformId> {
        self.operators()
            .filter_map(|(_, node)| node.operator.platform())
            .collect()
    }

    /// Whether every operator is platform-specific.
    #[must_use]
    pub fn is_fully_specialized(&self) -> bool {
        self.operators()
            .all(|(_, node)| node.operator.as_execution().is_some())
    }

    /// Operators in a deterministic topological order (producers first, ties
    /// broken by ascending id).
    #[must_use]
    pub fn topological_order(&self) -> Vec<OperatorId> {
        let mut pending: Vec<usize> = vec![0; self.nodes.len()];
        let mut ready = BTreeSet::new();
        for (id, node) in self.operators() {
            let fed = node.producers.iter().flatten().count();
            pending[id.index()] = fed;
            if fed == 0 {
                ready.insert(id);
            }
        }
        let mut order = Vec::with_capacity(self.live);
        while let Some(id) = ready.pop_first() {
            order.push(id);
            let Some(node) = self.node(id) else { continue };
            for consumer in node.consumers.iter().flatten() {
                let count = &mut pending[consumer.operator.index()];
                *count -= 1;
                if *count == 0 {
                    ready.insert(consumer.operator);
                }
            }
        }
        order
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
    fn connect_rejects_invalid_edges() {
        let mut plan = Plan::new();
        let src = plan.add_operator(Operator::source("in", row()));
        let map = plan.add_operator(Operator::map("f", row(), DataSetType::new("pair")));
        let sink = plan.add_operator(Operator::sink("out", row()));

        assert!(matches!(
            plan.connect(src, 1, map, 0),
            Err(PlanError::SlotOutOfRange {
                direction: SlotDirection::Output,
                ..
            })
        ));
        assert!(plan.connect(src, 0, map, 0).is_ok());
        assert!(matches!(
            plan.connect(src, 0, map, 0),
            Err(PlanError::InputAlreadyConnected { .. })
        ));
        assert!(matches!(
            plan.connect(map, 0, sink, 0),
            Err(PlanError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn connect_rejects_cycles() {
        let mut plan = Plan::new();
        let a = plan.add_operator(Operator::union(row()));
        let b = plan.add_operator(Operator::filter("p", row()));
        plan.connect(a, 0, b, 0).unwrap();
        assert_eq!(
            plan.connect(b, 0, a, 0),
            Err(PlanError::Cycle { from: b, to: a })
        );
    }

    #[test]
    fn topological_order_is_deterministic() {
        let mut plan = Plan::new();
        let sink = plan.add_operator(Operator::sink("out", row()));
        let src = plan.add_operator(Operator::source("in", row()));
        let filter = plan.add_operator(Operator::filter("p", row()));
        plan.connect(src, 0, filter, 0).unwrap();
        plan.connect(filter, 0, sink, 0).unwrap();
        assert_eq!(plan.topological_order(), vec![src, filter, sink]);
    }

    #[test]
    fn arena_slots_stop_before_the_id_space_wraps() {
        assert_eq!(arena_slot(0), Some(0));
        assert_eq!(arena_slot(41), Some(41));
        let limit = OperatorId::LIMIT as usize;
        assert_eq!(arena_slot(limit - 1), Some(OperatorId::LIMIT - 1));
        assert_eq!(arena_slot(limit), None);
        assert_eq!(arena_slot(usize::MAX), None);
    }
}
