// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Replacement subplans and the factories that build them.
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use crate::error::{BoundaryMismatch, UnsupportedVariantError};
use crate::ident::{Epoch, OperatorId};
use crate::matcher::{Match, MatchBoundary};
use crate::operator::{DataSetType, Operator};
use crate::pattern::SubplanPattern;
use crate::plan::{InputSlot, OutputSlot, SlotDirection};
use crate::view::PlanView;

/// Replacement-local slot reference: `(operator index, slot index)`.
pub type LocalSlot = (usize, usize);

/// A matched subplan as seen by a factory: bound operators plus the
/// boundary the replacement has to fill.
#[derive(Debug, Clone)]
pub struct MatchedSubplan<'a> {
    view: PlanView<'a>,
    pattern: &'a SubplanPattern,
    matched: &'a Match,
    boundary: &'a MatchBoundary,
    operators: Vec<&'a Operator>,
    root: &'a Operator,
}

impl<'a> MatchedSubplan<'a> {
    /// Resolves `matched` against `view`; `None` if an operator is gone.
    pub(crate) fn resolve(
        view: PlanView<'a>,
        pattern: &'a SubplanPattern,
        matched: &'a Match,
        boundary: &'a MatchBoundary,
    ) -> Option<Self> {
        let operators = matched
            .operators()
            .map(|id| view.operator(id))
            .collect::<Option<Vec<_>>>()?;
        let root = *operators.first()?;
        Some(Self {
            view,
            pattern,
            matched,
            boundary,
            operators,
            root,
        })
    }

    /// Read-only view of the plan being rewritten.
    #[must_use]
    pub fn view(&self) -> PlanView<'a> {
        self.view
    }

    /// The pattern that produced this match.
    #[must_use]
    pub fn pattern(&self) -> &'a SubplanPattern {
        self.pattern
    }

    /// The raw binding.
    #[must_use]
    pub fn bindings(&self) -> &'a Match {
        self.matched
    }

    /// Operator bound to the pattern node `name`.
    #[must_use]
    pub fn operator(&self, name: &str) -> Option<&'a Operator> {
        let node = self.pattern.index_of(name)?;
        self.operators.get(node).copied()
    }

    /// Id of the operator bound to the pattern node `name`.
    #[must_use]
    pub fn operator_id(&self, name: &str) -> Option<OperatorId> {
        self.matched.get(name)
    }

    /// Operator bound to the first pattern node.
    #[must_use]
    pub fn root(&self) -> &'a Operator {
        self.root
    }

    /// Bound operators in pattern declaration order.
    #[must_use]
    pub fn operators(&self) -> &[&'a Operator] {
        &self.operators
    }

    /// Boundary input slots, in the order replacements must expose them.
    #[must_use]
    pub fn boundary_inputs(&self) -> &'a [InputSlot] {
        &self.boundary.inputs
    }

    /// Boundary output slots, in the order replacements must expose them.
    #[must_use]
    pub fn boundary_outputs(&self) -> &'a [OutputSlot] {
        &self.boundary.outputs
    }

    /// Types of the boundary inputs.
    #[must_use]
    pub fn input_types(&self) -> Vec<DataSetType> {
        self.boundary
            .inputs
            .iter()
            .filter_map(|slot| {
                let op = self.view.operator(slot.operator)?;
                op.inputs().get(slot.index).cloned()
            })
            .collect()
    }

    /// Types of the boundary outputs.
    #[must_use]
    pub fn output_types(&self) -> Vec<DataSetType> {
        self.boundary
            .outputs
            .iter()
            .filter_map(|slot| {
                let op = self.view.operator(slot.operator)?;
                op.outputs().get(slot.index).cloned()
            })
            .collect()
    }
}

/// Operators that take the place of a match, with internal wiring and the
/// ordered slots exposed to the boundary.
#[derive(Debug, Clone)]
pub struct ReplacementSubplan {
    operators: Vec<Operator>,
    connections: Vec<(LocalSlot, LocalSlot)>,
    inputs: Vec<LocalSlot>,
    outputs: Vec<LocalSlot>,
}

impl ReplacementSubplan {
    /// One operator exposing all of its inputs and outputs in slot order.
    pub fn singleton(operator: Operator) -> Self {
        let inputs = (0..operator.input_count()).map(|slot| (0, slot)).collect();
        let outputs = (0..operator.output_count()).map(|slot| (0, slot)).collect();
        Self {
            operators: vec![operator],
            connections: Vec::new(),
            inputs,
            outputs,
        }
    }

    /// Linear replacement: output 0 of each operator feeds input 0 of the
    /// next; exposes the inputs of the first and the outputs of the last.
    pub fn chain(operators: Vec<Operator>) -> Self {
        let mut builder = Self::builder();
        let mut previous: Option<usize> = None;
        let last = operators.len().saturating_sub(1);
        for (position, operator) in operators.into_iter().enumerate() {
            let inputs = operator.input_count();
            let outputs = operator.output_count();
            let idx = builder.add_operator(operator);
            match previous {
                Some(prev) => builder.connect(prev, 0, idx, 0),
                None => (0..inputs).for_each(|slot| builder.expose_input(idx, slot)),
            }
            if position == last {
                (0..outputs).for_each(|slot| builder.expose_output(idx, slot));
            }
            previous = Some(idx);
        }
        builder.build()
    }

    /// Starts an explicitly wired replacement.
    pub fn builder() -> ReplacementSubplanBuilder {
        ReplacementSubplanBuilder::default()
    }

    /// Replacement operators in insertion order.
    #[must_use]
    pub fn operators(&self) -> &[Operator] {
        &self.operators
    }

    /// Exposed inputs, aligned with the boundary inputs.
    #[must_use]
    pub fn exposed_inputs(&self) -> &[LocalSlot] {
        &self.inputs
    }

    /// Exposed outputs, aligned with the boundary outputs.
    #[must_use]
    pub fn exposed_outputs(&self) -> &[LocalSlot] {
        &self.outputs
    }

    /// Checks that this replacement can stand in for a match whose boundary
    /// carries `inputs` and `outputs`.
    ///
    /// # Errors
    /// Returns the first [`BoundaryMismatch`] found.
    pub fn check_boundary(
        &self,
        inputs: &[DataSetType],
        outputs: &[DataSetType],
    ) -> Result<(), BoundaryMismatch> {
        if self.operators.is_empty() {
            return Err(BoundaryMismatch::EmptyReplacement);
        }
        let mut fed: Vec<Vec<bool>> = self
            .operators
            .iter()
            .map(|op| vec![false; op.input_count()])
            .collect();

        for &(from, to) in &self.connections {
            let produced = self.slot_type(from, SlotDirection::Output)?;
            let expected = self.slot_type(to, SlotDirection::Input)?;
            if produced != expected {
                return Err(BoundaryMismatch::InternalType {
                    produced: produced.clone(),
                    expected: expected.clone(),
                });
            }
            mark_fed(&mut fed, to)?;
        }
        if !self.is_acyclic() {
            return Err(BoundaryMismatch::Cycle);
        }

        if self.inputs.len() != inputs.len() {
            return Err(BoundaryMismatch::InputCount {
                expected: inputs.len(),
                found: self.inputs.len(),
            });
        }
        for (slot, (&local, expected)) in self.inputs.iter().zip(inputs).enumerate() {
            let found = self.slot_type(local, SlotDirection::Input)?;
            if found != expected {
                return Err(BoundaryMismatch::InputType {
                    slot,
                    expected: expected.clone(),
                    found: found.clone(),
                });
            }
            mark_fed(&mut fed, local)?;
        }

        if self.outputs.len() != outputs.len() {
            return Err(BoundaryMismatch::OutputCount {
                expected: outputs.len(),
                found: self.outputs.len(),
            });
        }
        for (slot, (&local, expected)) in self.outputs.iter().zip(outputs).enumerate() {
            let found = self.slot_type(local, SlotDirection::Output)?;
            if found != expected {
                return Err(BoundaryMismatch::OutputType {
                    slot,
                    expected: expected.clone(),
                    found: found.clone(),
                });
            }
        }
        Ok(())
    }

    #[allow(clippy::type_complexity)]
    pub(crate) fn into_parts(
        self,
    ) -> (
        Vec<Operator>,
        Vec<(LocalSlot, LocalSlot)>,
        Vec<LocalSlot>,
        Vec<LocalSlot>,
    ) {
        (self.operators, self.connections, self.inputs, self.outputs)
    }

    fn slot_type(
        &self,
        (operator, slot): LocalSlot,
        direction: SlotDirection,
    ) -> Result<&DataSetType, BoundaryMismatch> {
        let dangling = BoundaryMismatch::DanglingSlot {
            operator,
            direction,
            slot,
        };
        let op = self.operators.get(operator).ok_or_else(|| dangling.clone())?;
        let types = match direction {
            SlotDirection::Input => op.inputs(),
            SlotDirection::Output => op.outputs(),
        };
        types.get(slot).ok_or(dangling)
    }

    fn is_acyclic(&self) -> bool {
        let mut indegree = vec![0usize; self.operators.len()];
        for ((_, _), (to, _)) in &self.connections {
            indegree[*to] += 1;
        }
        let mut ready: VecDeque<usize> =
            (0..indegree.len()).filter(|&n| indegree[n] == 0).collect();
        let mut visited = 0;
        while let Some(n) = ready.pop_front() {
            visited += 1;
            for ((from, _), (to, _)) in &self.connections {
                if *from == n {
                    indegree[*to] -= 1;
                    if indegree[*to] == 0 {
                        ready.push_back(*to);
                    }
                }
            }
        }
        visited == self.operators.len()
    }
}

fn mark_fed(fed: &mut [Vec<bool>], (operator, slot): LocalSlot) -> Result<(), BoundaryMismatch> {
    match fed.get_mut(operator).and_then(|slots| slots.get_mut(slot)) {
        Some(taken) if *taken => Err(BoundaryMismatch::InputSlotReused { operator, slot }),
        Some(taken) => {
            *taken = true;
            Ok(())
        }
        None => Err(BoundaryMismatch::DanglingSlot {
            operator,
            direction: SlotDirection::Input,
            slot,
        }),
    }
}

/// Builder for [`ReplacementSubplan`]. Slot references are validated when
/// the replacement is checked against a boundary, not here.
#[derive(Debug, Default)]
pub struct ReplacementSubplanBuilder {
    operators: Vec<Operator>,
    connections: Vec<(LocalSlot, LocalSlot)>,
    inputs: Vec<LocalSlot>,
    outputs: Vec<LocalSlot>,
}

impl ReplacementSubplanBuilder {
    /// Adds an operator and returns its replacement-local index.
    pub fn add_operator(&mut self, operator: Operator) -> usize {
        self.operators.push(operator);
        self.operators.len() - 1
    }

    /// Wires output `output` of `producer` to input `input` of `consumer`.
    pub fn connect(&mut self, producer: usize, output: usize, consumer: usize, input: usize) {
        self.connections.push(((producer, output), (consumer, input)));
    }

    /// Exposes input `slot` of `operator` as the next boundary input.
    pub fn expose_input(&mut self, operator: usize, slot: usize) {
        self.inputs.push((operator, slot));
    }

    /// Exposes output `slot` of `operator` as the next boundary output.
    pub fn expose_output(&mut self, operator: usize, slot: usize) {
        self.outputs.push((operator, slot));
    }

    /// Finishes the replacement.
    pub fn build(self) -> ReplacementSubplan {
        ReplacementSubplan {
            operators: self.operators,
            connections: self.connections,
            inputs: self.inputs,
            outputs: self.outputs,
        }
    }
}

/// Single-operator replacement function.
pub type SingleOperatorFn =
    dyn Fn(&Operator, Epoch) -> Result<Operator, UnsupportedVariantError> + Send + Sync;

/// Multi-operator replacement function.
pub type MultiOperatorFn = dyn Fn(
    &MatchedSubplan<'_>,
    Epoch,
) -> Result<ReplacementSubplan, UnsupportedVariantError>
    + Send
    + Sync;

/// Builds replacement subplans for matches.
///
/// Factories are pure with respect to the plan: they read the match and
/// return a fresh replacement, or refuse the variant.
#[derive(Clone)]
pub enum ReplacementSubplanFactory {
    /// Maps the single bound operator to a single replacement operator.
    SingleOperator(Arc<SingleOperatorFn>),
    /// Builds an arbitrary replacement from the whole match.
    MultiOperator(Arc<MultiOperatorFn>),
}

impl fmt::Debug for ReplacementSubplanFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::SingleOperator(_) => "ReplacementSubplanFactory::SingleOperator",
            Self::MultiOperator(_) => "ReplacementSubplanFactory::MultiOperator",
        })
    }
}

impl ReplacementSubplanFactory {
    /// Wraps a one-to-one operator replacement.
    pub fn of_single_operator<F>(f: F) -> Self
    where
        F: Fn(&Operator, Epoch) -> Result<Operator, UnsupportedVariantError>
            + Send
            + Sync
            + 'static,
    {
        Self::SingleOperator(Arc::new(f))
    }

    /// Wraps a subplan replacement.
    pub fn of_multiple_operators<F>(f: F) -> Self
    where
        F: Fn(&MatchedSubplan<'_>, Epoch) -> Result<ReplacementSubplan, UnsupportedVariantError>
            + Send
            + Sync
            + 'static,
    {
        Self::MultiOperator(Arc::new(f))
    }

    /// Whether this factory only handles singleton patterns.
    #[must_use]
    pub fn is_single_operator(&self) -> bool {
        matches!(self, Self::SingleOperator(_))
    }

    /// Produces the replacement for `matched`.
    ///
    /// # Errors
    /// Propagates the factory's [`UnsupportedVariantError`].
    pub fn create_replacement(
        &self,
        matched: &MatchedSubplan<'_>,
        epoch: Epoch,
    ) -> Result<ReplacementSubplan, UnsupportedVariantError> {
        match self {
            Self::SingleOperator(f) => f(matched.root(), epoch).map(ReplacementSubplan::singleton),
            Self::MultiOperator(f) => f(matched, epoch),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row() -> DataSetType {
        DataSetType::new("row")
    }

    #[test]
    fn singleton_exposes_every_slot() {
        let join = Operator::join("k", "k", row(), row(), row());
        let replacement = ReplacementSubplan::singleton(join);
        assert_eq!(replacement.exposed_inputs(), &[(0, 0), (0, 1)]);
        assert_eq!(replacement.exposed_outputs(), &[(0, 0)]);
        assert!(replacement.check_boundary(&[row(), row()], &[row()]).is_ok());
    }

    #[test]
    fn chain_wires_head_to_tail() {
        let replacement = ReplacementSubplan::chain(vec![
            Operator::map("f", row(), row()),
            Operator::filter("p", row()),
        ]);
        assert_eq!(replacement.exposed_inputs(), &[(0, 0)]);
        assert_eq!(replacement.exposed_outputs(), &[(1, 0)]);
        assert!(replacement.check_boundary(&[row()], &[row()]).is_ok());
    }

    #[test]
    fn boundary_count_and_type_mismatches_are_reported() {
        let replacement = ReplacementSubplan::singleton(Operator::map("f", row(), row()));
        assert_eq!(
            replacement.check_boundary(&[row(), row()], &[row()]),
            Err(BoundaryMismatch::InputCount {
                expected: 2,
                found: 1
            })
        );
        let text = DataSetType::new("text");
        assert_eq!(
            replacement.check_boundary(&[row()], std::slice::from_ref(&text)),
            Err(BoundaryMismatch::OutputType {
                slot: 0,
                expected: text,
                found: row(),
            })
        );
        assert_eq!(
            ReplacementSubplan::builder().build().check_boundary(&[], &[]),
            Err(BoundaryMismatch::EmptyReplacement)
        );
    }

    #[test]
    fn exposing_an_internally_fed_input_is_rejected() {
        let mut builder = ReplacementSubplan::builder();
        let a = builder.add_operator(Operator::map("f", row(), row()));
        let b = builder.add_operator(Operator::filter("p", row()));
        builder.connect(a, 0, b, 0);
        builder.expose_input(b, 0);
        builder.expose_output(b, 0);
        assert_eq!(
            builder.build().check_boundary(&[row()], &[row()]),
            Err(BoundaryMismatch::InputSlotReused {
                operator: 1,
                slot: 0
            })
        );
    }

    #[test]
    fn dangling_references_are_reported() {
        let mut builder = ReplacementSubplan::builder();
        let a = builder.add_operator(Operator::map("f", row(), row()));
        builder.expose_input(a, 3);
        builder.expose_output(a, 0);
        assert_eq!(
            builder.build().check_boundary(&[row()], &[row()]),
            Err(BoundaryMismatch::DanglingSlot {
                operator: 0,
                direction: SlotDirection::Input,
                slot: 3
            })
        );
    }
}
