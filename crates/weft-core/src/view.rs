// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Read-only view over a [`Plan`].
//!
//! Matchers, predicates, and replacement factories observe plans through
//! [`PlanView`]; only [`crate::PlanTransformation::apply`] mutates, and only
//! through the plan's splice.

use crate::ident::{Epoch, OperatorId};
use crate::operator::Operator;
use crate::plan::{InputSlot, OutputSlot, Plan, PlanNode};

/// Read-only view over a [`Plan`].
///
/// Do not add `Deref<Target = Plan>` or any accessor returning `&mut Plan`:
/// this type is the capability that keeps matching side-effect free.
#[derive(Debug, Clone, Copy)]
pub struct PlanView<'a> {
    plan: &'a Plan,
}

impl<'a> PlanView<'a> {
    /// Creates a view over `plan`.
    #[must_use]
    pub fn new(plan: &'a Plan) -> Self {
        Self { plan }
    }

    /// Returns the placed operator with `id`, if present.
    #[must_use]
    pub fn node(&self, id: OperatorId) -> Option<&'a PlanNode> {
        self.plan.node(id)
    }

    /// Returns the operator record with `id`, if present.
    #[must_use]
    pub fn operator(&self, id: OperatorId) -> Option<&'a Operator> {
        self.plan.operator(id)
    }

    /// Whether `id` is part of the plan.
    #[must_use]
    pub fn contains(&self, id: OperatorId) -> bool {
        self.plan.contains(id)
    }

    /// Epoch of `id`, if present.
    #[must_use]
    pub fn epoch(&self, id: OperatorId) -> Option<Epoch> {
        self.plan.epoch(id)
    }

    /// Iterates operator ids in ascending order.
    pub fn operator_ids(&self) -> impl Iterator<Item = OperatorId> + 'a {
        self.plan.operator_ids()
    }

    /// Producer feeding `slot`, if any.
    #[must_use]
    pub fn producer(&self, slot: InputSlot) -> Option<OutputSlot> {
        self.plan.producer(slot)
    }

    /// Consumers fed by `slot`, in ascending order.
    #[must_use]
    pub fn consumers(&self, slot: OutputSlot) -> &'a [InputSlot] {
        self.plan.consumers(slot)
    }

    /// Number of operators in the plan.
    #[must_use]
    pub fn len(&self) -> usize {
        self.plan.len()
    }

    /// Whether the plan has no operators.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.plan.is_empty()
    }
}
