// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Rewrite error taxonomy.
//!
//! Three tiers with distinct handling: [`ConfigurationError`] is raised while
//! building patterns or registering rules and never at apply time;
//! [`UnsupportedVariantError`] is a recoverable per-match skip;
//! [`MatchInvariantViolation`] aborts an application and leaves the plan as it
//! was.
use thiserror::Error;

use crate::ident::{OperatorId, RuleId};
use crate::operator::DataSetType;
use crate::plan::SlotDirection;

/// Invalid pattern or rule configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    /// A subplan pattern needs at least one node.
    #[error("pattern has no nodes")]
    EmptyPattern,
    /// Two pattern nodes share a name.
    #[error("duplicate pattern node name: {0}")]
    DuplicatePatternNode(String),
    /// A connection names a node the pattern does not declare.
    #[error("connection references unknown pattern node: {0}")]
    UnknownPatternNode(String),
    /// A connection addresses a slot beyond the node's arity.
    #[error("{direction} slot {slot} of pattern node `{node}` out of range (arity {arity})")]
    PatternSlotOutOfRange {
        /// Pattern node name.
        node: String,
        /// Slot direction.
        direction: SlotDirection,
        /// Requested slot.
        slot: usize,
        /// Node arity in that direction.
        arity: usize,
    },
    /// Two connections feed the same input slot.
    #[error("input slot {slot} of pattern node `{node}` is connected twice")]
    InputConnectedTwice {
        /// Pattern node name.
        node: String,
        /// Input slot.
        slot: usize,
    },
    /// Pattern connections form a cycle.
    #[error("pattern connections form a cycle")]
    CyclicPattern,
    /// A node is not reachable from the first node over the connections.
    #[error("pattern node `{node}` is not connected to the rest of the pattern")]
    DisconnectedPattern {
        /// First unreachable node.
        node: String,
    },
    /// Multi-node patterns designate exactly one output node.
    #[error("pattern designates {found} output nodes, expected exactly one")]
    OutputNodeCount {
        /// Number of flagged nodes.
        found: usize,
    },
    /// The designated output node may not feed other pattern nodes.
    #[error("output node `{node}` feeds another pattern node")]
    OutputNodeFeedsPattern {
        /// Output node name.
        node: String,
    },
    /// Single-operator factories only fit singleton patterns.
    #[error("rule `{rule}` pairs a single-operator factory with a {nodes}-node pattern")]
    SingleOperatorFactoryOnSubplan {
        /// Rule name.
        rule: String,
        /// Pattern node count.
        nodes: usize,
    },
    /// A rule with this name is already registered.
    #[error("duplicate rule: {rule}")]
    DuplicateRule {
        /// Rule name.
        rule: String,
    },
}

/// A factory cannot produce a replacement for this matched variant.
///
/// Recoverable: the match is skipped and the plan is left unchanged for it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{platform} has no implementation of {operator} ({variant})")]
pub struct UnsupportedVariantError {
    /// Operator family (e.g. `sample`).
    pub operator: String,
    /// Unsupported configuration (e.g. `bernoulli`).
    pub variant: String,
    /// Target platform name.
    pub platform: String,
}

impl UnsupportedVariantError {
    /// Creates an error for `operator` configured as `variant` on `platform`.
    pub fn new(
        operator: impl Into<String>,
        variant: impl Into<String>,
        platform: impl Into<String>,
    ) -> Self {
        Self {
            operator: operator.into(),
            variant: variant.into(),
            platform: platform.into(),
        }
    }
}

/// How a replacement subplan disagrees with the boundary it must fill.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BoundaryMismatch {
    /// The replacement has no operators.
    #[error("replacement is empty")]
    EmptyReplacement,
    /// Exposed input count differs from the matched boundary.
    #[error("replacement exposes {found} inputs, boundary has {expected}")]
    InputCount {
        /// Boundary input count.
        expected: usize,
        /// Exposed input count.
        found: usize,
    },
    /// Exposed output count differs from the matched boundary.
    #[error("replacement exposes {found} outputs, boundary has {expected}")]
    OutputCount {
        /// Boundary output count.
        expected: usize,
        /// Exposed output count.
        found: usize,
    },
    /// Exposed input type differs from the matched boundary.
    #[error("boundary input {slot} expects `{expected}`, replacement takes `{found}`")]
    InputType {
        /// Boundary position.
        slot: usize,
        /// Boundary type.
        expected: DataSetType,
        /// Replacement type.
        found: DataSetType,
    },
    /// Exposed output type differs from the matched boundary.
    #[error("boundary output {slot} carries `{expected}`, replacement yields `{found}`")]
    OutputType {
        /// Boundary position.
        slot: usize,
        /// Boundary type.
        expected: DataSetType,
        /// Replacement type.
        found: DataSetType,
    },
    /// A replacement slot reference is out of range.
    #[error("replacement references missing {direction} slot {slot} of operator {operator}")]
    DanglingSlot {
        /// Replacement-local operator index.
        operator: usize,
        /// Slot direction.
        direction: SlotDirection,
        /// Slot index.
        slot: usize,
    },
    /// An input slot is fed twice (internally or as an exposed boundary input).
    #[error("replacement input slot {slot} of operator {operator} is fed twice")]
    InputSlotReused {
        /// Replacement-local operator index.
        operator: usize,
        /// Slot index.
        slot: usize,
    },
    /// An internal connection joins slots of different types.
    #[error("replacement connection carries `{produced}` into an input expecting `{expected}`")]
    InternalType {
        /// Producer slot type.
        produced: DataSetType,
        /// Consumer slot type.
        expected: DataSetType,
    },
    /// Internal connections close a cycle.
    #[error("replacement connections form a cycle")]
    Cycle,
}

/// A replacement violated the match boundary; the application was aborted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("rule `{rule}` produced an invalid replacement for {matched:?}: {mismatch}")]
pub struct MatchInvariantViolation {
    /// Rule name.
    pub rule: String,
    /// Rule id.
    pub rule_id: RuleId,
    /// Operators of the offending match, in pattern declaration order.
    pub matched: Vec<OperatorId>,
    /// What disagreed.
    #[source]
    pub mismatch: BoundaryMismatch,
}
