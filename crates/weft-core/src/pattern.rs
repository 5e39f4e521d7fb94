// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Operator and subplan patterns.
//!
//! A [`SubplanPattern`] is validated once at construction and compiled into an
//! ordered list of [`MatchStep`]s: starting from the first declared node, each
//! step binds one new pattern node across a declared connection (or verifies a
//! connection between two already-bound nodes). The matcher replays these
//! steps for every start candidate.
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use crate::error::ConfigurationError;
use crate::ident::Epoch;
use crate::matcher::{Match, Matcher};
use crate::operator::{LogicalKind, LogicalOperator, Operator, OperatorKind};
use crate::plan::{Plan, SlotDirection};

/// Pure predicate evaluated against a candidate operator.
pub type Predicate = Arc<dyn Fn(&Operator) -> bool + Send + Sync>;

/// Matches a single operator by discriminant plus ordered predicates.
#[derive(Clone)]
pub struct OperatorPattern {
    name: Arc<str>,
    kind: OperatorKind,
    inputs: usize,
    outputs: usize,
    is_output: bool,
    predicates: Vec<Predicate>,
}

impl fmt::Debug for OperatorPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperatorPattern")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("is_output", &self.is_output)
            .field("predicates", &self.predicates.len())
            .finish_non_exhaustive()
    }
}

impl OperatorPattern {
    /// Creates a pattern shaped like `template`.
    ///
    /// Only the template's discriminant and arity are read.
    pub fn new(name: &str, template: &Operator, is_output: bool) -> Self {
        Self::of_kind(
            name,
            template.kind(),
            template.input_count(),
            template.output_count(),
            is_output,
        )
    }

    /// Creates a pattern from an explicit shape.
    pub fn of_kind(
        name: &str,
        kind: OperatorKind,
        inputs: usize,
        outputs: usize,
        is_output: bool,
    ) -> Self {
        Self {
            name: Arc::from(name),
            kind,
            inputs,
            outputs,
            is_output,
            predicates: Vec::new(),
        }
    }

    /// Creates a pattern for a logical family, using the family's arity.
    pub fn logical(name: &str, kind: LogicalKind, is_output: bool) -> Self {
        let (inputs, outputs) = kind.arity();
        Self::of_kind(name, OperatorKind::Logical(kind), inputs, outputs, is_output)
    }

    /// Appends a predicate. Predicates run in registration order and stop at
    /// the first `false`.
    pub fn with_additional_test<F>(mut self, test: F) -> Self
    where
        F: Fn(&Operator) -> bool + Send + Sync + 'static,
    {
        self.predicates.push(Arc::new(test));
        self
    }

    /// Appends a predicate over the logical body; operators without one fail it.
    pub fn with_logical_test<F>(self, test: F) -> Self
    where
        F: Fn(&LogicalOperator) -> bool + Send + Sync + 'static,
    {
        self.with_additional_test(move |op| op.as_logical().is_some_and(&test))
    }

    /// Whether `operator` has this pattern's discriminant and passes every predicate.
    #[must_use]
    pub fn matches(&self, operator: &Operator) -> bool {
        operator.kind() == self.kind && self.predicates.iter().all(|test| test(operator))
    }

    /// Pattern node name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn shared_name(&self) -> &Arc<str> {
        &self.name
    }

    /// Discriminant required of matched operators.
    #[must_use]
    pub fn kind(&self) -> OperatorKind {
        self.kind
    }

    /// Template input arity.
    #[must_use]
    pub fn input_count(&self) -> usize {
        self.inputs
    }

    /// Template output arity.
    #[must_use]
    pub fn output_count(&self) -> usize {
        self.outputs
    }

    /// Whether this node is the designated output of its subplan.
    #[must_use]
    pub fn is_output(&self) -> bool {
        self.is_output
    }
}

/// Internal connection between two pattern nodes (by declaration index).
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct PatternConnection {
    /// Producing pattern node.
    pub producer: usize,
    /// Output slot of the producer.
    pub output: usize,
    /// Consuming pattern node.
    pub consumer: usize,
    /// Input slot of the consumer.
    pub input: usize,
}

/// One step of the compiled matching order.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) enum MatchStep {
    /// `producer` is bound; bind `consumer` among the operators fed by it.
    Downstream(PatternConnection),
    /// `consumer` is bound; bind `producer` as the operator feeding it.
    Upstream(PatternConnection),
    /// Both ends are bound; check the edge exists.
    Verify(PatternConnection),
}

impl MatchStep {
    /// Pattern node bound by this step, if any.
    pub(crate) fn target(self) -> Option<usize> {
        match self {
            Self::Downstream(c) => Some(c.consumer),
            Self::Upstream(c) => Some(c.producer),
            Self::Verify(_) => None,
        }
    }
}

/// A matchable subplan: operator patterns, their internal connections, and
/// the compiled matching order.
#[derive(Clone, Debug)]
pub struct SubplanPattern {
    nodes: Vec<OperatorPattern>,
    connections: Vec<PatternConnection>,
    steps: Vec<MatchStep>,
    output: usize,
    /// `connected_inputs[n][slot]`: input `slot` of node `n` is fed internally.
    connected_inputs: Vec<Vec<bool>>,
}

impl SubplanPattern {
    /// Single-operator pattern.
    pub fn singleton(node: OperatorPattern) -> Self {
        Self {
            connected_inputs: vec![vec![false; node.inputs]],
            nodes: vec![node],
            connections: Vec::new(),
            steps: Vec::new(),
            output: 0,
        }
    }

    /// Starts a multi-node pattern.
    pub fn builder() -> SubplanPatternBuilder {
        SubplanPatternBuilder::default()
    }

    /// Linear pattern: output 0 of each node feeds input 0 of the next.
    ///
    /// # Errors
    /// Same as [`SubplanPatternBuilder::build`].
    pub fn chain(nodes: Vec<OperatorPattern>) -> Result<Self, ConfigurationError> {
        let names: Vec<Arc<str>> = nodes.iter().map(|n| n.name.clone()).collect();
        let mut builder = Self::builder();
        for node in nodes {
            builder = builder.node(node);
        }
        for pair in names.windows(2) {
            builder = builder.connect(&pair[0], 0, &pair[1], 0);
        }
        builder.build()
    }

    /// Pattern nodes in declaration order.
    #[must_use]
    pub fn nodes(&self) -> &[OperatorPattern] {
        &self.nodes
    }

    /// Declared internal connections.
    #[must_use]
    pub fn connections(&self) -> &[PatternConnection] {
        &self.connections
    }

    /// Whether the pattern has exactly one node.
    #[must_use]
    pub fn is_singleton(&self) -> bool {
        self.nodes.len() == 1
    }

    /// Index of the node whose output slots form the subplan's outputs.
    #[must_use]
    pub fn output_node(&self) -> usize {
        self.output
    }

    /// Index of the node called `name`.
    #[must_use]
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.nodes.iter().position(|n| &*n.name == name)
    }

    /// Finds all matches in `plan` for a rule producing `producing`.
    #[must_use]
    pub fn find_matches(&self, plan: &Plan, producing: Epoch) -> Vec<Match> {
        Matcher::new(self).find(plan.view(), producing)
    }

    pub(crate) fn steps(&self) -> &[MatchStep] {
        &self.steps
    }

    /// Whether input `slot` of pattern node `node` is fed by a declared connection.
    pub(crate) fn is_connected_input(&self, node: usize, slot: usize) -> bool {
        self.connected_inputs
            .get(node)
            .and_then(|slots| slots.get(slot))
            .copied()
            .unwrap_or(false)
    }
}

/// Builder for multi-node [`SubplanPattern`]s.
#[derive(Debug, Default)]
pub struct SubplanPatternBuilder {
    nodes: Vec<OperatorPattern>,
    connections: Vec<(String, usize, String, usize)>,
}

impl SubplanPatternBuilder {
    /// Adds a pattern node.
    pub fn node(mut self, node: OperatorPattern) -> Self {
        self.nodes.push(node);
        self
    }

    /// Declares that output `output` of `producer` feeds input `input` of `consumer`.
    pub fn connect(mut self, producer: &str, output: usize, consumer: &str, input: usize) -> Self {
        self.connections
            .push((producer.to_owned(), output, consumer.to_owned(), input));
        self
    }

    /// Validates the configuration and compiles the matching order.
    ///
    /// # Errors
    /// Returns a [`ConfigurationError`] for an empty pattern, duplicate node
    /// names, dangling or out-of-range connections, inputs fed twice, cyclic
    /// or disconnected connections, a designated output node feeding other
    /// nodes, or a designated-output count other than one (zero is accepted
    /// for singletons).
    pub fn build(self) -> Result<SubplanPattern, ConfigurationError> {
        let Self { nodes, connections } = self;
        if nodes.is_empty() {
            return Err(ConfigurationError::EmptyPattern);
        }
        for (idx, node) in nodes.iter().enumerate() {
            if nodes[..idx].iter().any(|prior| prior.name == node.name) {
                return Err(ConfigurationError::DuplicatePatternNode(node.name.to_string()));
            }
        }
        let index_of = |name: &str| {
            nodes
                .iter()
                .position(|n| &*n.name == name)
                .ok_or_else(|| ConfigurationError::UnknownPatternNode(name.to_owned()))
        };

        let mut connected_inputs: Vec<Vec<bool>> =
            nodes.iter().map(|n| vec![false; n.inputs]).collect();
        let mut resolved = Vec::with_capacity(connections.len());
        for (producer_name, output, consumer_name, input) in &connections {
            let producer = index_of(producer_name)?;
            let consumer = index_of(consumer_name)?;
            if *output >= nodes[producer].outputs {
                return Err(ConfigurationError::PatternSlotOutOfRange {
                    node: producer_name.clone(),
                    direction: SlotDirection::Output,
                    slot: *output,
                    arity: nodes[producer].outputs,
                });
            }
            if *input >= nodes[consumer].inputs {
                return Err(ConfigurationError::PatternSlotOutOfRange {
                    node: consumer_name.clone(),
                    direction: SlotDirection::Input,
                    slot: *input,
                    arity: nodes[consumer].inputs,
                });
            }
            if std::mem::replace(&mut connected_inputs[consumer][*input], true) {
                return Err(ConfigurationError::InputConnectedTwice {
                    node: consumer_name.clone(),
                    slot: *input,
                });
            }
            resolved.push(PatternConnection {
                producer,
                output: *output,
                consumer,
                input: *input,
            });
        }

        if !is_acyclic(nodes.len(), &resolved) {
            return Err(ConfigurationError::CyclicPattern);
        }
        let steps = compile_steps(nodes.len(), &resolved).map_err(|unreachable| {
            ConfigurationError::DisconnectedPattern {
                node: nodes[unreachable].name.to_string(),
            }
        })?;

        let flagged: Vec<usize> = (0..nodes.len()).filter(|&n| nodes[n].is_output).collect();
        let output = match (nodes.len(), flagged.as_slice()) {
            (1, [] | [0]) => 0,
            (_, [only]) => *only,
            (_, found) => {
                return Err(ConfigurationError::OutputNodeCount { found: found.len() })
            }
        };
        if let Some(c) = resolved.iter().find(|c| c.producer == output) {
            return Err(ConfigurationError::OutputNodeFeedsPattern {
                node: nodes[c.producer].name.to_string(),
            });
        }

        Ok(SubplanPattern {
            nodes,
            connections: resolved,
            steps,
            output,
            connected_inputs,
        })
    }
}

/// Kahn's algorithm over the directed connection graph.
fn is_acyclic(node_count: usize, connections: &[PatternConnection]) -> bool {
    let mut indegree = vec![0usize; node_count];
    for c in connections {
        indegree[c.consumer] += 1;
    }
    let mut ready: VecDeque<usize> = (0..node_count).filter(|&n| indegree[n] == 0).collect();
    let mut visited = 0;
    while let Some(n) = ready.pop_front() {
        visited += 1;
        for c in connections.iter().filter(|c| c.producer == n) {
            indegree[c.consumer] -= 1;
            if indegree[c.consumer] == 0 {
                ready.push_back(c.consumer);
            }
        }
    }
    visited == node_count
}

/// Orders connections into match steps starting from node 0.
///
/// Repeatedly takes the first (in declaration order) remaining connection
/// touching a bound node. Returns the first unreachable node on failure.
fn compile_steps(
    node_count: usize,
    connections: &[PatternConnection],
) -> Result<Vec<MatchStep>, usize> {
    let mut bound = vec![false; node_count];
    bound[0] = true;
    let mut remaining: Vec<PatternConnection> = connections.to_vec();
    let mut steps = Vec::with_capacity(connections.len());
    while let Some(pos) = remaining
        .iter()
        .position(|c| bound[c.producer] || bound[c.consumer])
    {
        let c = remaining.remove(pos);
        let step = match (bound[c.producer], bound[c.consumer]) {
            (true, true) => MatchStep::Verify(c),
            (true, false) => MatchStep::Downstream(c),
            _ => MatchStep::Upstream(c),
        };
        if let Some(target) = step.target() {
            bound[target] = true;
        }
        steps.push(step);
    }
    match bound.iter().position(|b| !b) {
        Some(unreachable) => Err(unreachable),
        None => Ok(steps),
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::operator::{DataSetType, SampleMethod};

    fn map(name: &str) -> OperatorPattern {
        OperatorPattern::logical(name, LogicalKind::Map, false)
    }

    #[test]
    fn predicates_short_circuit_in_order() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        let pattern = OperatorPattern::logical("sample", LogicalKind::Sample, false)
            .with_logical_test(|op| {
                matches!(
                    op,
                    LogicalOperator::Sample {
                        method: SampleMethod::Random,
                        ..
                    }
                )
            })
            .with_additional_test(move |_| {
                seen.fetch_add(1, Ordering::SeqCst);
                true
            });
        let ty = DataSetType::new("row");
        assert!(!pattern.matches(&Operator::sample(SampleMethod::Bernoulli, 5, ty.clone())));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(pattern.matches(&Operator::sample(SampleMethod::Random, 5, ty.clone())));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!pattern.matches(&Operator::distinct(ty)));
    }

    #[test]
    fn chain_compiles_downstream_steps() {
        let pattern = SubplanPattern::chain(vec![
            map("a"),
            map("b"),
            OperatorPattern::logical("c", LogicalKind::Filter, true),
        ])
        .unwrap();
        assert_eq!(pattern.output_node(), 2);
        assert!(pattern
            .steps()
            .iter()
            .all(|s| matches!(s, MatchStep::Downstream(_))));
        assert!(pattern.is_connected_input(1, 0));
        assert!(!pattern.is_connected_input(0, 0));
    }

    #[test]
    fn upstream_steps_are_used_when_start_is_a_consumer() {
        let pattern = SubplanPattern::builder()
            .node(OperatorPattern::logical("join", LogicalKind::Join, true))
            .node(map("left"))
            .node(map("right"))
            .connect("left", 0, "join", 0)
            .connect("right", 0, "join", 1)
            .build()
            .unwrap();
        assert_eq!(pattern.steps().len(), 2);
        assert!(pattern
            .steps()
            .iter()
            .all(|s| matches!(s, MatchStep::Upstream(_))));
    }

    #[test]
    fn invalid_configurations_are_rejected_at_build() {
        assert_eq!(
            SubplanPattern::builder().build().unwrap_err(),
            ConfigurationError::EmptyPattern
        );
        assert_eq!(
            SubplanPattern::builder()
                .node(map("a"))
                .node(map("a"))
                .build()
                .unwrap_err(),
            ConfigurationError::DuplicatePatternNode("a".into())
        );
        assert_eq!(
            SubplanPattern::builder()
                .node(map("a"))
                .node(OperatorPattern::logical("b", LogicalKind::Map, true))
                .connect("a", 0, "missing", 0)
                .build()
                .unwrap_err(),
            ConfigurationError::UnknownPatternNode("missing".into())
        );
        assert!(matches!(
            SubplanPattern::builder()
                .node(map("a"))
                .node(OperatorPattern::logical("b", LogicalKind::Map, true))
                .connect("a", 1, "b", 0)
                .build(),
            Err(ConfigurationError::PatternSlotOutOfRange {
                direction: SlotDirection::Output,
                slot: 1,
                ..
            })
        ));
        assert_eq!(
            SubplanPattern::builder()
                .node(map("a"))
                .node(OperatorPattern::logical("b", LogicalKind::Map, true))
                .node(map("c"))
                .connect("a", 0, "b", 0)
                .build()
                .unwrap_err(),
            ConfigurationError::DisconnectedPattern { node: "c".into() }
        );
        assert_eq!(
            SubplanPattern::chain(vec![map("a"), map("b")]).unwrap_err(),
            ConfigurationError::OutputNodeCount { found: 0 }
        );
    }

    #[test]
    fn cycles_and_double_feeds_are_rejected() {
        let union = |name: &str, out: bool| OperatorPattern::logical(name, LogicalKind::Union, out);
        assert_eq!(
            SubplanPattern::builder()
                .node(union("a", false))
                .node(union("b", true))
                .connect("a", 0, "b", 0)
                .connect("b", 0, "a", 0)
                .build()
                .unwrap_err(),
            ConfigurationError::CyclicPattern
        );
        assert_eq!(
            SubplanPattern::builder()
                .node(map("a"))
                .node(map("b"))
                .node(union("c", true))
                .connect("a", 0, "c", 0)
                .connect("b", 0, "c", 0)
                .build()
                .unwrap_err(),
            ConfigurationError::InputConnectedTwice {
                node: "c".into(),
                slot: 0
            }
        );
    }
}
