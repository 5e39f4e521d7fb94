// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Operator records: logical operator families, the execution-operator
//! capability contract, and typed slots.
use std::fmt;
use std::sync::Arc;

use crate::ident::PlatformId;
use crate::plan::PlanError;

/// Type carried by an operator slot (the data unit flowing through it).
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub struct DataSetType(Arc<str>);

impl DataSetType {
    /// Creates a slot type for the named data unit.
    #[must_use]
    pub fn new(unit: &str) -> Self {
        Self(Arc::from(unit))
    }

    /// Untyped slot.
    #[must_use]
    pub fn none() -> Self {
        Self::new("none")
    }

    /// Returns the data unit name.
    #[must_use]
    pub fn unit(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DataSetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Sampling strategies selectable on [`LogicalOperator::Sample`].
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum SampleMethod {
    /// Leave the choice to the platform.
    Any,
    /// Uniform random sample.
    Random,
    /// Shuffle one partition and take its head.
    ShufflePartitionFirst,
    /// Per-element coin flip.
    Bernoulli,
    /// Single-pass reservoir sampling.
    Reservoir,
}

impl SampleMethod {
    /// Stable label used in diagnostics and fingerprints.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Any => "any",
            Self::Random => "random",
            Self::ShufflePartitionFirst => "shuffle_partition_first",
            Self::Bernoulli => "bernoulli",
            Self::Reservoir => "reservoir",
        }
    }
}

impl fmt::Display for SampleMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Discriminant of a [`LogicalOperator`] family.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum LogicalKind {
    /// Data source.
    Source,
    /// Data sink.
    Sink,
    /// One-to-one transformation.
    Map,
    /// One-to-many transformation.
    FlatMap,
    /// Predicate filter.
    Filter,
    /// Sampling.
    Sample,
    /// Duplicate elimination.
    Distinct,
    /// Sorting.
    Sort,
    /// Cardinality.
    Count,
    /// Keyed reduction.
    ReduceBy,
    /// Keyed grouping.
    GroupBy,
    /// Equi-join of two inputs.
    Join,
    /// Bag union of two inputs.
    Union,
}

impl LogicalKind {
    /// Fixed `(inputs, outputs)` arity of the family.
    #[must_use]
    pub const fn arity(self) -> (usize, usize) {
        match self {
            Self::Source => (0, 1),
            Self::Sink => (1, 0),
            Self::Join | Self::Union => (2, 1),
            Self::Map
            | Self::FlatMap
            | Self::Filter
            | Self::Sample
            | Self::Distinct
            | Self::Sort
            | Self::Count
            | Self::ReduceBy
            | Self::GroupBy => (1, 1),
        }
    }

    /// Stable label used in diagnostics and fingerprints.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Source => "source",
            Self::Sink => "sink",
            Self::Map => "map",
            Self::FlatMap => "flat_map",
            Self::Filter => "filter",
            Self::Sample => "sample",
            Self::Distinct => "distinct",
            Self::Sort => "sort",
            Self::Count => "count",
            Self::ReduceBy => "reduce_by",
            Self::GroupBy => "group_by",
            Self::Join => "join",
            Self::Union => "union",
        }
    }
}

impl fmt::Display for LogicalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Platform-agnostic operator families with their configuration.
///
/// User functions are referenced by name only; executing them belongs to the
/// platforms.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum LogicalOperator {
    /// Reads a named dataset.
    Source {
        /// Dataset name.
        name: String,
    },
    /// Writes to a named destination.
    Sink {
        /// Destination name.
        name: String,
    },
    /// Applies `udf` to every element.
    Map {
        /// Function name.
        udf: String,
    },
    /// Applies `udf` and flattens the results.
    FlatMap {
        /// Function name.
        udf: String,
    },
    /// Keeps elements satisfying `predicate`.
    Filter {
        /// Predicate name.
        predicate: String,
    },
    /// Draws `size` elements with `method`.
    Sample {
        /// Sampling strategy.
        method: SampleMethod,
        /// Requested sample size.
        size: u64,
        /// Optional seed for reproducible sampling.
        seed: Option<u64>,
    },
    /// Removes duplicates.
    Distinct,
    /// Sorts by `key`.
    Sort {
        /// Key extractor name.
        key: String,
    },
    /// Counts elements.
    Count,
    /// Reduces elements sharing a key.
    ReduceBy {
        /// Key extractor name.
        key: String,
        /// Reduce function name.
        udf: String,
    },
    /// Groups elements sharing a key.
    GroupBy {
        /// Key extractor name.
        key: String,
    },
    /// Joins two inputs on key equality.
    Join {
        /// Left key extractor name.
        left_key: String,
        /// Right key extractor name.
        right_key: String,
    },
    /// Concatenates two inputs.
    Union,
}

impl LogicalOperator {
    /// Returns the family discriminant.
    #[must_use]
    pub const fn kind(&self) -> LogicalKind {
        match self {
            Self::Source { .. } => LogicalKind::Source,
            Self::Sink { .. } => LogicalKind::Sink,
            Self::Map { .. } => LogicalKind::Map,
            Self::FlatMap { .. } => LogicalKind::FlatMap,
            Self::Filter { .. } => LogicalKind::Filter,
            Self::Sample { .. } => LogicalKind::Sample,
            Self::Distinct => LogicalKind::Distinct,
            Self::Sort { .. } => LogicalKind::Sort,
            Self::Count => LogicalKind::Count,
            Self::ReduceBy { .. } => LogicalKind::ReduceBy,
            Self::GroupBy { .. } => LogicalKind::GroupBy,
            Self::Join { .. } => LogicalKind::Join,
            Self::Union => LogicalKind::Union,
        }
    }
}

/// Capability contract for a platform-specific operator that can replace a
/// matched logical subplan.
///
/// Implementations are opaque to the engine apart from these accessors; slot
/// arity and types live on the enclosing [`Operator`].
pub trait ExecutionOperator: fmt::Debug + Send + Sync {
    /// Discriminant label, unique per operator type (e.g. `"local.map"`).
    fn name(&self) -> &'static str;

    /// Platform that executes this operator.
    fn platform(&self) -> PlatformId;

    /// Canonical configuration string folded into plan digests.
    ///
    /// Two operators with the same name and description are interchangeable.
    fn describe(&self) -> String {
        String::new()
    }
}

/// Configuration discriminant of an operator, read by patterns.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum OperatorKind {
    /// A logical operator family.
    Logical(LogicalKind),
    /// A platform operator, keyed by [`ExecutionOperator::name`].
    Execution(&'static str),
}

impl fmt::Display for OperatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Logical(kind) => write!(f, "{kind}"),
            Self::Execution(name) => f.write_str(name),
        }
    }
}

/// What an operator does.
#[derive(Clone, Debug)]
pub enum OperatorBody {
    /// Platform-agnostic operator.
    Logical(LogicalOperator),
    /// Platform-specific operator.
    Execution(Arc<dyn ExecutionOperator>),
}

/// Operator record: body plus fixed, typed input and output slots.
///
/// The slot vectors are private and never change after construction; plans
/// store connectivity and epochs next to the record, not inside it.
#[derive(Clone, Debug)]
pub struct Operator {
    body: OperatorBody,
    inputs: Vec<DataSetType>,
    outputs: Vec<DataSetType>,
    label: Option<String>,
}

impl Operator {
    /// Creates a logical operator with explicit slot types.
    ///
    /// # Errors
    /// Returns [`PlanError::ArityMismatch`] when the slot counts disagree with
    /// the family's fixed arity.
    pub fn logical(
        op: LogicalOperator,
        inputs: Vec<DataSetType>,
        outputs: Vec<DataSetType>,
    ) -> Result<Self, PlanError> {
        let kind = op.kind();
        let (expected_inputs, expected_outputs) = kind.arity();
        if inputs.len() != expected_inputs || outputs.len() != expected_outputs {
            return Err(PlanError::ArityMismatch {
                kind,
                expected_inputs,
                expected_outputs,
                inputs: inputs.len(),
                outputs: outputs.len(),
            });
        }
        Ok(Self {
            body: OperatorBody::Logical(op),
            inputs,
            outputs,
            label: None,
        })
    }

    /// Creates a platform operator with explicit slot types.
    pub fn execution(
        op: impl ExecutionOperator + 'static,
        inputs: Vec<DataSetType>,
        outputs: Vec<DataSetType>,
    ) -> Self {
        Self {
            body: OperatorBody::Execution(Arc::new(op)),
            inputs,
            outputs,
            label: None,
        }
    }

    /// Creates a platform operator that takes over `template`'s slot types and
    /// label, the usual shape of a one-to-one replacement.
    pub fn replacing(template: &Self, op: impl ExecutionOperator + 'static) -> Self {
        Self {
            body: OperatorBody::Execution(Arc::new(op)),
            inputs: template.inputs.clone(),
            outputs: template.outputs.clone(),
            label: template.label.clone(),
        }
    }

    fn fixed(op: LogicalOperator, inputs: Vec<DataSetType>, outputs: Vec<DataSetType>) -> Self {
        debug_assert_eq!(op.kind().arity(), (inputs.len(), outputs.len()));
        Self {
            body: OperatorBody::Logical(op),
            inputs,
            outputs,
            label: None,
        }
    }

    /// `Source` emitting `ty`.
    pub fn source(name: &str, ty: DataSetType) -> Self {
        Self::fixed(
            LogicalOperator::Source {
                name: name.to_owned(),
            },
            Vec::new(),
            vec![ty],
        )
    }

    /// `Sink` consuming `ty`.
    pub fn sink(name: &str, ty: DataSetType) -> Self {
        Self::fixed(
            LogicalOperator::Sink {
                name: name.to_owned(),
            },
            vec![ty],
            Vec::new(),
        )
    }

    /// `Map` from `input` to `output`.
    pub fn map(udf: &str, input: DataSetType, output: DataSetType) -> Self {
        Self::fixed(
            LogicalOperator::Map {
                udf: udf.to_owned(),
            },
            vec![input],
            vec![output],
        )
    }

    /// `FlatMap` from `input` to `output`.
    pub fn flat_map(udf: &str, input: DataSetType, output: DataSetType) -> Self {
        Self::fixed(
            LogicalOperator::FlatMap {
                udf: udf.to_owned(),
            },
            vec![input],
            vec![output],
        )
    }

    /// `Filter` over `ty`.
    pub fn filter(predicate: &str, ty: DataSetType) -> Self {
        Self::fixed(
            LogicalOperator::Filter {
                predicate: predicate.to_owned(),
            },
            vec![ty.clone()],
            vec![ty],
        )
    }

    /// Unseeded `Sample` of `size` elements over `ty`.
    pub fn sample(method: SampleMethod, size: u64, ty: DataSetType) -> Self {
        Self::fixed(
            LogicalOperator::Sample {
                method,
                size,
                seed: None,
            },
            vec![ty.clone()],
            vec![ty],
        )
    }

    /// `Distinct` over `ty`.
    pub fn distinct(ty: DataSetType) -> Self {
        Self::fixed(LogicalOperator::Distinct, vec![ty.clone()], vec![ty])
    }

    /// `Sort` over `ty`.
    pub fn sort(key: &str, ty: DataSetType) -> Self {
        Self::fixed(
            LogicalOperator::Sort {
                key: key.to_owned(),
            },
            vec![ty.clone()],
            vec![ty],
        )
    }

    /// `Count` of `ty` elements, emitting a single `u64`.
    pub fn count(ty: DataSetType) -> Self {
        Self::fixed(
            LogicalOperator::Count,
            vec![ty],
            vec![DataSetType::new("u64")],
        )
    }

    /// `ReduceBy` over `ty`.
    pub fn reduce_by(key: &str, udf: &str, ty: DataSetType) -> Self {
        Self::fixed(
            LogicalOperator::ReduceBy {
                key: key.to_owned(),
                udf: udf.to_owned(),
            },
            vec![ty.clone()],
            vec![ty],
        )
    }

    /// `GroupBy` from `input` to groups of type `output`.
    pub fn group_by(key: &str, input: DataSetType, output: DataSetType) -> Self {
        Self::fixed(
            LogicalOperator::GroupBy {
                key: key.to_owned(),
            },
            vec![input],
            vec![output],
        )
    }

    /// `Join` of `left` and `right` into `output`.
    pub fn join(
        left_key: &str,
        right_key: &str,
        left: DataSetType,
        right: DataSetType,
        output: DataSetType,
    ) -> Self {
        Self::fixed(
            LogicalOperator::Join {
                left_key: left_key.to_owned(),
                right_key: right_key.to_owned(),
            },
            vec![left, right],
            vec![output],
        )
    }

    /// `Union` of two `ty` inputs.
    pub fn union(ty: DataSetType) -> Self {
        Self::fixed(
            LogicalOperator::Union,
            vec![ty.clone(), ty.clone()],
            vec![ty],
        )
    }

    /// Attaches a human-readable label.
    pub fn with_label(mut self, label: &str) -> Self {
        self.label = Some(label.to_owned());
        self
    }

    /// Returns the configuration discriminant.
    #[must_use]
    pub fn kind(&self) -> OperatorKind {
        match &self.body {
            OperatorBody::Logical(op) => OperatorKind::Logical(op.kind()),
            OperatorBody::Execution(op) => OperatorKind::Execution(op.name()),
        }
    }

    /// Returns the body.
    #[must_use]
    pub fn body(&self) -> &OperatorBody {
        &self.body
    }

    /// Returns the logical body, if any.
    #[must_use]
    pub fn as_logical(&self) -> Option<&LogicalOperator> {
        match &self.body {
            OperatorBody::Logical(op) => Some(op),
            OperatorBody::Execution(_) => None,
        }
    }

    /// Returns the execution body, if any.
    #[must_use]
    pub fn as_execution(&self) -> Option<&dyn ExecutionOperator> {
        match &self.body {
            OperatorBody::Logical(_) => None,
            OperatorBody::Execution(op) => Some(op.as_ref()),
        }
    }

    /// Platform of an execution operator; `None` for logical operators.
    #[must_use]
    pub fn platform(&self) -> Option<PlatformId> {
        self.as_execution().map(ExecutionOperator::platform)
    }

    /// Number of input slots.
    #[must_use]
    pub fn input_count(&self) -> usize {
        self.inputs.len()
    }

    /// Number of output slots.
    #[must_use]
    pub fn output_count(&self) -> usize {
        self.outputs.len()
    }

    /// Input slot types in slot order.
    #[must_use]
    pub fn inputs(&self) -> &[DataSetType] {
        &self.inputs
    }

    /// Output slot types in slot order.
    #[must_use]
    pub fn outputs(&self) -> &[DataSetType] {
        &self.outputs
    }

    /// Optional label.
    #[must_use]
    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }
}
