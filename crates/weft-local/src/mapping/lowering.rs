// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! One-to-one lowering of the remaining logical families.
use weft_core::{
    ConfigurationError, LogicalKind, Mapping, Operator, OperatorPattern, PlanTransformation,
    Platform, ReplacementSubplanFactory, SubplanPattern, UnsupportedVariantError,
};

use crate::operators::LocalOperator;
use crate::platform::{local_platform, LOCAL_PLATFORM_NAME};

/// Rule names paired with the family they lower. `Sample` lives in
/// [`super::SampleMapping`].
pub const LOWERED_FAMILIES: [(&str, LogicalKind); 12] = [
    ("local.source", LogicalKind::Source),
    ("local.sink", LogicalKind::Sink),
    ("local.map", LogicalKind::Map),
    ("local.flat_map", LogicalKind::FlatMap),
    ("local.filter", LogicalKind::Filter),
    ("local.distinct", LogicalKind::Distinct),
    ("local.sort", LogicalKind::Sort),
    ("local.count", LogicalKind::Count),
    ("local.reduce_by", LogicalKind::ReduceBy),
    ("local.group_by", LogicalKind::GroupBy),
    ("local.join", LogicalKind::Join),
    ("local.union", LogicalKind::Union),
];

/// Lowers every logical family except `Sample` to its local operator.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoweringMapping;

impl Mapping for LoweringMapping {
    fn name(&self) -> &'static str {
        "local.lowering"
    }

    fn platform(&self) -> Platform {
        local_platform()
    }

    fn transformations(&self) -> Vec<Result<PlanTransformation, ConfigurationError>> {
        LOWERED_FAMILIES
            .iter()
            .map(|&(rule, kind)| lowering_transformation(rule, kind))
            .collect()
    }
}

/// Builds a single-operator rule lowering `kind` operators.
///
/// # Errors
/// Never in practice; singleton patterns always accept single-operator
/// factories.
pub fn lowering_transformation(
    rule: &'static str,
    kind: LogicalKind,
) -> Result<PlanTransformation, ConfigurationError> {
    PlanTransformation::new(
        rule,
        SubplanPattern::singleton(OperatorPattern::logical(kind.label(), kind, true)),
        ReplacementSubplanFactory::of_single_operator(|matched, _| {
            let logical = matched.as_logical().ok_or_else(|| {
                UnsupportedVariantError::new(
                    matched.kind().to_string(),
                    "execution",
                    LOCAL_PLATFORM_NAME,
                )
            })?;
            LocalOperator::lower(logical).map(|local| Operator::replacing(matched, local))
        }),
        local_platform(),
    )
}
