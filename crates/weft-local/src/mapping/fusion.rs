// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! `Map → Filter` fusion into a single local pass.
use tracing::debug;
use weft_core::{
    ConfigurationError, LogicalKind, LogicalOperator, Mapping, Operator, OperatorPattern,
    PlanTransformation, Platform, ReplacementSubplan, ReplacementSubplanFactory, SubplanPattern,
    UnsupportedVariantError,
};

use crate::operators::LocalOperator;
use crate::platform::{local_platform, LOCAL_PLATFORM_NAME};

/// Name of the fusion rule.
pub const MAP_FILTER_RULE: &str = "local.map_filter";

/// Fuses a `Map` whose only consumer is a `Filter`.
#[derive(Debug, Clone, Copy, Default)]
pub struct MapFilterFusionMapping;

impl Mapping for MapFilterFusionMapping {
    fn name(&self) -> &'static str {
        "local.map_filter_fusion"
    }

    fn platform(&self) -> Platform {
        local_platform()
    }

    fn transformations(&self) -> Vec<Result<PlanTransformation, ConfigurationError>> {
        vec![map_filter_transformation()]
    }
}

/// Builds the fusion rule.
///
/// # Errors
/// Never in practice; the two-node chain is statically valid.
pub fn map_filter_transformation() -> Result<PlanTransformation, ConfigurationError> {
    let pattern = SubplanPattern::chain(vec![
        OperatorPattern::logical("map", LogicalKind::Map, false),
        OperatorPattern::logical("filter", LogicalKind::Filter, true),
    ])?;
    PlanTransformation::new(
        MAP_FILTER_RULE,
        pattern,
        ReplacementSubplanFactory::of_multiple_operators(|matched, _| {
            let map = matched.operator("map").and_then(Operator::as_logical);
            let filter = matched.operator("filter").and_then(Operator::as_logical);
            let (Some(LogicalOperator::Map { udf }), Some(LogicalOperator::Filter { predicate })) =
                (map, filter)
            else {
                return Err(UnsupportedVariantError::new(
                    "map_filter",
                    "non-logical",
                    LOCAL_PLATFORM_NAME,
                ));
            };
            debug!(%udf, %predicate, "fusing map and filter");
            let fused = Operator::execution(
                LocalOperator::MapFilter {
                    udf: udf.clone(),
                    predicate: predicate.clone(),
                },
                matched.input_types(),
                matched.output_types(),
            );
            Ok(ReplacementSubplan::singleton(fused))
        }),
        local_platform(),
    )
}
