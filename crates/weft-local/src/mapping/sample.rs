// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! `Sample` → local random or reservoir sample.
use tracing::trace;
use weft_core::{
    ConfigurationError, LogicalKind, LogicalOperator, Mapping, Operator, OperatorPattern,
    PlanTransformation, Platform, ReplacementSubplanFactory, SubplanPattern,
    UnsupportedVariantError,
};

use crate::operators::LocalOperator;
use crate::platform::{local_platform, LOCAL_PLATFORM_NAME};

/// Name of the sample rule.
pub const SAMPLE_RULE: &str = "local.sample";

/// Lowers `Sample` operators.
///
/// The pattern accepts every sample method; methods without a local
/// implementation are refused per match by the factory, which leaves those
/// operators for other platforms.
#[derive(Debug, Clone, Copy, Default)]
pub struct SampleMapping;

impl Mapping for SampleMapping {
    fn name(&self) -> &'static str {
        "local.sample"
    }

    fn platform(&self) -> Platform {
        local_platform()
    }

    fn transformations(&self) -> Vec<Result<PlanTransformation, ConfigurationError>> {
        vec![sample_transformation()]
    }
}

/// Builds the sample rule.
///
/// # Errors
/// Never in practice; the pattern and factory are statically valid.
pub fn sample_transformation() -> Result<PlanTransformation, ConfigurationError> {
    PlanTransformation::new(
        SAMPLE_RULE,
        SubplanPattern::singleton(OperatorPattern::logical(
            "sample",
            LogicalKind::Sample,
            true,
        )),
        ReplacementSubplanFactory::of_single_operator(|matched, epoch| {
            let logical = matched.as_logical().ok_or_else(|| {
                UnsupportedVariantError::new(
                    "sample",
                    matched.kind().to_string(),
                    LOCAL_PLATFORM_NAME,
                )
            })?;
            if let LogicalOperator::Sample { method, size, .. } = logical {
                trace!(%method, size, epoch = epoch.value(), "lowering sample");
            }
            LocalOperator::lower(logical).map(|local| Operator::replacing(matched, local))
        }),
        local_platform(),
    )
}
