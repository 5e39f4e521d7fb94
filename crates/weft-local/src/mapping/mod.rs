// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Mappings contributed by the local platform.
mod fusion;
mod lowering;
mod sample;

use weft_core::{EngineError, Mapping, MappingRegistration, RewriteEngine};

pub use fusion::{map_filter_transformation, MapFilterFusionMapping, MAP_FILTER_RULE};
pub use lowering::{lowering_transformation, LoweringMapping, LOWERED_FAMILIES};
pub use sample::{sample_transformation, SampleMapping, SAMPLE_RULE};

/// All local mappings, in registration order.
#[must_use]
pub fn mappings() -> Vec<Box<dyn Mapping>> {
    vec![
        Box::new(SampleMapping),
        Box::new(LoweringMapping),
        Box::new(MapFilterFusionMapping),
    ]
}

/// Registers every local mapping with `engine`.
///
/// # Errors
/// [`EngineError::DuplicateMapping`] if a local mapping is already registered.
pub fn register_local_mappings(
    engine: &mut RewriteEngine,
) -> Result<Vec<MappingRegistration>, EngineError> {
    mappings()
        .iter()
        .map(|mapping| engine.register_mapping(mapping.as_ref()))
        .collect()
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::platform::local_platform;

    #[test]
    fn every_rule_builds_and_targets_local() {
        let mut names = Vec::new();
        for mapping in mappings() {
            assert_eq!(mapping.platform(), local_platform());
            for rule in mapping.transformations() {
                let rule = rule.unwrap();
                assert_eq!(rule.platform(), local_platform());
                names.push(rule.name());
            }
        }
        assert_eq!(names.len(), LOWERED_FAMILIES.len() + 2);
        let mut unique = names.clone();
        unique.sort_unstable();
        unique.dedup();
        assert_eq!(unique.len(), names.len());
    }

    #[test]
    fn registering_twice_reports_the_duplicate() {
        let mut engine = RewriteEngine::default();
        let registrations = register_local_mappings(&mut engine).unwrap();
        assert!(registrations.iter().all(MappingRegistration::is_complete));
        assert!(matches!(
            register_local_mappings(&mut engine),
            Err(EngineError::DuplicateMapping("local.sample"))
        ));
    }
}
