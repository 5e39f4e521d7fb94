// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Per-platform rule bundles.
use crate::error::ConfigurationError;
use crate::ident::Platform;
use crate::transformation::PlanTransformation;

/// A named set of rewrite rules contributed by one platform.
///
/// Each rule is built independently so one misconfigured rule does not take
/// the rest of the mapping down with it.
pub trait Mapping {
    /// Unique mapping name.
    fn name(&self) -> &'static str;

    /// Platform the mapping's replacements target.
    fn platform(&self) -> Platform;

    /// Builds the mapping's rules.
    fn transformations(&self) -> Vec<Result<PlanTransformation, ConfigurationError>>;
}
