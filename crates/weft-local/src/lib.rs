// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! weft-local: the single-process platform for the Weft plan rewriter.
//!
//! Provides the local execution operators and the mappings that lower logical
//! plans onto them: one-to-one lowering per family, sampling (random and
//! reservoir only), and `Map → Filter` fusion.
#![forbid(unsafe_code)]
#![deny(missing_docs, rust_2018_idioms, unused_must_use)]
#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    clippy::cargo,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::dbg_macro,
    clippy::print_stdout,
    clippy::print_stderr
)]
#![allow(
    clippy::must_use_candidate,
    clippy::missing_const_for_fn,
    clippy::module_name_repetitions
)]

mod mapping;
mod operators;
mod platform;

/// Local mappings and their rules.
pub use mapping::{
    lowering_transformation, map_filter_transformation, mappings, register_local_mappings,
    sample_transformation, LoweringMapping, MapFilterFusionMapping, SampleMapping,
    LOWERED_FAMILIES, MAP_FILTER_RULE, SAMPLE_RULE,
};
/// Local execution operators.
pub use operators::LocalOperator;
/// Local platform token.
pub use platform::{local_platform, LOCAL_PLATFORM_NAME};
