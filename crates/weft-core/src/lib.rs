// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! weft-core: pattern-matching plan rewriting for cross-platform data processing.
//!
//! A logical [`Plan`] is specialized by [`PlanTransformation`]s: each rule
//! pairs a [`SubplanPattern`] with a [`ReplacementSubplanFactory`] and a
//! target [`Platform`]. Applying a rule splices platform operators in place of
//! every match and stamps them with a fresh [`Epoch`]; a rule producing epoch
//! `e` never matches operators of epoch `e` or later, which bounds every
//! rewrite chain. [`RewriteEngine`] collects rules from per-platform
//! [`Mapping`]s and enumerates the distinct plan variants they reach.
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
    clippy::return_self_not_must_use,
    clippy::missing_const_for_fn,
    clippy::redundant_pub_crate,
    clippy::module_name_repetitions,
    clippy::use_self
)]

mod config;
mod digest;
mod engine;
mod enumerate;
mod error;
mod factory;
mod ident;
mod mapping;
mod matcher;
mod operator;
mod pattern;
mod plan;
mod receipt;
mod transformation;
mod view;

// Re-exports for stable public API
/// Engine configuration and the storage port it is loaded through.
pub use config::{load_engine_config, ConfigError, ConfigStore, EngineConfig, ENGINE_CONFIG_KEY};
/// Canonical structural plan digest.
pub use digest::PlanDigest;
/// Rule registry and enumeration entry points.
pub use engine::{EngineError, MappingRegistration, RewriteEngine};
/// Enumeration results.
pub use enumerate::{Enumeration, PlanVariant, RuleApplication};
/// Rewrite error taxonomy.
pub use error::{
    BoundaryMismatch, ConfigurationError, MatchInvariantViolation, UnsupportedVariantError,
};
/// Replacement subplans and factories.
pub use factory::{
    LocalSlot, MatchedSubplan, MultiOperatorFn, ReplacementSubplan, ReplacementSubplanBuilder,
    ReplacementSubplanFactory, SingleOperatorFn,
};
/// Identifiers, epochs, and platform tokens.
pub use ident::{
    make_platform_id, make_rule_id, Epoch, Hash, OperatorId, Platform, PlatformId, RuleId,
};
/// Per-platform rule bundles.
pub use mapping::Mapping;
/// Matching.
pub use matcher::{Match, MatchBoundary, Matcher};
/// Operator records.
pub use operator::{
    DataSetType, ExecutionOperator, LogicalKind, LogicalOperator, Operator, OperatorBody,
    OperatorKind, SampleMethod,
};
/// Patterns.
pub use pattern::{
    OperatorPattern, PatternConnection, Predicate, SubplanPattern, SubplanPatternBuilder,
};
/// Plans and slots.
pub use plan::{InputSlot, OutputSlot, Plan, PlanError, PlanNode, SlotDirection};
/// Apply receipts.
pub use receipt::{ApplyReceipt, ApplyReceiptEntry, Disposition, SkipReason};
/// Rewrite rules.
pub use transformation::PlanTransformation;
/// Read-only plan view.
pub use view::PlanView;
