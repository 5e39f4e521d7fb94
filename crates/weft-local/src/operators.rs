// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Local execution operators.
//!
//! These are placement tokens for the optimizer: each names the local
//! implementation a logical operator lowers to, together with the
//! configuration it needs. Running them is the executor's job.
use weft_core::{
    ExecutionOperator, LogicalOperator, PlatformId, SampleMethod, UnsupportedVariantError,
};

use crate::platform::{local_platform, LOCAL_PLATFORM_NAME};

/// Operators implemented by the local platform.
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum LocalOperator {
    /// Reads a named in-memory collection.
    CollectionSource {
        /// Dataset name.
        name: String,
    },
    /// Collects into a named in-memory destination.
    CollectionSink {
        /// Destination name.
        name: String,
    },
    /// Element-wise `udf`.
    Map {
        /// Function name.
        udf: String,
    },
    /// Element-wise `udf` with flattening.
    FlatMap {
        /// Function name.
        udf: String,
    },
    /// Keeps elements satisfying `predicate`.
    Filter {
        /// Predicate name.
        predicate: String,
    },
    /// `udf` followed by `predicate` in a single pass.
    MapFilter {
        /// Function name.
        udf: String,
        /// Predicate name.
        predicate: String,
    },
    /// Uniform sample drawn after materializing the input.
    RandomSample {
        /// Sample size.
        size: u64,
        /// Optional seed.
        seed: Option<u64>,
    },
    /// Single-pass reservoir sample.
    ReservoirSample {
        /// Sample size.
        size: u64,
        /// Optional seed.
        seed: Option<u64>,
    },
    /// Hash-set based duplicate elimination.
    Distinct,
    /// In-memory sort by `key`.
    Sort {
        /// Key extractor name.
        key: String,
    },
    /// Element count.
    Count,
    /// Hash-aggregating reduction.
    ReduceBy {
        /// Key extractor name.
        key: String,
        /// Reduce function name.
        udf: String,
    },
    /// Hash grouping.
    GroupBy {
        /// Key extractor name.
        key: String,
    },
    /// Build-and-probe hash join.
    HashJoin {
        /// Left key extractor name.
        left_key: String,
        /// Right key extractor name.
        right_key: String,
    },
    /// Concatenation.
    Union,
}

impl LocalOperator {
    /// Local counterpart of `op`.
    ///
    /// Sampling is restricted to random and reservoir sampling; `Any` picks
    /// random sampling.
    ///
    /// # Errors
    /// [`UnsupportedVariantError`] for sample methods the local platform does
    /// not implement.
    pub fn lower(op: &LogicalOperator) -> Result<Self, UnsupportedVariantError> {
        Ok(match op {
            LogicalOperator::Source { name } => Self::CollectionSource { name: name.clone() },
            LogicalOperator::Sink { name } => Self::CollectionSink { name: name.clone() },
            LogicalOperator::Map { udf } => Self::Map { udf: udf.clone() },
            LogicalOperator::FlatMap { udf } => Self::FlatMap { udf: udf.clone() },
            LogicalOperator::Filter { predicate } => Self::Filter {
                predicate: predicate.clone(),
            },
            LogicalOperator::Sample { method, size, seed } => match method {
                SampleMethod::Random | SampleMethod::Any => Self::RandomSample {
                    size: *size,
                    seed: *seed,
                },
                SampleMethod::Reservoir => Self::ReservoirSample {
                    size: *size,
                    seed: *seed,
                },
                SampleMethod::Bernoulli | SampleMethod::ShufflePartitionFirst => {
                    return Err(UnsupportedVariantError::new(
                        "sample",
                        method.label(),
                        LOCAL_PLATFORM_NAME,
                    ))
                }
            },
            LogicalOperator::Distinct => Self::Distinct,
            LogicalOperator::Sort { key } => Self::Sort { key: key.clone() },
            LogicalOperator::Count => Self::Count,
            LogicalOperator::ReduceBy { key, udf } => Self::ReduceBy {
                key: key.clone(),
                udf: udf.clone(),
            },
            LogicalOperator::GroupBy { key } => Self::GroupBy { key: key.clone() },
            LogicalOperator::Join {
                left_key,
                right_key,
            } => Self::HashJoin {
                left_key: left_key.clone(),
                right_key: right_key.clone(),
            },
            LogicalOperator::Union => Self::Union,
        })
    }
}

impl ExecutionOperator for LocalOperator {
    fn name(&self) -> &'static str {
        match self {
            Self::CollectionSource { .. } => "local.collection_source",
            Self::CollectionSink { .. } => "local.collection_sink",
            Self::Map { .. } => "local.map",
            Self::FlatMap { .. } => "local.flat_map",
            Self::Filter { .. } => "local.filter",
            Self::MapFilter { .. } => "local.map_filter",
            Self::RandomSample { .. } => "local.random_sample",
            Self::ReservoirSample { .. } => "local.reservoir_sample",
            Self::Distinct => "local.distinct",
            Self::Sort { .. } => "local.sort",
            Self::Count => "local.count",
            Self::ReduceBy { .. } => "local.reduce_by",
            Self::GroupBy { .. } => "local.group_by",
            Self::HashJoin { .. } => "local.hash_join",
            Self::Union => "local.union",
        }
    }

    fn platform(&self) -> PlatformId {
        local_platform().id()
    }

    fn describe(&self) -> String {
        match self {
            Self::CollectionSource { name } | Self::CollectionSink { name } => name.clone(),
            Self::Map { udf } | Self::FlatMap { udf } => udf.clone(),
            Self::Filter { predicate } => predicate.clone(),
            Self::MapFilter { udf, predicate } => format!("{udf}|{predicate}"),
            Self::RandomSample { size, seed } | Self::ReservoirSample { size, seed } => {
                match seed {
                    Some(seed) => format!("{size}@{seed}"),
                    None => size.to_string(),
                }
            }
            Self::Sort { key } | Self::GroupBy { key } => key.clone(),
            Self::ReduceBy { key, udf } => format!("{key}|{udf}"),
            Self::HashJoin {
                left_key,
                right_key,
            } => format!("{left_key}={right_key}"),
            Self::Distinct | Self::Count | Self::Union => String::new(),
        }
    }
}
