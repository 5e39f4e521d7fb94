// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
#![allow(dead_code)]

use weft_core::{
    make_platform_id, DataSetType, Epoch, ExecutionOperator, LogicalKind, LogicalOperator,
    Mapping, Operator, OperatorId, OperatorPattern, Plan, PlanTransformation, Platform,
    PlatformId, ReplacementSubplan, ReplacementSubplanFactory, SampleMethod, SubplanPattern,
    UnsupportedVariantError,
};

pub const TEST_PLATFORM: &str = "test";

/// Installs a test-friendly subscriber once; honours `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn platform() -> Platform {
    Platform::new(TEST_PLATFORM)
}

pub fn row() -> DataSetType {
    DataSetType::new("row")
}

/// Minimal execution operator: a name on the test platform.
#[derive(Debug, Clone)]
pub struct TestExec {
    pub name: &'static str,
    pub platform: PlatformId,
}

impl TestExec {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            platform: make_platform_id(TEST_PLATFORM),
        }
    }
}

impl ExecutionOperator for TestExec {
    fn name(&self) -> &'static str {
        self.name
    }

    fn platform(&self) -> PlatformId {
        self.platform
    }
}

/// Tiny deterministic RNG (xorshift64*) so tests don't need `rand`.
#[derive(Clone)]
pub struct XorShift64 {
    state: u64,
}

impl XorShift64 {
    pub fn new(seed: u64) -> Self {
        Self { state: seed.max(1) }
    }

    pub fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.state = x;
        x.wrapping_mul(0x2545_F491_4F6C_DD1D)
    }

    pub fn gen_range_usize(&mut self, upper: usize) -> usize {
        if upper <= 1 {
            return 0;
        }
        (self.next_u64() as usize) % upper
    }
}

/// `source -> map(f) -> filter(p) -> sink`.
pub struct Linear {
    pub plan: Plan,
    pub source: OperatorId,
    pub map: OperatorId,
    pub filter: OperatorId,
    pub sink: OperatorId,
}

pub fn linear() -> Linear {
    let mut plan = Plan::new();
    let source = plan.add_operator(Operator::source("in", row()));
    let map = plan.add_operator(Operator::map("f", row(), row()));
    let filter = plan.add_operator(Operator::filter("p", row()));
    let sink = plan.add_operator(Operator::sink("out", row()));
    plan.connect(source, 0, map, 0).unwrap();
    plan.connect(map, 0, filter, 0).unwrap();
    plan.connect(filter, 0, sink, 0).unwrap();
    Linear {
        plan,
        source,
        map,
        filter,
        sink,
    }
}

/// `source -> sample(method) -> sink`.
pub fn sample_plan(method: SampleMethod) -> (Plan, OperatorId) {
    let mut plan = Plan::new();
    let source = plan.add_operator(Operator::source("in", row()));
    let sample = plan.add_operator(Operator::sample(method, 10, row()));
    let sink = plan.add_operator(Operator::sink("out", row()));
    plan.connect(source, 0, sample, 0).unwrap();
    plan.connect(sample, 0, sink, 0).unwrap();
    (plan, sample)
}

/// Single-operator rule replacing every `kind` operator with `exec`.
pub fn lowering_rule(
    name: &'static str,
    kind: LogicalKind,
    exec: &'static str,
) -> PlanTransformation {
    PlanTransformation::new(
        name,
        SubplanPattern::singleton(OperatorPattern::logical(kind.label(), kind, true)),
        ReplacementSubplanFactory::of_single_operator(move |op, _| {
            Ok(Operator::replacing(op, TestExec::new(exec)))
        }),
        platform(),
    )
    .unwrap()
}

/// Single-operator sample rule supporting only `Random`.
pub fn random_sample_rule() -> PlanTransformation {
    PlanTransformation::new(
        "test.sample",
        SubplanPattern::singleton(OperatorPattern::logical(
            "sample",
            LogicalKind::Sample,
            true,
        )),
        ReplacementSubplanFactory::of_single_operator(|op, _| match op.as_logical() {
            Some(LogicalOperator::Sample {
                method: SampleMethod::Random,
                ..
            }) => Ok(Operator::replacing(op, TestExec::new("test.random_sample"))),
            Some(LogicalOperator::Sample { method, .. }) => Err(UnsupportedVariantError::new(
                "sample",
                method.label(),
                TEST_PLATFORM,
            )),
            _ => Err(UnsupportedVariantError::new(
                "sample",
                "non-sample",
                TEST_PLATFORM,
            )),
        }),
        platform(),
    )
    .unwrap()
}

/// Fuses `map -> filter` into one execution operator.
pub fn fusion_rule() -> PlanTransformation {
    PlanTransformation::new(
        "test.map_filter",
        SubplanPattern::chain(vec![
            OperatorPattern::logical("map", LogicalKind::Map, false),
            OperatorPattern::logical("filter", LogicalKind::Filter, true),
        ])
        .unwrap(),
        ReplacementSubplanFactory::of_multiple_operators(|matched, _| {
            let input = matched.input_types();
            let output = matched.output_types();
            Ok(ReplacementSubplan::singleton(Operator::execution(
                TestExec::new("test.map_filter"),
                input,
                output,
            )))
        }),
        platform(),
    )
    .unwrap()
}

/// A mapping over a fixed list of prebuilt rules.
pub struct TestMapping {
    pub name: &'static str,
    pub platform: Platform,
    pub rules: fn() -> Vec<Result<PlanTransformation, weft_core::ConfigurationError>>,
}

impl Mapping for TestMapping {
    fn name(&self) -> &'static str {
        self.name
    }

    fn platform(&self) -> Platform {
        self.platform
    }

    fn transformations(&self) -> Vec<Result<PlanTransformation, weft_core::ConfigurationError>> {
        (self.rules)()
    }
}

/// Epochs of every operator in `plan`, by id.
pub fn epochs(plan: &Plan) -> Vec<(OperatorId, Epoch)> {
    plan.operators().map(|(id, node)| (id, node.epoch())).collect()
}
