// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
#![allow(dead_code)]

use weft_core::{
    DataSetType, EngineConfig, Operator, OperatorId, Plan, RewriteEngine, SampleMethod,
};
use weft_local::register_local_mappings;

/// Installs a test-friendly subscriber once; honours `RUST_LOG`.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn row() -> DataSetType {
    DataSetType::new("row")
}

/// Engine with every local mapping registered.
pub fn local_engine(config: EngineConfig) -> RewriteEngine {
    let mut engine = RewriteEngine::new(config).unwrap();
    for registration in register_local_mappings(&mut engine).unwrap() {
        assert!(registration.is_complete(), "{registration:?}");
    }
    engine
}

/// `source -> map(f) -> filter(p) -> sink`, returning `[source, map, filter, sink]`.
pub fn linear() -> (Plan, [OperatorId; 4]) {
    let mut plan = Plan::new();
    let source = plan.add_operator(Operator::source("in", row()));
    let map = plan.add_operator(Operator::map("f", row(), row()));
    let filter = plan.add_operator(Operator::filter("p", row()));
    let sink = plan.add_operator(Operator::sink("out", row()));
    plan.connect(source, 0, map, 0).unwrap();
    plan.connect(map, 0, filter, 0).unwrap();
    plan.connect(filter, 0, sink, 0).unwrap();
    (plan, [source, map, filter, sink])
}

/// `source -> sample(method, 10) -> sink`.
pub fn sample_plan(method: SampleMethod) -> (Plan, OperatorId) {
    let mut plan = Plan::new();
    let source = plan.add_operator(Operator::source("in", row()));
    let sample = plan.add_operator(Operator::sample(method, 10, row()));
    let sink = plan.add_operator(Operator::sink("out", row()));
    plan.connect(source, 0, sample, 0).unwrap();
    plan.connect(sample, 0, sink, 0).unwrap();
    (plan, sample)
}

/// Execution operator names of `plan`, sorted.
pub fn execution_names(plan: &Plan) -> Vec<&'static str> {
    let mut names: Vec<_> = plan
        .operators()
        .filter_map(|(_, node)| node.operator().as_execution().map(|op| op.name()))
        .collect();
    names.sort_unstable();
    names
}
