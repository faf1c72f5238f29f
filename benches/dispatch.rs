//! Event dispatch benchmarks
//!
//! Measures the per-event cost of the pipeline without any export I/O.
//!
//! ## Expected Performance Characteristics
//!
//! - Label resolution: sub-microsecond per metric (slot lookup, no scans)
//! - Dispatch: roughly linear in the number of matching updaters
//! - Config parsing: one-time startup cost
//!
//! Run with: `cargo bench --bench dispatch`

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use loadprom::{
    config::Config,
    controller::RunController,
    event::{AssertionResult, Event, SampleEvent, VariableSchema, Variables},
    labels::LabelResolver,
    metrics::MetricRegistry,
};
use std::hint::black_box;
use std::sync::Arc;

const CONFIG: &str = r#"
[metrics]
sample_variables = ["user", "region", "session", "tenant"]

[[metrics.listener]]
name = "resp_time"
kind = "distribution"
labels = ["label", "code", "region"]
measuring = "ResponseTime"

[[metrics.listener]]
name = "requests"
kind = "counter"
labels = ["label", "code"]
measuring = "CountTotal"

[[metrics.listener]]
name = "success"
kind = "ratio"
labels = ["label"]
measuring = "SuccessRatio"

[[metrics.listener]]
name = "bytes"
kind = "counter"
labels = ["label", "tenant"]
measuring = "ResponseSize"

[[metrics.listener]]
name = "assertion_failures"
kind = "counter"
labels = ["label"]
measuring = "FailureTotal"
listen_to = "assertions"
"#;

fn sample() -> SampleEvent {
    let mut sample = SampleEvent::new("Checkout", "200", 187);
    sample.bytes = 5120;
    sample.variables = ["alice", "eu-west", "s-42", "acme"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    sample
}

/// Benchmark label resolution for growing label lists
fn bench_label_resolution(c: &mut Criterion) {
    let schema = VariableSchema::new(["user", "region", "session", "tenant"]);
    let sample = sample();
    let vars: Variables = [("thread", "worker-1")].into_iter().collect();

    let cases = vec![
        ("reserved_only", vec!["label", "code"]),
        ("slots", vec!["label", "user", "region", "tenant"]),
        ("context_fallback", vec!["label", "thread", "missing"]),
    ];

    let mut group = c.benchmark_group("label_resolution");
    for (name, labels) in cases {
        let labels: Vec<String> = labels.into_iter().map(str::to_string).collect();
        let resolver = LabelResolver::new(&labels, &schema);
        group.bench_with_input(BenchmarkId::from_parameter(name), &resolver, |b, r| {
            b.iter(|| r.resolve(black_box(&Event::Sample(&sample)), &vars));
        });
    }
    group.finish();
}

/// Benchmark full dispatch of one sample to every matching updater
fn bench_dispatch(c: &mut Criterion) {
    let config: Config = CONFIG.parse().unwrap();
    let controller = RunController::new(Arc::new(MetricRegistry::new()), config.export());
    controller.on_run_start(config.metrics());

    let plain = sample();
    let mut with_assertions = sample();
    with_assertions.assertions = vec![
        AssertionResult::passed("Status is 200"),
        AssertionResult::failed("Has token", "missing"),
    ];
    let vars = Variables::new();

    let mut group = c.benchmark_group("dispatch");
    group.bench_function("sample", |b| {
        b.iter(|| controller.on_sample(black_box(&plain), &vars));
    });
    group.bench_function("sample_with_assertions", |b| {
        b.iter(|| controller.on_sample(black_box(&with_assertions), &vars));
    });
    group.finish();

    controller.on_run_end();
}

/// Benchmark configuration parsing and run start
///
/// Called once per run, so even milliseconds are acceptable.
fn bench_run_start(c: &mut Criterion) {
    c.bench_function("config_parsing", |b| {
        b.iter(|| {
            let config: Config = black_box(CONFIG).parse().unwrap();
            config
        });
    });

    let config: Config = CONFIG.parse().unwrap();
    let controller = RunController::new(Arc::new(MetricRegistry::new()), config.export());
    c.bench_function("run_start_end", |b| {
        b.iter(|| {
            controller.on_run_start(config.metrics());
            controller.on_run_end();
        });
    });
}

criterion_group!(benches, bench_label_resolution, bench_dispatch, bench_run_start);
criterion_main!(benches);
