//! # Probdial Performance Benchmarks
//!
//! Benchmarks for the hot paths of rule evaluation:
//! - Interval construction and weighted sampling
//! - Categorical table sampling
//! - Template matching
//! - Rule grounding over growing dialogue states
//!

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use probdial::distribs::{CategoricalTableBuilder, IndependentDistribution};
use probdial::rules::{Condition, Effect, Parameter, Relation, Rule, RuleOutput, RuleType};
use probdial::sampling::Intervals;
use probdial::{Assignment, Template, Value, ValueFactory};

/// Creates deterministic weighted values for sampling benchmarks.
///
/// Weights cycle through a small set of magnitudes so the cumulative
/// distribution is uneven but reproducible across runs.
fn create_weighted_values(count: usize) -> Vec<(Value, f64)> {
    (0..count)
        .map(|i| {
            let value = ValueFactory::create(&format!("val_{i}"));
            let weight = 1.0 + (i % 17) as f64 * 0.25;
            (value, weight)
        })
        .collect()
}

/// Creates a dialogue state with `count` filled slot variables.
fn create_slot_state(count: usize) -> Assignment {
    (0..count)
        .map(|i| (format!("filled(slot_{i})"), ValueFactory::create("true")))
        .collect()
}

/// Benchmarks building the cumulative interval index from weighted values.
fn bench_interval_construction(c: &mut Criterion) {
    let mut group = c.benchmark_group("interval_construction");

    for size in [100, 1000, 10_000].iter() {
        group.throughput(Throughput::Elements(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let pairs = create_weighted_values(size);
            b.iter(|| {
                let intervals = Intervals::from_pairs(black_box(pairs.clone())).unwrap();
                black_box(intervals);
            });
        });
    }

    group.finish();
}

/// Benchmarks repeated draws from a prebuilt interval index.
fn bench_interval_sampling(c: &mut Criterion) {
    let mut group = c.benchmark_group("interval_sampling");

    for size in [100, 1000, 10_000].iter() {
        group.throughput(Throughput::Elements(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let intervals = Intervals::from_pairs(create_weighted_values(size)).unwrap();
            b.iter(|| {
                for _ in 0..100 {
                    let drawn = intervals.sample().unwrap();
                    black_box(drawn);
                }
            });
        });
    }

    group.finish();
}

/// Benchmarks sampling from a categorical table through the distribution API.
fn bench_categorical_sampling(c: &mut Criterion) {
    let mut group = c.benchmark_group("categorical_sampling");

    for size in [100, 1000, 10_000].iter() {
        group.throughput(Throughput::Elements(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let mut builder = CategoricalTableBuilder::new("v");
            let prob = 1.0 / size as f64;
            for i in 0..size {
                builder
                    .add_row(ValueFactory::create(&format!("val_{i}")), prob)
                    .unwrap();
            }
            let table: Box<dyn IndependentDistribution> = builder.build();

            b.iter(|| {
                for _ in 0..100 {
                    let drawn = table.sample_value().unwrap();
                    black_box(drawn);
                }
            });
        });
    }

    group.finish();
}

/// Benchmarks full template matching against candidate utterances.
fn bench_template_matching(c: &mut Criterion) {
    let mut group = c.benchmark_group("template_matching");

    for size in [100, 1000, 10_000].iter() {
        group.throughput(Throughput::Elements(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let template = Template::new("could I have {item} please");
            let utterances: Vec<String> = (0..size)
                .map(|i| format!("could I have item_{i} please"))
                .collect();

            b.iter(|| {
                let mut matches = 0;
                for utterance in &utterances {
                    if template.match_full(utterance).is_matching() {
                        matches += 1;
                    }
                }
                black_box(matches);
            });
        });
    }

    group.finish();
}

/// Benchmarks grounding an underspecified rule over growing states.
fn bench_rule_grounding(c: &mut Criterion) {
    let mut group = c.benchmark_group("rule_grounding");

    for size in [100, 1000, 10_000].iter() {
        group.throughput(Throughput::Elements(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let state = create_slot_state(size);

            let mut output = RuleOutput::new(RuleType::Prob);
            output.add_effect(
                Effect::parse_effect("ack({s}):=confirmed").unwrap(),
                Parameter::Fixed(1.0),
            );
            let mut rule = Rule::new("confirm", RuleType::Prob);
            rule.add_case(
                Condition::basic("filled({s})", "true", Relation::Equal),
                output,
            );

            b.iter(|| {
                let groundings = rule.get_groundings(black_box(&state));
                black_box(groundings);
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_interval_construction,
    bench_interval_sampling,
    bench_categorical_sampling,
    bench_template_matching,
    bench_rule_grounding,
);
criterion_main!(benches);
