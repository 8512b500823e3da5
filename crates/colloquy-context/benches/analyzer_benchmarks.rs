//! Benchmarks for per-turn analysis cost.
//!
//! Every user utterance passes through the parameter resolver and the
//! command analyzer before any state is touched, so both sit on the hot
//! path of a voice turn. Target: well under 1ms per utterance.

use std::time::Duration;

use colloquy_context::intent::{CommandAnalyzer, ParameterResolver};
use colloquy_context::types::{ActiveContext, ParamValue};
use criterion::{criterion_group, criterion_main, Criterion};

/// Realistic utterances covering each intent plus follow-up answers.
fn utterances() -> Vec<String> {
    let base = [
        "Generate a document about the Q3 launch as a PDF",
        "email john@example.com and sarah@example.org about the budget review",
        "schedule a meeting with the design team tomorrow at 3pm",
        "search for rust async runtimes",
        "A report about quarterly revenue and churn",
        "Word document please",
        "yes",
        "tell me a joke",
    ];
    (0..800)
        .map(|i| format!("{} {}", base[i % base.len()], i))
        .collect()
}

fn bench_resolver(c: &mut Criterion) {
    let resolver = ParameterResolver::new();
    let inputs = utterances();

    let mut group = c.benchmark_group("parameter_resolver");
    group.sample_size(200);
    group.measurement_time(Duration::from_secs(5));

    group.bench_function("resolve_single", |b| {
        let mut idx = 0usize;
        b.iter(|| {
            let params = resolver.resolve(&inputs[idx % inputs.len()]);
            idx += 1;
            params
        });
    });

    group.bench_function("detect_format_single", |b| {
        let mut idx = 0usize;
        b.iter(|| {
            let format = resolver.detect_format(&inputs[idx % inputs.len()]);
            idx += 1;
            format
        });
    });

    group.finish();
}

fn bench_analyzer(c: &mut Criterion) {
    let analyzer = CommandAnalyzer::default();
    let inputs = utterances();

    let idle = ActiveContext::default();
    let mut collecting = ActiveContext {
        current_tool: Some("generate_document".to_string()),
        required_parameters: vec!["format".to_string()],
        ..ActiveContext::default()
    };
    collecting
        .pending_parameters
        .insert("content".to_string(), ParamValue::from("quarterly report"));

    let mut group = c.benchmark_group("command_analyzer");
    group.sample_size(200);
    group.measurement_time(Duration::from_secs(5));

    group.bench_function("analyze_fresh_turn", |b| {
        let mut idx = 0usize;
        b.iter(|| {
            let analysis = analyzer.analyze(&inputs[idx % inputs.len()], &idle);
            idx += 1;
            analysis
        });
    });

    group.bench_function("analyze_follow_up_turn", |b| {
        let mut idx = 0usize;
        b.iter(|| {
            let analysis = analyzer.analyze(&inputs[idx % inputs.len()], &collecting);
            idx += 1;
            analysis
        });
    });

    group.bench_function("analyze_batch_100", |b| {
        b.iter(|| {
            let mut results = Vec::with_capacity(100);
            for input in &inputs[..100] {
                results.push(analyzer.analyze(input, &idle));
            }
            results
        });
    });

    group.finish();
}

criterion_group!(benches, bench_resolver, bench_analyzer);
criterion_main!(benches);
