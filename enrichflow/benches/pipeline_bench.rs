//! Benchmarks for pipeline execution.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use enrichflow::analysis::{standard_analysis_stages, HeuristicScoring, ScoringStrategy};
use enrichflow::pipeline::{execute_parallel, DefaultSynthesizer, Orchestrator, PipelineConfig};
use enrichflow::ports::{InMemoryStore, Store, TextGenerator, UnavailableTextGenerator};
use enrichflow::testing::{succeeding_analysis, test_context};
use std::sync::Arc;
use tokio::runtime::Runtime;

fn fan_out_benchmark(c: &mut Criterion) {
    let Ok(rt) = Runtime::new() else {
        return;
    };
    let config = PipelineConfig::default();
    let ctx = test_context("hello, how are you today?");

    let mut group = c.benchmark_group("execute_parallel");
    for width in [1_usize, 4, 16, 64] {
        let stages: Vec<_> = (0..width)
            .map(|i| succeeding_analysis(&format!("stage-{i}")))
            .collect();
        group.bench_with_input(BenchmarkId::from_parameter(width), &stages, |b, stages| {
            b.iter(|| rt.block_on(execute_parallel(black_box(&ctx), stages, &config)));
        });
    }
    group.finish();
}

fn standard_stages_benchmark(c: &mut Criterion) {
    let Ok(rt) = Runtime::new() else {
        return;
    };
    let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
    let generator: Arc<dyn TextGenerator> = Arc::new(UnavailableTextGenerator);
    let scoring: Arc<dyn ScoringStrategy> = Arc::new(HeuristicScoring::new());
    let stages = standard_analysis_stages(&store, &generator, &scoring);
    let orchestrator = Orchestrator::new(PipelineConfig::default());
    let synthesizer = DefaultSynthesizer::new();

    c.bench_function("run_parallel_standard_stages", |b| {
        b.iter(|| {
            rt.block_on(orchestrator.run_parallel(
                black_box(test_context("I love this, can you help me?")),
                &stages,
                &synthesizer,
            ))
        });
    });
}

criterion_group!(benches, fan_out_benchmark, standard_stages_benchmark);
criterion_main!(benches);
