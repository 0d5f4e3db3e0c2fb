//! End-to-end properties of the executors and the orchestrator.

use enrichflow::core::PartialResults;
use enrichflow::errors::StageError;
use enrichflow::pipeline::{
    execute_parallel, execute_sequential, DefaultSynthesizer, Orchestrator, PipelineConfig,
    Synthesizer,
};
use enrichflow::testing::{
    assert_failed, assert_performed, assert_synthesized, assert_trace_stages, failing_analysis,
    failing_enrich, pending_analysis, pending_enrich, sample_partials, succeeding_analysis,
    tagging_enrich, test_context, CountingSynthesizer,
};
use pretty_assertions::assert_eq;
use std::time::{Duration, Instant};

#[tokio::test]
async fn zero_stage_sequential_run_is_identity() {
    let ctx = test_context("hello");
    let outcome = execute_sequential(ctx.clone(), &[], &PipelineConfig::default())
        .await
        .unwrap();
    assert!(outcome.success);
    assert_eq!(outcome.context, ctx);
    assert!(outcome.trace.is_empty());
}

#[tokio::test]
async fn zero_stage_parallel_run_is_empty() {
    let outcome = execute_parallel(&test_context("hello"), &[], &PipelineConfig::default())
        .await
        .unwrap();
    assert!(outcome.performed.is_empty());
    assert!(outcome.errors.is_empty());
    assert!(outcome.trace.is_empty());
}

#[tokio::test]
async fn sequential_trace_matches_declaration_order() {
    let stages = vec![
        tagging_enrich("one"),
        failing_enrich("two", "optional failure"),
        tagging_enrich("three"),
    ];
    let outcome = execute_sequential(test_context("hi"), &stages, &PipelineConfig::default())
        .await
        .unwrap();

    assert_trace_stages(&outcome.trace, &["one", "two", "three"]);
    assert_eq!(outcome.trace.len(), stages.len());
    assert_performed(&outcome.context, "three");
    assert_failed(&outcome.context, "two");
    assert!(outcome.success);
}

#[tokio::test]
async fn parallel_performed_is_subset_of_configured() {
    let stages = vec![
        succeeding_analysis("a"),
        failing_analysis("b", "nope"),
        succeeding_analysis("c"),
        pending_analysis("d").with_timeout_ms(20),
    ];
    let outcome = execute_parallel(&test_context("hi"), &stages, &PipelineConfig::default())
        .await
        .unwrap();

    assert_eq!(outcome.performed, vec!["a", "c"]);
    assert_eq!(outcome.errors.len(), 2);
    assert_eq!(outcome.results.len(), stages.len());
    assert_eq!(outcome.results.defined_count(), 2);
}

#[tokio::test]
async fn never_resolving_stage_times_out_quickly() {
    let stages = vec![pending_enrich("stuck").with_timeout_ms(50)];
    let started = Instant::now();
    let outcome = execute_sequential(test_context("hi"), &stages, &PipelineConfig::default())
        .await
        .unwrap();

    assert!(started.elapsed() < Duration::from_millis(1000));
    assert_eq!(outcome.context.errors().len(), 1);
    assert!(outcome.context.errors()[0].error.contains("timed out after 50ms"));
}

#[tokio::test]
async fn required_failure_aborts_with_message() {
    let stages = vec![failing_analysis("A", "boom").required(), succeeding_analysis("B")];
    let aborted = Orchestrator::new(PipelineConfig::default())
        .run_parallel(test_context("hi"), &stages, &DefaultSynthesizer::new())
        .await
        .unwrap_err();

    assert!(aborted.message().contains("boom"));
    assert_eq!(aborted.errors, vec![StageError::new("A", "boom", false)]);
}

#[tokio::test]
async fn required_failure_with_continue_synthesizes_with_hole() {
    let synthesizer = CountingSynthesizer::new();
    let stages = vec![failing_analysis("A", "boom").required(), succeeding_analysis("B")];
    let outcome = Orchestrator::new(PipelineConfig::new().with_continue_on_error(true))
        .run_parallel(test_context("hi"), &stages, &synthesizer)
        .await
        .unwrap();

    assert_eq!(outcome.context.errors(), [StageError::new("A", "boom", false)]);
    assert_eq!(synthesizer.last_inputs(), Some((1, 1)));
    assert_synthesized(&outcome.context);
    let synthesized = outcome.context.synthesized().unwrap();
    assert_eq!(synthesized.missing_stages, vec!["A"]);
}

#[tokio::test]
async fn mixed_fan_out_synthesizes_once() {
    let synthesizer = CountingSynthesizer::new();
    let stages = vec![
        succeeding_analysis("s1"),
        succeeding_analysis("s2"),
        failing_analysis("f1", "offline"),
        succeeding_analysis("s3"),
    ];
    let outcome = Orchestrator::new(PipelineConfig::default())
        .run_parallel(test_context("hi"), &stages, &synthesizer)
        .await
        .unwrap();

    assert_eq!(synthesizer.calls(), 1);
    assert_eq!(synthesizer.last_inputs(), Some((3, 1)));
    assert_eq!(outcome.context.errors().len(), 1);
    assert_eq!(
        outcome.context.ledger().performed(),
        ["s1", "s2", "s3", "synthesis"]
    );
}

#[test]
fn synthesis_is_idempotent() {
    let synthesizer = DefaultSynthesizer::new();
    let base = test_context("hi");
    let partials = sample_partials();

    let first = synthesizer.synthesize(&base, &partials).unwrap();
    let second = synthesizer.synthesize(&base, &partials).unwrap();
    assert_eq!(first, second);
    assert_eq!(first.missing_stages, vec!["memory_recall"]);
}

#[test]
fn synthesis_of_nothing_uses_defaults() {
    let synthesized = DefaultSynthesizer::new()
        .synthesize(&test_context("hi"), &PartialResults::new())
        .unwrap();
    assert_eq!(synthesized.intent.intent, "unknown");
    assert!(synthesized.is_complete());
}
