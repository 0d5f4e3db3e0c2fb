//! Runs an executor followed by synthesis.

use super::guard::check_launch;
use super::parallel::{ParallelExecutor, ParallelRun};
use super::sequential::SequentialExecutor;
use super::synthesis::{run_synthesis, Synthesizer};
use super::{EnrichmentOutcome, ExecutionAborted, PipelineConfig, PIPELINE_STAGE};
use crate::cancellation::CancellationToken;
use crate::context::EnrichmentContext;
use crate::core::PartialResults;
use crate::errors::{EnrichError, StageError};
use crate::events::{EventSink, NoOpEventSink};
use crate::observability::TraceRecorder;
use crate::stages::{AnalysisStageSpec, EnrichStageSpec};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Drives a full enrichment: executor, merge, and synthesis.
///
/// The trace covers every stage attempt of the run, synthesis included, and
/// total time is measured from entry to exit.
pub struct Orchestrator {
    config: PipelineConfig,
    sink: Arc<dyn EventSink>,
    cancel: Arc<CancellationToken>,
}

impl Orchestrator {
    /// Creates an orchestrator for the given configuration.
    #[must_use]
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            sink: Arc::new(NoOpEventSink),
            cancel: Arc::new(CancellationToken::new()),
        }
    }

    /// Sets the event sink used by both executors and synthesis.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Sets the root cancellation token.
    #[must_use]
    pub fn with_cancellation(mut self, cancel: Arc<CancellationToken>) -> Self {
        self.cancel = cancel;
        self
    }

    /// Returns the configuration.
    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Fans out the analysis stages, merges their results into `base`, and
    /// synthesizes.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutionAborted`] when the fan-out aborts, or when
    /// synthesis fails and `continue_on_error` is false.
    pub async fn run_parallel(
        &self,
        base: EnrichmentContext,
        stages: &[AnalysisStageSpec],
        synthesizer: &dyn Synthesizer,
    ) -> Result<EnrichmentOutcome, ExecutionAborted> {
        let started = Instant::now();
        let recorder = self.recorder();
        let executor = ParallelExecutor::new(self.config.clone())
            .with_event_sink(self.sink.clone())
            .with_cancellation(self.cancel.clone());

        let errors_before = base.errors().len();
        let snapshot = Arc::new(base.clone());
        let mut context = base;

        let run = match executor.run_stages(snapshot, stages, &recorder, started).await {
            Ok(run) => run,
            Err(halted) => {
                merge_parallel_run(&mut context, &halted.run);
                return Err(abort(halted.error, context, recorder, started));
            }
        };
        merge_parallel_run(&mut context, &run);

        self.finish(context, &run.results, Some(synthesizer), recorder, started, errors_before)
    }

    /// Runs the sequential stages and, if given, synthesizes over their
    /// result slots.
    ///
    /// The synthesis inputs hold one defined slot per stage that wrote a
    /// result and one empty slot per stage that failed. A stage that
    /// succeeded without writing a slot is not an input, so
    /// `PartialResults::len()` can be smaller than `stages.len()`.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutionAborted`] when the chain aborts, or when synthesis
    /// fails and `continue_on_error` is false.
    pub async fn run_sequential(
        &self,
        base: EnrichmentContext,
        stages: &[EnrichStageSpec],
        synthesizer: Option<&dyn Synthesizer>,
    ) -> Result<EnrichmentOutcome, ExecutionAborted> {
        let started = Instant::now();
        let recorder = self.recorder();
        let executor = SequentialExecutor::new(self.config.clone())
            .with_event_sink(self.sink.clone())
            .with_cancellation(self.cancel.clone());

        let errors_before = base.errors().len();
        let context = match executor.run_stages(base, stages, &recorder, started).await {
            Ok(run) => run.context,
            Err(halted) => return Err(abort(halted.error, halted.context, recorder, started)),
        };

        let partials = sequential_partials(&context, stages, errors_before);
        self.finish(context, &partials, synthesizer, recorder, started, errors_before)
    }

    fn recorder(&self) -> TraceRecorder {
        TraceRecorder::new(self.config.trace_enabled).with_sink(self.sink.clone())
    }

    fn finish(
        &self,
        mut context: EnrichmentContext,
        partials: &PartialResults,
        synthesizer: Option<&dyn Synthesizer>,
        recorder: TraceRecorder,
        started: Instant,
        errors_before: usize,
    ) -> Result<EnrichmentOutcome, ExecutionAborted> {
        if let Some(synthesizer) = synthesizer {
            if let Err(error) = check_launch(&self.config, &self.cancel, started) {
                let already_halted = context.errors()[errors_before..]
                    .iter()
                    .any(|e| e.stage == PIPELINE_STAGE);
                if !already_halted {
                    context.record_error(StageError::new(PIPELINE_STAGE, error.to_string(), false));
                }
                if !self.config.continue_on_error {
                    return Err(abort(error, context, recorder, started));
                }
                warn!(%error, "Skipping synthesis");
            } else if let Err(error) = run_synthesis(synthesizer, &mut context, partials, &recorder) {
                if !self.config.continue_on_error {
                    return Err(abort(error, context, recorder, started));
                }
            }
        }

        let success = context.errors()[errors_before..]
            .iter()
            .all(|e| e.recoverable);
        let total_time = started.elapsed();
        info!(
            request_id = %context.identity().request_id(),
            success,
            performed = context.ledger().performed().len(),
            errors = context.errors().len() - errors_before,
            duration_ms = u64::try_from(total_time.as_millis()).unwrap_or(u64::MAX),
            "Enrichment finished"
        );

        Ok(EnrichmentOutcome {
            success,
            context,
            trace: recorder.into_entries(),
            total_time,
        })
    }
}

fn abort(
    error: EnrichError,
    context: EnrichmentContext,
    recorder: TraceRecorder,
    started: Instant,
) -> ExecutionAborted {
    ExecutionAborted {
        error,
        errors: context.errors().to_vec(),
        context: Some(Box::new(context)),
        trace: recorder.into_entries(),
        total_time: started.elapsed(),
    }
}

/// Folds a fan-out's results into the context: result slots, the operation
/// ledger, and the error ledger.
fn merge_parallel_run(context: &mut EnrichmentContext, run: &ParallelRun) {
    for (stage, result) in run.results.defined() {
        context.record_result(stage, result.clone());
    }
    for stage in &run.performed {
        context.ledger_mut().record_performed(stage);
    }
    for error in &run.errors {
        context.record_error(error.clone());
    }
}

/// Builds synthesis inputs from a sequential run: a defined slot for every
/// stage that wrote one, an empty slot for every stage that failed.
fn sequential_partials(
    context: &EnrichmentContext,
    stages: &[EnrichStageSpec],
    errors_before: usize,
) -> PartialResults {
    let failed = &context.errors()[errors_before..];
    let mut partials = PartialResults::new();
    for spec in stages {
        if let Some(result) = context.result(&spec.name) {
            partials.insert(&spec.name, Some(result.clone()));
        } else if failed.iter().any(|e| e.stage == spec.name) {
            partials.insert(&spec.name, None);
        }
    }
    partials
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{
        AnalysisSource, InsightAnalysis, MemoryRecall, PartialResult, RecalledMemory, SocialAnalysis,
    };
    use crate::pipeline::DefaultSynthesizer;
    use crate::stages::FnAnalysisStage;
    use crate::testing::{
        failing_analysis, failing_enrich, slot_writing_enrich, succeeding_analysis,
        tagging_enrich, test_context, CountingSynthesizer,
    };
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn fixed(name: &str, result: PartialResult) -> AnalysisStageSpec {
        AnalysisStageSpec::analysis(FnAnalysisStage::new(name, move |_, _| {
            let result = result.clone();
            async move { Ok(result) }
        }))
    }

    #[tokio::test]
    async fn test_zero_stage_parallel_run() {
        let outcome = Orchestrator::new(PipelineConfig::default())
            .run_parallel(test_context("hi"), &[], &DefaultSynthesizer::new())
            .await
            .unwrap();

        assert!(outcome.success);
        assert_eq!(outcome.context.ledger().performed(), ["synthesis"]);
        assert!(outcome.context.synthesized().unwrap().is_complete());
        assert_eq!(outcome.trace.len(), 1);
    }

    #[tokio::test]
    async fn test_mixed_fan_out_synthesizes_once_with_hole() {
        let synthesizer = CountingSynthesizer::new();
        let stages = vec![
            succeeding_analysis("sentiment"),
            failing_analysis("intent", "offline"),
            succeeding_analysis("memory"),
            succeeding_analysis("social"),
        ];
        let outcome = Orchestrator::new(PipelineConfig::default())
            .run_parallel(test_context("hi"), &stages, &synthesizer)
            .await
            .unwrap();

        assert!(outcome.success);
        assert_eq!(synthesizer.calls(), 1);
        assert_eq!(synthesizer.last_inputs(), Some((3, 1)));
        assert_eq!(
            outcome.context.ledger().performed(),
            ["sentiment", "memory", "social", "synthesis"]
        );
        assert_eq!(outcome.context.errors().len(), 1);
        assert_eq!(outcome.trace.len(), 5);
        assert_eq!(outcome.trace.last().unwrap().stage, "synthesis");
    }

    #[tokio::test]
    async fn test_required_failure_with_continue_still_synthesizes() {
        let synthesizer = CountingSynthesizer::new();
        let stages = vec![failing_analysis("A", "boom").required(), succeeding_analysis("B")];
        let outcome = Orchestrator::new(PipelineConfig::new().with_continue_on_error(true))
            .run_parallel(test_context("hi"), &stages, &synthesizer)
            .await
            .unwrap();

        assert!(!outcome.success);
        assert_eq!(synthesizer.calls(), 1);
        assert_eq!(synthesizer.last_inputs(), Some((1, 1)));
        assert_eq!(outcome.context.errors(), [StageError::new("A", "boom", false)]);
        assert!(outcome.context.synthesized().is_some());
    }

    #[tokio::test]
    async fn test_required_failure_aborts_without_synthesis() {
        let synthesizer = CountingSynthesizer::new();
        let stages = vec![failing_analysis("A", "boom").required()];
        let aborted = Orchestrator::new(PipelineConfig::default())
            .run_parallel(test_context("hi"), &stages, &synthesizer)
            .await
            .unwrap_err();

        assert!(aborted.message().contains("boom"));
        assert_eq!(synthesizer.calls(), 0);
        let ctx = aborted.context.unwrap();
        assert_eq!(ctx.errors(), [StageError::new("A", "boom", false)]);
    }

    #[tokio::test]
    async fn test_typed_results_land_in_ledger() {
        let stages = vec![
            fixed(
                "insight",
                PartialResult::Insight(InsightAnalysis {
                    insight_id: "insight-abc".into(),
                    text: "likes tea".into(),
                    source: AnalysisSource::Heuristic,
                }),
            ),
            fixed(
                "memory",
                PartialResult::MemoryRecall(MemoryRecall {
                    memories: vec![RecalledMemory {
                        key: "mem-1".into(),
                        content: "tea".into(),
                        importance: 0.7,
                        relevance: 1.0,
                    }],
                }),
            ),
            fixed(
                "social",
                PartialResult::Social(SocialAnalysis {
                    summary: "friendly greeting".into(),
                    rapport: 0.8,
                }),
            ),
        ];
        let outcome = Orchestrator::new(PipelineConfig::default())
            .run_parallel(test_context("hi"), &stages, &DefaultSynthesizer::new())
            .await
            .unwrap();

        let ledger = outcome.context.ledger();
        assert_eq!(ledger.insights_generated(), ["insight-abc"]);
        assert_eq!(ledger.resources_accessed(), ["mem-1"]);
        assert_eq!(ledger.social_interactions(), ["friendly greeting"]);
        assert!(outcome.context.result("memory").is_some());
        let synthesized = outcome.context.synthesized().unwrap();
        assert_eq!(synthesized.insights, vec!["likes tea"]);
    }

    #[tokio::test]
    async fn test_sequential_run_with_synthesis() {
        let stages = vec![
            tagging_enrich("a"),
            slot_writing_enrich("b"),
            failing_enrich("c", "meh"),
        ];
        let synthesizer = CountingSynthesizer::new();
        let outcome = Orchestrator::new(PipelineConfig::default())
            .run_sequential(test_context("hi"), &stages, Some(&synthesizer))
            .await
            .unwrap();

        assert!(outcome.success);
        assert_eq!(synthesizer.last_inputs(), Some((1, 1)));
        assert_eq!(outcome.context.synthesized().unwrap().missing_stages, vec!["c"]);
        assert_eq!(outcome.context.ledger().performed(), ["a", "b", "synthesis"]);
        assert_eq!(outcome.trace.len(), 4);
    }

    #[tokio::test]
    async fn test_sequential_run_without_synthesis() {
        let outcome = Orchestrator::new(PipelineConfig::default())
            .run_sequential(test_context("hi"), &[tagging_enrich("a")], None)
            .await
            .unwrap();
        assert!(outcome.context.synthesized().is_none());
        assert_eq!(outcome.trace.len(), 1);
    }

    #[tokio::test]
    async fn test_budget_checked_before_synthesis() {
        let synthesizer = CountingSynthesizer::new();
        let stages = vec![crate::testing::slow_analysis("slow", 40)];
        let config = PipelineConfig::new()
            .with_max_execution_time(Duration::from_millis(10))
            .with_continue_on_error(true);
        let outcome = Orchestrator::new(config)
            .run_parallel(test_context("hi"), &stages, &synthesizer)
            .await
            .unwrap();

        assert!(!outcome.success);
        assert_eq!(synthesizer.calls(), 0);
        assert_eq!(outcome.context.errors().last().unwrap().stage, PIPELINE_STAGE);
    }

    #[tokio::test]
    async fn test_synthesis_failure_aborts_without_continue() {
        let synthesizer = CountingSynthesizer::failing("merge broke");
        let aborted = Orchestrator::new(PipelineConfig::default())
            .run_parallel(test_context("hi"), &[succeeding_analysis("a")], &synthesizer)
            .await
            .unwrap_err();
        assert_eq!(aborted.error, EnrichError::Synthesis("merge broke".into()));
        assert_eq!(aborted.errors, vec![StageError::new("synthesis", "merge broke", false)]);
    }

    #[tokio::test]
    async fn test_synthesis_failure_with_continue() {
        let synthesizer = CountingSynthesizer::failing("merge broke");
        let outcome = Orchestrator::new(PipelineConfig::new().with_continue_on_error(true))
            .run_parallel(test_context("hi"), &[succeeding_analysis("a")], &synthesizer)
            .await
            .unwrap();
        assert!(!outcome.success);
        assert!(outcome.context.synthesized().is_none());
    }
}
