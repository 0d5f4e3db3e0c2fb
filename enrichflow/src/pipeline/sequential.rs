//! Sequential enrichment executor.
//!
//! Runs stages one at a time in declaration order. Each stage receives the
//! context produced by the previous one.

use super::guard::{check_launch, run_guarded};
use super::{ExecutionAborted, PipelineConfig, SequentialOutcome, PIPELINE_STAGE};
use crate::cancellation::CancellationToken;
use crate::context::EnrichmentContext;
use crate::errors::{EnrichError, StageError};
use crate::events::{EventSink, NoOpEventSink, PIPELINE_ABORTED, PIPELINE_TIMED_OUT};
use crate::observability::TraceRecorder;
use crate::stages::{validate_stage_specs, EnrichStageSpec};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, warn};

/// What the stage loop produced when it ran to the end or stopped early
/// with `continue_on_error`.
#[derive(Debug)]
pub(crate) struct SequentialRun {
    pub context: EnrichmentContext,
    pub complete: bool,
}

/// Why the stage loop stopped.
#[derive(Debug)]
pub(crate) struct Halted {
    pub error: EnrichError,
    pub context: EnrichmentContext,
}

/// Runs [`EnrichStageSpec`]s strictly one after another.
pub struct SequentialExecutor {
    config: PipelineConfig,
    sink: Arc<dyn EventSink>,
    cancel: Arc<CancellationToken>,
}

impl SequentialExecutor {
    /// Creates an executor for the given configuration.
    #[must_use]
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            sink: Arc::new(NoOpEventSink),
            cancel: Arc::new(CancellationToken::new()),
        }
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Sets the run's root cancellation token.
    ///
    /// Once cancelled, no further stage is started and every in-flight
    /// stage's token is cancelled.
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

    /// Runs the stages.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutionAborted`] when a required stage fails, the budget
    /// runs out, or the run is cancelled, unless `continue_on_error` is set.
    /// Invalid stage descriptors always abort.
    pub async fn execute(
        &self,
        initial: EnrichmentContext,
        stages: &[EnrichStageSpec],
    ) -> Result<SequentialOutcome, ExecutionAborted> {
        let started = Instant::now();
        let recorder = TraceRecorder::new(self.config.trace_enabled).with_sink(self.sink.clone());

        match self.run_stages(initial, stages, &recorder, started).await {
            Ok(run) => Ok(SequentialOutcome {
                success: run.complete,
                context: run.context,
                trace: recorder.into_entries(),
                total_time: started.elapsed(),
            }),
            Err(halted) => Err(ExecutionAborted {
                error: halted.error,
                errors: halted.context.errors().to_vec(),
                context: Some(Box::new(halted.context)),
                trace: recorder.into_entries(),
                total_time: started.elapsed(),
            }),
        }
    }

    pub(crate) async fn run_stages(
        &self,
        initial: EnrichmentContext,
        stages: &[EnrichStageSpec],
        recorder: &TraceRecorder,
        started: Instant,
    ) -> Result<SequentialRun, Halted> {
        if let Err(error) = validate_stage_specs(stages) {
            return Err(Halted {
                error,
                context: initial,
            });
        }

        let errors_before = initial.errors().len();
        let mut current = initial;

        for spec in stages {
            if let Err(error) = check_launch(&self.config, &self.cancel, started) {
                recorder.emit(
                    PIPELINE_TIMED_OUT,
                    serde_json::json!({ "next_stage": &spec.name, "error": error.to_string() }),
                );
                current.record_error(StageError::new(PIPELINE_STAGE, error.to_string(), false));
                if self.config.continue_on_error {
                    warn!(next_stage = %spec.name, %error, "Not starting further stages");
                    return Ok(SequentialRun {
                        context: current,
                        complete: false,
                    });
                }
                error!(next_stage = %spec.name, %error, "Sequential run halted");
                return Err(Halted {
                    error,
                    context: current,
                });
            }

            let attempt = recorder.start(&spec.name);
            let token = self.cancel.child();
            let before = current.clone();

            let result = run_guarded(
                &spec.name,
                spec.timeout,
                &token,
                spec.runner.enrich(current, token.clone()),
            )
            .await
            .and_then(|enriched| check_stage_boundary(&spec.name, &before, enriched));

            match result {
                Ok(mut enriched) => {
                    enriched.ledger_mut().record_performed(&spec.name);
                    recorder.succeed(attempt);
                    current = enriched;
                }
                Err(err) => {
                    let message = err.ledger_message();
                    recorder.fail(attempt, &message);
                    current = before;
                    current.record_error(StageError::new(&spec.name, &message, !spec.required));

                    if spec.required && !self.config.continue_on_error {
                        error!(stage = %spec.name, error = %message, "Required stage failed, aborting");
                        recorder.emit(
                            PIPELINE_ABORTED,
                            serde_json::json!({ "stage": &spec.name, "error": &message }),
                        );
                        return Err(Halted {
                            error: err,
                            context: current,
                        });
                    }
                    warn!(
                        stage = %spec.name,
                        error = %message,
                        required = spec.required,
                        "Stage failed, continuing"
                    );
                }
            }
        }

        let complete = current.errors()[errors_before..]
            .iter()
            .all(|e| e.recoverable);
        Ok(SequentialRun {
            context: current,
            complete,
        })
    }
}

/// Rejects a stage result that changed anything the stage does not own.
fn check_stage_boundary(
    stage: &str,
    before: &EnrichmentContext,
    after: EnrichmentContext,
) -> Result<EnrichmentContext, EnrichError> {
    if after.identity() != before.identity() {
        return Err(EnrichError::stage(stage, "stage replaced the request identity"));
    }
    if !after.errors().starts_with(before.errors()) {
        return Err(EnrichError::stage(stage, "stage rewrote the error ledger"));
    }
    if !after.ledger().extends(before.ledger()) {
        return Err(EnrichError::stage(stage, "stage rewrote the operation ledger"));
    }
    let foreign = after.foreign_slot_writes(before, stage);
    if !foreign.is_empty() {
        return Err(EnrichError::stage(
            stage,
            format!("stage wrote result slots it does not own: {}", foreign.join(", ")),
        ));
    }
    Ok(after)
}

/// Runs `stages` sequentially with the given configuration.
///
/// # Errors
///
/// See [`SequentialExecutor::execute`].
pub async fn execute_sequential(
    initial: EnrichmentContext,
    stages: &[EnrichStageSpec],
    config: &PipelineConfig,
) -> Result<SequentialOutcome, ExecutionAborted> {
    SequentialExecutor::new(config.clone()).execute(initial, stages).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::PartialResult;
    use crate::events::{CollectingEventSink, STAGE_STARTED};
    use crate::stages::FnEnrichStage;
    use crate::testing::{
        failing_enrich, pending_enrich, slow_enrich, tagging_enrich, test_context,
    };
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    #[tokio::test]
    async fn test_zero_stages_returns_input_unchanged() {
        let ctx = test_context("hello");
        let outcome = execute_sequential(ctx.clone(), &[], &PipelineConfig::default())
            .await
            .unwrap();

        assert!(outcome.success);
        assert_eq!(outcome.context, ctx);
        assert!(outcome.trace.is_empty());
    }

    #[tokio::test]
    async fn test_trace_follows_declaration_order() {
        let stages = vec![tagging_enrich("a"), tagging_enrich("b"), tagging_enrich("c")];
        let outcome = execute_sequential(test_context("hi"), &stages, &PipelineConfig::default())
            .await
            .unwrap();

        let names: Vec<&str> = outcome.trace.iter().map(|t| t.stage.as_str()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
        assert_eq!(outcome.context.ledger().performed(), ["a", "b", "c"]);
        assert_eq!(outcome.context.ledger().social_interactions(), ["a", "b", "c"]);
        assert!(outcome.success);
    }

    #[tokio::test]
    async fn test_each_stage_sees_previous_output() {
        let first = tagging_enrich("first");
        let second = EnrichStageSpec::enrich(FnEnrichStage::new("second", |ctx: EnrichmentContext, _| async move {
            if ctx.ledger().has_performed("first") {
                Ok(ctx)
            } else {
                Err("first did not run".into())
            }
        }));

        let outcome = execute_sequential(test_context("hi"), &[first, second], &PipelineConfig::default())
            .await
            .unwrap();
        assert!(outcome.success);
        assert!(outcome.context.errors().is_empty());
    }

    #[tokio::test]
    async fn test_required_failure_aborts() {
        let stages = vec![
            tagging_enrich("before"),
            failing_enrich("A", "boom").required(),
            tagging_enrich("after"),
        ];
        let aborted = execute_sequential(test_context("hi"), &stages, &PipelineConfig::default())
            .await
            .unwrap_err();

        assert!(aborted.message().contains("boom"));
        assert_eq!(aborted.errors, vec![StageError::new("A", "boom", false)]);
        let ctx = aborted.context.unwrap();
        assert_eq!(ctx.ledger().performed(), ["before"]);
        assert_eq!(aborted.trace.len(), 2);
        assert!(!aborted.trace[1].success);
    }

    #[tokio::test]
    async fn test_required_failure_with_continue_on_error() {
        let stages = vec![failing_enrich("A", "boom").required(), tagging_enrich("after")];
        let config = PipelineConfig::new().with_continue_on_error(true);
        let outcome = execute_sequential(test_context("hi"), &stages, &config)
            .await
            .unwrap();

        assert!(!outcome.success);
        assert_eq!(outcome.context.errors(), [StageError::new("A", "boom", false)]);
        assert_eq!(outcome.context.ledger().performed(), ["after"]);
        assert_eq!(outcome.trace.len(), 2);
    }

    #[tokio::test]
    async fn test_optional_failure_is_recoverable() {
        let stages = vec![failing_enrich("opt", "meh"), tagging_enrich("next")];
        let outcome = execute_sequential(test_context("hi"), &stages, &PipelineConfig::default())
            .await
            .unwrap();

        assert!(outcome.success);
        assert_eq!(outcome.context.errors(), [StageError::new("opt", "meh", true)]);
        assert_eq!(outcome.trace.len(), 2);
    }

    #[tokio::test]
    async fn test_failed_stage_leaves_context_unchanged() {
        let stage = EnrichStageSpec::enrich(FnEnrichStage::new("half", |mut ctx: EnrichmentContext, _| async move {
            ctx.ledger_mut().record_insight("should-not-survive");
            if ctx.message().is_empty() {
                Ok(ctx)
            } else {
                Err("half done".into())
            }
        }));

        let outcome = execute_sequential(test_context("hi"), &[stage], &PipelineConfig::default())
            .await
            .unwrap();
        assert!(outcome.context.ledger().insights_generated().is_empty());
        assert_eq!(outcome.context.errors().len(), 1);
    }

    #[tokio::test]
    async fn test_timeout_records_error_without_blocking() {
        let stages = vec![pending_enrich("stuck").with_timeout_ms(50), tagging_enrich("next")];
        let start = Instant::now();
        let outcome = execute_sequential(test_context("hi"), &stages, &PipelineConfig::default())
            .await
            .unwrap();

        assert!(start.elapsed() < Duration::from_millis(500));
        assert_eq!(outcome.context.errors().len(), 1);
        assert!(outcome.context.errors()[0].error.contains("timed out after 50ms"));
        assert_eq!(outcome.context.ledger().performed(), ["next"]);
    }

    #[tokio::test]
    async fn test_budget_blocks_new_stages_but_not_running_ones() {
        let stages = vec![slow_enrich("slow", 60), tagging_enrich("never")];
        let config = PipelineConfig::new()
            .with_max_execution_time(Duration::from_millis(20))
            .with_continue_on_error(true);
        let outcome = execute_sequential(test_context("hi"), &stages, &config)
            .await
            .unwrap();

        assert!(!outcome.success);
        assert_eq!(outcome.context.ledger().performed(), ["slow"]);
        assert_eq!(outcome.trace.len(), 1);
        let last = outcome.context.errors().last().unwrap();
        assert_eq!(last.stage, PIPELINE_STAGE);
        assert!(!last.recoverable);
    }

    #[tokio::test]
    async fn test_budget_exhaustion_aborts_without_continue() {
        let stages = vec![slow_enrich("slow", 60), tagging_enrich("never")];
        let config = PipelineConfig::new().with_max_execution_time(Duration::from_millis(20));
        let aborted = execute_sequential(test_context("hi"), &stages, &config)
            .await
            .unwrap_err();
        assert_eq!(aborted.error.kind(), "PipelineTimeout");
    }

    #[tokio::test]
    async fn test_cancelled_run_starts_nothing() {
        let token = Arc::new(CancellationToken::new());
        token.cancel("caller went away");
        let executor = SequentialExecutor::new(PipelineConfig::default()).with_cancellation(token);

        let aborted = executor
            .execute(test_context("hi"), &[tagging_enrich("a")])
            .await
            .unwrap_err();
        assert_eq!(aborted.error, EnrichError::Cancelled("caller went away".to_string()));
        assert!(aborted.trace.is_empty());
    }

    #[tokio::test]
    async fn test_panicking_stage_is_recorded() {
        let stage = EnrichStageSpec::enrich(FnEnrichStage::new("panics", |ctx: EnrichmentContext, _| async move {
            if !ctx.message().is_empty() {
                panic!("unexpected state");
            }
            Ok(ctx)
        }));
        let outcome = execute_sequential(test_context("hi"), &[stage], &PipelineConfig::default())
            .await
            .unwrap();
        assert_eq!(outcome.context.errors()[0].error, "unexpected state");
    }

    #[tokio::test]
    async fn test_foreign_slot_write_is_rejected() {
        let stage = EnrichStageSpec::enrich(FnEnrichStage::new("sneaky", |mut ctx: EnrichmentContext, _| async move {
            ctx.set_result("someone_else", PartialResult::Custom(serde_json::json!(1)));
            Ok(ctx)
        }));
        let outcome = execute_sequential(test_context("hi"), &[stage], &PipelineConfig::default())
            .await
            .unwrap();
        assert!(outcome.context.result("someone_else").is_none());
        assert!(outcome.context.errors()[0].error.contains("someone_else"));
    }

    #[tokio::test]
    async fn test_operation_ledger_wipe_is_rejected() {
        let wipe = EnrichStageSpec::enrich(FnEnrichStage::new("wipe", |ctx: EnrichmentContext, _| async move {
            Ok(EnrichmentContext::new(ctx.identity().clone()))
        }));
        let outcome = execute_sequential(
            test_context("hi"),
            &[tagging_enrich("a"), wipe],
            &PipelineConfig::default(),
        )
        .await
        .unwrap();

        assert!(outcome.context.ledger().has_performed("a"));
        assert!(!outcome.context.ledger().has_performed("wipe"));
        assert_eq!(outcome.context.ledger().social_interactions(), ["a"]);
        assert_eq!(outcome.context.errors().len(), 1);
        assert_eq!(outcome.context.errors()[0].stage, "wipe");
        assert!(outcome.context.errors()[0].error.contains("operation ledger"));
    }

    #[tokio::test]
    async fn test_reused_executor_keeps_root_token_bounded() {
        let root = Arc::new(CancellationToken::new());
        let executor =
            SequentialExecutor::new(PipelineConfig::default()).with_cancellation(root.clone());
        let stages = vec![tagging_enrich("a"), tagging_enrich("b"), tagging_enrich("c")];

        for _ in 0..200 {
            executor.execute(test_context("hi"), &stages).await.unwrap();
        }

        assert!(root.registered_children() <= 1);
    }

    #[tokio::test]
    async fn test_identity_replacement_is_rejected() {
        let stage = EnrichStageSpec::enrich(FnEnrichStage::new("swap", |_ctx: EnrichmentContext, _| async move {
            Ok(EnrichmentContext::for_message("other", "other-session", "other-user"))
        }));
        let outcome = execute_sequential(test_context("hi"), &[stage], &PipelineConfig::default())
            .await
            .unwrap();
        assert_eq!(outcome.context.message(), "hi");
        assert!(outcome.context.errors()[0].error.contains("identity"));
    }

    #[tokio::test]
    async fn test_disabled_trace_still_runs_stages() {
        let sink = Arc::new(CollectingEventSink::new());
        let executor = SequentialExecutor::new(PipelineConfig::new().with_trace_enabled(false))
            .with_event_sink(sink.clone());
        let outcome = executor
            .execute(test_context("hi"), &[tagging_enrich("a"), tagging_enrich("b")])
            .await
            .unwrap();

        assert!(outcome.trace.is_empty());
        assert_eq!(outcome.context.ledger().performed(), ["a", "b"]);
        assert_eq!(sink.events_of_type(STAGE_STARTED).len(), 2);
    }

    #[tokio::test]
    async fn test_duplicate_names_are_a_configuration_error() {
        let stages = vec![tagging_enrich("a"), tagging_enrich("a")];
        let aborted = execute_sequential(test_context("hi"), &stages, &PipelineConfig::default())
            .await
            .unwrap_err();
        assert_eq!(aborted.error.kind(), "ConfigurationError");
    }
}
