//! Parallel fan-out/fan-in executor.
//!
//! All analysis stages are launched together against one shared snapshot and
//! joined on the calling task. Nothing is classified until every stage has
//! settled.

use super::guard::{check_launch, run_guarded};
use super::{ExecutionAborted, ParallelOutcome, PipelineConfig, PIPELINE_STAGE};
use crate::cancellation::CancellationToken;
use crate::context::EnrichmentContext;
use crate::core::PartialResults;
use crate::errors::{EnrichError, StageError};
use crate::events::{EventSink, NoOpEventSink, PIPELINE_ABORTED, PIPELINE_TIMED_OUT};
use crate::observability::TraceRecorder;
use crate::stages::{validate_stage_specs, AnalysisStageSpec};
use futures::future::join_all;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, warn};

/// Classified results of a fan-out.
#[derive(Debug, Default)]
pub(crate) struct ParallelRun {
    pub results: PartialResults,
    pub performed: Vec<String>,
    pub errors: Vec<StageError>,
}

/// A fan-out that must not continue.
#[derive(Debug)]
pub(crate) struct ParallelHalted {
    pub error: EnrichError,
    pub run: ParallelRun,
}

/// Runs [`AnalysisStageSpec`]s concurrently and waits for all of them.
pub struct ParallelExecutor {
    config: PipelineConfig,
    sink: Arc<dyn EventSink>,
    cancel: Arc<CancellationToken>,
}

impl ParallelExecutor {
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

    /// Runs every stage against a snapshot of `initial`.
    ///
    /// # Errors
    ///
    /// Returns [`ExecutionAborted`] with the first required failure in
    /// configured order, or when the budget is already spent or the run was
    /// cancelled before launch, unless `continue_on_error` is set.
    pub async fn execute(
        &self,
        initial: &EnrichmentContext,
        stages: &[AnalysisStageSpec],
    ) -> Result<ParallelOutcome, ExecutionAborted> {
        let started = Instant::now();
        let recorder = TraceRecorder::new(self.config.trace_enabled).with_sink(self.sink.clone());
        let snapshot = Arc::new(initial.clone());

        match self.run_stages(snapshot, stages, &recorder, started).await {
            Ok(run) => Ok(ParallelOutcome {
                results: run.results,
                performed: run.performed,
                errors: run.errors,
                trace: recorder.into_entries(),
                total_time: started.elapsed(),
            }),
            Err(halted) => Err(ExecutionAborted {
                error: halted.error,
                errors: halted.run.errors,
                context: None,
                trace: recorder.into_entries(),
                total_time: started.elapsed(),
            }),
        }
    }

    pub(crate) async fn run_stages(
        &self,
        snapshot: Arc<EnrichmentContext>,
        stages: &[AnalysisStageSpec],
        recorder: &TraceRecorder,
        started: Instant,
    ) -> Result<ParallelRun, ParallelHalted> {
        if let Err(error) = validate_stage_specs(stages) {
            return Err(ParallelHalted {
                error,
                run: ParallelRun::default(),
            });
        }

        if let Err(error) = check_launch(&self.config, &self.cancel, started) {
            let mut run = ParallelRun::default();
            for spec in stages {
                run.results.insert(&spec.name, None);
            }
            run.errors
                .push(StageError::new(PIPELINE_STAGE, error.to_string(), false));
            recorder.emit(
                PIPELINE_TIMED_OUT,
                serde_json::json!({ "stages": stages.len(), "error": error.to_string() }),
            );
            if self.config.continue_on_error {
                warn!(%error, "Fan-out not launched");
                return Ok(run);
            }
            error!(%error, "Fan-out halted before launch");
            return Err(ParallelHalted { error, run });
        }

        debug!(stages = stages.len(), "Launching analysis fan-out");

        let launches = stages.iter().map(|spec| {
            let snapshot = Arc::clone(&snapshot);
            let token = self.cancel.child();
            async move {
                let attempt = recorder.start(&spec.name);
                let settled = run_guarded(
                    &spec.name,
                    spec.timeout,
                    &token,
                    spec.runner.analyze(snapshot, token.clone()),
                )
                .await;
                match &settled {
                    Ok(_) => recorder.succeed(attempt),
                    Err(err) => recorder.fail(attempt, &err.ledger_message()),
                }
                settled
            }
        });
        let settled = join_all(launches).await;

        let mut run = ParallelRun::default();
        let mut first_required: Option<EnrichError> = None;

        for (spec, outcome) in stages.iter().zip(settled) {
            match outcome {
                Ok(result) => {
                    run.results.insert(&spec.name, Some(result));
                    run.performed.push(spec.name.clone());
                }
                Err(err) => {
                    let message = err.ledger_message();
                    run.results.insert(&spec.name, None);
                    run.errors
                        .push(StageError::new(&spec.name, &message, !spec.required));
                    if spec.required {
                        if first_required.is_none() {
                            first_required = Some(err);
                        }
                    } else {
                        warn!(stage = %spec.name, error = %message, "Optional analysis failed");
                    }
                }
            }
        }

        match first_required {
            Some(error) if !self.config.continue_on_error => {
                error!(%error, "Required analysis failed, aborting");
                recorder.emit(
                    PIPELINE_ABORTED,
                    serde_json::json!({ "error": error.to_string() }),
                );
                Err(ParallelHalted { error, run })
            }
            Some(error) => {
                warn!(%error, "Required analysis failed, continuing");
                Ok(run)
            }
            None => Ok(run),
        }
    }
}

/// Runs `stages` concurrently against a snapshot of `initial`.
///
/// # Errors
///
/// See [`ParallelExecutor::execute`].
pub async fn execute_parallel(
    initial: &EnrichmentContext,
    stages: &[AnalysisStageSpec],
    config: &PipelineConfig,
) -> Result<ParallelOutcome, ExecutionAborted> {
    ParallelExecutor::new(config.clone()).execute(initial, stages).await
}
