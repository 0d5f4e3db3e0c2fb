//! The operation adapter: named operations over JSON arguments.

use super::{OperationDescriptor, OperationResult};
use crate::analysis::{
    standard_analysis_stages, HeuristicScoring, ScoringStrategy, ThinkingSessionStore,
    ThinkingStage,
};
use crate::cancellation::CancellationToken;
use crate::context::{EnrichmentContext, RequestIdentity};
use crate::errors::EnrichError;
use crate::events::{EventSink, NoOpEventSink};
use crate::observability::TraceEntry;
use crate::pipeline::{
    DefaultSynthesizer, EnrichmentOutcome, ExecutionAborted, Orchestrator, PipelineConfig,
    DEFAULT_MAX_MEMORIES,
};
use crate::ports::{ConfigSource, Store, TextGenerator};
use crate::stages::{AnalysisStageSpec, EnrichStageSpec};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// Parallel analysis of a message followed by synthesis.
pub const ENRICH_CONTEXT: &str = "enrich_context";
/// Sequential analysis chain, optionally with a thinking step, followed by
/// synthesis.
pub const ENRICH_SEQUENTIAL: &str = "enrich_sequential";
/// Looks up a thinking session.
pub const GET_THINKING_SESSION: &str = "get_thinking_session";

/// The data returned by the enrichment operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichmentReport {
    /// True if no unrecoverable error was recorded.
    pub success: bool,
    /// The enriched context, synthesized slot included.
    pub context: EnrichmentContext,
    /// Every stage attempt of the run.
    pub trace: Vec<TraceEntry>,
    /// Wall-clock time of the run.
    pub total_time_ms: u64,
}

impl From<EnrichmentOutcome> for EnrichmentReport {
    fn from(outcome: EnrichmentOutcome) -> Self {
        Self {
            success: outcome.success,
            context: outcome.context,
            trace: outcome.trace,
            total_time_ms: u64::try_from(outcome.total_time.as_millis()).unwrap_or(u64::MAX),
        }
    }
}

impl From<EnrichError> for OperationResult {
    fn from(error: EnrichError) -> Self {
        Self::fail(&error)
    }
}

impl From<ExecutionAborted> for OperationResult {
    fn from(aborted: ExecutionAborted) -> Self {
        Self::fail(&aborted.error).with_data(json!({
            "errors": aborted.errors,
            "trace": aborted.trace,
        }))
    }
}

#[derive(Debug, Deserialize)]
struct EnrichArgs {
    message: String,
    session_id: String,
    user_id: String,
    #[serde(default)]
    metadata: HashMap<String, Value>,
}

impl EnrichArgs {
    fn into_context(self, operation: &str) -> Result<EnrichmentContext, EnrichError> {
        for (field, value) in [
            ("message", &self.message),
            ("session_id", &self.session_id),
            ("user_id", &self.user_id),
        ] {
            if value.trim().is_empty() {
                return Err(invalid(operation, format!("{field} must not be empty")));
            }
        }
        let identity = RequestIdentity::new(self.message, self.session_id, self.user_id)
            .with_metadata_map(self.metadata);
        Ok(EnrichmentContext::new(identity))
    }
}

#[derive(Debug, Deserialize)]
struct SequentialArgs {
    #[serde(flatten)]
    request: EnrichArgs,
    #[serde(default = "default_include_thinking")]
    include_thinking: bool,
}

fn default_include_thinking() -> bool {
    true
}

#[derive(Debug, Deserialize)]
struct SessionArgs {
    session_id: String,
}

fn invalid(operation: &str, message: impl Into<String>) -> EnrichError {
    EnrichError::InvalidArguments {
        operation: operation.to_string(),
        message: message.into(),
    }
}

fn parse_args<T: DeserializeOwned>(operation: &str, args: Value) -> Result<T, EnrichError> {
    serde_json::from_value(args).map_err(|err| invalid(operation, err.to_string()))
}

fn to_data<T: Serialize>(operation: &str, value: &T) -> Result<Value, EnrichError> {
    serde_json::to_value(value).map_err(|err| EnrichError::stage(operation, err.to_string()))
}

/// Executes enrichment operations by name.
///
/// Every failure, unknown operations and bad arguments included, comes back
/// as an [`OperationResult`] with `success: false`.
pub struct OperationAdapter {
    config: PipelineConfig,
    sink: Arc<dyn EventSink>,
    sessions: Arc<ThinkingSessionStore>,
    analysis_stages: Vec<AnalysisStageSpec>,
    thinking_stage: EnrichStageSpec,
    synthesizer: DefaultSynthesizer,
}

impl std::fmt::Debug for OperationAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OperationAdapter")
            .field("config", &self.config)
            .field("analysis_stages", &self.analysis_stages)
            .field("thinking_stage", &self.thinking_stage.name)
            .field("sessions", &self.sessions.len())
            .finish_non_exhaustive()
    }
}

impl OperationAdapter {
    /// Creates an adapter with heuristic scoring and a fresh session store.
    #[must_use]
    pub fn new(store: Arc<dyn Store>, generator: Arc<dyn TextGenerator>) -> Self {
        Self::with_components(
            store,
            generator,
            Arc::new(HeuristicScoring::new()),
            Arc::new(ThinkingSessionStore::default()),
        )
    }

    /// Creates an adapter from explicit collaborators.
    #[must_use]
    pub fn with_components(
        store: Arc<dyn Store>,
        generator: Arc<dyn TextGenerator>,
        scoring: Arc<dyn ScoringStrategy>,
        sessions: Arc<ThinkingSessionStore>,
    ) -> Self {
        let analysis_stages = standard_analysis_stages(&store, &generator, &scoring);
        let thinking_stage =
            EnrichStageSpec::enrich(ThinkingStage::new(sessions.clone(), generator, scoring));
        Self {
            config: PipelineConfig::default(),
            sink: Arc::new(NoOpEventSink),
            sessions,
            analysis_stages,
            thinking_stage,
            synthesizer: DefaultSynthesizer::new(),
        }
    }

    /// Creates an adapter whose pipeline, stage and synthesis settings are
    /// read from a configuration source.
    ///
    /// Reads the `pipeline.*` keys, `stage.<name>.timeout_ms`,
    /// `stage.<name>.required` and `synthesis.max_memories`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for any invalid value.
    pub fn from_config(
        source: &dyn ConfigSource,
        store: Arc<dyn Store>,
        generator: Arc<dyn TextGenerator>,
        sessions: Arc<ThinkingSessionStore>,
    ) -> Result<Self, EnrichError> {
        let mut adapter = Self::with_components(
            store,
            generator,
            Arc::new(HeuristicScoring::new()),
            sessions,
        )
        .with_config(PipelineConfig::from_source(source)?);

        adapter.analysis_stages = std::mem::take(&mut adapter.analysis_stages)
            .into_iter()
            .map(|spec| spec.configured_from(source))
            .collect::<Result<_, _>>()?;
        adapter.thinking_stage = adapter.thinking_stage.clone().configured_from(source)?;

        #[allow(clippy::cast_precision_loss)]
        let max_memories = source.get_number("synthesis.max_memories", DEFAULT_MAX_MEMORIES as f64);
        if !max_memories.is_finite() || max_memories < 0.0 {
            return Err(EnrichError::configuration(format!(
                "synthesis.max_memories must be a non-negative number, got {max_memories}"
            )));
        }
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let max_memories = max_memories.round() as usize;
        adapter.synthesizer = DefaultSynthesizer::new().with_max_memories(max_memories);
        Ok(adapter)
    }

    /// Sets the pipeline configuration.
    #[must_use]
    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the event sink handed to every run.
    #[must_use]
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Returns the pipeline configuration.
    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Returns the thinking-session store.
    #[must_use]
    pub fn sessions(&self) -> &Arc<ThinkingSessionStore> {
        &self.sessions
    }

    /// Returns the analysis stages used by the enrichment operations.
    #[must_use]
    pub fn analysis_stages(&self) -> &[AnalysisStageSpec] {
        &self.analysis_stages
    }

    /// Lists the operations this adapter executes.
    #[must_use]
    pub fn list_operations(&self) -> Vec<OperationDescriptor> {
        let request = json!({
            "message": { "type": "string" },
            "session_id": { "type": "string" },
            "user_id": { "type": "string" },
            "metadata": { "type": "object" },
        });
        let mut sequential = request.clone();
        sequential["include_thinking"] = json!({ "type": "boolean", "default": true });

        vec![
            OperationDescriptor::new(ENRICH_CONTEXT)
                .with_description(
                    "Run every analysis stage concurrently and synthesize the results.",
                )
                .with_input_schema(json!({
                    "type": "object",
                    "properties": request,
                    "required": ["message", "session_id", "user_id"],
                })),
            OperationDescriptor::new(ENRICH_SEQUENTIAL)
                .with_description(
                    "Run the analysis stages one after another, then synthesize the results.",
                )
                .with_input_schema(json!({
                    "type": "object",
                    "properties": sequential,
                    "required": ["message", "session_id", "user_id"],
                })),
            OperationDescriptor::new(GET_THINKING_SESSION)
                .with_description("Return a session's thinking steps, or null if it has none.")
                .with_input_schema(json!({
                    "type": "object",
                    "properties": { "session_id": { "type": "string" } },
                    "required": ["session_id"],
                })),
        ]
    }

    /// Executes an operation with a fresh cancellation token.
    pub async fn execute(&self, operation: &str, args: Value) -> OperationResult {
        self.execute_with_cancellation(operation, args, Arc::new(CancellationToken::new()))
            .await
    }

    /// Executes an operation under a caller-supplied cancellation token.
    pub async fn execute_with_cancellation(
        &self,
        operation: &str,
        args: Value,
        cancel: Arc<CancellationToken>,
    ) -> OperationResult {
        debug!(operation, "Executing operation");
        let result = match operation {
            ENRICH_CONTEXT => self.enrich_context(args, cancel).await,
            ENRICH_SEQUENTIAL => self.enrich_sequential(args, cancel).await,
            GET_THINKING_SESSION => self.get_thinking_session(args),
            other => Err(EnrichError::UnknownOperation(other.to_string()).into()),
        };
        match result {
            Ok(data) => OperationResult::ok(data),
            Err(failure) => {
                warn!(
                    operation,
                    error = failure.error.as_deref().unwrap_or_default(),
                    "Operation failed"
                );
                failure
            }
        }
    }

    fn orchestrator(&self, cancel: Arc<CancellationToken>) -> Orchestrator {
        Orchestrator::new(self.config.clone())
            .with_event_sink(self.sink.clone())
            .with_cancellation(cancel)
    }

    async fn enrich_context(
        &self,
        args: Value,
        cancel: Arc<CancellationToken>,
    ) -> Result<Value, OperationResult> {
        let args: EnrichArgs = parse_args(ENRICH_CONTEXT, args)?;
        let base = args.into_context(ENRICH_CONTEXT)?;
        let outcome = self
            .orchestrator(cancel)
            .run_parallel(base, &self.analysis_stages, &self.synthesizer)
            .await?;
        Ok(to_data(ENRICH_CONTEXT, &EnrichmentReport::from(outcome))?)
    }

    async fn enrich_sequential(
        &self,
        args: Value,
        cancel: Arc<CancellationToken>,
    ) -> Result<Value, OperationResult> {
        let args: SequentialArgs = parse_args(ENRICH_SEQUENTIAL, args)?;
        let base = args.request.into_context(ENRICH_SEQUENTIAL)?;

        let mut stages: Vec<EnrichStageSpec> = self
            .analysis_stages
            .iter()
            .map(EnrichStageSpec::from_analysis)
            .collect();
        if args.include_thinking {
            stages.push(self.thinking_stage.clone());
        }

        let outcome = self
            .orchestrator(cancel)
            .run_sequential(base, &stages, Some(&self.synthesizer))
            .await?;
        Ok(to_data(ENRICH_SEQUENTIAL, &EnrichmentReport::from(outcome))?)
    }

    fn get_thinking_session(&self, args: Value) -> Result<Value, OperationResult> {
        let args: SessionArgs = parse_args(GET_THINKING_SESSION, args)?;
        if args.session_id.trim().is_empty() {
            return Err(invalid(GET_THINKING_SESSION, "session_id must not be empty").into());
        }
        Ok(to_data(GET_THINKING_SESSION, &self.sessions.get(&args.session_id))?)
    }
}
