//! Mock stages and synthesizers for testing.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::cancellation::CancellationToken;
use crate::context::EnrichmentContext;
use crate::core::{PartialResult, PartialResults, SynthesizedContext};
use crate::errors::StageFailure;
use crate::pipeline::{DefaultSynthesizer, Synthesizer};
use crate::stages::{
    AnalysisStage, AnalysisStageSpec, EnrichStageSpec, FnAnalysisStage, FnEnrichStage,
};

fn marker(stage: &str) -> PartialResult {
    PartialResult::Custom(serde_json::json!({ "stage": stage }))
}

/// An analysis stage that always succeeds with a custom marker result.
#[derive(Debug)]
pub struct SucceedingAnalysis {
    name: String,
}

impl SucceedingAnalysis {
    /// Creates a new succeeding stage.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl AnalysisStage for SucceedingAnalysis {
    fn name(&self) -> &str {
        &self.name
    }

    async fn analyze(
        &self,
        _snapshot: Arc<EnrichmentContext>,
        _cancel: Arc<CancellationToken>,
    ) -> Result<PartialResult, StageFailure> {
        Ok(marker(&self.name))
    }
}

/// An analysis stage that records the message of every snapshot it sees.
#[derive(Debug)]
pub struct RecordingAnalysis {
    name: String,
    delay: Duration,
    calls: Arc<Mutex<Vec<String>>>,
}

impl RecordingAnalysis {
    /// Creates a recording stage that waits `delay_ms` before answering.
    #[must_use]
    pub fn new(name: impl Into<String>, delay_ms: u64) -> Self {
        Self {
            name: name.into(),
            delay: Duration::from_millis(delay_ms),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Returns a handle to the recorded messages.
    #[must_use]
    pub fn calls(&self) -> Arc<Mutex<Vec<String>>> {
        self.calls.clone()
    }
}

#[async_trait]
impl AnalysisStage for RecordingAnalysis {
    fn name(&self) -> &str {
        &self.name
    }

    async fn analyze(
        &self,
        snapshot: Arc<EnrichmentContext>,
        _cancel: Arc<CancellationToken>,
    ) -> Result<PartialResult, StageFailure> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.calls.lock().push(snapshot.message().to_string());
        Ok(marker(&self.name))
    }
}

/// Builds a stage spec that always succeeds.
#[must_use]
pub fn succeeding_analysis(name: &str) -> AnalysisStageSpec {
    AnalysisStageSpec::analysis(SucceedingAnalysis::new(name))
}

/// Builds a stage spec that always fails with `message`.
#[must_use]
pub fn failing_analysis(name: &str, message: &str) -> AnalysisStageSpec {
    let message = message.to_string();
    AnalysisStageSpec::analysis(FnAnalysisStage::new(name, move |_, _| {
        let message = message.clone();
        async move { Err::<PartialResult, _>(StageFailure::new(message)) }
    }))
}

/// Builds a stage spec that never completes.
#[must_use]
pub fn pending_analysis(name: &str) -> AnalysisStageSpec {
    AnalysisStageSpec::analysis(FnAnalysisStage::new(name, |_, _| async {
        std::future::pending::<Result<PartialResult, StageFailure>>().await
    }))
}

/// Builds a stage spec that succeeds after `ms` milliseconds.
#[must_use]
pub fn slow_analysis(name: &str, ms: u64) -> AnalysisStageSpec {
    let stage = name.to_string();
    AnalysisStageSpec::analysis(FnAnalysisStage::new(name, move |_, _| {
        let result = marker(&stage);
        async move {
            tokio::time::sleep(Duration::from_millis(ms)).await;
            Ok(result)
        }
    }))
}

/// Builds an enrich stage spec that records its own name as a social
/// interaction.
#[must_use]
pub fn tagging_enrich(name: &str) -> EnrichStageSpec {
    let tag = name.to_string();
    EnrichStageSpec::enrich(FnEnrichStage::new(name, move |mut ctx: EnrichmentContext, _| {
        let tag = tag.clone();
        async move {
            ctx.ledger_mut().record_social(tag);
            Ok(ctx)
        }
    }))
}

/// Builds an enrich stage spec that writes a marker into its own slot.
#[must_use]
pub fn slot_writing_enrich(name: &str) -> EnrichStageSpec {
    let stage = name.to_string();
    EnrichStageSpec::enrich(FnEnrichStage::new(name, move |mut ctx: EnrichmentContext, _| {
        let stage = stage.clone();
        async move {
            let result = marker(&stage);
            ctx.set_result(stage, result);
            Ok(ctx)
        }
    }))
}

/// Builds an enrich stage spec that always fails with `message`.
#[must_use]
pub fn failing_enrich(name: &str, message: &str) -> EnrichStageSpec {
    let message = message.to_string();
    EnrichStageSpec::enrich(FnEnrichStage::new(name, move |_: EnrichmentContext, _| {
        let message = message.clone();
        async move { Err::<EnrichmentContext, _>(StageFailure::new(message)) }
    }))
}

/// Builds an enrich stage spec that never completes.
#[must_use]
pub fn pending_enrich(name: &str) -> EnrichStageSpec {
    EnrichStageSpec::enrich(FnEnrichStage::new(name, |_: EnrichmentContext, _| async {
        std::future::pending::<Result<EnrichmentContext, StageFailure>>().await
    }))
}

/// Builds an enrich stage spec that passes the context through after `ms`
/// milliseconds.
#[must_use]
pub fn slow_enrich(name: &str, ms: u64) -> EnrichStageSpec {
    EnrichStageSpec::enrich(FnEnrichStage::new(name, move |ctx: EnrichmentContext, _| async move {
        tokio::time::sleep(Duration::from_millis(ms)).await;
        Ok(ctx)
    }))
}

/// A synthesizer that counts calls and remembers its last inputs.
///
/// Delegates to [`DefaultSynthesizer`] unless built with
/// [`CountingSynthesizer::failing`].
#[derive(Debug, Default)]
pub struct CountingSynthesizer {
    inner: DefaultSynthesizer,
    failure: Option<String>,
    calls: AtomicUsize,
    last_inputs: Mutex<Option<(usize, usize)>>,
}

impl CountingSynthesizer {
    /// Creates a counting synthesizer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a counting synthesizer that always fails with `message`.
    #[must_use]
    pub fn failing(message: &str) -> Self {
        Self {
            failure: Some(message.to_string()),
            ..Self::default()
        }
    }

    /// Returns how many times synthesis ran.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Returns the defined and missing slot counts of the last call.
    #[must_use]
    pub fn last_inputs(&self) -> Option<(usize, usize)> {
        *self.last_inputs.lock()
    }
}

impl Synthesizer for CountingSynthesizer {
    fn synthesize(
        &self,
        base: &EnrichmentContext,
        partials: &PartialResults,
    ) -> Result<SynthesizedContext, StageFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_inputs.lock() = Some((partials.defined_count(), partials.missing().len()));
        match &self.failure {
            Some(message) => Err(StageFailure::new(message.clone())),
            None => self.inner.synthesize(base, partials),
        }
    }
}
