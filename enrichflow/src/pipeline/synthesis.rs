//! The terminal synthesis stage.
//!
//! Synthesis merges the base context with every partial analysis into one
//! [`SynthesizedContext`]. It runs after the executor's barrier and is a pure
//! function of its two inputs.

use super::SYNTHESIS_STAGE;
use crate::context::EnrichmentContext;
use crate::core::{
    AnalysisSource, IntentAnalysis, PartialResult, PartialResults, RecalledMemory,
    SentimentAnalysis, SentimentLabel, SocialAnalysis, SynthesizedContext,
};
use crate::errors::{panic_message, EnrichError, StageError, StageFailure};
use crate::observability::TraceRecorder;
use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt::Debug;
use std::panic::AssertUnwindSafe;
use tracing::error;

/// Merges partial analyses into a [`SynthesizedContext`].
///
/// Implementations must substitute neutral defaults for empty slots rather
/// than fail. They do not enforce required-ness; the executors already did.
pub trait Synthesizer: Send + Sync + Debug {
    /// Returns the stage name used in the trace and ledgers.
    fn name(&self) -> &str {
        SYNTHESIS_STAGE
    }

    /// Builds the synthesized view.
    ///
    /// # Errors
    ///
    /// Returns a [`StageFailure`] if the inputs cannot be merged.
    fn synthesize(
        &self,
        base: &EnrichmentContext,
        partials: &PartialResults,
    ) -> Result<SynthesizedContext, StageFailure>;
}

/// Default number of memories kept after merging.
pub const DEFAULT_MAX_MEMORIES: usize = 10;

/// The stock synthesizer.
#[derive(Debug, Clone)]
pub struct DefaultSynthesizer {
    max_memories: usize,
}

impl Default for DefaultSynthesizer {
    fn default() -> Self {
        Self {
            max_memories: DEFAULT_MAX_MEMORIES,
        }
    }
}

impl DefaultSynthesizer {
    /// Creates a synthesizer with default limits.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets how many memories are kept.
    #[must_use]
    pub fn with_max_memories(mut self, max_memories: usize) -> Self {
        self.max_memories = max_memories;
        self
    }
}

impl Synthesizer for DefaultSynthesizer {
    fn synthesize(
        &self,
        base: &EnrichmentContext,
        partials: &PartialResults,
    ) -> Result<SynthesizedContext, StageFailure> {
        let mut out = SynthesizedContext {
            consciousness: base.ledger().consciousness_updates().clone(),
            missing_stages: partials.missing(),
            ..SynthesizedContext::default()
        };

        let mut sentiments: Vec<&SentimentAnalysis> = Vec::new();
        let mut intent: Option<&IntentAnalysis> = None;
        let mut social: Option<&SocialAnalysis> = None;

        for (stage, result) in partials.defined() {
            out.contributing_stages.push(stage.to_string());
            match result {
                PartialResult::Sentiment(s) => sentiments.push(s),
                PartialResult::Intent(i) => {
                    if intent.map_or(true, |best| i.confidence > best.confidence) {
                        intent = Some(i);
                    }
                }
                PartialResult::MemoryRecall(recall) => {
                    out.memories.extend(recall.memories.iter().cloned());
                }
                PartialResult::Social(s) => social = Some(s),
                PartialResult::Consciousness(update) => {
                    out.consciousness
                        .extend(update.updates.iter().map(|(k, v)| (k.clone(), v.clone())));
                }
                PartialResult::Insight(insight) => out.insights.push(insight.text.clone()),
                PartialResult::Custom(value) => {
                    out.custom.insert(stage.to_string(), value.clone());
                }
            }
        }

        out.sentiment = merge_sentiment(&sentiments);
        out.intent = intent.cloned().unwrap_or_default();
        out.social = social.cloned().unwrap_or_default();
        out.memories = rank_memories(out.memories, self.max_memories);
        out.summary = summarize(&out, partials.len());
        Ok(out)
    }
}

fn merge_sentiment(sentiments: &[&SentimentAnalysis]) -> SentimentAnalysis {
    if sentiments.is_empty() {
        return SentimentAnalysis {
            source: AnalysisSource::Default,
            ..SentimentAnalysis::default()
        };
    }
    #[allow(clippy::cast_precision_loss)]
    let score = sentiments.iter().map(|s| s.score).sum::<f64>() / sentiments.len() as f64;
    let source = if sentiments.iter().any(|s| s.source == AnalysisSource::Generated) {
        AnalysisSource::Generated
    } else {
        AnalysisSource::Heuristic
    };
    SentimentAnalysis {
        label: SentimentLabel::from_score(score),
        score,
        source,
    }
}

/// Sorts by relevance, drops repeated keys, and truncates.
fn rank_memories(mut memories: Vec<RecalledMemory>, limit: usize) -> Vec<RecalledMemory> {
    memories.sort_by(|a, b| {
        b.relevance
            .partial_cmp(&a.relevance)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.key.cmp(&b.key))
    });
    let mut seen = HashSet::new();
    memories.retain(|m| seen.insert(m.key.clone()));
    memories.truncate(limit);
    memories
}

fn summarize(out: &SynthesizedContext, total: usize) -> String {
    format!(
        "{} sentiment, intent '{}', {} memories, {} insights, {}/{} analyses",
        out.sentiment.label.as_str(),
        out.intent.intent,
        out.memories.len(),
        out.insights.len(),
        out.contributing_stages.len(),
        total
    )
}

/// Runs a synthesizer and writes its output into `context`.
///
/// On success the synthesized slot is set and the synthesizer's name is
/// appended to the performed ledger. On failure, including a panic, a
/// non-recoverable entry is appended to the error ledger and the error is
/// returned; the caller decides whether to propagate it.
///
/// # Errors
///
/// Returns [`EnrichError::Synthesis`] with the normalized message.
pub fn run_synthesis(
    synthesizer: &dyn Synthesizer,
    context: &mut EnrichmentContext,
    partials: &PartialResults,
    recorder: &TraceRecorder,
) -> Result<(), EnrichError> {
    let name = synthesizer.name().to_string();
    let attempt = recorder.start(&name);

    let settled = std::panic::catch_unwind(AssertUnwindSafe(|| {
        synthesizer.synthesize(context, partials)
    }));
    let message = match settled {
        Ok(Ok(synthesized)) => {
            context.set_synthesized(synthesized);
            context.ledger_mut().record_performed(&name);
            recorder.succeed(attempt);
            return Ok(());
        }
        Ok(Err(failure)) => failure.message,
        Err(payload) => panic_message(payload.as_ref()),
    };

    error!(stage = %name, error = %message, "Synthesis failed");
    recorder.fail(attempt, &message);
    context.record_error(StageError::new(&name, &message, false));
    Err(EnrichError::Synthesis(message))
}
