//! Test fixtures for enrichment runs.

use crate::context::EnrichmentContext;
use crate::core::{
    AnalysisSource, IntentAnalysis, PartialResult, PartialResults, SentimentAnalysis,
    SentimentLabel,
};

/// Session id used by [`test_context`].
pub const TEST_SESSION: &str = "session-1";

/// User id used by [`test_context`].
pub const TEST_USER: &str = "user-1";

/// Builds a fresh context for `message` in the fixed test session.
#[must_use]
pub fn test_context(message: &str) -> EnrichmentContext {
    EnrichmentContext::for_message(message, TEST_SESSION, TEST_USER)
}

/// A partial-results set with a sentiment, an intent and one empty slot.
#[must_use]
pub fn sample_partials() -> PartialResults {
    let mut partials = PartialResults::new();
    partials.insert(
        "sentiment",
        Some(PartialResult::Sentiment(SentimentAnalysis {
            score: 0.6,
            label: SentimentLabel::Positive,
            source: AnalysisSource::Heuristic,
        })),
    );
    partials.insert(
        "intent",
        Some(PartialResult::Intent(IntentAnalysis {
            intent: "question".to_string(),
            confidence: 0.8,
            source: AnalysisSource::Heuristic,
        })),
    );
    partials.insert("memory_recall", None);
    partials
}
