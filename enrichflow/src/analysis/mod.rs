//! Analysis stage families.
//!
//! This module provides:
//! - A pluggable heuristic scoring strategy
//! - The stock analysis stages (sentiment, intent, memory, social,
//!   consciousness, insight)
//! - Thinking sessions and the sequential thinking stage

mod scoring;
mod sessions;
mod stages;

pub use scoring::{HeuristicScoring, ScoringStrategy};
pub use sessions::{
    ThinkingSession, ThinkingSessionStore, ThoughtStep, DEFAULT_SESSION_CAPACITY,
    DEFAULT_SESSION_TTL,
};
pub use stages::{
    insight_id, ConsciousnessStage, InsightStage, IntentStage, MemoryRecallStage, SentimentStage,
    SocialStage, ThinkingStage, CONSCIOUSNESS_STAGE, DEFAULT_RECALL_LIMIT, INSIGHT_STAGE,
    INSIGHT_TAG, INTENT_STAGE, MEMORY_STAGE, SENTIMENT_STAGE, SOCIAL_STAGE, THINKING_STAGE,
};

use crate::ports::{Store, TextGenerator};
use crate::stages::AnalysisStageSpec;
use std::sync::Arc;

/// Builds the stock analysis stages, all optional and without timeouts, in
/// a fixed order.
#[must_use]
pub fn standard_analysis_stages(
    store: &Arc<dyn Store>,
    generator: &Arc<dyn TextGenerator>,
    scoring: &Arc<dyn ScoringStrategy>,
) -> Vec<AnalysisStageSpec> {
    vec![
        AnalysisStageSpec::analysis(SentimentStage::new(generator.clone(), scoring.clone())),
        AnalysisStageSpec::analysis(IntentStage::new(generator.clone(), scoring.clone())),
        AnalysisStageSpec::analysis(MemoryRecallStage::new(store.clone(), scoring.clone())),
        AnalysisStageSpec::analysis(SocialStage::new(generator.clone(), scoring.clone())),
        AnalysisStageSpec::analysis(ConsciousnessStage::new(scoring.clone())),
        AnalysisStageSpec::analysis(InsightStage::new(
            store.clone(),
            generator.clone(),
            scoring.clone(),
        )),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{DefaultSynthesizer, Orchestrator, PipelineConfig};
    use crate::ports::{InMemoryStore, UnavailableTextGenerator};
    use crate::testing::test_context;

    #[tokio::test]
    async fn test_standard_stages_run_offline() {
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        let generator: Arc<dyn TextGenerator> = Arc::new(UnavailableTextGenerator);
        let scoring: Arc<dyn ScoringStrategy> = Arc::new(HeuristicScoring::new());
        let stages = standard_analysis_stages(&store, &generator, &scoring);

        let names: Vec<&str> = stages.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                SENTIMENT_STAGE,
                INTENT_STAGE,
                MEMORY_STAGE,
                SOCIAL_STAGE,
                CONSCIOUSNESS_STAGE,
                INSIGHT_STAGE
            ]
        );

        let outcome = Orchestrator::new(PipelineConfig::default())
            .run_parallel(test_context("hello, can you help me?"), &stages, &DefaultSynthesizer::new())
            .await
            .unwrap();

        assert!(outcome.success);
        assert_eq!(outcome.context.ledger().performed().len(), stages.len() + 1);
        assert_eq!(outcome.context.ledger().insights_generated().len(), 1);
        let synthesized = outcome.context.synthesized().unwrap();
        assert_eq!(synthesized.intent.intent, "greeting");
        assert!(synthesized.is_complete());
    }
}
