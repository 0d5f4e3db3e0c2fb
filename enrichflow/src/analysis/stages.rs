//! Concrete enrichment stages.
//!
//! Each stage asks the text generator first and falls back to the scoring
//! strategy when generation fails or returns nothing usable. A generator
//! failure is never a stage failure.

use super::scoring::ScoringStrategy;
use super::sessions::ThinkingSessionStore;
use crate::cancellation::CancellationToken;
use crate::context::EnrichmentContext;
use crate::core::{
    AnalysisSource, ConsciousnessUpdate, InsightAnalysis, IntentAnalysis, MemoryRecall,
    PartialResult, RecalledMemory, SentimentAnalysis, SentimentLabel, SocialAnalysis,
};
use crate::errors::StageFailure;
use crate::ports::{Store, TextGenerator};
use crate::stages::{AnalysisStage, EnrichStage};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::debug;

/// Name of the sentiment stage.
pub const SENTIMENT_STAGE: &str = "sentiment";
/// Name of the intent stage.
pub const INTENT_STAGE: &str = "intent";
/// Name of the memory recall stage.
pub const MEMORY_STAGE: &str = "memory_recall";
/// Name of the social stage.
pub const SOCIAL_STAGE: &str = "social";
/// Name of the consciousness stage.
pub const CONSCIOUSNESS_STAGE: &str = "consciousness";
/// Name of the insight stage.
pub const INSIGHT_STAGE: &str = "insight";
/// Name of the thinking stage.
pub const THINKING_STAGE: &str = "thinking";

/// Tag attached to stored insights.
pub const INSIGHT_TAG: &str = "insight";

/// Default number of memories a recall returns.
pub const DEFAULT_RECALL_LIMIT: usize = 5;

const GENERATED_INTENT_CONFIDENCE: f64 = 0.75;
const EXCERPT_CHARS: usize = 80;
const INSIGHT_ID_HEX_CHARS: usize = 16;

/// Asks the generator, returning `None` when it fails or answers blank.
///
/// Fails only when the stage's token is cancelled first.
async fn ask(
    generator: &dyn TextGenerator,
    prompt: &str,
    cancel: &CancellationToken,
) -> Result<Option<String>, StageFailure> {
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(cancelled(cancel)),
        generated = generator.generate(prompt) => match generated {
            Ok(text) if !text.trim().is_empty() => Ok(Some(text.trim().to_string())),
            Ok(_) => Ok(None),
            Err(err) => {
                debug!(error = %err, "Generation failed, using heuristic");
                Ok(None)
            }
        },
    }
}

fn cancelled(cancel: &CancellationToken) -> StageFailure {
    StageFailure::new(cancel.reason().unwrap_or_else(|| "cancelled".to_string()))
}

fn excerpt(text: &str) -> String {
    let mut out: String = text.chars().take(EXCERPT_CHARS).collect();
    if text.chars().count() > EXCERPT_CHARS {
        out.push_str("...");
    }
    out
}

/// Derives a stable insight identifier from the session and insight text.
#[must_use]
pub fn insight_id(session_id: &str, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(session_id.as_bytes());
    hasher.update(b":");
    hasher.update(text.as_bytes());
    let digest = hex::encode(hasher.finalize());
    format!("insight-{}", &digest[..INSIGHT_ID_HEX_CHARS])
}

macro_rules! debug_stage {
    ($ty:ident) => {
        impl std::fmt::Debug for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.debug_struct(stringify!($ty))
                    .field("scoring", &self.scoring)
                    .finish_non_exhaustive()
            }
        }
    };
}

/// Scores the sentiment of the message.
pub struct SentimentStage {
    generator: Arc<dyn TextGenerator>,
    scoring: Arc<dyn ScoringStrategy>,
}

impl SentimentStage {
    /// Creates the stage.
    pub fn new(generator: Arc<dyn TextGenerator>, scoring: Arc<dyn ScoringStrategy>) -> Self {
        Self { generator, scoring }
    }
}

debug_stage!(SentimentStage);

#[async_trait]
impl AnalysisStage for SentimentStage {
    fn name(&self) -> &str {
        SENTIMENT_STAGE
    }

    async fn analyze(
        &self,
        snapshot: Arc<EnrichmentContext>,
        cancel: Arc<CancellationToken>,
    ) -> Result<PartialResult, StageFailure> {
        let prompt = format!(
            "Rate the sentiment of this message from -1 (negative) to 1 (positive). \
             Reply with the number only.\n\n{}",
            snapshot.message()
        );
        let generated = ask(self.generator.as_ref(), &prompt, &cancel)
            .await?
            .and_then(|text| text.parse::<f64>().ok())
            .filter(|score| score.is_finite());

        let analysis = match generated {
            Some(score) => {
                let score = score.clamp(-1.0, 1.0);
                SentimentAnalysis {
                    label: SentimentLabel::from_score(score),
                    score,
                    source: AnalysisSource::Generated,
                }
            }
            None => self.scoring.sentiment(snapshot.message()),
        };
        Ok(PartialResult::Sentiment(analysis))
    }
}

/// Classifies the intent of the message.
pub struct IntentStage {
    generator: Arc<dyn TextGenerator>,
    scoring: Arc<dyn ScoringStrategy>,
}

impl IntentStage {
    /// Creates the stage.
    pub fn new(generator: Arc<dyn TextGenerator>, scoring: Arc<dyn ScoringStrategy>) -> Self {
        Self { generator, scoring }
    }
}

debug_stage!(IntentStage);

#[async_trait]
impl AnalysisStage for IntentStage {
    fn name(&self) -> &str {
        INTENT_STAGE
    }

    async fn analyze(
        &self,
        snapshot: Arc<EnrichmentContext>,
        cancel: Arc<CancellationToken>,
    ) -> Result<PartialResult, StageFailure> {
        let prompt = format!(
            "Name the intent of this message in one lowercase word \
             (greeting, question, request, statement, ...).\n\n{}",
            snapshot.message()
        );
        let generated = ask(self.generator.as_ref(), &prompt, &cancel)
            .await?
            .and_then(|text| {
                text.split_whitespace()
                    .next()
                    .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
            })
            .filter(|word| !word.is_empty());

        let analysis = match generated {
            Some(intent) => IntentAnalysis {
                intent,
                confidence: GENERATED_INTENT_CONFIDENCE,
                source: AnalysisSource::Generated,
            },
            None => self.scoring.intent(snapshot.message()),
        };
        Ok(PartialResult::Intent(analysis))
    }
}

/// Recalls stored memories relevant to the message.
pub struct MemoryRecallStage {
    store: Arc<dyn Store>,
    scoring: Arc<dyn ScoringStrategy>,
    limit: usize,
}

impl MemoryRecallStage {
    /// Creates the stage with the default limit.
    pub fn new(store: Arc<dyn Store>, scoring: Arc<dyn ScoringStrategy>) -> Self {
        Self {
            store,
            scoring,
            limit: DEFAULT_RECALL_LIMIT,
        }
    }

    /// Sets how many memories are returned.
    #[must_use]
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }
}

impl std::fmt::Debug for MemoryRecallStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryRecallStage")
            .field("limit", &self.limit)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl AnalysisStage for MemoryRecallStage {
    fn name(&self) -> &str {
        MEMORY_STAGE
    }

    async fn analyze(
        &self,
        snapshot: Arc<EnrichmentContext>,
        cancel: Arc<CancellationToken>,
    ) -> Result<PartialResult, StageFailure> {
        let records = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(cancelled(&cancel)),
            found = self.store.search(snapshot.message(), &[]) => found?,
        };

        let mut memories: Vec<RecalledMemory> = records
            .into_iter()
            .filter(|r| !r.tags.iter().any(|t| t == INSIGHT_TAG))
            .map(|r| RecalledMemory {
                relevance: self.scoring.relevance(snapshot.message(), &r.content),
                key: r.key,
                content: r.content,
                importance: r.importance,
            })
            .filter(|m| m.relevance > 0.0)
            .collect();
        memories.sort_by(|a, b| {
            b.relevance
                .total_cmp(&a.relevance)
                .then_with(|| b.importance.total_cmp(&a.importance))
        });
        memories.truncate(self.limit);

        Ok(PartialResult::MemoryRecall(MemoryRecall { memories }))
    }
}

/// Reads the social tone of the exchange.
pub struct SocialStage {
    generator: Arc<dyn TextGenerator>,
    scoring: Arc<dyn ScoringStrategy>,
}

impl SocialStage {
    /// Creates the stage.
    pub fn new(generator: Arc<dyn TextGenerator>, scoring: Arc<dyn ScoringStrategy>) -> Self {
        Self { generator, scoring }
    }
}

debug_stage!(SocialStage);

#[async_trait]
impl AnalysisStage for SocialStage {
    fn name(&self) -> &str {
        SOCIAL_STAGE
    }

    async fn analyze(
        &self,
        snapshot: Arc<EnrichmentContext>,
        cancel: Arc<CancellationToken>,
    ) -> Result<PartialResult, StageFailure> {
        let prompt = format!(
            "Summarize the social tone of this message in one short sentence.\n\n{}",
            snapshot.message()
        );
        let summary = match ask(self.generator.as_ref(), &prompt, &cancel).await? {
            Some(summary) => summary,
            None => {
                let sentiment = self.scoring.sentiment(snapshot.message());
                let intent = self.scoring.intent(snapshot.message());
                format!(
                    "{} {} from {}",
                    sentiment.label.as_str(),
                    intent.intent,
                    snapshot.user_id()
                )
            }
        };
        Ok(PartialResult::Social(SocialAnalysis {
            summary,
            rapport: self.scoring.rapport(snapshot.message()),
        }))
    }
}

/// Derives consciousness-state updates from the message.
#[derive(Debug)]
pub struct ConsciousnessStage {
    scoring: Arc<dyn ScoringStrategy>,
}

impl ConsciousnessStage {
    /// Creates the stage.
    pub fn new(scoring: Arc<dyn ScoringStrategy>) -> Self {
        Self { scoring }
    }
}

#[async_trait]
impl AnalysisStage for ConsciousnessStage {
    fn name(&self) -> &str {
        CONSCIOUSNESS_STAGE
    }

    async fn analyze(
        &self,
        snapshot: Arc<EnrichmentContext>,
        _cancel: Arc<CancellationToken>,
    ) -> Result<PartialResult, StageFailure> {
        let sentiment = self.scoring.sentiment(snapshot.message());
        let intent = self.scoring.intent(snapshot.message());

        let mut update = ConsciousnessUpdate::default();
        update
            .updates
            .insert("mood".into(), sentiment.label.as_str().into());
        update.updates.insert("focus".into(), intent.intent.into());
        update.updates.insert(
            "last_interaction".into(),
            snapshot.identity().timestamp().to_rfc3339().into(),
        );
        update.updates.insert(
            "known_insights".into(),
            snapshot.ledger().insights_generated().len().into(),
        );
        Ok(PartialResult::Consciousness(update))
    }
}

/// Produces one insight about the user and persists it.
pub struct InsightStage {
    store: Arc<dyn Store>,
    generator: Arc<dyn TextGenerator>,
    scoring: Arc<dyn ScoringStrategy>,
}

impl InsightStage {
    /// Creates the stage.
    pub fn new(
        store: Arc<dyn Store>,
        generator: Arc<dyn TextGenerator>,
        scoring: Arc<dyn ScoringStrategy>,
    ) -> Self {
        Self {
            store,
            generator,
            scoring,
        }
    }
}

debug_stage!(InsightStage);

#[async_trait]
impl AnalysisStage for InsightStage {
    fn name(&self) -> &str {
        INSIGHT_STAGE
    }

    async fn analyze(
        &self,
        snapshot: Arc<EnrichmentContext>,
        cancel: Arc<CancellationToken>,
    ) -> Result<PartialResult, StageFailure> {
        let prompt = format!(
            "State one short insight about the user based on this message.\n\n{}",
            snapshot.message()
        );
        let (text, source) = match ask(self.generator.as_ref(), &prompt, &cancel).await? {
            Some(text) => (text, AnalysisSource::Generated),
            None => {
                let intent = self.scoring.intent(snapshot.message());
                (
                    format!("User {}: \"{}\"", intent.intent, excerpt(snapshot.message())),
                    AnalysisSource::Heuristic,
                )
            }
        };

        let id = insight_id(snapshot.session_id(), &text);
        let importance = self.scoring.importance(snapshot.message());
        let tags = [INSIGHT_TAG.to_string(), snapshot.session_id().to_string()];
        tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(cancelled(&cancel)),
            stored = self.store.store(&id, &text, &tags, importance) => stored?,
        }

        Ok(PartialResult::Insight(InsightAnalysis {
            insight_id: id,
            text,
            source,
        }))
    }
}

/// Appends a reasoning step to the session's thinking chain.
///
/// A sequential stage: each step sees the steps recorded before it.
pub struct ThinkingStage {
    sessions: Arc<ThinkingSessionStore>,
    generator: Arc<dyn TextGenerator>,
    scoring: Arc<dyn ScoringStrategy>,
}

impl ThinkingStage {
    /// Creates the stage.
    pub fn new(
        sessions: Arc<ThinkingSessionStore>,
        generator: Arc<dyn TextGenerator>,
        scoring: Arc<dyn ScoringStrategy>,
    ) -> Self {
        Self {
            sessions,
            generator,
            scoring,
        }
    }
}

debug_stage!(ThinkingStage);

#[async_trait]
impl EnrichStage for ThinkingStage {
    fn name(&self) -> &str {
        THINKING_STAGE
    }

    async fn enrich(
        &self,
        mut ctx: EnrichmentContext,
        cancel: Arc<CancellationToken>,
    ) -> Result<EnrichmentContext, StageFailure> {
        let previous = self
            .sessions
            .get(ctx.session_id())
            .and_then(|s| s.latest().map(|step| step.thought.clone()));
        let prompt = match &previous {
            Some(last) => format!(
                "Previous thought: {last}\nContinue reasoning about: {}",
                ctx.message()
            ),
            None => format!("Think step by step about: {}", ctx.message()),
        };

        let thought = match ask(self.generator.as_ref(), &prompt, &cancel).await? {
            Some(thought) => thought,
            None => {
                let intent = self.scoring.intent(ctx.message());
                let sentiment = self.scoring.sentiment(ctx.message());
                format!(
                    "The user sent a {} {}: \"{}\"",
                    sentiment.label.as_str(),
                    intent.intent,
                    excerpt(ctx.message())
                )
            }
        };

        let session = self.sessions.append(ctx.session_id(), thought.clone());
        let step = session.steps.len();
        ctx.ledger_mut()
            .record_consciousness("thinking_steps", step.into());
        ctx.set_result(
            THINKING_STAGE,
            PartialResult::Custom(serde_json::json!({
                "session_id": session.session_id,
                "step": step,
                "thought": thought,
            })),
        );
        Ok(ctx)
    }
}
