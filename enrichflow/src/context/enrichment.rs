//! The enrichment context accumulated across stages.

use super::{OperationLedger, RequestIdentity};
use crate::core::{PartialResult, SynthesizedContext};
use crate::errors::StageError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The record that stages enrich.
///
/// The request identity is fixed at construction. Stages add to the
/// operation ledger, write their own result slot, and the executors append
/// to the error ledger. The synthesized slot is written only by the
/// synthesis runner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichmentContext {
    identity: RequestIdentity,
    #[serde(default)]
    ledger: OperationLedger,
    #[serde(default)]
    errors: Vec<StageError>,
    #[serde(default)]
    results: BTreeMap<String, PartialResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    synthesized: Option<SynthesizedContext>,
}

impl EnrichmentContext {
    /// Creates a fresh context for a request.
    #[must_use]
    pub fn new(identity: RequestIdentity) -> Self {
        Self {
            identity,
            ledger: OperationLedger::new(),
            errors: Vec::new(),
            results: BTreeMap::new(),
            synthesized: None,
        }
    }

    /// Shorthand for a context built from message, session and user.
    #[must_use]
    pub fn for_message(
        message: impl Into<String>,
        session_id: impl Into<String>,
        user_id: impl Into<String>,
    ) -> Self {
        Self::new(RequestIdentity::new(message, session_id, user_id))
    }

    /// Returns the request identity.
    #[must_use]
    pub fn identity(&self) -> &RequestIdentity {
        &self.identity
    }

    /// Returns the user message.
    #[must_use]
    pub fn message(&self) -> &str {
        self.identity.message()
    }

    /// Returns the session identifier.
    #[must_use]
    pub fn session_id(&self) -> &str {
        self.identity.session_id()
    }

    /// Returns the user identifier.
    #[must_use]
    pub fn user_id(&self) -> &str {
        self.identity.user_id()
    }

    /// Returns the operation ledger.
    #[must_use]
    pub fn ledger(&self) -> &OperationLedger {
        &self.ledger
    }

    /// Returns the operation ledger for appending.
    pub fn ledger_mut(&mut self) -> &mut OperationLedger {
        &mut self.ledger
    }

    /// Returns the error ledger.
    #[must_use]
    pub fn errors(&self) -> &[StageError] {
        &self.errors
    }

    /// Appends to the error ledger.
    pub fn record_error(&mut self, error: StageError) {
        self.errors.push(error);
    }

    /// Returns true if any non-recoverable error was recorded.
    #[must_use]
    pub fn has_unrecoverable_errors(&self) -> bool {
        self.errors.iter().any(|e| !e.recoverable)
    }

    /// Writes a stage's result slot.
    ///
    /// The sequential executor rejects a stage that writes any slot other
    /// than its own.
    pub fn set_result(&mut self, stage: impl Into<String>, result: PartialResult) {
        self.results.insert(stage.into(), result);
    }

    /// Writes a stage's result slot and folds the typed result into the
    /// operation ledger: memory keys become accessed resources, insight ids
    /// generated insights, social summaries interactions and consciousness
    /// updates are applied in order.
    pub fn record_result(&mut self, stage: impl Into<String>, result: PartialResult) {
        match &result {
            PartialResult::MemoryRecall(recall) => {
                for memory in &recall.memories {
                    self.ledger.record_access(&memory.key);
                }
            }
            PartialResult::Social(social) if !social.summary.is_empty() => {
                self.ledger.record_social(&social.summary);
            }
            PartialResult::Consciousness(update) => {
                for (key, value) in &update.updates {
                    self.ledger.record_consciousness(key, value.clone());
                }
            }
            PartialResult::Insight(insight) => self.ledger.record_insight(&insight.insight_id),
            PartialResult::Sentiment(_)
            | PartialResult::Intent(_)
            | PartialResult::Social(_)
            | PartialResult::Custom(_) => {}
        }
        self.set_result(stage, result);
    }

    /// Returns a stage's result slot.
    #[must_use]
    pub fn result(&self, stage: &str) -> Option<&PartialResult> {
        self.results.get(stage)
    }

    /// Returns all populated result slots.
    #[must_use]
    pub fn results(&self) -> &BTreeMap<String, PartialResult> {
        &self.results
    }

    /// Returns the synthesized slot.
    #[must_use]
    pub fn synthesized(&self) -> Option<&SynthesizedContext> {
        self.synthesized.as_ref()
    }

    pub(crate) fn set_synthesized(&mut self, synthesized: SynthesizedContext) {
        self.synthesized = Some(synthesized);
    }

    /// Returns the names of slots whose value differs between `self` and
    /// `before`, ignoring `owner`.
    pub(crate) fn foreign_slot_writes(&self, before: &Self, owner: &str) -> Vec<String> {
        let mut changed: Vec<String> = self
            .results
            .iter()
            .filter(|(name, value)| name.as_str() != owner && before.results.get(*name) != Some(*value))
            .map(|(name, _)| name.clone())
            .collect();
        changed.extend(
            before
                .results
                .keys()
                .filter(|name| name.as_str() != owner && !self.results.contains_key(*name))
                .cloned(),
        );
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{MemoryRecall, RecalledMemory, SentimentAnalysis, SocialAnalysis};

    #[test]
    fn test_new_context_is_empty() {
        let ctx = EnrichmentContext::for_message("hello", "s-1", "u-1");
        assert_eq!(ctx.message(), "hello");
        assert_eq!(ctx.session_id(), "s-1");
        assert_eq!(ctx.user_id(), "u-1");
        assert!(ctx.errors().is_empty());
        assert!(ctx.results().is_empty());
        assert!(ctx.synthesized().is_none());
    }

    #[test]
    fn test_record_error_and_unrecoverable_check() {
        let mut ctx = EnrichmentContext::for_message("hi", "s", "u");
        ctx.record_error(StageError::new("optional", "meh", true));
        assert!(!ctx.has_unrecoverable_errors());

        ctx.record_error(StageError::new("required", "boom", false));
        assert!(ctx.has_unrecoverable_errors());
        assert_eq!(ctx.errors().len(), 2);
    }

    #[test]
    fn test_foreign_slot_writes() {
        let before = EnrichmentContext::for_message("hi", "s", "u");
        let mut after = before.clone();
        after.set_result("mine", PartialResult::Sentiment(SentimentAnalysis::default()));
        assert!(after.foreign_slot_writes(&before, "mine").is_empty());

        after.set_result("theirs", PartialResult::Custom(serde_json::json!(1)));
        assert_eq!(after.foreign_slot_writes(&before, "mine"), vec!["theirs".to_string()]);
    }

    #[test]
    fn test_record_result_folds_into_ledger() {
        let mut ctx = EnrichmentContext::for_message("hi", "s", "u");
        ctx.record_result(
            "memory",
            PartialResult::MemoryRecall(MemoryRecall {
                memories: vec![RecalledMemory {
                    key: "m-1".into(),
                    content: "likes tea".into(),
                    importance: 0.5,
                    relevance: 1.0,
                }],
            }),
        );
        ctx.record_result("social", PartialResult::Social(SocialAnalysis::default()));

        assert_eq!(ctx.ledger().resources_accessed(), ["m-1"]);
        assert!(ctx.ledger().social_interactions().is_empty());
        assert!(ctx.result("memory").is_some());
        assert!(ctx.result("social").is_some());
    }
}
