//! Typed partial results produced by analysis stages.
//!
//! Each analysis kind has its own variant so synthesis can match
//! exhaustively instead of probing ad-hoc object shapes.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Where an analysis value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisSource {
    /// Produced by the text-generation service.
    Generated,
    /// Produced by a local heuristic fallback.
    #[default]
    Heuristic,
    /// Neutral default substituted by synthesis.
    Default,
}

/// Coarse sentiment polarity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SentimentLabel {
    /// Positive polarity.
    Positive,
    /// No clear polarity.
    #[default]
    Neutral,
    /// Negative polarity.
    Negative,
}

impl SentimentLabel {
    /// Returns the label name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Positive => "positive",
            Self::Neutral => "neutral",
            Self::Negative => "negative",
        }
    }

    /// Maps a score in `[-1, 1]` to a label.
    #[must_use]
    pub fn from_score(score: f64) -> Self {
        if score > 0.2 {
            Self::Positive
        } else if score < -0.2 {
            Self::Negative
        } else {
            Self::Neutral
        }
    }
}

/// Sentiment of the user message.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SentimentAnalysis {
    /// Polarity label.
    pub label: SentimentLabel,
    /// Score in `[-1, 1]`.
    pub score: f64,
    /// Origin of the value.
    pub source: AnalysisSource,
}

/// Detected intent of the user message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentAnalysis {
    /// Intent name, e.g. `question`.
    pub intent: String,
    /// Confidence in `[0, 1]`.
    pub confidence: f64,
    /// Origin of the value.
    pub source: AnalysisSource,
}

impl Default for IntentAnalysis {
    fn default() -> Self {
        Self {
            intent: "unknown".to_string(),
            confidence: 0.0,
            source: AnalysisSource::Default,
        }
    }
}

/// A record recalled from the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecalledMemory {
    /// Store key.
    pub key: String,
    /// Stored content.
    pub content: String,
    /// Stored importance.
    pub importance: f64,
    /// Relevance to the current message.
    pub relevance: f64,
}

/// Memories relevant to the message.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MemoryRecall {
    /// Recalled memories, most relevant first.
    pub memories: Vec<RecalledMemory>,
}

/// Social reading of the interaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SocialAnalysis {
    /// Short summary of the interaction.
    pub summary: String,
    /// Rapport estimate in `[0, 1]`.
    pub rapport: f64,
}

impl Default for SocialAnalysis {
    fn default() -> Self {
        Self {
            summary: String::new(),
            rapport: 0.5,
        }
    }
}

/// Updates to the consciousness state.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ConsciousnessUpdate {
    /// Keyed state updates.
    pub updates: BTreeMap<String, serde_json::Value>,
}

/// A generated insight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsightAnalysis {
    /// Insight identifier.
    pub insight_id: String,
    /// Insight text.
    pub text: String,
    /// Origin of the value.
    pub source: AnalysisSource,
}

/// The result of a single analysis stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum PartialResult {
    /// Sentiment analysis.
    Sentiment(SentimentAnalysis),
    /// Intent detection.
    Intent(IntentAnalysis),
    /// Memory recall.
    MemoryRecall(MemoryRecall),
    /// Social reading.
    Social(SocialAnalysis),
    /// Consciousness-state updates.
    Consciousness(ConsciousnessUpdate),
    /// Generated insight.
    Insight(InsightAnalysis),
    /// Anything else, carried as JSON.
    Custom(serde_json::Value),
}

impl PartialResult {
    /// Returns the kind name of this result.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Sentiment(_) => "sentiment",
            Self::Intent(_) => "intent",
            Self::MemoryRecall(_) => "memory_recall",
            Self::Social(_) => "social",
            Self::Consciousness(_) => "consciousness",
            Self::Insight(_) => "insight",
            Self::Custom(_) => "custom",
        }
    }
}

/// One named slot in a [`PartialResults`] set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartialSlot {
    /// The stage that owns the slot.
    pub stage: String,
    /// The stage's result, absent if it failed or timed out.
    pub result: Option<PartialResult>,
}

/// The complete set of partial results handed to synthesis.
///
/// Holds one slot per configured stage, in configuration order. Failed
/// stages keep an empty slot so synthesis always sees every name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PartialResults {
    slots: Vec<PartialSlot>,
}

impl PartialResults {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces the slot for a stage.
    pub fn insert(&mut self, stage: impl Into<String>, result: Option<PartialResult>) {
        let stage = stage.into();
        if let Some(slot) = self.slots.iter_mut().find(|s| s.stage == stage) {
            slot.result = result;
        } else {
            self.slots.push(PartialSlot { stage, result });
        }
    }

    /// Returns the result for a stage, if present and defined.
    #[must_use]
    pub fn get(&self, stage: &str) -> Option<&PartialResult> {
        self.slots
            .iter()
            .find(|s| s.stage == stage)
            .and_then(|s| s.result.as_ref())
    }

    /// Returns true if a slot exists for the stage.
    #[must_use]
    pub fn contains(&self, stage: &str) -> bool {
        self.slots.iter().any(|s| s.stage == stage)
    }

    /// Returns all slots in configuration order.
    pub fn iter(&self) -> impl Iterator<Item = &PartialSlot> {
        self.slots.iter()
    }

    /// Returns the defined results with their stage names.
    pub fn defined(&self) -> impl Iterator<Item = (&str, &PartialResult)> {
        self.slots
            .iter()
            .filter_map(|s| s.result.as_ref().map(|r| (s.stage.as_str(), r)))
    }

    /// Returns the names of stages whose slot is empty.
    #[must_use]
    pub fn missing(&self) -> Vec<String> {
        self.slots
            .iter()
            .filter(|s| s.result.is_none())
            .map(|s| s.stage.clone())
            .collect()
    }

    /// Returns the number of defined results.
    #[must_use]
    pub fn defined_count(&self) -> usize {
        self.slots.iter().filter(|s| s.result.is_some()).count()
    }

    /// Returns the total number of slots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns true if there are no slots.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentiment_label_thresholds() {
        assert_eq!(SentimentLabel::from_score(0.8), SentimentLabel::Positive);
        assert_eq!(SentimentLabel::from_score(0.1), SentimentLabel::Neutral);
        assert_eq!(SentimentLabel::from_score(-0.5), SentimentLabel::Negative);
    }

    #[test]
    fn test_partial_results_keep_missing_slots() {
        let mut results = PartialResults::new();
        results.insert("sentiment", Some(PartialResult::Sentiment(SentimentAnalysis::default())));
        results.insert("intent", None);

        assert_eq!(results.len(), 2);
        assert_eq!(results.defined_count(), 1);
        assert!(results.contains("intent"));
        assert!(results.get("intent").is_none());
        assert_eq!(results.missing(), vec!["intent".to_string()]);
    }

    #[test]
    fn test_insert_replaces_existing_slot() {
        let mut results = PartialResults::new();
        results.insert("a", None);
        results.insert("a", Some(PartialResult::Custom(serde_json::json!(1))));

        assert_eq!(results.len(), 1);
        assert_eq!(results.get("a"), Some(&PartialResult::Custom(serde_json::json!(1))));
    }

    #[test]
    fn test_partial_result_tagged_serialization() {
        let result = PartialResult::Intent(IntentAnalysis {
            intent: "question".to_string(),
            confidence: 0.7,
            source: AnalysisSource::Heuristic,
        });
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["kind"], "intent");
        assert_eq!(json["value"]["intent"], "question");
        assert_eq!(result.kind(), "intent");
    }
}
