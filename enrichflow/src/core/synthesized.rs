//! The final synthesized view of an enriched context.

use super::{IntentAnalysis, RecalledMemory, SentimentAnalysis, SocialAnalysis};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The output of the synthesis stage.
///
/// Every field has a neutral default, so a synthesizer can always build one
/// even when analysis stages failed.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SynthesizedContext {
    /// Merged sentiment.
    pub sentiment: SentimentAnalysis,
    /// Merged intent.
    pub intent: IntentAnalysis,
    /// Recalled memories, most relevant first.
    #[serde(default)]
    pub memories: Vec<RecalledMemory>,
    /// Social reading.
    pub social: SocialAnalysis,
    /// Merged consciousness-state updates.
    #[serde(default)]
    pub consciousness: BTreeMap<String, serde_json::Value>,
    /// Insight texts.
    #[serde(default)]
    pub insights: Vec<String>,
    /// Custom analysis values keyed by stage name.
    #[serde(default)]
    pub custom: BTreeMap<String, serde_json::Value>,
    /// Stages whose results were merged.
    #[serde(default)]
    pub contributing_stages: Vec<String>,
    /// Stages whose slots were empty.
    #[serde(default)]
    pub missing_stages: Vec<String>,
    /// One-line summary of the enrichment.
    #[serde(default)]
    pub summary: String,
}

impl SynthesizedContext {
    /// Returns true if every input stage contributed.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.missing_stages.is_empty()
    }
}
