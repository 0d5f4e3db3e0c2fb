//! Append-only operation ledger.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Records what stages did while enriching a context.
///
/// Every list is append-only. Consciousness-state updates are keyed, and a
/// later write to the same key replaces the earlier value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OperationLedger {
    performed: Vec<String>,
    insights_generated: Vec<String>,
    resources_accessed: Vec<String>,
    social_interactions: Vec<String>,
    consciousness_updates: BTreeMap<String, serde_json::Value>,
}

impl OperationLedger {
    /// Creates an empty ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that a stage completed.
    pub fn record_performed(&mut self, stage: impl Into<String>) {
        self.performed.push(stage.into());
    }

    /// Records a generated insight identifier.
    pub fn record_insight(&mut self, insight_id: impl Into<String>) {
        self.insights_generated.push(insight_id.into());
    }

    /// Records an accessed resource key.
    pub fn record_access(&mut self, key: impl Into<String>) {
        self.resources_accessed.push(key.into());
    }

    /// Records a social-interaction summary.
    pub fn record_social(&mut self, summary: impl Into<String>) {
        self.social_interactions.push(summary.into());
    }

    /// Records a consciousness-state update.
    pub fn record_consciousness(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.consciousness_updates.insert(key.into(), value);
    }

    /// Returns the stages performed, in completion order.
    #[must_use]
    pub fn performed(&self) -> &[String] {
        &self.performed
    }

    /// Returns the generated insight identifiers.
    #[must_use]
    pub fn insights_generated(&self) -> &[String] {
        &self.insights_generated
    }

    /// Returns the accessed resource keys.
    #[must_use]
    pub fn resources_accessed(&self) -> &[String] {
        &self.resources_accessed
    }

    /// Returns the social-interaction summaries.
    #[must_use]
    pub fn social_interactions(&self) -> &[String] {
        &self.social_interactions
    }

    /// Returns the consciousness-state updates.
    #[must_use]
    pub fn consciousness_updates(&self) -> &BTreeMap<String, serde_json::Value> {
        &self.consciousness_updates
    }

    /// Returns true if the given stage has been recorded as performed.
    #[must_use]
    pub fn has_performed(&self, stage: &str) -> bool {
        self.performed.iter().any(|s| s == stage)
    }

    /// Returns true if `self` only adds to `before`: every list keeps the
    /// earlier entries as a prefix and every earlier consciousness key is
    /// still present.
    #[must_use]
    pub fn extends(&self, before: &Self) -> bool {
        self.performed.starts_with(&before.performed)
            && self.insights_generated.starts_with(&before.insights_generated)
            && self.resources_accessed.starts_with(&before.resources_accessed)
            && self.social_interactions.starts_with(&before.social_interactions)
            && before
                .consciousness_updates
                .keys()
                .all(|key| self.consciousness_updates.contains_key(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ledger_appends_in_order() {
        let mut ledger = OperationLedger::new();
        ledger.record_performed("sentiment");
        ledger.record_performed("intent");
        ledger.record_insight("insight-1");
        ledger.record_access("memory:42");
        ledger.record_social("greeted user");

        assert_eq!(ledger.performed(), ["sentiment", "intent"]);
        assert!(ledger.has_performed("intent"));
        assert!(!ledger.has_performed("synthesis"));
        assert_eq!(ledger.insights_generated(), ["insight-1"]);
        assert_eq!(ledger.resources_accessed(), ["memory:42"]);
        assert_eq!(ledger.social_interactions(), ["greeted user"]);
    }

    #[test]
    fn test_consciousness_updates_replace_by_key() {
        let mut ledger = OperationLedger::new();
        ledger.record_consciousness("focus", serde_json::json!(0.2));
        ledger.record_consciousness("focus", serde_json::json!(0.9));

        assert_eq!(ledger.consciousness_updates().len(), 1);
        assert_eq!(ledger.consciousness_updates()["focus"], serde_json::json!(0.9));
    }

    #[test]
    fn test_extends_accepts_appends_and_rewrites_of_a_key() {
        let mut before = OperationLedger::new();
        before.record_performed("a");
        before.record_consciousness("mood", serde_json::json!("calm"));

        let mut after = before.clone();
        after.record_performed("b");
        after.record_social("waved");
        after.record_consciousness("mood", serde_json::json!("excited"));
        assert!(after.extends(&before));
        assert!(before.extends(&before));
    }

    #[test]
    fn test_extends_rejects_dropped_entries() {
        let mut before = OperationLedger::new();
        before.record_performed("a");
        before.record_access("memory:1");
        assert!(!OperationLedger::new().extends(&before));

        let mut reordered = OperationLedger::new();
        reordered.record_performed("b");
        reordered.record_performed("a");
        reordered.record_access("memory:1");
        assert!(!reordered.extends(&before));

        let mut with_key = OperationLedger::new();
        with_key.record_consciousness("focus", serde_json::json!(1));
        assert!(!OperationLedger::new().extends(&with_key));
    }
}
