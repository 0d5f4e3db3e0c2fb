//! Store port and in-memory implementation.

use crate::errors::EnrichError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A record held by a [`Store`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRecord {
    /// Record key.
    pub key: String,
    /// Record content.
    pub content: String,
    /// Tags attached at store time.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Importance in `[0, 1]`.
    pub importance: f64,
    /// When the record was stored.
    pub stored_at: DateTime<Utc>,
}

/// Persistent storage used by memory and insight stages.
#[async_trait]
pub trait Store: Send + Sync {
    /// Stores a record, replacing any record with the same key.
    async fn store(
        &self,
        key: &str,
        content: &str,
        tags: &[String],
        importance: f64,
    ) -> Result<(), EnrichError>;

    /// Returns records matching the query and carrying every given tag.
    async fn search(&self, query: &str, tags: &[String]) -> Result<Vec<StoredRecord>, EnrichError>;

    /// Returns the record with the given key.
    async fn get(&self, key: &str) -> Result<Option<StoredRecord>, EnrichError>;
}

/// A [`Store`] backed by a map.
///
/// Search matches a record when its content contains any query word
/// (case-insensitive), ordered by importance then recency.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    records: RwLock<HashMap<String, StoredRecord>>,
}

impl InMemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Returns true if the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn store(
        &self,
        key: &str,
        content: &str,
        tags: &[String],
        importance: f64,
    ) -> Result<(), EnrichError> {
        if key.is_empty() {
            return Err(EnrichError::Store("key cannot be empty".to_string()));
        }
        let record = StoredRecord {
            key: key.to_string(),
            content: content.to_string(),
            tags: tags.to_vec(),
            importance: importance.clamp(0.0, 1.0),
            stored_at: Utc::now(),
        };
        self.records.write().insert(record.key.clone(), record);
        Ok(())
    }

    async fn search(&self, query: &str, tags: &[String]) -> Result<Vec<StoredRecord>, EnrichError> {
        let words: Vec<String> = query
            .split_whitespace()
            .map(str::to_lowercase)
            .filter(|w| w.len() > 2)
            .collect();

        let mut hits: Vec<StoredRecord> = self
            .records
            .read()
            .values()
            .filter(|r| tags.iter().all(|t| r.tags.contains(t)))
            .filter(|r| {
                let content = r.content.to_lowercase();
                words.is_empty() || words.iter().any(|w| content.contains(w.as_str()))
            })
            .cloned()
            .collect();

        hits.sort_by(|a, b| {
            b.importance
                .total_cmp(&a.importance)
                .then_with(|| b.stored_at.cmp(&a.stored_at))
        });
        Ok(hits)
    }

    async fn get(&self, key: &str) -> Result<Option<StoredRecord>, EnrichError> {
        Ok(self.records.read().get(key).cloned())
    }
}
