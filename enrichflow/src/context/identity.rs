//! Request identity carried by every enrichment context.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// The immutable request fields of an enrichment context.
///
/// Fields are private and only exposed through getters, so once a context is
/// created its message and session identity cannot change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestIdentity {
    #[serde(default = "Uuid::now_v7")]
    request_id: Uuid,
    message: String,
    session_id: String,
    user_id: String,
    timestamp: DateTime<Utc>,
    #[serde(default)]
    metadata: HashMap<String, serde_json::Value>,
}

impl RequestIdentity {
    /// Creates a new identity stamped with the current time and a fresh
    /// time-ordered request id.
    #[must_use]
    pub fn new(
        message: impl Into<String>,
        session_id: impl Into<String>,
        user_id: impl Into<String>,
    ) -> Self {
        Self {
            request_id: Uuid::now_v7(),
            message: message.into(),
            session_id: session_id.into(),
            user_id: user_id.into(),
            timestamp: Utc::now(),
            metadata: HashMap::new(),
        }
    }

    /// Sets an explicit request id.
    #[must_use]
    pub fn with_request_id(mut self, request_id: Uuid) -> Self {
        self.request_id = request_id;
        self
    }

    /// Sets an explicit timestamp.
    #[must_use]
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Adds a metadata entry.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Replaces the metadata map.
    #[must_use]
    pub fn with_metadata_map(mut self, metadata: HashMap<String, serde_json::Value>) -> Self {
        self.metadata = metadata;
        self
    }

    /// Returns the request id.
    #[must_use]
    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    /// Returns the user message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the session identifier.
    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Returns the user identifier.
    #[must_use]
    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Returns the creation timestamp.
    #[must_use]
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Returns the free-form metadata.
    #[must_use]
    pub fn metadata(&self) -> &HashMap<String, serde_json::Value> {
        &self.metadata
    }

    /// Returns a single metadata value.
    #[must_use]
    pub fn metadata_value(&self, key: &str) -> Option<&serde_json::Value> {
        self.metadata.get(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_identity_getters() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        let identity = RequestIdentity::new("hello", "s-1", "u-1")
            .with_timestamp(ts)
            .with_metadata("channel", serde_json::json!("chat"));

        assert_eq!(identity.message(), "hello");
        assert_eq!(identity.session_id(), "s-1");
        assert_eq!(identity.user_id(), "u-1");
        assert_eq!(identity.timestamp(), ts);
        assert_eq!(identity.metadata_value("channel"), Some(&serde_json::json!("chat")));
    }

    #[test]
    fn test_identity_serialization() {
        let identity = RequestIdentity::new("hi", "s", "u");
        let json = serde_json::to_string(&identity).unwrap();
        let back: RequestIdentity = serde_json::from_str(&json).unwrap();
        assert_eq!(identity, back);
    }

    #[test]
    fn test_request_ids_are_unique() {
        let a = RequestIdentity::new("hi", "s", "u");
        let b = RequestIdentity::new("hi", "s", "u");
        assert_ne!(a.request_id(), b.request_id());

        let fixed = Uuid::nil();
        assert_eq!(a.with_request_id(fixed).request_id(), fixed);
    }

    #[test]
    fn test_missing_request_id_is_generated() {
        let json = serde_json::json!({
            "message": "hi",
            "session_id": "s",
            "user_id": "u",
            "timestamp": "2024-01-02T03:04:05Z",
        });
        let identity: RequestIdentity = serde_json::from_value(json).unwrap();
        assert!(!identity.request_id().is_nil());
    }
}
