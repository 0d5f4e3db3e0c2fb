//! Read-only configuration port.

use serde_json::Value;
use std::collections::HashMap;

/// A read-only source of configuration values.
///
/// Lookups never fail: a missing or mistyped key yields the default.
pub trait ConfigSource: Send + Sync {
    /// Returns the raw value for a key.
    fn get(&self, key: &str) -> Option<Value>;

    /// Returns true if the key is set.
    fn has(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Returns a string value.
    fn get_string(&self, key: &str, default: &str) -> String {
        match self.get(key) {
            Some(Value::String(s)) => s,
            _ => default.to_string(),
        }
    }

    /// Returns a numeric value. Numeric strings are accepted.
    fn get_number(&self, key: &str, default: f64) -> f64 {
        match self.get(key) {
            Some(Value::Number(n)) => n.as_f64().unwrap_or(default),
            Some(Value::String(s)) => s.trim().parse().unwrap_or(default),
            _ => default,
        }
    }

    /// Returns a boolean value. `"true"`/`"false"` strings are accepted.
    fn get_bool(&self, key: &str, default: bool) -> bool {
        match self.get(key) {
            Some(Value::Bool(b)) => b,
            Some(Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" => true,
                "false" | "0" | "no" => false,
                _ => default,
            },
            _ => default,
        }
    }
}

/// A [`ConfigSource`] backed by a map of JSON values.
#[derive(Debug, Clone, Default)]
pub struct MapConfigSource {
    values: HashMap<String, Value>,
}

impl MapConfigSource {
    /// Creates an empty source.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a value.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: Value) -> Self {
        self.values.insert(key.into(), value);
        self
    }

    /// Builds a source from a flat JSON object.
    #[must_use]
    pub fn from_json(value: &Value) -> Self {
        let values = value
            .as_object()
            .map(|obj| obj.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default();
        Self { values }
    }
}

impl ConfigSource for MapConfigSource {
    fn get(&self, key: &str) -> Option<Value> {
        self.values.get(key).cloned()
    }
}
