//! Text-generation port.

use crate::errors::EnrichError;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;

/// A text-generation service.
///
/// Calls are fallible and latency-variable. Stages treat a failure as
/// recoverable and fall back to a local heuristic.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Generates text for a prompt.
    async fn generate(&self, prompt: &str) -> Result<String, EnrichError>;
}

/// A generator that replays canned responses, then repeats the last one.
#[derive(Debug)]
pub struct StaticTextGenerator {
    responses: Mutex<VecDeque<String>>,
    last: Mutex<Option<String>>,
}

impl StaticTextGenerator {
    /// Creates a generator that always answers `response`.
    #[must_use]
    pub fn new(response: impl Into<String>) -> Self {
        Self::sequence(vec![response.into()])
    }

    /// Creates a generator that answers each response in turn.
    #[must_use]
    pub fn sequence(responses: Vec<String>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            last: Mutex::new(None),
        }
    }
}

#[async_trait]
impl TextGenerator for StaticTextGenerator {
    async fn generate(&self, _prompt: &str) -> Result<String, EnrichError> {
        let next = self.responses.lock().pop_front();
        let mut last = self.last.lock();
        if let Some(response) = next {
            *last = Some(response);
        }
        last.clone()
            .ok_or_else(|| EnrichError::Generation("no canned responses".to_string()))
    }
}

/// A generator that always fails, standing in for an unreachable service.
#[derive(Debug, Clone, Default)]
pub struct UnavailableTextGenerator;

#[async_trait]
impl TextGenerator for UnavailableTextGenerator {
    async fn generate(&self, _prompt: &str) -> Result<String, EnrichError> {
        Err(EnrichError::Generation("text generation unavailable".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_generator_replays_then_repeats() {
        let generator = StaticTextGenerator::sequence(vec!["one".into(), "two".into()]);
        assert_eq!(generator.generate("p").await.unwrap(), "one");
        assert_eq!(generator.generate("p").await.unwrap(), "two");
        assert_eq!(generator.generate("p").await.unwrap(), "two");
    }

    #[tokio::test]
    async fn test_empty_static_generator_fails() {
        let generator = StaticTextGenerator::sequence(Vec::new());
        assert!(generator.generate("p").await.is_err());
    }

    #[tokio::test]
    async fn test_unavailable_generator() {
        let err = UnavailableTextGenerator.generate("p").await.unwrap_err();
        assert_eq!(err.kind(), "GenerationError");
    }
}
