//! Pipeline-level flags.

use crate::errors::EnrichError;
use crate::ports::ConfigSource;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Global flags for one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Record required-stage failures as non-recoverable instead of aborting.
    #[serde(default)]
    pub continue_on_error: bool,
    /// Budget after which no new stage is started.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_execution_time_ms: Option<u64>,
    /// Whether trace entries are kept.
    #[serde(default = "default_trace_enabled")]
    pub trace_enabled: bool,
}

fn default_trace_enabled() -> bool {
    true
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            continue_on_error: false,
            max_execution_time_ms: None,
            trace_enabled: default_trace_enabled(),
        }
    }
}

impl PipelineConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `continue_on_error`.
    #[must_use]
    pub fn with_continue_on_error(mut self, continue_on_error: bool) -> Self {
        self.continue_on_error = continue_on_error;
        self
    }

    /// Sets the execution budget.
    #[must_use]
    pub fn with_max_execution_time(mut self, budget: Duration) -> Self {
        self.max_execution_time_ms = Some(u64::try_from(budget.as_millis()).unwrap_or(u64::MAX));
        self
    }

    /// Sets `trace_enabled`.
    #[must_use]
    pub fn with_trace_enabled(mut self, enabled: bool) -> Self {
        self.trace_enabled = enabled;
        self
    }

    /// Returns the execution budget.
    #[must_use]
    pub fn max_execution_time(&self) -> Option<Duration> {
        self.max_execution_time_ms.map(Duration::from_millis)
    }

    /// Returns an error if `elapsed` has used up the budget.
    ///
    /// # Errors
    ///
    /// Returns [`EnrichError::PipelineTimeout`] once the budget is exceeded.
    pub fn check_budget(&self, elapsed: Duration) -> Result<(), EnrichError> {
        match self.max_execution_time_ms {
            Some(limit_ms) => {
                let elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
                if elapsed_ms > limit_ms {
                    Err(EnrichError::PipelineTimeout { elapsed_ms, limit_ms })
                } else {
                    Ok(())
                }
            }
            None => Ok(()),
        }
    }

    /// Reads `pipeline.continue_on_error`, `pipeline.max_execution_time_ms`
    /// and `pipeline.trace_enabled`, defaulting anything unset.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for a negative or non-finite budget.
    pub fn from_source(source: &dyn ConfigSource) -> Result<Self, EnrichError> {
        let defaults = Self::default();
        let max_execution_time_ms = if source.has("pipeline.max_execution_time_ms") {
            let raw = source.get_number("pipeline.max_execution_time_ms", f64::NAN);
            if !raw.is_finite() || raw < 0.0 {
                return Err(EnrichError::configuration(format!(
                    "pipeline.max_execution_time_ms must be a non-negative number, got {raw}"
                )));
            }
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            Some(raw.round() as u64)
        } else {
            None
        };

        Ok(Self {
            continue_on_error: source.get_bool("pipeline.continue_on_error", defaults.continue_on_error),
            max_execution_time_ms,
            trace_enabled: source.get_bool("pipeline.trace_enabled", defaults.trace_enabled),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::MapConfigSource;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert!(!config.continue_on_error);
        assert!(config.trace_enabled);
        assert!(config.max_execution_time().is_none());
        assert!(config.check_budget(Duration::from_secs(3600)).is_ok());
    }

    #[test]
    fn test_budget_check() {
        let config = PipelineConfig::new().with_max_execution_time(Duration::from_millis(100));
        assert!(config.check_budget(Duration::from_millis(100)).is_ok());
        let err = config.check_budget(Duration::from_millis(101)).unwrap_err();
        assert_eq!(
            err,
            EnrichError::PipelineTimeout {
                elapsed_ms: 101,
                limit_ms: 100
            }
        );
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let config: PipelineConfig = serde_json::from_value(json!({"continue_on_error": true})).unwrap();
        assert_eq!(
            config,
            PipelineConfig {
                continue_on_error: true,
                max_execution_time_ms: None,
                trace_enabled: true,
            }
        );
    }

    #[test]
    fn test_from_source() {
        let source = MapConfigSource::new()
            .with("pipeline.continue_on_error", json!("true"))
            .with("pipeline.max_execution_time_ms", json!(1500))
            .with("pipeline.trace_enabled", json!(false));

        let config = PipelineConfig::from_source(&source).unwrap();
        assert!(config.continue_on_error);
        assert_eq!(config.max_execution_time(), Some(Duration::from_millis(1500)));
        assert!(!config.trace_enabled);
    }

    #[test]
    fn test_from_source_rejects_bad_budget() {
        let negative = MapConfigSource::new().with("pipeline.max_execution_time_ms", json!(-1));
        assert!(PipelineConfig::from_source(&negative).is_err());

        let garbage = MapConfigSource::new().with("pipeline.max_execution_time_ms", json!("soon"));
        let err = PipelineConfig::from_source(&garbage).unwrap_err();
        assert_eq!(err.kind(), "ConfigurationError");
    }
}
