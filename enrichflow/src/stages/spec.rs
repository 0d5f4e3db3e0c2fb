//! Stage descriptors.

use super::{AnalysisSlotStage, AnalysisStage, EnrichStage};
use crate::errors::EnrichError;
use crate::ports::ConfigSource;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

/// Describes one stage of a run: its executor, whether its failure is
/// fatal, and an optional timeout.
pub struct StageSpec<S: ?Sized> {
    /// The unique name of the stage.
    pub name: String,
    /// The stage implementation.
    pub runner: Arc<S>,
    /// Whether a failure of this stage aborts the run.
    pub required: bool,
    /// Optional per-stage timeout.
    pub timeout: Option<Duration>,
}

/// Descriptor for a sequential stage.
pub type EnrichStageSpec = StageSpec<dyn EnrichStage>;

/// Descriptor for a parallel analysis stage.
pub type AnalysisStageSpec = StageSpec<dyn AnalysisStage>;

impl<S: ?Sized> Clone for StageSpec<S> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            runner: self.runner.clone(),
            required: self.required,
            timeout: self.timeout,
        }
    }
}

impl<S: ?Sized + std::fmt::Debug> std::fmt::Debug for StageSpec<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageSpec")
            .field("name", &self.name)
            .field("runner", &self.runner)
            .field("required", &self.required)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl StageSpec<dyn EnrichStage> {
    /// Creates an optional sequential stage named after its runner.
    #[must_use]
    pub fn enrich(runner: impl EnrichStage + 'static) -> Self {
        let name = runner.name().to_string();
        Self::from_parts(name, Arc::new(runner))
    }

    /// Runs an analysis stage sequentially, keeping its name, flag and
    /// timeout. The result lands in the stage's own slot.
    #[must_use]
    pub fn from_analysis(spec: &AnalysisStageSpec) -> Self {
        Self {
            name: spec.name.clone(),
            runner: Arc::new(AnalysisSlotStage::new(&spec.name, spec.runner.clone())),
            required: spec.required,
            timeout: spec.timeout,
        }
    }
}

impl StageSpec<dyn AnalysisStage> {
    /// Creates an optional analysis stage named after its runner.
    #[must_use]
    pub fn analysis(runner: impl AnalysisStage + 'static) -> Self {
        let name = runner.name().to_string();
        Self::from_parts(name, Arc::new(runner))
    }
}

impl<S: ?Sized> StageSpec<S> {
    /// Creates an optional stage from a name and a shared runner.
    #[must_use]
    pub fn from_parts(name: impl Into<String>, runner: Arc<S>) -> Self {
        Self {
            name: name.into(),
            runner,
            required: false,
            timeout: None,
        }
    }

    /// Marks the stage as required.
    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Sets the required flag.
    #[must_use]
    pub fn with_required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    /// Sets the timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets the timeout in milliseconds.
    #[must_use]
    pub fn with_timeout_ms(self, ms: u64) -> Self {
        self.with_timeout(Duration::from_millis(ms))
    }

    /// Reads `stage.<name>.timeout_ms` and `stage.<name>.required` from a
    /// configuration source, keeping current values as defaults.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the timeout is negative or not finite.
    pub fn configured_from(mut self, source: &dyn ConfigSource) -> Result<Self, EnrichError> {
        let timeout_key = format!("stage.{}.timeout_ms", self.name);
        let current = self.timeout.map_or(-1.0, |t| t.as_secs_f64() * 1000.0);
        let timeout_ms = source.get_number(&timeout_key, current);
        if !timeout_ms.is_finite() {
            return Err(EnrichError::configuration(format!(
                "{timeout_key} must be a finite number"
            )));
        }
        if timeout_ms >= 0.0 {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let micros = (timeout_ms * 1000.0).round() as u64;
            self.timeout = Some(Duration::from_micros(micros));
        } else if source.has(&timeout_key) {
            return Err(EnrichError::configuration(format!(
                "{timeout_key} must not be negative, got {timeout_ms}"
            )));
        }

        let required_key = format!("stage.{}.required", self.name);
        self.required = source.get_bool(&required_key, self.required);
        Ok(self)
    }

    /// Returns the timeout in whole milliseconds, if any.
    #[must_use]
    pub fn timeout_ms(&self) -> Option<u64> {
        self.timeout
            .map(|t| u64::try_from(t.as_millis()).unwrap_or(u64::MAX))
    }
}

/// Checks that stage names are non-empty and unique, and that no timeout
/// is zero.
///
/// # Errors
///
/// Returns a configuration error naming the offending stage.
pub fn validate_stage_specs<S: ?Sized>(specs: &[StageSpec<S>]) -> Result<(), EnrichError> {
    let mut seen = HashSet::new();
    for spec in specs {
        if spec.name.trim().is_empty() {
            return Err(EnrichError::configuration("stage name cannot be empty"));
        }
        if !seen.insert(spec.name.as_str()) {
            return Err(EnrichError::configuration(format!(
                "duplicate stage name '{}'",
                spec.name
            )));
        }
        if spec.timeout == Some(Duration::ZERO) {
            return Err(EnrichError::configuration(format!(
                "stage '{}' has a zero timeout",
                spec.name
            )));
        }
    }
    Ok(())
}
