//! Error types for the enrichflow engine.
//!
//! Every failure crossing a stage boundary is normalized to a message string.
//! The original error type is not preserved past that point.

use serde::{Deserialize, Serialize};
use std::any::Any;
use thiserror::Error;

/// The main error type for enrichflow operations.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum EnrichError {
    /// A stage lost its race against the configured timeout.
    #[error("Stage '{stage}' timed out after {timeout_ms}ms")]
    StageTimeout {
        /// The stage name.
        stage: String,
        /// The configured timeout in milliseconds.
        timeout_ms: u64,
    },

    /// A stage executor returned an error or panicked.
    #[error("Stage '{stage}' failed: {message}")]
    StageExecution {
        /// The stage name.
        stage: String,
        /// The normalized error message.
        message: String,
    },

    /// The synthesis stage failed.
    #[error("Synthesis failed: {0}")]
    Synthesis(String),

    /// The pipeline ran past its execution budget before starting a stage.
    #[error("Pipeline exceeded max execution time of {limit_ms}ms ({elapsed_ms}ms elapsed)")]
    PipelineTimeout {
        /// Elapsed time when the budget check failed.
        elapsed_ms: u64,
        /// The configured budget.
        limit_ms: u64,
    },

    /// Invalid pipeline or stage configuration.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The run was cancelled through its token.
    #[error("Pipeline cancelled: {0}")]
    Cancelled(String),

    /// A store collaborator failed.
    #[error("Store error: {0}")]
    Store(String),

    /// The text-generation collaborator failed.
    #[error("Generation error: {0}")]
    Generation(String),

    /// An operation was invoked with invalid arguments.
    #[error("Invalid arguments for '{operation}': {message}")]
    InvalidArguments {
        /// The operation name.
        operation: String,
        /// What was wrong.
        message: String,
    },

    /// An operation name is not registered with the adapter.
    #[error("Unknown operation: {0}")]
    UnknownOperation(String),
}

impl EnrichError {
    /// Creates a stage execution error.
    #[must_use]
    pub fn stage(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self::StageExecution {
            stage: stage.into(),
            message: message.into(),
        }
    }

    /// Creates a configuration error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Returns the stage this error belongs to, if any.
    #[must_use]
    pub fn stage_name(&self) -> Option<&str> {
        match self {
            Self::StageTimeout { stage, .. } | Self::StageExecution { stage, .. } => Some(stage),
            _ => None,
        }
    }

    /// Returns a stable kind name for structured reporting.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::StageTimeout { .. } => "StageTimeout",
            Self::StageExecution { .. } => "StageExecutionFailure",
            Self::Synthesis(_) => "SynthesisFailure",
            Self::PipelineTimeout { .. } => "PipelineTimeout",
            Self::Configuration(_) => "ConfigurationError",
            Self::Cancelled(_) => "Cancelled",
            Self::Store(_) => "StoreError",
            Self::Generation(_) => "GenerationError",
            Self::InvalidArguments { .. } => "InvalidArguments",
            Self::UnknownOperation(_) => "UnknownOperation",
        }
    }

    /// Returns the message recorded in the error ledger for this error.
    ///
    /// Stage timeouts keep the short `timed out after Nms` form; stage
    /// failures record the bare stage message.
    #[must_use]
    pub fn ledger_message(&self) -> String {
        match self {
            Self::StageTimeout { timeout_ms, .. } => format!("timed out after {timeout_ms}ms"),
            Self::StageExecution { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

/// A failure returned by a stage executor.
///
/// Stages may fail with anything that converts into a message; the engine
/// only ever looks at the message.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct StageFailure {
    /// The failure message.
    pub message: String,
}

impl StageFailure {
    /// Creates a new stage failure.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<String> for StageFailure {
    fn from(message: String) -> Self {
        Self { message }
    }
}

impl From<&str> for StageFailure {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<anyhow::Error> for StageFailure {
    fn from(err: anyhow::Error) -> Self {
        Self::new(format!("{err:#}"))
    }
}

impl From<EnrichError> for StageFailure {
    fn from(err: EnrichError) -> Self {
        Self::new(err.to_string())
    }
}

/// Coerces a panic payload into a message string.
#[must_use]
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "stage panicked with a non-string payload".to_string()
    }
}

/// An entry in a context's error ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageError {
    /// The stage that failed.
    pub stage: String,
    /// The normalized error message.
    pub error: String,
    /// Whether the run could continue past this failure.
    pub recoverable: bool,
}

impl StageError {
    /// Creates a new ledger entry.
    #[must_use]
    pub fn new(stage: impl Into<String>, error: impl Into<String>, recoverable: bool) -> Self {
        Self {
            stage: stage.into(),
            error: error.into(),
            recoverable,
        }
    }
}

impl std::fmt::Display for StageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Stage {} failed: {}", self.stage, self.error)
    }
}
