//! Results returned by the executors and the orchestrator.

use crate::context::EnrichmentContext;
use crate::core::PartialResults;
use crate::errors::{EnrichError, StageError};
use crate::observability::TraceEntry;
use std::time::Duration;
use thiserror::Error;

/// Result of a sequential run.
#[derive(Debug, Clone)]
pub struct SequentialOutcome {
    /// True if every stage was attempted and none failed unrecoverably.
    pub success: bool,
    /// The enriched context.
    pub context: EnrichmentContext,
    /// One entry per stage attempt, in declaration order.
    pub trace: Vec<TraceEntry>,
    /// Wall-clock time of the run.
    pub total_time: Duration,
}

/// Result of a parallel fan-out.
#[derive(Debug, Clone)]
pub struct ParallelOutcome {
    /// One slot per configured stage; empty for failed stages.
    pub results: PartialResults,
    /// Names of the stages that succeeded, in configuration order.
    pub performed: Vec<String>,
    /// One entry per failed or timed-out stage.
    pub errors: Vec<StageError>,
    /// One entry per stage attempt, in settle order.
    pub trace: Vec<TraceEntry>,
    /// Wall-clock time of the fan-out.
    pub total_time: Duration,
}

/// Result of an orchestrated run: executor plus synthesis.
#[derive(Debug, Clone)]
pub struct EnrichmentOutcome {
    /// True if no unrecoverable error was recorded during the run.
    pub success: bool,
    /// The enriched context, with its synthesized slot when synthesis ran.
    pub context: EnrichmentContext,
    /// Trace of every stage attempt, synthesis included.
    pub trace: Vec<TraceEntry>,
    /// Wall-clock time between entry and exit.
    pub total_time: Duration,
}

/// A run stopped before completion.
///
/// Carries what was accumulated up to the abort so callers can inspect the
/// error ledger and trace.
#[derive(Debug, Clone, Error)]
#[error("{error}")]
pub struct ExecutionAborted {
    /// The error that stopped the run.
    #[source]
    pub error: EnrichError,
    /// The error ledger at the time of the abort.
    pub errors: Vec<StageError>,
    /// The context at the time of the abort, when the run owned one.
    pub context: Option<Box<EnrichmentContext>>,
    /// Trace entries recorded before the abort.
    pub trace: Vec<TraceEntry>,
    /// Wall-clock time until the abort.
    pub total_time: Duration,
}

impl ExecutionAborted {
    /// Returns the normalized error message.
    #[must_use]
    pub fn message(&self) -> String {
        self.error.to_string()
    }
}
