//! Pipeline execution.
//!
//! This module provides:
//! - Pipeline configuration
//! - The sequential and parallel executors
//! - The synthesis stage
//! - The orchestrator that ties an executor to synthesis

mod config;
mod guard;
mod orchestrator;
mod outcome;
mod parallel;
mod sequential;
mod synthesis;

pub use config::PipelineConfig;
pub use orchestrator::Orchestrator;
pub use outcome::{EnrichmentOutcome, ExecutionAborted, ParallelOutcome, SequentialOutcome};
pub use parallel::{execute_parallel, ParallelExecutor};
pub use sequential::{execute_sequential, SequentialExecutor};
pub use synthesis::{run_synthesis, DefaultSynthesizer, Synthesizer, DEFAULT_MAX_MEMORIES};

/// Stage name used in the error ledger for run-level failures such as an
/// exhausted budget or cancellation.
pub const PIPELINE_STAGE: &str = "pipeline";

/// Stage name of the synthesis stage.
pub const SYNTHESIS_STAGE: &str = "synthesis";
