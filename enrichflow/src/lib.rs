//! # Enrichflow
//!
//! Staged context enrichment for conversational requests.
//!
//! Enrichflow builds an enriched context for a user message by running a set
//! of analysis stages and merging their results:
//!
//! - **Sequential execution**: stages run in declaration order, each seeing
//!   the context its predecessor produced
//! - **Fan-out/fan-in execution**: stages run concurrently against one
//!   snapshot and join on a barrier
//! - **Synthesis**: a terminal stage merges every partial result
//! - **Partial failure**: optional stages fail into an error ledger; required
//!   stages abort the run unless told to continue
//! - **Timeouts and cancellation**: per-stage timeouts, a run budget, and a
//!   cooperative cancellation token handed to every stage
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use enrichflow::prelude::*;
//!
//! let stages = vec![
//!     AnalysisStageSpec::analysis(SentimentStage::new(generator.clone(), scoring.clone())),
//!     AnalysisStageSpec::analysis(IntentStage::new(generator, scoring)).required(),
//! ];
//! let outcome = Orchestrator::new(PipelineConfig::default())
//!     .run_parallel(
//!         EnrichmentContext::for_message("hello", "session-1", "user-1"),
//!         &stages,
//!         &DefaultSynthesizer::new(),
//!     )
//!     .await?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod adapter;
pub mod analysis;
pub mod cancellation;
pub mod context;
pub mod core;
pub mod errors;
pub mod events;
pub mod observability;
pub mod pipeline;
pub mod ports;
pub mod stages;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::adapter::{OperationAdapter, OperationDescriptor, OperationResult};
    pub use crate::analysis::{
        ConsciousnessStage, HeuristicScoring, InsightStage, IntentStage, MemoryRecallStage,
        ScoringStrategy, SentimentStage, SocialStage, ThinkingSessionStore, ThinkingStage,
    };
    pub use crate::cancellation::CancellationToken;
    pub use crate::context::{EnrichmentContext, OperationLedger, RequestIdentity};
    pub use crate::core::{PartialResult, PartialResults, SynthesizedContext};
    pub use crate::errors::{EnrichError, StageError, StageFailure};
    pub use crate::events::{EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::pipeline::{
        execute_parallel, execute_sequential, DefaultSynthesizer, EnrichmentOutcome,
        ExecutionAborted, Orchestrator, PipelineConfig, Synthesizer,
    };
    pub use crate::ports::{ConfigSource, Store, TextGenerator};
    pub use crate::stages::{
        AnalysisStage, AnalysisStageSpec, EnrichStage, EnrichStageSpec, FnAnalysisStage,
        FnEnrichStage,
    };
}
