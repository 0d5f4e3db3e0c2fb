//! Testing utilities for enrichment pipelines.
//!
//! This module provides:
//! - Context and partial-result fixtures
//! - Mock analysis and enrich stages
//! - A counting synthesizer
//! - Assertions over contexts and traces

mod assertions;
mod fixtures;
mod mocks;

pub use assertions::{assert_failed, assert_performed, assert_synthesized, assert_trace_stages};
pub use fixtures::{sample_partials, test_context, TEST_SESSION, TEST_USER};
pub use mocks::{
    failing_analysis, failing_enrich, pending_analysis, pending_enrich, slot_writing_enrich,
    slow_analysis, slow_enrich, succeeding_analysis, tagging_enrich, CountingSynthesizer,
    RecordingAnalysis, SucceedingAnalysis,
};
