//! Event sinks for stage lifecycle notifications.
//!
//! The trace recorder forwards every stage start and finish to an
//! [`EventSink`]. Sinks are injected per run; there is no global sink.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};

/// Emitted before a stage executor is invoked.
pub const STAGE_STARTED: &str = "stage.started";
/// Emitted when a stage succeeds.
pub const STAGE_COMPLETED: &str = "stage.completed";
/// Emitted when a stage fails or times out.
pub const STAGE_FAILED: &str = "stage.failed";
/// Emitted when a run stops starting stages because its budget ran out.
pub const PIPELINE_TIMED_OUT: &str = "pipeline.timed_out";
/// Emitted when a run aborts on a required failure.
pub const PIPELINE_ABORTED: &str = "pipeline.aborted";
