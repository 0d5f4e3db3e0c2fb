//! Per-stage execution trace.
//!
//! The trace is write-only diagnostics. Executors append to it but never read
//! it back to make decisions.

use crate::events::{EventSink, NoOpEventSink, STAGE_COMPLETED, STAGE_FAILED, STAGE_STARTED};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;

/// One stage attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceEntry {
    /// Stage name.
    pub stage: String,
    /// When the attempt started.
    pub start_time: DateTime<Utc>,
    /// When the attempt settled.
    pub end_time: DateTime<Utc>,
    /// Whether the attempt succeeded.
    pub success: bool,
    /// Error message if the attempt failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TraceEntry {
    /// Returns the attempt duration in milliseconds.
    #[must_use]
    pub fn duration_ms(&self) -> i64 {
        (self.end_time - self.start_time).num_milliseconds()
    }
}

/// An attempt that has started but not yet settled.
#[derive(Debug)]
pub struct StageAttempt {
    stage: String,
    start_time: DateTime<Utc>,
    started: Instant,
}

impl StageAttempt {
    /// Returns the stage name.
    #[must_use]
    pub fn stage(&self) -> &str {
        &self.stage
    }

    /// Returns the elapsed time in milliseconds.
    #[must_use]
    pub fn elapsed_ms(&self) -> f64 {
        self.started.elapsed().as_secs_f64() * 1000.0
    }
}

/// Collects trace entries for one run and mirrors them to logs and events.
pub struct TraceRecorder {
    enabled: bool,
    entries: Mutex<Vec<TraceEntry>>,
    sink: Arc<dyn EventSink>,
}

impl TraceRecorder {
    /// Creates a recorder. A disabled recorder keeps no entries.
    #[must_use]
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            entries: Mutex::new(Vec::new()),
            sink: Arc::new(NoOpEventSink),
        }
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Returns whether entries are kept.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Marks the start of a stage attempt.
    #[must_use]
    pub fn start(&self, stage: &str) -> StageAttempt {
        tracing::debug!(stage, "Stage started");
        self.sink
            .try_emit(STAGE_STARTED, Some(serde_json::json!({ "stage": stage })));
        StageAttempt {
            stage: stage.to_string(),
            start_time: Utc::now(),
            started: Instant::now(),
        }
    }

    /// Records a successful attempt.
    pub fn succeed(&self, attempt: StageAttempt) {
        let duration_ms = attempt.elapsed_ms();
        tracing::debug!(stage = %attempt.stage, duration_ms, "Stage completed");
        self.sink.try_emit(
            STAGE_COMPLETED,
            Some(serde_json::json!({ "stage": &attempt.stage, "duration_ms": duration_ms })),
        );
        self.push(attempt, None);
    }

    /// Records a failed attempt.
    pub fn fail(&self, attempt: StageAttempt, error: &str) {
        let duration_ms = attempt.elapsed_ms();
        tracing::debug!(stage = %attempt.stage, duration_ms, error, "Stage failed");
        self.sink.try_emit(
            STAGE_FAILED,
            Some(serde_json::json!({
                "stage": &attempt.stage,
                "duration_ms": duration_ms,
                "error": error,
            })),
        );
        self.push(attempt, Some(error.to_string()));
    }

    /// Forwards a run-level event to the sink.
    pub fn emit(&self, event_type: &str, data: serde_json::Value) {
        self.sink.try_emit(event_type, Some(data));
    }

    /// Returns a copy of the entries recorded so far.
    #[must_use]
    pub fn entries(&self) -> Vec<TraceEntry> {
        self.entries.lock().clone()
    }

    /// Consumes the recorder and returns its entries.
    #[must_use]
    pub fn into_entries(self) -> Vec<TraceEntry> {
        self.entries.into_inner()
    }

    fn push(&self, attempt: StageAttempt, error: Option<String>) {
        if !self.enabled {
            return;
        }
        self.entries.lock().push(TraceEntry {
            stage: attempt.stage,
            start_time: attempt.start_time,
            end_time: Utc::now(),
            success: error.is_none(),
            error,
        });
    }
}

impl std::fmt::Debug for TraceRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TraceRecorder")
            .field("enabled", &self.enabled)
            .field("entries", &self.entries.lock().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::CollectingEventSink;

    #[test]
    fn test_recorder_keeps_order() {
        let recorder = TraceRecorder::new(true);
        let a = recorder.start("a");
        recorder.succeed(a);
        let b = recorder.start("b");
        recorder.fail(b, "boom");

        let entries = recorder.into_entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].stage, "a");
        assert!(entries[0].success);
        assert_eq!(entries[1].stage, "b");
        assert!(!entries[1].success);
        assert_eq!(entries[1].error.as_deref(), Some("boom"));
        assert!(entries[1].end_time >= entries[1].start_time);
    }

    #[test]
    fn test_disabled_recorder_keeps_nothing() {
        let recorder = TraceRecorder::new(false);
        let a = recorder.start("a");
        recorder.succeed(a);
        assert!(recorder.entries().is_empty());
    }

    #[test]
    fn test_recorder_emits_events_even_when_disabled() {
        let sink = Arc::new(CollectingEventSink::new());
        let recorder = TraceRecorder::new(false).with_sink(sink.clone());
        let a = recorder.start("a");
        recorder.fail(a, "bad");

        assert_eq!(sink.events_of_type(STAGE_STARTED).len(), 1);
        let failed = sink.events_of_type(STAGE_FAILED);
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].as_ref().unwrap()["error"], "bad");
    }
}
