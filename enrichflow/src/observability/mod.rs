//! Observability utilities.

mod logging;
mod trace;

pub use logging::{init_logging, LogFormat};
pub use trace::{StageAttempt, TraceEntry, TraceRecorder};
