//! Service layer
//!
//! Collaborators of the teardown sequence: reading replica output, writing
//! the report and telling the operator what is happening. Sinks and
//! progress reporters are trait-based so the binary and the tests can plug
//! in their own.

mod log_collector;
mod progress;
mod report_sink;

// Re-export traits
pub use progress::ProgressReporter;
pub use report_sink::ReportSink;

// Re-export implementations
pub use log_collector::{LogCollection, LogCollector};
pub use progress::{SilentProgress, status_line};
pub use report_sink::{FileSink, StdoutSink};

#[cfg(test)]
pub(crate) use progress::{ProgressEvent, RecordingProgress};
#[cfg(test)]
pub(crate) use report_sink::MemorySink;
