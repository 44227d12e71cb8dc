//! Progress reporting
//!
//! Observational output for the operator. Nothing here affects the outcome
//! of a run.

use runjob_core::domain::status::WorkloadStatus;
use std::path::Path;

use crate::error::RunContext;

/// Receives progress notifications from the driver and the sequencer
pub trait ProgressReporter: Send + Sync {
    /// The Job was accepted by the cluster
    fn created(&self, context: &RunContext);

    /// A non-terminal status was observed
    fn tick(&self);

    /// The Job reached a terminal state
    fn terminal(&self, context: &RunContext, status: &WorkloadStatus);

    /// The Job and its pods are being removed
    fn deleted(&self, context: &RunContext);

    /// The report was written to a file
    fn report_written(&self, path: &Path);
}

/// Reporter that discards everything
#[derive(Debug, Clone, Copy, Default)]
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn created(&self, _context: &RunContext) {}
    fn tick(&self) {}
    fn terminal(&self, _context: &RunContext, _status: &WorkloadStatus) {}
    fn deleted(&self, _context: &RunContext) {}
    fn report_written(&self, _path: &Path) {}
}

/// Human readable status line naming the run
pub fn status_line(context: &RunContext, status: &WorkloadStatus) -> String {
    if status.message.is_empty() {
        format!("Job {} ({}) {}", context.name, context.run_id, status.outcome())
    } else {
        format!(
            "Job {} ({}) {}: {}",
            context.name,
            context.run_id,
            status.outcome(),
            status.message
        )
    }
}

#[cfg(test)]
pub(crate) use recording::{ProgressEvent, RecordingProgress};


#[cfg(test)]
mod tests {
    use super::*;
    use runjob_core::domain::run::RunId;

    fn context() -> RunContext {
        RunContext {
            run_id: RunId::new(),
            name: "job1".to_string(),
            namespace: "default".to_string(),
        }
    }

    #[test]
    fn test_status_line_names_run_and_message() {
        let context = context();
        let line = status_line(
            &context,
            &WorkloadStatus {
                terminal: true,
                failed: true,
                message: "BackoffLimitExceeded".to_string(),
            },
        );

        assert_eq!(
            line,
            format!("Job job1 ({}) failed: BackoffLimitExceeded", context.run_id)
        );
    }

    #[test]
    fn test_status_line_without_message() {
        let context = context();
        let line = status_line(
            &context,
            &WorkloadStatus {
                terminal: true,
                failed: false,
                message: String::new(),
            },
        );

        assert_eq!(line, format!("Job job1 ({}) succeeded", context.run_id));
    }
}
