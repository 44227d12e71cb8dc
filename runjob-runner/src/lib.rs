//! run-job Runner
//!
//! Runs a single Job to completion and cleans up after it.
//!
//! Architecture:
//! - Configuration: stream tuning from environment or defaults
//! - Stream: resubscribing watch on the run's Jobs
//! - Services: log collection, report sinks, progress reporting
//! - Teardown: collect logs, delete, report, stop, at most once
//! - Driver: submit, watch, hand events to teardown, honour cancellation

pub mod config;
pub mod driver;
pub mod error;
pub mod service;
pub mod stream;
pub mod teardown;

pub use config::Config;
pub use driver::{RunDriver, RunOutcome};
pub use error::{ConsistencyError, LogRetrievalError, RunContext, RunError, Step, StreamError};
