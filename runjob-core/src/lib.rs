//! run-job Core
//!
//! Core types and rules for submitting a single batch Job and tracking it
//! to completion.
//!
//! This crate contains:
//! - Domain types: RunId, WorkloadSpec, WorkloadStatus, LifecycleEvent, LogReport
//! - The completion classifier (pure)
//! - Errors raised by the pure parts of a run (validation, payload decoding)

pub mod domain;
pub mod error;

pub use error::{ProtocolError, ValidationError};
