//! Core domain types
//!
//! These types are shared between the client (which talks to the cluster)
//! and the runner (which drives a run). Nothing in here performs I/O.

pub mod event;
pub mod report;
pub mod run;
pub mod status;
pub mod workload;
