//! run-job Kubernetes Client
//!
//! The narrow slice of the Kubernetes API a run needs, behind the
//! [`Orchestrator`] trait so the runner can be driven by the real cluster or
//! by a scripted double in tests.
//!
//! # Example
//!
//! ```no_run
//! use runjob_client::{KubeOrchestrator, Orchestrator, connect};
//! use runjob_core::domain::run::RunId;
//! use runjob_core::domain::workload::{WorkloadRequest, WorkloadSpec};
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = connect(Path::new("/home/me/.kube/config")).await?;
//!     let orchestrator = KubeOrchestrator::new(client, "default");
//!
//!     let spec = WorkloadSpec::build(
//!         WorkloadRequest {
//!             name: "job1".to_string(),
//!             image: "busybox".to_string(),
//!             ..Default::default()
//!         },
//!         RunId::new(),
//!     )?;
//!     let created = orchestrator.create(&spec).await?;
//!
//!     println!("Created job {} at {:?}", created.name, created.resource_version);
//!     Ok(())
//! }
//! ```

mod cluster;
mod config;
pub mod error;
#[cfg(any(test, feature = "test-support"))]
pub mod fake;

// Re-export commonly used types
pub use config::connect;
pub use error::{ClientError, Result};
pub use cluster::KubeOrchestrator;

use async_trait::async_trait;
use futures_util::io::AsyncRead;
use futures_util::stream::BoxStream;
use runjob_core::domain::event::{Checkpoint, LifecycleEvent};
use runjob_core::domain::workload::WorkloadSpec;
use std::pin::Pin;

/// Unbounded sequence of events from one watch subscription
///
/// The stream ends when the server closes the watch; an `Err` item means the
/// subscription broke while it was being read.
pub type EventStream = BoxStream<'static, Result<LifecycleEvent>>;

/// Raw output of one replica
pub type LogStream = Pin<Box<dyn AsyncRead + Send>>;

/// What the API server returned for a created Job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedWorkload {
    pub name: String,
    pub namespace: String,
    /// Resource version of the created object, the natural watch checkpoint
    pub resource_version: Option<String>,
}

/// Cluster operations used by a run
///
/// An implementation is scoped to a single namespace.
#[async_trait]
pub trait Orchestrator: Send + Sync {
    /// Namespace every call is scoped to
    fn namespace(&self) -> &str;

    /// Checks that a service account exists
    async fn service_account_exists(&self, name: &str) -> Result<bool>;

    /// Submits the Job described by `spec`
    async fn create(&self, spec: &WorkloadSpec) -> Result<CreatedWorkload>;

    /// Opens one watch subscription on Jobs matching `label_selector`
    ///
    /// Events strictly after `checkpoint` are delivered.
    async fn watch(&self, label_selector: &str, checkpoint: &Checkpoint) -> Result<EventStream>;

    /// Lists the names of the pods matching `label_selector`, in API order
    async fn list_replicas(&self, label_selector: &str) -> Result<Vec<String>>;

    /// Opens the log stream of one pod
    async fn log_stream(&self, replica: &str) -> Result<LogStream>;

    /// Deletes a Job by name
    ///
    /// Deletion cascades in the background: the Job is removed at once and
    /// its pods are garbage collected afterwards.
    async fn delete(&self, name: &str) -> Result<()>;
}
