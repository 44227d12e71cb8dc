//! Error taxonomy of a run
//!
//! Every fatal error after validation carries a [`RunContext`] so the
//! operator can locate whatever was left in the cluster.

use runjob_client::ClientError;
use runjob_core::domain::event::ErrorStatus;
use runjob_core::domain::run::RunId;
use runjob_core::domain::status::WorkloadStatus;
use runjob_core::domain::workload::WorkloadSpec;
use runjob_core::{ProtocolError, ValidationError};
use thiserror::Error;

/// Identifies the resources of one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunContext {
    pub run_id: RunId,
    pub name: String,
    pub namespace: String,
}

impl RunContext {
    pub fn from_spec(spec: &WorkloadSpec) -> Self {
        Self {
            run_id: spec.run_id(),
            name: spec.name().to_string(),
            namespace: spec.namespace().to_string(),
        }
    }
}

impl std::fmt::Display for RunContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "job {}/{}, run {}", self.namespace, self.name, self.run_id)
    }
}

/// Step of a run at which a fatal error occurred
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Validate,
    Create,
    Watch,
    Classify,
    CollectLogs,
    Delete,
    Report,
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Validate => "validate",
            Self::Create => "create",
            Self::Watch => "watch",
            Self::Classify => "classify",
            Self::CollectLogs => "collect logs",
            Self::Delete => "delete",
            Self::Report => "report",
        };
        f.write_str(name)
    }
}

/// Unrecoverable failure of the event stream
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("watch subscription failed: {0}")]
    Subscription(#[source] ClientError),

    /// Resuming would silently skip events
    #[error("watch checkpoint expired: {0}")]
    Expired(ErrorStatus),

    #[error("event stream closed unexpectedly")]
    Closed,
}

/// Replica output could not be retrieved
#[derive(Debug, Error)]
pub enum LogRetrievalError {
    #[error("failed to list replicas: {0}")]
    List(#[source] ClientError),

    #[error("failed to open log stream of replica {replica}: {source}")]
    Open {
        replica: String,
        #[source]
        source: ClientError,
    },

    #[error("failed to read log stream of replica {replica}: {source}")]
    Read {
        replica: String,
        #[source]
        source: std::io::Error,
    },
}

/// Degraded but non-fatal cluster state
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConsistencyError {
    #[error("no replicas found for {selector} at terminal time")]
    NoReplicas { selector: String },
}

/// Fatal error of a run
#[derive(Debug, Error)]
pub enum RunError {
    #[error("invalid job: {0}")]
    Validation(#[from] ValidationError),

    #[error("failed to look up service account ({context}): {source}")]
    ServiceAccountLookup {
        context: RunContext,
        #[source]
        source: ClientError,
    },

    #[error("failed to create job ({context}): {source}")]
    Create {
        context: RunContext,
        #[source]
        source: ClientError,
    },

    #[error("watch failed ({context}): {source}")]
    Stream {
        context: RunContext,
        #[source]
        source: StreamError,
    },

    #[error("unexpected watch payload ({context}): {source}")]
    Protocol {
        context: RunContext,
        #[source]
        source: ProtocolError,
    },

    #[error("job {} but its logs could not be retrieved ({context}): {source}", .status.outcome())]
    LogRetrieval {
        context: RunContext,
        status: WorkloadStatus,
        #[source]
        source: LogRetrievalError,
    },

    #[error("job {} but could not be deleted and was left behind ({context}): {source}", .status.outcome())]
    Delete {
        context: RunContext,
        status: WorkloadStatus,
        #[source]
        source: ClientError,
    },

    #[error("job {} and was deleted but the report could not be written ({context}): {source}", .status.outcome())]
    Report {
        context: RunContext,
        status: WorkloadStatus,
        #[source]
        source: std::io::Error,
    },
}

impl RunError {
    /// Step at which the run failed
    pub fn step(&self) -> Step {
        match self {
            Self::Validation(_) | Self::ServiceAccountLookup { .. } => Step::Validate,
            Self::Create { .. } => Step::Create,
            Self::Stream { .. } => Step::Watch,
            Self::Protocol { .. } => Step::Classify,
            Self::LogRetrieval { .. } => Step::CollectLogs,
            Self::Delete { .. } => Step::Delete,
            Self::Report { .. } => Step::Report,
        }
    }

    /// Resources of the run, once a workload spec exists
    pub fn context(&self) -> Option<&RunContext> {
        match self {
            Self::Validation(_) => None,
            Self::ServiceAccountLookup { context, .. }
            | Self::Create { context, .. }
            | Self::Stream { context, .. }
            | Self::Protocol { context, .. }
            | Self::LogRetrieval { context, .. }
            | Self::Delete { context, .. }
            | Self::Report { context, .. } => Some(context),
        }
    }

    /// Terminal status, when the run got that far
    pub fn status(&self) -> Option<&WorkloadStatus> {
        match self {
            Self::LogRetrieval { status, .. }
            | Self::Delete { status, .. }
            | Self::Report { status, .. } => Some(status),
            _ => None,
        }
    }

    /// The workload may still exist in the cluster
    pub fn leaves_resources(&self) -> bool {
        matches!(
            self,
            Self::Stream { .. } | Self::Protocol { .. } | Self::Delete { .. }
        )
    }
}
