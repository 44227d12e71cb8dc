//! Error types for the pure parts of a run

use thiserror::Error;

/// Bad input detected before anything is submitted to the cluster
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("job name is required")]
    EmptyName,

    #[error("image is required")]
    EmptyImage,

    /// The name is not usable as a Kubernetes label value
    #[error("invalid job name '{name}': {reason}")]
    InvalidName { name: String, reason: &'static str },

    #[error("service account '{name}' does not exist in namespace '{namespace}'")]
    UnknownServiceAccount { name: String, namespace: String },
}

/// A watch payload did not have the shape of the watched kind
///
/// This should never happen against a conforming API server and points to
/// a decoding mismatch between this tool and the cluster's event schema.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("expected a {expected} object but received {actual}")]
    UnexpectedKind {
        expected: &'static str,
        actual: String,
    },

    #[error("failed to decode {kind} object: {source}")]
    Decode {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },
}
