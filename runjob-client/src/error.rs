//! Error types for the run-job client

use thiserror::Error;

/// Result type alias for client operations
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors that can occur when talking to the cluster
#[derive(Debug, Error)]
pub enum ClientError {
    /// Transport-level failure (connection, TLS, HTTP)
    #[error("Kubernetes request failed: {0}")]
    RequestFailed(#[source] kube::Error),

    /// API server returned an error status
    #[error("API error (status {status}): {message}")]
    ApiError {
        /// HTTP status code
        status: u16,
        /// Error message from the API server
        message: String,
    },

    /// Failed to parse a response or watch frame
    #[error("Failed to parse response: {0}")]
    ParseError(String),

    /// Kubeconfig or in-cluster configuration could not be loaded
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// An open stream failed while it was being read
    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),
}

impl ClientError {
    /// Create an API error from status code and message
    pub fn api_error(status: u16, message: impl Into<String>) -> Self {
        Self::ApiError {
            status,
            message: message.into(),
        }
    }

    /// Check if this error is a "not found" error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::ApiError { status: 404, .. })
    }

    /// Check if this error is a client error (4xx status)
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::ApiError { status, .. } if *status >= 400 && *status < 500)
    }

    /// Check if this error is a server error (5xx status)
    pub fn is_server_error(&self) -> bool {
        matches!(self, Self::ApiError { status, .. } if *status >= 500)
    }

    /// Check if a watch failing with this error can never succeed by
    /// resubscribing
    ///
    /// Rejected requests (bad selector, missing kind, denied access, expired
    /// resource version) and configuration problems are permanent. Transport
    /// failures, server errors, throttling and parse errors of a single frame
    /// are worth another subscription.
    pub fn is_unrecoverable_watch(&self) -> bool {
        match self {
            Self::ApiError { status, .. } => matches!(status, 400 | 401 | 403 | 404 | 405 | 410),
            Self::ConfigError(_) => true,
            Self::RequestFailed(_) | Self::ParseError(_) | Self::StreamInterrupted(_) => false,
        }
    }
}

impl From<kube::Error> for ClientError {
    fn from(err: kube::Error) -> Self {
        match err {
            kube::Error::Api(response) => Self::ApiError {
                status: response.code,
                message: response.message,
            },
            kube::Error::SerdeError(e) => Self::ParseError(e.to_string()),
            kube::Error::ReadEvents(e) => Self::StreamInterrupted(e.to_string()),
            other => Self::RequestFailed(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_helpers() {
        let not_found = ClientError::api_error(404, "jobs.batch \"job1\" not found");
        assert!(not_found.is_not_found());
        assert!(not_found.is_client_error());
        assert!(!not_found.is_server_error());

        let unavailable = ClientError::api_error(503, "unavailable");
        assert!(unavailable.is_server_error());
        assert!(!unavailable.is_not_found());
    }

    #[test]
    fn test_unrecoverable_watch_errors() {
        assert!(ClientError::api_error(404, "the server could not find the requested resource").is_unrecoverable_watch());
        assert!(ClientError::api_error(410, "too old resource version").is_unrecoverable_watch());
        assert!(ClientError::api_error(403, "forbidden").is_unrecoverable_watch());
        assert!(ClientError::ConfigError("no kubeconfig".to_string()).is_unrecoverable_watch());
    }

    #[test]
    fn test_transient_watch_errors() {
        assert!(!ClientError::api_error(500, "etcd leader changed").is_unrecoverable_watch());
        assert!(!ClientError::api_error(504, "timeout").is_unrecoverable_watch());
        assert!(!ClientError::api_error(429, "too many requests").is_unrecoverable_watch());
        assert!(!ClientError::StreamInterrupted("connection reset".to_string()).is_unrecoverable_watch());
        assert!(!ClientError::ParseError("truncated frame".to_string()).is_unrecoverable_watch());
    }

    #[test]
    fn test_from_kube_api_error_keeps_status() {
        let err: ClientError = kube::Error::Api(kube::core::ErrorResponse {
            status: "Failure".to_string(),
            message: "jobs.batch \"job1\" already exists".to_string(),
            reason: "AlreadyExists".to_string(),
            code: 409,
        })
        .into();

        match err {
            ClientError::ApiError { status, message } => {
                assert_eq!(status, 409);
                assert!(message.contains("already exists"));
            }
            other => panic!("expected ApiError, got {:?}", other),
        }
    }
}
