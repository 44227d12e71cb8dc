//! Watch lifecycle events
//!
//! Events carry the watched object as raw JSON so that decoding into a typed
//! Kubernetes object happens in one place (see [`RawObject::decode_job`]),
//! where an unexpected payload can be reported as a [`ProtocolError`].

use k8s_openapi::api::batch::v1::Job;
use serde::Deserialize;
use serde_json::Value as JsonValue;

use crate::error::ProtocolError;

const JOB_KIND: &str = "Job";

/// Resource version from which a watch is (re)started
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checkpoint(String);

impl Checkpoint {
    pub fn new(resource_version: impl Into<String>) -> Self {
        Self(resource_version.into())
    }

    /// Checkpoint asking the API server to start from any recent state
    pub fn any() -> Self {
        Self("0".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Checkpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// An object received on a watch, not yet decoded
#[derive(Debug, Clone, PartialEq)]
pub struct RawObject(JsonValue);

impl RawObject {
    pub fn new(value: JsonValue) -> Self {
        Self(value)
    }

    /// Wraps a typed object; used by adapters and test doubles
    pub fn from_job(job: &Job) -> Self {
        let mut value = serde_json::to_value(job).unwrap_or(JsonValue::Null);
        if let JsonValue::Object(map) = &mut value {
            map.entry("apiVersion")
                .or_insert_with(|| JsonValue::from("batch/v1"));
            map.entry("kind").or_insert_with(|| JsonValue::from(JOB_KIND));
        }
        Self(value)
    }

    pub fn kind(&self) -> Option<&str> {
        self.0.get("kind").and_then(JsonValue::as_str)
    }

    pub fn resource_version(&self) -> Option<&str> {
        self.0
            .get("metadata")
            .and_then(|meta| meta.get("resourceVersion"))
            .and_then(JsonValue::as_str)
    }

    pub fn as_json(&self) -> &JsonValue {
        &self.0
    }

    /// Decodes the payload as a `batch/v1` Job
    ///
    /// # Errors
    /// `ProtocolError` when the payload announces a different kind or does
    /// not deserialize as a Job.
    pub fn decode_job(&self) -> Result<Job, ProtocolError> {
        match self.kind() {
            Some(JOB_KIND) | None => {}
            Some(other) => {
                return Err(ProtocolError::UnexpectedKind {
                    expected: JOB_KIND,
                    actual: other.to_string(),
                });
            }
        }

        if !self.0.is_object() {
            return Err(ProtocolError::UnexpectedKind {
                expected: JOB_KIND,
                actual: json_type_name(&self.0).to_string(),
            });
        }

        serde_json::from_value(self.0.clone()).map_err(|source| ProtocolError::Decode {
            kind: JOB_KIND,
            source,
        })
    }
}

/// One notification from a watch
#[derive(Debug, Clone, PartialEq)]
pub enum LifecycleEvent {
    Added(RawObject),
    Modified(RawObject),
    Deleted(RawObject),
    /// Progress marker without an object
    Bookmark { resource_version: String },
    /// Status payload describing a watch-level failure
    Error(JsonValue),
}

impl LifecycleEvent {
    /// Resource version carried by the event, if any
    pub fn resource_version(&self) -> Option<&str> {
        match self {
            Self::Added(obj) | Self::Modified(obj) | Self::Deleted(obj) => obj.resource_version(),
            Self::Bookmark { resource_version } => Some(resource_version),
            Self::Error(_) => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Added(_) => "ADDED",
            Self::Modified(_) => "MODIFIED",
            Self::Deleted(_) => "DELETED",
            Self::Bookmark { .. } => "BOOKMARK",
            Self::Error(_) => "ERROR",
        }
    }
}

/// Structured status carried by an `Error` event
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorStatus {
    pub code: u16,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub message: String,
}

impl ErrorStatus {
    /// Parses the payload of an `Error` event
    ///
    /// Returns `None` when the payload is not a status object; such events
    /// are logged by the stream and otherwise skipped.
    pub fn parse(payload: &JsonValue) -> Option<Self> {
        if let Some(kind) = payload.get("kind").and_then(JsonValue::as_str) {
            if kind != "Status" {
                return None;
            }
        }
        serde_json::from_value(payload.clone()).ok()
    }

    /// The watch checkpoint is older than what the server retains
    pub fn is_expired(&self) -> bool {
        self.code == 410
    }
}

impl std::fmt::Display for ErrorStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}): {}", self.code, self.reason, self.message)
    }
}

fn json_type_name(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "a boolean",
        JsonValue::Number(_) => "a number",
        JsonValue::String(_) => "a string",
        JsonValue::Array(_) => "an array",
        JsonValue::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
    use serde_json::json;

    fn job_with_version(version: &str) -> Job {
        Job {
            metadata: ObjectMeta {
                name: Some("job1".to_string()),
                resource_version: Some(version.to_string()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_resource_version_from_objects_and_bookmarks() {
        let added = LifecycleEvent::Added(RawObject::from_job(&job_with_version("12")));
        assert_eq!(added.resource_version(), Some("12"));

        let bookmark = LifecycleEvent::Bookmark {
            resource_version: "40".to_string(),
        };
        assert_eq!(bookmark.resource_version(), Some("40"));

        let error = LifecycleEvent::Error(json!({"code": 500}));
        assert_eq!(error.resource_version(), None);
    }

    #[test]
    fn test_decode_job_round_trips_name() {
        let raw = RawObject::from_job(&job_with_version("3"));
        assert_eq!(raw.kind(), Some("Job"));

        let job = raw.decode_job().unwrap();
        assert_eq!(job.metadata.name.as_deref(), Some("job1"));
    }

    #[test]
    fn test_decode_job_rejects_other_kinds() {
        let raw = RawObject::new(json!({
            "apiVersion": "v1",
            "kind": "Pod",
            "metadata": {"name": "job1-abcde"}
        }));

        match raw.decode_job() {
            Err(ProtocolError::UnexpectedKind { actual, .. }) => assert_eq!(actual, "Pod"),
            other => panic!("expected UnexpectedKind, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_job_rejects_non_objects() {
        let raw = RawObject::new(json!("not a job"));
        assert!(matches!(
            raw.decode_job(),
            Err(ProtocolError::UnexpectedKind { .. })
        ));
    }

    #[test]
    fn test_error_status_parse() {
        let status = ErrorStatus::parse(&json!({
            "kind": "Status",
            "apiVersion": "v1",
            "status": "Failure",
            "reason": "Expired",
            "message": "too old resource version: 1 (42)",
            "code": 410
        }))
        .unwrap();

        assert!(status.is_expired());
        assert_eq!(status.reason, "Expired");
    }

    #[test]
    fn test_error_status_parse_rejects_unstructured_payloads() {
        assert!(ErrorStatus::parse(&json!("boom")).is_none());
        assert!(ErrorStatus::parse(&json!({"message": "no code"})).is_none());
        assert!(ErrorStatus::parse(&json!({"kind": "Job", "code": 500})).is_none());
    }
}
