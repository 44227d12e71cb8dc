//! Completion classification
//!
//! A [`WorkloadStatus`] is recomputed from scratch for every event. Nothing
//! carries over between events: a later event fully supersedes an earlier
//! projection.

use k8s_openapi::api::batch::v1::Job;
use serde::{Deserialize, Serialize};

use crate::domain::event::LifecycleEvent;
use crate::error::ProtocolError;

const CONDITION_COMPLETE: &str = "Complete";
const CONDITION_FAILED: &str = "Failed";
const CONDITION_TRUE: &str = "True";

/// Projection of a Job's condition set
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadStatus {
    /// The Job reached Complete or Failed
    pub terminal: bool,
    /// Only meaningful when `terminal` is set
    pub failed: bool,
    /// Message of the deciding condition
    pub message: String,
}

impl WorkloadStatus {
    /// Walks every condition of the Job in order
    ///
    /// The last matching `Failed` or `Complete` condition decides the
    /// outcome, so `[Complete, Failed]` is a failure and `[Failed, Complete]`
    /// a success.
    pub fn from_job(job: &Job) -> Self {
        let mut status = Self::default();

        let conditions = job
            .status
            .as_ref()
            .and_then(|s| s.conditions.as_deref())
            .unwrap_or_default();

        for condition in conditions {
            if condition.status != CONDITION_TRUE {
                continue;
            }
            match condition.type_.as_str() {
                CONDITION_FAILED => {
                    status.terminal = true;
                    status.failed = true;
                    status.message = condition.message.clone().unwrap_or_default();
                }
                CONDITION_COMPLETE => {
                    status.terminal = true;
                    status.failed = false;
                    status.message = condition.message.clone().unwrap_or_default();
                }
                _ => {}
            }
        }

        status
    }

    pub fn succeeded(&self) -> bool {
        self.terminal && !self.failed
    }

    /// Human readable outcome word
    pub fn outcome(&self) -> &'static str {
        match (self.terminal, self.failed) {
            (false, _) => "running",
            (true, false) => "succeeded",
            (true, true) => "failed",
        }
    }
}

/// Classifies one watch event
///
/// Returns `Ok(None)` for events that do not carry a status to classify:
/// `Deleted` (the Job may have been removed by someone else), `Bookmark`
/// and `Error`. `Deleted` payloads are still decoded so that a foreign
/// payload is reported.
///
/// # Errors
/// `ProtocolError` when an object payload is not a Job.
pub fn classify(event: &LifecycleEvent) -> Result<Option<WorkloadStatus>, ProtocolError> {
    match event {
        LifecycleEvent::Added(obj) | LifecycleEvent::Modified(obj) => {
            let job = obj.decode_job()?;
            Ok(Some(WorkloadStatus::from_job(&job)))
        }
        LifecycleEvent::Deleted(obj) => {
            obj.decode_job()?;
            Ok(None)
        }
        LifecycleEvent::Bookmark { .. } | LifecycleEvent::Error(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::event::RawObject;
    use k8s_openapi::api::batch::v1::{JobCondition, JobStatus};
    use serde_json::json;

    fn condition(type_: &str, status: &str, message: &str) -> JobCondition {
        JobCondition {
            type_: type_.to_string(),
            status: status.to_string(),
            message: Some(message.to_string()),
            ..Default::default()
        }
    }

    fn job(conditions: Vec<JobCondition>) -> Job {
        Job {
            status: Some(JobStatus {
                conditions: Some(conditions),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn modified(conditions: Vec<JobCondition>) -> LifecycleEvent {
        LifecycleEvent::Modified(RawObject::from_job(&job(conditions)))
    }

    #[test]
    fn test_no_conditions_is_not_terminal() {
        let status = classify(&LifecycleEvent::Added(RawObject::from_job(&Job::default())))
            .unwrap()
            .unwrap();
        assert_eq!(status, WorkloadStatus::default());
        assert_eq!(status.outcome(), "running");
    }

    #[test]
    fn test_succeeded() {
        let status = classify(&modified(vec![condition("Complete", "True", "ok")]))
            .unwrap()
            .unwrap();
        assert!(status.terminal);
        assert!(!status.failed);
        assert_eq!(status.message, "ok");
        assert!(status.succeeded());
    }

    #[test]
    fn test_failed() {
        let status = classify(&modified(vec![condition(
            "Failed",
            "True",
            "BackoffLimitExceeded",
        )]))
        .unwrap()
        .unwrap();
        assert!(status.terminal);
        assert!(status.failed);
        assert_eq!(status.message, "BackoffLimitExceeded");
        assert_eq!(status.outcome(), "failed");
    }

    #[test]
    fn test_last_matching_condition_wins() {
        let status = classify(&modified(vec![
            condition("Complete", "True", "done"),
            condition("Failed", "True", "broken"),
        ]))
        .unwrap()
        .unwrap();
        assert!(status.terminal && status.failed);
        assert_eq!(status.message, "broken");

        let status = classify(&modified(vec![
            condition("Failed", "True", "broken"),
            condition("Complete", "True", "done"),
        ]))
        .unwrap()
        .unwrap();
        assert!(status.terminal && !status.failed);
        assert_eq!(status.message, "done");
    }

    #[test]
    fn test_classification_is_not_sticky_across_events() {
        let first = classify(&modified(vec![condition("Failed", "True", "x")]))
            .unwrap()
            .unwrap();
        assert!(first.failed);

        let second = classify(&modified(vec![condition("Complete", "True", "y")]))
            .unwrap()
            .unwrap();
        assert!(!second.failed);
        assert_eq!(second.message, "y");
    }

    #[test]
    fn test_ignores_false_and_unrelated_conditions() {
        let status = classify(&modified(vec![
            condition("Failed", "False", "not yet"),
            condition("Suspended", "True", "paused"),
            condition("FailureTarget", "True", "about to fail"),
        ]))
        .unwrap()
        .unwrap();
        assert!(!status.terminal);
        assert!(status.message.is_empty());
    }

    #[test]
    fn test_deleted_bookmark_and_error_are_not_classified() {
        let deleted = LifecycleEvent::Deleted(RawObject::from_job(&job(vec![condition(
            "Complete", "True", "ok",
        )])));
        assert_eq!(classify(&deleted).unwrap(), None);

        let bookmark = LifecycleEvent::Bookmark {
            resource_version: "9".to_string(),
        };
        assert_eq!(classify(&bookmark).unwrap(), None);

        let error = LifecycleEvent::Error(json!({"code": 500}));
        assert_eq!(classify(&error).unwrap(), None);
    }

    #[test]
    fn test_foreign_payload_is_a_protocol_error() {
        let pod = RawObject::new(json!({"apiVersion": "v1", "kind": "Pod", "metadata": {}}));

        assert!(classify(&LifecycleEvent::Modified(pod.clone())).is_err());
        assert!(classify(&LifecycleEvent::Deleted(pod)).is_err());
    }
}
