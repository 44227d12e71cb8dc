//! Workload descriptor
//!
//! Turns the user-supplied fields of a run into the immutable description of
//! the Job that gets submitted. Building a spec is pure: it never talks to
//! the cluster.

use k8s_openapi::api::batch::v1::{Job, JobSpec};
use k8s_openapi::api::core::v1::{Container, PodSpec, PodTemplateSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::BTreeMap;

use crate::domain::run::RunId;
use crate::error::ValidationError;

/// Namespace used when none is given
pub const DEFAULT_NAMESPACE: &str = "default";

/// Restart policy of the single replica
pub const RESTART_POLICY: &str = "Never";

const MAX_NAME_LEN: usize = 63;

/// Fields supplied by the caller (flags or a job file)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkloadRequest {
    pub name: String,
    pub image: String,
    pub namespace: String,
    pub service_account: Option<String>,
    /// Entrypoint override; empty keeps the image default
    pub command: Vec<String>,
    /// Arguments; empty keeps the image default
    pub args: Vec<String>,
}

/// Immutable description of the Job submitted for a run
#[derive(Debug, Clone, PartialEq)]
pub struct WorkloadSpec {
    name: String,
    namespace: String,
    image: String,
    service_account: Option<String>,
    command: Option<Vec<String>>,
    args: Option<Vec<String>>,
    run_id: RunId,
    labels: BTreeMap<String, String>,
}

impl WorkloadSpec {
    /// Builds the spec for a run
    ///
    /// # Errors
    /// `ValidationError` when the name or image is empty, or the name is not
    /// a valid RFC 1123 label.
    pub fn build(request: WorkloadRequest, run_id: RunId) -> Result<Self, ValidationError> {
        let name = request.name.trim().to_string();
        let image = request.image.trim().to_string();

        if name.is_empty() {
            return Err(ValidationError::EmptyName);
        }
        if image.is_empty() {
            return Err(ValidationError::EmptyImage);
        }
        validate_name(&name)?;

        let namespace = match request.namespace.trim() {
            "" => DEFAULT_NAMESPACE.to_string(),
            ns => ns.to_string(),
        };

        let service_account = request
            .service_account
            .map(|sa| sa.trim().to_string())
            .filter(|sa| !sa.is_empty());

        Ok(Self {
            name,
            namespace,
            image,
            service_account,
            command: non_empty(request.command),
            args: non_empty(request.args),
            labels: run_id.labels(),
            run_id,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn image(&self) -> &str {
        &self.image
    }

    pub fn service_account(&self) -> Option<&str> {
        self.service_account.as_deref()
    }

    pub fn command(&self) -> Option<&[String]> {
        self.command.as_deref()
    }

    pub fn args(&self) -> Option<&[String]> {
        self.args.as_deref()
    }

    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    pub fn labels(&self) -> &BTreeMap<String, String> {
        &self.labels
    }

    /// Number of replicas; always one
    pub fn replicas(&self) -> i32 {
        1
    }

    pub fn restart_policy(&self) -> &'static str {
        RESTART_POLICY
    }

    /// Renders the `batch/v1` Job submitted to the cluster
    pub fn to_job(&self) -> Job {
        let container = Container {
            name: self.name.clone(),
            image: Some(self.image.clone()),
            image_pull_policy: Some("Always".to_string()),
            command: self.command.clone(),
            args: self.args.clone(),
            ..Default::default()
        };

        Job {
            metadata: ObjectMeta {
                name: Some(self.name.clone()),
                namespace: Some(self.namespace.clone()),
                labels: Some(self.labels.clone()),
                ..Default::default()
            },
            spec: Some(JobSpec {
                parallelism: Some(self.replicas()),
                completions: Some(self.replicas()),
                // One failed pod fails the Job; the API default would retry 6 times
                backoff_limit: Some(0),
                template: PodTemplateSpec {
                    metadata: Some(ObjectMeta {
                        labels: Some(self.labels.clone()),
                        ..Default::default()
                    }),
                    spec: Some(PodSpec {
                        restart_policy: Some(RESTART_POLICY.to_string()),
                        service_account_name: self.service_account.clone(),
                        containers: vec![container],
                        ..Default::default()
                    }),
                },
                ..Default::default()
            }),
            ..Default::default()
        }
    }
}

fn non_empty(values: Vec<String>) -> Option<Vec<String>> {
    if values.is_empty() { None } else { Some(values) }
}

/// RFC 1123 label: the name ends up in the `job-name` label of each pod
fn validate_name(name: &str) -> Result<(), ValidationError> {
    let invalid = |reason| ValidationError::InvalidName {
        name: name.to_string(),
        reason,
    };

    if name.len() > MAX_NAME_LEN {
        return Err(invalid("must be at most 63 characters"));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        return Err(invalid(
            "must consist of lowercase alphanumeric characters or '-'",
        ));
    }
    if name.starts_with('-') || name.ends_with('-') {
        return Err(invalid("must start and end with an alphanumeric character"));
    }

    Ok(())
}
