//! Scripted orchestrator for tests
//!
//! Records every call and plays back scripted watch sessions, replica
//! outputs and failures. Enabled for other crates with the `test-support`
//! feature.

use async_trait::async_trait;
use futures_util::io::{AsyncRead, Cursor};
use futures_util::stream::{self, StreamExt};
use k8s_openapi::api::batch::v1::{Job, JobCondition, JobStatus};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use runjob_core::domain::event::{Checkpoint, LifecycleEvent, RawObject};
use runjob_core::domain::workload::WorkloadSpec;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use crate::error::{ClientError, Result};
use crate::{CreatedWorkload, EventStream, LogStream, Orchestrator};

/// Recorded orchestrator call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FakeCall {
    ServiceAccountExists {
        name: String,
    },
    Create {
        name: String,
        labels: BTreeMap<String, String>,
    },
    Watch {
        label_selector: String,
        checkpoint: String,
    },
    ListReplicas {
        label_selector: String,
    },
    LogStream {
        replica: String,
    },
    Delete {
        name: String,
    },
}

/// Failure injected into a scripted call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FakeFailure {
    /// Connection-level failure
    Transport,
    /// 404
    NotFound,
    /// 403
    Forbidden,
    /// 409
    Conflict,
    /// 410
    Gone,
    /// 500
    Server,
}

impl FakeFailure {
    fn to_error(self, what: &str) -> ClientError {
        match self {
            Self::Transport => ClientError::StreamInterrupted(format!("{}: connection reset by peer", what)),
            Self::NotFound => ClientError::api_error(404, format!("{}: not found", what)),
            Self::Forbidden => ClientError::api_error(403, format!("{}: forbidden", what)),
            Self::Conflict => ClientError::api_error(409, format!("{}: already exists", what)),
            Self::Gone => ClientError::api_error(410, format!("{}: too old resource version", what)),
            Self::Server => ClientError::api_error(500, format!("{}: internal error", what)),
        }
    }
}

/// How a scripted watch session ends once its events are delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchEnd {
    /// Stays open without further events
    Hang,
    /// Server closes the watch
    Close,
    /// The connection breaks mid-stream
    Break,
}

#[derive(Debug, Clone)]
enum WatchScript {
    Refuse(FakeFailure),
    Session {
        events: Vec<LifecycleEvent>,
        end: WatchEnd,
    },
}

#[derive(Debug, Clone)]
enum ReplicaLog {
    Output(Vec<u8>),
    OpenFails(FakeFailure),
    /// Yields the given bytes, then fails
    ReadFails(Vec<u8>),
}

#[derive(Default)]
struct FakeState {
    calls: Vec<FakeCall>,
    service_accounts: Vec<String>,
    create_failure: Option<FakeFailure>,
    resource_version: Option<String>,
    watch_scripts: VecDeque<WatchScript>,
    replicas: Vec<String>,
    logs: HashMap<String, ReplicaLog>,
    list_failure: Option<FakeFailure>,
    list_stalls: bool,
    delete_failure: Option<FakeFailure>,
}

/// Fake orchestrator for testing
#[derive(Clone)]
pub struct FakeOrchestrator {
    namespace: String,
    state: Arc<Mutex<FakeState>>,
}

impl Default for FakeOrchestrator {
    fn default() -> Self {
        Self::new("default")
    }
}

impl FakeOrchestrator {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            state: Arc::new(Mutex::new(FakeState {
                resource_version: Some("1".to_string()),
                ..Default::default()
            })),
        }
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut FakeState) -> T) -> T {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut state)
    }

    /// Get all recorded calls
    pub fn calls(&self) -> Vec<FakeCall> {
        self.with_state(|s| s.calls.clone())
    }

    /// Recorded watch checkpoints, in subscription order
    pub fn watch_checkpoints(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                FakeCall::Watch { checkpoint, .. } => Some(checkpoint),
                _ => None,
            })
            .collect()
    }

    /// Whether a delete call was made
    pub fn deleted(&self) -> bool {
        self.calls()
            .iter()
            .any(|call| matches!(call, FakeCall::Delete { .. }))
    }

    pub fn add_service_account(&self, name: &str) {
        self.with_state(|s| s.service_accounts.push(name.to_string()));
    }

    pub fn fail_create(&self, failure: FakeFailure) {
        self.with_state(|s| s.create_failure = Some(failure));
    }

    /// Resource version returned by create; `None` omits it
    pub fn set_created_resource_version(&self, version: Option<&str>) {
        self.with_state(|s| s.resource_version = version.map(str::to_string));
    }

    /// Queues a watch subscription that delivers `events`
    pub fn push_watch_session(&self, events: Vec<LifecycleEvent>, end: WatchEnd) {
        self.with_state(|s| {
            s.watch_scripts
                .push_back(WatchScript::Session { events, end })
        });
    }

    /// Queues a watch subscription that fails to open
    pub fn push_watch_refusal(&self, failure: FakeFailure) {
        self.with_state(|s| s.watch_scripts.push_back(WatchScript::Refuse(failure)));
    }

    pub fn add_replica(&self, name: &str, output: &[u8]) {
        self.with_state(|s| {
            s.replicas.push(name.to_string());
            s.logs
                .insert(name.to_string(), ReplicaLog::Output(output.to_vec()));
        });
    }

    pub fn add_replica_failing_open(&self, name: &str, failure: FakeFailure) {
        self.with_state(|s| {
            s.replicas.push(name.to_string());
            s.logs
                .insert(name.to_string(), ReplicaLog::OpenFails(failure));
        });
    }

    pub fn add_replica_failing_read(&self, name: &str, partial: &[u8]) {
        self.with_state(|s| {
            s.replicas.push(name.to_string());
            s.logs
                .insert(name.to_string(), ReplicaLog::ReadFails(partial.to_vec()));
        });
    }

    pub fn fail_list(&self, failure: FakeFailure) {
        self.with_state(|s| s.list_failure = Some(failure));
    }

    /// Listing replicas never completes
    pub fn stall_list(&self) {
        self.with_state(|s| s.list_stalls = true);
    }

    pub fn fail_delete(&self, failure: FakeFailure) {
        self.with_state(|s| s.delete_failure = Some(failure));
    }
}

#[async_trait]
impl Orchestrator for FakeOrchestrator {
    fn namespace(&self) -> &str {
        &self.namespace
    }

    async fn service_account_exists(&self, name: &str) -> Result<bool> {
        self.with_state(|s| {
            s.calls.push(FakeCall::ServiceAccountExists {
                name: name.to_string(),
            });
            Ok(s.service_accounts.iter().any(|sa| sa == name))
        })
    }

    async fn create(&self, spec: &WorkloadSpec) -> Result<CreatedWorkload> {
        self.with_state(|s| {
            s.calls.push(FakeCall::Create {
                name: spec.name().to_string(),
                labels: spec.labels().clone(),
            });
            if let Some(failure) = s.create_failure {
                return Err(failure.to_error("create job"));
            }
            Ok(CreatedWorkload {
                name: spec.name().to_string(),
                namespace: self.namespace.clone(),
                resource_version: s.resource_version.clone(),
            })
        })
    }

    async fn watch(&self, label_selector: &str, checkpoint: &Checkpoint) -> Result<EventStream> {
        let script = self.with_state(|s| {
            s.calls.push(FakeCall::Watch {
                label_selector: label_selector.to_string(),
                checkpoint: checkpoint.to_string(),
            });
            s.watch_scripts.pop_front()
        });

        match script {
            Some(WatchScript::Refuse(failure)) => Err(failure.to_error("watch jobs")),
            Some(WatchScript::Session { events, end }) => {
                let events = stream::iter(events.into_iter().map(Ok));
                Ok(match end {
                    WatchEnd::Hang => events.chain(stream::pending()).boxed(),
                    WatchEnd::Close => events.boxed(),
                    WatchEnd::Break => events
                        .chain(stream::once(async {
                            Err(FakeFailure::Transport.to_error("watch jobs"))
                        }))
                        .boxed(),
                })
            }
            // Out of script: an idle connection
            None => Ok(stream::pending().boxed()),
        }
    }

    async fn list_replicas(&self, label_selector: &str) -> Result<Vec<String>> {
        let (stalls, result) = self.with_state(|s| {
            s.calls.push(FakeCall::ListReplicas {
                label_selector: label_selector.to_string(),
            });
            let result = match s.list_failure {
                Some(failure) => Err(failure.to_error("list pods")),
                None => Ok(s.replicas.clone()),
            };
            (s.list_stalls, result)
        });

        if stalls {
            std::future::pending::<()>().await;
        }
        result
    }

    async fn log_stream(&self, replica: &str) -> Result<LogStream> {
        let log = self.with_state(|s| {
            s.calls.push(FakeCall::LogStream {
                replica: replica.to_string(),
            });
            s.logs.get(replica).cloned()
        });

        match log {
            Some(ReplicaLog::Output(bytes)) => Ok(Box::pin(Cursor::new(bytes))),
            Some(ReplicaLog::OpenFails(failure)) => Err(failure.to_error("get pod logs")),
            Some(ReplicaLog::ReadFails(partial)) => Ok(Box::pin(FailingReader { partial })),
            None => Err(FakeFailure::NotFound.to_error(replica)),
        }
    }

    async fn delete(&self, name: &str) -> Result<()> {
        self.with_state(|s| {
            s.calls.push(FakeCall::Delete {
                name: name.to_string(),
            });
            match s.delete_failure {
                Some(failure) => Err(failure.to_error("delete job")),
                None => Ok(()),
            }
        })
    }
}

/// Reader that yields some bytes and then breaks
struct FailingReader {
    /// Bytes not yet handed out
    partial: Vec<u8>,
}

impl AsyncRead for FailingReader {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut [u8],
    ) -> Poll<io::Result<usize>> {
        if self.partial.is_empty() || buf.is_empty() {
            return Poll::Ready(Err(io::Error::new(
                io::ErrorKind::ConnectionReset,
                "log stream reset",
            )));
        }

        let n = self.partial.len().min(buf.len());
        buf[..n].copy_from_slice(&self.partial[..n]);
        self.partial.drain(..n);
        Poll::Ready(Ok(n))
    }
}

/// Builds a Job watch payload
///
/// # Arguments
/// * `name` - Job name
/// * `resource_version` - Resource version stamped in the metadata
/// * `conditions` - `(type, message)` pairs, all with status `True`
pub fn job_object(name: &str, resource_version: &str, conditions: &[(&str, &str)]) -> RawObject {
    let conditions = conditions
        .iter()
        .map(|(type_, message)| JobCondition {
            type_: type_.to_string(),
            status: "True".to_string(),
            message: Some(message.to_string()),
            ..Default::default()
        })
        .collect::<Vec<_>>();

    RawObject::from_job(&Job {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            resource_version: Some(resource_version.to_string()),
            ..Default::default()
        },
        status: Some(JobStatus {
            conditions: if conditions.is_empty() { None } else { Some(conditions) },
            ..Default::default()
        }),
        ..Default::default()
    })
}
