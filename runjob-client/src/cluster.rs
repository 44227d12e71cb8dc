//! Kubernetes-backed orchestrator

use async_trait::async_trait;
use futures_util::{StreamExt, TryStreamExt};
use k8s_openapi::api::batch::v1::Job;
use k8s_openapi::api::core::v1::{Pod, ServiceAccount};
use kube::api::{
    Api, ApiResource, DeleteParams, DynamicObject, ListParams, LogParams, PostParams, WatchEvent,
    WatchParams,
};
use kube::{Client, ResourceExt};
use runjob_core::domain::event::{Checkpoint, LifecycleEvent, RawObject};
use runjob_core::domain::workload::WorkloadSpec;
use tracing::{debug, info};

use crate::error::{ClientError, Result};
use crate::{CreatedWorkload, EventStream, LogStream, Orchestrator};

/// Server-side timeout of a single watch request, in seconds
///
/// Must stay below the API server's own limit (295s); the stream then
/// closes normally and the runner resubscribes.
const WATCH_TIMEOUT_SECS: u32 = 290;

/// Orchestrator talking to a real cluster, scoped to one namespace
#[derive(Clone)]
pub struct KubeOrchestrator {
    namespace: String,
    jobs: Api<Job>,
    /// Jobs as untyped objects, so watch payloads reach the classifier raw
    job_objects: Api<DynamicObject>,
    pods: Api<Pod>,
    service_accounts: Api<ServiceAccount>,
}

impl KubeOrchestrator {
    /// Creates an orchestrator for `namespace`
    ///
    /// # Arguments
    /// * `client` - An authenticated client, see [`crate::connect`]
    /// * `namespace` - Namespace every call is scoped to
    pub fn new(client: Client, namespace: impl Into<String>) -> Self {
        let namespace = namespace.into();
        let job_resource = ApiResource::erase::<Job>(&());

        Self {
            jobs: Api::namespaced(client.clone(), &namespace),
            job_objects: Api::namespaced_with(client.clone(), &namespace, &job_resource),
            pods: Api::namespaced(client.clone(), &namespace),
            service_accounts: Api::namespaced(client, &namespace),
            namespace,
        }
    }
}

#[async_trait]
impl Orchestrator for KubeOrchestrator {
    fn namespace(&self) -> &str {
        &self.namespace
    }

    async fn service_account_exists(&self, name: &str) -> Result<bool> {
        let account = self.service_accounts.get_opt(name).await?;
        Ok(account.is_some())
    }

    async fn create(&self, spec: &WorkloadSpec) -> Result<CreatedWorkload> {
        let job = self
            .jobs
            .create(&PostParams::default(), &spec.to_job())
            .await?;

        info!(
            "Created job {} in namespace {} (run {})",
            job.name_any(),
            self.namespace,
            spec.run_id()
        );

        Ok(CreatedWorkload {
            name: job.name_any(),
            namespace: job.namespace().unwrap_or_else(|| self.namespace.clone()),
            resource_version: job.resource_version(),
        })
    }

    async fn watch(&self, label_selector: &str, checkpoint: &Checkpoint) -> Result<EventStream> {
        let params = WatchParams::default()
            .labels(label_selector)
            .timeout(WATCH_TIMEOUT_SECS);

        debug!(
            "Opening watch on jobs ({}) from resource version {}",
            label_selector, checkpoint
        );

        let stream = self.job_objects.watch(&params, checkpoint.as_str()).await?;

        Ok(stream
            .map_err(ClientError::from)
            .map(|item| item.and_then(lifecycle_event))
            .boxed())
    }

    async fn list_replicas(&self, label_selector: &str) -> Result<Vec<String>> {
        let pods = self
            .pods
            .list(&ListParams::default().labels(label_selector))
            .await?;

        Ok(pods.items.iter().map(|pod| pod.name_any()).collect())
    }

    async fn log_stream(&self, replica: &str) -> Result<LogStream> {
        let stream = self.pods.log_stream(replica, &LogParams::default()).await?;
        Ok(Box::pin(stream))
    }

    async fn delete(&self, name: &str) -> Result<()> {
        self.jobs.delete(name, &DeleteParams::background()).await?;
        Ok(())
    }
}

/// Converts a kube watch event into the runner's event type
fn lifecycle_event(event: WatchEvent<DynamicObject>) -> Result<LifecycleEvent> {
    let raw = |obj: DynamicObject| {
        serde_json::to_value(obj)
            .map(RawObject::new)
            .map_err(|e| ClientError::ParseError(format!("Failed to encode watch object: {}", e)))
    };

    Ok(match event {
        WatchEvent::Added(obj) => LifecycleEvent::Added(raw(obj)?),
        WatchEvent::Modified(obj) => LifecycleEvent::Modified(raw(obj)?),
        WatchEvent::Deleted(obj) => LifecycleEvent::Deleted(raw(obj)?),
        WatchEvent::Bookmark(bookmark) => LifecycleEvent::Bookmark {
            resource_version: bookmark.metadata.resource_version,
        },
        WatchEvent::Error(status) => LifecycleEvent::Error(
            serde_json::to_value(status)
                .map_err(|e| ClientError::ParseError(format!("Failed to encode watch error: {}", e)))?,
        ),
    })
}
