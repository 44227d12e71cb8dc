//! Teardown sequencer
//!
//! Consumes watch events one at a time. The first terminal status drives a
//! fixed sequence: collect logs, delete the Job, write the report, stop the
//! stream. The sequence runs at most once; later events are ignored.

use runjob_client::Orchestrator;
use runjob_core::domain::event::LifecycleEvent;
use runjob_core::domain::status::{WorkloadStatus, classify};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::error::{ConsistencyError, RunContext, RunError};
use crate::service::{LogCollector, ProgressReporter, ReportSink, status_line};
use crate::stream::StreamHandle;

/// Position of the sequencer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeardownState {
    Watching,
    Classifying,
    CollectingLogs,
    Deleting,
    Reporting,
    /// Teardown finished or failed; no further action is taken
    Stopped,
}

/// Drives the cleanup of one run
pub struct TeardownSequencer {
    orchestrator: Arc<dyn Orchestrator>,
    collector: LogCollector,
    sink: Arc<dyn ReportSink>,
    progress: Arc<dyn ProgressReporter>,
    stream: StreamHandle,
    context: RunContext,
    label_selector: String,
    state: TeardownState,
    last_status: Option<WorkloadStatus>,
    degraded: Option<ConsistencyError>,
}

impl TeardownSequencer {
    /// Creates a sequencer in the `Watching` state
    ///
    /// # Arguments
    /// * `orchestrator` - Cluster holding the Job
    /// * `sink` - Destination of the report
    /// * `progress` - Operator notifications
    /// * `stream` - Stopped once teardown completes
    /// * `context` - Resources of the run
    /// * `label_selector` - Selector of the run's replicas
    pub fn new(
        orchestrator: Arc<dyn Orchestrator>,
        sink: Arc<dyn ReportSink>,
        progress: Arc<dyn ProgressReporter>,
        stream: StreamHandle,
        context: RunContext,
        label_selector: String,
    ) -> Self {
        Self {
            collector: LogCollector::new(Arc::clone(&orchestrator)),
            orchestrator,
            sink,
            progress,
            stream,
            context,
            label_selector,
            state: TeardownState::Watching,
            last_status: None,
            degraded: None,
        }
    }

    pub fn state(&self) -> TeardownState {
        self.state
    }

    /// Last status classified from an event, terminal or not
    pub fn last_status(&self) -> Option<&WorkloadStatus> {
        self.last_status.as_ref()
    }

    /// Unexpected cluster state met while collecting logs
    pub fn degraded(&self) -> Option<&ConsistencyError> {
        self.degraded.as_ref()
    }

    /// Feeds one event
    ///
    /// # Returns
    /// `Some(status)` once teardown has completed, `None` while watching or
    /// when the event is ignored
    ///
    /// # Errors
    /// A fatal `RunError` for an undecodable payload or a failed teardown
    /// step; the sequencer is `Stopped` afterwards.
    pub async fn observe(&mut self, event: &LifecycleEvent) -> Result<Option<WorkloadStatus>, RunError> {
        if self.state != TeardownState::Watching {
            debug!(
                "Ignoring {} event, teardown already {:?}",
                event.type_name(),
                self.state
            );
            return Ok(None);
        }

        let status = match classify(event) {
            Ok(Some(status)) => status,
            Ok(None) => {
                if let LifecycleEvent::Deleted(_) = event {
                    warn!("Job {} was deleted before it finished", self.context.name);
                }
                return Ok(None);
            }
            Err(source) => {
                self.state = TeardownState::Stopped;
                error!("Undecodable {} event for {}: {}", event.type_name(), self.context, source);
                return Err(RunError::Protocol {
                    context: self.context.clone(),
                    source,
                });
            }
        };

        self.last_status = Some(status.clone());
        if !status.terminal {
            self.progress.tick();
            return Ok(None);
        }

        self.state = TeardownState::Classifying;
        let result = self.teardown(status).await;
        self.state = TeardownState::Stopped;
        result.map(Some)
    }

    async fn teardown(&mut self, status: WorkloadStatus) -> Result<WorkloadStatus, RunError> {
        let line = status_line(&self.context, &status);
        info!("{}", line);
        self.progress.terminal(&self.context, &status);

        // Logs first: deleting the Job garbage collects its pods
        self.state = TeardownState::CollectingLogs;
        let collected = self.collector.collect(&self.label_selector).await;
        match &collected {
            Ok(collection) => {
                if let Some(err) = &collection.degraded {
                    warn!("{} ({})", err, self.context);
                    self.degraded = Some(err.clone());
                }
            }
            Err(e) => error!("Log retrieval failed for {}: {}", self.context, e),
        }

        self.state = TeardownState::Deleting;
        if let Err(source) = self
            .orchestrator
            .delete(&self.context.name)
            .await
        {
            error!(
                "Failed to delete job {} in namespace {}, it must be removed manually: {}",
                self.context.name, self.context.namespace, source
            );
            return Err(RunError::Delete {
                context: self.context.clone(),
                status,
                source,
            });
        }
        info!("Deleted job {}", self.context.name);
        self.progress.deleted(&self.context);

        let collection = collected.map_err(|source| RunError::LogRetrieval {
            context: self.context.clone(),
            status: status.clone(),
            source,
        })?;

        self.state = TeardownState::Reporting;
        let contents = format!("{}\n{}", line, collection.report.render());
        if let Err(source) = self.sink.write(&contents).await {
            error!("Failed to write report for {}: {}", self.context, source);
            return Err(RunError::Report {
                context: self.context.clone(),
                status,
                source,
            });
        }
        if let Some(path) = self.sink.path() {
            self.progress.report_written(path);
        }

        self.state = TeardownState::Stopped;
        self.stream.stop();

        Ok(status)
    }
}
