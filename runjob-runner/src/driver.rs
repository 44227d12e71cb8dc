//! Run driver
//!
//! Submits the Job, follows it through the event stream and hands every
//! event to the teardown sequencer until the run ends or the caller cancels.

use runjob_client::Orchestrator;
use runjob_core::ValidationError;
use runjob_core::domain::event::Checkpoint;
use runjob_core::domain::status::WorkloadStatus;
use runjob_core::domain::workload::WorkloadSpec;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{RunContext, RunError, StreamError};
use crate::service::{ProgressReporter, ReportSink};
use crate::stream::ResilientEventStream;
use crate::teardown::TeardownSequencer;

/// How a run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// The Job completed and was torn down
    Succeeded(WorkloadStatus),
    /// The Job failed and was torn down
    Failed(WorkloadStatus),
    /// The caller cancelled; carries the last classified status, if any
    Interrupted(Option<WorkloadStatus>),
}

impl RunOutcome {
    fn from_status(status: WorkloadStatus) -> Self {
        if status.failed {
            Self::Failed(status)
        } else {
            Self::Succeeded(status)
        }
    }
}

/// Coordinates a single run
pub struct RunDriver {
    orchestrator: Arc<dyn Orchestrator>,
    config: Config,
    sink: Arc<dyn ReportSink>,
    progress: Arc<dyn ProgressReporter>,
}

impl RunDriver {
    pub fn new(
        orchestrator: Arc<dyn Orchestrator>,
        config: Config,
        sink: Arc<dyn ReportSink>,
        progress: Arc<dyn ProgressReporter>,
    ) -> Self {
        Self {
            orchestrator,
            config,
            sink,
            progress,
        }
    }

    /// Runs `spec` to completion
    ///
    /// # Arguments
    /// * `spec` - The Job to submit, exactly once
    /// * `cancel` - Caller's cancellation scope; firing it stops the stream
    ///   and abandons any in-flight call, without deleting the Job
    ///
    /// # Errors
    /// Any fatal `RunError`; transient watch interruptions never surface.
    pub async fn run(&self, spec: WorkloadSpec, cancel: CancellationToken) -> Result<RunOutcome, RunError> {
        let context = RunContext::from_spec(&spec);

        if let Some(account) = spec.service_account() {
            let lookup = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(RunOutcome::Interrupted(None)),
                lookup = self.orchestrator.service_account_exists(account) => lookup,
            };

            match lookup {
                Ok(true) => debug!("Service account {} found", account),
                Ok(false) => {
                    return Err(RunError::Validation(ValidationError::UnknownServiceAccount {
                        name: account.to_string(),
                        namespace: context.namespace.clone(),
                    }));
                }
                Err(source) => return Err(RunError::ServiceAccountLookup { context, source }),
            }
        }

        let created = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(RunOutcome::Interrupted(None)),
            created = self.orchestrator.create(&spec) => created,
        }
        .map_err(|source| RunError::Create {
            context: context.clone(),
            source,
        })?;

        info!("Created job {} ({})", created.name, context);
        self.progress.created(&context);

        let checkpoint = created
            .resource_version
            .map(Checkpoint::new)
            .unwrap_or_else(Checkpoint::any);

        let label_selector = spec.run_id().label_selector();
        let mut stream = ResilientEventStream::start(
            Arc::clone(&self.orchestrator),
            label_selector.clone(),
            checkpoint,
            &self.config,
        );

        // Relays the caller's cancellation to the stream
        let forwarder = tokio::spawn({
            let cancel = cancel.clone();
            let handle = stream.handle();
            async move {
                cancel.cancelled().await;
                handle.stop();
            }
        });

        let mut sequencer = TeardownSequencer::new(
            Arc::clone(&self.orchestrator),
            Arc::clone(&self.sink),
            Arc::clone(&self.progress),
            stream.handle(),
            context.clone(),
            label_selector,
        );

        let result = loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                item = stream.next() => Some(item),
            };

            let event = match next {
                None | Some(None) if cancel.is_cancelled() => {
                    break Ok(RunOutcome::Interrupted(sequencer.last_status().cloned()));
                }
                None | Some(None) => {
                    break Err(RunError::Stream {
                        context: context.clone(),
                        source: StreamError::Closed,
                    });
                }
                Some(Some(Err(source))) => {
                    break Err(RunError::Stream {
                        context: context.clone(),
                        source,
                    });
                }
                Some(Some(Ok(event))) => event,
            };

            debug!("Received {} event", event.type_name());

            let observed = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                observed = sequencer.observe(&event) => Some(observed),
            };

            match observed {
                None => break Ok(RunOutcome::Interrupted(sequencer.last_status().cloned())),
                Some(Ok(None)) => continue,
                Some(Ok(Some(status))) => break Ok(RunOutcome::from_status(status)),
                Some(Err(e)) => break Err(e),
            }
        };

        forwarder.abort();
        stream.shutdown().await;

        match &result {
            Ok(RunOutcome::Interrupted(_)) => {
                warn!("Run interrupted, job {} left in namespace {}", context.name, context.namespace);
            }
            Ok(outcome) => debug!("Run finished: {:?}", outcome),
            Err(e) => debug!("Run failed at step {}: {}", e.step(), e),
        }

        result
    }
}
