//! Log collection service
//!
//! Reads the output of every replica of a finished run, one replica at a
//! time, into a single timestamped report.

use chrono::Utc;
use futures_util::io::AsyncReadExt;
use runjob_client::Orchestrator;
use runjob_core::domain::report::LogReport;
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::{ConsistencyError, LogRetrievalError};

/// Result of a collection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogCollection {
    pub report: LogReport,
    /// Set when the report is complete but the cluster state was unexpected
    pub degraded: Option<ConsistencyError>,
}

/// Collects replica output through an [`Orchestrator`]
#[derive(Clone)]
pub struct LogCollector {
    orchestrator: Arc<dyn Orchestrator>,
}

impl LogCollector {
    pub fn new(orchestrator: Arc<dyn Orchestrator>) -> Self {
        Self { orchestrator }
    }

    /// Lists the replicas matching `label_selector` and concatenates their
    /// output in listing order
    ///
    /// # Arguments
    /// * `label_selector` - Selector of the run's replicas
    ///
    /// # Returns
    /// The report, possibly with an empty body when no replica exists
    ///
    /// # Errors
    /// `LogRetrievalError` if listing fails or any single replica cannot be
    /// opened or read; no partial report is returned.
    pub async fn collect(&self, label_selector: &str) -> Result<LogCollection, LogRetrievalError> {
        let replicas = self
            .orchestrator
            .list_replicas(label_selector)
            .await
            .map_err(LogRetrievalError::List)?;

        let degraded = replicas.is_empty().then(|| ConsistencyError::NoReplicas {
            selector: label_selector.to_string(),
        });

        let mut body = Vec::new();
        for replica in &replicas {
            let mut stream = self
                .orchestrator
                .log_stream(replica)
                .await
                .map_err(|source| LogRetrievalError::Open {
                    replica: replica.clone(),
                    source,
                })?;

            let read = stream
                .read_to_end(&mut body)
                .await
                .map_err(|source| LogRetrievalError::Read {
                    replica: replica.clone(),
                    source,
                })?;

            debug!("Read {} bytes of output from replica {}", read, replica);
        }

        info!(
            "Collected {} bytes of output from {} replica(s)",
            body.len(),
            replicas.len()
        );

        Ok(LogCollection {
            report: LogReport::from_bytes(Utc::now(), &body),
            degraded,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use runjob_client::fake::{FakeCall, FakeFailure, FakeOrchestrator};

    fn collector(fake: &FakeOrchestrator) -> LogCollector {
        LogCollector::new(Arc::new(fake.clone()))
    }

    #[tokio::test]
    async fn test_concatenates_in_listing_order() {
        let fake = FakeOrchestrator::default();
        fake.add_replica("job1-a", b"a");
        fake.add_replica("job1-b", b"b");
        fake.add_replica("job1-c", b"c");

        let collection = collector(&fake).collect("run-id=x").await.unwrap();

        assert_eq!(collection.report.body, "abc");
        assert!(collection.degraded.is_none());

        let opened: Vec<_> = fake
            .calls()
            .into_iter()
            .filter_map(|call| match call {
                FakeCall::LogStream { replica } => Some(replica),
                _ => None,
            })
            .collect();
        assert_eq!(opened, vec!["job1-a", "job1-b", "job1-c"]);
    }

    #[tokio::test]
    async fn test_zero_replicas_is_degraded_not_fatal() {
        let fake = FakeOrchestrator::default();

        let collection = collector(&fake).collect("run-id=x").await.unwrap();

        assert_eq!(collection.report.body, "");
        assert_eq!(
            collection.report.render(),
            collection.report.header()
        );
        assert_eq!(
            collection.degraded,
            Some(ConsistencyError::NoReplicas {
                selector: "run-id=x".to_string()
            })
        );
    }

    #[tokio::test]
    async fn test_open_failure_voids_report() {
        let fake = FakeOrchestrator::default();
        fake.add_replica("job1-a", b"a");
        fake.add_replica_failing_open("job1-b", FakeFailure::Server);
        fake.add_replica("job1-c", b"c");

        let err = collector(&fake).collect("run-id=x").await.unwrap_err();

        assert!(matches!(err, LogRetrievalError::Open { ref replica, .. } if replica == "job1-b"));
        assert!(!fake.calls().contains(&FakeCall::LogStream {
            replica: "job1-c".to_string()
        }));
    }

    #[tokio::test]
    async fn test_read_failure_voids_report() {
        let fake = FakeOrchestrator::default();
        fake.add_replica_failing_read("job1-a", b"partial");

        let err = collector(&fake).collect("run-id=x").await.unwrap_err();

        assert!(matches!(err, LogRetrievalError::Read { ref replica, .. } if replica == "job1-a"));
    }

    #[tokio::test]
    async fn test_list_failure() {
        let fake = FakeOrchestrator::default();
        fake.fail_list(FakeFailure::Forbidden);

        let err = collector(&fake).collect("run-id=x").await.unwrap_err();

        assert!(matches!(err, LogRetrievalError::List(ref e) if e.is_client_error()));
    }
}
