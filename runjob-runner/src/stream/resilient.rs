//! Resubscribing watch stream
//!
//! A watch on the API server is a single HTTP response that ends on its own
//! (server timeout) or breaks (network, API server restart). The
//! [`ResilientEventStream`] hides both: a dedicated task owns the checkpoint,
//! resubscribes with capped exponential backoff, and forwards every event on
//! one bounded channel. Only unrecoverable failures reach the consumer.

use futures_util::StreamExt;
use runjob_client::{EventStream, Orchestrator};
use runjob_core::domain::event::{Checkpoint, ErrorStatus, LifecycleEvent};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{Config, MAX_EVENT_BUFFER};
use crate::error::StreamError;

/// Item delivered to the consumer
pub type StreamItem = Result<LifecycleEvent, StreamError>;

/// Subscription state of the stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// A watch is open
    Connected,
    /// No watch is open; `attempt` counts subscriptions since the last
    /// successful one, 0 being the initial subscription
    Reconnecting { attempt: u32 },
    /// Stopped by the owner or by an unrecoverable failure
    Stopped,
}

/// Stops a [`ResilientEventStream`] from any task
///
/// Stopping is idempotent.
#[derive(Debug, Clone, Default)]
pub struct StreamHandle {
    token: CancellationToken,
}

impl StreamHandle {
    pub fn stop(&self) {
        if !self.token.is_cancelled() {
            debug!("Stopping event stream");
        }
        self.token.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Event stream that survives watch interruptions
pub struct ResilientEventStream {
    events: mpsc::Receiver<StreamItem>,
    handle: StreamHandle,
    state: watch::Receiver<StreamState>,
    task: Option<JoinHandle<()>>,
}

impl ResilientEventStream {
    /// Starts watching on a dedicated task
    ///
    /// # Arguments
    /// * `orchestrator` - Cluster the watch is opened against
    /// * `label_selector` - Filter for the watched Jobs
    /// * `checkpoint` - Resource version to start after
    /// * `config` - Backoff and buffering settings
    pub fn start(
        orchestrator: Arc<dyn Orchestrator>,
        label_selector: String,
        checkpoint: Checkpoint,
        config: &Config,
    ) -> Self {
        // Out-of-range capacities panic in the channel constructor
        let (tx, events) = mpsc::channel(config.event_buffer.clamp(1, MAX_EVENT_BUFFER));
        let (state_tx, state) = watch::channel(StreamState::Reconnecting { attempt: 0 });
        let handle = StreamHandle::default();

        let receive_loop = ReceiveLoop {
            orchestrator,
            label_selector,
            checkpoint,
            initial_delay: config.reconnect_initial,
            max_delay: config.reconnect_max,
            tx,
            state: state_tx,
            token: handle.token.clone(),
        };

        Self {
            events,
            handle,
            state,
            task: Some(tokio::spawn(receive_loop.run())),
        }
    }

    /// Waits for the next event
    ///
    /// Returns `None` once the stream is stopped, even if events are still
    /// buffered, and after an unrecoverable error has been delivered.
    pub async fn next(&mut self) -> Option<StreamItem> {
        if self.handle.is_stopped() {
            self.events.close();
            return None;
        }

        tokio::select! {
            biased;
            _ = self.handle.token.cancelled() => {}
            item = self.events.recv() => return item,
        }

        self.events.close();
        None
    }

    pub fn handle(&self) -> StreamHandle {
        self.handle.clone()
    }

    pub fn state(&self) -> StreamState {
        *self.state.borrow()
    }

    /// Receiver notified on every state change
    pub fn state_watcher(&self) -> watch::Receiver<StreamState> {
        self.state.clone()
    }

    /// Stops the stream and waits for the receive task to release its
    /// subscription
    pub async fn shutdown(mut self) {
        self.handle.stop();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!("Event stream task ended abnormally: {}", e);
            }
        }
    }
}

impl Drop for ResilientEventStream {
    fn drop(&mut self) {
        self.handle.stop();
    }
}

/// What the receive loop does after one subscription ends
enum Flow {
    Resubscribe(String),
    Fatal(StreamError),
    Stop,
}

struct ReceiveLoop {
    orchestrator: Arc<dyn Orchestrator>,
    label_selector: String,
    checkpoint: Checkpoint,
    initial_delay: Duration,
    max_delay: Duration,
    tx: mpsc::Sender<StreamItem>,
    state: watch::Sender<StreamState>,
    token: CancellationToken,
}

impl ReceiveLoop {
    async fn run(mut self) {
        let mut attempt = 0;
        let mut delay = self.initial_delay;

        loop {
            let subscribed = tokio::select! {
                biased;
                _ = self.token.cancelled() => break,
                result = self.orchestrator.watch(&self.label_selector, &self.checkpoint) => result,
            };

            let reason = match subscribed {
                Ok(events) => {
                    if attempt > 0 {
                        info!(
                            "Watch re-established from resource version {} after {} attempt(s)",
                            self.checkpoint, attempt
                        );
                    }
                    attempt = 0;
                    delay = self.initial_delay;
                    self.state.send_replace(StreamState::Connected);

                    match self.consume(events).await {
                        Flow::Resubscribe(reason) => reason,
                        Flow::Fatal(e) => {
                            warn!("Event stream failed: {}", e);
                            self.deliver(Err(e)).await;
                            break;
                        }
                        Flow::Stop => break,
                    }
                }
                Err(e) if e.is_unrecoverable_watch() => {
                    warn!("Watch on {} cannot be opened: {}", self.label_selector, e);
                    self.deliver(Err(StreamError::Subscription(e))).await;
                    break;
                }
                Err(e) => e.to_string(),
            };

            attempt += 1;
            self.state.send_replace(StreamState::Reconnecting { attempt });
            warn!(
                "Watch interrupted ({}), resubscribing from resource version {} in {} ms",
                reason,
                self.checkpoint,
                delay.as_millis()
            );

            tokio::select! {
                biased;
                _ = self.token.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }

            // Exponential backoff with cap
            delay = (delay * 2).min(self.max_delay);
        }

        self.state.send_replace(StreamState::Stopped);
        debug!("Event stream stopped at resource version {}", self.checkpoint);
    }

    /// Forwards the events of one subscription until it ends
    async fn consume(&mut self, mut events: EventStream) -> Flow {
        loop {
            let item = tokio::select! {
                biased;
                _ = self.token.cancelled() => return Flow::Stop,
                item = events.next() => item,
            };

            let event = match item {
                None => return Flow::Resubscribe("closed by server".to_string()),
                Some(Err(e)) if e.is_unrecoverable_watch() => {
                    return Flow::Fatal(StreamError::Subscription(e));
                }
                Some(Err(e)) => return Flow::Resubscribe(e.to_string()),
                Some(Ok(event)) => event,
            };

            if let Some(version) = event.resource_version() {
                self.checkpoint = Checkpoint::new(version);
            }

            let after = match &event {
                LifecycleEvent::Error(payload) => match ErrorStatus::parse(payload) {
                    Some(status) if status.is_expired() => Some(Flow::Fatal(StreamError::Expired(status))),
                    Some(status) => Some(Flow::Resubscribe(format!("error event {}", status))),
                    None => {
                        warn!("Ignoring unparseable watch error event: {}", payload);
                        None
                    }
                },
                _ => None,
            };

            if !self.deliver(Ok(event)).await {
                return Flow::Stop;
            }

            if let Some(flow) = after {
                return flow;
            }
        }
    }

    /// Returns false when the consumer is gone or the stream was stopped
    async fn deliver(&self, item: StreamItem) -> bool {
        tokio::select! {
            biased;
            _ = self.token.cancelled() => false,
            sent = self.tx.send(item) => sent.is_ok(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use runjob_client::fake::{FakeFailure, FakeOrchestrator, WatchEnd, job_object};
    use serde_json::json;

    const SELECTOR: &str = "run-id=test";

    fn config() -> Config {
        Config::new(Duration::from_millis(1), Duration::from_millis(4), 16)
    }

    fn start(fake: &FakeOrchestrator, checkpoint: &str) -> ResilientEventStream {
        ResilientEventStream::start(
            Arc::new(fake.clone()),
            SELECTOR.to_string(),
            Checkpoint::new(checkpoint),
            &config(),
        )
    }

    fn modified(version: &str) -> LifecycleEvent {
        LifecycleEvent::Modified(job_object("job1", version, &[]))
    }

    async fn next_event(stream: &mut ResilientEventStream) -> LifecycleEvent {
        match stream.next().await {
            Some(Ok(event)) => event,
            other => panic!("expected an event, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_reconnect_resumes_from_last_checkpoint() {
        let fake = FakeOrchestrator::default();
        fake.push_watch_session(vec![modified("2"), modified("3")], WatchEnd::Break);
        fake.push_watch_session(vec![modified("4")], WatchEnd::Hang);

        let mut stream = start(&fake, "1");

        let versions = vec![
            next_event(&mut stream).await.resource_version().map(str::to_string),
            next_event(&mut stream).await.resource_version().map(str::to_string),
            next_event(&mut stream).await.resource_version().map(str::to_string),
        ];

        assert_eq!(
            versions,
            vec![Some("2".to_string()), Some("3".to_string()), Some("4".to_string())]
        );
        assert_eq!(fake.watch_checkpoints(), vec!["1", "3"]);
        stream.shutdown().await;
    }

    #[tokio::test]
    async fn test_server_close_and_transient_refusal_resubscribe() {
        let fake = FakeOrchestrator::default();
        fake.push_watch_session(vec![modified("5")], WatchEnd::Close);
        fake.push_watch_refusal(FakeFailure::Server);
        fake.push_watch_refusal(FakeFailure::Transport);
        fake.push_watch_session(vec![modified("6")], WatchEnd::Hang);

        let mut stream = start(&fake, "1");

        assert_eq!(next_event(&mut stream).await.resource_version(), Some("5"));
        assert_eq!(next_event(&mut stream).await.resource_version(), Some("6"));
        assert_eq!(fake.watch_checkpoints(), vec!["1", "5", "5", "5"]);
        assert_eq!(stream.state(), StreamState::Connected);
        stream.shutdown().await;
    }

    #[tokio::test]
    async fn test_bookmark_advances_checkpoint() {
        let fake = FakeOrchestrator::default();
        fake.push_watch_session(
            vec![LifecycleEvent::Bookmark {
                resource_version: "42".to_string(),
            }],
            WatchEnd::Break,
        );
        fake.push_watch_session(vec![modified("43")], WatchEnd::Hang);

        let mut stream = start(&fake, "1");

        next_event(&mut stream).await;
        next_event(&mut stream).await;
        assert_eq!(fake.watch_checkpoints(), vec!["1", "42"]);
        stream.shutdown().await;
    }

    #[tokio::test]
    async fn test_unrecoverable_refusal_is_fatal() {
        let fake = FakeOrchestrator::default();
        fake.push_watch_refusal(FakeFailure::NotFound);

        let mut stream = start(&fake, "1");

        match stream.next().await {
            Some(Err(StreamError::Subscription(e))) => assert!(e.is_not_found()),
            other => panic!("expected a subscription error, got {:?}", other),
        }
        assert!(stream.next().await.is_none());

        let mut state = stream.state_watcher();
        state
            .wait_for(|s| *s == StreamState::Stopped)
            .await
            .unwrap();
        assert_eq!(fake.watch_checkpoints().len(), 1);
    }

    #[tokio::test]
    async fn test_expired_error_event_is_forwarded_then_fatal() {
        let fake = FakeOrchestrator::default();
        let expired = json!({
            "kind": "Status",
            "status": "Failure",
            "reason": "Expired",
            "message": "too old resource version",
            "code": 410
        });
        fake.push_watch_session(vec![LifecycleEvent::Error(expired.clone())], WatchEnd::Hang);

        let mut stream = start(&fake, "1");

        assert_eq!(next_event(&mut stream).await, LifecycleEvent::Error(expired));
        assert!(matches!(
            stream.next().await,
            Some(Err(StreamError::Expired(status))) if status.code == 410
        ));
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_server_error_event_resubscribes() {
        let fake = FakeOrchestrator::default();
        let internal = json!({ "status": "Failure", "message": "etcd leader changed", "code": 500 });
        fake.push_watch_session(
            vec![modified("8"), LifecycleEvent::Error(internal)],
            WatchEnd::Hang,
        );
        fake.push_watch_session(vec![modified("9")], WatchEnd::Hang);

        let mut stream = start(&fake, "1");

        next_event(&mut stream).await;
        assert!(matches!(next_event(&mut stream).await, LifecycleEvent::Error(_)));
        assert_eq!(next_event(&mut stream).await.resource_version(), Some("9"));
        assert_eq!(fake.watch_checkpoints(), vec!["1", "8"]);
        stream.shutdown().await;
    }

    #[tokio::test]
    async fn test_unparseable_error_event_is_skipped_over() {
        let fake = FakeOrchestrator::default();
        fake.push_watch_session(
            vec![
                LifecycleEvent::Error(json!("garbage")),
                modified("3"),
            ],
            WatchEnd::Hang,
        );

        let mut stream = start(&fake, "1");

        assert!(matches!(next_event(&mut stream).await, LifecycleEvent::Error(_)));
        assert_eq!(next_event(&mut stream).await.resource_version(), Some("3"));
        assert_eq!(fake.watch_checkpoints().len(), 1);
        stream.shutdown().await;
    }

    #[tokio::test]
    async fn test_out_of_range_buffer_is_clamped() {
        let fake = FakeOrchestrator::default();
        fake.push_watch_session(vec![modified("2")], WatchEnd::Hang);

        let mut stream = ResilientEventStream::start(
            Arc::new(fake.clone()),
            SELECTOR.to_string(),
            Checkpoint::new("1"),
            &Config::new(Duration::from_millis(1), Duration::from_millis(4), usize::MAX),
        );

        assert_eq!(next_event(&mut stream).await.resource_version(), Some("2"));
        stream.handle().stop();
        stream.shutdown().await;
    }

    #[tokio::test]
    async fn test_stop_closes_stream_and_is_idempotent() {
        let fake = FakeOrchestrator::default();
        fake.push_watch_session(vec![modified("2"), modified("3")], WatchEnd::Hang);

        let mut stream = start(&fake, "1");
        next_event(&mut stream).await;

        let handle = stream.handle();
        handle.stop();
        handle.stop();

        assert!(stream.next().await.is_none());
        assert!(stream.next().await.is_none());

        let mut state = stream.state_watcher();
        state
            .wait_for(|s| *s == StreamState::Stopped)
            .await
            .unwrap();
        stream.shutdown().await;
    }
}
