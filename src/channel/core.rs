use super::{ClientState, ConnectionManager, ConnectionState, TaskChannelBuilder, TaskChannelOptions};
use crate::heartbeat::HeartbeatMonitor;
use crate::messaging::{Frame, FrameRouter};
use crate::subscription::{SubscriptionHandle, TaskCallback};
use crate::types::constants::{CREDENTIAL_PARAM, HEARTBEAT_INTERVAL, HEARTBEAT_TIMEOUT};
use crate::types::{ChannelError, Result};
use crate::websocket::WebSocketFactory;
use futures::stream::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock, watch};
use tokio_tungstenite::tungstenite::Message;
use url::Url;

/// The resilient push-update channel.
///
/// `TaskChannel` owns one multiplexed logical connection to the task server:
/// it detects silent failures via heartbeats, reconnects with exponential
/// backoff, queues frames written while offline, and routes inbound task
/// events to per-task subscribers.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use tasksync::{Frame, TaskChannel, TaskChannelOptions};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let channel = TaskChannel::new(
///     "wss://tasks.example.com/sync",
///     TaskChannelOptions {
///         credential: Some("opaque-token".to_string()),
///         ..Default::default()
///     },
/// )?;
///
/// channel.connect().await?;
///
/// let handle = channel
///     .subscribe("task-42", Arc::new(|frame: &Frame| {
///         println!("progress: {}", frame.data["progress"]);
///     }))
///     .await?;
///
/// // ... later
/// channel.unsubscribe(&handle).await;
/// channel.disconnect().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct TaskChannel {
    pub(crate) endpoint: String,
    pub(crate) options: TaskChannelOptions,

    // Connection manager
    pub(crate) connection: Arc<ConnectionManager>,

    // Consolidated mutable state
    pub(crate) state: Arc<RwLock<ClientState>>,

    // One flusher at a time keeps queued frames in arrival order
    pub(crate) flush_lock: Arc<Mutex<()>>,
}

impl TaskChannel {
    /// Creates a new channel instance.
    ///
    /// Construction has no side effects on the transport; call
    /// [`connect()`](Self::connect) to establish the connection.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::UrlParse`] or [`ChannelError::Config`] if the
    /// endpoint URL is malformed or not a `ws`/`wss` URL.
    pub fn new(endpoint: impl Into<String>, options: TaskChannelOptions) -> Result<Self> {
        TaskChannelBuilder::new(endpoint, options).map(|builder| builder.build())
    }

    /// Set connection state and notify watchers
    pub(crate) async fn set_state(&self, new_state: ConnectionState) {
        self.connection.set_state(new_state).await;

        let state = self.state.read().await;
        state.notify_state_change(new_state, state.was_manual_disconnect);
    }

    /// Set manual disconnect flag and notify watchers
    async fn set_manual_disconnect(&self, manual: bool) {
        let mut state = self.state.write().await;
        state.was_manual_disconnect = manual;

        let conn_state = self.connection.state().await;
        state.notify_state_change(conn_state, manual);
    }

    async fn record_error(&self, err: ChannelError) {
        self.state.write().await.last_error = Some(err);
    }

    /// Establishes the WebSocket connection.
    ///
    /// Idempotent: a no-op while already `Connecting` or `Open`. On success
    /// the channel starts the heartbeat monitor, resends a `subscribe` frame
    /// for every task id with a live callback (each physical connection is a
    /// fresh session on the server side), and flushes the outbound queue in
    /// arrival order.
    ///
    /// # Errors
    ///
    /// Returns a [`ChannelError::Transport`] if the handshake fails; the
    /// failure also feeds the reconnection policy, so retries continue in the
    /// background until they succeed or are exhausted.
    pub async fn connect(&self) -> Result<()> {
        if !self.connection.begin_connect().await {
            return Ok(());
        }
        // An explicit connect always re-arms reconnection, even after a
        // manual disconnect. Stale read/heartbeat tasks from a previous
        // transport must not outlive it, or a late close event could tear
        // down the new one.
        {
            let mut state = self.state.write().await;
            state.was_manual_disconnect = false;
            state.task_manager.abort_all();
            state.pending_probe = None;
            state.notify_state_change(ConnectionState::Connecting, false);
        }

        let url = self.build_endpoint_url()?;
        tracing::info!("connecting to {}", &self.endpoint);

        let ws_stream = match WebSocketFactory::create(&url).await {
            Ok(stream) => stream,
            Err(e) => {
                // Treated identically to an unexpected close
                tracing::error!("transport open failed: {}", e);
                self.record_error(e.clone()).await;
                self.set_state(ConnectionState::Reconnecting).await;
                return Err(e);
            }
        };
        let (write_half, mut read_half) = ws_stream.split();

        self.connection.set_writer(write_half).await;

        let router = FrameRouter::new(Arc::clone(&self.state));

        // Spawn read task with router
        let self_cloned = self.clone();
        {
            let mut state = self.state.write().await;
            state.task_manager.spawn(async move {
                tracing::debug!("starting read task");
                while let Some(msg_result) = read_half.next().await {
                    match msg_result {
                        Ok(msg) => match msg {
                            Message::Text(text) => {
                                tracing::debug!("received text frame: {}", text);
                                router.route_text(&text).await;
                            }
                            Message::Close(frame) => {
                                if let Some(close_frame) = frame {
                                    tracing::warn!(
                                        "server closed connection: code={:?}, reason='{}'",
                                        close_frame.code,
                                        close_frame.reason
                                    );
                                } else {
                                    tracing::warn!("server closed connection without close frame");
                                }
                                self_cloned.handle_unexpected_close().await;
                                break;
                            }
                            Message::Ping(data) => {
                                tracing::debug!("received ping ({} bytes)", data.len());
                            }
                            Message::Pong(data) => {
                                tracing::debug!("received pong ({} bytes)", data.len());
                            }
                            Message::Binary(data) => {
                                tracing::warn!(
                                    "received unexpected binary message ({} bytes)",
                                    data.len()
                                );
                            }
                            Message::Frame(_) => {
                                tracing::debug!("received raw frame (internal)");
                            }
                        },
                        Err(e) => {
                            tracing::error!("WebSocket read error: {}", e);
                            self_cloned.handle_unexpected_close().await;
                            break;
                        }
                    }
                }
                tracing::debug!("read task finished");
            });
        }

        // Spawn heartbeat monitor
        let interval =
            Duration::from_millis(self.options.heartbeat_interval.unwrap_or(HEARTBEAT_INTERVAL));
        let timeout =
            Duration::from_millis(self.options.heartbeat_timeout.unwrap_or(HEARTBEAT_TIMEOUT));
        let monitor =
            HeartbeatMonitor::new(Arc::downgrade(&self.connection), Arc::clone(&self.state))
                .with_interval(interval)
                .with_timeout(timeout);
        let heartbeat_handle = monitor.spawn();
        self.state.write().await.task_manager.track(heartbeat_handle);

        // The read task may have already seen a close; never stomp its
        // `Reconnecting` (or a concurrent `disconnect()`) back to `Open`.
        // The transport and tasks from this call must not outlive the claim.
        if !self.connection.open_if_connecting().await {
            tracing::warn!("transport lost before handshake completed, tearing down");
            let _ = self.connection.close().await;
            let mut state = self.state.write().await;
            state.task_manager.abort_all();
            state.pending_probe = None;
            return Ok(());
        }
        {
            let state = self.state.read().await;
            state.notify_state_change(ConnectionState::Open, state.was_manual_disconnect);
        }
        tracing::info!("connected to task server");

        // The server does not retain subscription state across connections
        self.resubscribe_all().await;
        self.flush_queue().await;

        Ok(())
    }

    /// Gracefully disconnects and transitions to the terminal `Closed` state.
    ///
    /// Cancels the heartbeat and read tasks and any pending reconnect, clears
    /// the subscription registry and outbound queue, and suppresses all
    /// further reconnection until the consumer calls
    /// [`connect()`](Self::connect) again.
    pub async fn disconnect(&self) -> Result<()> {
        {
            let state = self.connection.state().await;
            if state == ConnectionState::Closed {
                return Ok(());
            }
        }

        self.set_manual_disconnect(true).await;
        tracing::info!("disconnecting from task server");

        {
            let mut state = self.state.write().await;
            state.task_manager.abort_all();
            state.pending_probe = None;
            state.registry.clear();
            state.queue.clear();
        }

        self.connection.close().await?;
        self.set_state(ConnectionState::Closed).await;

        tracing::info!("disconnected from task server");
        Ok(())
    }

    /// Transmits a frame immediately when `Open`, otherwise queues it.
    ///
    /// Returns `true` if the frame was transmitted immediately, `false` if it
    /// was queued for the next successful open (including when an immediate
    /// transmission attempt failed mid-send).
    pub async fn send(&self, frame: Frame) -> bool {
        if self.connection.is_open().await {
            match self.connection.send_frame(&frame).await {
                Ok(()) => return true,
                Err(e) => {
                    tracing::warn!("immediate send failed, queueing frame: {}", e);
                }
            }
        }

        self.state.write().await.queue.enqueue(frame);

        // The connection may have opened (and flushed) between the check and
        // the enqueue; flush again so the frame does not sit out the session.
        if self.connection.is_open().await {
            self.flush_queue().await;
        }
        false
    }

    /// Registers a callback for a task id's updates.
    ///
    /// The first callback for an id sends a `subscribe` frame (queued while
    /// offline). Registering the same callback handle twice for the same id
    /// is idempotent and returns the original handle.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Subscription`] when the task id is empty.
    pub async fn subscribe(
        &self,
        task_id: &str,
        callback: TaskCallback,
    ) -> Result<SubscriptionHandle> {
        if task_id.trim().is_empty() {
            return Err(ChannelError::Subscription(
                "task id must not be empty".to_string(),
            ));
        }

        let outcome = {
            let mut state = self.state.write().await;
            state.registry.add(task_id, callback)
        };

        if outcome.deduplicated {
            tracing::debug!(task_id, "callback already registered, reusing handle");
            return Ok(outcome.handle);
        }

        if outcome.first_for_task {
            tracing::debug!(task_id, "first subscriber, announcing to server");
            self.send(Frame::subscribe(task_id)).await;
        }

        Ok(outcome.handle)
    }

    /// Removes a callback registered via [`subscribe()`](Self::subscribe).
    ///
    /// When the last callback for a task id is removed, an `unsubscribe`
    /// frame is sent. Returns `true` if the callback was found and removed.
    pub async fn unsubscribe(&self, handle: &SubscriptionHandle) -> bool {
        let outcome = {
            let mut state = self.state.write().await;
            state.registry.remove(&handle.task_id, handle.id)
        };

        if outcome.task_removed {
            tracing::debug!(task_id = %handle.task_id, "last subscriber gone, announcing to server");
            self.send(Frame::unsubscribe(&handle.task_id)).await;
        }

        outcome.removed
    }

    /// Marks the connection lost and hands control to the reconnection watcher
    pub(crate) async fn handle_unexpected_close(&self) {
        if self.state.read().await.was_manual_disconnect {
            return;
        }
        let current = self.connection.state().await;
        if current == ConnectionState::Closed || current == ConnectionState::Reconnecting {
            return;
        }

        self.connection.clear_writer().await;
        self.set_state(ConnectionState::Reconnecting).await;
    }

    /// Retry loop run by the reconnection watcher.
    ///
    /// Uses a fresh backoff policy per loss, so the attempt count is zero the
    /// instant a connection opens. Gives up once the policy is exhausted,
    /// recording [`ChannelError::ReconnectExhausted`] and entering `Closed`.
    pub(crate) async fn try_reconnect(&self) -> Result<()> {
        if self.state.read().await.was_manual_disconnect {
            tracing::info!("manual disconnect detected, will not attempt to reconnect");
            return Ok(());
        }

        let mut policy = self.options.reconnect_policy();
        loop {
            {
                let state = self.connection.state().await;
                if state == ConnectionState::Open || state == ConnectionState::Connecting {
                    tracing::info!("already connected or connecting, stopping reconnection attempts");
                    break;
                }
            }

            let Some(delay) = policy.next_delay() else {
                let attempts = policy.max_attempts();
                tracing::error!(attempts, "reconnection attempts exhausted, giving up");
                self.record_error(ChannelError::ReconnectExhausted { attempts })
                    .await;
                self.set_state(ConnectionState::Closed).await;
                break;
            };

            tracing::info!(
                attempt = policy.attempts(),
                delay_ms = delay.as_millis() as u64,
                "scheduling reconnect"
            );
            tokio::time::sleep(delay).await;

            if self.state.read().await.was_manual_disconnect {
                tracing::info!("manual disconnect during backoff, cancelling reconnect");
                break;
            }

            let opens_before = self.connection.opens();
            match self.connect().await {
                Ok(()) if self.connection.is_open().await => {
                    tracing::info!("reconnected successfully");
                    break;
                }
                Ok(()) => {
                    if self.connection.opens() > opens_before {
                        // It reached open (resubscribed, flushed) and dropped
                        // again; the attempt count starts over from an open.
                        tracing::warn!("connection opened then dropped, restarting backoff");
                        policy = self.options.reconnect_policy();
                    } else {
                        tracing::warn!("connection lost again before it settled, retrying");
                    }
                }
                Err(e) => {
                    tracing::error!("reconnection attempt failed: {}", e);
                }
            }
        }
        Ok(())
    }

    /// Resends `subscribe` frames for every task id with a live callback
    async fn resubscribe_all(&self) {
        let task_ids = { self.state.read().await.registry.task_ids() };
        for task_id in task_ids {
            tracing::debug!(task_id = %task_id, "resubscribing after open");
            if let Err(e) = self
                .connection
                .send_frame(&Frame::subscribe(task_id.as_str()))
                .await
            {
                // Transport already gone again; the next open retries
                tracing::warn!("failed to resubscribe {}: {}", task_id, e);
                break;
            }
        }
    }

    /// Flushes queued frames in arrival order, retaining the remainder on failure
    async fn flush_queue(&self) {
        let _guard = self.flush_lock.lock().await;
        loop {
            let frame = { self.state.write().await.queue.pop_front() };
            let Some(frame) = frame else { break };

            if let Err(e) = self.connection.send_frame(&frame).await {
                tracing::warn!("flush interrupted, frame retained: {}", e);
                self.state.write().await.queue.push_front(frame);
                break;
            }
        }
    }

    /// Current connection state
    pub async fn connection_state(&self) -> ConnectionState {
        self.connection.state().await
    }

    /// Whether the transport is open
    pub async fn is_connected(&self) -> bool {
        self.connection.is_open().await
    }

    /// Whether the channel is between a lost connection and the next attempt
    pub async fn is_reconnecting(&self) -> bool {
        self.connection.state().await == ConnectionState::Reconnecting
    }

    /// Most recent failure, if any. `ReconnectExhausted` here means retries
    /// stopped and only an explicit `connect()` resumes them.
    pub async fn last_error(&self) -> Option<ChannelError> {
        self.state.read().await.last_error.clone()
    }

    /// Number of frames waiting for the next successful open
    pub async fn queued_frames(&self) -> usize {
        self.state.read().await.queue.len()
    }

    /// Push-based state observation: yields `(state, was_manual_disconnect)`
    pub async fn state_changes(&self) -> Option<watch::Receiver<(ConnectionState, bool)>> {
        self.state
            .read()
            .await
            .state_change_tx
            .as_ref()
            .map(|tx| tx.subscribe())
    }

    /// Build the WebSocket endpoint URL with the credential query parameter
    fn build_endpoint_url(&self) -> Result<String> {
        let mut url = Url::parse(&self.endpoint)?;

        if let Some(credential) = &self.options.credential {
            url.query_pairs_mut()
                .append_pair(CREDENTIAL_PARAM, credential);
        }

        Ok(url.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_construction_has_no_transport_side_effects() {
        let channel =
            TaskChannel::new("ws://127.0.0.1:1/sync", TaskChannelOptions::default()).unwrap();
        assert_eq!(channel.connection_state().await, ConnectionState::Idle);
        assert!(!channel.is_connected().await);
        assert!(channel.last_error().await.is_none());
    }

    #[tokio::test]
    async fn test_credential_is_appended_to_url() {
        let channel = TaskChannel::new(
            "ws://localhost:4000/sync",
            TaskChannelOptions {
                credential: Some("secret-token".to_string()),
                ..Default::default()
            },
        )
        .unwrap();

        let url = channel.build_endpoint_url().unwrap();
        assert!(url.contains("token=secret-token"));
    }

    #[tokio::test]
    async fn test_url_without_credential_has_no_token_param() {
        let channel =
            TaskChannel::new("ws://localhost:4000/sync", TaskChannelOptions::default()).unwrap();
        let url = channel.build_endpoint_url().unwrap();
        assert!(!url.contains("token="));
    }

    #[tokio::test]
    async fn test_subscribe_rejects_empty_task_id() {
        let channel =
            TaskChannel::new("ws://localhost:4000/sync", TaskChannelOptions::default()).unwrap();
        let result = channel
            .subscribe("  ", Arc::new(|_frame: &Frame| {}))
            .await;
        assert!(matches!(result, Err(ChannelError::Subscription(_))));
    }

    #[tokio::test]
    async fn test_send_while_idle_queues() {
        let channel =
            TaskChannel::new("ws://localhost:4000/sync", TaskChannelOptions::default()).unwrap();
        assert!(!channel.send(Frame::subscribe("T1")).await);
        assert!(!channel.send(Frame::subscribe("T2")).await);
        assert_eq!(channel.queued_frames().await, 2);
    }

    #[tokio::test]
    async fn test_offline_subscribe_queues_announcement() {
        let channel =
            TaskChannel::new("ws://localhost:4000/sync", TaskChannelOptions::default()).unwrap();
        channel
            .subscribe("T1", Arc::new(|_frame: &Frame| {}))
            .await
            .unwrap();
        // Second callback on the same id does not announce again
        channel
            .subscribe("T1", Arc::new(|_frame: &Frame| {}))
            .await
            .unwrap();
        assert_eq!(channel.queued_frames().await, 1);
    }

    #[tokio::test]
    async fn test_unsubscribe_last_callback_announces() {
        let channel =
            TaskChannel::new("ws://localhost:4000/sync", TaskChannelOptions::default()).unwrap();
        let a = channel
            .subscribe("T2", Arc::new(|_frame: &Frame| {}))
            .await
            .unwrap();
        let b = channel
            .subscribe("T2", Arc::new(|_frame: &Frame| {}))
            .await
            .unwrap();
        assert_eq!(channel.queued_frames().await, 1); // subscribe T2

        assert!(channel.unsubscribe(&a).await);
        assert_eq!(channel.queued_frames().await, 1); // one callback left

        assert!(channel.unsubscribe(&b).await);
        assert_eq!(channel.queued_frames().await, 2); // unsubscribe T2 queued

        assert!(!channel.unsubscribe(&b).await);
    }
}
